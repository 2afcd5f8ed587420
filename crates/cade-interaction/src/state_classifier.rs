//! Conversation state classification.
//!
//! `StateClassifier::analyze` never fails. It short-circuits obvious
//! giving-up messages, otherwise asks the completion service for a
//! structured state (bounded by a timeout and a retry budget), and falls back
//! to the previous state or a keyword heuristic when that fails. Multi-turn
//! bookkeeping (turn counter, change flags, stuck detection, emotional
//! escalation) is always computed locally.

use crate::prompts::{STATE_CLASSIFIER_SYSTEM_PROMPT, render_state_prompt};
use crate::structured::parse_structured;
use cade_core::capability::catalog::EMOTIONAL_SUPPORT;
use cade_core::completion::{CompletionError, CompletionRequest, CompletionService};
use cade_core::config::ClassifierConfig;
use cade_core::error::CadeError;
use cade_core::lexicon;
use cade_core::session::ConversationWindow;
use cade_core::state::{
    ConversationState, Depth, Intent, ProgressionPattern, RawConversationState, SentimentState,
    SentimentType, TopicContinuity, next_turns_at_depth,
};
use std::sync::Arc;

const GIVING_UP_FRUSTRATION: f64 = 0.9;

/// Where a classified state came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateSource {
    QuickCheck,
    Classifier,
    /// The classifier failed and the previous state was reused.
    Previous,
    Heuristic,
}

/// Produces a `ConversationState` for each user turn.
pub struct StateClassifier {
    completion: Arc<dyn CompletionService>,
    config: ClassifierConfig,
}

impl StateClassifier {
    pub fn new(completion: Arc<dyn CompletionService>, config: ClassifierConfig) -> Self {
        Self { completion, config }
    }

    /// Classifies the latest user message.
    pub async fn analyze(
        &self,
        message: &str,
        window: &ConversationWindow,
        current_capability: Option<&str>,
        previous: Option<&ConversationState>,
    ) -> ConversationState {
        self.analyze_with_source(message, window, current_capability, previous)
            .await
            .0
    }

    /// Like `analyze`, also reporting which path produced the state.
    pub async fn analyze_with_source(
        &self,
        message: &str,
        window: &ConversationWindow,
        current_capability: Option<&str>,
        previous: Option<&ConversationState>,
    ) -> (ConversationState, StateSource) {
        if lexicon::is_giving_up(message) {
            tracing::info!("Giving-up language detected, skipping classifier");
            let state = giving_up_state(previous);
            return (self.reconcile(state, previous), StateSource::QuickCheck);
        }

        match self
            .classify_remote(message, window, current_capability, previous)
            .await
        {
            Ok(state) => (self.reconcile(state, previous), StateSource::Classifier),
            Err(err) => match previous {
                Some(prev) => {
                    tracing::warn!(
                        error = %err,
                        "State classification failed, keeping previous state"
                    );
                    (prev.clone(), StateSource::Previous)
                }
                None => {
                    tracing::warn!(
                        error = %err,
                        "State classification failed, using keyword heuristic"
                    );
                    let state = heuristic_state(message, window);
                    (self.reconcile(state, None), StateSource::Heuristic)
                }
            },
        }
    }

    async fn classify_remote(
        &self,
        message: &str,
        window: &ConversationWindow,
        current_capability: Option<&str>,
        previous: Option<&ConversationState>,
    ) -> Result<ConversationState, CadeError> {
        let prompt = render_state_prompt(message, window, current_capability, previous)
            .map_err(|e| CadeError::Classification(format!("failed to render prompt: {e}")))?;
        let timeout = self.config.timeout();
        let attempts = self.config.max_retries + 1;
        let mut last_error = CadeError::Classification("no attempt made".into());

        for attempt in 1..=attempts {
            let request = CompletionRequest::new(STATE_CLASSIFIER_SYSTEM_PROMPT, prompt.clone())
                .with_temperature(self.config.temperature)
                .with_timeout(timeout);

            let call = self.completion.complete(request);
            let outcome = match tokio::time::timeout(timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(CompletionError::Timeout(timeout)),
            };

            let retry_after = match outcome {
                Ok(text) => match parse_structured::<RawConversationState>(&text)
                    .and_then(|raw| raw.validate().map_err(|e| e.to_string()))
                {
                    Ok(state) => return Ok(state),
                    Err(reason) => {
                        tracing::debug!(attempt, %reason, "Classifier returned unusable output");
                        last_error = CadeError::Classification(reason);
                        None
                    }
                },
                Err(err) => {
                    tracing::debug!(attempt, error = %err, "Classifier call failed");
                    let retryable = err.is_retryable();
                    let retry_after = err.retry_after();
                    last_error = match err {
                        CompletionError::Timeout(elapsed) => {
                            CadeError::timeout("state classification", elapsed.as_millis() as u64)
                        }
                        other => CadeError::Classification(other.to_string()),
                    };
                    if !retryable {
                        break;
                    }
                    retry_after
                }
            };

            if attempt < attempts {
                let delay = retry_after
                    .unwrap_or_else(|| self.config.retry_backoff())
                    .min(timeout);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(last_error)
    }

    /// Applies the locally computed multi-turn fields.
    fn reconcile(
        &self,
        mut state: ConversationState,
        previous: Option<&ConversationState>,
    ) -> ConversationState {
        state.dynamics.turns_at_current_depth = next_turns_at_depth(previous, state.depth.current);

        match previous {
            Some(prev) => {
                let intent_differs = prev.intent.current != state.intent.current;
                state.intent.changed = state.intent.changed || intent_differs;
                if intent_differs && state.intent.change_reason.is_none() {
                    state.intent.change_reason =
                        Some(format!("{} -> {}", prev.intent.current, state.intent.current));
                }

                let from = prev.depth.current;
                let to = state.depth.current;
                if from != to {
                    if state.depth.change_indicator.is_none() {
                        state.depth.change_indicator = Some(format!("{from}->{to}"));
                    }
                    if state.dynamics.progression_pattern == ProgressionPattern::Exploring {
                        state.dynamics.progression_pattern = if to.rank() > from.rank() {
                            ProgressionPattern::Deepening
                        } else {
                            ProgressionPattern::Surfacing
                        };
                    }
                }
            }
            None => {
                state.intent.changed = false;
                state.intent.change_reason = None;
                state.depth.change_indicator = None;
            }
        }

        if state.dynamics.turns_at_current_depth >= self.config.stuck_turn_threshold
            && matches!(
                state.sentiment.kind,
                SentimentType::Confused | SentimentType::Frustrated
            )
        {
            state.dynamics.progression_pattern = ProgressionPattern::Stuck;
        }

        if state.sentiment.kind.is_distressed()
            && state.sentiment.frustration_level >= self.config.emotional_support_threshold
            && state.tooling.suggested_tool.is_none()
        {
            state.tooling.suggested_tool = Some(EMOTIONAL_SUPPORT.to_string());
            state.tooling.current_tool_appropriate = false;
            if state.tooling.switch_reason.is_none() {
                state.tooling.switch_reason = Some("user is struggling emotionally".into());
            }
        }

        state
    }
}

fn giving_up_state(previous: Option<&ConversationState>) -> ConversationState {
    let (intent, depth) = previous
        .map(|p| (p.intent.current, p.depth.current))
        .unwrap_or((Intent::Regulate, Depth::Surface));
    let mut state = ConversationState::initial(intent, depth, None);
    state.sentiment = SentimentState {
        kind: SentimentType::Frustrated,
        frustration_level: GIVING_UP_FRUSTRATION,
        confidence: 0.95,
    };
    state.tooling.current_tool_appropriate = false;
    state.tooling.switch_reason = Some("user is giving up".into());
    state.dynamics.topic_continuity = TopicContinuity::Same;
    state
}

/// Deterministic state from the keyword lexicon.
pub fn heuristic_state(message: &str, window: &ConversationWindow) -> ConversationState {
    let intent = lexicon::detect_intents(message)
        .into_iter()
        .next()
        .unwrap_or(Intent::Understand);
    let depth = lexicon::detect_depth(message).unwrap_or(Depth::Surface);
    let (kind, frustration_level) = lexicon::detect_sentiment(message);

    let mut state = ConversationState::initial(intent, depth, None);
    state.sentiment = SentimentState {
        kind,
        frustration_level,
        confidence: 0.5,
    };
    state.dynamics.topic_continuity = if window.has_prior_user_turn() {
        TopicContinuity::Related
    } else {
        TopicContinuity::New
    };
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct ScriptedCompletion {
        replies: Mutex<VecDeque<Result<String, CompletionError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedCompletion {
        fn new(replies: Vec<Result<String, CompletionError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionService for ScriptedCompletion {
        async fn complete(&self, _request: CompletionRequest) -> Result<String, CompletionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(CompletionError::Unavailable("script exhausted".into())))
        }
    }

    fn config() -> ClassifierConfig {
        ClassifierConfig {
            retry_backoff_ms: 0,
            ..ClassifierConfig::default()
        }
    }

    fn state_json(sentiment: &str, frustration: f64, intent: &str, depth: &str) -> String {
        format!(
            r#"{{"sentiment": {{"type": "{sentiment}", "frustrationLevel": {frustration}, "confidence": 0.8}},
                "intent": {{"current": "{intent}", "changed": false}},
                "depth": {{"current": "{depth}"}},
                "tooling": {{"currentToolAppropriate": true}},
                "dynamics": {{"progressionPattern": "exploring", "topicContinuity": "same"}}}}"#
        )
    }

    #[tokio::test]
    async fn test_giving_up_short_circuits_without_external_call() {
        let completion = ScriptedCompletion::new(vec![]);
        let classifier = StateClassifier::new(completion.clone(), config());

        let (state, source) = classifier
            .analyze_with_source(
                "I give up, this is impossible",
                &ConversationWindow::default(),
                None,
                None,
            )
            .await;

        assert_eq!(source, StateSource::QuickCheck);
        assert_eq!(state.sentiment.kind, SentimentType::Frustrated);
        assert_eq!(state.sentiment.frustration_level, 0.9);
        assert_eq!(
            state.tooling.suggested_tool.as_deref(),
            Some(EMOTIONAL_SUPPORT)
        );
        assert_eq!(completion.calls(), 0);
    }

    #[tokio::test]
    async fn test_classifier_output_is_normalized() {
        let completion =
            ScriptedCompletion::new(vec![Ok(state_json("confused", 4.0, "solve", "guided"))]);
        let classifier = StateClassifier::new(completion.clone(), config());

        let state = classifier
            .analyze("I'm not sure", &ConversationWindow::default(), None, None)
            .await;

        assert_eq!(state.intent.current, Intent::Solve);
        assert!((state.sentiment.frustration_level - 0.4).abs() < 1e-9);
        assert_eq!(state.dynamics.turns_at_current_depth, 1);
        assert_eq!(completion.calls(), 1);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let completion = ScriptedCompletion::new(vec![
            Ok("not json at all".into()),
            Err(CompletionError::Timeout(Duration::from_secs(1))),
            Ok(format!(
                "```json\n{}\n```",
                state_json("neutral", 0.1, "explore", "deep")
            )),
        ]);
        let classifier = StateClassifier::new(completion.clone(), config());

        let (state, source) = classifier
            .analyze_with_source("tell me more", &ConversationWindow::default(), None, None)
            .await;

        assert_eq!(source, StateSource::Classifier);
        assert_eq!(state.intent.current, Intent::Explore);
        assert_eq!(completion.calls(), 3);
    }

    #[tokio::test]
    async fn test_failure_returns_previous_state_unchanged() {
        let completion = ScriptedCompletion::new(vec![
            Ok("garbage".into()),
            Ok("garbage".into()),
            Ok("garbage".into()),
        ]);
        let classifier = StateClassifier::new(completion.clone(), config());
        let mut previous = ConversationState::initial(Intent::Create, Depth::Guided, None);
        previous.dynamics.turns_at_current_depth = 2;

        let (state, source) = classifier
            .analyze_with_source(
                "and then?",
                &ConversationWindow::default(),
                Some("writing_coach"),
                Some(&previous),
            )
            .await;

        assert_eq!(source, StateSource::Previous);
        assert_eq!(state, previous);
        assert_eq!(completion.calls(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_early_and_uses_heuristic() {
        let completion =
            ScriptedCompletion::new(vec![Err(CompletionError::Unavailable("offline".into()))]);
        let classifier = StateClassifier::new(completion.clone(), config());

        let (state, source) = classifier
            .analyze_with_source(
                "What is mitosis?",
                &ConversationWindow::default(),
                None,
                None,
            )
            .await;

        assert_eq!(source, StateSource::Heuristic);
        assert_eq!(state.intent.current, Intent::Understand);
        assert_eq!(state.depth.current, Depth::Surface);
        assert_eq!(completion.calls(), 1);
    }

    #[tokio::test]
    async fn test_turn_counter_and_change_flags_computed_locally() {
        let completion = ScriptedCompletion::new(vec![
            Ok(state_json("neutral", 0.1, "understand", "guided")),
            Ok(state_json("neutral", 0.1, "create", "deep")),
        ]);
        let classifier = StateClassifier::new(completion, config());
        let mut previous = ConversationState::initial(Intent::Understand, Depth::Guided, None);
        previous.dynamics.turns_at_current_depth = 2;

        let same = classifier
            .analyze("ok go on", &ConversationWindow::default(), None, Some(&previous))
            .await;
        assert_eq!(same.dynamics.turns_at_current_depth, 3);
        assert!(!same.intent.changed);
        assert!(same.depth.change_indicator.is_none());

        let moved = classifier
            .analyze("now write it", &ConversationWindow::default(), None, Some(&same))
            .await;
        assert_eq!(moved.dynamics.turns_at_current_depth, 1);
        assert!(moved.intent.changed);
        assert_eq!(moved.depth.change_indicator.as_deref(), Some("guided->deep"));
        assert_eq!(
            moved.dynamics.progression_pattern,
            ProgressionPattern::Deepening
        );
    }

    #[tokio::test]
    async fn test_stuck_after_threshold_turns_while_confused() {
        let completion =
            ScriptedCompletion::new(vec![Ok(state_json("confused", 0.3, "solve", "guided"))]);
        let classifier = StateClassifier::new(completion, config());
        let mut previous = ConversationState::initial(Intent::Solve, Depth::Guided, None);
        previous.dynamics.turns_at_current_depth = 3;

        let state = classifier
            .analyze("still lost", &ConversationWindow::default(), None, Some(&previous))
            .await;

        assert_eq!(state.dynamics.turns_at_current_depth, 4);
        assert_eq!(state.dynamics.progression_pattern, ProgressionPattern::Stuck);
    }
}
