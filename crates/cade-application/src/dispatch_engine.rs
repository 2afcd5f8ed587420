//! Turn orchestration.
//!
//! `DispatchEngine::handle_turn` runs the full dispatch path for one user
//! message: optimizer hints, state classification (or first-turn routing),
//! pattern selection and execution, response aggregation, and session
//! bookkeeping. It never fails outward; the worst case is the recovery
//! message.

use crate::contextualizer::contextualize;
use crate::pattern_selector::PatternSelector;
use crate::predictor::{ExecutionPredictor, PredictorMetrics};
use crate::query_optimizer::{QueryOptimization, QueryOptimizer, QueryRequest};
use crate::session_cache::SessionContexts;
use cade_core::capability::catalog::requires_retrieval;
use cade_core::capability::{CapabilityInput, CapabilityRegistry};
use cade_core::completion::CompletionService;
use cade_core::config::DispatchConfig;
use cade_core::lexicon;
use cade_core::pattern::{
    OrchestrationPattern, PatternType, RECOVERY_MESSAGE, SYSTEM_FALLBACK_TOOL, ToolExecutionResult,
};
use cade_core::session::{ConversationMessage, ConversationWindow, SessionContext, SessionStore};
use cade_core::state::ConversationState;
use cade_execution::{ExecutionBudget, PatternExecutor, ToolExecutor};
use cade_infrastructure::InMemoryCacheStore;
use cade_interaction::{IntentRouter, RouterMetrics, RoutingDecision, StateClassifier};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;

/// One user message to dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    /// Empty means "start a new session".
    pub session_id: String,
    pub message: String,
    /// Capability the caller would like to use, if any.
    #[serde(default)]
    pub requested_capability: Option<String>,
    /// Re-route from scratch instead of classifying against the previous state.
    #[serde(default)]
    pub reroute: bool,
}

impl TurnRequest {
    pub fn new(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            message: message.into(),
            requested_capability: None,
            reroute: false,
        }
    }

    pub fn with_requested_capability(mut self, capability: impl Into<String>) -> Self {
        self.requested_capability = Some(capability.into());
        self
    }

    pub fn rerouted(mut self) -> Self {
        self.reroute = true;
        self
    }
}

/// The outcome of one dispatched turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResponse {
    pub session_id: String,
    pub response: String,
    /// State the turn was dispatched with; on a cache hit, the unchanged previous state.
    pub state: Option<ConversationState>,
    /// `None` when served from cache.
    pub pattern: Option<OrchestrationPattern>,
    pub results: Vec<ToolExecutionResult>,
    pub effectiveness: f64,
    pub total_time_ms: u64,
    pub from_cache: bool,
    pub hints: QueryOptimization,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<RoutingDecision>,
    #[serde(default)]
    pub predicted_next: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineMetrics {
    pub router: RouterMetrics,
    pub predictor: PredictorMetrics,
    pub cached_responses: usize,
    pub active_sessions: usize,
}

/// Joins the successful outputs of a pattern execution into one response.
///
/// A chain answers with its last successful step and a parallel fan-out with
/// one section per successful tool; other patterns use the first success.
/// Returns `None` when nothing succeeded.
pub fn aggregate_response(
    kind: PatternType,
    results: &[ToolExecutionResult],
) -> Option<String> {
    let mut successes = results
        .iter()
        .filter(|r| r.success)
        .filter_map(|r| r.output_text().map(|text| (r.tool.as_str(), text)))
        .filter(|(_, text)| !text.trim().is_empty())
        .peekable();
    successes.peek()?;

    match kind {
        PatternType::Chain => successes.last().map(|(_, text)| text),
        PatternType::Parallel => {
            let sections: Vec<String> = successes
                .map(|(tool, text)| format!("## {tool}\n{}", text.trim()))
                .collect();
            Some(sections.join("\n\n"))
        }
        PatternType::Handoff | PatternType::Fallback => successes.next().map(|(_, text)| text),
    }
}

/// The capability to remember as active after a turn: the one that answered.
fn answering_capability(kind: PatternType, results: &[ToolExecutionResult]) -> Option<String> {
    let mut real = results
        .iter()
        .filter(|r| r.success && r.tool != SYSTEM_FALLBACK_TOOL);
    let chosen = match kind {
        PatternType::Chain => real.last(),
        _ => real.next(),
    };
    chosen.map(|r| r.tool.clone())
}

pub struct DispatchEngine {
    config: DispatchConfig,
    store: Arc<dyn SessionStore>,
    optimizer: QueryOptimizer,
    router: IntentRouter,
    classifier: StateClassifier,
    selector: PatternSelector,
    executor: PatternExecutor,
    predictor: Arc<ExecutionPredictor>,
    sessions: SessionContexts,
}

impl DispatchEngine {
    pub fn new(
        config: DispatchConfig,
        completion: Arc<dyn CompletionService>,
        registry: Arc<dyn CapabilityRegistry>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let responses: Arc<InMemoryCacheStore<String>> =
            Arc::new(InMemoryCacheStore::new(config.cache.max_entries));
        let optimizer = QueryOptimizer::new(responses, config.cache.ttl());
        let router = IntentRouter::with_memory_cache(Arc::clone(&completion), &config);
        let classifier = StateClassifier::new(completion, config.classifier.clone());
        let selector = PatternSelector::new(config.execution.clone());
        let executor = PatternExecutor::new(
            ToolExecutor::new(Arc::clone(&registry)),
            config.execution.clone(),
        );
        let predictor = Arc::new(
            ExecutionPredictor::new(
                registry,
                config.predictor.clone(),
                config.cache.ttl(),
                config.cache.max_entries,
            )
            .with_session_limits(config.sessions.clone()),
        );
        let sessions = SessionContexts::with_limits(&config.sessions);

        Self {
            config,
            store,
            optimizer,
            router,
            classifier,
            selector,
            executor,
            predictor,
            sessions,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn optimizer(&self) -> &QueryOptimizer {
        &self.optimizer
    }

    pub fn router(&self) -> &IntentRouter {
        &self.router
    }

    /// A copy of the session's dispatch context, if the session has been seen.
    pub async fn session_context(&self, session_id: &str) -> Option<SessionContext> {
        self.sessions.snapshot(session_id).await
    }

    pub async fn metrics(&self) -> EngineMetrics {
        EngineMetrics {
            router: self.router.metrics(),
            predictor: self.predictor.metrics().await,
            cached_responses: self.optimizer.cache_size(),
            active_sessions: self.sessions.len().await,
        }
    }

    /// Dispatches one user message. Never fails.
    #[tracing::instrument(
        skip(self, request),
        fields(session_id = tracing::field::Empty, reroute = request.reroute)
    )]
    pub async fn handle_turn(&self, request: TurnRequest) -> DispatchResponse {
        let started = Instant::now();
        let session_id = if request.session_id.trim().is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            request.session_id.trim().to_string()
        };
        tracing::Span::current().record("session_id", session_id.as_str());

        // Held for the whole turn so turns of one session never interleave.
        let context = self.sessions.get_or_create(&session_id).await;
        let mut ctx = context.lock().await;

        let history = match self.store.get_messages(&session_id).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Failed to load session messages, continuing without history"
                );
                Vec::new()
            }
        };
        let window = ConversationWindow::build(
            &history,
            self.config.window.recent_messages,
            self.config.window.summary_threshold,
        );

        let query_request = QueryRequest::new(request.message.as_str())
            .with_recent_turns(window.recent.iter().map(|m| m.content.clone()).collect())
            .with_requested_capability(request.requested_capability.clone());
        let mut hints = self.optimizer.analyze(&query_request);
        tracing::debug!(reasoning = %hints.reasoning, "Query hints");

        if hints.use_cache && !request.reroute {
            if let Some(cached) = hints.cached_response.take() {
                tracing::info!("Serving cached response");
                self.append_messages(&session_id, &request.message, &cached).await;
                return DispatchResponse {
                    session_id,
                    response: cached,
                    state: ctx.previous_state.clone(),
                    pattern: None,
                    results: Vec::new(),
                    effectiveness: 0.0,
                    total_time_ms: started.elapsed().as_millis() as u64,
                    from_cache: true,
                    hints,
                    routing: None,
                    predicted_next: Vec::new(),
                };
            }
        }

        let fresh_start = ctx.previous_state.is_none() || request.reroute;
        let current_capability = request
            .requested_capability
            .as_deref()
            .or(ctx.active_capability.as_deref());

        let (mut state, routing) =
            if fresh_start && !lexicon::is_giving_up(&request.message) {
                let context_text = window.trailing_contents(2).join("\n");
                let routing_context = (!context_text.is_empty()).then_some(context_text.as_str());
                let decision = self.router.route(&request.message, routing_context).await;
                let state = ConversationState::initial(
                    decision.primary_intent,
                    decision.depth,
                    Some(decision.suggested_capability.clone()),
                );
                (state, Some(decision))
            } else {
                let previous = if request.reroute {
                    None
                } else {
                    ctx.previous_state.as_ref()
                };
                let state = self
                    .classifier
                    .analyze(&request.message, &window, current_capability, previous)
                    .await;
                (state, None)
            };

        if let Some(requested) = request.requested_capability.as_ref() {
            if state.tooling.current_tool_appropriate {
                state.tooling.suggested_tool = Some(requested.clone());
            }
        }

        let previous = if fresh_start {
            None
        } else {
            ctx.previous_state.as_ref()
        };
        let pattern = self.selector.select(
            &state,
            previous,
            &request.message,
            ctx.active_capability.as_deref(),
        );

        let query = if hints.skip_context_rewrite {
            request.message.clone()
        } else {
            contextualize(&request.message, &window)
        };
        let needs_retrieval = !hints.skip_retrieval
            && routing.as_ref().map_or(true, |r| r.needs_retrieval)
            && requires_retrieval(pattern.primary_tool());
        let input_context: HashMap<String, Value> = HashMap::from([
            ("needsRetrieval".to_string(), json!(needs_retrieval)),
            ("originalQuery".to_string(), json!(request.message)),
            ("patternType".to_string(), json!(pattern.kind.to_string())),
        ]);
        let input = CapabilityInput::new(query, session_id.as_str())
            .with_state(state.clone())
            .with_context(input_context);

        let budget = ExecutionBudget::new(self.config.execution.turn_deadline());
        let execution = self.executor.execute(&pattern, &state, input, &budget).await;
        for result in &execution.results {
            if result.tool != SYSTEM_FALLBACK_TOOL {
                self.predictor.note_execution(&result.tool);
            }
        }

        let response = aggregate_response(pattern.kind, &execution.results)
            .unwrap_or_else(|| RECOVERY_MESSAGE.to_string());
        let active = answering_capability(pattern.kind, &execution.results);
        let has_real_success = active.is_some();

        ctx.record_turn(state.clone(), Some(pattern.clone()), active);

        self.predictor.record_pattern(&session_id, &pattern).await;
        let predicted_next = self.predictor.predict_next(&session_id, &state).await;
        // Detached; pre-warming never delays the response.
        let _warming = self.predictor.pre_warm(predicted_next.clone());

        if has_real_success {
            self.optimizer.record_response(&query_request, &response);
        }
        self.append_messages(&session_id, &request.message, &response)
            .await;

        let total_time_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            pattern = %pattern.kind,
            tools = ?pattern.tools,
            effectiveness = execution.effectiveness,
            total_time_ms,
            "Turn dispatched"
        );

        DispatchResponse {
            session_id,
            response,
            state: Some(state),
            pattern: Some(pattern),
            results: execution.results,
            effectiveness: execution.effectiveness,
            total_time_ms,
            from_cache: false,
            hints,
            routing,
            predicted_next,
        }
    }

    async fn append_messages(&self, session_id: &str, user: &str, assistant: &str) {
        for message in [
            ConversationMessage::user(user),
            ConversationMessage::assistant(assistant),
        ] {
            if let Err(e) = self.store.append_message(session_id, message).await {
                tracing::warn!(error = %e, "Failed to append session message");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallel_response_is_sectioned_in_order() {
        let results = vec![
            ToolExecutionResult::succeeded(
                "quick_explainer",
                json!("Photosynthesis makes sugar."),
                5,
            ),
            ToolExecutionResult::failed("writing_coach", "boom", 5),
            ToolExecutionResult::succeeded("brainstormer", json!({"text": "A poem idea."}), 5),
        ];
        let response = aggregate_response(PatternType::Parallel, &results).unwrap();
        assert_eq!(
            response,
            "## quick_explainer\nPhotosynthesis makes sugar.\n\n## brainstormer\nA poem idea."
        );
    }

    #[test]
    fn test_chain_answers_with_last_success() {
        let results = vec![
            ToolExecutionResult::succeeded("quick_explainer", json!("short"), 5),
            ToolExecutionResult::succeeded("concept_explorer", json!("longer"), 5),
            ToolExecutionResult::failed("deep_dive", "boom", 5),
        ];
        assert_eq!(
            aggregate_response(PatternType::Chain, &results).as_deref(),
            Some("longer")
        );
        assert_eq!(
            answering_capability(PatternType::Chain, &results).as_deref(),
            Some("concept_explorer")
        );
    }

    #[test]
    fn test_nothing_succeeded_yields_none() {
        let results = vec![ToolExecutionResult::failed("quick_explainer", "boom", 5)];
        assert_eq!(aggregate_response(PatternType::Handoff, &results), None);
        assert_eq!(answering_capability(PatternType::Handoff, &results), None);
    }

    #[test]
    fn test_system_fallback_is_not_an_answering_capability() {
        let results = vec![
            ToolExecutionResult::failed("quick_solver", "boom", 5),
            ToolExecutionResult::succeeded(SYSTEM_FALLBACK_TOOL, json!(RECOVERY_MESSAGE), 0),
        ];
        assert_eq!(
            aggregate_response(PatternType::Fallback, &results).as_deref(),
            Some(RECOVERY_MESSAGE)
        );
        assert_eq!(answering_capability(PatternType::Fallback, &results), None);
    }
}
