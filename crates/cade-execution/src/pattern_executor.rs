//! Execution strategies for orchestration patterns.
//!
//! - handoff: tools in order; with several tools, stop after the first success
//! - parallel: every tool concurrently, results joined in request order
//! - chain: tools in order, each success feeding the next input; a failure ends the chain
//! - fallback: tools in order until one succeeds; a synthetic recovery result
//!   is appended when none do

use crate::tool_executor::{ExecutionBudget, ToolExecutor};
use cade_core::capability::CapabilityInput;
use cade_core::config::ExecutionConfig;
use cade_core::pattern::{
    OrchestrationPattern, PatternExecution, PatternType, RECOVERY_MESSAGE, SYSTEM_FALLBACK_TOOL,
    ToolExecutionResult,
};
use cade_core::session::truncate_chars;
use cade_core::state::ConversationState;
use futures::future::join_all;
use serde_json::{Value, json};
use tokio::time::Instant;

const SUCCESS_WEIGHT: f64 = 0.4;
const SPEED_WEIGHT: f64 = 0.2;
const APPROPRIATENESS_WEIGHT: f64 = 0.3;
const SENTIMENT_WEIGHT: f64 = 0.1;

/// Score in [0, 1] for one pattern execution.
///
/// Appropriateness is the share of executed tools that are the capability
/// the state asks for. The synthetic recovery result counts towards neither
/// rate.
pub fn effectiveness(
    results: &[ToolExecutionResult],
    state: &ConversationState,
    total_time_ms: u64,
    speed_budget_ms: u64,
) -> f64 {
    let real: Vec<&ToolExecutionResult> = results
        .iter()
        .filter(|r| r.tool != SYSTEM_FALLBACK_TOOL)
        .collect();
    let share = |matching: usize| {
        if real.is_empty() {
            0.0
        } else {
            matching as f64 / real.len() as f64
        }
    };
    let suggested = state.suggested_capability();
    let success_rate = share(real.iter().filter(|r| r.success).count());
    let appropriateness = share(real.iter().filter(|r| r.tool == suggested).count());

    let score = SUCCESS_WEIGHT * success_rate
        + SPEED_WEIGHT * speed_score(total_time_ms, speed_budget_ms)
        + APPROPRIATENESS_WEIGHT * appropriateness
        + SENTIMENT_WEIGHT * state.sentiment.kind.effectiveness_weight();
    score.clamp(0.0, 1.0)
}

/// 1.0 within budget, falling linearly to 0.0 at twice the budget.
pub fn speed_score(elapsed_ms: u64, budget_ms: u64) -> f64 {
    if budget_ms == 0 {
        return if elapsed_ms == 0 { 1.0 } else { 0.0 };
    }
    if elapsed_ms <= budget_ms {
        return 1.0;
    }
    let over = (elapsed_ms - budget_ms) as f64 / budget_ms as f64;
    (1.0 - over).clamp(0.0, 1.0)
}

#[derive(Clone)]
pub struct PatternExecutor {
    tools: ToolExecutor,
    config: ExecutionConfig,
}

impl PatternExecutor {
    pub fn new(tools: ToolExecutor, config: ExecutionConfig) -> Self {
        Self { tools, config }
    }

    pub fn tool_executor(&self) -> &ToolExecutor {
        &self.tools
    }

    /// Executes `pattern` for one turn.
    ///
    /// `state` is the conversation state the pattern was selected for;
    /// `input` carries the query, session id and shared context.
    pub async fn execute(
        &self,
        pattern: &OrchestrationPattern,
        state: &ConversationState,
        input: CapabilityInput,
        budget: &ExecutionBudget,
    ) -> PatternExecution {
        let started = Instant::now();
        tracing::info!(
            pattern = %pattern.kind,
            tools = ?pattern.tools,
            reason = %pattern.reason,
            "Executing pattern"
        );

        let results = match pattern.kind {
            PatternType::Handoff => self.handoff(&pattern.tools, input, budget).await,
            PatternType::Parallel => self.parallel(&pattern.tools, input, budget).await,
            PatternType::Chain => self.chain(&pattern.tools, input, budget).await,
            PatternType::Fallback => self.fallback(&pattern.tools, input, budget).await,
        };

        let total_time_ms = started.elapsed().as_millis() as u64;
        let effectiveness =
            effectiveness(&results, state, total_time_ms, self.config.speed_budget_ms);
        tracing::info!(
            pattern = %pattern.kind,
            results = results.len(),
            successes = results.iter().filter(|r| r.success).count(),
            effectiveness,
            total_time_ms,
            "Pattern finished"
        );

        PatternExecution {
            results,
            effectiveness,
            total_time_ms,
        }
    }

    async fn handoff(
        &self,
        tools: &[String],
        input: CapabilityInput,
        budget: &ExecutionBudget,
    ) -> Vec<ToolExecutionResult> {
        let mut results = Vec::with_capacity(tools.len());
        for (i, tool) in tools.iter().enumerate() {
            if i > 0 && budget.is_exhausted() {
                tracing::warn!(skipped = tools.len() - i, "Turn budget exhausted, ending handoff");
                break;
            }
            let result = self.tools.execute(tool, input.clone(), budget).await;
            let succeeded = result.success;
            results.push(result);
            if succeeded && tools.len() > 1 {
                break;
            }
        }
        results
    }

    async fn parallel(
        &self,
        tools: &[String],
        input: CapabilityInput,
        budget: &ExecutionBudget,
    ) -> Vec<ToolExecutionResult> {
        let calls = tools
            .iter()
            .map(|tool| self.tools.execute(tool, input.clone(), budget));
        join_all(calls).await
    }

    async fn chain(
        &self,
        tools: &[String],
        input: CapabilityInput,
        budget: &ExecutionBudget,
    ) -> Vec<ToolExecutionResult> {
        let mut results = Vec::with_capacity(tools.len());
        let mut step_input = input.clone();

        for (i, tool) in tools.iter().enumerate() {
            if i > 0 && budget.is_exhausted() {
                tracing::warn!(step = i, "Turn budget exhausted, ending chain");
                break;
            }
            let result = self.tools.execute(tool, step_input.clone(), budget).await;
            let output = result.success.then(|| result.output_text()).flatten();
            results.push(result);

            let Some(output) = output else {
                tracing::debug!(step = i, tool = %tool, "Chain step failed, stopping");
                break;
            };
            let carried = truncate_chars(&output, self.config.chain_output_max_chars);
            let mut next = input.with_query(format!(
                "{}\n\nBuilding on the previous step:\n{}",
                input.query, carried
            ));
            next.context
                .insert("previousTool".to_string(), Value::String(tool.clone()));
            next.context.insert("chainStep".to_string(), json!(i + 1));
            step_input = next;
        }
        results
    }

    async fn fallback(
        &self,
        tools: &[String],
        input: CapabilityInput,
        budget: &ExecutionBudget,
    ) -> Vec<ToolExecutionResult> {
        let mut results = Vec::with_capacity(tools.len() + 1);
        for (i, tool) in tools.iter().enumerate() {
            if i > 0 && budget.is_exhausted() {
                tracing::warn!(attempt = i, "Turn budget exhausted, ending fallback");
                break;
            }
            let result = self.tools.execute(tool, input.clone(), budget).await;
            if result.success {
                results.push(result);
                return results;
            }
            results.push(result);
        }

        tracing::warn!(attempts = results.len(), "Every fallback capability failed");
        results.push(ToolExecutionResult::succeeded(
            SYSTEM_FALLBACK_TOOL,
            Value::String(RECOVERY_MESSAGE.to_string()),
            0,
        ));
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryCapabilityRegistry;
    use async_trait::async_trait;
    use cade_core::capability::{Capability, CapabilityError};
    use cade_core::state::{Depth, Intent, SentimentType};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    /// Records every query it receives.
    struct Recorder {
        reply: &'static str,
        delay: Duration,
        fail: bool,
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Capability for Recorder {
        async fn execute(&self, input: CapabilityInput) -> Result<Value, CapabilityError> {
            self.seen.lock().unwrap().push(input.query.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                Err(CapabilityError::failed(format!("{} failed", self.reply)))
            } else {
                Ok(json!({ "text": self.reply }))
            }
        }
    }

    struct Harness {
        registry: InMemoryCapabilityRegistry,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                registry: InMemoryCapabilityRegistry::new(),
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn tool(mut self, name: &'static str, delay_ms: u64, fail: bool) -> Self {
            self.registry.register(
                name,
                Arc::new(Recorder {
                    reply: name,
                    delay: Duration::from_millis(delay_ms),
                    fail,
                    seen: self.seen.clone(),
                }),
            );
            self
        }

        fn executor(&self) -> PatternExecutor {
            PatternExecutor::new(
                ToolExecutor::new(Arc::new(self.registry.clone())),
                ExecutionConfig::default(),
            )
        }
    }

    fn pattern(kind: PatternType, tools: &[&str]) -> OrchestrationPattern {
        OrchestrationPattern::new(kind, "test", tools.iter().map(|t| t.to_string()).collect())
            .unwrap()
    }

    fn state() -> ConversationState {
        ConversationState::initial(Intent::Understand, Depth::Surface, None)
    }

    fn budget() -> ExecutionBudget {
        ExecutionBudget::new(Duration::from_secs(30))
    }

    fn input() -> CapabilityInput {
        CapabilityInput::new("What is mitosis?", "s-1")
    }

    #[tokio::test]
    async fn test_handoff_stops_after_first_success() {
        let harness = Harness::new().tool("a", 0, false).tool("b", 0, false);
        let execution = harness
            .executor()
            .execute(&pattern(PatternType::Handoff, &["a", "b"]), &state(), input(), &budget())
            .await;

        assert_eq!(execution.results.len(), 1);
        assert_eq!(execution.results[0].tool, "a");
        assert_eq!(harness.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_handoff_moves_on_after_failure() {
        let harness = Harness::new().tool("a", 0, true).tool("b", 0, false);
        let execution = harness
            .executor()
            .execute(&pattern(PatternType::Handoff, &["a", "b"]), &state(), input(), &budget())
            .await;

        assert_eq!(execution.results.len(), 2);
        assert!(!execution.results[0].success);
        assert!(execution.results[1].success);
    }

    #[tokio::test]
    async fn test_parallel_isolates_failures() {
        let harness = Harness::new()
            .tool("a", 0, false)
            .tool("b", 0, true)
            .tool("c", 0, false);
        let execution = harness
            .executor()
            .execute(
                &pattern(PatternType::Parallel, &["a", "b", "c"]),
                &state(),
                input(),
                &budget(),
            )
            .await;

        assert_eq!(execution.results.len(), 3);
        assert_eq!(execution.results.iter().filter(|r| !r.success).count(), 1);
        assert!(!execution.results[1].success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_results_keep_request_order() {
        let harness = Harness::new()
            .tool("first", 50, false)
            .tool("second", 80, false)
            .tool("third", 30, false);
        let execution = harness
            .executor()
            .execute(
                &pattern(PatternType::Parallel, &["first", "second", "third"]),
                &state(),
                input(),
                &budget(),
            )
            .await;

        let order: Vec<&str> = execution.results.iter().map(|r| r.tool.as_str()).collect();
        assert_eq!(order, vec!["first", "second", "third"]);
        assert!(execution.results.iter().all(|r| r.success));
        assert!(execution.total_time_ms < 160);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_deadline_fails_slow_branch_only() {
        let harness = Harness::new().tool("fast", 10, false).tool("slow", 5_000, false);
        let execution = harness
            .executor()
            .execute(
                &pattern(PatternType::Parallel, &["fast", "slow"]),
                &state(),
                input(),
                &ExecutionBudget::new(Duration::from_millis(200)),
            )
            .await;

        assert!(execution.results[0].success);
        assert!(!execution.results[1].success);
        assert!(execution.results[1].error.as_deref().unwrap().starts_with("timed out"));
    }

    #[tokio::test]
    async fn test_chain_feeds_outputs_forward() {
        let harness = Harness::new()
            .tool("quick_explainer", 0, false)
            .tool("concept_explorer", 0, false);
        let execution = harness
            .executor()
            .execute(
                &pattern(PatternType::Chain, &["quick_explainer", "concept_explorer"]),
                &state(),
                input(),
                &budget(),
            )
            .await;

        assert_eq!(execution.results.len(), 2);
        let seen = harness.seen.lock().unwrap();
        assert_eq!(seen[0], "What is mitosis?");
        assert_eq!(
            seen[1],
            "What is mitosis?\n\nBuilding on the previous step:\nquick_explainer"
        );
    }

    #[tokio::test]
    async fn test_chain_stops_at_failure() {
        let harness = Harness::new()
            .tool("a", 0, false)
            .tool("b", 0, true)
            .tool("c", 0, false);
        let execution = harness
            .executor()
            .execute(&pattern(PatternType::Chain, &["a", "b", "c"]), &state(), input(), &budget())
            .await;

        assert_eq!(execution.results.len(), 2);
        assert!(execution.results[0].success);
        assert!(!execution.results[1].success);
    }

    #[tokio::test]
    async fn test_fallback_appends_recovery_when_all_fail() {
        let harness = Harness::new()
            .tool("a", 0, true)
            .tool("b", 0, true)
            .tool("c", 0, true);
        let execution = harness
            .executor()
            .execute(
                &pattern(PatternType::Fallback, &["a", "b", "c"]),
                &state(),
                input(),
                &budget(),
            )
            .await;

        assert_eq!(execution.results.len(), 4);
        let last = execution.results.last().unwrap();
        assert_eq!(last.tool, SYSTEM_FALLBACK_TOOL);
        assert!(last.success);
        assert_eq!(last.output_text().as_deref(), Some(RECOVERY_MESSAGE));
    }

    #[tokio::test]
    async fn test_fallback_stops_at_first_success() {
        let harness = Harness::new()
            .tool("a", 0, true)
            .tool("b", 0, false)
            .tool("c", 0, false);
        let execution = harness
            .executor()
            .execute(
                &pattern(PatternType::Fallback, &["a", "b", "c"]),
                &state(),
                input(),
                &budget(),
            )
            .await;

        assert_eq!(execution.results.len(), 2);
        assert_eq!(execution.results[1].tool, "b");
        assert!(execution.any_success());
    }

    /// Cancels the turn budget while answering successfully.
    struct CancelsBudget(CancellationToken);

    #[async_trait]
    impl Capability for CancelsBudget {
        async fn execute(&self, _input: CapabilityInput) -> Result<Value, CapabilityError> {
            self.0.cancel();
            Ok(json!({ "text": "partial answer" }))
        }
    }

    fn short_budget() -> ExecutionBudget {
        ExecutionBudget::new(Duration::from_millis(200))
    }

    #[tokio::test(start_paused = true)]
    async fn test_handoff_starts_no_step_after_deadline() {
        let harness = Harness::new().tool("slow", 5_000, false).tool("b", 0, false);
        let execution = harness
            .executor()
            .execute(
                &pattern(PatternType::Handoff, &["slow", "b"]),
                &state(),
                input(),
                &short_budget(),
            )
            .await;

        assert_eq!(execution.results.len(), 1);
        assert!(!execution.results[0].success);
        assert_eq!(harness.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chain_starts_no_step_after_deadline() {
        let harness = Harness::new().tool("slow", 5_000, false).tool("next", 0, false);
        let execution = harness
            .executor()
            .execute(
                &pattern(PatternType::Chain, &["slow", "next"]),
                &state(),
                input(),
                &short_budget(),
            )
            .await;

        assert_eq!(execution.results.len(), 1);
        assert_eq!(execution.results[0].tool, "slow");
        assert_eq!(harness.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_chain_stops_when_budget_ends_after_a_success() {
        let token = CancellationToken::new();
        let mut harness = Harness::new().tool("next", 0, false);
        harness
            .registry
            .register("first", Arc::new(CancelsBudget(token.clone())));
        let budget = ExecutionBudget::with_token(Duration::from_secs(30), token);

        let execution = harness
            .executor()
            .execute(&pattern(PatternType::Chain, &["first", "next"]), &state(), input(), &budget)
            .await;

        assert_eq!(execution.results.len(), 1);
        assert!(execution.results[0].success);
        assert!(harness.seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_recovers_without_starting_after_deadline() {
        let harness = Harness::new().tool("slow", 5_000, false).tool("b", 0, false);
        let execution = harness
            .executor()
            .execute(
                &pattern(PatternType::Fallback, &["slow", "b"]),
                &state(),
                input(),
                &short_budget(),
            )
            .await;

        let tools: Vec<&str> = execution.results.iter().map(|r| r.tool.as_str()).collect();
        assert_eq!(tools, vec!["slow", SYSTEM_FALLBACK_TOOL]);
        assert!(!execution.results[0].success);
        assert!(execution.results[1].success);
        assert_eq!(harness.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_speed_score() {
        assert_eq!(speed_score(0, 3000), 1.0);
        assert_eq!(speed_score(3000, 3000), 1.0);
        assert!((speed_score(4500, 3000) - 0.5).abs() < 1e-9);
        assert_eq!(speed_score(6000, 3000), 0.0);
        assert_eq!(speed_score(60_000, 3000), 0.0);
    }

    #[test]
    fn test_effectiveness_weights() {
        let results = vec![
            ToolExecutionResult::succeeded("quick_explainer", json!("ok"), 10),
            ToolExecutionResult::failed("b", "no", 10),
        ];
        let neutral = state();
        // 0.4 * 0.5 + 0.2 * 1.0 + 0.3 * 0.5 + 0.1 * 0.7
        assert!((effectiveness(&results, &neutral, 100, 3000) - 0.62).abs() < 1e-9);

        let mut upset = state();
        upset.sentiment.kind = SentimentType::Frustrated;
        let recovered = vec![
            ToolExecutionResult::failed("quick_explainer", "no", 10),
            ToolExecutionResult::succeeded(SYSTEM_FALLBACK_TOOL, json!("sorry"), 0),
        ];
        // 0.4 * 0.0 + 0.2 * 1.0 + 0.3 * 1.0 + 0.1 * 0.3
        assert!((effectiveness(&recovered, &upset, 100, 3000) - 0.53).abs() < 1e-9);
    }

    #[test]
    fn test_effectiveness_penalizes_unsuggested_tools() {
        let mut suggested = state();
        suggested.tooling.suggested_tool = Some("quick_explainer".into());
        assert!(suggested.tooling.current_tool_appropriate);
        let results = vec![
            ToolExecutionResult::succeeded("brainstormer", json!("ok"), 40),
            ToolExecutionResult::succeeded("writing_coach", json!("ok"), 40),
        ];
        // 0.4 * 1.0 + 0.2 * 1.0 + 0.3 * 0.0 + 0.1 * 0.7
        assert!((effectiveness(&results, &suggested, 100, 3000) - 0.67).abs() < 1e-9);

        let matched = vec![
            ToolExecutionResult::succeeded("quick_explainer", json!("ok"), 40),
            ToolExecutionResult::succeeded("writing_coach", json!("ok"), 40),
        ];
        // 0.4 * 1.0 + 0.2 * 1.0 + 0.3 * 0.5 + 0.1 * 0.7
        assert!((effectiveness(&matched, &suggested, 100, 3000) - 0.82).abs() < 1e-9);
    }

    #[test]
    fn test_effectiveness_without_real_tools() {
        let only_recovery = vec![ToolExecutionResult::succeeded(
            SYSTEM_FALLBACK_TOOL,
            json!("sorry"),
            0,
        )];
        // 0.2 * 1.0 + 0.1 * 0.7
        assert!((effectiveness(&only_recovery, &state(), 0, 3000) - 0.27).abs() < 1e-9);
    }
}
