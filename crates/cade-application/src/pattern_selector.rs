//! Orchestration pattern selection.
//!
//! Rules are evaluated in a fixed priority order and the first match wins:
//! intent change → handoff, depth change → chain, several intents in the raw
//! query → parallel, high frustration → fallback, otherwise a single-tool
//! handoff.

use cade_core::capability::catalog::{
    DIRECT_ANSWER, PRACTICAL_GUIDE, capability_for, depth_progression,
};
use cade_core::config::ExecutionConfig;
use cade_core::lexicon::detect_intents;
use cade_core::pattern::{OrchestrationPattern, PatternType};
use cade_core::state::ConversationState;
use serde_json::json;

/// Which rule produced a pattern; recorded in the pattern context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionRule {
    IntentChange,
    DepthChange,
    MultiIntent,
    HighFrustration,
    Default,
}

impl SelectionRule {
    pub fn as_str(self) -> &'static str {
        match self {
            SelectionRule::IntentChange => "intent_change",
            SelectionRule::DepthChange => "depth_change",
            SelectionRule::MultiIntent => "multi_intent",
            SelectionRule::HighFrustration => "high_frustration",
            SelectionRule::Default => "default",
        }
    }
}

pub struct PatternSelector {
    config: ExecutionConfig,
}

impl PatternSelector {
    pub fn new(config: ExecutionConfig) -> Self {
        Self { config }
    }

    /// Picks the pattern for this turn.
    ///
    /// `active_capability` is the capability that answered the previous turn;
    /// it stands in for the previous state's suggestion when that is missing.
    pub fn select(
        &self,
        current: &ConversationState,
        previous: Option<&ConversationState>,
        raw_query: &str,
        active_capability: Option<&str>,
    ) -> OrchestrationPattern {
        let suggested = current.suggested_capability().to_string();

        let (rule, pattern) = if let Some(prev) = previous.filter(|_| current.intent.changed) {
            let previous_tool = prev
                .tooling
                .suggested_tool
                .clone()
                .or_else(|| active_capability.map(str::to_string))
                .unwrap_or_else(|| {
                    capability_for(prev.intent.current, prev.depth.current).to_string()
                });
            let reason = format!(
                "Intent changed from {} to {}",
                prev.intent.current, current.intent.current
            );
            (
                SelectionRule::IntentChange,
                OrchestrationPattern::new(
                    PatternType::Handoff,
                    reason,
                    vec![previous_tool, suggested.clone()],
                ),
            )
        } else if let Some(prev) = previous.filter(|_| current.depth.change_indicator.is_some()) {
            let from = prev.depth.current;
            let to = current.depth.current;
            let tools = depth_progression(current.intent.current, from, to)
                .map(|names| names.into_iter().map(str::to_string).collect())
                .unwrap_or_else(|| vec![suggested.clone()]);
            (
                SelectionRule::DepthChange,
                OrchestrationPattern::new(
                    PatternType::Chain,
                    format!("Depth changed from {from} to {to}"),
                    tools,
                ),
            )
        } else {
            let intents = detect_intents(raw_query);
            if intents.len() > 1 {
                let tools = intents
                    .iter()
                    .map(|intent| capability_for(*intent, current.depth.current).to_string())
                    .collect();
                let names: Vec<String> = intents.iter().map(ToString::to_string).collect();
                (
                    SelectionRule::MultiIntent,
                    OrchestrationPattern::new(
                        PatternType::Parallel,
                        format!("Multiple intents detected: {}", names.join(", ")),
                        tools,
                    ),
                )
            } else if current.frustration() >= self.config.fallback_frustration_threshold {
                let mut tools = vec![
                    suggested.clone(),
                    DIRECT_ANSWER.to_string(),
                    PRACTICAL_GUIDE.to_string(),
                ];
                tools.truncate(self.config.max_fallback_tools.max(1));
                (
                    SelectionRule::HighFrustration,
                    OrchestrationPattern::new(
                        PatternType::Fallback,
                        format!("High frustration ({:.2})", current.frustration()),
                        tools,
                    ),
                )
            } else {
                (
                    SelectionRule::Default,
                    OrchestrationPattern::new(
                        PatternType::Handoff,
                        "Direct dispatch to the suggested capability",
                        vec![suggested.clone()],
                    ),
                )
            }
        };

        // Every rule lists at least the suggested capability, which is never empty.
        let pattern = pattern.unwrap_or_else(|| OrchestrationPattern {
            kind: PatternType::Handoff,
            reason: "Direct dispatch to the suggested capability".to_string(),
            tools: vec![suggested],
            context: Default::default(),
        });

        let pattern = pattern
            .with_context("rule", json!(rule.as_str()))
            .with_context("intent", json!(current.intent.current.to_string()))
            .with_context("depth", json!(current.depth.current.to_string()))
            .with_context("frustration", json!(current.frustration()));

        tracing::debug!(
            rule = rule.as_str(),
            pattern = %pattern.kind,
            tools = ?pattern.tools,
            "Selected orchestration pattern"
        );
        pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cade_core::state::{Depth, Intent};

    fn selector() -> PatternSelector {
        PatternSelector::new(ExecutionConfig::default())
    }

    fn state(intent: Intent, depth: Depth) -> ConversationState {
        ConversationState::initial(intent, depth, None)
    }

    #[test]
    fn test_default_is_single_tool_handoff() {
        let current = state(Intent::Understand, Depth::Surface);
        let pattern = selector().select(&current, None, "What is mitosis?", None);
        assert_eq!(pattern.kind, PatternType::Handoff);
        assert_eq!(pattern.tools, vec!["quick_explainer"]);
        assert_eq!(pattern.context["rule"], json!("default"));
    }

    #[test]
    fn test_intent_change_hands_off_from_previous_tool() {
        let mut previous = state(Intent::Understand, Depth::Surface);
        previous.tooling.suggested_tool = Some("quick_explainer".into());
        let mut current = state(Intent::Create, Depth::Surface);
        current.intent.changed = true;

        let pattern =
            selector().select(&current, Some(&previous), "Now help me write a poem", None);
        assert_eq!(pattern.kind, PatternType::Handoff);
        assert_eq!(pattern.tools, vec!["quick_explainer", "brainstormer"]);
    }

    #[test]
    fn test_intent_change_beats_high_frustration() {
        let previous = state(Intent::Understand, Depth::Surface);
        let mut current = state(Intent::Solve, Depth::Surface);
        current.intent.changed = true;
        current.sentiment.frustration_level = 0.9;

        let pattern = selector().select(&current, Some(&previous), "just solve it", None);
        assert_eq!(pattern.kind, PatternType::Handoff);
    }

    #[test]
    fn test_intent_change_uses_active_capability_when_no_suggestion() {
        let previous = state(Intent::Understand, Depth::Guided);
        let mut current = state(Intent::Create, Depth::Guided);
        current.intent.changed = true;

        let pattern =
            selector().select(&current, Some(&previous), "write it up", Some("deep_dive"));
        assert_eq!(pattern.tools, vec!["deep_dive", "writing_coach"]);
    }

    #[test]
    fn test_identical_handoff_tools_collapse() {
        let mut previous = state(Intent::Understand, Depth::Surface);
        previous.tooling.suggested_tool = Some("quick_explainer".into());
        let mut current = state(Intent::Understand, Depth::Surface);
        current.intent.changed = true;

        let pattern = selector().select(&current, Some(&previous), "hmm", None);
        assert_eq!(pattern.tools, vec!["quick_explainer"]);
    }

    #[test]
    fn test_depth_change_chains_progression() {
        let previous = state(Intent::Understand, Depth::Surface);
        let mut current = state(Intent::Understand, Depth::Deep);
        current.depth.change_indicator = Some("surface->deep".into());

        let pattern = selector().select(&current, Some(&previous), "go deeper", None);
        assert_eq!(pattern.kind, PatternType::Chain);
        assert_eq!(
            pattern.tools,
            vec!["quick_explainer", "concept_explorer", "deep_dive"]
        );
    }

    #[test]
    fn test_depth_change_without_progression_uses_single_tool() {
        let previous = state(Intent::Organize, Depth::Surface);
        let mut current = state(Intent::Organize, Depth::Guided);
        current.depth.change_indicator = Some("surface->guided".into());

        let pattern = selector().select(&current, Some(&previous), "plan it", None);
        assert_eq!(pattern.kind, PatternType::Chain);
        assert_eq!(pattern.tools, vec!["study_planner"]);
    }

    #[test]
    fn test_multiple_intents_run_in_parallel() {
        let current = state(Intent::Understand, Depth::Surface);
        let pattern = selector().select(
            &current,
            None,
            "Explain photosynthesis and then write a short poem about it",
            None,
        );
        assert_eq!(pattern.kind, PatternType::Parallel);
        assert_eq!(pattern.tools.len(), 2);
        assert!(pattern.tools.contains(&"quick_explainer".to_string()));
        assert!(pattern.tools.contains(&"brainstormer".to_string()));
    }

    #[test]
    fn test_high_frustration_falls_back() {
        let mut current = state(Intent::Solve, Depth::Guided);
        current.sentiment.frustration_level = 0.7;

        let pattern = selector().select(&current, None, "this still does not work", None);
        assert_eq!(pattern.kind, PatternType::Fallback);
        assert_eq!(
            pattern.tools,
            vec!["step_by_step_solver", DIRECT_ANSWER, PRACTICAL_GUIDE]
        );
    }

    #[test]
    fn test_fallback_respects_tool_cap() {
        let config = ExecutionConfig {
            max_fallback_tools: 2,
            ..ExecutionConfig::default()
        };
        let mut current = state(Intent::Solve, Depth::Guided);
        current.sentiment.frustration_level = 0.95;

        let pattern = PatternSelector::new(config).select(&current, None, "ugh", None);
        assert_eq!(pattern.tools.len(), 2);
    }
}
