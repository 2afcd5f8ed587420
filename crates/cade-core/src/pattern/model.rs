//! Orchestration pattern domain model.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use strum::{AsRefStr, Display, EnumString};

/// Tool name used for the synthetic result appended when every fallback tool fails.
pub const SYSTEM_FALLBACK_TOOL: &str = "system_fallback";

/// Response given when no capability produced anything usable.
pub const RECOVERY_MESSAGE: &str = "I'm having trouble with that. Let me try a different approach.";

/// Execution strategy for dispatching a turn to one or more capabilities.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PatternType {
    /// Sequential handoff; stops after the first success.
    Handoff,
    /// Pipelined steps, each feeding the next.
    Chain,
    /// Concurrent fan-out with an ordered join.
    Parallel,
    /// Ordered attempts until one succeeds.
    Fallback,
}

/// The execution plan for a single turn.
///
/// Created fresh each turn by the pattern selector and consumed once by the
/// pattern executor. `tools` is never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationPattern {
    #[serde(rename = "type")]
    pub kind: PatternType,
    pub reason: String,
    pub tools: Vec<String>,
    #[serde(default)]
    pub context: HashMap<String, Value>,
}

impl OrchestrationPattern {
    /// Builds a pattern, de-duplicating tools while preserving their order.
    ///
    /// Returns `None` if no tool names remain.
    pub fn new(kind: PatternType, reason: impl Into<String>, tools: Vec<String>) -> Option<Self> {
        let mut unique: Vec<String> = Vec::with_capacity(tools.len());
        for tool in tools {
            let tool = tool.trim().to_string();
            if !tool.is_empty() && !unique.contains(&tool) {
                unique.push(tool);
            }
        }
        if unique.is_empty() {
            return None;
        }
        Some(Self {
            kind,
            reason: reason.into(),
            tools: unique,
            context: HashMap::new(),
        })
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// The first tool in the plan.
    pub fn primary_tool(&self) -> &str {
        // `new` guarantees at least one tool.
        self.tools.first().map(String::as_str).unwrap_or_default()
    }
}

/// Outcome of a single capability invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecutionResult {
    pub tool: String,
    pub result: Option<Value>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<HashMap<String, Value>>,
}

impl ToolExecutionResult {
    pub fn succeeded(tool: impl Into<String>, result: Value, execution_time_ms: u64) -> Self {
        Self {
            tool: tool.into(),
            result: Some(result),
            success: true,
            error: None,
            execution_time_ms,
            context: None,
        }
    }

    pub fn failed(
        tool: impl Into<String>,
        error: impl Into<String>,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            tool: tool.into(),
            result: None,
            success: false,
            error: Some(error.into()),
            execution_time_ms,
            context: None,
        }
    }

    pub fn with_context(mut self, context: HashMap<String, Value>) -> Self {
        self.context = Some(context);
        self
    }

    /// Extracts the textual output of a successful result.
    pub fn output_text(&self) -> Option<String> {
        self.result.as_ref().map(payload_text)
    }
}

/// Renders a capability payload as text.
///
/// Strings are returned as-is; objects yield the first string found under
/// `text`, `content`, `response` or `answer`; anything else is compact JSON.
pub fn payload_text(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        Value::Object(map) => ["text", "content", "response", "answer"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| payload.to_string()),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// The results of executing one pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternExecution {
    pub results: Vec<ToolExecutionResult>,
    /// Weighted score in [0, 1].
    pub effectiveness: f64,
    pub total_time_ms: u64,
}

impl PatternExecution {
    pub fn successes(&self) -> impl Iterator<Item = &ToolExecutionResult> {
        self.results.iter().filter(|r| r.success)
    }

    pub fn any_success(&self) -> bool {
        self.results.iter().any(|r| r.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_pattern_dedupes_and_rejects_empty() {
        let pattern = OrchestrationPattern::new(
            PatternType::Fallback,
            "frustrated",
            vec!["a".into(), "b".into(), "a".into(), " ".into()],
        )
        .unwrap();
        assert_eq!(pattern.tools, vec!["a", "b"]);
        assert_eq!(pattern.primary_tool(), "a");

        assert!(OrchestrationPattern::new(PatternType::Handoff, "none", vec![]).is_none());
    }

    #[test]
    fn test_payload_text_extraction() {
        assert_eq!(payload_text(&json!("plain")), "plain");
        assert_eq!(payload_text(&json!({"content": "body", "x": 1})), "body");
        assert_eq!(payload_text(&json!({"answer": "42"})), "42");
        assert_eq!(payload_text(&json!({"n": 1})), r#"{"n":1}"#);
        assert_eq!(payload_text(&Value::Null), "");
    }

    #[test]
    fn test_pattern_type_serializes_snake_case() {
        let pattern =
            OrchestrationPattern::new(PatternType::Parallel, "multi", vec!["x".into()]).unwrap();
        let json = serde_json::to_value(&pattern).unwrap();
        assert_eq!(json["type"], "parallel");
        assert_eq!(PatternType::Handoff.to_string(), "handoff");
    }
}
