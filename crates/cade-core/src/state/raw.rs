//! Lenient classifier output.
//!
//! Completion services return loosely-typed JSON. `RawConversationState`
//! accepts that shape (string enums, scores on either scale, optional
//! sections) and `validate` turns it into a `ConversationState` with every
//! enum checked and every score normalized to [0, 1].

use super::model::{
    ConversationState, Depth, DepthState, DynamicsState, Intent, IntentState, ProgressionPattern,
    SentimentState, SentimentType, ToolingState, TopicContinuity, normalize_unit_score,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StateValidationError {
    #[error("unknown {field} value '{value}'")]
    UnknownValue { field: &'static str, value: String },
    #[error("non-numeric {field} score")]
    NonFiniteScore { field: &'static str },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSentiment {
    #[serde(rename = "type", alias = "kind")]
    pub kind: String,
    #[serde(default, alias = "frustration_level")]
    pub frustration_level: Option<f64>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawIntent {
    pub current: String,
    #[serde(default)]
    pub changed: Option<bool>,
    #[serde(default, alias = "change_reason")]
    pub change_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDepth {
    pub current: String,
    #[serde(default)]
    pub requested: Option<String>,
    #[serde(default, alias = "change_indicator")]
    pub change_indicator: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTooling {
    #[serde(default, alias = "current_tool_appropriate")]
    pub current_tool_appropriate: Option<bool>,
    #[serde(default, alias = "suggested_tool")]
    pub suggested_tool: Option<String>,
    #[serde(default, alias = "switch_reason")]
    pub switch_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDynamics {
    #[serde(default, alias = "progression_pattern")]
    pub progression_pattern: Option<String>,
    #[serde(default, alias = "topic_continuity")]
    pub topic_continuity: Option<String>,
}

/// Classifier output before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConversationState {
    pub sentiment: RawSentiment,
    pub intent: RawIntent,
    pub depth: RawDepth,
    #[serde(default)]
    pub tooling: RawTooling,
    #[serde(default)]
    pub dynamics: RawDynamics,
}

fn parse_enum<T: FromStr>(field: &'static str, value: &str) -> Result<T, StateValidationError> {
    T::from_str(value.trim()).map_err(|_| StateValidationError::UnknownValue {
        field,
        value: value.to_string(),
    })
}

fn parse_optional<T: FromStr>(
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<T>, StateValidationError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => parse_enum(field, v).map(Some),
        None => Ok(None),
    }
}

fn score(
    field: &'static str,
    value: Option<f64>,
    default: f64,
) -> Result<f64, StateValidationError> {
    match value {
        Some(v) if !v.is_finite() => Err(StateValidationError::NonFiniteScore { field }),
        Some(v) => Ok(normalize_unit_score(v)),
        None => Ok(default),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl RawConversationState {
    /// Validates enums and normalizes scores.
    ///
    /// The returned state carries the classifier's own view only: the turn
    /// counter is set to 1 and change flags are taken verbatim. Multi-turn
    /// bookkeeping against the previous state is the caller's job.
    pub fn validate(self) -> Result<ConversationState, StateValidationError> {
        let sentiment = SentimentState {
            kind: parse_enum::<SentimentType>("sentiment.type", &self.sentiment.kind)?,
            frustration_level: score(
                "sentiment.frustrationLevel",
                self.sentiment.frustration_level,
                0.0,
            )?,
            confidence: score("sentiment.confidence", self.sentiment.confidence, 0.5)?,
        };

        let intent = IntentState {
            current: parse_enum::<Intent>("intent.current", &self.intent.current)?,
            changed: self.intent.changed.unwrap_or(false),
            change_reason: non_empty(self.intent.change_reason),
        };

        let depth = DepthState {
            current: parse_enum::<Depth>("depth.current", &self.depth.current)?,
            requested: parse_optional::<Depth>("depth.requested", self.depth.requested.as_deref())?,
            change_indicator: non_empty(self.depth.change_indicator),
        };

        let tooling = ToolingState {
            current_tool_appropriate: self.tooling.current_tool_appropriate.unwrap_or(true),
            suggested_tool: non_empty(self.tooling.suggested_tool),
            switch_reason: non_empty(self.tooling.switch_reason),
        };

        let dynamics = DynamicsState {
            turns_at_current_depth: 1,
            progression_pattern: parse_optional::<ProgressionPattern>(
                "dynamics.progressionPattern",
                self.dynamics.progression_pattern.as_deref(),
            )?
            .unwrap_or(ProgressionPattern::Exploring),
            topic_continuity: parse_optional::<TopicContinuity>(
                "dynamics.topicContinuity",
                self.dynamics.topic_continuity.as_deref(),
            )?
            .unwrap_or(TopicContinuity::Same),
        };

        Ok(ConversationState {
            sentiment,
            intent,
            depth,
            tooling,
            dynamics,
        })
    }
}
