//! Conversation state domain model.
//!
//! A `ConversationState` is the structured, per-turn classification of a
//! conversation: how the user feels, what they are trying to do, how much
//! depth they want, whether the active capability still fits, and how the
//! conversation has been moving across turns.

use crate::capability::catalog::capability_for;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Overall sentiment of the latest user turn.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SentimentType {
    Positive,
    Neutral,
    Confused,
    Frustrated,
    Disengaged,
}

impl SentimentType {
    /// Contribution of this sentiment to the effectiveness score.
    pub fn effectiveness_weight(self) -> f64 {
        match self {
            SentimentType::Positive => 1.0,
            SentimentType::Neutral => 0.7,
            _ => 0.3,
        }
    }

    /// Whether this sentiment signals distress worth escalating.
    pub fn is_distressed(self) -> bool {
        matches!(self, SentimentType::Frustrated | SentimentType::Disengaged)
    }
}

/// The learning intent behind a user turn.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Intent {
    Understand,
    Create,
    Solve,
    Evaluate,
    Organize,
    Regulate,
    Explore,
    Interact,
}

/// Desired engagement depth.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Depth {
    Surface,
    Guided,
    Deep,
}

impl Depth {
    /// Position of this depth on the surface → deep axis.
    pub fn rank(self) -> usize {
        match self {
            Depth::Surface => 0,
            Depth::Guided => 1,
            Depth::Deep => 2,
        }
    }
}

/// How the conversation has been moving over recent turns.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ProgressionPattern {
    Exploring,
    Deepening,
    Surfacing,
    Stuck,
}

/// Whether the latest turn continues the previous topic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum TopicContinuity {
    Same,
    Related,
    New,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentState {
    #[serde(rename = "type")]
    pub kind: SentimentType,
    /// Normalized to [0, 1].
    pub frustration_level: f64,
    /// Normalized to [0, 1].
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentState {
    pub current: Intent,
    pub changed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthState {
    pub current: Depth,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested: Option<Depth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_indicator: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolingState {
    pub current_tool_appropriate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicsState {
    pub turns_at_current_depth: u32,
    pub progression_pattern: ProgressionPattern,
    pub topic_continuity: TopicContinuity,
}

/// The structured classification of a conversation at one turn.
///
/// One state is produced per turn. The dispatcher keeps exactly the most
/// recent one per session as "previous" for comparison on the next turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    pub sentiment: SentimentState,
    pub intent: IntentState,
    pub depth: DepthState,
    pub tooling: ToolingState,
    pub dynamics: DynamicsState,
}

impl ConversationState {
    /// Builds a neutral first-turn state for the given intent and depth.
    pub fn initial(intent: Intent, depth: Depth, suggested_tool: Option<String>) -> Self {
        Self {
            sentiment: SentimentState {
                kind: SentimentType::Neutral,
                frustration_level: 0.0,
                confidence: 0.5,
            },
            intent: IntentState {
                current: intent,
                changed: false,
                change_reason: None,
            },
            depth: DepthState {
                current: depth,
                requested: None,
                change_indicator: None,
            },
            tooling: ToolingState {
                current_tool_appropriate: true,
                suggested_tool,
                switch_reason: None,
            },
            dynamics: DynamicsState {
                turns_at_current_depth: 1,
                progression_pattern: ProgressionPattern::Exploring,
                topic_continuity: TopicContinuity::New,
            },
        }
    }

    pub fn frustration(&self) -> f64 {
        self.sentiment.frustration_level
    }

    /// The capability this state asks for: its suggestion, else the matrix entry.
    pub fn suggested_capability(&self) -> &str {
        self.tooling
            .suggested_tool
            .as_deref()
            .unwrap_or_else(|| capability_for(self.intent.current, self.depth.current))
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::initial(Intent::Understand, Depth::Surface, None)
    }
}

/// Normalizes a raw classifier score into [0, 1].
///
/// Values above 1 are treated as coming from a 0–10 scale and divided by 10;
/// the result is clamped. Non-finite input maps to 0.
pub fn normalize_unit_score(raw: f64) -> f64 {
    if !raw.is_finite() {
        return 0.0;
    }
    let scaled = if raw > 1.0 { raw / 10.0 } else { raw };
    scaled.clamp(0.0, 1.0)
}

/// Computes the turn counter for a newly classified depth.
///
/// The counter increments while the depth stays the same and resets to 1 on
/// any change (or when there is no previous state).
pub fn next_turns_at_depth(previous: Option<&ConversationState>, current: Depth) -> u32 {
    match previous {
        Some(prev) if prev.depth.current == current => {
            prev.dynamics.turns_at_current_depth.saturating_add(1)
        }
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_normalize_within_unit_range_is_identity() {
        for x in [0.0, 0.25, 0.5, 0.7, 1.0] {
            assert_eq!(normalize_unit_score(x), x);
        }
    }

    #[test]
    fn test_normalize_ten_point_scale() {
        assert!((normalize_unit_score(7.0) - 0.7).abs() < 1e-9);
        assert!((normalize_unit_score(10.0) - 1.0).abs() < 1e-9);
        assert!((normalize_unit_score(1.5) - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_clamps_out_of_range() {
        assert_eq!(normalize_unit_score(-3.0), 0.0);
        assert_eq!(normalize_unit_score(42.0), 1.0);
        assert_eq!(normalize_unit_score(f64::NAN), 0.0);
        assert_eq!(normalize_unit_score(f64::INFINITY), 0.0);
    }

    #[test]
    fn test_normalize_is_not_scale_invariant() {
        assert_ne!(normalize_unit_score(0.5), normalize_unit_score(5.0 * 10.0));
    }

    #[test]
    fn test_turn_counter_increments_on_same_depth() {
        let mut prev = ConversationState::initial(Intent::Solve, Depth::Guided, None);
        prev.dynamics.turns_at_current_depth = 3;
        assert_eq!(next_turns_at_depth(Some(&prev), Depth::Guided), 4);
    }

    #[test]
    fn test_turn_counter_resets_on_depth_change() {
        let mut prev = ConversationState::initial(Intent::Solve, Depth::Guided, None);
        prev.dynamics.turns_at_current_depth = 3;
        assert_eq!(next_turns_at_depth(Some(&prev), Depth::Deep), 1);
        assert_eq!(next_turns_at_depth(None, Depth::Deep), 1);
    }

    #[test]
    fn test_enum_parsing_is_case_insensitive() {
        assert_eq!(Intent::from_str("Understand").unwrap(), Intent::Understand);
        assert_eq!(Depth::from_str("DEEP").unwrap(), Depth::Deep);
        assert_eq!(
            SentimentType::from_str("frustrated").unwrap(),
            SentimentType::Frustrated
        );
        assert!(Intent::from_str("dance").is_err());
    }

    #[test]
    fn test_suggested_capability_prefers_suggestion() {
        let state = ConversationState::initial(Intent::Understand, Depth::Surface, None);
        assert_eq!(state.suggested_capability(), "quick_explainer");

        let state = ConversationState::initial(
            Intent::Understand,
            Depth::Surface,
            Some("writing_coach".into()),
        );
        assert_eq!(state.suggested_capability(), "writing_coach");
    }

    #[test]
    fn test_state_serializes_camel_case() {
        let state = ConversationState::initial(Intent::Create, Depth::Deep, Some("x".into()));
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["sentiment"]["type"], "neutral");
        assert_eq!(json["sentiment"]["frustrationLevel"], 0.0);
        assert_eq!(json["intent"]["current"], "create");
        assert_eq!(json["tooling"]["suggestedTool"], "x");
        assert_eq!(json["dynamics"]["turnsAtCurrentDepth"], 1);
    }
}
