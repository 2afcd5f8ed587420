//! Per-session dispatch context.

use crate::pattern::OrchestrationPattern;
use crate::state::ConversationState;
use serde::{Deserialize, Serialize};

/// Mutable dispatch state scoped to one session.
///
/// The dispatch engine keeps one of these per session id and hands it
/// explicitly to each turn. Nothing here is shared between sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub session_id: String,
    /// The state classified on the most recent turn.
    #[serde(default)]
    pub previous_state: Option<ConversationState>,
    /// The capability that produced the most recent successful response.
    #[serde(default)]
    pub active_capability: Option<String>,
    #[serde(default)]
    pub turn_count: u64,
    #[serde(default)]
    pub last_pattern: Option<OrchestrationPattern>,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            previous_state: None,
            active_capability: None,
            turn_count: 0,
            last_pattern: None,
        }
    }

    /// Records the outcome of a completed turn.
    ///
    /// `active_capability` is only replaced when the turn produced a
    /// successful capability.
    pub fn record_turn(
        &mut self,
        state: ConversationState,
        pattern: Option<OrchestrationPattern>,
        active_capability: Option<String>,
    ) {
        self.previous_state = Some(state);
        if active_capability.is_some() {
            self.active_capability = active_capability;
        }
        if pattern.is_some() {
            self.last_pattern = pattern;
        }
        self.turn_count += 1;
    }
}
