//! Conversation state domain module.
//!
//! # Module Structure
//!
//! - `model`: `ConversationState` and its component enums
//! - `raw`: lenient classifier output and its validation into a state

mod model;
mod raw;

pub use model::{
    ConversationState, Depth, DepthState, DynamicsState, Intent, IntentState, ProgressionPattern,
    SentimentState, SentimentType, ToolingState, TopicContinuity, next_turns_at_depth,
    normalize_unit_score,
};
pub use raw::{
    RawConversationState, RawDepth, RawDynamics, RawIntent, RawSentiment, RawTooling,
    StateValidationError,
};
