//! Session store trait.
//!
//! Defines the boundary between the dispatch engine and whatever persists
//! conversation messages.

use super::message::ConversationMessage;
use crate::error::Result;
use async_trait::async_trait;

/// An abstract store for conversation messages, keyed by session id.
///
/// Implementations must tolerate concurrent calls for different sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the messages of a session, oldest first.
    ///
    /// Unknown sessions yield an empty list.
    async fn get_messages(&self, session_id: &str) -> Result<Vec<ConversationMessage>>;

    /// Appends a message to a session, creating the session if needed.
    async fn append_message(&self, session_id: &str, message: ConversationMessage) -> Result<()>;
}
