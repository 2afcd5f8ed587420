//! Session domain module.
//!
//! # Module Structure
//!
//! - `message`: Conversation message types (`MessageRole`, `ConversationMessage`)
//! - `window`: Recent-message window handed to classifiers
//! - `context`: Per-session dispatch context (`SessionContext`)
//! - `repository`: Session store trait

mod context;
mod message;
mod repository;
mod window;

pub use context::SessionContext;
pub use message::{ConversationMessage, MessageRole};
pub use repository::SessionStore;
pub use window::{ConversationWindow, truncate_chars};
