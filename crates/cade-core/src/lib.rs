//! Domain model for the conversation-aware dispatch engine.
//!
//! This crate has no I/O of its own. It defines the conversation state, the
//! orchestration patterns, the session context, and the contracts the
//! engine's collaborators implement (capabilities, completion services,
//! session stores and cache stores).

pub mod cache;
pub mod capability;
pub mod completion;
pub mod config;
pub mod error;
pub mod lexicon;
pub mod pattern;
pub mod session;
pub mod state;

// Re-export common error type
pub use error::{CadeError, Result};
