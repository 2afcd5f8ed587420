//! Deterministic query contextualization.
//!
//! Follow-ups such as "can you explain that more?" say nothing on their own.
//! When a message leans on earlier turns, the last user message is appended
//! so the capability sees what "that" refers to.

use cade_core::session::{ConversationWindow, truncate_chars};
use once_cell::sync::Lazy;
use regex::Regex;

const MAX_CONTEXT_CHARS: usize = 200;

static REFERENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(it|this|that|these|those|they|them|above|previous|earlier)\b")
        .expect("reference regex should compile")
});

/// Rewrites `message` with context from `window` when it refers back.
///
/// Returns the message unchanged when it has no referential words or there
/// is no earlier user turn to draw from.
pub fn contextualize(message: &str, window: &ConversationWindow) -> String {
    if !REFERENCE_RE.is_match(message) {
        return message.to_string();
    }
    let Some(last) = window.last_user_message() else {
        return message.to_string();
    };
    if last.content.trim() == message.trim() {
        return message.to_string();
    }
    format!(
        "{}\n\n(Context: previously asked \"{}\")",
        message,
        truncate_chars(last.content.trim(), MAX_CONTEXT_CHARS)
    )
}
