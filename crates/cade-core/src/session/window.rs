//! Bounded view of a conversation history.

use super::message::{ConversationMessage, MessageRole};
use serde::{Deserialize, Serialize};

const SUMMARY_SNIPPET_CHARS: usize = 80;

/// The slice of history handed to classifiers.
///
/// Holds the most recent messages verbatim. Once the history grows past the
/// summary threshold, the older user messages are condensed into `summary`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationWindow {
    pub summary: Option<String>,
    pub recent: Vec<ConversationMessage>,
}

impl ConversationWindow {
    pub fn build(history: &[ConversationMessage], recent: usize, summary_threshold: usize) -> Self {
        let split = history.len().saturating_sub(recent);
        let (older, tail) = history.split_at(split);

        let summary = if history.len() > summary_threshold {
            let topics: Vec<String> = older
                .iter()
                .filter(|m| m.role == MessageRole::User)
                .map(|m| truncate_chars(m.content.trim(), SUMMARY_SNIPPET_CHARS))
                .filter(|s| !s.is_empty())
                .collect();
            (!topics.is_empty())
                .then(|| format!("Earlier the user asked about: {}", topics.join("; ")))
        } else {
            None
        };

        Self {
            summary,
            recent: tail.to_vec(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.summary.is_none() && self.recent.is_empty()
    }

    /// Content of the last `n` messages, oldest first.
    pub fn trailing_contents(&self, n: usize) -> Vec<&str> {
        let start = self.recent.len().saturating_sub(n);
        self.recent[start..].iter().map(|m| m.content.as_str()).collect()
    }

    pub fn has_prior_user_turn(&self) -> bool {
        self.summary.is_some() || self.recent.iter().any(ConversationMessage::is_user)
    }

    pub fn last_user_message(&self) -> Option<&ConversationMessage> {
        self.recent.iter().rev().find(|m| m.is_user())
    }
}

/// Truncates to at most `max` characters on a char boundary, appending an ellipsis.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(n: usize) -> Vec<ConversationMessage> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    ConversationMessage::user(format!("question {i}"))
                } else {
                    ConversationMessage::assistant(format!("answer {i}"))
                }
            })
            .collect()
    }

    #[test]
    fn test_short_history_has_no_summary() {
        let window = ConversationWindow::build(&history(4), 6, 10);
        assert_eq!(window.recent.len(), 4);
        assert!(window.summary.is_none());
    }

    #[test]
    fn test_long_history_is_summarized() {
        let window = ConversationWindow::build(&history(12), 6, 10);
        assert_eq!(window.recent.len(), 6);
        assert_eq!(window.recent[0].content, "question 6");
        let summary = window.summary.expect("summary expected");
        assert!(summary.contains("question 0"));
        assert!(summary.contains("question 4"));
        assert!(!summary.contains("answer"));
    }

    #[test]
    fn test_trailing_contents() {
        let window = ConversationWindow::build(&history(5), 6, 10);
        assert_eq!(window.trailing_contents(2), vec!["answer 3", "question 4"]);
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo…");
        assert_eq!(truncate_chars("short", 10), "short");
    }
}
