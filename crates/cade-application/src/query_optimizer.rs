//! Cheap pre-dispatch hints.
//!
//! `QueryOptimizer::analyze` decides, without any external call, whether a
//! turn can skip context rewriting and retrieval, and whether a recent
//! response for the same (message, last two turns) fingerprint can be
//! served from cache. Hints are advisory.

use cade_core::cache::CacheStore;
use cade_core::capability::catalog::requires_retrieval;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Words that make a message depend on earlier turns.
const REFERENTIAL_WORDS: &[&str] = &[
    "it", "this", "that", "these", "those", "they", "them", "above", "previous", "earlier",
];
const EXPLICIT_MESSAGE_WORDS: usize = 12;
const ACKNOWLEDGMENT_MAX_WORDS: usize = 4;

pub const OP_STATE_CLASSIFICATION: &str = "state_classification";
pub const OP_RETRIEVAL: &str = "retrieval";

static SELF_CONTAINED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*((what|who|when|where|which)\s+(is|are|was|were|does|did)\b|define\b|definition of\b|meaning of\b)",
    )
    .expect("self-contained question regex should compile")
});

static ACKNOWLEDGMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(thanks|thank you|thx|ok|okay|got it|cool|great|nice|yes|yep|no|nope|sure|alright)\b",
    )
    .expect("acknowledgment regex should compile")
});

static META_UTTERANCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(hi|hello|hey|good (morning|afternoon|evening)|bye|goodbye|see you|can you repeat( that)?|say that again|what did you (mean|say)|never ?mind|let's (stop|pause|continue))\b",
    )
    .expect("meta utterance regex should compile")
});

/// Input to the optimizer for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub message: String,
    /// Content of the most recent turns before this message, oldest first.
    pub recent_turns: Vec<String>,
    pub requested_capability: Option<String>,
}

impl QueryRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            recent_turns: Vec::new(),
            requested_capability: None,
        }
    }

    pub fn with_recent_turns(mut self, turns: Vec<String>) -> Self {
        self.recent_turns = turns;
        self
    }

    pub fn with_requested_capability(mut self, capability: Option<String>) -> Self {
        self.requested_capability = capability;
        self
    }

    /// Cache key: the normalized message plus the normalized last two turns.
    pub fn fingerprint(&self) -> String {
        let start = self.recent_turns.len().saturating_sub(2);
        let mut parts = vec![normalize(&self.message)];
        parts.extend(self.recent_turns[start..].iter().map(|t| normalize(t)));
        parts.join("\u{1f}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptimization {
    pub skip_context_rewrite: bool,
    pub skip_retrieval: bool,
    pub use_cache: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_response: Option<String>,
    pub parallelizable_ops: Vec<String>,
    pub reasoning: String,
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .trim_end_matches(['?', '!', '.', ' '])
        .to_string()
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn has_referential_word(text: &str) -> bool {
    words(text)
        .iter()
        .any(|w| REFERENTIAL_WORDS.contains(&w.as_str()))
}

fn is_acknowledgment(text: &str) -> bool {
    ACKNOWLEDGMENT_RE.is_match(text) && words(text).len() <= ACKNOWLEDGMENT_MAX_WORDS
}

pub struct QueryOptimizer {
    responses: Arc<dyn CacheStore<String>>,
    ttl: Duration,
}

impl QueryOptimizer {
    pub fn new(responses: Arc<dyn CacheStore<String>>, ttl: Duration) -> Self {
        Self { responses, ttl }
    }

    pub fn cache_size(&self) -> usize {
        self.responses.len()
    }

    pub fn analyze(&self, request: &QueryRequest) -> QueryOptimization {
        let message = request.message.trim();
        let has_context = !request.recent_turns.is_empty();
        let referential = has_referential_word(message);
        let mut reasons: Vec<&str> = Vec::new();

        let skip_context_rewrite = if !has_context {
            reasons.push("no prior context");
            true
        } else if SELF_CONTAINED_RE.is_match(message) && !referential {
            reasons.push("self-contained question");
            true
        } else if is_acknowledgment(message) {
            reasons.push("short acknowledgment");
            true
        } else if words(message).len() >= EXPLICIT_MESSAGE_WORDS && !referential {
            reasons.push("long explicit message");
            true
        } else {
            reasons.push("refers to earlier turns");
            false
        };

        let skip_retrieval = if META_UTTERANCE_RE.is_match(message) || is_acknowledgment(message) {
            reasons.push("conversational utterance");
            true
        } else if request
            .requested_capability
            .as_deref()
            .is_some_and(|c| !requires_retrieval(c))
        {
            reasons.push("capability answers without retrieval");
            true
        } else {
            false
        };

        let cached_response = self.responses.get(&request.fingerprint());
        let use_cache = cached_response.is_some();
        if use_cache {
            reasons.push("cached response available");
        }

        let mut parallelizable_ops = Vec::new();
        if has_context {
            parallelizable_ops.push(OP_STATE_CLASSIFICATION.to_string());
        }
        if !skip_retrieval && skip_context_rewrite {
            parallelizable_ops.push(OP_RETRIEVAL.to_string());
        }

        QueryOptimization {
            skip_context_rewrite,
            skip_retrieval,
            use_cache,
            cached_response,
            parallelizable_ops,
            reasoning: reasons.join("; "),
        }
    }

    /// Stores the final response for the request's fingerprint.
    pub fn record_response(&self, request: &QueryRequest, response: &str) {
        self.responses
            .set(&request.fingerprint(), response.to_string(), self.ttl);
    }
}
