//! Keyword lexicon for deterministic classification.
//!
//! Used wherever a language-model call is unavailable or too expensive:
//! first-turn fallback routing, heuristic conversation states, multi-intent
//! detection and the giving-up quick check.

use crate::state::{Depth, Intent, SentimentType};
use once_cell::sync::Lazy;
use regex::Regex;

static INTENT_PATTERNS: Lazy<Vec<(Intent, Regex)>> = Lazy::new(|| {
    let table: [(Intent, &str); 8] = [
        (
            Intent::Understand,
            r"(?i)\b(what (is|are|was|were|does)|explain|why (is|are|do|does)|how does|meaning of|define|definition of)\b",
        ),
        (
            Intent::Create,
            r"(?i)\b(write|create|make|draft|design|compose|build|generate|come up with)\b",
        ),
        (
            Intent::Solve,
            r"(?i)\b(solve|calculate|compute|fix|debug|how (do|can) i|figure out|answer to)\b",
        ),
        (
            Intent::Evaluate,
            r"(?i)\b(review|evaluate|check my|grade|assess|feedback on|critique|is this (correct|right))\b",
        ),
        (
            Intent::Organize,
            r"(?i)\b(organi[sz]e|plan my|study plan|schedule|summari[sz]e|outline|prioriti[sz]e|timeline)\b",
        ),
        (
            Intent::Regulate,
            r"(?i)\b(stressed|anxious|overwhelmed|unmotivated|motivation|burn(ed|t)? out|can't focus|so tired)\b",
        ),
        (
            Intent::Explore,
            r"(?i)\b(explore|curious|i wonder|what if|tell me (more )?about|learn (more )?about)\b",
        ),
        (
            Intent::Interact,
            r"(?i)(^\s*(hi|hello|hey)\b|\b(chat with me|let's (talk|discuss)|role ?play|debate|pretend)\b)",
        ),
    ];
    table
        .into_iter()
        .map(|(intent, pattern)| {
            (
                intent,
                Regex::new(pattern).expect("intent regex should compile"),
            )
        })
        .collect()
});

static DEEP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(in[- ]depth|in detail|detailed|deep dive|thoroughly|comprehensive|advanced|rigorous|everything about)\b",
    )
    .expect("deep depth regex should compile")
});

static GUIDED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(step[- ]by[- ]step|walk me through|guide me|help me understand|show me how|give me a hint|hints)\b",
    )
    .expect("guided depth regex should compile")
});

static SURFACE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(quick(ly)?|brief(ly)?|short answer|tl;?dr|in a nutshell|simply put)\b")
        .expect("surface depth regex should compile")
});

static GIVING_UP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(i give up|i('m| am) giving up|i quit|this is (impossible|hopeless|pointless)|i can('t|not) do this|i('m| am) done with this|nothing (works|makes sense))\b",
    )
    .expect("giving-up regex should compile")
});

static FRUSTRATED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(frustrat\w*|annoy\w*|makes no sense|doesn't make sense|still (don't|do not) get|ugh+|hate this|waste of time|useless)\b",
    )
    .expect("frustration regex should compile")
});

static CONFUSED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(\b(confus\w*|(don't|do not) understand|i'm lost|unclear|what do you mean|huh)\b|\?\?)",
    )
    .expect("confusion regex should compile")
});

static POSITIVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(thanks|thank you|great|awesome|got it|makes sense|love (it|this)|perfect)\b")
        .expect("positive regex should compile")
});

static DISENGAGED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(ok|k|fine|whatever|sure|meh|idk)\s*[.!]?\s*$")
        .expect("disengaged regex should compile")
});

fn normalize_quotes(text: &str) -> String {
    text.replace(['\u{2019}', '\u{2018}'], "'")
}

/// Intents mentioned in `text`, ordered by where they first appear.
pub fn detect_intents(text: &str) -> Vec<Intent> {
    let text = normalize_quotes(text);
    let mut hits: Vec<(usize, Intent)> = INTENT_PATTERNS
        .iter()
        .filter_map(|(intent, re)| re.find(&text).map(|m| (m.start(), *intent)))
        .collect();
    hits.sort_by_key(|(pos, intent)| (*pos, *intent));
    hits.into_iter().map(|(_, intent)| intent).collect()
}

/// Explicit depth markers in `text`, if any. Deep wins over guided over surface.
pub fn detect_depth(text: &str) -> Option<Depth> {
    if DEEP_RE.is_match(text) {
        Some(Depth::Deep)
    } else if GUIDED_RE.is_match(text) {
        Some(Depth::Guided)
    } else if SURFACE_RE.is_match(text) {
        Some(Depth::Surface)
    } else {
        None
    }
}

/// Very-high-confidence giving-up language.
pub fn is_giving_up(text: &str) -> bool {
    GIVING_UP_RE.is_match(&normalize_quotes(text))
}

/// Heuristic sentiment and frustration estimate on the [0, 1] scale.
pub fn detect_sentiment(text: &str) -> (SentimentType, f64) {
    let text = normalize_quotes(text);
    if GIVING_UP_RE.is_match(&text) {
        (SentimentType::Frustrated, 0.9)
    } else if FRUSTRATED_RE.is_match(&text) {
        (SentimentType::Frustrated, 0.7)
    } else if CONFUSED_RE.is_match(&text) {
        (SentimentType::Confused, 0.4)
    } else if DISENGAGED_RE.is_match(&text) {
        (SentimentType::Disengaged, 0.3)
    } else if POSITIVE_RE.is_match(&text) {
        (SentimentType::Positive, 0.0)
    } else {
        (SentimentType::Neutral, 0.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_single_intent() {
        assert_eq!(detect_intents("What is mitosis?"), vec![Intent::Understand]);
        assert_eq!(detect_intents("Can you solve 3x + 2 = 11"), vec![Intent::Solve]);
        assert!(detect_intents("mitosis").is_empty());
    }

    #[test]
    fn test_detect_multiple_intents_in_order() {
        let intents = detect_intents("Write a haiku and then explain photosynthesis");
        assert_eq!(intents, vec![Intent::Create, Intent::Understand]);
    }

    #[test]
    fn test_detect_depth_markers() {
        assert_eq!(detect_depth("explain it in depth"), Some(Depth::Deep));
        assert_eq!(detect_depth("walk me through it"), Some(Depth::Guided));
        assert_eq!(detect_depth("quick answer please"), Some(Depth::Surface));
        assert_eq!(detect_depth("What is mitosis?"), None);
    }

    #[test]
    fn test_giving_up_triggers() {
        assert!(is_giving_up("I give up, this is impossible"));
        assert!(is_giving_up("honestly I can\u{2019}t do this"));
        assert!(!is_giving_up("I will not give an update"));
    }

    #[test]
    fn test_detect_sentiment() {
        assert_eq!(detect_sentiment("ugh this makes no sense").0, SentimentType::Frustrated);
        assert_eq!(detect_sentiment("I'm confused about step 2").0, SentimentType::Confused);
        assert_eq!(detect_sentiment("ok").0, SentimentType::Disengaged);
        assert_eq!(detect_sentiment("thanks, that helps").0, SentimentType::Positive);
        assert_eq!(detect_sentiment("what about enzymes").0, SentimentType::Neutral);
    }
}
