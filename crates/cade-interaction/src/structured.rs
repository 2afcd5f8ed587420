//! Parsing of structured completion output.
//!
//! Completions are asked for bare JSON. Strict parsing is tried first; a
//! best-effort extraction of the first JSON object from fenced or chatty
//! text is the only fallback.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;

static FENCED_JSON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```")
        .expect("fenced json regex should compile")
});

/// Parses `text` as `T`, tolerating code fences and surrounding prose.
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T, String> {
    let trimmed = text.trim();
    let strict_err = match serde_json::from_str::<T>(trimmed) {
        Ok(value) => return Ok(value),
        Err(err) => err.to_string(),
    };

    let candidate = extract_json_object(trimmed)
        .ok_or_else(|| format!("no JSON object in completion output ({strict_err})"))?;
    serde_json::from_str::<T>(candidate)
        .map_err(|err| format!("malformed JSON object in completion output: {err}"))
}

/// Locates the first JSON object inside `text`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    if let Some(captures) = FENCED_JSON_RE.captures(text) {
        return captures.get(1).map(|m| m.as_str());
    }

    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
