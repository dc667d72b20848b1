//! Follow-up question extraction.
//!
//! Providers are asked for a bare JSON array but routinely wrap it in prose.
//! The first well-formed `["...", "..."]` array is located by pattern and
//! parsed; anything else degrades to an empty list.

use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

fn array_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"\[\s*("[^"]*"(?:\s*,\s*"[^"]*")*)\s*\]"#).expect("valid regex")
    })
}

/// Extract the first JSON array of strings embedded in `raw`.
///
/// Never fails: a missing or malformed array yields an empty list.
pub fn extract_follow_ups(raw: &str) -> Vec<String> {
    let Some(found) = array_pattern().find(raw) else {
        warn!(len = raw.len(), "No JSON array found in follow-up response");
        return Vec::new();
    };

    match serde_json::from_str::<Vec<String>>(found.as_str()) {
        Ok(questions) => questions,
        Err(e) => {
            warn!(error = %e, "Failed to parse follow-up array");
            Vec::new()
        }
    }
}
