// Cheap pre-filter: does a command likely need visual grounding?
use std::sync::OnceLock;

use regex::Regex;

/// Phrases that imply looking at the screen. Checked first.
const COMPLEX_KEYWORDS: &[&str] = &[
    "click",
    "tap",
    "press on",
    "find",
    "search for",
    "look for",
    "select",
    "choose",
    "pick",
    "most popular",
    "best",
    "top",
    "first result",
    "latest",
    "cheapest",
    "compare",
    "book",
    "reserve",
    "buy",
    "order",
    "subscribe",
    "like",
    "play",
    "read",
    "check",
    "fill",
    "sign in",
    "log in",
    "scroll",
];

/// Phrases for deterministic launcher-style commands.
const SIMPLE_KEYWORDS: &[&str] = &[
    "open", "launch", "start", "quit", "close", "exit", "navigate", "go to", "visit", "type",
    "press", "wait",
];

fn phrase_regex(words: &[&str]) -> Regex {
    let alternation = words
        .iter()
        .map(|w| regex::escape(w).replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).expect("static keyword regex")
}

fn complex_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| phrase_regex(COMPLEX_KEYWORDS))
}

fn simple_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| phrase_regex(SIMPLE_KEYWORDS))
}

/// `true` when the command probably needs the vision loop.
///
/// Complex keywords win over simple ones; with no match at all the answer is
/// `true`. The intent resolver's `requiresObservation` overrides this.
pub fn classify_complexity(command: &str) -> bool {
    if let Some(m) = complex_regex().find(command) {
        tracing::debug!(keyword = m.as_str(), "complex keyword matched");
        return true;
    }
    if let Some(m) = simple_regex().find(command) {
        tracing::debug!(keyword = m.as_str(), "simple keyword matched");
        return false;
    }
    true
}
