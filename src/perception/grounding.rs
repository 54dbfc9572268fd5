/// Parsing of the vision oracle's grounding reply.
///
/// The oracle answers with `<box>(x1,y1,x2,y2)</box>` in normalized 0–1000
/// space, or `<box>NOT_FOUND</box>` when the element is not visible.
use std::sync::OnceLock;

use regex::Regex;

use crate::perception::types::BoundingBox;

pub const NOT_FOUND_SENTINEL: &str = "NOT_FOUND";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroundingOutcome {
    Found(BoundingBox),
    /// The oracle explicitly reported the element as absent.
    NotFound,
    /// No well-formed tag in the reply.
    Unrecognized,
}

fn box_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<box>\s*\(?\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)\s*\)?\s*</box>")
            .expect("static grounding regex")
    })
}

fn sentinel_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"<box>\s*{}\s*</box>", regex::escape(NOT_FOUND_SENTINEL)))
            .expect("static sentinel regex")
    })
}

pub fn parse_grounding(text: &str) -> GroundingOutcome {
    if sentinel_regex().is_match(text) {
        return GroundingOutcome::NotFound;
    }
    let Some(caps) = box_regex().captures(text) else {
        return GroundingOutcome::Unrecognized;
    };
    let mut values = [0u32; 4];
    for (slot, idx) in values.iter_mut().zip(1..=4) {
        match caps[idx].parse::<u32>() {
            Ok(v) => *slot = v,
            Err(_) => return GroundingOutcome::Unrecognized,
        }
    }
    let [x1, y1, x2, y2] = values;
    GroundingOutcome::Found(BoundingBox { x1, y1, x2, y2 })
}

/// `Some` only when a box was found; "not found" and unparseable replies both yield `None`.
pub fn parse_grounding_box(text: &str) -> Option<BoundingBox> {
    match parse_grounding(text) {
        GroundingOutcome::Found(bbox) => Some(bbox),
        GroundingOutcome::NotFound | GroundingOutcome::Unrecognized => None,
    }
}
