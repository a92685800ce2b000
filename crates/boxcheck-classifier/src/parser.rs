//! Vision model response parsing
//!
//! Models are asked for a JSON object but often wrap it in markdown fences
//! or answer in prose. Parsing tries, in order:
//! 1. a ```` ```json ```` fenced block
//! 2. any ```` ``` ```` fenced block
//! 3. the raw text
//!
//! and falls back to keyword matching when none of them is a JSON object.

use boxcheck_core::Label;
use serde::Deserialize;
use serde_json::Value;

use crate::oracle::Verdict;

/// Confidence used when the model omits one
const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Reason used when the model omits one
const DEFAULT_REASON: &str = "No reason provided";

/// Characters of prose kept as the reason in the fallback path
const FALLBACK_REASON_CHARS: usize = 200;

#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    confidence: Option<Value>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    damage_types: Option<Vec<String>>,
}

/// Parse a model reply into a verdict
pub fn parse_response(text: &str) -> Verdict {
    let payload = extract_json(text);

    match serde_json::from_str::<RawVerdict>(payload) {
        Ok(raw) => from_raw(raw),
        Err(_) => parse_plain_text(text),
    }
}

/// Pull the JSON payload out of markdown fences, if any
fn extract_json(text: &str) -> &str {
    if let Some((_, rest)) = text.split_once("```json") {
        return rest.split("```").next().unwrap_or(rest).trim();
    }
    if let Some((_, rest)) = text.split_once("```") {
        return rest.split("```").next().unwrap_or(rest).trim();
    }
    text.trim()
}

fn from_raw(raw: RawVerdict) -> Verdict {
    let label = normalize_status(raw.status.as_deref().unwrap_or("UNKNOWN"));

    let confidence = raw
        .confidence
        .as_ref()
        .and_then(|value| match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
        .filter(|c| c.is_finite())
        .unwrap_or(DEFAULT_CONFIDENCE)
        .clamp(0.0, 1.0);

    let reason = raw
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_REASON.to_string());

    Verdict::new(label, confidence, reason).with_damage_types(raw.damage_types.unwrap_or_default())
}

/// Map a free-form status onto the closed label set
fn normalize_status(status: &str) -> Label {
    if let Ok(label) = status.parse::<Label>() {
        return label;
    }

    let lower = status.to_lowercase();
    if lower.contains("ok") && !lower.contains("not") {
        Label::Ok
    } else {
        Label::NeedsFix
    }
}

/// Keyword fallback for replies that carry no JSON object
pub fn parse_plain_text(text: &str) -> Verdict {
    let lower = text.to_lowercase();

    let (label, confidence) = if lower.contains("needs fix")
        || lower.contains("needs_fix")
        || lower.contains("not ok")
        || lower.contains("damaged")
    {
        (Label::NeedsFix, 0.6)
    } else if has_word(&lower, "ok") {
        (Label::Ok, 0.6)
    } else {
        (Label::NeedsFix, 0.3)
    };

    let reason: String = text.trim().chars().take(FALLBACK_REASON_CHARS).collect();
    Verdict::new(label, confidence, reason)
}

fn has_word(haystack: &str, word: &str) -> bool {
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .any(|token| token == word)
}
