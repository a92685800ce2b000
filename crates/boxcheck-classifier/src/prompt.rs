//! Prompt construction
//!
//! Prior decisions are rendered most confident first, exactly in the order
//! the store returned them; the ordering is part of the prompt.

use boxcheck_core::Record;

/// Header of a non-empty context block
pub const CONTEXT_HEADER: &str = "Previous decisions (most confident first):";

/// Context block used when the store has nothing to offer
pub const EMPTY_CONTEXT: &str = "No previous examples available.";

const SYSTEM_PROMPT: &str = r#"You are an expert delivery box condition evaluator. Your job is to classify boxes as OK or NEEDS_FIX.

EVALUATION CRITERIA:

OK Conditions:
- Minor scuffs or dirt that don't affect structural integrity
- Light wear on edges
- Small cosmetic marks
- Box is fully intact and functional

NEEDS_FIX Conditions:
- Tears or holes (even small ones)
- Crushed or significantly dented areas
- Water damage or excessive staining
- Missing flaps or components
- Any damage that could compromise contents

IMPORTANT: Return your answer in this EXACT JSON format:
{
    "status": "OK" or "NEEDS_FIX",
    "confidence": 0.0 to 1.0,
    "reason": "Clear explanation of your decision",
    "damage_types": ["list", "of", "damage", "types"]
}"#;

const DRIFT_NOTICE: &str =
    "ALERT: Recent predictions have shown lower confidence. Be extra thorough in your analysis.";

/// System prompt, with a drift notice appended while the store is drifting
pub fn system_prompt(drifting: bool) -> String {
    if drifting {
        format!("{SYSTEM_PROMPT}\n\n{DRIFT_NOTICE}")
    } else {
        SYSTEM_PROMPT.to_string()
    }
}

/// User prompt wrapping the context block
pub fn user_prompt(context: &str) -> String {
    format!(
        "Analyze this box image and classify its condition.\n\n{context}\n\nBased on these previous examples and the current image, provide your classification in the JSON format specified."
    )
}

/// Renders retrieved records into a bounded context block
#[derive(Debug, Clone)]
pub struct ContextFormatter {
    max_reason_chars: usize,
    max_context_chars: usize,
}

impl Default for ContextFormatter {
    fn default() -> Self {
        Self::new(200, 2000)
    }
}

impl ContextFormatter {
    /// Create a formatter with per-reason and whole-block limits (in chars)
    pub fn new(max_reason_chars: usize, max_context_chars: usize) -> Self {
        Self {
            max_reason_chars,
            max_context_chars,
        }
    }

    /// Format `records` in the given order. Returns the block and the
    /// number of records that fit.
    pub fn format(&self, records: &[Record]) -> (String, usize) {
        if records.is_empty() {
            return (EMPTY_CONTEXT.to_string(), 0);
        }

        let mut block = String::from(CONTEXT_HEADER);
        let mut used = block.chars().count();
        let mut included = 0;

        for (i, record) in records.iter().enumerate() {
            let entry = self.entry(i + 1, record);
            let entry_len = entry.chars().count() + 1;
            if used + entry_len > self.max_context_chars {
                break;
            }
            block.push('\n');
            block.push_str(&entry);
            used += entry_len;
            included += 1;
        }

        (block, included)
    }

    fn entry(&self, position: usize, record: &Record) -> String {
        let mut entry = format!(
            "{}. Result: {} (Confidence: {:.2})",
            position, record.label, record.confidence
        );

        let reason = record.reason.trim();
        if !reason.is_empty() {
            entry.push_str("\n   Reason: ");
            entry.push_str(&truncate_chars(reason, self.max_reason_chars));
        }

        entry
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
