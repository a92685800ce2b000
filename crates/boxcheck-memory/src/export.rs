//! Fine-tuning export
//!
//! Each corpus record becomes one chat-format training example:
//!
//! ```text
//! {"messages":[{"role":"system",...},{"role":"user",...},{"role":"assistant","content":"{\"status\":\"OK\",...}"}]}
//! ```

use boxcheck_core::{Label, Record, Result};
use serde::{Deserialize, Serialize};

/// Role context given to the model being fine-tuned
pub const SYSTEM_PROMPT: &str = "You are an expert at evaluating delivery box conditions.";

/// Instruction paired with every example
pub const USER_PROMPT: &str = "Classify the condition of this delivery box.";

/// One chat message in a training example
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleMessage {
    /// `system`, `user` or `assistant`
    pub role: String,

    /// Message text
    pub content: String,
}

/// One line of the export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    /// Conversation ending with the target verdict
    pub messages: Vec<ExampleMessage>,
}

/// Target output the trainer should learn
#[derive(Debug, Serialize)]
struct TargetVerdict<'a> {
    status: Label,
    confidence: f64,
    reason: &'a str,
    damage_types: &'a [String],
}

impl TrainingExample {
    /// Build the example for a record
    pub fn from_record(record: &Record) -> Result<Self> {
        let target = serde_json::to_string(&TargetVerdict {
            status: record.label,
            confidence: record.confidence,
            reason: &record.reason,
            damage_types: &record.damage_types,
        })?;

        Ok(Self {
            messages: vec![
                ExampleMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ExampleMessage {
                    role: "user".to_string(),
                    content: USER_PROMPT.to_string(),
                },
                ExampleMessage {
                    role: "assistant".to_string(),
                    content: target,
                },
            ],
        })
    }
}

/// Render records as JSON lines, in the order given
pub fn render_jsonl<'a, I>(records: I) -> Result<String>
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut out = String::new();
    for record in records {
        let example = TrainingExample::from_record(record)?;
        out.push_str(&serde_json::to_string(&example)?);
        out.push('\n');
    }
    Ok(out)
}
