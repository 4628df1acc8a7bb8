//! Maps classified backend output to a single answer string or a
//! structured failure.

use crate::error::InferenceError;
use crate::inference::{GeneratedRecord, GeneratedText, InferenceResult};
use serde_json::Value;

pub type NormalizedAnswer = std::result::Result<String, InferenceError>;

/// First match wins: a sequence whose first record holds conversation turns,
/// then a sequence whose first record holds plain text, then a single
/// record, else `MissingField`.
pub fn normalize(raw: InferenceResult) -> NormalizedAnswer {
    match raw {
        InferenceResult::Records(records) => {
            let first = records
                .into_iter()
                .next()
                .ok_or_else(|| InferenceError::parse("response is an empty sequence"))?;
            extract(first)
        }
        InferenceResult::Record(record) => extract(record),
        InferenceResult::Unrecognized(raw) => Err(InferenceError::MissingField { raw }),
    }
}

fn extract(record: GeneratedRecord) -> NormalizedAnswer {
    match record.generated_text {
        GeneratedText::Turns(turns) => {
            let last = turns
                .last()
                .ok_or_else(|| InferenceError::parse("generated conversation has no turns"))?;
            turn_text(last).ok_or_else(|| {
                InferenceError::parse(format!("last turn has no text content: {}", last))
            })
        }
        GeneratedText::Text(text) => Ok(text),
        GeneratedText::Other(value) => Err(InferenceError::parse(format!(
            "generated_text has unexpected type: {}",
            value
        ))),
    }
}

/// `content` of a turn: a plain string, or the text parts of a part list.
fn turn_text(turn: &Value) -> Option<String> {
    match turn.get("content")? {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => {
            let texts: Vec<&str> = parts
                .iter()
                .filter(|part| part.get("type").is_none_or(|kind| kind == "text"))
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect();
            if texts.is_empty() {
                None
            } else {
                Some(texts.join("\n"))
            }
        }
        _ => None,
    }
}

/// Convenience for callers holding untyped JSON.
pub fn normalize_value(raw: serde_json::Value) -> NormalizedAnswer {
    normalize(InferenceResult::classify(raw))
}
