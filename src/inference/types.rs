use crate::codec::EncodedImage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One conversation turn as exchanged with vision-language pipelines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: String,
    pub content: TurnContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    Image {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl Turn {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: TurnContent::Parts(vec![ContentPart::Text { text: text.into() }]),
        }
    }

    pub fn user(prompt: impl Into<String>, image: &EncodedImage) -> Self {
        Self {
            role: "user".to_string(),
            content: TurnContent::Parts(vec![
                ContentPart::Text {
                    text: prompt.into(),
                },
                ContentPart::Image {
                    image: Some(image.data_url()),
                },
            ]),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: TurnContent::Text(text.into()),
        }
    }

    /// Image data URLs carried by this turn.
    pub fn image_urls(&self) -> Vec<&str> {
        match &self.content {
            TurnContent::Text(_) => Vec::new(),
            TurnContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Image { image: Some(url) } => Some(url.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }

    /// Text carried by this turn, or `None` when it has no text part.
    pub fn text(&self) -> Option<String> {
        match &self.content {
            TurnContent::Text(text) => Some(text.clone()),
            TurnContent::Parts(parts) => {
                let texts: Vec<&str> = parts
                    .iter()
                    .filter_map(|part| match part {
                        ContentPart::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect();
                if texts.is_empty() {
                    None
                } else {
                    Some(texts.join("\n"))
                }
            }
        }
    }
}

/// Value of a `generated_text` field. Turns stay untyped: only the last one
/// is ever read, and echoed input turns may carry arbitrary payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeneratedText {
    Turns(Vec<Value>),
    Text(String),
    Other(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedRecord {
    pub generated_text: GeneratedText,
}

/// Raw backend output, classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceResult {
    /// A sequence of records; only the first one is authoritative. May be
    /// empty, which the normalizer reports as a parse failure.
    Records(Vec<GeneratedRecord>),
    /// A single record carrying `generated_text`.
    Record(GeneratedRecord),
    /// Any other JSON value, kept for diagnostics.
    Unrecognized(Value),
}

impl InferenceResult {
    /// Sequence shape is checked before the single-record shape, which is
    /// checked before falling back to `Unrecognized`.
    pub fn classify(value: Value) -> Self {
        match value {
            Value::Array(items) => {
                let first_is_record = match items.first() {
                    None => true,
                    Some(first) => has_generated_text(first),
                };
                if !first_is_record {
                    return Self::Unrecognized(Value::Array(items));
                }
                let records = items
                    .into_iter()
                    .filter(has_generated_text)
                    .filter_map(|item| serde_json::from_value(item).ok())
                    .collect();
                Self::Records(records)
            }
            Value::Object(_) if has_generated_text(&value) => {
                match serde_json::from_value(value.clone()) {
                    Ok(record) => Self::Record(record),
                    Err(_) => Self::Unrecognized(value),
                }
            }
            other => Self::Unrecognized(other),
        }
    }
}

fn has_generated_text(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| obj.contains_key("generated_text"))
}
