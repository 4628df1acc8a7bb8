use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Startup and configuration failures. Per-request failures are
/// [`InferenceError`] values and never abort the process.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Stable, user-surfaceable classification of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Image,
    InvalidPrompt,
    Http,
    Connection,
    Decode,
    MissingField,
    Parse,
    Model,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::InvalidPrompt => "invalid_prompt",
            Self::Http => "http",
            Self::Connection => "connection",
            Self::Decode => "decode",
            Self::MissingField => "missing_field",
            Self::Parse => "parse",
            Self::Model => "model",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed request, carrying enough diagnostics to render for debugging.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    #[error("Could not read the uploaded image: {0}")]
    Image(String),

    #[error("The clinical question must not be empty")]
    InvalidPrompt,

    #[error("Inference backend returned HTTP {status}")]
    Http { status: u16, body: String },

    #[error("Could not reach the inference backend: {0}")]
    Connection(String),

    #[error("Inference backend returned a non-JSON body (the model may still be loading)")]
    Decode { body: String },

    #[error("Inference response did not contain generated text")]
    MissingField { raw: serde_json::Value },

    #[error("Could not interpret the inference response: {0}")]
    Parse(String),

    #[error("Local model failed: {0}")]
    Model(String),

    #[error("Request was cancelled before the backend answered")]
    Cancelled,
}

impl InferenceError {
    pub fn image(msg: impl Into<String>) -> Self {
        Self::Image(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Image(_) => ErrorKind::Image,
            Self::InvalidPrompt => ErrorKind::InvalidPrompt,
            Self::Http { .. } => ErrorKind::Http,
            Self::Connection(_) => ErrorKind::Connection,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::MissingField { .. } => ErrorKind::MissingField,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Model(_) => ErrorKind::Model,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Raw diagnostic payload for inspection, when one exists.
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::Image(msg) | Self::Connection(msg) | Self::Parse(msg) | Self::Model(msg) => {
                Some(msg.clone())
            }
            Self::Http { body, .. } | Self::Decode { body } => Some(body.clone()),
            Self::MissingField { raw } => Some(raw.to_string()),
            Self::InvalidPrompt | Self::Cancelled => None,
        }
    }
}

impl From<image::ImageError> for InferenceError {
    fn from(err: image::ImageError) -> Self {
        Self::Image(err.to_string())
    }
}

impl From<base64::DecodeError> for InferenceError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Image(format!("invalid base64 payload: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_kind_serializes_snake_case() {
        let value = serde_json::to_value(ErrorKind::MissingField).unwrap();
        assert_eq!(value, json!("missing_field"));
        assert_eq!(ErrorKind::InvalidPrompt.to_string(), "invalid_prompt");
    }

    #[test]
    fn test_http_error_detail_is_body() {
        let err = InferenceError::Http {
            status: 503,
            body: "Service Unavailable".to_string(),
        };

        assert_eq!(err.kind(), ErrorKind::Http);
        assert_eq!(err.detail().as_deref(), Some("Service Unavailable"));
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_missing_field_detail_includes_raw_json() {
        let err = InferenceError::MissingField {
            raw: json!({"error": "model loading"}),
        };

        let detail = err.detail().unwrap();
        assert!(detail.contains("model loading"));
    }

    #[test]
    fn test_cancelled_has_no_detail() {
        assert_eq!(InferenceError::Cancelled.detail(), None);
        assert_eq!(InferenceError::Cancelled.kind(), ErrorKind::Cancelled);
    }
}
