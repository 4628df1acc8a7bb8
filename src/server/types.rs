use crate::error::{ErrorKind, InferenceError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    /// Base64 JPEG or PNG upload.
    pub image: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AskResponse {
    pub request_id: String,
    pub answer: String,
    pub answered_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorBody {
    pub fn from_error(err: &InferenceError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            detail: err.detail(),
        }
    }
}
