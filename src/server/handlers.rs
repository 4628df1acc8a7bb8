use super::types::{AskRequest, AskResponse, ErrorBody, ErrorResponse};
use crate::{
    assistant::{Assistant, ClinicalQuery, DEFAULT_PROMPT},
    codec,
    error::{ErrorKind, InferenceError},
    inference::BackendInfo,
};
use axum::{extract::State, http::StatusCode, response::Json};
use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub assistant: Assistant,
    pub shutdown: watch::Receiver<bool>,
}

/// Resolves once shutdown is signalled. Pends forever if the sender is
/// dropped without signalling.
async fn shutdown_requested(mut shutdown: watch::Receiver<bool>) {
    let signalled = shutdown.wait_for(|stopping| *stopping).await.is_ok();
    if !signalled {
        std::future::pending::<()>().await;
    }
}

pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, (StatusCode, Json<ErrorResponse>)> {
    let request_id = Uuid::new_v4().to_string();
    info!("Received clinical query {}", request_id);

    let reject = |err: InferenceError| {
        error!("Clinical query {} failed: {}", request_id, err);
        (
            status_for(err.kind()),
            Json(ErrorResponse {
                request_id: request_id.clone(),
                error: ErrorBody::from_error(&err),
            }),
        )
    };

    let image = codec::decode_base64_upload(&request.image).map_err(reject)?;
    let prompt = request.prompt.unwrap_or_else(|| DEFAULT_PROMPT.to_string());
    let query = ClinicalQuery::new(image, prompt).map_err(reject)?;

    let answer = state
        .assistant
        .ask_until(&query, shutdown_requested(state.shutdown.clone()))
        .await
        .map_err(reject)?;

    info!("Answered clinical query {}", request_id);
    Ok(Json(AskResponse {
        request_id,
        answer,
        answered_at: Utc::now(),
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<BackendInfo> {
    Json(state.assistant.backend())
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Image | ErrorKind::InvalidPrompt => StatusCode::BAD_REQUEST,
        ErrorKind::Connection | ErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Http
        | ErrorKind::Decode
        | ErrorKind::MissingField
        | ErrorKind::Parse
        | ErrorKind::Model => StatusCode::BAD_GATEWAY,
    }
}
