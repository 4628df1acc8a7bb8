use crate::{
    Result,
    config::Config,
    error::InferenceError,
    inference::{self, BackendInfo, InferenceClient},
    normalize::{NormalizedAnswer, normalize},
};
use image::RgbImage;
use std::{future::Future, sync::Arc};
use tracing::{info, warn};

pub const DEFAULT_PROMPT: &str = "Describe this image";

/// One user submission. Owned for the duration of a single request.
#[derive(Debug, Clone)]
pub struct ClinicalQuery {
    image: RgbImage,
    prompt: String,
}

impl ClinicalQuery {
    pub fn new(image: RgbImage, prompt: impl Into<String>) -> std::result::Result<Self, InferenceError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(InferenceError::InvalidPrompt);
        }
        Ok(Self { image, prompt })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }
}

/// Runs one inference call and normalizes its output.
#[derive(Clone)]
pub struct Assistant {
    client: Arc<dyn InferenceClient>,
}

impl Assistant {
    pub fn new(client: Arc<dyn InferenceClient>) -> Self {
        Self { client }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(inference::from_config(config)?))
    }

    pub fn backend(&self) -> BackendInfo {
        self.client.describe()
    }

    pub async fn warm_up(&self) -> Result<()> {
        self.client.warm_up().await?;
        Ok(())
    }

    pub async fn ask(&self, query: &ClinicalQuery) -> NormalizedAnswer {
        let raw = self.client.infer(&query.prompt, &query.image).await?;
        normalize(raw)
    }

    /// Like [`ask`](Self::ask), but gives up once `cancel` resolves. The
    /// in-flight backend call is dropped and `Cancelled` is returned.
    pub async fn ask_until<F>(&self, query: &ClinicalQuery, cancel: F) -> NormalizedAnswer
    where
        F: Future<Output = ()>,
    {
        let (width, height) = query.image.dimensions();
        info!(
            "Answering clinical query ({} prompt chars, {}x{} image)",
            query.prompt.chars().count(),
            width,
            height
        );

        tokio::select! {
            answer = self.ask(query) => {
                if let Err(e) = &answer {
                    warn!("Query failed with {} error", e.kind());
                }
                answer
            }
            _ = cancel => {
                warn!("Query cancelled before the backend answered");
                Err(InferenceError::Cancelled)
            }
        }
    }
}
