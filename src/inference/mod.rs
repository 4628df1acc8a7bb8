pub mod local;
pub mod remote;
mod types;

pub use local::{ComputeProfile, Device, LocalClient, PipelineLoader, Precision, VisionPipeline};
pub use remote::RemoteClient;
pub use types::*;

use crate::{
    Result,
    config::{Config, InferenceMode},
    error::InferenceError,
};
use async_trait::async_trait;
use image::RgbImage;
use serde::Serialize;
use std::sync::Arc;

/// A backend that answers a prompt about an image with raw model output.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn infer(
        &self,
        prompt: &str,
        image: &RgbImage,
    ) -> std::result::Result<InferenceResult, InferenceError>;

    fn describe(&self) -> BackendInfo;

    /// Performs any one-time initialization ahead of the first request.
    async fn warm_up(&self) -> std::result::Result<(), InferenceError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendInfo {
    pub mode: &'static str,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<ComputeProfile>,
}

/// Builds the client selected by `config.mode`.
pub fn from_config(config: &Config) -> Result<Arc<dyn InferenceClient>> {
    match config.mode {
        InferenceMode::Remote => Ok(Arc::new(RemoteClient::new(config.remote.clone())?)),
        InferenceMode::Local => Ok(Arc::new(LocalClient::from_config(config.local.clone()))),
    }
}
