use super::{BackendInfo, InferenceClient, InferenceResult};
use crate::{
    Error, Result, codec,
    config::{RemoteConfig, Secret},
    error::InferenceError,
};
use async_trait::async_trait;
use image::RgbImage;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Hosted inference API client. One POST per call, no retries.
pub struct RemoteClient {
    endpoint: String,
    token: Secret,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
pub struct RemotePayload<'a> {
    pub inputs: RemoteInputs<'a>,
}

#[derive(Debug, Serialize)]
pub struct RemoteInputs<'a> {
    pub past_user_inputs: Vec<String>,
    pub text: &'a str,
    pub images: Vec<String>,
}

impl RemoteClient {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let token = config
            .token
            .ok_or_else(|| Error::config("Remote inference requires an API token"))?;

        debug!("Creating remote inference client for: {}", config.endpoint);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            endpoint: config.endpoint,
            token,
            client,
        })
    }

    async fn post(
        &self,
        payload: &RemotePayload<'_>,
    ) -> std::result::Result<InferenceResult, InferenceError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.token.expose())
            .json(payload)
            .send()
            .await
            .map_err(|e| InferenceError::connection(describe_transport_error(&e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| InferenceError::connection(describe_transport_error(&e)))?;

        if !status.is_success() {
            warn!("Inference backend returned HTTP {}", status.as_u16());
            return Err(InferenceError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let value: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            warn!("Inference backend returned a non-JSON body: {}", e);
            InferenceError::Decode { body: body.clone() }
        })?;

        Ok(InferenceResult::classify(value))
    }
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    // reqwest includes the URL, never the headers
    if err.is_timeout() {
        format!("request timed out: {}", err)
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        err.to_string()
    }
}

#[async_trait]
impl InferenceClient for RemoteClient {
    async fn infer(
        &self,
        prompt: &str,
        image: &RgbImage,
    ) -> std::result::Result<InferenceResult, InferenceError> {
        let encoded = codec::encode(image)?;

        debug!(
            "Sending remote inference request ({} prompt chars, {}x{} image)",
            prompt.chars().count(),
            image.width(),
            image.height()
        );

        let payload = RemotePayload {
            inputs: RemoteInputs {
                past_user_inputs: Vec::new(),
                text: prompt,
                images: vec![encoded.into_string()],
            },
        };

        self.post(&payload).await
    }

    fn describe(&self) -> BackendInfo {
        BackendInfo {
            mode: "remote",
            target: self.endpoint.clone(),
            profile: None,
        }
    }
}
