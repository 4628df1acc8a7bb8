use async_trait::async_trait;
use image::RgbImage;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wecare_assistant::{
    InferenceError,
    inference::{BackendInfo, InferenceClient, InferenceResult},
};

/// A recorded call to the mock inference client
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub prompt: String,
    pub dimensions: (u32, u32),
}

/// Mock inference client for testing
#[derive(Debug)]
pub struct MockInferenceClient {
    pub responses: Arc<Mutex<Vec<Result<InferenceResult, InferenceError>>>>,
    pub calls: Arc<Mutex<Vec<RecordedCall>>>,
    pub delay: Option<Duration>,
}

impl MockInferenceClient {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    pub fn with_result(self, result: Result<InferenceResult, InferenceError>) -> Self {
        self.responses.lock().unwrap().push(result);
        self
    }

    pub fn with_json(self, raw: serde_json::Value) -> Self {
        self.with_result(Ok(InferenceResult::classify(raw)))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn get_calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceClient for MockInferenceClient {
    async fn infer(&self, prompt: &str, image: &RgbImage) -> Result<InferenceResult, InferenceError> {
        self.calls.lock().unwrap().push(RecordedCall {
            prompt: prompt.to_string(),
            dimensions: image.dimensions(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(InferenceError::connection("No more mock responses available"));
        }

        responses.remove(0)
    }

    fn describe(&self) -> BackendInfo {
        BackendInfo {
            mode: "mock",
            target: "mock-model".to_string(),
            profile: None,
        }
    }
}

impl Default for MockInferenceClient {
    fn default() -> Self {
        Self::new()
    }
}
