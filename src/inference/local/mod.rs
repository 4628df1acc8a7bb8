mod in_process;
mod runtime;

pub use in_process::InProcessLoader;
pub use runtime::RuntimeLoader;

use super::{BackendInfo, GeneratedRecord, GeneratedText, InferenceClient, InferenceResult, Turn};
use crate::{
    codec,
    config::{DeviceSetting, LocalConfig, LocalRuntime},
    error::InferenceError,
};
use async_trait::async_trait;
use image::RgbImage;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{OnceCell, Semaphore};
use tracing::{debug, info};

type InferResult<T> = std::result::Result<T, InferenceError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    Accelerator,
    Cpu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    BFloat16,
    Float32,
}

/// Where the model runs and at which numeric precision. Chosen once per
/// process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ComputeProfile {
    pub device: Device,
    pub precision: Precision,
}

impl ComputeProfile {
    pub fn for_device(device: Device) -> Self {
        let precision = match device {
            Device::Accelerator => Precision::BFloat16,
            Device::Cpu => Precision::Float32,
        };
        Self { device, precision }
    }

    pub fn select(setting: DeviceSetting) -> Self {
        let device = match setting {
            DeviceSetting::Cpu => Device::Cpu,
            DeviceSetting::Accelerator => Device::Accelerator,
            DeviceSetting::Auto => {
                let visible = std::env::var("CUDA_VISIBLE_DEVICES").ok();
                let node = std::path::Path::new("/dev/nvidia0").exists();
                if accelerator_present(visible.as_deref(), node) {
                    Device::Accelerator
                } else {
                    Device::Cpu
                }
            }
        };
        Self::for_device(device)
    }
}

fn accelerator_present(cuda_visible_devices: Option<&str>, device_node: bool) -> bool {
    match cuda_visible_devices.map(str::trim) {
        Some("") | Some("-1") => false,
        Some(_) => true,
        None => device_node,
    }
}

/// A loaded vision-language model. Receives the conversation so far and
/// returns it extended with the generated assistant turn.
#[async_trait]
pub trait VisionPipeline: Send + Sync {
    async fn generate(&self, messages: Vec<Turn>, max_new_tokens: u32) -> InferResult<Vec<Turn>>;
}

#[async_trait]
pub trait PipelineLoader: Send + Sync {
    async fn load(&self, profile: ComputeProfile) -> InferResult<Arc<dyn VisionPipeline>>;
}

/// Local strategy: owns the model for the process lifetime.
pub struct LocalClient {
    config: LocalConfig,
    profile: ComputeProfile,
    loader: Arc<dyn PipelineLoader>,
    pipeline: OnceCell<Arc<dyn VisionPipeline>>,
    permits: Semaphore,
}

impl LocalClient {
    pub fn new(config: LocalConfig, loader: Arc<dyn PipelineLoader>) -> Self {
        let profile = ComputeProfile::select(config.device);
        info!(
            "Local model {} will run on {:?} with {:?} precision",
            config.model, profile.device, profile.precision
        );

        let permits = Semaphore::new(config.max_concurrent.max(1));

        Self {
            config,
            profile,
            loader,
            pipeline: OnceCell::new(),
            permits,
        }
    }

    /// Client whose loader follows `config.runtime`.
    pub fn from_config(config: LocalConfig) -> Self {
        let loader: Arc<dyn PipelineLoader> = match config.runtime {
            LocalRuntime::InProcess => Arc::new(InProcessLoader::new(&config)),
            LocalRuntime::OpenaiCompatible => Arc::new(RuntimeLoader::new(&config)),
        };
        Self::new(config, loader)
    }

    pub fn is_loaded(&self) -> bool {
        self.pipeline.initialized()
    }

    async fn pipeline(&self) -> InferResult<&Arc<dyn VisionPipeline>> {
        self.pipeline
            .get_or_try_init(|| async {
                info!("Loading local model: {}", self.config.model);
                self.loader.load(self.profile).await
            })
            .await
    }
}

#[async_trait]
impl InferenceClient for LocalClient {
    async fn infer(&self, prompt: &str, image: &RgbImage) -> InferResult<InferenceResult> {
        let pipeline = self.pipeline().await?;
        let encoded = codec::encode(image)?;

        let messages = vec![
            Turn::system(self.config.system_prompt.clone()),
            Turn::user(prompt, &encoded),
        ];

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| InferenceError::model("local model is shutting down"))?;

        debug!(
            "Running local model ({} prompt chars, {}x{} image)",
            prompt.chars().count(),
            image.width(),
            image.height()
        );

        let turns = pipeline
            .generate(messages, self.config.max_new_tokens)
            .await?
            .into_iter()
            .map(|turn| {
                serde_json::to_value(turn).map_err(|e| InferenceError::model(e.to_string()))
            })
            .collect::<InferResult<Vec<_>>>()?;

        Ok(InferenceResult::Records(vec![GeneratedRecord {
            generated_text: GeneratedText::Turns(turns),
        }]))
    }

    fn describe(&self) -> BackendInfo {
        BackendInfo {
            mode: "local",
            target: self.config.model.clone(),
            profile: Some(self.profile),
        }
    }

    async fn warm_up(&self) -> InferResult<()> {
        self.pipeline().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{ContentPart, TurnContent};
    use image::Rgb;
    use mockall::mock;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    mock! {
        pub Pipeline {}

        #[async_trait]
        impl VisionPipeline for Pipeline {
            async fn generate(&self, messages: Vec<Turn>, max_new_tokens: u32) -> InferResult<Vec<Turn>>;
        }
    }

    struct CountingLoader {
        loads: AtomicUsize,
        pipeline: Arc<dyn VisionPipeline>,
    }

    #[async_trait]
    impl PipelineLoader for CountingLoader {
        async fn load(&self, _profile: ComputeProfile) -> InferResult<Arc<dyn VisionPipeline>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(self.pipeline.clone())
        }
    }

    struct FailingLoader;

    #[async_trait]
    impl PipelineLoader for FailingLoader {
        async fn load(&self, _profile: ComputeProfile) -> InferResult<Arc<dyn VisionPipeline>> {
            Err(InferenceError::model("weights not found"))
        }
    }

    fn create_test_config() -> LocalConfig {
        LocalConfig {
            device: DeviceSetting::Cpu,
            ..LocalConfig::default()
        }
    }

    fn test_image() -> RgbImage {
        RgbImage::from_pixel(4, 4, Rgb([200, 200, 200]))
    }

    fn echo_pipeline(answer: &'static str) -> MockPipeline {
        let mut pipeline = MockPipeline::new();
        pipeline
            .expect_generate()
            .returning(move |mut messages, _| {
                messages.push(Turn::assistant(answer));
                Ok(messages)
            });
        pipeline
    }

    #[test]
    fn test_precision_follows_device() {
        assert_eq!(
            ComputeProfile::for_device(Device::Accelerator).precision,
            Precision::BFloat16
        );
        assert_eq!(
            ComputeProfile::for_device(Device::Cpu).precision,
            Precision::Float32
        );
        assert_eq!(
            ComputeProfile::select(DeviceSetting::Cpu).device,
            Device::Cpu
        );
        assert_eq!(
            ComputeProfile::select(DeviceSetting::Accelerator).precision,
            Precision::BFloat16
        );
    }

    #[test]
    fn test_accelerator_detection() {
        assert!(accelerator_present(Some("0"), false));
        assert!(accelerator_present(Some("0,1"), false));
        assert!(!accelerator_present(Some(""), true));
        assert!(!accelerator_present(Some("-1"), true));
        assert!(accelerator_present(None, true));
        assert!(!accelerator_present(None, false));
    }

    #[tokio::test]
    async fn test_model_is_loaded_lazily_and_once() {
        let loader = Arc::new(CountingLoader {
            loads: AtomicUsize::new(0),
            pipeline: Arc::new(echo_pipeline("Normal chest radiograph.")),
        });
        let client = LocalClient::new(create_test_config(), loader.clone());

        assert!(!client.is_loaded());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 0);

        client.infer("Describe this image", &test_image()).await.unwrap();
        client.infer("Any fractures?", &test_image()).await.unwrap();

        assert!(client.is_loaded());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_warm_up_loads_eagerly() {
        let loader = Arc::new(CountingLoader {
            loads: AtomicUsize::new(0),
            pipeline: Arc::new(echo_pipeline("ok")),
        });
        let client = LocalClient::new(create_test_config(), loader.clone());

        client.warm_up().await.unwrap();

        assert!(client.is_loaded());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_conversation_sent_to_pipeline() {
        let mut pipeline = MockPipeline::new();
        pipeline
            .expect_generate()
            .withf(|messages, max_new_tokens| {
                *max_new_tokens == 200
                    && messages.len() == 2
                    && messages[0].role == "system"
                    && messages[0].text().as_deref() == Some("You are an expert radiologist.")
                    && messages[1].role == "user"
                    && messages[1].text().as_deref() == Some("Is there an effusion?")
                    && matches!(
                        &messages[1].content,
                        TurnContent::Parts(parts)
                            if matches!(parts.last(), Some(ContentPart::Image { image: Some(_) }))
                    )
            })
            .times(1)
            .returning(|mut messages, _| {
                messages.push(Turn::assistant("No effusion."));
                Ok(messages)
            });

        let loader = Arc::new(CountingLoader {
            loads: AtomicUsize::new(0),
            pipeline: Arc::new(pipeline),
        });
        let client = LocalClient::new(create_test_config(), loader);

        let result = client
            .infer("Is there an effusion?", &test_image())
            .await
            .unwrap();

        match result {
            InferenceResult::Records(records) => match &records[0].generated_text {
                GeneratedText::Turns(turns) => {
                    assert_eq!(turns.len(), 3);
                    assert_eq!(turns[2]["role"], json!("assistant"));
                    assert_eq!(turns[2]["content"], json!("No effusion."));
                }
                other => panic!("expected turns, got {:?}", other),
            },
            other => panic!("expected records, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pipeline_failure_becomes_model_error() {
        let mut pipeline = MockPipeline::new();
        pipeline
            .expect_generate()
            .returning(|_, _| Err(InferenceError::model("CUDA out of memory")));

        let loader = Arc::new(CountingLoader {
            loads: AtomicUsize::new(0),
            pipeline: Arc::new(pipeline),
        });
        let client = LocalClient::new(create_test_config(), loader);

        let err = client.infer("Describe", &test_image()).await.unwrap_err();
        assert_eq!(err, InferenceError::model("CUDA out of memory"));
    }

    #[tokio::test]
    async fn test_load_failure_is_retried_on_next_call() {
        let client = LocalClient::new(create_test_config(), Arc::new(FailingLoader));

        let err = client.infer("Describe", &test_image()).await.unwrap_err();
        assert!(matches!(err, InferenceError::Model(_)));
        assert!(!client.is_loaded());
    }

    #[test]
    fn test_describe_reports_profile() {
        let client = LocalClient::from_config(create_test_config());
        let info = client.describe();

        assert_eq!(info.mode, "local");
        assert_eq!(info.target, "google/medgemma-4b-it");
        assert_eq!(info.profile, Some(ComputeProfile::for_device(Device::Cpu)));
        assert!(!client.is_loaded());
    }

    #[tokio::test]
    async fn test_local_answer_normalizes() {
        let loader = Arc::new(CountingLoader {
            loads: AtomicUsize::new(0),
            pipeline: Arc::new(echo_pipeline("Normal chest radiograph.")),
        });
        let client = LocalClient::new(create_test_config(), loader);

        let raw = client.infer("Describe this image", &test_image()).await.unwrap();

        assert_eq!(
            crate::normalize(raw),
            Ok("Normal chest radiograph.".to_string())
        );
    }
}
