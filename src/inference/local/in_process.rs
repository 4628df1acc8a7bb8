use super::{ComputeProfile, Device, InferResult, PipelineLoader, Precision, VisionPipeline};
use crate::{codec, config::LocalConfig, error::InferenceError, inference::Turn};
use async_trait::async_trait;
use image::DynamicImage;
use mistralrs::{
    Model, ModelDType, RequestBuilder, TextMessageRole, VisionMessages, VisionModelBuilder,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Loads the model weights into this process with mistral.rs.
pub struct InProcessLoader {
    model_id: String,
}

impl InProcessLoader {
    pub fn new(config: &LocalConfig) -> Self {
        Self {
            model_id: config.model.clone(),
        }
    }
}

fn model_dtype(precision: Precision) -> ModelDType {
    match precision {
        Precision::BFloat16 => ModelDType::BF16,
        Precision::Float32 => ModelDType::F32,
    }
}

#[async_trait]
impl PipelineLoader for InProcessLoader {
    async fn load(&self, profile: ComputeProfile) -> InferResult<Arc<dyn VisionPipeline>> {
        let mut builder =
            VisionModelBuilder::new(&self.model_id).with_dtype(model_dtype(profile.precision));
        if profile.device == Device::Cpu {
            builder = builder.with_force_cpu();
        }

        let model = builder.build().await.map_err(|e| {
            InferenceError::model(format!("failed to load {}: {}", self.model_id, e))
        })?;

        info!(
            "Local model {} loaded in process on {:?}",
            self.model_id, profile.device
        );

        Ok(Arc::new(InProcessPipeline { model }))
    }
}

pub struct InProcessPipeline {
    model: Model,
}

/// What a single chat request carries: the system instruction, and the
/// text and images of the latest user turn.
#[derive(Debug)]
struct ChatRequestParts {
    system: Option<String>,
    prompt: String,
    images: Vec<DynamicImage>,
}

fn request_parts(turns: &[Turn]) -> InferResult<ChatRequestParts> {
    let system = turns
        .iter()
        .find(|turn| turn.role == "system")
        .and_then(Turn::text);

    let user = turns
        .iter()
        .rev()
        .find(|turn| turn.role == "user")
        .ok_or_else(|| InferenceError::model("conversation has no user turn"))?;

    let images = user
        .image_urls()
        .into_iter()
        .map(|url| codec::decode_data_url(url).map(DynamicImage::ImageRgb8))
        .collect::<InferResult<Vec<_>>>()?;

    Ok(ChatRequestParts {
        system,
        prompt: user.text().unwrap_or_default(),
        images,
    })
}

#[async_trait]
impl VisionPipeline for InProcessPipeline {
    async fn generate(&self, messages: Vec<Turn>, max_new_tokens: u32) -> InferResult<Vec<Turn>> {
        let parts = request_parts(&messages)?;
        debug!("Generating with {} image(s) attached", parts.images.len());

        let mut chat = VisionMessages::new();
        if let Some(system) = parts.system {
            chat = chat.add_message(TextMessageRole::System, system);
        }
        let chat = chat
            .add_image_message(TextMessageRole::User, parts.prompt, parts.images, &self.model)
            .map_err(|e| InferenceError::model(e.to_string()))?;

        let request = RequestBuilder::from(chat).set_sampler_max_len(max_new_tokens as usize);

        let response = self
            .model
            .send_chat_request(request)
            .await
            .map_err(|e| InferenceError::model(e.to_string()))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| InferenceError::model("model returned no completion"))?;

        let mut conversation = messages;
        conversation.push(Turn::assistant(content));
        Ok(conversation)
    }
}
