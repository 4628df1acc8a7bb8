use super::{ComputeProfile, InferResult, PipelineLoader, VisionPipeline};
use crate::{
    config::LocalConfig,
    error::InferenceError,
    inference::{ContentPart, Turn, TurnContent},
};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessageArgs,
        ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequestArgs, ImageDetail, ImageUrlArgs,
    },
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Connects to an OpenAI-compatible runtime serving the model.
pub struct RuntimeLoader {
    base_url: String,
    model: String,
}

impl RuntimeLoader {
    pub fn new(config: &LocalConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl PipelineLoader for RuntimeLoader {
    async fn load(&self, profile: ComputeProfile) -> InferResult<Arc<dyn VisionPipeline>> {
        let openai_config = OpenAIConfig::new()
            .with_api_base(self.base_url.clone())
            .with_api_key("local");
        let client = Client::with_config(openai_config);

        let served = client
            .models()
            .list()
            .await
            .map_err(|e| InferenceError::model(format!("runtime unavailable: {}", e)))?;

        if !served.data.iter().any(|m| m.id == self.model) {
            return Err(InferenceError::model(format!(
                "runtime at {} does not serve model {}",
                self.base_url, self.model
            )));
        }

        info!(
            "Local model {} is ready; precision {:?} is managed by the runtime",
            self.model, profile.precision
        );

        Ok(Arc::new(RuntimePipeline {
            client,
            model: self.model.clone(),
        }))
    }
}

pub struct RuntimePipeline {
    client: Client<OpenAIConfig>,
    model: String,
}

impl RuntimePipeline {
    fn to_request_message(turn: &Turn) -> InferResult<Option<ChatCompletionRequestMessage>> {
        let build_err = |e: async_openai::error::OpenAIError| InferenceError::model(e.to_string());

        match turn.role.as_str() {
            "system" => {
                let msg = ChatCompletionRequestSystemMessageArgs::default()
                    .content(ChatCompletionRequestSystemMessageContent::Text(
                        turn.text().unwrap_or_default(),
                    ))
                    .build()
                    .map_err(build_err)?;
                Ok(Some(msg.into()))
            }
            "user" => {
                let mut parts: Vec<ChatCompletionRequestUserMessageContentPart> = Vec::new();
                if let TurnContent::Parts(content) = &turn.content {
                    for part in content {
                        match part {
                            ContentPart::Text { text } => parts.push(
                                ChatCompletionRequestMessageContentPartTextArgs::default()
                                    .text(text.clone())
                                    .build()
                                    .map_err(build_err)?
                                    .into(),
                            ),
                            ContentPart::Image { image: Some(url) } => parts.push(
                                ChatCompletionRequestMessageContentPartImageArgs::default()
                                    .image_url(
                                        ImageUrlArgs::default()
                                            .url(url.clone())
                                            .detail(ImageDetail::High)
                                            .build()
                                            .map_err(build_err)?,
                                    )
                                    .build()
                                    .map_err(build_err)?
                                    .into(),
                            ),
                            _ => {}
                        }
                    }
                } else if let Some(text) = turn.text() {
                    parts.push(
                        ChatCompletionRequestMessageContentPartTextArgs::default()
                            .text(text)
                            .build()
                            .map_err(build_err)?
                            .into(),
                    );
                }

                let msg = ChatCompletionRequestUserMessageArgs::default()
                    .content(ChatCompletionRequestUserMessageContent::Array(parts))
                    .build()
                    .map_err(build_err)?;
                Ok(Some(msg.into()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl VisionPipeline for RuntimePipeline {
    async fn generate(&self, messages: Vec<Turn>, max_new_tokens: u32) -> InferResult<Vec<Turn>> {
        let mut request_messages = Vec::with_capacity(messages.len());
        for turn in &messages {
            if let Some(msg) = Self::to_request_message(turn)? {
                request_messages.push(msg);
            }
        }

        #[allow(deprecated)]
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(request_messages)
            .max_tokens(max_new_tokens)
            .build()
            .map_err(|e| InferenceError::model(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| InferenceError::model(e.to_string()))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| InferenceError::model("runtime returned no completion"))?;

        let mut conversation = messages;
        conversation.push(Turn::assistant(content));
        Ok(conversation)
    }
}
