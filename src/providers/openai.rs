// OpenAI-compatible chat completions provider
//
// Works for OpenRouter and APICore, which both expose the OpenAI chat format
// with `image_url` content parts for vision input.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::retry::{with_retry_policy, RetryPolicy};
use super::transport::TransportConfig;
use super::types::VisionRequest;
use super::{missing_key, VisionModel};

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const APICORE_BASE_URL: &str = "https://api.apicore.ai/v1";

/// Title header OpenRouter shows in its dashboard
const APP_TITLE: &str = "banana";

/// Vision model behind an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct OpenAiVision {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    provider_name: String,
    key_env: &'static str,
    retry: RetryPolicy,
}

impl OpenAiVision {
    pub fn openrouter(
        api_key: Option<String>,
        model: impl Into<String>,
        base_url: Option<String>,
        transport: &TransportConfig,
    ) -> Result<Self> {
        Self::new(
            "openrouter",
            "OPENROUTER_API_KEY",
            api_key,
            base_url.unwrap_or_else(|| OPENROUTER_BASE_URL.to_string()),
            model.into(),
            transport,
        )
    }

    pub fn apicore(
        api_key: Option<String>,
        model: impl Into<String>,
        base_url: Option<String>,
        transport: &TransportConfig,
    ) -> Result<Self> {
        Self::new(
            "apicore",
            "APICORE_API_KEY",
            api_key,
            base_url.unwrap_or_else(|| APICORE_BASE_URL.to_string()),
            model.into(),
            transport,
        )
    }

    fn new(
        provider_name: &str,
        key_env: &'static str,
        api_key: Option<String>,
        base_url: String,
        model: String,
        transport: &TransportConfig,
    ) -> Result<Self> {
        Ok(Self {
            client: transport.build_client()?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            provider_name: provider_name.to_string(),
            key_env,
            retry: transport.retry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn to_chat_request(&self, request: &VisionRequest) -> ChatRequest {
        let mut messages = Vec::new();

        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: ChatContent::Text(system.clone()),
            });
        }

        // Images first, then the prompt text
        let mut parts: Vec<ChatPart> = request
            .images
            .iter()
            .map(|image| ChatPart::ImageUrl {
                image_url: ImageUrl {
                    url: image.data_url(),
                },
            })
            .collect();
        parts.push(ChatPart::Text {
            text: request.prompt.clone(),
        });
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: ChatContent::Parts(parts),
        });

        ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            response_format: request
                .wants_json()
                .then(|| ResponseFormatSpec {
                    format_type: "json_object".to_string(),
                }),
            modalities: None,
            seed: None,
        }
    }

    /// Send a single request (no retry)
    async fn generate_once(&self, request: &VisionRequest) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| missing_key(&self.provider_name, self.key_env))?;
        let body = self.to_chat_request(request);
        let url = format!("{}/chat/completions", self.base_url);

        tracing::debug!(
            provider = %self.provider_name,
            model = %self.model,
            images = request.images.len(),
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .header("X-Title", APP_TITLE)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", self.provider_name))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            bail!(
                "{} API request failed\n\nStatus: {}\nBody: {}",
                self.provider_name,
                status,
                error_body
            );
        }

        let chat: ChatResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", self.provider_name))?;

        if let Some(usage) = &chat.usage {
            tracing::debug!(
                provider = %self.provider_name,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Chat completion usage"
            );
        }

        let text = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        if text.trim().is_empty() {
            bail!("{} returned an empty completion", self.provider_name);
        }
        Ok(text)
    }
}

#[async_trait]
impl VisionModel for OpenAiVision {
    async fn generate(&self, request: &VisionRequest) -> Result<String> {
        with_retry_policy(self.retry, || self.generate_once(request)).await
    }

    fn name(&self) -> &str {
        &self.provider_name
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

// OpenAI chat completion wire types (shared with the OpenRouter image adapter)

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormatSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatMessage {
    pub role: String,
    pub content: ChatContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub(crate) enum ChatContent {
    Text(String),
    Parts(Vec<ChatPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ChatPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ResponseFormatSpec {
    #[serde(rename = "type")]
    pub format_type: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    /// Generated images (OpenRouter image-capable models)
    #[serde(default)]
    pub images: Vec<ChatImage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatImage {
    pub image_url: ImageUrl,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}
