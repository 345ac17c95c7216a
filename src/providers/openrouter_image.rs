// OpenRouter image generation
//
// Uses chat completions with `modalities: ["image", "text"]`. OpenRouter has no
// native aspect-ratio parameter, so the target format is described in the prompt.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;

use super::openai::{
    ChatContent, ChatMessage, ChatRequest, ChatResponse, OPENROUTER_BASE_URL,
};
use super::retry::{with_retry_policy, RetryPolicy};
use super::transport::TransportConfig;
use super::types::ImageRequest;
use super::{missing_key, ImageModel};
use crate::imaging::ImageData;

static INLINE_DATA_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"data:image/[^;]+;base64,[A-Za-z0-9+/=]+").expect("valid data URL regex")
});

#[derive(Clone)]
pub struct OpenRouterImage {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    retry: RetryPolicy,
}

impl OpenRouterImage {
    pub fn new(
        api_key: Option<String>,
        model: impl Into<String>,
        transport: &TransportConfig,
    ) -> Result<Self> {
        Ok(Self {
            client: transport.build_client()?,
            api_key,
            base_url: OPENROUTER_BASE_URL.to_string(),
            model: model.into(),
            retry: transport.retry,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn to_chat_request(&self, request: &ImageRequest) -> ChatRequest {
        let mut prompt = format!(
            "{}\n\nGenerate this as a {} image.",
            request.prompt,
            aspect_ratio_hint(request.width, request.height)
        );
        if let Some(negative) = request.negative_prompt.as_deref().filter(|n| !n.is_empty()) {
            prompt.push_str(&format!("\n\nAvoid: {}", negative));
        }

        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: ChatContent::Text(prompt),
            }],
            temperature: None,
            max_tokens: None,
            response_format: None,
            modalities: Some(vec!["image".to_string(), "text".to_string()]),
            seed: request.seed,
        }
    }

    async fn generate_once(&self, request: &ImageRequest) -> Result<ImageData> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| missing_key("OpenRouter", "OPENROUTER_API_KEY"))?;

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .header("X-Title", "banana")
            .json(&self.to_chat_request(request))
            .send()
            .await
            .context("Failed to send image request to OpenRouter")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            bail!(
                "OpenRouter image request failed\n\nStatus: {}\nBody: {}",
                status,
                error_body
            );
        }

        let chat: ChatResponse = response
            .json()
            .await
            .context("Failed to parse OpenRouter image response")?;
        extract_image(&self.model, chat)
    }
}

/// Pull the first image out of a chat response: the `images` array first,
/// then any data URL inlined in the text content.
fn extract_image(model: &str, chat: ChatResponse) -> Result<ImageData> {
    let Some(choice) = chat.choices.into_iter().next() else {
        bail!("OpenRouter response for {} had no choices", model);
    };
    let message = choice.message;

    for image in &message.images {
        if image.image_url.url.starts_with("data:image/") {
            return ImageData::from_data_url(&image.image_url.url);
        }
    }

    let content = message.content.unwrap_or_default();
    if let Some(found) = INLINE_DATA_URL.find(&content) {
        return ImageData::from_data_url(found.as_str());
    }

    tracing::error!(model, "No image data in OpenRouter response");
    let preview: String = content.chars().take(200).collect();
    bail!(
        "OpenRouter response for {} did not contain image data. Content preview: {}",
        model,
        preview
    )
}

/// Aspect ratio phrase appended to the prompt.
pub fn aspect_ratio_hint(width: u32, height: u32) -> &'static str {
    let ratio = width as f64 / height.max(1) as f64;
    if ratio > 1.5 {
        "wide landscape format (16:9)"
    } else if ratio > 1.2 {
        "landscape format (3:2)"
    } else if ratio < 0.67 {
        "tall portrait format (9:16)"
    } else if ratio < 0.83 {
        "portrait format (2:3)"
    } else {
        "square format (1:1)"
    }
}

#[async_trait]
impl ImageModel for OpenRouterImage {
    async fn generate(&self, request: &ImageRequest) -> Result<ImageData> {
        with_retry_policy(self.retry, || self.generate_once(request)).await
    }

    fn name(&self) -> &str {
        "openrouter_imagen"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}
