// Google Gemini API providers
//
// `GeminiVision` answers prompts with `generateContent`; `GoogleImagen` uses the
// same endpoint with an IMAGE response modality to render diagrams.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::retry::{with_retry_policy, RetryPolicy};
use super::transport::TransportConfig;
use super::types::{ImageRequest, VisionRequest};
use super::{missing_key, ImageModel, VisionModel};
use crate::imaging::ImageData;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Shared HTTP plumbing for both Gemini adapters.
#[derive(Clone)]
struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    retry: RetryPolicy,
}

impl GeminiClient {
    fn new(api_key: Option<String>, transport: &TransportConfig) -> Result<Self> {
        Ok(Self {
            client: transport.build_client()?,
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
            retry: transport.retry,
        })
    }

    async fn generate_content(
        &self,
        model: &str,
        body: &GeminiRequest,
    ) -> Result<GeminiResponse> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| missing_key("Gemini", "GOOGLE_API_KEY"))?;
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, api_key
        );

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .context("Failed to send request to Gemini API")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            bail!(
                "Gemini API request failed\n\nStatus: {}\nBody: {}",
                status,
                error_body
            );
        }

        response
            .json()
            .await
            .context("Failed to parse Gemini API response")
    }
}

/// Gemini vision-language model.
#[derive(Clone)]
pub struct GeminiVision {
    inner: GeminiClient,
    model: String,
}

impl GeminiVision {
    pub fn new(
        api_key: Option<String>,
        model: impl Into<String>,
        transport: &TransportConfig,
    ) -> Result<Self> {
        Ok(Self {
            inner: GeminiClient::new(api_key, transport)?,
            model: model.into(),
        })
    }

    /// Point at a different API root (proxies, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.inner.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn to_gemini_request(&self, request: &VisionRequest) -> GeminiRequest {
        let mut parts: Vec<GeminiPart> = request
            .images
            .iter()
            .map(GeminiPart::inline)
            .collect();
        parts.push(GeminiPart::text(&request.prompt));

        GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts,
            }],
            system_instruction: request.system.as_ref().map(|system| GeminiContent {
                role: None,
                parts: vec![GeminiPart::text(system)],
            }),
            generation_config: GeminiGenerationConfig {
                temperature: Some(request.temperature),
                max_output_tokens: Some(request.max_tokens),
                response_mime_type: request
                    .wants_json()
                    .then(|| "application/json".to_string()),
                ..Default::default()
            },
        }
    }

    async fn generate_once(&self, request: &VisionRequest) -> Result<String> {
        let body = self.to_gemini_request(request);
        tracing::debug!(model = %self.model, images = request.images.len(), "Sending Gemini request");
        let response = self.inner.generate_content(&self.model, &body).await?;

        let text = response.text();
        if text.trim().is_empty() {
            bail!("Gemini returned no text for model {}", self.model);
        }
        Ok(text)
    }
}

#[async_trait]
impl VisionModel for GeminiVision {
    async fn generate(&self, request: &VisionRequest) -> Result<String> {
        with_retry_policy(self.inner.retry, || self.generate_once(request)).await
    }

    fn name(&self) -> &str {
        "gemini"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn is_available(&self) -> bool {
        self.inner.api_key.is_some()
    }
}

/// Gemini image generation (`responseModalities: ["IMAGE"]`).
#[derive(Clone)]
pub struct GoogleImagen {
    inner: GeminiClient,
    model: String,
}

impl GoogleImagen {
    pub const DEFAULT_MODEL: &'static str = "gemini-3-pro-image-preview";

    pub fn new(
        api_key: Option<String>,
        model: impl Into<String>,
        transport: &TransportConfig,
    ) -> Result<Self> {
        Ok(Self {
            inner: GeminiClient::new(api_key, transport)?,
            model: model.into(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.inner.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn to_gemini_request(&self, request: &ImageRequest) -> GeminiRequest {
        GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart::text(&request.prompt_with_avoid())],
            }],
            system_instruction: None,
            generation_config: GeminiGenerationConfig {
                response_modalities: Some(vec!["IMAGE".to_string()]),
                image_config: Some(GeminiImageConfig {
                    aspect_ratio: imagen_aspect_ratio(request.width, request.height).to_string(),
                    image_size: imagen_size(request.width, request.height).to_string(),
                }),
                ..Default::default()
            },
        }
    }

    async fn generate_once(&self, request: &ImageRequest) -> Result<ImageData> {
        let body = self.to_gemini_request(request);
        let response = self.inner.generate_content(&self.model, &body).await?;

        let Some(blob) = response.first_inline_data() else {
            tracing::error!(model = %self.model, "No image data in Gemini response");
            bail!("Gemini image response did not contain image data");
        };
        ImageData::from_base64(&blob.data).context("Gemini returned an undecodable image")
    }
}

#[async_trait]
impl ImageModel for GoogleImagen {
    async fn generate(&self, request: &ImageRequest) -> Result<ImageData> {
        with_retry_policy(self.inner.retry, || self.generate_once(request)).await
    }

    fn name(&self) -> &str {
        "google_imagen"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn is_available(&self) -> bool {
        self.inner.api_key.is_some()
    }
}

/// Closest aspect ratio label Gemini image models accept.
pub fn imagen_aspect_ratio(width: u32, height: u32) -> &'static str {
    let ratio = width as f64 / height.max(1) as f64;
    if ratio > 1.5 {
        "16:9"
    } else if ratio > 1.2 {
        "3:2"
    } else if ratio < 0.67 {
        "9:16"
    } else if ratio < 0.83 {
        "2:3"
    } else {
        "1:1"
    }
}

pub fn imagen_size(width: u32, height: u32) -> &'static str {
    match width.max(height) {
        0..=1024 => "1K",
        1025..=2048 => "2K",
        _ => "4K",
    }
}

// Gemini API types

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<GeminiBlob>,
    /// Thinking models mark reasoning parts; those are not answer text
    #[serde(default, skip_serializing)]
    thought: Option<bool>,
}

impl GeminiPart {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Default::default()
        }
    }

    fn inline(image: &ImageData) -> Self {
        Self {
            inline_data: Some(GeminiBlob {
                mime_type: image.media_type.clone(),
                data: image.to_base64(),
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiBlob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_config: Option<GeminiImageConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiImageConfig {
    aspect_ratio: String,
    image_size: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
}

impl GeminiResponse {
    fn parts(&self) -> impl Iterator<Item = &GeminiPart> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .into_iter()
            .flat_map(|content| content.parts.iter())
    }

    /// Concatenated answer text, skipping thought parts
    fn text(&self) -> String {
        self.parts()
            .filter(|p| p.thought != Some(true))
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }

    fn first_inline_data(&self) -> Option<&GeminiBlob> {
        self.parts().find_map(|p| p.inline_data.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::blank_png;

    fn transport() -> TransportConfig {
        TransportConfig::default().with_retry(RetryPolicy::none())
    }

    #[test]
    fn test_vision_request_shape() {
        let provider = GeminiVision::new(Some("key".into()), "gemini-2.5-flash", &transport()).unwrap();
        let request = VisionRequest::new("what is shown?")
            .with_images(vec![blank_png(2, 2).unwrap()])
            .with_system("you are a critic")
            .with_temperature(0.3)
            .json();

        let body = serde_json::to_value(provider.to_gemini_request(&request)).unwrap();
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[1]["text"], "what is shown?");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "you are a critic");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 4096);
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
    }

    #[test]
    fn test_response_text_skips_thoughts() {
        let response: GeminiResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"text": "thinking...", "thought": true},
                        {"text": "{\"a\": "},
                        {"text": "1}"}
                    ]
                },
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(response.text(), "{\"a\": 1}");
        assert!(response.first_inline_data().is_none());
    }

    #[test]
    fn test_imagen_aspect_and_size() {
        assert_eq!(imagen_aspect_ratio(1792, 1024), "16:9");
        assert_eq!(imagen_aspect_ratio(1024, 1024), "1:1");
        assert_eq!(imagen_aspect_ratio(600, 1200), "9:16");
        assert_eq!(imagen_size(1024, 768), "1K");
        assert_eq!(imagen_size(1792, 1024), "2K");
        assert_eq!(imagen_size(4096, 2048), "4K");
    }

    #[test]
    fn test_imagen_request_shape() {
        let provider =
            GoogleImagen::new(Some("key".into()), GoogleImagen::DEFAULT_MODEL, &transport()).unwrap();
        let request = ImageRequest::new("a pipeline", 1792, 1024).with_negative_prompt("clutter");
        let body = serde_json::to_value(provider.to_gemini_request(&request)).unwrap();
        assert_eq!(
            body["contents"][0]["parts"][0]["text"],
            "a pipeline\n\nAvoid: clutter"
        );
        assert_eq!(body["generationConfig"]["responseModalities"][0], "IMAGE");
        assert_eq!(body["generationConfig"]["imageConfig"]["aspectRatio"], "16:9");
        assert!(body.get("systemInstruction").is_none());
    }
}
