// Provider factory
//
// Creates the vision and image models named in `Settings`

use anyhow::{bail, Result};
use std::sync::Arc;

use super::gemini::{GeminiVision, GoogleImagen};
use super::nanobanana::NanoBananaImage;
use super::openai::OpenAiVision;
use super::openrouter_image::OpenRouterImage;
use super::transport::TransportConfig;
use super::{ImageModel, VisionModel};
use crate::config::{mask_key, Settings};

pub const VISION_PROVIDERS: &[&str] = &["apicore", "openrouter", "gemini"];
pub const IMAGE_PROVIDERS: &[&str] = &["nanobanana", "openrouter_imagen", "google_imagen"];

/// Create the vision-language model selected by `settings.vlm.provider`.
pub fn create_vision_model(settings: &Settings) -> Result<Arc<dyn VisionModel>> {
    let transport = TransportConfig::from_settings(&settings.transport);
    let provider = settings.vlm.provider.to_ascii_lowercase();
    let model = settings.vlm.model.clone();
    let base_url = settings.vlm.base_url.clone();
    let keys = &settings.api_keys;

    let vlm: Arc<dyn VisionModel> = match provider.as_str() {
        "gemini" => Arc::new(GeminiVision::new(keys.google.clone(), model, &transport)?),
        "openrouter" => Arc::new(OpenAiVision::openrouter(
            keys.openrouter.clone(),
            model,
            base_url,
            &transport,
        )?),
        "apicore" => Arc::new(OpenAiVision::apicore(
            keys.apicore.clone(),
            model,
            base_url,
            &transport,
        )?),
        other => bail!(
            "Unknown VLM provider: {}. Available: {}",
            other,
            VISION_PROVIDERS.join(", ")
        ),
    };

    let key = match provider.as_str() {
        "gemini" => keys.google.as_deref(),
        "openrouter" => keys.openrouter.as_deref(),
        _ => keys.apicore.as_deref(),
    };
    tracing::info!(
        provider = %vlm.name(),
        model = %vlm.model_name(),
        base_url = ?settings.vlm.base_url,
        api_key = %mask_key(key),
        "Created VLM provider"
    );
    if !vlm.is_available() {
        tracing::warn!(provider = %vlm.name(), "VLM provider has no API key; calls will fail");
    }
    Ok(vlm)
}

/// Create the image model selected by `settings.image.provider`.
pub fn create_image_model(settings: &Settings) -> Result<Arc<dyn ImageModel>> {
    let transport = TransportConfig::from_settings(&settings.transport);
    let model = settings.image.model.clone();
    let keys = &settings.api_keys;

    let image: Arc<dyn ImageModel> = match settings.image.provider.to_ascii_lowercase().as_str() {
        "google_imagen" => Arc::new(GoogleImagen::new(keys.google.clone(), model, &transport)?),
        "openrouter_imagen" => Arc::new(OpenRouterImage::new(
            keys.openrouter.clone(),
            model,
            &transport,
        )?),
        "nanobanana" => Arc::new(NanoBananaImage::new(keys.kie.clone(), model, &transport)?),
        other => bail!(
            "Unknown image provider: {}. Available: {}",
            other,
            IMAGE_PROVIDERS.join(", ")
        ),
    };

    tracing::info!(provider = %image.name(), model = %image.model_name(), "Created image provider");
    if !image.is_available() {
        tracing::warn!(provider = %image.name(), "Image provider has no API key; calls will fail");
    }
    Ok(image)
}
