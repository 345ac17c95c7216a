// Capability ports and their vendor implementations
//
// The pipeline only ever talks to two traits: `VisionModel` (prompt + images
// in, text out) and `ImageModel` (prompt in, image out). Each vendor adapter
// owns its HTTP client, built from an injected `TransportConfig`, and retries
// transient failures itself.

use anyhow::Result;
use async_trait::async_trait;

pub mod factory;
pub mod gemini;
pub mod nanobanana;
pub mod openai;
pub mod openrouter_image;
pub mod retry;
pub mod transport;
pub mod types;

pub use factory::{create_image_model, create_vision_model, IMAGE_PROVIDERS, VISION_PROVIDERS};
pub use retry::{with_retry, with_retry_policy, RetryPolicy};
pub use transport::TransportConfig;
pub use types::{ImageRequest, ResponseFormat, VisionRequest};

use crate::imaging::ImageData;

/// Text generation with optional image inputs.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Generate text for the request, retrying transient failures internally
    async fn generate(&self, request: &VisionRequest) -> Result<String>;

    /// Provider identifier (e.g. "openrouter", "gemini")
    fn name(&self) -> &str;

    fn model_name(&self) -> &str;

    /// Whether credentials are present
    fn is_available(&self) -> bool {
        true
    }
}

/// Image generation from a text prompt.
#[async_trait]
pub trait ImageModel: Send + Sync {
    async fn generate(&self, request: &ImageRequest) -> Result<ImageData>;

    fn name(&self) -> &str;

    fn model_name(&self) -> &str;

    fn is_available(&self) -> bool {
        true
    }
}

/// Error for a provider constructed without its API key.
pub(crate) fn missing_key(provider: &str, env_var: &str) -> anyhow::Error {
    anyhow::anyhow!(
        "{} API key is not configured. Set {} in the environment or .env file.",
        provider,
        env_var
    )
}
