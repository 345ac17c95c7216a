// Configuration structs

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use super::constants::*;

/// Resolved settings for the whole process.
///
/// Every section defaults independently, so a config file only needs the keys
/// it wants to change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub vlm: VlmSettings,
    pub image: ImageSettings,
    pub pipeline: PipelineSettings,
    pub reference: ReferenceSettings,
    pub output: OutputSettings,
    pub server: ServerSettings,
    pub transport: TransportSettings,
    /// Read from the config file or environment, never written back out
    #[serde(skip_serializing)]
    pub api_keys: ApiKeys,
}

/// Vision-language model used by every text step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VlmSettings {
    /// "apicore", "openrouter" or "gemini"
    pub provider: String,
    pub model: String,
    /// Overrides the provider's default endpoint
    pub base_url: Option<String>,
}

impl Default for VlmSettings {
    fn default() -> Self {
        Self {
            provider: "apicore".to_string(),
            model: "gemini-2.5-flash".to_string(),
            base_url: None,
        }
    }
}

/// Image generation model used for methodology diagrams.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSettings {
    /// "nanobanana", "openrouter_imagen" or "google_imagen"
    pub provider: String,
    pub model: String,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            provider: "nanobanana".to_string(),
            model: "google/nano-banana".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub num_retrieval_examples: usize,
    pub refinement_iterations: u32,
    /// Passed to the image model for reproducible renders
    pub seed: Option<u64>,
    pub plot_timeout_secs: u64,
    /// Interpreter used to execute generated plot code
    pub python: String,
    /// Directory with prompt template overrides (`<kind>/<agent>.txt`)
    pub prompt_dir: Option<PathBuf>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            num_retrieval_examples: DEFAULT_RETRIEVAL_EXAMPLES,
            refinement_iterations: DEFAULT_REFINEMENT_ITERATIONS,
            seed: None,
            plot_timeout_secs: DEFAULT_PLOT_TIMEOUT_SECS,
            python: "python3".to_string(),
            prompt_dir: None,
        }
    }
}

impl PipelineSettings {
    pub fn plot_timeout(&self) -> Duration {
        Duration::from_secs(self.plot_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceSettings {
    /// Directory holding `index.json` and the example images
    pub path: PathBuf,
    /// Directory with `methodology_style_guide.md` / `plot_style_guide.md`
    pub guidelines_path: PathBuf,
}

impl Default for ReferenceSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/reference_sets"),
            guidelines_path: PathBuf::from("data/guidelines"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub dir: PathBuf,
    /// Persist planning.json, per-round details and metadata.json
    pub save_iterations: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("outputs"),
            save_iterations: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    pub max_concurrent_tasks: usize,
    /// Seconds a finished task is kept before eviction
    pub finished_task_ttl_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: DEFAULT_HTTP_ADDR.to_string(),
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
            finished_task_ttl_secs: DEFAULT_FINISHED_TASK_TTL_SECS,
        }
    }
}

/// Outbound connection settings, handed to every provider client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Accept invalid TLS certificates (corporate proxies, self-signed gateways)
    pub skip_ssl_verification: bool,
    pub request_timeout_secs: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            skip_ssl_verification: false,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Provider credentials.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub google: Option<String>,
    pub openrouter: Option<String>,
    pub apicore: Option<String>,
    pub kie: Option<String>,
}

impl fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeys")
            .field("google", &mask_key(self.google.as_deref()))
            .field("openrouter", &mask_key(self.openrouter.as_deref()))
            .field("apicore", &mask_key(self.apicore.as_deref()))
            .field("kie", &mask_key(self.kie.as_deref()))
            .finish()
    }
}

/// Render a key for logs: first 8 and last 4 characters only.
pub fn mask_key(key: Option<&str>) -> String {
    match key {
        None | Some("") => "(empty)".to_string(),
        Some(k) if k.chars().count() > 12 => {
            let chars: Vec<char> = k.chars().collect();
            let head: String = chars[..8].iter().collect();
            let tail: String = chars[chars.len() - 4..].iter().collect();
            format!("{}...{}", head, tail)
        }
        Some(_) => "(short)".to_string(),
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_REFINEMENT_ITERATIONS).contains(&self.pipeline.refinement_iterations) {
            bail!(
                "pipeline.refinement_iterations must be between 1 and {}",
                MAX_REFINEMENT_ITERATIONS
            );
        }
        if self.pipeline.num_retrieval_examples == 0 {
            bail!("pipeline.num_retrieval_examples must be at least 1");
        }
        if self.pipeline.plot_timeout_secs == 0 {
            bail!("pipeline.plot_timeout_secs must be at least 1");
        }
        if self.server.max_concurrent_tasks == 0 {
            bail!("server.max_concurrent_tasks must be at least 1");
        }
        if self.transport.request_timeout_secs == 0 {
            bail!("transport.request_timeout_secs must be at least 1");
        }
        Ok(())
    }

    /// Resolved configuration for run metadata. API keys are never included.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}
