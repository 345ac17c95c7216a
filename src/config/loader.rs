// Configuration loader
// Loads settings from a TOML file, then layers environment variables on top

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::constants::LOCAL_CONFIG_FILE;
use super::settings::Settings;

/// Load settings for this process.
///
/// Lookup order for the file: the explicit path (must exist), then
/// `./banana.toml`, then `~/.banana/config.toml`. With no file at all the
/// built-in defaults are used. Environment variables always win over the file.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    let mut settings = match resolve_config_path(explicit)? {
        Some(path) => {
            tracing::debug!(path = %path.display(), "Loading config file");
            load_from_file(&path)?
        }
        None => Settings::default(),
    };

    apply_env(&mut settings, |key| std::env::var(key).ok());

    settings
        .validate()
        .context("Invalid configuration")?;
    Ok(settings)
}

/// Parse one TOML config file.
pub fn load_from_file(path: &Path) -> Result<Settings> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.exists() {
            bail!("Config file not found: {}", path.display());
        }
        return Ok(Some(path.to_path_buf()));
    }

    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.exists() {
        return Ok(Some(local));
    }

    if let Some(home) = dirs::home_dir() {
        let global = home.join(".banana/config.toml");
        if global.exists() {
            return Ok(Some(global));
        }
    }

    Ok(None)
}

/// Layer environment variables over file settings.
///
/// `lookup` is injected so tests don't have to mutate the process environment.
pub fn apply_env<F>(settings: &mut Settings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("GOOGLE_API_KEY") {
        settings.api_keys.google = Some(v);
    }
    if let Some(v) = get("OPENROUTER_API_KEY") {
        settings.api_keys.openrouter = Some(v);
    }
    if let Some(v) = get("APICORE_API_KEY") {
        settings.api_keys.apicore = Some(v);
    }
    if let Some(v) = get("KIE_API_KEY") {
        settings.api_keys.kie = Some(v);
    }
    if let Some(v) = get("VLM_BASE_URL") {
        settings.vlm.base_url = Some(v);
    }
    if let Some(v) = get("VLM_PROVIDER") {
        settings.vlm.provider = v;
    }
    if let Some(v) = get("VLM_MODEL") {
        settings.vlm.model = v;
    }
    if let Some(v) = get("IMAGE_PROVIDER") {
        settings.image.provider = v;
    }
    if let Some(v) = get("IMAGE_MODEL") {
        settings.image.model = v;
    }
    if let Some(v) = get("OUTPUT_DIR") {
        settings.output.dir = PathBuf::from(v);
    }
    if let Some(v) = get("SKIP_SSL_VERIFICATION") {
        settings.transport.skip_ssl_verification = parse_bool(&v);
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Command-line overrides, applied last.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub vlm_provider: Option<String>,
    pub vlm_model: Option<String>,
    pub image_provider: Option<String>,
    pub image_model: Option<String>,
    pub refinement_iterations: Option<u32>,
    pub output_dir: Option<PathBuf>,
    pub bind: Option<String>,
}

impl SettingsOverrides {
    pub fn apply(&self, settings: &mut Settings) -> Result<()> {
        if let Some(v) = &self.vlm_provider {
            settings.vlm.provider = v.clone();
        }
        if let Some(v) = &self.vlm_model {
            settings.vlm.model = v.clone();
        }
        if let Some(v) = &self.image_provider {
            settings.image.provider = v.clone();
        }
        if let Some(v) = &self.image_model {
            settings.image.model = v.clone();
        }
        if let Some(v) = self.refinement_iterations {
            settings.pipeline.refinement_iterations = v;
        }
        if let Some(v) = &self.output_dir {
            settings.output.dir = v.clone();
        }
        if let Some(v) = &self.bind {
            settings.server.bind = v.clone();
        }
        settings
            .validate()
            .context("Invalid command-line overrides")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_load_nested_toml_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("banana.toml");
        fs::write(
            &path,
            r#"
[vlm]
provider = "openrouter"
model = "google/gemini-2.5-pro"

[pipeline]
refinement_iterations = 5
seed = 42

[output]
dir = "/tmp/banana-out"
save_iterations = false
"#,
        )
        .unwrap();

        let settings = load_from_file(&path).unwrap();
        assert_eq!(settings.vlm.provider, "openrouter");
        assert_eq!(settings.vlm.model, "google/gemini-2.5-pro");
        assert_eq!(settings.pipeline.refinement_iterations, 5);
        assert_eq!(settings.pipeline.seed, Some(42));
        assert!(!settings.output.save_iterations);
        // Untouched sections keep their defaults
        assert_eq!(settings.image.provider, "nanobanana");
        assert_eq!(settings.pipeline.num_retrieval_examples, 10);
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut settings = Settings::default();
        let env: HashMap<&str, &str> = [
            ("APICORE_API_KEY", "ak-123"),
            ("VLM_BASE_URL", "https://proxy.local/v1"),
            ("SKIP_SSL_VERIFICATION", "true"),
            ("IMAGE_PROVIDER", "openrouter_imagen"),
            ("KIE_API_KEY", "   "),
        ]
        .into_iter()
        .collect();

        apply_env(&mut settings, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(settings.api_keys.apicore.as_deref(), Some("ak-123"));
        assert_eq!(settings.vlm.base_url.as_deref(), Some("https://proxy.local/v1"));
        assert!(settings.transport.skip_ssl_verification);
        assert_eq!(settings.image.provider, "openrouter_imagen");
        // Blank values are ignored
        assert!(settings.api_keys.kie.is_none());
    }

    #[test]
    fn test_explicit_missing_config_is_error() {
        let result = load_settings(Some(Path::new("/definitely/not/here.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_overrides_apply_last() {
        let mut settings = Settings::default();
        let overrides = SettingsOverrides {
            vlm_provider: Some("gemini".to_string()),
            refinement_iterations: Some(1),
            ..Default::default()
        };
        overrides.apply(&mut settings).unwrap();
        assert_eq!(settings.vlm.provider, "gemini");
        assert_eq!(settings.pipeline.refinement_iterations, 1);

        let bad = SettingsOverrides {
            refinement_iterations: Some(0),
            ..Default::default()
        };
        assert!(bad.apply(&mut settings).is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("1"));
        assert!(parse_bool("TRUE"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("nope"));
    }
}
