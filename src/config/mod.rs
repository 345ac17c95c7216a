// Configuration module
// Public interface for settings loading

pub mod constants;
mod loader;
mod settings;

pub use loader::{apply_env, load_from_file, load_settings, SettingsOverrides};
pub use settings::{
    mask_key, ApiKeys, ImageSettings, OutputSettings, PipelineSettings, ReferenceSettings,
    ServerSettings, Settings, TransportSettings, VlmSettings,
};
