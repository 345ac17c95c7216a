// Error types — fatal run failures and recoverable step outcomes
//
// Fatal conditions abort a run and surface as `PipelineError`. Conditions with
// a documented fallback (malformed model output, failed plot rendering) never
// become errors: they come back as `Outcome::Recovered` carrying the fallback.

use std::path::{Path, PathBuf};

/// A failure that aborts the whole generation run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("reference catalog unavailable at {path}: {reason}")]
    Catalog { path: PathBuf, reason: String },

    #[error("{step} failed: {source:#}")]
    Provider {
        step: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {what}: {source}")]
    Serialization {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("run cancelled")]
    Cancelled,
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn provider(step: &'static str, source: anyhow::Error) -> Self {
        Self::Provider { step, source }
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result of a step that has a conservative fallback.
///
/// `Recovered` still carries a usable value, so callers cannot mistake a
/// fallback for a fatal error, and fatal errors stay in `PipelineError`.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Clean(T),
    Recovered { value: T, reason: String },
}

impl<T> Outcome<T> {
    pub fn recovered(value: T, reason: impl Into<String>) -> Self {
        Self::Recovered {
            value,
            reason: reason.into(),
        }
    }

    pub fn is_recovered(&self) -> bool {
        matches!(self, Self::Recovered { .. })
    }

    pub fn value(&self) -> &T {
        match self {
            Self::Clean(value) | Self::Recovered { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Clean(value) | Self::Recovered { value, .. } => value,
        }
    }

    /// Unwrap the value, logging the reason when a fallback was used.
    pub fn into_value_logged(self, step: &str) -> T {
        match self {
            Self::Clean(value) => value,
            Self::Recovered { value, reason } => {
                tracing::warn!(step, reason = %reason, "Using fallback result");
                value
            }
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Clean(value) => Outcome::Clean(f(value)),
            Self::Recovered { value, reason } => Outcome::Recovered {
                value: f(value),
                reason,
            },
        }
    }
}
