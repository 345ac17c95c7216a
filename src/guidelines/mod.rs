// Style guidelines handed to the stylist, one document per diagram kind

use std::path::Path;

use crate::pipeline::DiagramKind;

pub const DEFAULT_METHODOLOGY_GUIDELINES: &str = include_str!("methodology_style_guide.md");
pub const DEFAULT_PLOT_GUIDELINES: &str = include_str!("plot_style_guide.md");

pub const METHODOLOGY_FILE: &str = "methodology_style_guide.md";
pub const PLOT_FILE: &str = "plot_style_guide.md";

/// Loaded once at pipeline construction and treated as static afterwards.
#[derive(Debug, Clone)]
pub struct Guidelines {
    methodology: String,
    plot: String,
}

impl Default for Guidelines {
    fn default() -> Self {
        Self {
            methodology: DEFAULT_METHODOLOGY_GUIDELINES.to_string(),
            plot: DEFAULT_PLOT_GUIDELINES.to_string(),
        }
    }
}

impl Guidelines {
    pub fn new(methodology: impl Into<String>, plot: impl Into<String>) -> Self {
        Self {
            methodology: methodology.into(),
            plot: plot.into(),
        }
    }

    /// Read custom guides from `dir`, falling back to the built-in ones per file.
    pub fn load(dir: Option<&Path>) -> Self {
        let read = |file: &str, fallback: &str| -> String {
            let Some(dir) = dir else {
                return fallback.to_string();
            };
            let path = dir.join(file);
            match std::fs::read_to_string(&path) {
                Ok(text) if !text.trim().is_empty() => {
                    tracing::info!(path = %path.display(), "Loaded custom guidelines");
                    text
                }
                Ok(_) => fallback.to_string(),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => fallback.to_string(),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read guidelines; using defaults");
                    fallback.to_string()
                }
            }
        };

        Self {
            methodology: read(METHODOLOGY_FILE, DEFAULT_METHODOLOGY_GUIDELINES),
            plot: read(PLOT_FILE, DEFAULT_PLOT_GUIDELINES),
        }
    }

    pub fn for_kind(&self, kind: DiagramKind) -> &str {
        match kind {
            DiagramKind::Methodology => &self.methodology,
            DiagramKind::StatisticalPlot => &self.plot,
        }
    }
}
