// Pipeline types — requests, per-round records and run results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::config::constants::MAX_REFINEMENT_ITERATIONS;
use crate::error::{PipelineError, PipelineResult};

/// What the pipeline produces: an image-model diagram or a rendered plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DiagramKind {
    #[default]
    Methodology,
    StatisticalPlot,
}

impl DiagramKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagramKind::Methodology => "methodology",
            DiagramKind::StatisticalPlot => "statistical_plot",
        }
    }

    /// File stem for per-round images
    pub fn image_stem(&self) -> &'static str {
        match self {
            DiagramKind::Methodology => "diagram",
            DiagramKind::StatisticalPlot => "plot",
        }
    }
}

impl fmt::Display for DiagramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiagramKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "methodology" | "diagram" => Ok(DiagramKind::Methodology),
            "statistical_plot" | "plot" => Ok(DiagramKind::StatisticalPlot),
            other => Err(format!(
                "Unknown diagram type '{}'. Expected 'methodology' or 'statistical_plot'",
                other
            )),
        }
    }
}

/// Input to one generation run. Never mutated once the run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub source_context: String,
    /// The figure caption, or the visual intent for plots
    pub communicative_intent: String,
    #[serde(default)]
    pub diagram_kind: DiagramKind,
    /// Data to plot; only meaningful for statistical plots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<serde_json::Value>,
    /// Overrides the configured number of refinement rounds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refinement_iterations: Option<u32>,
}

impl GenerationRequest {
    pub fn methodology(source_context: impl Into<String>, caption: impl Into<String>) -> Self {
        Self {
            source_context: source_context.into(),
            communicative_intent: caption.into(),
            diagram_kind: DiagramKind::Methodology,
            raw_data: None,
            refinement_iterations: None,
        }
    }

    pub fn statistical_plot(
        source_context: impl Into<String>,
        intent: impl Into<String>,
        raw_data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            source_context: source_context.into(),
            communicative_intent: intent.into(),
            diagram_kind: DiagramKind::StatisticalPlot,
            raw_data,
            refinement_iterations: None,
        }
    }

    pub fn with_iterations(mut self, iterations: Option<u32>) -> Self {
        self.refinement_iterations = iterations;
        self
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.source_context.trim().is_empty() {
            return Err(PipelineError::InvalidRequest(
                "source_context must not be empty".to_string(),
            ));
        }
        if self.communicative_intent.trim().is_empty() {
            return Err(PipelineError::InvalidRequest(
                "communicative_intent must not be empty".to_string(),
            ));
        }
        if let Some(iterations) = self.refinement_iterations {
            if !(1..=MAX_REFINEMENT_ITERATIONS).contains(&iterations) {
                return Err(PipelineError::InvalidRequest(format!(
                    "refinement_iterations must be between 1 and {}",
                    MAX_REFINEMENT_ITERATIONS
                )));
            }
        }
        if self.diagram_kind == DiagramKind::Methodology && self.raw_data.is_some() {
            tracing::warn!("raw_data is ignored for methodology diagrams");
        }
        Ok(())
    }
}

/// Everything decided before the first render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningArtifact {
    /// Reference ids in relevance order
    pub retrieved_examples: Vec<String>,
    pub initial_description: String,
    /// Styled description; the working description for round 1
    pub optimized_description: String,
}

const NO_ISSUES: &str = "No issues found. Image is publication-ready.";

/// Critic output for one rendered image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CritiqueVerdict {
    #[serde(default)]
    pub critic_suggestions: Vec<String>,
    #[serde(default)]
    pub revised_description: Option<String>,
}

impl CritiqueVerdict {
    pub fn new(critic_suggestions: Vec<String>, revised_description: Option<String>) -> Self {
        Self {
            critic_suggestions,
            revised_description: revised_description.filter(|d| !d.trim().is_empty()),
        }
    }

    pub fn needs_revision(&self) -> bool {
        !self.critic_suggestions.is_empty()
    }

    /// First three suggestions, for progress messages.
    pub fn summary(&self) -> String {
        if self.critic_suggestions.is_empty() {
            return NO_ISSUES.to_string();
        }
        self.critic_suggestions
            .iter()
            .take(3)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// One visualize + critique round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based
    pub iteration: u32,
    /// Description the image was rendered from
    pub description: String,
    pub image_path: PathBuf,
    pub critique: CritiqueVerdict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub diagram_kind: DiagramKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub vlm_provider: String,
    pub vlm_model: String,
    pub image_provider: String,
    pub image_model: String,
    /// Rounds actually executed
    pub refinement_iterations: u32,
    pub seed: Option<u64>,
    pub config_snapshot: serde_json::Value,
}

/// Result of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutput {
    /// `final_output.png` inside the run directory
    pub image_path: PathBuf,
    /// Description of the final image
    pub description: String,
    pub iterations: Vec<IterationRecord>,
    pub planning: PlanningArtifact,
    pub metadata: RunMetadata,
}

impl GenerationOutput {
    pub fn run_dir(&self) -> Option<&std::path::Path> {
        self.image_path.parent()
    }
}
