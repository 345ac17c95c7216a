// Run directory artifacts
//
// <output_dir>/<run_id>/
//   planning.json            retrieved ids + initial/optimized description
//   diagram_iter_{i}.png     or plot_iter_{i}.png
//   iter_{i}/details.json    description + critique for round i
//   final_output.png
//   metadata.json

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, PipelineResult};

use super::types::{CritiqueVerdict, DiagramKind, IterationRecord};

pub const PLANNING_FILE: &str = "planning.json";
pub const METADATA_FILE: &str = "metadata.json";
pub const DETAILS_FILE: &str = "details.json";

/// `run_YYYYmmdd_HHMMSS_xxxxxx` with a random hex suffix.
pub fn new_run_id() -> String {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("run_{}_{}", stamp, &suffix[..6])
}

pub fn iteration_image_path(run_dir: &Path, kind: DiagramKind, iteration: u32) -> PathBuf {
    run_dir.join(format!("{}_iter_{}.png", kind.image_stem(), iteration))
}

pub fn details_path(run_dir: &Path, iteration: u32) -> PathBuf {
    run_dir.join(format!("iter_{}", iteration)).join(DETAILS_FILE)
}

/// Pretty-print `value` to `path`, creating parent directories.
pub async fn write_json<T: Serialize>(
    path: &Path,
    value: &T,
    what: &'static str,
) -> PipelineResult<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|source| PipelineError::Serialization { what, source })?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PipelineError::io(parent, e))?;
    }
    tokio::fs::write(path, json)
        .await
        .map_err(|e| PipelineError::io(path, e))
}

/// On-disk shape of `iter_{i}/details.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationDetails {
    pub description: String,
    pub critique: CritiqueVerdict,
}

impl From<&IterationRecord> for IterationDetails {
    fn from(record: &IterationRecord) -> Self {
        Self {
            description: record.description.clone(),
            critique: record.critique.clone(),
        }
    }
}

pub async fn write_details(run_dir: &Path, record: &IterationRecord) -> PipelineResult<()> {
    write_json(
        &details_path(run_dir, record.iteration),
        &IterationDetails::from(record),
        "iteration details",
    )
    .await
}

/// Read back a round's details, e.g. to resume or inspect a run.
pub fn read_details(run_dir: &Path, iteration: u32) -> anyhow::Result<IterationDetails> {
    use anyhow::Context;
    let path = details_path(run_dir, iteration);
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid {}", path.display()))
}
