// Visualizer — turn a description into an image
//
// Methodology diagrams go straight to the image model. Statistical plots go
// through the vision model for matplotlib code, which `PlotRunner` executes.

use std::path::Path;

use crate::config::constants::{DIAGRAM_HEIGHT, DIAGRAM_WIDTH};
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::DiagramKind;
use crate::prompts::{Agent, PromptLibrary};
use crate::providers::{ImageModel, ImageRequest, VisionModel, VisionRequest};

use super::plot_runner::extract_code;

/// Render a methodology diagram and write it to `output_path`.
pub async fn render_diagram(
    image_model: &dyn ImageModel,
    prompts: &PromptLibrary,
    description: &str,
    seed: Option<u64>,
    output_path: &Path,
) -> PipelineResult<()> {
    let prompt = prompts.render(
        DiagramKind::Methodology,
        Agent::Visualizer,
        &[("description", description)],
    );
    let request = ImageRequest::new(prompt, DIAGRAM_WIDTH, DIAGRAM_HEIGHT).with_seed(seed);

    tracing::info!(
        provider = image_model.name(),
        path = %output_path.display(),
        "Generating diagram image"
    );
    let image = image_model
        .generate(&request)
        .await
        .map_err(|e| PipelineError::provider("visualize", e))?;

    if let Some(parent) = output_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PipelineError::io(parent, e))?;
    }
    tokio::fs::write(output_path, &image.bytes)
        .await
        .map_err(|e| PipelineError::io(output_path, e))?;
    Ok(())
}

/// Description for the code model, with the raw data appended as JSON.
pub fn plot_code_prompt(description: &str, raw_data: Option<&serde_json::Value>) -> String {
    let has_data = match raw_data {
        None | Some(serde_json::Value::Null) => false,
        Some(serde_json::Value::Array(items)) => !items.is_empty(),
        Some(serde_json::Value::Object(map)) => !map.is_empty(),
        Some(_) => true,
    };
    match raw_data {
        Some(data) if has_data => {
            let pretty = serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
            format!("{}\n\n## Raw Data\n```json\n{}\n```", description, pretty)
        }
        _ => description.to_string(),
    }
}

/// Ask the vision model for plotting code and extract the script body.
pub async fn write_plot_code(
    vlm: &dyn VisionModel,
    prompts: &PromptLibrary,
    description: &str,
    raw_data: Option<&serde_json::Value>,
) -> PipelineResult<String> {
    let full_description = plot_code_prompt(description, raw_data);
    let prompt = prompts.render(
        DiagramKind::StatisticalPlot,
        Agent::Visualizer,
        &[("description", full_description.as_str())],
    );

    tracing::info!("Generating plot code");
    let response = vlm
        .generate(
            &VisionRequest::new(prompt)
                .with_temperature(0.3)
                .with_max_tokens(4096),
        )
        .await
        .map_err(|e| PipelineError::provider("visualize", e))?;

    Ok(extract_code(&response).to_string())
}
