// Critic — review a rendered image against its description

use serde_json::Value;
use std::path::Path;

use crate::error::{Outcome, PipelineError, PipelineResult};
use crate::imaging::ImageData;
use crate::pipeline::{CritiqueVerdict, GenerationRequest};
use crate::prompts::{Agent, PromptLibrary};
use crate::providers::{VisionModel, VisionRequest};

use super::json::{non_empty_str, parse_json_object, value_to_string};

pub async fn critique(
    vlm: &dyn VisionModel,
    prompts: &PromptLibrary,
    request: &GenerationRequest,
    description: &str,
    image_path: &Path,
) -> PipelineResult<Outcome<CritiqueVerdict>> {
    let bytes = tokio::fs::read(image_path)
        .await
        .map_err(|e| PipelineError::io(image_path, e))?;
    let image = ImageData::from_bytes(bytes).map_err(|e| PipelineError::provider("critique", e))?;

    let prompt = prompts.render(
        request.diagram_kind,
        Agent::Critic,
        &[
            ("source_context", request.source_context.as_str()),
            ("caption", request.communicative_intent.as_str()),
            ("description", description),
        ],
    );

    tracing::info!(image = %image_path.display(), "Running critic");
    let response = vlm
        .generate(
            &VisionRequest::new(prompt)
                .with_images(vec![image])
                .with_temperature(0.3)
                .with_max_tokens(4096)
                .json(),
        )
        .await
        .map_err(|e| PipelineError::provider("critique", e))?;

    let verdict = parse_verdict(&response);
    tracing::info!(
        needs_revision = verdict.value().needs_revision(),
        summary = %verdict.value().summary(),
        "Critic evaluation complete"
    );
    Ok(verdict)
}

/// Parse a critic response. Anything unparseable is an empty verdict, which
/// ends the refinement loop.
pub fn parse_verdict(response: &str) -> Outcome<CritiqueVerdict> {
    let Some(map) = parse_json_object(response) else {
        return Outcome::recovered(
            CritiqueVerdict::default(),
            "critic response is not valid JSON",
        );
    };

    let suggestions = match map.get("critic_suggestions") {
        Some(Value::Array(items)) => items
            .iter()
            .filter(|v| !v.is_null())
            .map(value_to_string)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    };
    let revised = non_empty_str(&map, "revised_description").map(str::to_string);

    Outcome::Clean(CritiqueVerdict::new(suggestions, revised))
}
