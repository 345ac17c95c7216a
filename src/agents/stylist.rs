// Stylist — rewrite a description to follow the style guidelines

use crate::error::{Outcome, PipelineError, PipelineResult};
use crate::guidelines::Guidelines;
use crate::pipeline::GenerationRequest;
use crate::prompts::{Agent, PromptLibrary};
use crate::providers::{VisionModel, VisionRequest};

/// Apply the kind's guidelines to `description`.
///
/// An empty rewrite keeps the input description.
pub async fn style(
    vlm: &dyn VisionModel,
    prompts: &PromptLibrary,
    guidelines: &Guidelines,
    request: &GenerationRequest,
    description: &str,
) -> PipelineResult<Outcome<String>> {
    let prompt = prompts.render(
        request.diagram_kind,
        Agent::Stylist,
        &[
            ("description", description),
            ("guidelines", guidelines.for_kind(request.diagram_kind)),
            ("source_context", request.source_context.as_str()),
            ("caption", request.communicative_intent.as_str()),
        ],
    );

    tracing::info!(kind = %request.diagram_kind, "Running stylist");
    let styled = vlm
        .generate(
            &VisionRequest::new(prompt)
                .with_temperature(0.5)
                .with_max_tokens(4096),
        )
        .await
        .map_err(|e| PipelineError::provider("style", e))?;

    let styled = styled.trim();
    if styled.is_empty() {
        return Ok(Outcome::recovered(
            description.to_string(),
            "stylist returned an empty description",
        ));
    }
    Ok(Outcome::Clean(styled.to_string()))
}
