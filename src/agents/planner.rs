// Planner — draft a full textual description from the request and examples

use crate::error::{PipelineError, PipelineResult};
use crate::imaging::ImageData;
use crate::pipeline::GenerationRequest;
use crate::prompts::{Agent, PromptLibrary};
use crate::providers::{VisionModel, VisionRequest};
use crate::reference::ReferenceRecord;

use super::prefix_chars;

const CONTEXT_PREVIEW_CHARS: usize = 500;

const NO_EXAMPLES: &str =
    "(No reference examples available. Generate based on source context alone.)";

/// Produce the initial description, with the examples' images as visual context.
pub async fn plan(
    vlm: &dyn VisionModel,
    prompts: &PromptLibrary,
    request: &GenerationRequest,
    examples: &[ReferenceRecord],
) -> PipelineResult<String> {
    let (examples_text, images) = format_examples(examples);
    let prompt = prompts.render(
        request.diagram_kind,
        Agent::Planner,
        &[
            ("source_context", request.source_context.as_str()),
            ("caption", request.communicative_intent.as_str()),
            ("examples", examples_text.as_str()),
        ],
    );

    tracing::info!(
        examples = examples.len(),
        images = images.len(),
        context_chars = request.source_context.chars().count(),
        "Running planner"
    );
    let description = vlm
        .generate(
            &VisionRequest::new(prompt)
                .with_images(images)
                .with_temperature(0.7)
                .with_max_tokens(4096),
        )
        .await
        .map_err(|e| PipelineError::provider("plan", e))?;

    let description = description.trim().to_string();
    tracing::debug!(chars = description.len(), "Planner produced description");
    Ok(description)
}

/// Render the examples block and load the images it points at.
///
/// Image markers are numbered by position in the returned image list, so an
/// example whose image is missing or unreadable gets no marker.
pub fn format_examples(examples: &[ReferenceRecord]) -> (String, Vec<ImageData>) {
    if examples.is_empty() {
        return (NO_EXAMPLES.to_string(), Vec::new());
    }

    let mut images = Vec::new();
    let mut blocks = Vec::with_capacity(examples.len());
    for (i, example) in examples.iter().enumerate() {
        let mut block = format!(
            "### Example {}\n**Caption**: {}\n**Source Context**: {}",
            i + 1,
            example.caption,
            prefix_chars(&example.source_context, CONTEXT_PREVIEW_CHARS)
        );

        if let Some(path) = example.existing_image() {
            match ImageData::load(path) {
                Ok(image) => {
                    images.push(image);
                    block.push_str(&format!(
                        "\n**Diagram**: [See reference image {} above]",
                        images.len()
                    ));
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable reference image");
                }
            }
        }

        block.push('\n');
        blocks.push(block);
    }

    (blocks.join("\n"), images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::ScriptedVision;
    use crate::imaging::blank_png;

    #[test]
    fn test_no_examples_placeholder() {
        let (text, images) = format_examples(&[]);
        assert_eq!(text, NO_EXAMPLES);
        assert!(images.is_empty());
    }

    #[test]
    fn test_markers_count_only_loaded_images() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        blank_png(4, 4).unwrap().save(&good).unwrap();
        let junk = dir.path().join("junk.png");
        std::fs::write(&junk, b"definitely not an image").unwrap();

        let examples = vec![
            ReferenceRecord::new("a", "ctx a", "cap a").with_image(&junk),
            ReferenceRecord::new("b", "ctx b", "cap b").with_image(dir.path().join("missing.png")),
            ReferenceRecord::new("c", "ctx c", "cap c").with_image(&good),
        ];
        let (text, images) = format_examples(&examples);

        assert_eq!(images.len(), 1);
        assert_eq!(text.matches("[See reference image").count(), 1);
        assert!(text.contains("### Example 3\n**Caption**: cap c\n**Source Context**: ctx c\n**Diagram**: [See reference image 1 above]"));
        assert!(text.starts_with("### Example 1\n**Caption**: cap a"));
    }

    #[tokio::test]
    async fn test_plan_call_parameters() {
        let vlm = ScriptedVision::new(vec!["  A three-stage pipeline.  "]);
        let request = GenerationRequest::methodology("We propose X.", "Overview of X");
        let description = plan(&vlm, &PromptLibrary::embedded(), &request, &[])
            .await
            .unwrap();
        assert_eq!(description, "A three-stage pipeline.");

        let call = &vlm.requests()[0];
        assert!((call.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(call.max_tokens, 4096);
        assert!(call.prompt.contains("We propose X."));
        assert!(call.prompt.contains(NO_EXAMPLES));
    }
}
