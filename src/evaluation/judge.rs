// Judge — referenced comparison of a generated figure against a human one

use std::path::Path;
use std::sync::Arc;

use crate::error::{PipelineError, PipelineResult};
use crate::imaging::ImageData;
use crate::prompts::{render, PromptLibrary};
use crate::providers::{VisionModel, VisionRequest};

use super::aggregate::{
    parse_dimension_verdict, Dimension, DimensionVerdict, DimensionVerdicts, EvaluationResult,
};

pub struct Judge {
    vlm: Arc<dyn VisionModel>,
    prompts: PromptLibrary,
}

impl Judge {
    pub fn new(vlm: Arc<dyn VisionModel>, prompts: PromptLibrary) -> Self {
        Self { vlm, prompts }
    }

    /// Judge `generated` against `reference` on every dimension, in order.
    ///
    /// The reference is always the first image and the generated figure the
    /// second, matching the evaluation prompts.
    pub async fn evaluate(
        &self,
        generated: &Path,
        reference: &Path,
        source_context: &str,
        caption: &str,
    ) -> PipelineResult<EvaluationResult> {
        let generated_image = load(generated).await?;
        let reference_image = load(reference).await?;
        let images = vec![reference_image, generated_image];

        let mut results: Vec<DimensionVerdict> = Vec::with_capacity(Dimension::ALL.len());
        for dimension in Dimension::ALL {
            tracing::info!(dimension = %dimension, image = %generated.display(), "Evaluating dimension");
            let prompt = render(
                self.prompts.evaluation(dimension),
                &[("source_context", source_context), ("caption", caption)],
            );
            let response = self
                .vlm
                .generate(
                    &VisionRequest::new(prompt)
                        .with_images(images.clone())
                        .with_temperature(0.1)
                        .with_max_tokens(1024)
                        .json(),
                )
                .await
                .map_err(|e| PipelineError::provider("evaluate", e))?;
            results.push(parse_dimension_verdict(&response, dimension).into_value_logged("evaluate"));
        }

        let [faithfulness, conciseness, readability, aesthetics]: [DimensionVerdict; 4] =
            results.try_into().map_err(|_| {
                PipelineError::provider("evaluate", anyhow::anyhow!("missing dimension verdict"))
            })?;
        let verdicts = DimensionVerdicts {
            faithfulness,
            conciseness,
            readability,
            aesthetics,
        };
        let result = EvaluationResult::from_verdicts(verdicts);
        tracing::info!(
            overall = %result.overall_winner,
            score = result.overall_score,
            "Evaluation complete"
        );
        Ok(result)
    }
}

async fn load(path: &Path) -> PipelineResult<ImageData> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| PipelineError::io(path, e))?;
    ImageData::from_bytes(bytes).map_err(|e| PipelineError::provider("evaluate", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::ScriptedVision;
    use crate::evaluation::Winner;
    use crate::imaging::blank_png;

    #[tokio::test]
    async fn test_judge_calls_each_dimension_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let generated = dir.path().join("gen.png");
        let reference = dir.path().join("ref.png");
        blank_png(4, 4).unwrap().save(&generated).unwrap();
        blank_png(6, 6).unwrap().save(&reference).unwrap();

        let vlm = Arc::new(ScriptedVision::new(vec![
            r#"{"winner": "Model", "comparison_reasoning": "f"}"#,
            r#"{"winner": "Human", "comparison_reasoning": "c"}"#,
            r#"{"winner": "Both are good", "comparison_reasoning": "r"}"#,
            "garbage",
        ]));
        let judge = Judge::new(vlm.clone(), PromptLibrary::embedded());
        let result = judge
            .evaluate(&generated, &reference, "the method", "Figure 1")
            .await
            .unwrap();

        assert_eq!(result.verdicts.faithfulness.reasoning, "f");
        assert_eq!(result.verdicts.conciseness.winner, Winner::Human);
        assert_eq!(result.verdicts.aesthetics.winner, Winner::BothGood);
        assert_eq!(result.overall_winner, Winner::Model);

        let calls = vlm.requests();
        assert_eq!(calls.len(), 4);
        assert!(calls[0].prompt.contains("FAITHFULNESS"));
        assert!(calls[1].prompt.contains("CONCISENESS"));
        assert!(calls[2].prompt.contains("READABILITY"));
        assert!(calls[3].prompt.contains("AESTHETICS"));
        for call in &calls {
            assert!(call.prompt.contains("the method"));
            assert_eq!(call.images[0].png_dimensions(), Some((6, 6)));
            assert_eq!(call.images[1].png_dimensions(), Some((4, 4)));
            assert!((call.temperature - 0.1).abs() < f32::EPSILON);
            assert_eq!(call.max_tokens, 1024);
            assert!(call.wants_json());
        }
    }
}
