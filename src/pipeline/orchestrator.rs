// Refinement orchestrator — retrieve, plan, style, then visualize/critique rounds
//
// Steps run strictly in sequence. Everything a run writes lives under its own
// `<output_dir>/<run_id>/` directory, so concurrent runs share nothing but the
// read-only reference catalog and the provider clients.

use anyhow::Result;
use chrono::Utc;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::agents::{self, PlotRunner};
use crate::config::constants::FINAL_OUTPUT_FILE;
use crate::config::Settings;
use crate::error::{PipelineError, PipelineResult};
use crate::guidelines::Guidelines;
use crate::prompts::PromptLibrary;
use crate::providers::{create_image_model, create_vision_model, ImageModel, VisionModel};
use crate::reference::ReferenceStore;

use super::artifacts::{
    iteration_image_path, new_run_id, write_details, write_json, METADATA_FILE, PLANNING_FILE,
};
use super::progress::{initial_total_steps, Phase, ProgressEvent, RunHooks};
use super::types::{
    DiagramKind, GenerationOutput, GenerationRequest, IterationRecord, PlanningArtifact,
    RunMetadata,
};

/// The generation pipeline. One instance serves any number of runs,
/// sequentially or concurrently.
pub struct Pipeline {
    settings: Settings,
    vlm: Arc<dyn VisionModel>,
    image_model: Arc<dyn ImageModel>,
    catalog: Arc<ReferenceStore>,
    prompts: PromptLibrary,
    guidelines: Guidelines,
    plot_runner: PlotRunner,
}

/// Mutable state of a single run. Never shared between runs.
struct RunState {
    run_id: String,
    run_dir: PathBuf,
    max_rounds: u32,
    step: u32,
    total_steps: u32,
    description: String,
    history: Vec<IterationRecord>,
}

impl RunState {
    fn new(run_id: String, run_dir: PathBuf, max_rounds: u32) -> Self {
        Self {
            run_id,
            run_dir,
            max_rounds,
            step: 0,
            total_steps: initial_total_steps(max_rounds),
            description: String::new(),
            history: Vec::new(),
        }
    }

    fn advance(&mut self, hooks: &RunHooks, phase: Phase, round: Option<u32>, message: String) {
        self.step = self.step.saturating_add(1);
        hooks.emit(&ProgressEvent {
            phase,
            round,
            max_rounds: self.max_rounds,
            step: self.step,
            total_steps: self.total_steps,
            message,
        });
    }
}

/// Run `fut` unless the run is cancelled, racing it against the token.
async fn guarded<T, F>(hooks: &RunHooks, fut: F) -> PipelineResult<T>
where
    F: Future<Output = PipelineResult<T>>,
{
    let Some(token) = &hooks.cancel else {
        return fut.await;
    };
    if token.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(PipelineError::Cancelled),
        result = fut => result,
    }
}

impl Pipeline {
    /// Assemble a pipeline from explicit ports. Prompts and guidelines are
    /// loaded from the directories named in `settings`.
    pub fn new(
        settings: Settings,
        vlm: Arc<dyn VisionModel>,
        image_model: Arc<dyn ImageModel>,
        catalog: Arc<ReferenceStore>,
    ) -> Self {
        let prompts = PromptLibrary::load(settings.pipeline.prompt_dir.as_deref());
        let guidelines = Guidelines::load(Some(settings.reference.guidelines_path.as_path()));
        let plot_runner = PlotRunner::from_settings(&settings.pipeline);
        Self {
            settings,
            vlm,
            image_model,
            catalog,
            prompts,
            guidelines,
            plot_runner,
        }
    }

    /// Build providers and the catalog from configuration.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let vlm = create_vision_model(&settings)?;
        let image_model = create_image_model(&settings)?;
        let catalog = Arc::new(ReferenceStore::new(&settings.reference.path));
        Ok(Self::new(settings, vlm, image_model, catalog))
    }

    pub fn with_prompts(mut self, prompts: PromptLibrary) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_guidelines(mut self, guidelines: Guidelines) -> Self {
        self.guidelines = guidelines;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn vlm(&self) -> Arc<dyn VisionModel> {
        self.vlm.clone()
    }

    pub fn prompts(&self) -> &PromptLibrary {
        &self.prompts
    }

    pub fn catalog(&self) -> &Arc<ReferenceStore> {
        &self.catalog
    }

    /// Execute one generation run.
    ///
    /// Artifacts written before a failure stay on disk; no partial output is
    /// returned.
    pub async fn run(
        &self,
        request: &GenerationRequest,
        hooks: &RunHooks,
    ) -> PipelineResult<GenerationOutput> {
        request.validate()?;
        let max_rounds = request
            .refinement_iterations
            .unwrap_or(self.settings.pipeline.refinement_iterations);
        if max_rounds == 0 {
            return Err(PipelineError::InvalidRequest(
                "refinement_iterations must be at least 1".to_string(),
            ));
        }

        let started_at = Utc::now();
        let run_id = new_run_id();
        let run_dir = self.settings.output.dir.join(&run_id);
        tokio::fs::create_dir_all(&run_dir)
            .await
            .map_err(|e| PipelineError::io(&run_dir, e))?;
        let save = self.settings.output.save_iterations;
        let kind = request.diagram_kind;

        tracing::info!(run_id = %run_id, kind = %kind, max_rounds, "Starting generation run");
        let mut state = RunState::new(run_id, run_dir, max_rounds);

        // ── 1. Retrieve reference examples ──────────────────────────────────
        state.advance(hooks, Phase::Retrieve, None, "Retrieving reference examples".to_string());
        let k = self.settings.pipeline.num_retrieval_examples;
        let examples = guarded(hooks, async {
            let candidates = self.catalog.get_all().await?;
            agents::retrieve(self.vlm.as_ref(), &self.prompts, request, candidates, k).await
        })
        .await?
        .into_value_logged("retrieve");

        // ── 2. Plan the description ─────────────────────────────────────────
        state.advance(
            hooks,
            Phase::Plan,
            None,
            format!("Planning description from {} examples", examples.len()),
        );
        let initial_description = guarded(
            hooks,
            agents::plan(self.vlm.as_ref(), &self.prompts, request, &examples),
        )
        .await?;

        // ── 3. Apply style guidelines ───────────────────────────────────────
        state.advance(hooks, Phase::Style, None, "Applying style guidelines".to_string());
        let optimized_description = guarded(
            hooks,
            agents::style(
                self.vlm.as_ref(),
                &self.prompts,
                &self.guidelines,
                request,
                &initial_description,
            ),
        )
        .await?
        .into_value_logged("style");

        let planning = PlanningArtifact {
            retrieved_examples: examples.iter().map(|e| e.id.clone()).collect(),
            initial_description,
            optimized_description,
        };
        if save {
            write_json(&state.run_dir.join(PLANNING_FILE), &planning, "planning artifact").await?;
        }
        state.description = planning.optimized_description.clone();

        // ── 4. Visualize / critique rounds ──────────────────────────────────
        for round in 1..=max_rounds {
            let image_path = iteration_image_path(&state.run_dir, kind, round);
            state.advance(
                hooks,
                Phase::Visualize,
                Some(round),
                format!("Generating {}", kind.image_stem()),
            );
            guarded(hooks, self.visualize(request, &state.description, &image_path)).await?;

            state.advance(hooks, Phase::Critique, Some(round), "Critiquing image".to_string());
            let verdict = guarded(
                hooks,
                agents::critique(
                    self.vlm.as_ref(),
                    &self.prompts,
                    request,
                    &state.description,
                    &image_path,
                ),
            )
            .await?
            .into_value_logged("critique");

            tracing::info!(
                run_id = %state.run_id,
                iteration = round,
                summary = %verdict.summary(),
                "Round complete"
            );

            let record = IterationRecord {
                iteration: round,
                description: state.description.clone(),
                image_path,
                critique: verdict,
            };
            if save {
                write_details(&state.run_dir, &record).await?;
            }

            let next = match (&record.critique.revised_description, record.critique.needs_revision()) {
                (Some(revised), true) => Some(revised.clone()),
                _ => None,
            };
            state.history.push(record);

            match next {
                Some(revised) => state.description = revised,
                None => {
                    tracing::info!(iteration = round, "No further revision needed");
                    break;
                }
            }
        }

        // ── 5. Finalize ─────────────────────────────────────────────────────
        if hooks.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        state.total_steps = state.step.saturating_add(1);
        state.advance(hooks, Phase::Finalize, None, "Saving final output".to_string());
        self.finalize(request, state, planning, started_at).await
    }

    async fn visualize(
        &self,
        request: &GenerationRequest,
        description: &str,
        image_path: &Path,
    ) -> PipelineResult<()> {
        match request.diagram_kind {
            DiagramKind::Methodology => {
                agents::render_diagram(
                    self.image_model.as_ref(),
                    &self.prompts,
                    description,
                    self.settings.pipeline.seed,
                    image_path,
                )
                .await
            }
            DiagramKind::StatisticalPlot => {
                let code = agents::write_plot_code(
                    self.vlm.as_ref(),
                    &self.prompts,
                    description,
                    request.raw_data.as_ref(),
                )
                .await?;
                self.plot_runner
                    .execute(&code, image_path)
                    .await?
                    .into_value_logged("visualize");
                Ok(())
            }
        }
    }

    async fn finalize(
        &self,
        request: &GenerationRequest,
        state: RunState,
        planning: PlanningArtifact,
        started_at: chrono::DateTime<Utc>,
    ) -> PipelineResult<GenerationOutput> {
        let Some(last) = state.history.last() else {
            return Err(PipelineError::InvalidRequest(
                "run finished without rendering an image".to_string(),
            ));
        };

        let final_path = state.run_dir.join(FINAL_OUTPUT_FILE);
        tokio::fs::copy(&last.image_path, &final_path)
            .await
            .map_err(|e| PipelineError::io(&last.image_path, e))?;

        let metadata = RunMetadata {
            run_id: state.run_id.clone(),
            diagram_kind: request.diagram_kind,
            started_at,
            finished_at: Utc::now(),
            vlm_provider: self.vlm.name().to_string(),
            vlm_model: self.vlm.model_name().to_string(),
            image_provider: self.image_model.name().to_string(),
            image_model: self.image_model.model_name().to_string(),
            refinement_iterations: state.history.len() as u32,
            seed: self.settings.pipeline.seed,
            config_snapshot: self.settings.snapshot(),
        };
        if self.settings.output.save_iterations {
            write_json(&state.run_dir.join(METADATA_FILE), &metadata, "run metadata").await?;
        }

        tracing::info!(
            run_id = %state.run_id,
            rounds = state.history.len(),
            path = %final_path.display(),
            "Generation complete"
        );

        Ok(GenerationOutput {
            image_path: final_path,
            description: state.description,
            iterations: state.history,
            planning,
            metadata,
        })
    }
}
