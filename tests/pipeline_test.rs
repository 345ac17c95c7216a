// Integration tests for the refinement pipeline

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use banana::imaging::ImageData;
use banana::pipeline::artifacts::{read_details, METADATA_FILE, PLANNING_FILE};
use banana::pipeline::{
    DiagramKind, GenerationRequest, Phase, PlanningArtifact, ProgressEvent, RunHooks,
    RunMetadata,
};
use banana::PipelineError;

use common::{pipeline, records, revise, FakeImageModel, ScriptedVision, StalledVision, NO_ISSUES};

fn request() -> GenerationRequest {
    GenerationRequest::methodology(
        "We encode tokens with a transformer and decode with a diffusion head.",
        "Figure 2: Overview of the proposed architecture.",
    )
}

fn recording_hooks() -> (RunHooks, Arc<Mutex<Vec<ProgressEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let hooks = RunHooks::new().with_observer(Arc::new(move |event: &ProgressEvent| {
        sink.lock().unwrap().push(event.clone());
    }));
    (hooks, events)
}

#[tokio::test]
async fn test_stops_when_critic_finds_no_issues() {
    let dir = tempfile::tempdir().unwrap();
    let vlm = Arc::new(ScriptedVision::new(vec![
        "initial description",
        "styled description",
        &revise("second description"),
        NO_ISSUES,
    ]));
    let image = Arc::new(FakeImageModel::default());
    let pipeline = pipeline(dir.path(), vlm.clone(), image.clone(), records(2));

    let (hooks, events) = recording_hooks();
    let output = pipeline.run(&request(), &hooks).await.unwrap();

    assert_eq!(output.iterations.len(), 2);
    assert_eq!(output.iterations[0].description, "styled description");
    assert_eq!(output.iterations[1].description, "second description");
    assert_eq!(output.description, "second description");
    assert!(!output.iterations[1].critique.needs_revision());
    assert_eq!(image.call_count(), 2);
    assert!(image.prompts()[1].contains("second description"));

    let final_image = ImageData::load(&output.image_path).unwrap();
    assert_eq!(final_image.png_dimensions(), Some((9, 9)));

    // Catalog fits within K, so plan + style + two critiques only.
    assert_eq!(vlm.call_count(), 4);
    assert!(vlm.requests()[0].prompt.contains("diffusion head"));

    let events = events.lock().unwrap();
    let last = events.last().unwrap();
    assert_eq!(last.phase, Phase::Finalize);
    assert_eq!(last.step, 8);
    assert_eq!(last.total_steps, 8);
    let steps: Vec<u32> = events.iter().map(|e| e.step).collect();
    assert_eq!(steps, (1..=8).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_runs_every_round_when_critic_keeps_revising() {
    let dir = tempfile::tempdir().unwrap();
    let vlm = Arc::new(ScriptedVision::new(vec![
        "initial",
        "styled",
        &revise("v2"),
        &revise("v3"),
        &revise("v4"),
    ]));
    let image = Arc::new(FakeImageModel::default());
    let pipeline = pipeline(dir.path(), vlm.clone(), image.clone(), records(1));

    let (hooks, events) = recording_hooks();
    let output = pipeline.run(&request(), &hooks).await.unwrap();

    assert_eq!(output.iterations.len(), 3);
    assert_eq!(output.metadata.refinement_iterations, 3);
    // The working description carries the critic's last revision.
    assert_eq!(output.description, "v4");
    assert_eq!(output.iterations[2].description, "v3");
    assert_eq!(image.call_count(), 3);
    let final_image = ImageData::load(&output.image_path).unwrap();
    assert_eq!(final_image.png_dimensions(), Some((10, 10)));

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 10);
    assert!(events.iter().all(|e| e.total_steps == 10));
    let rounds: Vec<Option<u32>> = events
        .iter()
        .filter(|e| e.phase == Phase::Visualize)
        .map(|e| e.round)
        .collect();
    assert_eq!(rounds, vec![Some(1), Some(2), Some(3)]);
}

#[tokio::test]
async fn test_single_round_returns_critic_revision() {
    let dir = tempfile::tempdir().unwrap();
    let vlm = Arc::new(ScriptedVision::new(vec!["plan", "style", &revise("v2")]));
    let pipeline = pipeline(dir.path(), vlm, Arc::new(FakeImageModel::default()), Vec::new());

    let output = pipeline
        .run(&request().with_iterations(Some(1)), &RunHooks::default())
        .await
        .unwrap();
    assert_eq!(output.iterations[0].description, "style");
    assert_eq!(output.description, "v2");
}

#[tokio::test]
async fn test_excessive_iterations_rejected_before_any_call() {
    let dir = tempfile::tempdir().unwrap();
    let vlm = Arc::new(ScriptedVision::new(vec![]));
    let image = Arc::new(FakeImageModel::default());
    let pipeline = pipeline(dir.path(), vlm.clone(), image.clone(), records(1));

    let err = pipeline
        .run(&request().with_iterations(Some(u32::MAX)), &RunHooks::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidRequest(_)));
    assert_eq!(vlm.call_count(), 0);
    assert_eq!(image.call_count(), 0);
}

#[tokio::test]
async fn test_request_iterations_override_settings() {
    let dir = tempfile::tempdir().unwrap();
    let vlm = Arc::new(ScriptedVision::new(vec!["plan", "style", &revise("more")]));
    let image = Arc::new(FakeImageModel::default());
    let pipeline = pipeline(dir.path(), vlm, image.clone(), Vec::new());

    let output = pipeline
        .run(&request().with_iterations(Some(1)), &RunHooks::default())
        .await
        .unwrap();
    assert_eq!(output.iterations.len(), 1);
    assert_eq!(image.call_count(), 1);
}

#[tokio::test]
async fn test_run_directory_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let vlm = Arc::new(ScriptedVision::new(vec!["plan", "styled", NO_ISSUES]));
    let image = Arc::new(FakeImageModel::default());
    let pipeline = pipeline(dir.path(), vlm, image, records(2));

    let output = pipeline.run(&request(), &RunHooks::default()).await.unwrap();
    let run_dir = output.run_dir().unwrap().to_path_buf();

    assert!(run_dir.starts_with(dir.path().join("outputs")));
    assert!(run_dir
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("run_"));
    assert_eq!(output.image_path, run_dir.join("final_output.png"));
    assert!(run_dir.join("diagram_iter_1.png").is_file());

    let final_image = ImageData::load(&output.image_path).unwrap();
    assert_eq!(final_image.png_dimensions(), Some((8, 8)));

    let planning: PlanningArtifact =
        serde_json::from_str(&std::fs::read_to_string(run_dir.join(PLANNING_FILE)).unwrap())
            .unwrap();
    assert_eq!(planning.retrieved_examples, vec!["ref_1", "ref_2"]);
    assert_eq!(planning.initial_description, "plan");
    assert_eq!(planning.optimized_description, "styled");

    let details = read_details(&run_dir, 1).unwrap();
    assert_eq!(details.description, "styled");
    assert!(details.critique.critic_suggestions.is_empty());

    let metadata: RunMetadata =
        serde_json::from_str(&std::fs::read_to_string(run_dir.join(METADATA_FILE)).unwrap())
            .unwrap();
    assert_eq!(metadata.run_id, output.metadata.run_id);
    assert_eq!(metadata.vlm_provider, "scripted");
    assert_eq!(metadata.image_model, "fake-image");
    assert_eq!(metadata.refinement_iterations, 1);
    assert!(metadata.config_snapshot.get("api_keys").is_none());
}

#[tokio::test]
async fn test_retrieval_selects_by_id_when_catalog_exceeds_k() {
    let dir = tempfile::tempdir().unwrap();
    let vlm = Arc::new(ScriptedVision::new(vec![
        r#"{"selected_ids": ["ref_4", "ref_missing", "ref_2"]}"#,
        "plan",
        "styled",
        NO_ISSUES,
    ]));
    let image = Arc::new(FakeImageModel::default());
    let pipeline = pipeline(dir.path(), vlm.clone(), image, records(5));

    let output = pipeline.run(&request(), &RunHooks::default()).await.unwrap();
    assert_eq!(output.planning.retrieved_examples, vec!["ref_4", "ref_2"]);
    assert!(vlm.requests()[1].prompt.contains("Methodology text 4"));
}

#[tokio::test]
async fn test_retrieval_falls_back_to_first_k_on_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let vlm = Arc::new(ScriptedVision::new(vec![
        "I think the best examples are the first ones.",
        "plan",
        "styled",
        NO_ISSUES,
    ]));
    let image = Arc::new(FakeImageModel::default());
    let pipeline = pipeline(dir.path(), vlm, image, records(4));

    let output = pipeline.run(&request(), &RunHooks::default()).await.unwrap();
    assert_eq!(output.planning.retrieved_examples, vec!["ref_1", "ref_2"]);
}

#[tokio::test]
async fn test_unparseable_critique_ends_refinement() {
    let dir = tempfile::tempdir().unwrap();
    let vlm = Arc::new(ScriptedVision::new(vec!["plan", "styled", "looks fine to me"]));
    let image = Arc::new(FakeImageModel::default());
    let pipeline = pipeline(dir.path(), vlm, image.clone(), Vec::new());

    let output = pipeline.run(&request(), &RunHooks::default()).await.unwrap();
    assert_eq!(output.iterations.len(), 1);
    assert_eq!(image.call_count(), 1);
}

#[tokio::test]
async fn test_invalid_request_makes_no_calls() {
    let dir = tempfile::tempdir().unwrap();
    let vlm = Arc::new(ScriptedVision::new(vec![]));
    let image = Arc::new(FakeImageModel::default());
    let pipeline = pipeline(dir.path(), vlm.clone(), image, records(1));

    let bad = GenerationRequest::methodology("   ", "caption");
    let err = pipeline.run(&bad, &RunHooks::default()).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidRequest(_)));
    assert_eq!(vlm.call_count(), 0);
    assert!(!dir.path().join("outputs").exists());
}

#[tokio::test]
async fn test_provider_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    // Planner succeeds, stylist has nothing left to say.
    let vlm = Arc::new(ScriptedVision::new(vec!["plan"]));
    let image = Arc::new(FakeImageModel::default());
    let pipeline = pipeline(dir.path(), vlm, image.clone(), Vec::new());

    let err = pipeline.run(&request(), &RunHooks::default()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Provider { step: "style", .. }));
    assert_eq!(image.call_count(), 0);
}

#[tokio::test]
async fn test_cancellation_interrupts_stalled_step() {
    let dir = tempfile::tempdir().unwrap();
    let image = Arc::new(FakeImageModel::default());
    let pipeline = pipeline(dir.path(), Arc::new(StalledVision), image.clone(), records(1));

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let hooks = RunHooks::new().with_cancel(token);
    let err = tokio::time::timeout(Duration::from_secs(5), pipeline.run(&request(), &hooks))
        .await
        .expect("cancellation should end the run")
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(image.call_count(), 0);
}

#[tokio::test]
async fn test_precancelled_run_stops_before_any_call() {
    let dir = tempfile::tempdir().unwrap();
    let vlm = Arc::new(ScriptedVision::new(vec!["plan", "styled", NO_ISSUES]));
    let image = Arc::new(FakeImageModel::default());
    let pipeline = pipeline(dir.path(), vlm.clone(), image, records(1));

    let token = CancellationToken::new();
    token.cancel();
    let err = pipeline
        .run(&request(), &RunHooks::new().with_cancel(token))
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(vlm.call_count(), 0);
}

#[tokio::test]
async fn test_plot_run_uses_placeholder_when_code_cannot_run() {
    let dir = tempfile::tempdir().unwrap();
    let vlm = Arc::new(ScriptedVision::new(vec![
        "bar chart of accuracy per model",
        "styled bar chart",
        "```python\nimport matplotlib\nplt.savefig(OUTPUT_PATH)\n```",
        NO_ISSUES,
    ]));
    let image = Arc::new(FakeImageModel::default());
    let pipeline = pipeline(dir.path(), vlm.clone(), image.clone(), Vec::new());

    let data = serde_json::json!([{"model": "ours", "accuracy": 0.9}]);
    let request = GenerationRequest::statistical_plot(
        "Data for plotting:\n[...]",
        "Our model is the most accurate",
        Some(data),
    );
    let output = pipeline.run(&request, &RunHooks::default()).await.unwrap();

    assert_eq!(output.metadata.diagram_kind, DiagramKind::StatisticalPlot);
    assert_eq!(image.call_count(), 0);
    let run_dir = output.run_dir().unwrap();
    assert!(run_dir.join("plot_iter_1.png").is_file());
    let final_image = ImageData::load(&output.image_path).unwrap();
    assert_eq!(final_image.png_dimensions(), Some((1024, 768)));

    let code_request = &vlm.requests()[2];
    assert!(code_request.prompt.contains("styled bar chart"));
    assert!(code_request.prompt.contains("\"accuracy\""));
}

#[tokio::test]
async fn test_concurrent_runs_get_separate_directories() {
    let dir = tempfile::tempdir().unwrap();
    let first = pipeline(
        dir.path(),
        Arc::new(ScriptedVision::new(vec!["a", "b", NO_ISSUES])),
        Arc::new(FakeImageModel::default()),
        Vec::new(),
    );
    let second = pipeline(
        dir.path(),
        Arc::new(ScriptedVision::new(vec!["c", "d", NO_ISSUES])),
        Arc::new(FakeImageModel::default()),
        Vec::new(),
    );

    let hooks = RunHooks::default();
    let req = request();
    let (a, b) = tokio::join!(first.run(&req, &hooks), second.run(&req, &hooks));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.metadata.run_id, b.metadata.run_id);
    assert_ne!(a.run_dir(), b.run_dir());
}
