// Integration tests for referenced evaluation

mod common;

use std::sync::Arc;

use banana::evaluation::{format_scores, scores_to_map, summarize_batch, Judge, Winner};
use banana::imaging::blank_png;
use banana::prompts::PromptLibrary;
use banana::PipelineError;

use common::ScriptedVision;

fn verdict(winner: &str, reasoning: &str) -> String {
    serde_json::json!({"comparison_reasoning": reasoning, "winner": winner}).to_string()
}

#[tokio::test]
async fn test_batch_evaluation_against_one_reference() {
    let dir = tempfile::tempdir().unwrap();
    let reference = dir.path().join("human.png");
    let first = dir.path().join("model_a.png");
    let second = dir.path().join("model_b.png");
    blank_png(10, 10).unwrap().save(&reference).unwrap();
    blank_png(4, 4).unwrap().save(&first).unwrap();
    blank_png(4, 4).unwrap().save(&second).unwrap();

    let vlm = Arc::new(ScriptedVision::new(vec![
        // model_a: faithfulness and readability both go to the model
        &verdict("Model", "covers every module"),
        &verdict("Human", "too many boxes"),
        &verdict("Model", "clear flow"),
        &verdict("Both are bad", "muddy palette"),
        // model_b: primary split, secondary split, so a tie
        &verdict("Model", "accurate"),
        &verdict("Human", "cluttered"),
        &verdict("Human", "hard to follow"),
        &verdict("Model", "nice colours"),
    ]));
    let judge = Judge::new(vlm.clone(), PromptLibrary::embedded());

    let a = judge
        .evaluate(&first, &reference, "Our method encodes, then decodes.", "Figure 1")
        .await
        .unwrap();
    let b = judge
        .evaluate(&second, &reference, "Our method encodes, then decodes.", "Figure 1")
        .await
        .unwrap();

    assert_eq!(a.overall_winner, Winner::Model);
    assert_eq!(a.overall_score, 100.0);
    assert_eq!(a.verdicts.readability.winner, Winner::Model);
    assert_eq!(a.verdicts.aesthetics.winner, Winner::BothBad);
    assert_eq!(a.verdicts.aesthetics.score, 50.0);
    assert_eq!(b.overall_winner, Winner::BothGood);
    assert_eq!(b.overall_score, 50.0);

    let table = format_scores(&a);
    assert!(table.lines().last().unwrap().starts_with("Overall"));
    assert_eq!(scores_to_map(&b)["conciseness_reasoning"], "cluttered");

    let summary = summarize_batch(&[a, b]);
    assert_eq!(summary.count, 2);
    assert_eq!(summary.model_wins, 1);
    assert_eq!(summary.ties, 1);
    assert_eq!(summary.average_score, 75.0);

    assert_eq!(vlm.call_count(), 8);
}

#[tokio::test]
async fn test_missing_generated_image_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let reference = dir.path().join("human.png");
    blank_png(10, 10).unwrap().save(&reference).unwrap();

    let vlm = Arc::new(ScriptedVision::new(vec![]));
    let judge = Judge::new(vlm.clone(), PromptLibrary::embedded());
    let err = judge
        .evaluate(&dir.path().join("missing.png"), &reference, "ctx", "cap")
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Io { .. }));
    assert_eq!(vlm.call_count(), 0);
}

#[tokio::test]
async fn test_provider_error_aborts_evaluation() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("img.png");
    blank_png(3, 3).unwrap().save(&image).unwrap();

    // One answer, then the model goes silent.
    let vlm = Arc::new(ScriptedVision::new(vec![r#"{"winner": "Model"}"#]));
    let judge = Judge::new(vlm, PromptLibrary::embedded());
    let err = judge.evaluate(&image, &image, "ctx", "cap").await.unwrap_err();
    assert!(matches!(err, PipelineError::Provider { step: "evaluate", .. }));
}
