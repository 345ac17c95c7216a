// Evaluation reporting — tables, flat maps and batch summaries

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

use super::aggregate::{Dimension, EvaluationResult, Side};

/// Fixed-width table, one row per dimension plus an `Overall` row.
pub fn format_scores(result: &EvaluationResult) -> String {
    let mut lines: Vec<String> = Dimension::ALL
        .iter()
        .map(|&dimension| {
            let verdict = result.get(dimension);
            format!(
                "{:<14} {:<16} ({:.0})",
                dimension.title(),
                verdict.winner,
                verdict.score
            )
        })
        .collect();
    lines.push(format!(
        "{:<14} {:<16} ({:.0})",
        "Overall", result.overall_winner, result.overall_score
    ));
    lines.join("\n")
}

/// Flatten a result into `{dim}_winner` / `{dim}_score` / `{dim}_reasoning` keys.
pub fn scores_to_map(result: &EvaluationResult) -> Map<String, Value> {
    let mut map = Map::new();
    for dimension in Dimension::ALL {
        let verdict = result.get(dimension);
        map.insert(
            format!("{}_winner", dimension),
            Value::from(verdict.winner.label()),
        );
        map.insert(format!("{}_score", dimension), Value::from(verdict.score));
        map.insert(
            format!("{}_reasoning", dimension),
            Value::from(verdict.reasoning.clone()),
        );
    }
    map.insert(
        "overall_winner".to_string(),
        Value::from(result.overall_winner.label()),
    );
    map.insert("overall_score".to_string(), Value::from(result.overall_score));
    map
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub count: usize,
    pub model_wins: usize,
    pub human_wins: usize,
    pub ties: usize,
    pub average_score: f64,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} evaluated: {} model wins, {} human wins, {} ties (average score {:.1})",
            self.count, self.model_wins, self.human_wins, self.ties, self.average_score
        )
    }
}

/// Overall outcomes across several evaluations.
pub fn summarize_batch(results: &[EvaluationResult]) -> BatchSummary {
    let mut summary = BatchSummary {
        count: results.len(),
        model_wins: 0,
        human_wins: 0,
        ties: 0,
        average_score: 0.0,
    };
    for result in results {
        match result.overall_winner.side() {
            Side::Model => summary.model_wins += 1,
            Side::Human => summary.human_wins += 1,
            Side::Tie => summary.ties += 1,
        }
    }
    if !results.is_empty() {
        summary.average_score =
            results.iter().map(|r| r.overall_score).sum::<f64>() / results.len() as f64;
    }
    summary
}
