// Comparative judgment aggregation
//
// A judge compares a generated figure against a human reference on four
// dimensions. The overall winner is decided hierarchically: faithfulness and
// readability first, conciseness and aesthetics only when the first pair is
// inconclusive.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::agents::json::parse_json_object;
use crate::error::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Faithfulness,
    Conciseness,
    Readability,
    Aesthetics,
}

impl Dimension {
    /// Judging order
    pub const ALL: [Dimension; 4] = [
        Dimension::Faithfulness,
        Dimension::Conciseness,
        Dimension::Readability,
        Dimension::Aesthetics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Faithfulness => "faithfulness",
            Dimension::Conciseness => "conciseness",
            Dimension::Readability => "readability",
            Dimension::Aesthetics => "aesthetics",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Dimension::Faithfulness => "Faithfulness",
            Dimension::Conciseness => "Conciseness",
            Dimension::Readability => "Readability",
            Dimension::Aesthetics => "Aesthetics",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Judge label for one comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Winner {
    Model,
    Human,
    #[serde(rename = "Both are good")]
    BothGood,
    #[serde(rename = "Both are bad")]
    BothBad,
}

impl Winner {
    pub fn label(&self) -> &'static str {
        match self {
            Winner::Model => "Model",
            Winner::Human => "Human",
            Winner::BothGood => "Both are good",
            Winner::BothBad => "Both are bad",
        }
    }

    /// Parse a judge label. Only the four exact labels are recognized.
    pub fn from_label(label: &str) -> Option<Self> {
        [Winner::Model, Winner::Human, Winner::BothGood, Winner::BothBad]
            .into_iter()
            .find(|w| w.label() == label)
    }

    pub fn side(&self) -> Side {
        match self {
            Winner::Model => Side::Model,
            Winner::Human => Side::Human,
            Winner::BothGood | Winner::BothBad => Side::Tie,
        }
    }

    /// 100 for the model, 0 for the human, 50 for either tie.
    pub fn score(&self) -> f64 {
        match self {
            Winner::Model => 100.0,
            Winner::Human => 0.0,
            Winner::BothGood | Winner::BothBad => 50.0,
        }
    }
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Honour width/alignment so tables can pad labels
        f.pad(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Model,
    Human,
    Tie,
}

impl Side {
    fn winner(self) -> Winner {
        match self {
            Side::Model => Winner::Model,
            Side::Human => Winner::Human,
            Side::Tie => Winner::BothGood,
        }
    }
}

/// Decisive side of a dimension pair, if any.
///
/// Two wins for the same side, or one win plus a tie, decide the pair.
/// A split or a double tie does not.
pub fn decide(a: Side, b: Side) -> Option<Side> {
    match (a, b) {
        (Side::Tie, Side::Tie) => None,
        (decisive, Side::Tie) | (Side::Tie, decisive) => Some(decisive),
        (x, y) if x == y => Some(x),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionVerdict {
    pub winner: Winner,
    pub score: f64,
    pub reasoning: String,
}

impl DimensionVerdict {
    pub fn new(winner: Winner, reasoning: impl Into<String>) -> Self {
        Self {
            winner,
            score: winner.score(),
            reasoning: reasoning.into(),
        }
    }
}

/// One verdict per dimension. All four are required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionVerdicts {
    pub faithfulness: DimensionVerdict,
    pub conciseness: DimensionVerdict,
    pub readability: DimensionVerdict,
    pub aesthetics: DimensionVerdict,
}

impl DimensionVerdicts {
    pub fn get(&self, dimension: Dimension) -> &DimensionVerdict {
        match dimension {
            Dimension::Faithfulness => &self.faithfulness,
            Dimension::Conciseness => &self.conciseness,
            Dimension::Readability => &self.readability,
            Dimension::Aesthetics => &self.aesthetics,
        }
    }
}

/// Overall winner and its score.
pub fn aggregate(verdicts: &DimensionVerdicts) -> (Winner, f64) {
    let primary = decide(
        verdicts.faithfulness.winner.side(),
        verdicts.readability.winner.side(),
    );
    let secondary = || {
        decide(
            verdicts.conciseness.winner.side(),
            verdicts.aesthetics.winner.side(),
        )
    };
    let winner = primary
        .or_else(secondary)
        .map(Side::winner)
        .unwrap_or(Winner::BothGood);
    (winner, winner.score())
}

/// Full comparison result: the four verdicts plus the aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    #[serde(flatten)]
    pub verdicts: DimensionVerdicts,
    pub overall_winner: Winner,
    pub overall_score: f64,
}

impl EvaluationResult {
    pub fn from_verdicts(verdicts: DimensionVerdicts) -> Self {
        let (overall_winner, overall_score) = aggregate(&verdicts);
        Self {
            verdicts,
            overall_winner,
            overall_score,
        }
    }

    pub fn get(&self, dimension: Dimension) -> &DimensionVerdict {
        self.verdicts.get(dimension)
    }
}

pub const UNRECOGNIZED_LABEL_REASONING: &str = "Unrecognized winner label; defaulted to tie.";
pub const UNPARSEABLE_REASONING: &str = "Could not parse evaluation response.";

/// Parse one judge response.
///
/// A missing `winner` counts as a tie with the model's reasoning kept. A
/// winner that is not one of the four labels (including `null`), or an
/// unparseable response, is a tie with a fixed reasoning.
pub fn parse_dimension_verdict(raw: &str, dimension: Dimension) -> Outcome<DimensionVerdict> {
    let Some(map) = parse_json_object(raw) else {
        tracing::warn!(dimension = %dimension, "Failed to parse evaluation response");
        return Outcome::recovered(
            DimensionVerdict::new(Winner::BothGood, UNPARSEABLE_REASONING),
            "judge response is not valid JSON",
        );
    };

    let reasoning = map
        .get("comparison_reasoning")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    match map.get("winner") {
        None => Outcome::Clean(DimensionVerdict::new(Winner::BothGood, reasoning)),
        Some(value) => match value.as_str().and_then(Winner::from_label) {
            Some(winner) => Outcome::Clean(DimensionVerdict::new(winner, reasoning)),
            None => {
                tracing::warn!(dimension = %dimension, winner = %value, "Invalid winner value; defaulting to tie");
                Outcome::recovered(
                    DimensionVerdict::new(Winner::BothGood, UNRECOGNIZED_LABEL_REASONING),
                    format!("unrecognized winner label {}", value),
                )
            }
        },
    }
}
