// Evaluation — VLM-as-judge comparison against human reference figures

mod aggregate;
mod judge;
mod metrics;

pub use aggregate::{
    aggregate, decide, parse_dimension_verdict, Dimension, DimensionVerdict, DimensionVerdicts,
    EvaluationResult, Side, Winner, UNPARSEABLE_REASONING, UNRECOGNIZED_LABEL_REASONING,
};
pub use judge::Judge;
pub use metrics::{format_scores, scores_to_map, summarize_batch, BatchSummary};
