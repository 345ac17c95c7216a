// Agents — one model-backed step of the pipeline each
//
// Every agent is a free async function over the capability ports. Model
// failures are fatal (`PipelineError::Provider`); malformed model output is
// not, and comes back as `Outcome::Recovered` with a conservative fallback.

pub mod critic;
pub mod json;
pub mod planner;
pub mod plot_runner;
pub mod retriever;
pub mod stylist;
pub mod visualizer;

pub use critic::{critique, parse_verdict};
pub use planner::{format_examples, plan};
pub use plot_runner::{extract_code, prepare_script, PlotRunner};
pub use retriever::{format_candidates, parse_selection, retrieve};
pub use stylist::style;
pub use visualizer::{plot_code_prompt, render_diagram, write_plot_code};

/// Longest prefix of `s` with at most `max` characters.
pub(crate) fn prefix_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
