// Banana - Academic figure generation with retrieval, planning and critique
// Library exports

pub mod agents;
pub mod config;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod guidelines;
pub mod imaging;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod reference;
pub mod server;

pub use error::{Outcome, PipelineError, PipelineResult};
pub use pipeline::{GenerationOutput, GenerationRequest, Pipeline, RunHooks};
