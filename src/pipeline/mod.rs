// Generation pipeline
// Request/record types, progress events, run artifacts and the orchestrator

pub mod artifacts;
mod orchestrator;
pub mod progress;
mod types;

pub use orchestrator::Pipeline;
pub use progress::{Phase, ProgressEvent, ProgressObserver, RunHooks};
pub use types::{
    CritiqueVerdict, DiagramKind, GenerationOutput, GenerationRequest, IterationRecord,
    PlanningArtifact, RunMetadata,
};
