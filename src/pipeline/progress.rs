// Progress reporting — structured events emitted between pipeline steps

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Retrieve,
    Plan,
    Style,
    Visualize,
    Critique,
    Finalize,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Retrieve => "retrieve",
            Phase::Plan => "plan",
            Phase::Style => "style",
            Phase::Visualize => "visualize",
            Phase::Critique => "critique",
            Phase::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

/// Snapshot of where a run is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub phase: Phase,
    /// Refinement round, for visualize and critique
    pub round: Option<u32>,
    pub max_rounds: u32,
    /// 1-based step counter
    pub step: u32,
    pub total_steps: u32,
    pub message: String,
}

impl ProgressEvent {
    /// Progress as a fraction in `[0, 1]`.
    pub fn fraction(&self) -> f32 {
        if self.total_steps == 0 {
            return 0.0;
        }
        (self.step as f32 / self.total_steps as f32).min(1.0)
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}] ", self.step, self.total_steps)?;
        if let Some(round) = self.round {
            write!(f, "round {}/{} ", round, self.max_rounds)?;
        }
        write!(f, "{}: {}", self.phase, self.message)
    }
}

/// Callback invoked for every progress event. It sees events only and has no
/// way to affect the run.
pub type ProgressObserver = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Optional per-run attachments: a progress observer and a cancellation token.
#[derive(Clone, Default)]
pub struct RunHooks {
    pub observer: Option<ProgressObserver>,
    pub cancel: Option<CancellationToken>,
}

impl RunHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(mut self, observer: ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub(crate) fn emit(&self, event: &ProgressEvent) {
        tracing::info!(
            phase = %event.phase,
            step = event.step,
            total = event.total_steps,
            "{}",
            event.message
        );
        if let Some(observer) = &self.observer {
            observer(event);
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }
}

impl fmt::Debug for RunHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunHooks")
            .field("observer", &self.observer.is_some())
            .field("cancel", &self.cancel)
            .finish()
    }
}

/// Initial total: retrieve, plan and style, two steps per round, then finalize.
pub fn initial_total_steps(max_rounds: u32) -> u32 {
    max_rounds.saturating_mul(2).saturating_add(4)
}
