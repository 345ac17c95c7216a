// Project-wide constants
//
// Centralised here so defaults and magic values have one source of truth.
// Import via `use crate::config::constants::*;`.

/// Default bind address for `banana serve` (localhost only).
pub const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:8000";

/// Maximum number of generation runs executing at once in the HTTP server.
/// Further submissions wait on the semaphore instead of being rejected.
pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 3;

/// How long finished tasks stay queryable before the server forgets them.
pub const DEFAULT_FINISHED_TASK_TTL_SECS: u64 = 3600;

/// Number of reference examples handed to the planner.
pub const DEFAULT_RETRIEVAL_EXAMPLES: usize = 10;

/// Visualize/critique rounds per run unless the request overrides it.
pub const DEFAULT_REFINEMENT_ITERATIONS: u32 = 3;

/// Upper bound on refinement rounds, from config or a single request.
pub const MAX_REFINEMENT_ITERATIONS: u32 = 20;

/// Hard wall-clock limit for executing generated plot code.
pub const DEFAULT_PLOT_TIMEOUT_SECS: u64 = 60;

/// Per-request HTTP timeout for provider calls.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Target size for methodology diagrams (wide landscape).
pub const DIAGRAM_WIDTH: u32 = 1792;
pub const DIAGRAM_HEIGHT: u32 = 1024;

/// Size of the blank image substituted when plot rendering fails.
pub const PLACEHOLDER_WIDTH: u32 = 1024;
pub const PLACEHOLDER_HEIGHT: u32 = 768;

/// File name of the canonical output image inside each run directory.
pub const FINAL_OUTPUT_FILE: &str = "final_output.png";

/// Config file looked up in the working directory before the home directory.
pub const LOCAL_CONFIG_FILE: &str = "banana.toml";
