// Server — HTTP front end over the generation pipeline
//
// Submissions return immediately with a task id; runs execute in the
// background (see `tasks`) and are polled by id.

mod handlers;
mod tasks;
mod types;

pub use handlers::ApiError;
pub use tasks::{CancelOutcome, ImageLookup, TaskManager};
pub use types::{
    image_url, status_url, ErrorBody, GenerateBody, HealthResponse, TaskCreated, TaskResult,
    TaskStatus, TaskView,
};

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::pipeline::Pipeline;

/// Request bodies carry source text and raw plot data, nothing larger.
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

pub struct AppState {
    pub tasks: TaskManager,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        let server = pipeline.settings().server.clone();
        Self {
            tasks: TaskManager::new(pipeline, server.max_concurrent_tasks)
                .with_retention(Duration::from_secs(server.finished_task_ttl_secs)),
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::health))
        .route("/health", get(handlers::health))
        .route("/api/v1/generate", post(handlers::generate))
        .route("/api/v1/tasks/:task_id", get(handlers::get_task))
        .route("/api/v1/tasks/:task_id/image", get(handlers::get_task_image))
        .route("/api/v1/tasks/:task_id/cancel", post(handlers::cancel_task))
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: Arc<AppState>, bind: &str) -> Result<()> {
    let app = create_router(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    tracing::info!("Starting banana server on {}", bind);
    axum::serve(listener, app).await?;
    Ok(())
}
