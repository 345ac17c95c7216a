// HTTP handlers for the task API

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use super::tasks::{CancelOutcome, ImageLookup};
use super::types::{status_url, ErrorBody, GenerateBody, HealthResponse, TaskCreated, TaskStatus};
use super::AppState;

/// Error response carrying a status code and an `{"error": ...}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn not_found(task_id: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("task {} not found", task_id))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "banana".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `POST /api/v1/generate`: validate, register and schedule a run.
pub async fn generate(
    State(state): State<Arc<AppState>>,
    body: Result<Json<GenerateBody>, JsonRejection>,
) -> Result<(StatusCode, Json<TaskCreated>), ApiError> {
    let Json(body) =
        body.map_err(|e| ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, e.body_text()))?;
    let request = body
        .into_request()
        .map_err(|e| ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, e))?;

    let task_id = state.tasks.submit(request);
    Ok((
        StatusCode::ACCEPTED,
        Json(TaskCreated {
            status_url: status_url(&task_id),
            task_id,
            status: TaskStatus::Pending,
        }),
    ))
}

pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .tasks
        .get(&task_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(&task_id))
}

pub async fn get_task_image(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Response, ApiError> {
    let path = match state.tasks.image(&task_id) {
        ImageLookup::UnknownTask => return Err(ApiError::not_found(&task_id)),
        ImageLookup::NotCompleted(status) => {
            return Err(ApiError::new(
                StatusCode::CONFLICT,
                format!(
                    "task {} is {}, image not available",
                    task_id,
                    status.as_str()
                ),
            ))
        }
        ImageLookup::Ready(path) => path,
    };

    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        tracing::warn!(task_id = %task_id, path = %path.display(), "Image unreadable: {}", e);
        ApiError::new(StatusCode::NOT_FOUND, "image file missing")
    })?;
    Ok(([(header::CONTENT_TYPE, "image/png")], bytes).into_response())
}

pub async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.tasks.cancel(&task_id) {
        CancelOutcome::UnknownTask => Err(ApiError::not_found(&task_id)),
        CancelOutcome::AlreadyFinished(_) => Err(ApiError::new(
            StatusCode::CONFLICT,
            format!("task {} already finished", task_id),
        )),
        CancelOutcome::Requested => Ok((
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "task_id": task_id, "cancel_requested": true })),
        )),
    }
}
