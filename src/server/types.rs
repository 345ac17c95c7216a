// Wire types for the HTTP API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::{DiagramKind, GenerationRequest, ProgressEvent};

/// Body of `POST /api/v1/generate`.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateBody {
    pub source_context: String,
    #[serde(alias = "caption")]
    pub communicative_intent: String,
    #[serde(default = "default_diagram_type")]
    pub diagram_type: String,
    #[serde(default)]
    pub raw_data: Option<serde_json::Value>,
    #[serde(default)]
    pub refinement_iterations: Option<u32>,
}

fn default_diagram_type() -> String {
    DiagramKind::Methodology.as_str().to_string()
}

impl GenerateBody {
    /// Convert to a pipeline request, checking everything the pipeline would
    /// reject so bad input fails before a task is created.
    pub fn into_request(self) -> Result<GenerationRequest, String> {
        let diagram_kind: DiagramKind = self.diagram_type.parse()?;
        let request = GenerationRequest {
            source_context: self.source_context,
            communicative_intent: self.communicative_intent,
            diagram_kind,
            raw_data: self.raw_data,
            refinement_iterations: self.refinement_iterations,
        };
        request.validate().map_err(|e| e.to_string())?;
        Ok(request)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// 202 response to a submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCreated {
    pub task_id: String,
    pub status: TaskStatus,
    pub status_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub image_url: String,
    pub run_id: String,
    pub description: String,
    pub total_iterations: usize,
    pub metadata: serde_json::Value,
}

/// Response of `GET /api/v1/tasks/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    pub task_id: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: Option<ProgressEvent>,
    pub result: Option<TaskResult>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

pub fn status_url(task_id: &str) -> String {
    format!("/api/v1/tasks/{}", task_id)
}

pub fn image_url(task_id: &str) -> String {
    format!("/api/v1/tasks/{}/image", task_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(json: serde_json::Value) -> GenerateBody {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_body_defaults_to_methodology() {
        let request = body(serde_json::json!({
            "source_context": "We train a model.",
            "caption": "Overview"
        }))
        .into_request()
        .unwrap();
        assert_eq!(request.diagram_kind, DiagramKind::Methodology);
        assert_eq!(request.communicative_intent, "Overview");
    }

    #[test]
    fn test_body_rejects_bad_type_and_empty_fields() {
        let bad_type = body(serde_json::json!({
            "source_context": "x", "communicative_intent": "y", "diagram_type": "sketch"
        }));
        assert!(bad_type.into_request().unwrap_err().contains("sketch"));

        let empty = body(serde_json::json!({
            "source_context": " ", "communicative_intent": "y"
        }));
        assert!(empty.into_request().is_err());

        let zero = body(serde_json::json!({
            "source_context": "x", "communicative_intent": "y", "refinement_iterations": 0
        }));
        assert!(zero.into_request().is_err());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
        assert!(TaskStatus::Failed.is_finished());
        assert!(!TaskStatus::Running.is_finished());
    }
}
