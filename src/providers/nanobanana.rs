// Nano Banana image generation via the kie.ai async task API
//
// Flow: POST /jobs/createTask -> poll GET /jobs/recordInfo -> download result.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

use super::retry::{with_retry_policy, RetryPolicy};
use super::transport::TransportConfig;
use super::types::ImageRequest;
use super::{missing_key, ImageModel};
use crate::imaging::ImageData;

pub const KIE_BASE_URL: &str = "https://api.kie.ai/api/v1";

/// Task polling schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Wait before the first status check
    pub initial_delay: Duration,
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            interval: Duration::from_secs(3),
            timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Clone)]
pub struct NanoBananaImage {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    poll: PollConfig,
    retry: RetryPolicy,
}

impl NanoBananaImage {
    pub fn new(
        api_key: Option<String>,
        model: impl Into<String>,
        transport: &TransportConfig,
    ) -> Result<Self> {
        Ok(Self {
            client: transport.build_client()?,
            api_key,
            base_url: KIE_BASE_URL.to_string(),
            model: model.into(),
            poll: PollConfig::default(),
            retry: transport.retry,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| missing_key("kie.ai", "KIE_API_KEY"))
    }

    async fn create_task(&self, request: &ImageRequest) -> Result<String> {
        let body = CreateTaskRequest {
            model: self.model.clone(),
            input: CreateTaskInput {
                prompt: request.prompt_with_avoid(),
                output_format: "png".to_string(),
                image_size: kie_image_size(request.width, request.height).to_string(),
            },
        };

        let response = self
            .client
            .post(format!("{}/jobs/createTask", self.base_url))
            .bearer_auth(self.api_key()?)
            .json(&body)
            .send()
            .await
            .context("Failed to submit kie.ai task")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            bail!(
                "kie.ai createTask failed\n\nStatus: {}\nBody: {}",
                status,
                error_body
            );
        }

        let created: Envelope<CreateTaskData> = response
            .json()
            .await
            .context("Failed to parse kie.ai createTask response")?;
        let task_id = created
            .data
            .and_then(|d| d.task_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| anyhow!("No taskId in kie.ai createTask response"))?;

        tracing::debug!(task_id = %task_id, "NanoBanana task created");
        Ok(task_id)
    }

    /// Poll until the task finishes and return its result URLs.
    async fn poll_task(&self, task_id: &str) -> Result<Vec<String>> {
        sleep(self.poll.initial_delay).await;
        let mut elapsed = self.poll.initial_delay;

        loop {
            let response = self
                .client
                .get(format!("{}/jobs/recordInfo", self.base_url))
                .bearer_auth(self.api_key()?)
                .query(&[("taskId", task_id)])
                .send()
                .await
                .context("Failed to poll kie.ai task")?;

            let status = response.status();
            if !status.is_success() {
                let error_body = response.text().await.unwrap_or_default();
                bail!(
                    "kie.ai recordInfo failed\n\nStatus: {}\nBody: {}",
                    status,
                    error_body
                );
            }

            let record: Envelope<TaskRecord> = response
                .json()
                .await
                .context("Failed to parse kie.ai recordInfo response")?;
            let record = record.data.unwrap_or_default();

            match record.state.to_ascii_lowercase().as_str() {
                "success" => {
                    let urls = record.result_urls();
                    if urls.is_empty() {
                        bail!("kie.ai task {} succeeded but returned no result URLs", task_id);
                    }
                    tracing::debug!(task_id, urls = urls.len(), "NanoBanana task completed");
                    return Ok(urls);
                }
                "fail" => {
                    let reason = record
                        .fail_msg
                        .or(record.fail_code)
                        .unwrap_or_else(|| "Unknown error".to_string());
                    bail!("NanoBanana task failed: {}", reason);
                }
                state => {
                    tracing::debug!(task_id, state, elapsed = ?elapsed, "NanoBanana task pending");
                }
            }

            if elapsed >= self.poll.timeout {
                bail!(
                    "NanoBanana task {} timed out after {:?}",
                    task_id,
                    self.poll.timeout
                );
            }
            sleep(self.poll.interval).await;
            elapsed += self.poll.interval;
        }
    }

    async fn download(&self, url: &str) -> Result<ImageData> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to download generated image from {}", url))?;
        let status = response.status();
        if !status.is_success() {
            bail!("Image download failed with status {}", status);
        }
        let bytes = response
            .bytes()
            .await
            .context("Failed to read generated image body")?;
        ImageData::from_bytes(bytes.to_vec())
    }

    async fn generate_once(&self, request: &ImageRequest) -> Result<ImageData> {
        let task_id = self.create_task(request).await?;
        let urls = self.poll_task(&task_id).await?;
        let image = self.download(&urls[0]).await?;

        let size = image
            .png_dimensions()
            .map(|(w, h)| format!("{}x{}", w, h))
            .unwrap_or_else(|| image.media_type.clone());
        tracing::info!(model = %self.model, task_id = %task_id, size = %size, "NanoBanana image generated");
        Ok(image)
    }
}

#[async_trait]
impl ImageModel for NanoBananaImage {
    async fn generate(&self, request: &ImageRequest) -> Result<ImageData> {
        with_retry_policy(self.retry, || self.generate_once(request)).await
    }

    fn name(&self) -> &str {
        "nanobanana"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Map pixel dimensions to the nearest aspect ratio kie.ai accepts.
pub fn kie_image_size(width: u32, height: u32) -> &'static str {
    let ratio = width as f64 / height.max(1) as f64;
    match ratio {
        r if r > 2.0 => "21:9",
        r if r > 1.5 => "16:9",
        r if r > 1.3 => "3:2",
        r if r > 1.15 => "5:4",
        r if r > 0.87 => "1:1",
        r if r > 0.77 => "4:5",
        r if r > 0.67 => "3:4",
        r if r > 0.5 => "2:3",
        _ => "9:16",
    }
}

// kie.ai wire types

#[derive(Debug, Serialize)]
struct CreateTaskRequest {
    model: String,
    input: CreateTaskInput,
}

#[derive(Debug, Serialize)]
struct CreateTaskInput {
    prompt: String,
    output_format: String,
    image_size: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskData {
    #[serde(default)]
    task_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskRecord {
    #[serde(default)]
    state: String,
    /// JSON-encoded string holding `{"resultUrls": [...]}`
    #[serde(default)]
    result_json: Option<String>,
    #[serde(default)]
    fail_msg: Option<String>,
    #[serde(default)]
    fail_code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskResult {
    #[serde(default)]
    result_urls: Vec<String>,
}

impl TaskRecord {
    fn result_urls(&self) -> Vec<String> {
        self.result_json
            .as_deref()
            .filter(|s| !s.is_empty())
            .and_then(|s| serde_json::from_str::<TaskResult>(s).ok())
            .map(|r| r.result_urls)
            .unwrap_or_default()
    }
}
