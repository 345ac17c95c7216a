// Shared fakes for integration tests
#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use banana::config::Settings;
use banana::imaging::{blank_png, ImageData};
use banana::pipeline::Pipeline;
use banana::providers::{ImageModel, ImageRequest, VisionModel, VisionRequest};
use banana::reference::{ReferenceRecord, ReferenceStore};

/// Vision model replaying canned responses in order.
pub struct ScriptedVision {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<VisionRequest>>,
}

impl ScriptedVision {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<VisionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl VisionModel for ScriptedVision {
    async fn generate(&self, request: &VisionRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        match self.responses.lock().unwrap().pop_front() {
            Some(response) => Ok(response),
            None => bail!("no scripted responses left"),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        "scripted-vlm"
    }
}

/// Vision model that never answers.
pub struct StalledVision;

#[async_trait]
impl VisionModel for StalledVision {
    async fn generate(&self, _request: &VisionRequest) -> Result<String> {
        std::future::pending::<()>().await;
        unreachable!()
    }

    fn name(&self) -> &str {
        "stalled"
    }

    fn model_name(&self) -> &str {
        "stalled-vlm"
    }
}

/// Image model returning a small blank PNG and counting calls.
#[derive(Default)]
pub struct FakeImageModel {
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl FakeImageModel {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Each call renders a different size: 8x8 first, then 9x9, and so on.
    pub fn side_for_call(call: u32) -> u32 {
        7 + call
    }
}

#[async_trait]
impl ImageModel for FakeImageModel {
    async fn generate(&self, request: &ImageRequest) -> Result<ImageData> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) as u32;
        self.prompts.lock().unwrap().push(request.prompt.clone());
        let side = Self::side_for_call(call + 1);
        blank_png(side, side)
    }

    fn name(&self) -> &str {
        "fake"
    }

    fn model_name(&self) -> &str {
        "fake-image"
    }
}

/// Settings rooted in a temp directory, with a plot interpreter that
/// does not exist.
pub fn test_settings(root: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.output.dir = root.join("outputs");
    settings.reference.path = root.join("refs");
    settings.reference.guidelines_path = root.join("guidelines");
    settings.pipeline.refinement_iterations = 3;
    settings.pipeline.num_retrieval_examples = 2;
    settings.pipeline.python = "banana-test-no-such-python".to_string();
    settings
}

pub fn records(n: usize) -> Vec<ReferenceRecord> {
    (1..=n)
        .map(|i| {
            ReferenceRecord::new(
                format!("ref_{}", i),
                format!("Methodology text {}", i),
                format!("Figure {}", i),
            )
        })
        .collect()
}

pub fn pipeline(
    root: &Path,
    vlm: Arc<dyn VisionModel>,
    image: Arc<dyn ImageModel>,
    catalog: Vec<ReferenceRecord>,
) -> Pipeline {
    let settings = test_settings(root);
    let store = Arc::new(ReferenceStore::from_records(root.join("refs"), catalog));
    Pipeline::new(settings, vlm, image, store)
}

pub const NO_ISSUES: &str = r#"{"critic_suggestions": [], "revised_description": null}"#;

pub fn revise(to: &str) -> String {
    serde_json::json!({
        "critic_suggestions": ["Label the arrows"],
        "revised_description": to,
    })
    .to_string()
}
