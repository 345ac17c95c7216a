// Plot runner — execute generated plotting code under a hard timeout
//
// The script runs as a child process of the configured interpreter. Any
// failure (spawn error, non-zero exit, timeout, no output file) leaves a
// blank placeholder image at the output path so the critic still has
// something to look at.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::config::constants::{PLACEHOLDER_HEIGHT, PLACEHOLDER_WIDTH};
use crate::config::PipelineSettings;
use crate::error::{Outcome, PipelineError, PipelineResult};
use crate::imaging::blank_png;

static OUTPUT_PATH_ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^OUTPUT_PATH\s*=\s*["'].*["']\s*$"#)
        .expect("output path regex is valid")
});

const STDERR_PREVIEW_CHARS: usize = 500;

/// Pull the script out of a model response: the first ```python fence, else
/// the first plain fence, else the whole response.
pub fn extract_code(response: &str) -> &str {
    for marker in ["```python", "```"] {
        if let Some(start) = response.find(marker) {
            let body = &response[start + marker.len()..];
            let end = body.find("```").unwrap_or(body.len());
            return body[..end].trim();
        }
    }
    response.trim()
}

/// Replace any `OUTPUT_PATH = "..."` the model wrote with the real path.
pub fn prepare_script(code: &str, output_path: &Path) -> String {
    let cleaned = OUTPUT_PATH_ASSIGNMENT.replace_all(code, "");
    // JSON string literals are valid Python string literals
    let literal = serde_json::to_string(&output_path.to_string_lossy())
        .unwrap_or_else(|_| format!("\"{}\"", output_path.display()));
    format!("OUTPUT_PATH = {}\n{}", literal, cleaned)
}

#[derive(Debug, Clone)]
pub struct PlotRunner {
    python: String,
    timeout: Duration,
}

impl PlotRunner {
    pub fn new(python: impl Into<String>, timeout: Duration) -> Self {
        Self {
            python: python.into(),
            timeout,
        }
    }

    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self::new(settings.python.clone(), settings.plot_timeout())
    }

    /// Run `code` and make sure an image exists at `output_path` afterwards.
    ///
    /// Only I/O errors on the run directory are fatal; script failures come
    /// back as `Recovered` with the placeholder written.
    pub async fn execute(&self, code: &str, output_path: &Path) -> PipelineResult<Outcome<()>> {
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::io(parent, e))?;
        }
        match tokio::fs::remove_file(output_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(PipelineError::io(output_path, e)),
        }

        let output_path = absolute(output_path);
        let script = tempfile::Builder::new()
            .prefix("banana_plot_")
            .suffix(".py")
            .tempfile()
            .map_err(|e| PipelineError::io(std::env::temp_dir(), e))?;
        tokio::fs::write(script.path(), prepare_script(code, &output_path))
            .await
            .map_err(|e| PipelineError::io(script.path(), e))?;

        let result = match self.run_script(script.path(), &output_path).await {
            Ok(()) if output_path.is_file() => Ok(()),
            Ok(()) => Err("script finished without writing the output file".to_string()),
            Err(reason) => Err(reason),
        };

        match result {
            Ok(()) => {
                tracing::info!(path = %output_path.display(), "Plot rendered");
                Ok(Outcome::Clean(()))
            }
            Err(reason) => {
                tracing::error!(reason = %reason, "Plot code failed; writing placeholder");
                write_placeholder(&output_path).await?;
                Ok(Outcome::recovered((), reason))
            }
        }
    }

    async fn run_script(&self, script: &Path, output_path: &Path) -> Result<(), String> {
        let mut command = Command::new(&self.python);
        command
            .arg(script)
            .env("OUTPUT_PATH", output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => Err(format!(
                "plot code timed out after {}s",
                self.timeout.as_secs_f32()
            )),
            Ok(Err(e)) => Err(format!("failed to start {}: {}", self.python, e)),
            Ok(Ok(output)) if !output.status.success() => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let preview: String = stderr.chars().take(STDERR_PREVIEW_CHARS).collect();
                Err(format!("plot code exited with {}: {}", output.status, preview.trim()))
            }
            Ok(Ok(_)) => Ok(()),
        }
    }
}

async fn write_placeholder(path: &Path) -> PipelineResult<()> {
    let image = blank_png(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT)
        .map_err(|e| PipelineError::provider("visualize", e))?;
    tokio::fs::write(path, &image.bytes)
        .await
        .map_err(|e| PipelineError::io(path, e))
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
