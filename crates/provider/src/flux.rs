//! Poll-style image backend (Flux via the PiAPI task API).
//!
//! `submit` queues a `txt2img-lora` task and returns a task id; the
//! adapter then polls `GET /task/{id}` at a fixed interval until the
//! task reaches a terminal state or the wait budget elapses. Exceeding
//! the budget yields [`ProviderError::Timeout`], distinct from a
//! backend-reported failure.

use std::time::Duration;

use serde::Deserialize;

use atelier_core::config::ProviderConfig;

use crate::adapter::{GenerationBackend, GenerationRequest, GenerationResult};
use crate::error::ProviderError;

/// Fixed delay between status polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Maximum time to wait for one task to complete.
pub const MAX_WAIT: Duration = Duration::from_secs(300);

/// HTTP timeout for a single submit/status request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const MODEL: &str = "Qubico/flux1-dev-advanced";
const TASK_TYPE: &str = "txt2img-lora";
const GUIDANCE_SCALE: f64 = 3.5;
const STEPS: u32 = 28;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// PiAPI response envelope: `{code, message, data}`.
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<TaskData>,
}

#[derive(Debug, Deserialize)]
struct TaskData {
    task_id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    output: Option<TaskOutput>,
    #[serde(default)]
    error: Option<TaskError>,
}

#[derive(Debug, Deserialize)]
struct TaskOutput {
    #[serde(default)]
    image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskError {
    #[serde(default)]
    message: Option<String>,
}

/// Result of interpreting one status poll.
#[derive(Debug, PartialEq)]
enum PollOutcome {
    /// Terminal: the image URL is available.
    Ready(String),
    /// Still pending or processing; poll again.
    InProgress,
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Job-submit-then-poll image backend.
pub struct FluxBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl FluxBackend {
    pub fn new(config: &ProviderConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Queue a generation task, returning the backend task id.
    async fn submit(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let payload = build_task_payload(request);
        let response = self
            .client
            .post(format!("{}/api/v1/task", self.base_url))
            .header("X-API-Key", &self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(status, "task submit"));
        }

        let envelope: ApiEnvelope = response.json().await?;
        let data = check_envelope(envelope)?;

        tracing::debug!(task_id = %data.task_id, "Flux task queued");
        Ok(data.task_id)
    }

    /// One status poll for a queued task.
    async fn poll(&self, task_id: &str) -> Result<PollOutcome, ProviderError> {
        let response = self
            .client
            .get(format!("{}/api/v1/task/{}", self.base_url, task_id))
            .header("X-API-Key", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(status, "task status"));
        }

        let envelope: ApiEnvelope = response.json().await?;
        interpret_poll(check_envelope(envelope)?)
    }

    /// Poll until terminal or the wait budget elapses.
    async fn wait_for_completion(&self, task_id: &str) -> Result<String, ProviderError> {
        let deadline = tokio::time::Instant::now() + MAX_WAIT;

        loop {
            match self.poll(task_id).await? {
                PollOutcome::Ready(url) => return Ok(url),
                PollOutcome::InProgress => {}
            }

            if tokio::time::Instant::now() + POLL_INTERVAL > deadline {
                return Err(ProviderError::Timeout {
                    task_id: task_id.to_string(),
                    budget_secs: MAX_WAIT.as_secs(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait::async_trait]
impl GenerationBackend for FluxBackend {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, ProviderError> {
        let task_id = self.submit(request).await?;
        let asset_url = self.wait_for_completion(&task_id).await?;
        tracing::info!(task_id = %task_id, "Flux generation completed");
        Ok(GenerationResult {
            asset_url,
            backend_task_id: Some(task_id),
        })
    }
}

// ---------------------------------------------------------------------------
// Pure helpers
// ---------------------------------------------------------------------------

/// Build the submit payload for one request.
fn build_task_payload(request: &GenerationRequest) -> serde_json::Value {
    serde_json::json!({
        "model": MODEL,
        "task_type": TASK_TYPE,
        "input": {
            "prompt": request.prompt,
            "width": request.width,
            "height": request.height,
            "guidance_scale": GUIDANCE_SCALE,
            "steps": STEPS,
            "lora_settings": [
                {
                    "lora_type": request.lora_type,
                    "lora_strength": request.lora_strength,
                }
            ],
        },
    })
}

/// Unwrap the `{code, data}` envelope, mapping non-200 codes to a
/// backend rejection.
fn check_envelope(envelope: ApiEnvelope) -> Result<TaskData, ProviderError> {
    if envelope.code != 200 {
        return Err(ProviderError::Permanent(
            envelope
                .message
                .unwrap_or_else(|| format!("backend code {}", envelope.code)),
        ));
    }
    envelope
        .data
        .ok_or_else(|| ProviderError::Permanent("response carried no task data".to_string()))
}

/// Map a task status payload to a poll outcome.
fn interpret_poll(data: TaskData) -> Result<PollOutcome, ProviderError> {
    let status = data.status.as_deref().unwrap_or("").to_ascii_lowercase();
    match status.as_str() {
        "completed" => {
            let url = data.output.and_then(|o| o.image_url).ok_or_else(|| {
                ProviderError::Permanent("completed task carried no image URL".to_string())
            })?;
            Ok(PollOutcome::Ready(url))
        }
        "failed" => Err(ProviderError::Permanent(
            data.error
                .and_then(|e| e.message)
                .unwrap_or_else(|| "generation failed".to_string()),
        )),
        // pending, processing, staged, and anything unknown: keep polling.
        _ => Ok(PollOutcome::InProgress),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn request() -> GenerationRequest {
        GenerationRequest {
            prompt: "studio portrait".into(),
            reference_photos: vec![],
            lora_type: "realism".into(),
            lora_strength: 1.0,
            width: 1024,
            height: 1024,
        }
    }

    #[test]
    fn payload_shape_matches_task_api() {
        let payload = build_task_payload(&request());
        assert_eq!(payload["model"], "Qubico/flux1-dev-advanced");
        assert_eq!(payload["task_type"], "txt2img-lora");
        assert_eq!(payload["input"]["prompt"], "studio portrait");
        assert_eq!(payload["input"]["width"], 1024);
        assert_eq!(payload["input"]["steps"], 28);
        assert_eq!(payload["input"]["lora_settings"][0]["lora_type"], "realism");
        assert_eq!(payload["input"]["lora_settings"][0]["lora_strength"], 1.0);
    }

    #[test]
    fn envelope_rejects_non_200_code() {
        let envelope: ApiEnvelope = serde_json::from_str(
            r#"{"code": 400, "message": "invalid lora", "data": null}"#,
        )
        .unwrap();
        let err = check_envelope(envelope).unwrap_err();
        assert_matches!(err, ProviderError::Permanent(msg) if msg == "invalid lora");
    }

    #[test]
    fn completed_poll_yields_url() {
        let envelope: ApiEnvelope = serde_json::from_str(
            r#"{"code": 200, "data": {"task_id": "t-1", "status": "completed",
                "output": {"image_url": "https://cdn/img.png"}}}"#,
        )
        .unwrap();
        let outcome = interpret_poll(check_envelope(envelope).unwrap()).unwrap();
        assert_eq!(outcome, PollOutcome::Ready("https://cdn/img.png".into()));
    }

    #[test]
    fn pending_and_processing_keep_polling() {
        for status in ["pending", "processing", "Staged"] {
            let data = TaskData {
                task_id: "t-1".into(),
                status: Some(status.into()),
                output: None,
                error: None,
            };
            assert_eq!(interpret_poll(data).unwrap(), PollOutcome::InProgress);
        }
    }

    #[test]
    fn failed_poll_is_permanent_with_backend_message() {
        let data = TaskData {
            task_id: "t-1".into(),
            status: Some("failed".into()),
            output: None,
            error: Some(TaskError {
                message: Some("content policy".into()),
            }),
        };
        assert_matches!(
            interpret_poll(data),
            Err(ProviderError::Permanent(msg)) if msg == "content policy"
        );
    }

    #[test]
    fn completed_without_url_is_permanent() {
        let data = TaskData {
            task_id: "t-1".into(),
            status: Some("completed".into()),
            output: Some(TaskOutput { image_url: None }),
            error: None,
        };
        assert_matches!(interpret_poll(data), Err(ProviderError::Permanent(_)));
    }
}
