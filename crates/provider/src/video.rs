//! Image-to-video backends (WanX short clips, Framepack sequences).
//!
//! Both models live behind the same PiAPI task surface: `POST /tasks`
//! queues a task, `GET /tasks/{id}` reports its status. They differ in
//! payload shape, frame rate and wait budget, so each gets its own
//! entry point on [`VideoBackend`].

use std::time::Duration;

use serde::Deserialize;

use atelier_core::config::ProviderConfig;

use crate::error::ProviderError;

/// Fixed delay between status polls. Video tasks run minutes, not
/// seconds, so this is coarser than the image poll interval.
pub const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Wait budget for a WanX short clip.
pub const SHORT_MAX_WAIT: Duration = Duration::from_secs(180);

/// Wait budget for a Framepack sequence.
pub const LONG_MAX_WAIT: Duration = Duration::from_secs(300);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const WANX_MODEL: &str = "Qubico/wanx";
const WANX_TASK_TYPE: &str = "img2video-14b-lora";
const WANX_FPS: u32 = 20;
const WANX_MAX_SECONDS: u32 = 6;

const FRAMEPACK_MODEL: &str = "Qubico/framepack";
const FRAMEPACK_TASK_TYPE: &str = "img2video";
const FRAMEPACK_FPS: u32 = 15;

/// Framepack refuses longer sequences.
const FRAMEPACK_SECONDS_CAP: u32 = 20;

const LORA_STRENGTH: f32 = 0.7;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

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
    video_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, PartialEq)]
enum PollOutcome {
    Ready(String),
    InProgress,
}

// ---------------------------------------------------------------------------
// Trait and backend
// ---------------------------------------------------------------------------

/// Capability over the animated-asset backends.
#[async_trait::async_trait]
pub trait VideoBackend: Send + Sync {
    /// A short animated clip from one still image.
    async fn short_video(
        &self,
        init_image_url: &str,
        prompt: &str,
        lora_type: &str,
    ) -> Result<String, ProviderError>;

    /// A longer sequence from one still image.
    async fn long_video(
        &self,
        init_image_url: &str,
        prompt: &str,
        seconds: u32,
    ) -> Result<String, ProviderError>;
}

/// PiAPI implementation over WanX and Framepack.
pub struct PiApiVideoBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl PiApiVideoBackend {
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

    async fn create_task(&self, payload: &serde_json::Value) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(format!("{}/api/v1/tasks", self.base_url))
            .header("X-API-Key", &self.api_key)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(status, "video task submit"));
        }

        let envelope: ApiEnvelope = response.json().await?;
        let data = check_envelope(envelope)?;
        tracing::debug!(task_id = %data.task_id, "video task queued");
        Ok(data.task_id)
    }

    async fn poll(&self, task_id: &str) -> Result<PollOutcome, ProviderError> {
        let response = self
            .client
            .get(format!("{}/api/v1/tasks/{}", self.base_url, task_id))
            .header("X-API-Key", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(status, "video task status"));
        }

        let envelope: ApiEnvelope = response.json().await?;
        interpret_poll(check_envelope(envelope)?)
    }

    async fn wait_for_completion(
        &self,
        task_id: &str,
        budget: Duration,
    ) -> Result<String, ProviderError> {
        let deadline = tokio::time::Instant::now() + budget;

        loop {
            match self.poll(task_id).await? {
                PollOutcome::Ready(url) => return Ok(url),
                PollOutcome::InProgress => {}
            }

            if tokio::time::Instant::now() + POLL_INTERVAL > deadline {
                return Err(ProviderError::Timeout {
                    task_id: task_id.to_string(),
                    budget_secs: budget.as_secs(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait::async_trait]
impl VideoBackend for PiApiVideoBackend {
    async fn short_video(
        &self,
        init_image_url: &str,
        prompt: &str,
        lora_type: &str,
    ) -> Result<String, ProviderError> {
        let payload = build_wanx_payload(init_image_url, prompt, lora_type);
        let task_id = self.create_task(&payload).await?;
        let url = self.wait_for_completion(&task_id, SHORT_MAX_WAIT).await?;
        tracing::info!(task_id = %task_id, "short video completed");
        Ok(url)
    }

    async fn long_video(
        &self,
        init_image_url: &str,
        prompt: &str,
        seconds: u32,
    ) -> Result<String, ProviderError> {
        let payload = build_framepack_payload(init_image_url, prompt, seconds);
        let task_id = self.create_task(&payload).await?;
        let url = self.wait_for_completion(&task_id, LONG_MAX_WAIT).await?;
        tracing::info!(task_id = %task_id, "long video completed");
        Ok(url)
    }
}

// ---------------------------------------------------------------------------
// Pure helpers
// ---------------------------------------------------------------------------

fn build_wanx_payload(init_image_url: &str, prompt: &str, lora_type: &str) -> serde_json::Value {
    serde_json::json!({
        "model": WANX_MODEL,
        "task_type": WANX_TASK_TYPE,
        "input": {
            "init_image": init_image_url,
            "prompt": prompt,
            "lora_settings": [
                {
                    "lora_type": lora_type,
                    "lora_strength": LORA_STRENGTH,
                }
            ],
            "fps": WANX_FPS,
            "max_seconds": WANX_MAX_SECONDS,
        },
    })
}

fn build_framepack_payload(init_image_url: &str, prompt: &str, seconds: u32) -> serde_json::Value {
    serde_json::json!({
        "model": FRAMEPACK_MODEL,
        "task_type": FRAMEPACK_TASK_TYPE,
        "input": {
            "init_image": init_image_url,
            "prompt": prompt,
            "fps": FRAMEPACK_FPS,
            "max_seconds": seconds.min(FRAMEPACK_SECONDS_CAP),
        },
    })
}

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

fn interpret_poll(data: TaskData) -> Result<PollOutcome, ProviderError> {
    let status = data.status.as_deref().unwrap_or("").to_ascii_lowercase();
    match status.as_str() {
        "completed" => {
            let url = data.output.and_then(|o| o.video_url).ok_or_else(|| {
                ProviderError::Permanent("completed task carried no video URL".to_string())
            })?;
            Ok(PollOutcome::Ready(url))
        }
        "failed" => Err(ProviderError::Permanent(
            data.error
                .and_then(|e| e.message)
                .unwrap_or_else(|| "video generation failed".to_string()),
        )),
        _ => Ok(PollOutcome::InProgress),
    }
}
