//! The queued unit of work and its wire envelope.
//!
//! One queue message carries exactly one [`Job`]. The worker owns the
//! message's visibility/delete lifecycle; the orchestrator owns the
//! Job's business-state transitions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::brief::Brief;
use crate::error::PipelineError;

/// Task type carried by image-generation queue messages.
pub const TASK_GENERATE_IMAGES: &str = "generate_images";

// ---------------------------------------------------------------------------
// Wire envelope
// ---------------------------------------------------------------------------

/// JSON body of a queue message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub task_type: String,
    pub data: TaskData,
}

/// Payload of a `generate_images` task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskData {
    /// Stable per-Job id. Producers may omit it; a fresh id is then
    /// assigned on first parse (redelivered copies of the same message
    /// body keep whatever the producer wrote).
    #[serde(default = "Uuid::new_v4")]
    pub job_id: Uuid,
    pub user_id: i64,
    pub session_id: String,
    pub brief: Brief,
    /// Reference photo URLs uploaded by the user.
    pub photos: Vec<String>,
}

impl TaskEnvelope {
    /// Build a `generate_images` envelope.
    pub fn generate_images(data: TaskData) -> Self {
        Self {
            task_type: TASK_GENERATE_IMAGES.to_string(),
            data,
        }
    }

    /// Convert the envelope into a [`Job`], rejecting unknown task types.
    pub fn into_job(self) -> Result<Job, PipelineError> {
        if self.task_type != TASK_GENERATE_IMAGES {
            return Err(PipelineError::Validation(format!(
                "unknown task type '{}'",
                self.task_type
            )));
        }
        Ok(Job {
            job_id: self.data.job_id,
            user_id: self.data.user_id,
            session_id: self.data.session_id,
            brief: self.data.brief,
            reference_photos: self.data.photos,
        })
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One unit of pipeline work, derived from a queue message.
#[derive(Debug, Clone)]
pub struct Job {
    pub job_id: Uuid,
    pub user_id: i64,
    pub session_id: String,
    pub brief: Brief,
    pub reference_photos: Vec<String>,
}

impl Job {
    /// Fail fast on a Job that can never be processed.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.session_id.trim().is_empty() {
            return Err(PipelineError::Validation(
                "session_id must not be empty".to_string(),
            ));
        }
        self.brief.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brief::{GeneratorKind, PackageTier};
    use assert_matches::assert_matches;

    fn sample_body() -> &'static str {
        r#"{
            "task_type": "generate_images",
            "data": {
                "user_id": 42,
                "session_id": "sess-001",
                "brief": {
                    "package_type": "trial",
                    "purpose": "insta",
                    "style": "RL-01",
                    "background": "studio",
                    "lora_type": "realism",
                    "marketing_consent": false,
                    "generator": "flux"
                },
                "photos": ["https://cdn.example/ref1.jpg"]
            }
        }"#
    }

    #[test]
    fn envelope_parses_wire_format() {
        let env: TaskEnvelope = serde_json::from_str(sample_body()).unwrap();
        assert_eq!(env.task_type, TASK_GENERATE_IMAGES);
        let job = env.into_job().unwrap();
        assert_eq!(job.user_id, 42);
        assert_eq!(job.session_id, "sess-001");
        assert_eq!(job.brief.package_type, PackageTier::Trial);
        assert_eq!(job.brief.generator, GeneratorKind::Flux);
        assert_eq!(job.reference_photos.len(), 1);
    }

    #[test]
    fn missing_job_id_gets_assigned() {
        let env: TaskEnvelope = serde_json::from_str(sample_body()).unwrap();
        // Not nil: the default hook ran.
        assert_ne!(env.data.job_id, Uuid::nil());
    }

    #[test]
    fn unknown_task_type_is_a_validation_error() {
        let mut env: TaskEnvelope = serde_json::from_str(sample_body()).unwrap();
        env.task_type = "transcode_video".into();
        assert_matches!(env.into_job(), Err(PipelineError::Validation(_)));
    }

    #[test]
    fn job_validation_rejects_empty_session() {
        let env: TaskEnvelope = serde_json::from_str(sample_body()).unwrap();
        let mut job = env.into_job().unwrap();
        job.session_id = "".into();
        assert_matches!(job.validate(), Err(PipelineError::Validation(_)));
    }

    #[test]
    fn envelope_round_trips() {
        let env: TaskEnvelope = serde_json::from_str(sample_body()).unwrap();
        let json = serde_json::to_string(&env).unwrap();
        let back: TaskEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.data.session_id, env.data.session_id);
        assert_eq!(back.data.job_id, env.data.job_id);
    }
}
