//! Pipeline error taxonomy.
//!
//! Unit-level failures (one prompt, one image, one video) are absorbed
//! inside the orchestrator and never reach this type. A
//! [`PipelineError`] is a Job-level failure: it propagates to the
//! worker, which leaves the queue message undeleted so the queue's
//! visibility window drives redelivery.

/// A Job-level pipeline failure.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The Brief or Job is malformed. Fatal -- retrying the same
    /// message can never succeed.
    #[error("Invalid job: {0}")]
    Validation(String),

    /// The generation provider failed in a way that may heal itself
    /// (network error, 5xx, timeout). Retried via queue redelivery.
    #[error("Transient provider error: {0}")]
    TransientProvider(String),

    /// The generation provider explicitly rejected the work (for
    /// example a policy rejection of every prompt). Not worth retrying.
    #[error("Permanent provider error: {0}")]
    PermanentProvider(String),

    /// Nothing could be stored durably. Treated as transient at the
    /// Job level since storage connectivity usually recovers.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The user notification failed after content was durably stored.
    /// Logged, never used to re-run generation.
    #[error("Delivery error: {0}")]
    Delivery(String),
}

impl PipelineError {
    /// Whether redelivering the queue message has a chance of helping.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::TransientProvider(_) | PipelineError::Storage(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_storage_are_retryable() {
        assert!(PipelineError::TransientProvider("timeout".into()).is_retryable());
        assert!(PipelineError::Storage("upload failed".into()).is_retryable());
    }

    #[test]
    fn validation_and_permanent_are_not_retryable() {
        assert!(!PipelineError::Validation("missing style".into()).is_retryable());
        assert!(!PipelineError::PermanentProvider("policy rejection".into()).is_retryable());
        assert!(!PipelineError::Delivery("chat unreachable".into()).is_retryable());
    }

    #[test]
    fn display_includes_context() {
        let err = PipelineError::Validation("style must not be empty".into());
        assert_eq!(err.to_string(), "Invalid job: style must not be empty");
    }
}
