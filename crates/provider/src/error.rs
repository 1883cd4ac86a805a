//! Provider error taxonomy surfaced to the orchestrator.

/// Error from a generation backend call.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Network failure, 5xx, or anything else the caller may retry by
    /// re-running the Job later.
    #[error("Provider request failed: {0}")]
    Transient(String),

    /// The backend explicitly reported generation failure (for example
    /// a policy rejection). Retrying the same prompt will not help.
    #[error("Generation rejected by backend: {0}")]
    Permanent(String),

    /// The wait budget elapsed before the backend reached a terminal
    /// state. Distinct from a backend-reported failure.
    #[error("Timed out after {budget_secs}s waiting for task {task_id}")]
    Timeout { task_id: String, budget_secs: u64 },
}

impl ProviderError {
    /// Whether re-running the Job later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Transient(_) | ProviderError::Timeout { .. }
        )
    }

    /// Classify an HTTP status code: 5xx is transient, anything else
    /// non-successful is treated as a backend rejection.
    pub fn from_status(status: reqwest::StatusCode, context: &str) -> Self {
        if status.is_server_error() {
            ProviderError::Transient(format!("{context}: HTTP {status}"))
        } else {
            ProviderError::Permanent(format!("{context}: HTTP {status}"))
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        ProviderError::Transient(e.to_string())
    }
}
