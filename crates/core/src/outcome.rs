//! Terminal record of one Job's processing.

use serde::{Deserialize, Serialize};

/// How the Job ended, derived from the success ratio of the image
/// fan-out (and possibly degraded by later optional stages).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// Every expected asset was produced and delivered.
    Success,
    /// Something was delivered, but less than everything.
    Partial,
    /// Nothing was produced.
    Failed,
}

impl OutcomeStatus {
    /// Status from `produced` successful units out of `expected`.
    pub fn from_counts(produced: usize, expected: usize) -> Self {
        if produced == 0 {
            OutcomeStatus::Failed
        } else if produced < expected {
            OutcomeStatus::Partial
        } else {
            OutcomeStatus::Success
        }
    }

    /// Degrade `Success` to `Partial`; `Partial`/`Failed` stay as-is.
    pub fn degraded(self) -> Self {
        match self {
            OutcomeStatus::Success => OutcomeStatus::Partial,
            other => other,
        }
    }
}

/// Terminal record for one Job, used to build the user notification
/// and as the return value for test assertions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub status: OutcomeStatus,
    /// Durable store URLs of every delivered image.
    pub delivered_asset_urls: Vec<String>,
    /// Set when the result set was packaged into a single archive.
    pub archive_url: Option<String>,
    pub video_urls: Vec<String>,
    /// Populated for failures and for delivery errors on an otherwise
    /// content-complete Job.
    pub error: Option<String>,
}

impl PipelineOutcome {
    /// Terminal-failure outcome with no delivered content.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            delivered_asset_urls: Vec::new(),
            archive_url: None,
            video_urls: Vec::new(),
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_from_counts() {
        assert_eq!(OutcomeStatus::from_counts(5, 5), OutcomeStatus::Success);
        assert_eq!(OutcomeStatus::from_counts(3, 5), OutcomeStatus::Partial);
        assert_eq!(OutcomeStatus::from_counts(0, 5), OutcomeStatus::Failed);
        assert_eq!(OutcomeStatus::from_counts(1, 1), OutcomeStatus::Success);
    }

    #[test]
    fn degraded_only_touches_success() {
        assert_eq!(OutcomeStatus::Success.degraded(), OutcomeStatus::Partial);
        assert_eq!(OutcomeStatus::Partial.degraded(), OutcomeStatus::Partial);
        assert_eq!(OutcomeStatus::Failed.degraded(), OutcomeStatus::Failed);
    }

    #[test]
    fn failed_outcome_carries_error() {
        let outcome = PipelineOutcome::failed("all generations rejected");
        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert!(outcome.delivered_asset_urls.is_empty());
        assert_eq!(outcome.error.as_deref(), Some("all generations rejected"));
    }
}
