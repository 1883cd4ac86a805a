//! Asset lineage records.
//!
//! An [`Asset`] is a produced image or video at one point of its life.
//! Stage transitions are pure functions producing a *new* record; no
//! stage mutates a prior stage's record. The append-only lineage is
//! what makes partial-failure recovery tractable: a failed later stage
//! can be retried without redoing earlier stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where in the pipeline an asset record was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStage {
    /// Fresh from the generation backend; URL points at the provider.
    Generated,
    /// Bytes pulled down from the provider URL.
    Downloaded,
    /// Re-encoded to bounded resolution.
    Optimized,
    /// Durably stored; URL points at the object store.
    Uploaded,
    /// Premium enhancement sub-pipeline completed.
    PostProcessed,
    /// Referenced by the final user notification.
    Delivered,
}

/// One image or video artifact with its stage tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub session_id: String,
    /// Position inside the session's result set; drives deterministic
    /// storage keys.
    pub index: usize,
    pub stage: AssetStage,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl Asset {
    /// First lineage record: the backend produced a remote URL.
    pub fn generated(session_id: impl Into<String>, index: usize, url: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            index,
            stage: AssetStage::Generated,
            url: url.into(),
            created_at: Utc::now(),
        }
    }

    /// Pure transition: same artifact, next stage, possibly a new URL.
    pub fn advanced(&self, stage: AssetStage, url: impl Into<String>) -> Self {
        Self {
            session_id: self.session_id.clone(),
            index: self.index,
            stage,
            url: url.into(),
            created_at: Utc::now(),
        }
    }

    /// Transition that keeps the current URL (e.g. an in-place
    /// overwrite of the same storage key).
    pub fn at_stage(&self, stage: AssetStage) -> Self {
        self.advanced(stage, self.url.clone())
    }
}
