//! The client Brief and the package tiers that gate entitlements.
//!
//! A [`Brief`] is produced once per session by the chat front end and
//! is immutable from the pipeline's point of view. The package tier is
//! the single source of truth for downstream entitlements -- prompt
//! counts, video counts, and post-processing eligibility are all
//! derived from it and never independently settable.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Images the provider yields per prompt, by convention.
pub const IMAGES_PER_PROMPT: usize = 2;

// ---------------------------------------------------------------------------
// Package tier
// ---------------------------------------------------------------------------

/// Package level purchased by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageTier {
    Trial,
    Basic,
    Standard,
    Premium,
}

impl PackageTier {
    /// Wire/display name.
    pub fn name(self) -> &'static str {
        match self {
            PackageTier::Trial => "trial",
            PackageTier::Basic => "basic",
            PackageTier::Standard => "standard",
            PackageTier::Premium => "premium",
        }
    }

    /// Number of generation prompts this tier is entitled to.
    pub fn prompt_count(self) -> usize {
        match self {
            PackageTier::Trial => 2,
            PackageTier::Basic => 5,
            PackageTier::Standard => 12,
            PackageTier::Premium => 25,
        }
    }

    /// Advertised photo count (prompts times images per prompt).
    pub fn photo_count(self) -> usize {
        self.prompt_count() * IMAGES_PER_PROMPT
    }

    /// Number of videos included in this tier.
    pub fn video_count(self) -> usize {
        match self {
            PackageTier::Trial | PackageTier::Basic => 0,
            PackageTier::Standard => 1,
            PackageTier::Premium => 2,
        }
    }

    /// Whether the tier includes the video stage at all.
    pub fn includes_video(self) -> bool {
        self.video_count() > 0
    }

    /// Whether the tier includes the post-processing stage.
    pub fn includes_post_processing(self) -> bool {
        matches!(self, PackageTier::Premium)
    }
}

// ---------------------------------------------------------------------------
// Generation backend choice
// ---------------------------------------------------------------------------

/// Which image-generation backend fulfills this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorKind {
    /// Job-submit-then-poll photorealistic backend.
    Flux,
    /// Stream-until-asset creative/compositing backend.
    Gpt,
}

// ---------------------------------------------------------------------------
// Brief
// ---------------------------------------------------------------------------

/// Immutable description of the ordered photo session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Brief {
    /// Package tier gating all entitlements.
    pub package_type: PackageTier,
    /// What the photos are for (insta/avatar/career/dating/...).
    pub purpose: String,
    /// Style catalog id, e.g. `RL-01`.
    pub style: String,
    /// Background choice: a predefined name or free-form description.
    pub background: String,
    /// Stylization model id passed through to the backend.
    pub lora_type: String,
    /// Optional overlay text to render on delivered images.
    #[serde(default)]
    pub text_overlay: Option<String>,
    /// Whether the user consented to marketing use of the results.
    #[serde(default)]
    pub marketing_consent: bool,
    /// Chosen generation backend.
    pub generator: GeneratorKind,
    /// Optional opt-out of the video stage. Tier remains the
    /// entitlement; `None` means entitled-by-tier.
    #[serde(default)]
    pub enable_video: Option<bool>,
    /// Optional opt-out of the post-processing stage.
    #[serde(default)]
    pub enable_post_process: Option<bool>,
}

impl Brief {
    /// Check that all required fields carry usable values.
    ///
    /// An incomplete Brief is a programming-contract violation by the
    /// producer, not a runtime retry case.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.style.trim().is_empty() {
            return Err(PipelineError::Validation(
                "style must not be empty".to_string(),
            ));
        }
        if self.purpose.trim().is_empty() {
            return Err(PipelineError::Validation(
                "purpose must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether the video stage should run for this order.
    pub fn wants_video(&self) -> bool {
        self.package_type.includes_video() && self.enable_video.unwrap_or(true)
    }

    /// Whether the post-processing stage should run for this order.
    pub fn wants_post_processing(&self) -> bool {
        self.package_type.includes_post_processing() && self.enable_post_process.unwrap_or(true)
    }
}
