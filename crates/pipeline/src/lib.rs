//! The photo-session fulfillment pipeline.
//!
//! [`prompts`] expands a Brief into its tier-entitled prompt list,
//! [`orchestrator`] drives the stages end to end, [`post_process`]
//! holds the premium enhancement sub-pipeline, and [`delivery`] builds
//! the user-facing notification texts.

pub mod delivery;
pub mod orchestrator;
pub mod post_process;
pub mod prompts;

pub use orchestrator::{Components, Orchestrator, PipelineSettings};
pub use post_process::EnhanceSettings;
