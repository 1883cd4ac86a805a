//! Generation provider adapters.
//!
//! Hides the difference between the two interchangeable image backends
//! behind one [`GenerationBackend`](adapter::GenerationBackend) trait:
//! [`flux`] submits a task and polls it to completion, [`gpt`] issues a
//! single streaming call and extracts the asset from the first
//! structured chunk that carries it. [`video`] wraps the two video
//! models (short WanX clip, longer Framepack sequence) and [`curation`]
//! wraps the remote safety-score and inpainting endpoints used by the
//! premium post-processing stage.
//!
//! Adapters hold no shared mutable state beyond their pooled HTTP
//! client, so the orchestrator may fan out any number of concurrent
//! `generate` calls.

pub mod adapter;
pub mod curation;
pub mod error;
pub mod flux;
pub mod gpt;
pub mod video;

pub use adapter::{backend_for, GenerationBackend, GenerationRequest, GenerationResult};
pub use curation::{ImageCuration, PiApiCuration};
pub use error::ProviderError;
pub use flux::FluxBackend;
pub use gpt::GptBackend;
pub use video::{PiApiVideoBackend, VideoBackend};
