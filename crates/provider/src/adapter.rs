//! The uniform generation interface and backend selection.

use std::sync::Arc;

use async_trait::async_trait;

use atelier_core::brief::GeneratorKind;
use atelier_core::config::ProviderConfig;

use crate::error::ProviderError;
use crate::flux::FluxBackend;
use crate::gpt::GptBackend;

/// One image-generation request, already fully resolved (prompt text,
/// references, stylization parameters).
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Reference photo URLs; backends cap how many they accept.
    pub reference_photos: Vec<String>,
    pub lora_type: String,
    pub lora_strength: f32,
    pub width: u32,
    pub height: u32,
}

/// Successful generation evidence.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// Remote URL of the produced image.
    pub asset_url: String,
    /// Backend task id, when the backend assigns one (poll-style only).
    pub backend_task_id: Option<String>,
}

/// Uniform capability over the interchangeable image backends.
///
/// Implementations must be safe to call from many concurrent tasks;
/// the orchestrator fans out one call per prompt.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, request: &GenerationRequest)
        -> Result<GenerationResult, ProviderError>;
}

/// Build the adapter for the backend the Brief selected.
///
/// The adapter is picked once per Job and passed down; the orchestrator
/// never branches on the backend kind again.
pub fn backend_for(kind: GeneratorKind, config: &ProviderConfig) -> Arc<dyn GenerationBackend> {
    match kind {
        GeneratorKind::Flux => Arc::new(FluxBackend::new(config)),
        GeneratorKind::Gpt => Arc::new(GptBackend::new(config)),
    }
}
