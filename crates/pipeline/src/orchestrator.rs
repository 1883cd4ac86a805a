//! The per-Job pipeline orchestrator.
//!
//! One call to [`Orchestrator::run`] drives a Job through every stage:
//! prompt expansion, generation fan-out, asset materialization into
//! durable storage, the optional album/video/enhancement stages, and
//! the final chat delivery. Stage policy is strict about what may fail
//! the Job: per-unit failures inside a stage are absorbed into a
//! Partial outcome, a stage producing *nothing* is an error, and a
//! delivery failure after content is durably stored never fails the
//! Job (the content exists; only the notification is lost).

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;

use atelier_core::asset::{Asset, AssetStage};
use atelier_core::brief::GeneratorKind;
use atelier_core::error::PipelineError;
use atelier_core::job::Job;
use atelier_core::outcome::{OutcomeStatus, PipelineOutcome};
use atelier_notify::Notifier;
use atelier_provider::{
    GenerationBackend, GenerationRequest, ImageCuration, ProviderError, VideoBackend,
};
use atelier_storage::{
    album_key, build_album, image_key, optimize_for_delivery, AssetFetcher, ObjectStore,
};

use crate::delivery::success_message;
use crate::post_process::{curate_image, EnhanceSettings};
use crate::prompts::{lora_for, prompts_for, style_display_name, validate_prompt};

/// Seconds of the long premium video.
const LONG_VIDEO_SECONDS: u32 = 10;

/// Everything the orchestrator talks to. All trait objects, so tests
/// inject fakes per seam.
pub struct Components {
    pub flux: Arc<dyn GenerationBackend>,
    pub gpt: Arc<dyn GenerationBackend>,
    pub video: Arc<dyn VideoBackend>,
    pub curation: Arc<dyn ImageCuration>,
    pub store: Arc<dyn ObjectStore>,
    pub fetcher: Arc<dyn AssetFetcher>,
    pub notifier: Arc<dyn Notifier>,
}

/// Stage tunables.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Album packaging kicks in above this many delivered photos.
    pub archive_threshold: usize,
    /// Concurrent generation calls per Job.
    pub generation_concurrency: usize,
    /// Concurrent enhancement runs per Job.
    pub post_process_concurrency: usize,
    /// Square edge length requested from the image backends.
    pub image_size: u32,
    pub enhance: EnhanceSettings,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            archive_threshold: 50,
            generation_concurrency: 4,
            post_process_concurrency: 3,
            image_size: 1024,
            enhance: EnhanceSettings::default(),
        }
    }
}

/// One image that survived materialization: its lineage record plus
/// the optimized bytes (kept for the album and enhancement stages).
struct Materialized {
    asset: Asset,
    key: String,
    bytes: Vec<u8>,
}

pub struct Orchestrator {
    components: Components,
    settings: PipelineSettings,
}

impl Orchestrator {
    pub fn new(components: Components, settings: PipelineSettings) -> Self {
        Self {
            components,
            settings,
        }
    }

    /// Drive one Job to a terminal outcome.
    ///
    /// `Err` means nothing deliverable was produced; the caller decides
    /// between retry and terminal failure based on
    /// [`PipelineError::is_retryable`].
    pub async fn run(&self, job: &Job) -> Result<PipelineOutcome, PipelineError> {
        job.validate()?;

        let prompts: Vec<String> = prompts_for(&job.brief)
            .into_iter()
            .filter(|p| validate_prompt(p))
            .collect();
        let expected = prompts.len();
        tracing::info!(
            job_id = %job.job_id,
            session_id = %job.session_id,
            tier = job.brief.package_type.name(),
            prompts = expected,
            "starting photo session"
        );

        let generated = self.generate_all(job, prompts).await?;
        let materialized = self.materialize_all(job, generated).await?;

        let mut status = OutcomeStatus::from_counts(materialized.len(), expected);

        let archive_url = self.package_album(job, &materialized).await;

        let video_urls = if job.brief.wants_video() {
            let videos = self.produce_videos(job, &materialized).await;
            if videos.len() < job.brief.package_type.video_count() {
                status = status.degraded();
            }
            videos
        } else {
            Vec::new()
        };

        let materialized = if job.brief.wants_post_processing() {
            self.enhance_all(materialized).await
        } else {
            materialized
        };

        let mut outcome = PipelineOutcome {
            status,
            delivered_asset_urls: materialized.iter().map(|m| m.asset.url.clone()).collect(),
            archive_url,
            video_urls,
            error: None,
        };

        match self.deliver(job, &outcome).await {
            Ok(()) => {
                let delivered: Vec<Asset> = materialized
                    .iter()
                    .map(|m| m.asset.at_stage(AssetStage::Delivered))
                    .collect();
                tracing::debug!(job_id = %job.job_id, assets = delivered.len(), "lineage closed");
            }
            Err(e) => {
                tracing::error!(job_id = %job.job_id, error = %e, "delivery failed after content was stored");
                outcome.error = Some(format!("delivery failed: {e}"));
            }
        }

        tracing::info!(
            job_id = %job.job_id,
            status = ?outcome.status,
            photos = outcome.delivered_asset_urls.len(),
            videos = outcome.video_urls.len(),
            "photo session finished"
        );
        Ok(outcome)
    }

    /// Fan generation out over the prompt list, absorbing per-prompt
    /// failures. Zero survivors is an error classified by the worst
    /// failure observed.
    async fn generate_all(
        &self,
        job: &Job,
        prompts: Vec<String>,
    ) -> Result<Vec<Asset>, PipelineError> {
        let backend = match job.brief.generator {
            GeneratorKind::Flux => Arc::clone(&self.components.flux),
            GeneratorKind::Gpt => Arc::clone(&self.components.gpt),
        };
        // The Brief's stylization-model id wins; the style catalog
        // only fills the gap when the order carries none.
        let (catalog_lora, lora_strength) = lora_for(&job.brief.style);
        let lora_type = if job.brief.lora_type.is_empty() {
            catalog_lora
        } else {
            job.brief.lora_type.as_str()
        };

        let results: Vec<(usize, Result<_, ProviderError>)> = stream::iter(
            prompts.into_iter().enumerate().map(|(index, prompt)| {
                let backend = Arc::clone(&backend);
                let request = GenerationRequest {
                    prompt,
                    reference_photos: job.reference_photos.clone(),
                    lora_type: lora_type.to_string(),
                    lora_strength,
                    width: self.settings.image_size,
                    height: self.settings.image_size,
                };
                async move { (index, backend.generate(&request).await) }
            }),
        )
        .buffer_unordered(self.settings.generation_concurrency)
        .collect()
        .await;

        let mut assets = Vec::new();
        let mut any_transient = false;
        let mut last_error = None;
        for (index, result) in results {
            match result {
                Ok(generated) => {
                    assets.push(Asset::generated(&job.session_id, index, generated.asset_url));
                }
                Err(e) => {
                    tracing::warn!(job_id = %job.job_id, index, error = %e, "generation unit failed");
                    any_transient |= e.is_transient();
                    last_error = Some(e);
                }
            }
        }

        if assets.is_empty() {
            let message = last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no prompts survived validation".to_string());
            return Err(if any_transient {
                PipelineError::TransientProvider(message)
            } else {
                PipelineError::PermanentProvider(message)
            });
        }

        assets.sort_by_key(|a| a.index);
        Ok(assets)
    }

    /// Pull each generated asset down, optimize it, and upload it under
    /// its deterministic session key.
    async fn materialize_all(
        &self,
        job: &Job,
        generated: Vec<Asset>,
    ) -> Result<Vec<Materialized>, PipelineError> {
        let mut survivors = Vec::new();
        for asset in generated {
            match self.materialize_one(job, &asset).await {
                Ok(m) => survivors.push(m),
                Err(e) => {
                    tracing::warn!(
                        job_id = %job.job_id,
                        index = asset.index,
                        error = %e,
                        "asset materialization failed"
                    );
                }
            }
        }
        if survivors.is_empty() {
            return Err(PipelineError::Storage(
                "no generated asset could be stored".to_string(),
            ));
        }
        Ok(survivors)
    }

    async fn materialize_one(
        &self,
        job: &Job,
        generated: &Asset,
    ) -> Result<Materialized, PipelineError> {
        let raw = self
            .components
            .fetcher
            .fetch(&generated.url)
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;
        let downloaded = generated.at_stage(AssetStage::Downloaded);

        let optimized_bytes =
            optimize_for_delivery(&raw).map_err(|e| PipelineError::Storage(e.to_string()))?;
        let optimized = downloaded.at_stage(AssetStage::Optimized);

        let key = image_key(&job.session_id, optimized.index);
        let url = self
            .components
            .store
            .upload(&key, optimized_bytes.clone(), "image/jpeg")
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;

        Ok(Materialized {
            asset: optimized.advanced(AssetStage::Uploaded, url),
            key,
            bytes: optimized_bytes,
        })
    }

    /// Package large result sets into one ZIP album. Failure only costs
    /// the album, never the photos.
    async fn package_album(&self, job: &Job, materialized: &[Materialized]) -> Option<String> {
        if materialized.len() <= self.settings.archive_threshold {
            return None;
        }
        let images: Vec<Vec<u8>> = materialized.iter().map(|m| m.bytes.clone()).collect();
        let album = match build_album(&images) {
            Ok(album) => album,
            Err(e) => {
                tracing::warn!(job_id = %job.job_id, error = %e, "album packaging failed");
                return None;
            }
        };
        let key = album_key(&job.session_id);
        match self
            .components
            .store
            .upload(&key, album, "application/zip")
            .await
        {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(job_id = %job.job_id, error = %e, "album upload failed");
                None
            }
        }
    }

    /// Animate the strongest stills into the tier-entitled clips. A
    /// failed clip degrades the outcome but never fails the Job.
    async fn produce_videos(&self, job: &Job, materialized: &[Materialized]) -> Vec<String> {
        let Some(first) = materialized.first() else {
            return Vec::new();
        };
        let motion_prompt = style_display_name(&job.brief.style);
        let (lora_type, _) = lora_for(&job.brief.style);
        let mut urls = Vec::new();

        match self
            .components
            .video
            .short_video(&first.asset.url, motion_prompt, lora_type)
            .await
        {
            Ok(url) => urls.push(url),
            Err(e) => {
                tracing::warn!(job_id = %job.job_id, error = %e, "short video failed");
            }
        }

        if job.brief.package_type.video_count() > 1 {
            let init = materialized.get(1).unwrap_or(first);
            match self
                .components
                .video
                .long_video(&init.asset.url, motion_prompt, LONG_VIDEO_SECONDS)
                .await
            {
                Ok(url) => urls.push(url),
                Err(e) => {
                    tracing::warn!(job_id = %job.job_id, error = %e, "long video failed");
                }
            }
        }
        urls
    }

    /// Enhance every stored image and overwrite it in place.
    ///
    /// Count-preserving by construction: enhancement failures deliver
    /// the already-stored original, and a failed overwrite keeps the
    /// pre-enhancement object.
    async fn enhance_all(&self, materialized: Vec<Materialized>) -> Vec<Materialized> {
        let semaphore = Arc::new(Semaphore::new(self.settings.post_process_concurrency));

        let enhanced = stream::iter(materialized.into_iter().map(|m| {
            let semaphore = Arc::clone(&semaphore);
            let curation = Arc::clone(&self.components.curation);
            let fetcher = Arc::clone(&self.components.fetcher);
            let store = Arc::clone(&self.components.store);
            let settings = self.settings.enhance.clone();
            async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return m;
                };
                let enhanced =
                    curate_image(m.bytes.clone(), curation.as_ref(), fetcher.as_ref(), &settings)
                        .await;
                match store.upload(&m.key, enhanced.clone(), "image/jpeg").await {
                    Ok(_) => Materialized {
                        asset: m.asset.at_stage(AssetStage::PostProcessed),
                        key: m.key,
                        bytes: enhanced,
                    },
                    Err(e) => {
                        tracing::warn!(key = %m.key, error = %e, "enhanced overwrite failed, keeping stored original");
                        m
                    }
                }
            }
        }))
        .buffer_unordered(self.settings.post_process_concurrency)
        .collect::<Vec<_>>()
        .await;

        // buffer_unordered scrambles completion order; delivery order
        // must stay stable.
        let mut enhanced = enhanced;
        enhanced.sort_by_key(|m| m.asset.index);
        enhanced
    }

    /// Single delivery attempt: photos as media groups, the album as a
    /// document when present.
    async fn deliver(
        &self,
        job: &Job,
        outcome: &PipelineOutcome,
    ) -> Result<(), atelier_notify::NotifyError> {
        let chat_id = job.user_id;
        let caption = success_message(outcome);
        self.components
            .notifier
            .send_media_group(chat_id, &outcome.delivered_asset_urls, &caption)
            .await?;

        if let Some(archive) = &outcome.archive_url {
            self.components
                .notifier
                .send_document(chat_id, archive)
                .await?;
        }
        Ok(())
    }
}
