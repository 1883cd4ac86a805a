use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atelier_core::brief::GeneratorKind;
use atelier_core::config::WorkerConfig;
use atelier_notify::TelegramNotifier;
use atelier_pipeline::post_process::EnhanceSettings;
use atelier_pipeline::{Components, Orchestrator, PipelineSettings};
use atelier_provider::{backend_for, PiApiCuration, PiApiVideoBackend};
use atelier_queue::SqsQueue;
use atelier_storage::{HttpFetcher, S3Store};
use atelier_worker::Worker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atelier_worker=debug,atelier_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env()?;

    let queue = Arc::new(SqsQueue::connect(&config.queue).await);
    let store = Arc::new(S3Store::connect(&config.store).await);
    let notifier = Arc::new(TelegramNotifier::new(&config.bot_token));

    let components = Components {
        flux: backend_for(GeneratorKind::Flux, &config.provider),
        gpt: backend_for(GeneratorKind::Gpt, &config.provider),
        video: Arc::new(PiApiVideoBackend::new(&config.provider)),
        curation: Arc::new(PiApiCuration::new(&config.provider)),
        store,
        fetcher: Arc::new(HttpFetcher::new()),
        notifier: notifier.clone(),
    };
    let settings = PipelineSettings {
        image_size: config.image_size,
        enhance: EnhanceSettings {
            unsafe_score_threshold: config.unsafe_score_threshold,
            upscale_width: config.upscale_width,
            upscale_height: config.upscale_height,
            ..EnhanceSettings::default()
        },
        ..PipelineSettings::default()
    };
    let orchestrator = Arc::new(Orchestrator::new(components, settings));

    let worker = Worker::new(
        queue,
        orchestrator,
        notifier,
        config.concurrency,
        config.max_retries,
        config.retry_delay_secs as u32,
    );

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::error!(error = %e, "SIGTERM handler unavailable");
                        let _ = ctrl_c.await;
                        shutdown.cancel();
                        return;
                    }
                };
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        tracing::info!("shutdown signal received");
        shutdown.cancel();
    });

    worker.run(cancel).await;
    Ok(())
}
