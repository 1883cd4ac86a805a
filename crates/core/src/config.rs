//! Environment-driven configuration for the worker process.
//!
//! No component reads ambient global state: the worker binary builds a
//! [`WorkerConfig`] once at startup and threads the relevant slices
//! into each component's constructor.

use std::str::FromStr;

/// Configuration load error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Message queue connection settings (SQS-compatible).
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub queue_url: String,
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

/// Object store connection settings (S3-compatible).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub bucket: String,
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

/// Generation provider settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: String,
}

/// Full worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub queue: QueueConfig,
    pub store: StoreConfig,
    pub provider: ProviderConfig,
    /// Telegram bot token used for user notifications.
    pub bot_token: String,
    /// Messages pulled (and processed concurrently) per poll cycle.
    pub concurrency: usize,
    /// Attempts before a Job is routed to a terminal failure.
    pub max_retries: u32,
    /// Base delay between attempts, enforced by the queue's
    /// visibility window.
    pub retry_delay_secs: u64,
    /// Default generation resolution (square).
    pub image_size: u32,
    /// Unsafe-content score at or above which enhancement is skipped.
    pub unsafe_score_threshold: f32,
    /// Upscale bound, width.
    pub upscale_width: u32,
    /// Upscale bound, height.
    pub upscale_height: u32,
}

impl WorkerConfig {
    /// Read the full configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let access_key = required("STORAGE_ACCESS_KEY")?;
        let secret_key = required("STORAGE_SECRET_KEY")?;
        let region = optional("STORAGE_REGION", "ru-central1");

        Ok(Self {
            queue: QueueConfig {
                queue_url: required("QUEUE_URL")?,
                endpoint: optional(
                    "QUEUE_ENDPOINT",
                    "https://message-queue.api.cloud.yandex.net",
                ),
                region: region.clone(),
                access_key: access_key.clone(),
                secret_key: secret_key.clone(),
            },
            store: StoreConfig {
                bucket: optional("STORAGE_BUCKET", "ai-photos"),
                endpoint: optional("STORAGE_ENDPOINT", "https://storage.yandexcloud.net"),
                region,
                access_key,
                secret_key,
            },
            provider: ProviderConfig {
                api_key: required("PROVIDER_API_KEY")?,
                base_url: optional("PROVIDER_BASE_URL", "https://api.piapi.ai"),
            },
            bot_token: required("BOT_TOKEN")?,
            concurrency: parsed("WORKER_CONCURRENCY", 4)?,
            max_retries: parsed("MAX_RETRIES", 3)?,
            retry_delay_secs: parsed("RETRY_DELAY", 60)?,
            image_size: parsed("DEFAULT_IMAGE_SIZE", 1024)?,
            unsafe_score_threshold: parsed("NSFW_THRESHOLD", 0.7)?,
            upscale_width: parsed("UPSCALE_TARGET_WIDTH", 3840)?,
            upscale_height: parsed("UPSCALE_TARGET_HEIGHT", 2160)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Env helpers
// ---------------------------------------------------------------------------

fn required(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn optional(name: &'static str, default: &str) -> String {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => default.to_string(),
    }
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => {
            v.trim()
                .parse::<T>()
                .map_err(|_| ConfigError::Invalid { name, value: v })
        }
        _ => Ok(default),
    }
}
