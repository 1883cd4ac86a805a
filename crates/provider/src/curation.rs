//! Remote curation endpoints used by premium post-processing.
//!
//! Two calls: a safety classifier that scores an image, and an
//! inpainting model that repairs detected artifacts. Both accept the
//! image inline as a base64 data URL, so no staging upload is needed.

use std::time::Duration;

use base64::Engine as _;
use serde::Deserialize;

use atelier_core::config::ProviderConfig;

use crate::error::ProviderError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

const NSFW_MODEL: &str = "hume-nsfw";
const INPAINT_MODEL: &str = "stable-diffusion-inpaint";
const INPAINT_PROMPT: &str = "perfect skin, no artifacts, clean portrait";

/// Capability over the remote curation endpoints.
#[async_trait::async_trait]
pub trait ImageCuration: Send + Sync {
    /// Safety score in `[0, 1]`; higher means more likely unsafe.
    async fn unsafe_score(&self, image_jpeg: &[u8]) -> Result<f32, ProviderError>;

    /// Repair artifacts, returning the repaired image URL when the
    /// backend produced one.
    async fn inpaint(&self, image_jpeg: &[u8]) -> Result<Option<String>, ProviderError>;
}

/// PiAPI implementation of the curation endpoints.
pub struct PiApiCuration {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl PiApiCuration {
    pub fn new(config: &ProviderConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    score: f32,
}

#[derive(Debug, Deserialize)]
struct InpaintResponse {
    #[serde(default)]
    url: Option<String>,
}

#[async_trait::async_trait]
impl ImageCuration for PiApiCuration {
    async fn unsafe_score(&self, image_jpeg: &[u8]) -> Result<f32, ProviderError> {
        let payload = serde_json::json!({
            "model": NSFW_MODEL,
            "input": { "image": data_url(image_jpeg, "image/jpeg") },
        });

        let response = self
            .client
            .post(format!("{}/api/v1/nsfw-check", self.base_url))
            .header("X-API-Key", &self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(status, "safety check"));
        }

        let body: ScoreResponse = response.json().await?;
        Ok(body.score)
    }

    async fn inpaint(&self, image_jpeg: &[u8]) -> Result<Option<String>, ProviderError> {
        let payload = serde_json::json!({
            "model": INPAINT_MODEL,
            "input": {
                "image": data_url(image_jpeg, "image/jpeg"),
                "prompt": INPAINT_PROMPT,
            },
        });

        let response = self
            .client
            .post(format!("{}/api/v1/inpaint", self.base_url))
            .header("X-API-Key", &self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(status, "inpaint"));
        }

        let body: InpaintResponse = response.json().await?;
        Ok(body.url)
    }
}

/// Encode bytes as an inline `data:` URL.
fn data_url(bytes: &[u8], mime: &str) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_encodes_payload() {
        let url = data_url(b"abc", "image/jpeg");
        assert_eq!(url, "data:image/jpeg;base64,YWJj");
    }

    #[test]
    fn score_response_parses() {
        let body: ScoreResponse = serde_json::from_str(r#"{"score": 0.42}"#).unwrap();
        assert!((body.score - 0.42).abs() < f32::EPSILON);
    }

    #[test]
    fn inpaint_response_url_is_optional() {
        let none: InpaintResponse = serde_json::from_str("{}").unwrap();
        assert!(none.url.is_none());

        let some: InpaintResponse =
            serde_json::from_str(r#"{"url": "https://cdn/fixed.jpg"}"#).unwrap();
        assert_eq!(some.url.as_deref(), Some("https://cdn/fixed.jpg"));
    }
}
