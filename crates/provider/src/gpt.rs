//! Stream-style image backend (GPT-4o-image via SSE chat completions).
//!
//! Issues a single streaming POST and scans the server-sent-event
//! `data:` lines for the first structured chunk carrying an image URL.
//! Once the URL is found the stream is dropped without waiting for
//! completion -- the early exit is intentional.

use std::time::Duration;

use futures::StreamExt;

use atelier_core::config::ProviderConfig;

use crate::adapter::{GenerationBackend, GenerationRequest, GenerationResult};
use crate::error::ProviderError;

/// HTTP timeout covering the whole streaming call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const MODEL: &str = "gpt-4o-image";

/// Reference photos accepted per request by this backend.
const MAX_REFERENCES: usize = 3;

/// Stream-until-asset image backend.
pub struct GptBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GptBackend {
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

#[async_trait::async_trait]
impl GenerationBackend for GptBackend {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, ProviderError> {
        let payload = build_chat_payload(request);
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(status, "chat completions"));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ProviderError::Transient(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buffer.find('\n') {
                let line: String = buffer.drain(..=pos).collect();
                match parse_sse_line(line.trim()) {
                    SseLine::Data(payload) => {
                        if let Some(url) = extract_image_url(&payload) {
                            // Early exit: dropping the stream cancels
                            // the rest of the response body.
                            tracing::info!("GPT image payload found in stream");
                            return Ok(GenerationResult {
                                asset_url: url,
                                backend_task_id: None,
                            });
                        }
                    }
                    SseLine::Done => {
                        return Err(ProviderError::Permanent(
                            "stream finished without an image payload".to_string(),
                        ));
                    }
                    SseLine::Other => {}
                }
            }
        }

        Err(ProviderError::Permanent(
            "stream closed without an image payload".to_string(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Pure helpers
// ---------------------------------------------------------------------------

/// Build the streaming chat payload: reference images first, then the
/// prompt text.
fn build_chat_payload(request: &GenerationRequest) -> serde_json::Value {
    let mut content = Vec::new();
    for url in request.reference_photos.iter().take(MAX_REFERENCES) {
        content.push(serde_json::json!({
            "type": "image_url",
            "image_url": { "url": url },
        }));
    }
    content.push(serde_json::json!({
        "type": "text",
        "text": request.prompt,
    }));

    serde_json::json!({
        "model": MODEL,
        "messages": [{ "role": "user", "content": content }],
        "stream": true,
    })
}

/// One classified SSE line.
#[derive(Debug, PartialEq)]
enum SseLine {
    /// `data: {...}` payload.
    Data(String),
    /// `data: [DONE]` sentinel.
    Done,
    /// Comments, blank keep-alives, unknown fields.
    Other,
}

fn parse_sse_line(line: &str) -> SseLine {
    match line.strip_prefix("data: ") {
        Some(rest) if rest.trim() == "[DONE]" => SseLine::Done,
        Some(rest) => SseLine::Data(rest.to_string()),
        None => SseLine::Other,
    }
}

/// Pull the image URL out of one streamed chunk, if present.
///
/// Chunks look like
/// `{"choices":[{"delta":{"content":[{"type":"image_url","image_url":{"url":...}}]}}]}`;
/// text deltas carry a plain string instead of a list and are skipped.
fn extract_image_url(chunk_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(chunk_json).ok()?;
    let content = value.get("choices")?.get(0)?.get("delta")?.get("content")?;
    for item in content.as_array()? {
        if item.get("type")?.as_str()? == "image_url" {
            return item
                .get("image_url")?
                .get("url")?
                .as_str()
                .map(String::from);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_refs(refs: usize) -> GenerationRequest {
        GenerationRequest {
            prompt: "ethereal forest portrait".into(),
            reference_photos: (0..refs).map(|i| format!("https://cdn/ref{i}.jpg")).collect(),
            lora_type: "realism".into(),
            lora_strength: 0.7,
            width: 1024,
            height: 1024,
        }
    }

    #[test]
    fn payload_puts_references_before_text() {
        let payload = build_chat_payload(&request_with_refs(2));
        let content = payload["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content.len(), 3);
        assert_eq!(content[0]["type"], "image_url");
        assert_eq!(content[2]["type"], "text");
        assert_eq!(payload["stream"], true);
        assert_eq!(payload["model"], "gpt-4o-image");
    }

    #[test]
    fn payload_caps_reference_count() {
        let payload = build_chat_payload(&request_with_refs(7));
        let content = payload["messages"][0]["content"].as_array().unwrap();
        // 3 references + 1 text part.
        assert_eq!(content.len(), 4);
    }

    #[test]
    fn sse_line_classification() {
        assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(
            parse_sse_line("data: {\"x\":1}"),
            SseLine::Data("{\"x\":1}".into())
        );
        assert_eq!(parse_sse_line(": keep-alive"), SseLine::Other);
        assert_eq!(parse_sse_line(""), SseLine::Other);
    }

    #[test]
    fn extracts_url_from_structured_chunk() {
        let chunk = r#"{"choices":[{"delta":{"content":[
            {"type":"text","text":"rendering"},
            {"type":"image_url","image_url":{"url":"https://cdn/out.png"}}
        ]}}]}"#;
        assert_eq!(
            extract_image_url(chunk),
            Some("https://cdn/out.png".to_string())
        );
    }

    #[test]
    fn text_only_chunks_are_skipped() {
        let chunk = r#"{"choices":[{"delta":{"content":"still thinking"}}]}"#;
        assert_eq!(extract_image_url(chunk), None);

        let empty = r#"{"choices":[{"delta":{}}]}"#;
        assert_eq!(extract_image_url(empty), None);
    }

    #[test]
    fn malformed_chunks_are_skipped() {
        assert_eq!(extract_image_url("not json"), None);
    }
}
