//! Chat delivery over the Telegram Bot API.
//!
//! Three surfaces: plain HTML messages, media groups (albums of photo
//! URLs, chunked to the API limit), and document uploads by URL. All
//! calls are fire-once; retry policy belongs to the caller.

use async_trait::async_trait;
use serde_json::json;

/// Telegram caps one media group at this many items.
pub const MEDIA_GROUP_LIMIT: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Notification rejected with HTTP {0}")]
    HttpStatus(u16),
}

/// Capability to reach the user in chat.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send an HTML-formatted text message.
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), NotifyError>;

    /// Send photo URLs as media groups. `caption` is attached to the
    /// first photo of the first group.
    async fn send_media_group(
        &self,
        chat_id: i64,
        photo_urls: &[String],
        caption: &str,
    ) -> Result<(), NotifyError>;

    /// Send a document by URL.
    async fn send_document(&self, chat_id: i64, document_url: &str) -> Result<(), NotifyError>;
}

/// Bot API client.
pub struct TelegramNotifier {
    client: reqwest::Client,
    base_url: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("https://api.telegram.org/bot{bot_token}"),
        }
    }

    async fn call(&self, method: &str, payload: &serde_json::Value) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::HttpStatus(status.as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), NotifyError> {
        self.call(
            "sendMessage",
            &json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML",
            }),
        )
        .await
    }

    async fn send_media_group(
        &self,
        chat_id: i64,
        photo_urls: &[String],
        caption: &str,
    ) -> Result<(), NotifyError> {
        for (chunk_index, chunk) in photo_urls.chunks(MEDIA_GROUP_LIMIT).enumerate() {
            let caption = if chunk_index == 0 { Some(caption) } else { None };
            let media = media_group_payload(chunk, caption);
            self.call(
                "sendMediaGroup",
                &json!({ "chat_id": chat_id, "media": media }),
            )
            .await?;
            tracing::debug!(chat_id, chunk = chunk_index, photos = chunk.len(), "media group sent");
        }
        Ok(())
    }

    async fn send_document(&self, chat_id: i64, document_url: &str) -> Result<(), NotifyError> {
        self.call(
            "sendDocument",
            &json!({
                "chat_id": chat_id,
                "document": document_url,
            }),
        )
        .await
    }
}

/// Build one media-group payload; the caption, when present, rides on
/// the first item.
fn media_group_payload(photo_urls: &[String], caption: Option<&str>) -> Vec<serde_json::Value> {
    photo_urls
        .iter()
        .enumerate()
        .map(|(i, url)| {
            let mut item = json!({ "type": "photo", "media": url });
            if i == 0 {
                if let Some(text) = caption {
                    item["caption"] = json!(text);
                    item["parse_mode"] = json!("HTML");
                }
            }
            item
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://cdn/p{i}.jpg")).collect()
    }

    #[test]
    fn caption_rides_on_first_item_only() {
        let media = media_group_payload(&urls(3), Some("your photos"));
        assert_eq!(media[0]["caption"], "your photos");
        assert!(media[1].get("caption").is_none());
        assert!(media[2].get("caption").is_none());
    }

    #[test]
    fn no_caption_leaves_items_bare() {
        let media = media_group_payload(&urls(2), None);
        assert!(media[0].get("caption").is_none());
    }

    #[test]
    fn chunking_respects_the_group_limit() {
        let all = urls(25);
        let chunks: Vec<_> = all.chunks(MEDIA_GROUP_LIMIT).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 10);
        assert_eq!(chunks[2].len(), 5);
    }
}
