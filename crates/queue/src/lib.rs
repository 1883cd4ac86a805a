//! Durable job queue access.
//!
//! The queue is SQS-compatible (Yandex Message Queue behind a custom
//! endpoint). Delivery is at-least-once: a received message stays
//! invisible until either deleted or its visibility timeout lapses, at
//! which point it is redelivered with a bumped receive count. Deleting
//! a message is the one and only acknowledgement.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_sqs::types::MessageSystemAttributeName;

use atelier_core::config::QueueConfig;

/// One received message, still invisible to other consumers.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub message_id: String,
    /// Opaque token identifying this delivery; required for deletion.
    pub receipt_handle: String,
    pub body: String,
    /// How many times this message has been delivered, this delivery
    /// included. Starts at 1.
    pub receive_count: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue request failed: {0}")]
    Request(String),

    #[error("Received message is missing its body or receipt handle")]
    MalformedMessage,
}

/// Capability over the durable job queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a message body, returning the assigned message id.
    async fn send(&self, body: &str, delay_secs: u32) -> Result<String, QueueError>;

    /// Long-poll for up to `max` messages.
    async fn receive(&self, max: u32, wait_secs: u32) -> Result<Vec<QueueMessage>, QueueError>;

    /// Acknowledge one delivery. The message will not be redelivered.
    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError>;

    /// Push this delivery's visibility window out, delaying redelivery.
    async fn postpone(&self, receipt_handle: &str, delay_secs: u32) -> Result<(), QueueError>;
}

/// SQS-compatible queue client.
pub struct SqsQueue {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl SqsQueue {
    pub async fn connect(config: &QueueConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "static",
        );
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .endpoint_url(&config.endpoint)
            .load()
            .await;

        Self {
            client: aws_sdk_sqs::Client::new(&sdk_config),
            queue_url: config.queue_url.clone(),
        }
    }
}

#[async_trait]
impl JobQueue for SqsQueue {
    async fn send(&self, body: &str, delay_secs: u32) -> Result<String, QueueError> {
        let output = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .delay_seconds(delay_secs as i32)
            .send()
            .await
            .map_err(|e| QueueError::Request(e.to_string()))?;

        let message_id = output.message_id().unwrap_or_default().to_string();
        tracing::debug!(message_id = %message_id, "message enqueued");
        Ok(message_id)
    }

    async fn receive(&self, max: u32, wait_secs: u32) -> Result<Vec<QueueMessage>, QueueError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max as i32)
            .wait_time_seconds(wait_secs as i32)
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .send()
            .await
            .map_err(|e| QueueError::Request(e.to_string()))?;

        let mut messages = Vec::new();
        for message in output.messages() {
            let (body, receipt_handle) = match (message.body(), message.receipt_handle()) {
                (Some(b), Some(r)) => (b.to_string(), r.to_string()),
                _ => return Err(QueueError::MalformedMessage),
            };
            let receive_count = message
                .attributes()
                .and_then(|a| a.get(&MessageSystemAttributeName::ApproximateReceiveCount))
                .map(|raw| parse_receive_count(raw))
                .unwrap_or(1);

            messages.push(QueueMessage {
                message_id: message.message_id().unwrap_or_default().to_string(),
                receipt_handle,
                body,
                receive_count,
            });
        }
        Ok(messages)
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::Request(e.to_string()))?;
        Ok(())
    }

    async fn postpone(&self, receipt_handle: &str, delay_secs: u32) -> Result<(), QueueError> {
        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .visibility_timeout(delay_secs as i32)
            .send()
            .await
            .map_err(|e| QueueError::Request(e.to_string()))?;
        Ok(())
    }
}

/// Parse the receive-count attribute, falling back to first delivery
/// when the value is unreadable.
fn parse_receive_count(raw: &str) -> u32 {
    raw.parse().unwrap_or(1)
}
