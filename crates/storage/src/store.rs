//! S3-compatible object store client.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};

use atelier_core::config::StoreConfig;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Upload of {key} failed: {message}")]
    Upload { key: String, message: String },

    #[error("Storage request failed: {0}")]
    Request(String),

    #[error("Image processing failed: {0}")]
    Image(String),

    #[error("Album packaging failed: {0}")]
    Archive(String),
}

/// Capability over the session asset bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload bytes under `key`, returning the public URL. Uploading
    /// to an existing key overwrites it.
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// Delete every object under `prefix`, returning how many went.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StorageError>;

    /// A time-limited download URL for one object.
    async fn presign(&self, key: &str, ttl: Duration) -> Result<String, StorageError>;
}

/// Yandex Object Storage client (S3 API behind a custom endpoint).
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
    endpoint: String,
}

impl S3Store {
    pub async fn connect(config: &StoreConfig) -> Self {
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
            client: aws_sdk_s3::Client::new(&sdk_config),
            bucket: config.bucket.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        }
    }

    /// Bucket-in-path public URL, the form Yandex serves anonymously
    /// readable objects under.
    fn public_url(&self, key: &str) -> String {
        public_object_url(&self.endpoint, &self.bucket, key)
    }
}

/// `{endpoint}/{bucket}/{key}` with every key path segment
/// percent-encoded, so session ids with spaces or non-ASCII still form
/// valid URLs.
fn public_object_url(endpoint: &str, bucket: &str, key: &str) -> String {
    let path = key
        .split('/')
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/");
    format!("{endpoint}/{bucket}/{path}")
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::Upload {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        tracing::debug!(key = %key, size_bytes = size, "object uploaded");
        Ok(self.public_url(key))
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        let mut deleted = 0usize;
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| StorageError::Request(e.to_string()))?;
            let mut identifiers = Vec::new();
            for object in page.contents() {
                if let Some(key) = object.key() {
                    identifiers.push(
                        ObjectIdentifier::builder()
                            .key(key)
                            .build()
                            .map_err(|e| StorageError::Request(e.to_string()))?,
                    );
                }
            }
            if identifiers.is_empty() {
                continue;
            }
            deleted += identifiers.len();

            let delete = Delete::builder()
                .set_objects(Some(identifiers))
                .build()
                .map_err(|e| StorageError::Request(e.to_string()))?;
            self.client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| StorageError::Request(e.to_string()))?;
        }
        Ok(deleted)
    }

    async fn presign(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|e| StorageError::Request(e.to_string()))?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;
        Ok(presigned.uri().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_keys_pass_through_unchanged() {
        assert_eq!(
            public_object_url(
                "https://storage.yandexcloud.net",
                "atelier",
                "sessions/sess-001/images/image_0.jpg",
            ),
            "https://storage.yandexcloud.net/atelier/sessions/sess-001/images/image_0.jpg"
        );
    }

    #[test]
    fn awkward_key_segments_are_percent_encoded() {
        assert_eq!(
            public_object_url("https://e", "b", "sessions/sess 01/album.zip"),
            "https://e/b/sessions/sess%2001/album.zip"
        );

        let url = public_object_url("https://e", "b", "sessions/съёмка/album.zip");
        assert!(url.starts_with("https://e/b/sessions/%D1%81"));
        assert!(url.ends_with("/album.zip"));
    }
}
