//! Object storage, asset download, image optimization and album
//! packaging.
//!
//! [`store`] talks to the S3-compatible bucket (Yandex Object Storage
//! behind a custom endpoint) and owns the public-URL and presigning
//! surface. [`keys`] is the single source of truth for object naming,
//! so a re-run of the same session overwrites its own objects instead
//! of accumulating duplicates. [`fetch`] pulls provider assets over
//! HTTP, [`optimize`] normalizes them for delivery, and [`archive`]
//! packages a finished session into one ZIP album.

pub mod archive;
pub mod fetch;
pub mod keys;
pub mod optimize;
pub mod store;

pub use archive::build_album;
pub use fetch::{AssetFetcher, HttpFetcher};
pub use keys::{album_key, image_key, session_prefix};
pub use optimize::optimize_for_delivery;
pub use store::{ObjectStore, S3Store, StorageError};
