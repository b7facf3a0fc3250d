//! Object storage client.
//!
//! This crate provides:
//! - Streaming file upload/download over the S3 API
//! - The `videos/`, `clips/` and `finals/` key layout
//! - Content types for recorded video files

pub mod client;
pub mod error;
pub mod keys;

pub use client::{StorageClient, StorageConfig, DEFAULT_ENDPOINT_URL};
pub use error::{StorageError, StorageResult};
pub use keys::{clip_key, content_type_for, final_key, source_key};
