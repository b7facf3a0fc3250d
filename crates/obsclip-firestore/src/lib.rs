//! Firestore persistence for recording records.
//!
//! - `VideoRepository` over the `videos` collection
//! - Stage writes guarded by `updateTime` preconditions
//! - Service account tokens via gcp_auth, or the emulator's fixed token
//! - Bounded retry for transient failures

pub mod auth;
pub mod client;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod video_repo;
pub mod wire;


pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use retry::RetryPolicy;
pub use video_repo::{
    pick_candidate, TransitionOutcome, VideoRepository, DEFAULT_SELECTION_WINDOW,
    VIDEOS_COLLECTION,
};
pub use wire::{Document, Value};
