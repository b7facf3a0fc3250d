//! Shared data models for the obsclip pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Video records and their stage flags
//! - Clip values derived from operator markers
//! - Storage locators (`storage://bucket/path`)
//! - The marker side-channel text format
//! - Two-level batch outcomes for best-effort stages

pub mod clip;
pub mod locator;
pub mod marker;
pub mod outcome;
pub mod stage;
pub mod video;

// Re-export common types
pub use clip::{clip_file_name, combined_file_name, Clip, ClipWindow};
pub use locator::{LocatorError, StorageLocator};
pub use marker::{format_marker_line, parse_marker_lines};
pub use outcome::{BatchOutcome, ItemOutcome, OverallOutcome};
pub use stage::{Eligibility, Stage, StageFlag, StageResult, TransitionError};
pub use video::{SourceMetadata, VideoId, VideoRecord, UPLOADED_BY};
