//! Clip values derived from markers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One marker successfully turned into an uploaded clip.
///
/// Immutable once appended to its parent record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    /// Source marker offset in seconds
    pub marker_time: f64,
    /// 1-based position of the marker in the record's marker list
    pub clip_index: u32,
    /// Locator of the uploaded clip
    pub gcs_path: String,
    /// Derived file name
    pub file_name: String,
    /// Nominal duration (before + after window), not measured
    pub duration: f64,
}

/// Time range cut around a marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipWindow {
    /// Start offset in seconds, never negative
    pub start: f64,
    /// Requested duration in seconds
    pub duration: f64,
}

impl ClipWindow {
    /// Window of `before` seconds ahead of the marker and `after` seconds past it.
    ///
    /// The start is clamped at zero; the duration stays `before + after` even
    /// when clamped, so early markers yield a window that ends later than
    /// `marker + after`.
    pub fn around(marker: f64, before: f64, after: f64) -> Self {
        Self {
            start: (marker - before).max(0.0),
            duration: before + after,
        }
    }
}

fn stem(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    }
}

/// `<stem>_clip_<index>_<marker:.1>s.mp4`
pub fn clip_file_name(source_file_name: &str, clip_index: u32, marker_time: f64) -> String {
    format!(
        "{}_clip_{}_{:.1}s.mp4",
        stem(source_file_name),
        clip_index,
        marker_time
    )
}

/// `<stem>_highlights.mp4`
pub fn combined_file_name(source_file_name: &str) -> String {
    format!("{}_highlights.mp4", stem(source_file_name))
}
