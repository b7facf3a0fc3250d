//! Pending-marker side channel.
//!
//! Markers are read first and removed from the file only once the record that
//! carries them exists, so a failed ingest leaves them for the next attempt.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use obsclip_models::parse_marker_lines;

/// Markers read from the side channel but not yet removed from it.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMarkers {
    path: PathBuf,
    values: Vec<f64>,
    /// Bytes of the file the values were parsed from
    consumed: usize,
}

impl PendingMarkers {
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Remove the lines these markers came from.
    ///
    /// Lines appended after the read are kept.
    pub async fn consume(&self) -> std::io::Result<()> {
        if self.consumed == 0 {
            return Ok(());
        }
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        let rest = content.get(self.consumed..).unwrap_or_default();
        tokio::fs::write(&self.path, rest).await?;

        if !self.values.is_empty() {
            info!(count = self.values.len(), "Drained markers: {:?}", self.values);
        }
        Ok(())
    }
}

/// Read every pending marker without modifying the file.
///
/// A missing file means no markers.
pub async fn read_markers(marker_file: &Path) -> std::io::Result<PendingMarkers> {
    let content = match tokio::fs::read_to_string(marker_file).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No marker file at {}", marker_file.display());
            String::new()
        }
        Err(e) => return Err(e),
    };

    Ok(PendingMarkers {
        path: marker_file.to_path_buf(),
        values: parse_marker_lines(&content),
        consumed: content.len(),
    })
}
