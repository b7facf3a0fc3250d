//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use obsclip_models::{Stage, VideoId};

use crate::stability::StabilityPolicy;

/// Worker configuration shared by the ingest watcher and the stage binaries.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Folder OBS writes recordings into
    pub obs_folder: PathBuf,
    /// Pending-marker side channel
    pub marker_file: PathBuf,
    /// Accepted extensions, lowercase with leading dot
    pub watch_extensions: Vec<String>,
    /// Files smaller than this are ignored
    pub min_file_size_bytes: u64,
    /// Debounce rule for fresh recordings
    pub stability: StabilityPolicy,
    /// Seconds of video kept ahead of each marker
    pub clip_before_secs: f64,
    /// Seconds of video kept after each marker
    pub clip_after_secs: f64,
    /// Scratch directory for downloads and ffmpeg output
    pub work_dir: PathBuf,
    /// Kill ffmpeg after this long (unset = no limit)
    pub ffmpeg_timeout: Option<Duration>,
    /// Records inspected per auto-selection query
    pub selection_window: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            obs_folder: PathBuf::from("."),
            marker_file: PathBuf::from("markers.txt"),
            watch_extensions: vec![".mp4".to_string(), ".mkv".to_string()],
            min_file_size_bytes: 10 * 1024 * 1024,
            stability: StabilityPolicy::default(),
            clip_before_secs: 15.0,
            clip_after_secs: 15.0,
            work_dir: PathBuf::from("/tmp/obsclip"),
            ffmpeg_timeout: None,
            selection_window: 10,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            obs_folder: std::env::var("OBS_FOLDER")
                .map(PathBuf::from)
                .unwrap_or(defaults.obs_folder),
            marker_file: std::env::var("MARKER_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.marker_file),
            watch_extensions: std::env::var("WATCH_EXTENSIONS")
                .ok()
                .map(|s| parse_extensions(&s))
                .filter(|exts| !exts.is_empty())
                .unwrap_or(defaults.watch_extensions),
            min_file_size_bytes: std::env::var("MIN_FILE_SIZE_MB")
                .ok()
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|mb| *mb >= 0.0)
                .map(|mb| (mb * 1024.0 * 1024.0) as u64)
                .unwrap_or(defaults.min_file_size_bytes),
            stability: StabilityPolicy {
                debounce_window: Duration::from_millis(
                    std::env::var("STABILITY_WAIT_MS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(5000),
                ),
                poll_interval: Duration::from_millis(
                    std::env::var("STABILITY_POLL_MS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .filter(|ms| *ms > 0)
                        .unwrap_or(1000),
                ),
                required_consecutive: std::env::var("STABILITY_REQUIRED_SAMPLES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3),
            },
            clip_before_secs: std::env::var("CLIP_BEFORE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.clip_before_secs),
            clip_after_secs: std::env::var("CLIP_AFTER_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.clip_after_secs),
            // Absolute, since ffmpeg resolves concat list entries against the list's directory
            work_dir: std::env::var("WORK_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(|v| std::path::absolute(&v).unwrap_or_else(|_| PathBuf::from(v)))
                .unwrap_or(defaults.work_dir),
            ffmpeg_timeout: std::env::var("FFMPEG_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            selection_window: std::env::var("SELECTION_WINDOW")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.selection_window),
        }
    }

    /// Nominal clip length.
    pub fn clip_duration_secs(&self) -> f64 {
        self.clip_before_secs + self.clip_after_secs
    }

    /// Per-run scratch directory; distinct per video and stage.
    pub fn scratch_dir(&self, video_id: &VideoId, stage: Stage) -> PathBuf {
        self.work_dir.join(format!("{}_{}", video_id, stage.as_str()))
    }
}

/// Parse `".mp4, mkv"` into `[".mp4", ".mkv"]`.
fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 9] = [
        "WATCH_EXTENSIONS",
        "MIN_FILE_SIZE_MB",
        "STABILITY_WAIT_MS",
        "STABILITY_POLL_MS",
        "STABILITY_REQUIRED_SAMPLES",
        "CLIP_BEFORE_SECS",
        "CLIP_AFTER_SECS",
        "FFMPEG_TIMEOUT_SECS",
        "WORK_DIR",
    ];

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        for var in VARS {
            std::env::remove_var(var);
        }

        let config = WorkerConfig::from_env();
        assert_eq!(config.watch_extensions, vec![".mp4", ".mkv"]);
        assert_eq!(config.min_file_size_bytes, 10 * 1024 * 1024);
        assert_eq!(config.stability, StabilityPolicy::default());
        assert_eq!(config.clip_duration_secs(), 30.0);
        assert!(config.ffmpeg_timeout.is_none());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        std::env::set_var("WATCH_EXTENSIONS", "MOV, .flv");
        std::env::set_var("MIN_FILE_SIZE_MB", "0.5");
        std::env::set_var("STABILITY_POLL_MS", "250");
        std::env::set_var("CLIP_BEFORE_SECS", "5");
        std::env::set_var("FFMPEG_TIMEOUT_SECS", "120");
        std::env::set_var("WORK_DIR", "work");

        let config = WorkerConfig::from_env();
        assert!(config.work_dir.is_absolute());
        assert!(config.work_dir.ends_with("work"));
        assert_eq!(config.watch_extensions, vec![".mov", ".flv"]);
        assert_eq!(config.min_file_size_bytes, 512 * 1024);
        assert_eq!(config.stability.poll_interval, Duration::from_millis(250));
        assert_eq!(config.clip_duration_secs(), 20.0);
        assert_eq!(config.ffmpeg_timeout, Some(Duration::from_secs(120)));

        for var in VARS {
            std::env::remove_var(var);
        }
    }
}
