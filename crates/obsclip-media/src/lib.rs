//! ffmpeg CLI wrapper for cutting and joining recordings.
//!
//! - Trim and concat invocations, both stream copy
//! - A runner with an optional deadline that keeps ffmpeg's stderr tail
//! - Parsing of the `-progress pipe:2` stream

pub mod clip;
pub mod command;
pub mod concat;
pub mod error;
pub mod fs_utils;
pub mod progress;

pub use clip::extract_clip;
pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use concat::{concat_clips, concat_list};
pub use error::{MediaError, MediaResult};
pub use fs_utils::{ensure_dir, remove_dir_quietly, remove_quietly};
pub use progress::FfmpegProgress;
