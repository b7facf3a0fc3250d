//! Parser for ffmpeg's `-progress` key/value stream.

use std::time::Duration;

/// Latest values seen in a `-progress` stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FfmpegProgress {
    pub frames: u64,
    /// Timestamp reached in the output.
    pub out_time: Duration,
    /// Multiple of realtime, when ffmpeg knows it.
    pub speed: Option<f64>,
    /// `progress=end` was seen.
    pub finished: bool,
}

impl FfmpegProgress {
    /// Share of `total` written so far, clamped to `0.0..=1.0`.
    pub fn fraction_of(&self, total: Duration) -> f64 {
        if total.is_zero() {
            return 0.0;
        }
        (self.out_time.as_secs_f64() / total.as_secs_f64()).clamp(0.0, 1.0)
    }

    /// Fold one stderr line in. Returns `false` when the line is ordinary
    /// log output rather than a progress key.
    pub fn apply_line(&mut self, line: &str) -> bool {
        let Some((key, value)) = line.trim().split_once('=') else {
            return false;
        };
        if key.is_empty() || !key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
            return false;
        }

        match key {
            // out_time_ms is microseconds too
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<u64>() {
                    self.out_time = Duration::from_micros(us);
                }
            }
            "frame" => self.frames = value.parse().unwrap_or(self.frames),
            "speed" => {
                self.speed = value
                    .trim()
                    .strip_suffix('x')
                    .and_then(|s| s.trim().parse().ok())
            }
            "progress" => self.finished = value == "end",
            _ => {}
        }
        true
    }
}
