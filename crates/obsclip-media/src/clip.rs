//! Stream-copy clip extraction.

use std::path::Path;
use tracing::info;

use obsclip_models::ClipWindow;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Cut `window` out of `input` into `output` without re-encoding.
///
/// The seek happens on the input side, so the cut snaps to the keyframe at
/// or before `window.start`; timestamps are shifted to start at zero.
pub async fn extract_clip(
    runner: &FfmpegRunner,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    window: ClipWindow,
) -> MediaResult<()> {
    let input = input.as_ref();
    let output = output.as_ref();

    if !input.exists() {
        return Err(MediaError::FileNotFound(input.to_path_buf()));
    }

    info!(
        "Extracting clip: {} -> {} (start: {:.2}s, duration: {:.2}s)",
        input.display(),
        output.display(),
        window.start,
        window.duration
    );

    let cmd = FfmpegCommand::trim(input, output, window.start, window.duration);
    let progress = runner.run(&cmd).await?;

    info!(
        "Clip extracted: {} ({:.2}s written)",
        output.display(),
        progress.out_time.as_secs_f64()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_input_is_rejected_before_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FfmpegRunner::new().with_binary("/nonexistent/ffmpeg-binary");

        let err = extract_clip(
            &runner,
            dir.path().join("missing.mkv"),
            dir.path().join("out.mp4"),
            ClipWindow::around(100.0, 15.0, 15.0),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
