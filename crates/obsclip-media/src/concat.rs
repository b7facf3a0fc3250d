//! Concatenation of clips with the concat demuxer.

use std::path::{Path, PathBuf};
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::remove_quietly;

/// Render the concat demuxer list for `inputs`, one `file '<path>'` per line.
///
/// Entries are absolute: the demuxer resolves relative ones against the list
/// file's directory, not the working directory.
pub fn concat_list(inputs: &[PathBuf]) -> MediaResult<String> {
    let mut body = String::new();
    for path in inputs {
        let path = std::path::absolute(path)?;
        body.push_str("file '");
        // Single quotes close, escape, reopen
        body.push_str(&path.to_string_lossy().replace('\'', r"'\''"));
        body.push_str("'\n");
    }
    Ok(body)
}

/// Join `inputs` in order into `output` with stream copy.
///
/// The list file is written next to `output` and removed afterwards.
pub async fn concat_clips(
    runner: &FfmpegRunner,
    inputs: &[PathBuf],
    output: impl AsRef<Path>,
) -> MediaResult<()> {
    let output = output.as_ref();
    if inputs.is_empty() {
        return Err(MediaError::EmptyInput("no clips to concatenate".to_string()));
    }

    let list_path = output.with_extension("concat.txt");
    tokio::fs::write(&list_path, concat_list(inputs)?).await?;

    info!(
        "Concatenating {} clips into {}",
        inputs.len(),
        output.display()
    );

    let result = runner.run(&FfmpegCommand::concat(&list_path, output)).await;

    remove_quietly(&list_path).await;

    result.map(|_| ())
}
