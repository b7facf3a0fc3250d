//! ffmpeg invocations and the process runner.
//!
//! Commands are assembled as a flat argument vector in the order ffmpeg
//! expects: global flags, input options, `-i`, output options, output path.
//! Every command copies streams; nothing here re-encodes.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::FfmpegProgress;

/// stderr lines kept for failure reports.
const STDERR_TAIL: usize = 20;

/// A complete ffmpeg argument list.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    args: Vec<OsString>,
    output: PathBuf,
}

fn seconds(value: f64) -> OsString {
    format!("{:.3}", value).into()
}

impl FfmpegCommand {
    /// Global flags, then `input_options`, then `-i input`.
    fn leading(input_options: impl IntoIterator<Item = OsString>, input: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-y", "-v", "error", "-nostats", "-progress", "pipe:2"]
            .map(OsString::from)
            .into();
        args.extend(input_options);
        args.push("-i".into());
        args.push(input.as_os_str().to_owned());
        args
    }

    /// Copy `duration` seconds starting at `start`.
    ///
    /// `-ss` goes before `-i` so ffmpeg seeks the demuxer, which lands on
    /// the keyframe at or before `start`.
    pub fn trim(input: &Path, output: &Path, start: f64, duration: f64) -> Self {
        let mut args = Self::leading([OsString::from("-ss"), seconds(start)], input);
        args.extend([OsString::from("-t"), seconds(duration)]);
        args.extend(["-c", "copy", "-avoid_negative_ts", "make_zero"].map(OsString::from));
        args.push(output.as_os_str().to_owned());
        Self {
            args,
            output: output.to_path_buf(),
        }
    }

    /// Join the files named in a concat demuxer list.
    pub fn concat(list: &Path, output: &Path) -> Self {
        let mut args = Self::leading(["-f", "concat", "-safe", "0"].map(OsString::from), list);
        args.extend(["-c", "copy"].map(OsString::from));
        args.push(output.as_os_str().to_owned());
        Self {
            args,
            output: output.to_path_buf(),
        }
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }
}

/// Spawns ffmpeg and waits for it, with an optional deadline.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    binary: PathBuf,
    timeout: Option<Duration>,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Progress plus the trailing non-progress stderr lines of one run.
#[derive(Debug, Default)]
struct Stderr {
    progress: FfmpegProgress,
    tail: VecDeque<String>,
}

async fn drain_stderr(stream: impl AsyncRead + Unpin) -> Stderr {
    let mut lines = BufReader::new(stream).lines();
    let mut out = Stderr::default();
    while let Ok(Some(line)) = lines.next_line().await {
        if out.progress.apply_line(&line) || line.trim().is_empty() {
            continue;
        }
        if out.tail.len() == STDERR_TAIL {
            out.tail.pop_front();
        }
        out.tail.push_back(line);
    }
    out
}

impl FfmpegRunner {
    /// `ffmpeg` from PATH, no deadline.
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
            timeout: None,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run `cmd` to completion and return its final progress.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<FfmpegProgress> {
        debug!(
            output = %cmd.output_path().display(),
            "{} {}",
            self.binary.display(),
            cmd.args().iter().map(|a| a.to_string_lossy()).collect::<Vec<_>>().join(" ")
        );

        let mut child = Command::new(&self.binary)
            .args(cmd.args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MediaError::FfmpegNotFound
                } else {
                    MediaError::Io(e)
                }
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("stderr was not captured", None, None))?;
        let reader = tokio::spawn(drain_stderr(stderr));

        let status = match self.wait(&mut child).await {
            Ok(status) => status,
            Err(e) => {
                reader.abort();
                return Err(e);
            }
        };
        let Stderr { progress, tail } = reader.await.unwrap_or_default();

        if status.success() {
            return Ok(progress);
        }
        let last = tail.back().cloned().unwrap_or_else(|| "no diagnostic output".to_string());
        let report = (!tail.is_empty()).then(|| Vec::from(tail).join("\n"));
        Err(MediaError::ffmpeg_failed(last, report, status.code()))
    }

    async fn wait(&self, child: &mut Child) -> MediaResult<ExitStatus> {
        let Some(limit) = self.timeout else {
            return Ok(child.wait().await?);
        };
        match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => Ok(status?),
            Err(_) => {
                warn!("ffmpeg still running after {:?}, killing it", limit);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill ffmpeg: {}", e);
                }
                Err(MediaError::Timeout(limit))
            }
        }
    }
}

/// Resolve `ffmpeg` on PATH.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}
