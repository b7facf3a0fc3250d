//! File stability detection.
//!
//! A recording is considered finished once its size stops changing for a
//! number of consecutive samples.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

/// Debounce rule for [`is_stable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityPolicy {
    /// Give up after this long
    pub debounce_window: Duration,
    /// Delay between samples
    pub poll_interval: Duration,
    /// Matching samples in a row needed to declare the file stable
    pub required_consecutive: u32,
}

impl Default for StabilityPolicy {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_millis(5000),
            poll_interval: Duration::from_millis(1000),
            required_consecutive: 3,
        }
    }
}

impl StabilityPolicy {
    /// Number of samples taken before giving up.
    pub fn max_polls(&self) -> u32 {
        let interval = self.poll_interval.as_millis().max(1);
        self.debounce_window.as_millis().div_ceil(interval) as u32
    }
}

/// Source of file size samples.
#[async_trait]
pub trait SizeProbe: Send + Sync {
    async fn size(&self, path: &Path) -> std::io::Result<u64>;
}

/// Samples sizes from the filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

#[async_trait]
impl SizeProbe for FsProbe {
    async fn size(&self, path: &Path) -> std::io::Result<u64> {
        Ok(tokio::fs::metadata(path).await?.len())
    }
}

/// Wait until `path` stops growing, using the filesystem.
pub async fn is_stable(path: &Path, policy: &StabilityPolicy) -> bool {
    is_stable_with(&FsProbe, path, policy).await
}

/// Wait until `path` stops growing, sampling through `probe`.
///
/// The previous sample starts at zero, so an empty file needs one extra
/// matching sample. A failed stat resets the run and polling continues.
pub async fn is_stable_with(probe: &dyn SizeProbe, path: &Path, policy: &StabilityPolicy) -> bool {
    let mut previous = 0u64;
    let mut consecutive = 0u32;

    for _ in 0..policy.max_polls() {
        match probe.size(path).await {
            Ok(size) => {
                if size == previous {
                    consecutive += 1;
                    if consecutive >= policy.required_consecutive {
                        return true;
                    }
                } else {
                    consecutive = 0;
                }
                previous = size;
            }
            Err(e) => {
                debug!("Stat failed for {}: {}", path.display(), e);
                consecutive = 0;
            }
        }
        tokio::time::sleep(policy.poll_interval).await;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a scripted size sequence, repeating the last entry.
    struct ScriptedProbe {
        sizes: Mutex<VecDeque<Option<u64>>>,
        last: Mutex<Option<u64>>,
    }

    impl ScriptedProbe {
        fn new(sizes: &[Option<u64>]) -> Self {
            Self {
                sizes: Mutex::new(sizes.iter().copied().collect()),
                last: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl SizeProbe for ScriptedProbe {
        async fn size(&self, _path: &Path) -> std::io::Result<u64> {
            let next = self.sizes.lock().unwrap().pop_front();
            let sample = match next {
                Some(sample) => {
                    *self.last.lock().unwrap() = sample;
                    sample
                }
                None => *self.last.lock().unwrap(),
            };
            sample.ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))
        }
    }

    async fn check(sizes: &[Option<u64>]) -> bool {
        is_stable_with(
            &ScriptedProbe::new(sizes),
            Path::new("rec.mkv"),
            &StabilityPolicy::default(),
        )
        .await
    }

    #[test]
    fn test_max_polls_rounds_up() {
        assert_eq!(StabilityPolicy::default().max_polls(), 5);
        let policy = StabilityPolicy {
            debounce_window: Duration::from_millis(5500),
            ..Default::default()
        };
        assert_eq!(policy.max_polls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_constant_size_is_stable() {
        assert!(check(&[Some(10)]).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_growth_then_constant_is_stable() {
        assert!(check(&[Some(10), Some(20), Some(20), Some(20)]).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oscillating_size_is_not_stable() {
        let sizes: Vec<_> = [10, 20].iter().cycle().take(10).map(|s| Some(*s)).collect();
        assert!(!check(&sizes).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stat_failure_resets_run() {
        assert!(!check(&[Some(10), Some(10), None, Some(10), Some(10)]).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_file_is_not_stable() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_stable(&dir.path().join("gone.mkv"), &StabilityPolicy::default()).await);
    }
}
