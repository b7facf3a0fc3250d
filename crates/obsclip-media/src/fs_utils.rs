//! Filesystem helpers for scratch files.

use std::path::Path;
use tokio::fs;

/// Create `dir` and its parents; succeeds if it already exists.
pub async fn ensure_dir(dir: impl AsRef<Path>) -> std::io::Result<()> {
    fs::create_dir_all(dir).await
}

/// Best-effort removal of a scratch file.
///
/// Missing files are ignored; other failures are logged at debug level.
pub async fn remove_quietly(path: impl AsRef<Path>) {
    let path = path.as_ref();
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::debug!("Failed to remove {}: {}", path.display(), e),
    }
}

/// Best-effort recursive removal of a scratch directory.
pub async fn remove_dir_quietly(dir: impl AsRef<Path>) {
    let dir = dir.as_ref();
    match fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::debug!("Failed to remove {}: {}", dir.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_remove_quietly() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("clip.mp4");
        fs::write(&file, b"data").await.unwrap();

        remove_quietly(&file).await;
        assert!(!file.exists());

        // Second removal is a no-op
        remove_quietly(&file).await;
    }

    #[tokio::test]
    async fn test_remove_dir_quietly() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("1700000000000_abcdefghi");
        ensure_dir(&scratch).await.unwrap();
        fs::write(scratch.join("src.mkv"), b"data").await.unwrap();

        remove_dir_quietly(&scratch).await;
        assert!(!scratch.exists());
        remove_dir_quietly(&scratch).await;
    }

    #[tokio::test]
    async fn test_ensure_dir_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        ensure_dir(&nested).await.unwrap();
        ensure_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
    }
}
