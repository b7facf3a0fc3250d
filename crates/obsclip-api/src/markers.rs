//! Appends captured markers to the side channel file.

use std::path::Path;

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use obsclip_models::format_marker_line;

/// Append one `"{:.2}\n"` line, creating the file if needed.
pub async fn append_marker(path: &Path, seconds: f64) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(format_marker_line(seconds).as_bytes()).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use obsclip_models::parse_marker_lines;

    #[tokio::test]
    async fn test_append_creates_and_extends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("markers.txt");

        append_marker(&path, 12.5).await.unwrap();
        append_marker(&path, 196.099).await.unwrap();

        let body = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(body, "12.50\n196.10\n");
        assert_eq!(parse_marker_lines(&body), vec![12.5, 196.1]);
    }

    #[tokio::test]
    async fn test_append_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("markers.txt");

        assert!(append_marker(&path, 1.0).await.is_err());
    }
}
