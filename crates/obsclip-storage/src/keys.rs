//! Object key layout and content types.
//!
//! ```text
//! videos/<fileName>
//! clips/<videoId>/<clipFileName>
//! finals/<videoId>/<combinedFileName>
//! ```

use std::path::Path;

use obsclip_models::VideoId;

/// Key of an uploaded source recording.
pub fn source_key(file_name: &str) -> String {
    format!("videos/{}", file_name)
}

/// Key of one extracted clip.
pub fn clip_key(video_id: &VideoId, clip_file_name: &str) -> String {
    format!("clips/{}/{}", video_id, clip_file_name)
}

/// Key of the combined highlights video.
pub fn final_key(video_id: &VideoId, combined_file_name: &str) -> String {
    format!("finals/{}/{}", video_id, combined_file_name)
}

/// Content type for a video file, by extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("mp4") => "video/mp4",
        Some("mkv") => "video/x-matroska",
        Some("mov") => "video/quicktime",
        Some("flv") => "video/x-flv",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let id = VideoId::from("1714557600000_abc123xyz");
        assert_eq!(source_key("rec.mkv"), "videos/rec.mkv");
        assert_eq!(
            clip_key(&id, "rec_clip_1_10.0s.mp4"),
            "clips/1714557600000_abc123xyz/rec_clip_1_10.0s.mp4"
        );
        assert_eq!(
            final_key(&id, "rec_highlights.mp4"),
            "finals/1714557600000_abc123xyz/rec_highlights.mp4"
        );
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for(Path::new("/obs/a.MP4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("a.mkv")), "video/x-matroska");
        assert_eq!(content_type_for(Path::new("a")), "application/octet-stream");
    }
}
