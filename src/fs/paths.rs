//! Deterministic media file locations.

use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};

use crate::fs::naming::sanitize_component;
use crate::media::{normalize_media_url, MediaRecord, MediaType};

const IMAGE_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp", ".heic", ".avif",
];

const VIDEO_EXTENSIONS: &[&str] = &[
    ".mp4", ".mov", ".mkv", ".avi", ".flv", ".wmv", ".webm", ".m4v",
];

/// Target path of a media record:
/// `{root}/{group}/{author}/{post_id}/{type}_{index:02}_{sha1[:12]}{ext}`.
///
/// `index` is the 1-based position of the record within its post.
pub fn media_target_path(media_root: &Path, record: &MediaRecord, index: usize) -> PathBuf {
    let author = non_empty_or(&record.post_author, "unknown_author");
    let post_id = non_empty_or(&record.post_id, "unknown_post");

    let stable_url = normalize_media_url(&record.media_url);
    let digest = url_digest(&stable_url);
    let extension = guess_extension(
        if stable_url.is_empty() {
            &record.media_url
        } else {
            &stable_url
        },
        record.media_type,
    );

    media_root
        .join(record.source_mode.output_group())
        .join(sanitize_component(author))
        .join(sanitize_component(post_id))
        .join(format!(
            "{}_{:02}_{}{}",
            record.media_type.as_str(),
            index,
            digest,
            extension
        ))
}

/// First 12 hex characters of the SHA-1 of `url`.
pub fn url_digest(url: &str) -> String {
    let hash = Sha1::digest(url.as_bytes());
    let hex: String = hash.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..12].to_string()
}

/// Extension from the URL path when it is known for the media type,
/// else the type default.
pub fn guess_extension(url: &str, media_type: MediaType) -> String {
    let path = url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.split(['?', '#']).next().unwrap_or_default().to_string());

    let ext = Path::new(&path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default();

    let (known, default) = match media_type {
        MediaType::Image => (IMAGE_EXTENSIONS, ".jpg"),
        MediaType::Video => (VIDEO_EXTENSIONS, ".mp4"),
    };

    if known.contains(&ext.as_str()) {
        ext
    } else {
        default.to_string()
    }
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceMode;

    fn record(url: &str, media_type: MediaType) -> MediaRecord {
        MediaRecord::new(
            SourceMode::Keyword,
            "新品",
            "5270588752661663",
            "https://weibo.com/1669879400/5270588752661663",
            "Dear 迪丽热巴",
            media_type,
            url,
            url,
            "2026-02-10 12:00:00",
        )
    }

    #[test]
    fn test_target_path_layout() {
        let rec = record(
            "https://wx1.sinaimg.cn/large/abc.JPG?Expires=1&ssig=x",
            MediaType::Image,
        );
        let path = media_target_path(Path::new("/out/media"), &rec, 3);
        let digest = url_digest("https://wx1.sinaimg.cn/large/abc.JPG");
        assert_eq!(
            path,
            PathBuf::from(format!(
                "/out/media/keyword/Dear_迪丽热巴/5270588752661663/image_03_{}.jpg",
                digest
            ))
        );
    }

    #[test]
    fn test_signed_urls_share_a_path() {
        let a = record("https://f.video.weibocdn.com/o0/v.mp4?Expires=1&ssig=a", MediaType::Video);
        let b = record("https://f.video.weibocdn.com/o0/v.mp4?Expires=2&ssig=b", MediaType::Video);
        assert_eq!(
            media_target_path(Path::new("m"), &a, 1),
            media_target_path(Path::new("m"), &b, 1)
        );
    }

    #[test]
    fn test_guess_extension_defaults() {
        assert_eq!(guess_extension("https://h/x.webp", MediaType::Image), ".webp");
        assert_eq!(guess_extension("https://h/x.mp4", MediaType::Image), ".jpg");
        assert_eq!(guess_extension("https://h/stream", MediaType::Video), ".mp4");
        assert_eq!(guess_extension("https://h/x.MOV?a=1", MediaType::Video), ".mov");
    }

    #[test]
    fn test_missing_author_and_post() {
        let mut rec = record("https://h/a.png", MediaType::Image);
        rec.post_author.clear();
        rec.post_id.clear();
        let path = media_target_path(Path::new("m"), &rec, 1);
        assert!(path.starts_with("m/keyword/unknown_author/unknown_post"));
    }
}
