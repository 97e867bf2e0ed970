//! Media record representation.

use std::fmt;

use serde_json::{Map, Value};

use crate::config::SourceMode;

/// Type of media content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Download outcome of a media record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Pending,
    Success,
    Exists,
    Failed,
    Skipped,
    EmptyUrl,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Pending => "pending",
            DownloadStatus::Success => "success",
            DownloadStatus::Exists => "exists",
            DownloadStatus::Failed => "failed",
            DownloadStatus::Skipped => "skipped",
            DownloadStatus::EmptyUrl => "empty_url",
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self != DownloadStatus::Pending
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a media record: `{post_id}|{type}|{normalized_url}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaKey(pub String);

impl MediaKey {
    pub fn new(post_id: &str, media_type: &str, url: &str) -> Self {
        MediaKey(format!(
            "{}|{}|{}",
            post_id,
            media_type,
            normalize_media_url(url)
        ))
    }
}

/// An image or video attached to a post or profile.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRecord {
    pub source_mode: SourceMode,
    pub source_target: String,
    pub post_id: String,
    pub post_url: String,
    pub post_author: String,
    pub media_type: MediaType,
    pub media_url: String,
    pub preview_url: String,
    pub post_time: String,
    local_path: String,
    status: DownloadStatus,
}

impl MediaRecord {
    /// Column titles of the media CSV, also the JSONL keys.
    pub const COLUMNS: &'static [&'static str] = &[
        "来源模式",
        "来源目标",
        "帖子ID",
        "帖子链接",
        "帖子发布者",
        "媒体类型",
        "媒体链接",
        "预览链接",
        "本地文件路径",
        "下载状态",
        "帖子发布时间",
    ];

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source_mode: SourceMode,
        source_target: &str,
        post_id: &str,
        post_url: &str,
        post_author: &str,
        media_type: MediaType,
        media_url: &str,
        preview_url: &str,
        post_time: &str,
    ) -> Self {
        Self {
            source_mode,
            source_target: source_target.to_string(),
            post_id: post_id.to_string(),
            post_url: post_url.to_string(),
            post_author: post_author.to_string(),
            media_type,
            media_url: media_url.to_string(),
            preview_url: preview_url.to_string(),
            post_time: post_time.to_string(),
            local_path: String::new(),
            status: DownloadStatus::Pending,
        }
    }

    pub fn status(&self) -> DownloadStatus {
        self.status
    }

    pub fn local_path(&self) -> &str {
        &self.local_path
    }

    /// Move out of `pending` into a terminal status. Later calls are ignored.
    ///
    /// Returns whether the record changed.
    pub fn settle(&mut self, status: DownloadStatus, local_path: Option<String>) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        if let Some(path) = local_path {
            self.local_path = path;
        }
        true
    }

    pub fn dedup_key(&self) -> MediaKey {
        MediaKey::new(&self.post_id, self.media_type.as_str(), &self.media_url)
    }

    /// CSV cells in [`MediaRecord::COLUMNS`] order.
    pub fn csv_row(&self) -> Vec<String> {
        vec![
            self.source_mode.to_string(),
            self.source_target.clone(),
            self.post_id.clone(),
            self.post_url.clone(),
            self.post_author.clone(),
            self.media_type.to_string(),
            self.media_url.clone(),
            self.preview_url.clone(),
            self.local_path.clone(),
            self.status.to_string(),
            self.post_time.clone(),
        ]
    }

    /// JSONL object keyed by the CSV column titles.
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = Self::COLUMNS
            .iter()
            .zip(self.csv_row())
            .map(|(column, cell)| (column.to_string(), Value::String(cell)))
            .collect();
        Value::Object(map)
    }
}

/// Strip the query string and fragment so signed variants of one URL compare
/// equal. Scheme-less input keeps only its path.
pub fn normalize_media_url(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let without_query = trimmed
        .split(['?', '#'])
        .next()
        .unwrap_or_default();

    match without_query.split_once("://") {
        Some((scheme, rest))
            if !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) =>
        {
            format!("{}://{}", scheme.to_lowercase(), rest)
        }
        _ => match without_query.strip_prefix("//") {
            Some(rest) => rest.find('/').map(|i| rest[i..].to_string()).unwrap_or_default(),
            None => without_query.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str) -> MediaRecord {
        MediaRecord::new(
            SourceMode::PostUrl,
            "https://weibo.com/1/2",
            "2",
            "https://weibo.com/1/2",
            "author",
            MediaType::Image,
            url,
            url,
            "2026-02-10 12:00:00",
        )
    }

    #[test]
    fn test_normalize_media_url() {
        assert_eq!(
            normalize_media_url("https://wx1.sinaimg.cn/large/a.jpg?Expires=1&ssig=2#x"),
            "https://wx1.sinaimg.cn/large/a.jpg"
        );
        assert_eq!(normalize_media_url("//wx1.sinaimg.cn/large/a.jpg?x=1"), "/large/a.jpg");
        assert_eq!(normalize_media_url("large/a.jpg"), "large/a.jpg");
        assert_eq!(normalize_media_url("  "), "");
    }

    #[test]
    fn test_signed_variants_share_key() {
        let a = record("https://f.video.weibocdn.com/v.mp4?Expires=1&ssig=a");
        let b = record("https://f.video.weibocdn.com/v.mp4?Expires=9&ssig=b");
        assert_eq!(a.dedup_key(), b.dedup_key());
        assert_eq!(
            a.dedup_key(),
            MediaKey("2|image|https://f.video.weibocdn.com/v.mp4".to_string())
        );
    }

    #[test]
    fn test_settle_only_once() {
        let mut rec = record("https://h/a.jpg");
        assert_eq!(rec.status(), DownloadStatus::Pending);
        assert!(rec.settle(DownloadStatus::Success, Some("/m/a.jpg".into())));
        assert!(!rec.settle(DownloadStatus::Failed, None));
        assert_eq!(rec.status(), DownloadStatus::Success);
        assert_eq!(rec.local_path(), "/m/a.jpg");
        assert!(!record("x").settle(DownloadStatus::Pending, None));
    }

    #[test]
    fn test_row_and_json() {
        let rec = record("https://h/a.jpg");
        let row = rec.csv_row();
        assert_eq!(row.len(), MediaRecord::COLUMNS.len());
        assert_eq!(row[9], "pending");
        assert_eq!(rec.to_json()["媒体链接"], Value::String("https://h/a.jpg".into()));
    }
}
