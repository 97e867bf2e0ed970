//! Media module for record representation, extraction and downloading.

pub mod downloader;
pub mod item;
pub mod parser;

pub use downloader::{numbered, MediaBatch, MediaDownloader};
pub use item::{normalize_media_url, DownloadStatus, MediaKey, MediaRecord, MediaType};
pub use parser::{extract_media, split_url_candidates};
