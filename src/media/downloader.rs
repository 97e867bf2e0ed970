//! Bounded-concurrency media downloads.

use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::Semaphore;

use crate::api::Transport;
use crate::config::Config;
use crate::fs::media_target_path;
use crate::media::item::{DownloadStatus, MediaRecord};
use crate::storage::MediaSink;

/// Referer sent when a record has no post URL.
const DEFAULT_REFERER: &str = "https://weibo.com/";

/// Number records by their 1-based position in a post's media list.
///
/// The number is part of the file name, so it is fixed before any record
/// is dropped as already saved.
pub fn numbered(records: Vec<MediaRecord>) -> Vec<(usize, MediaRecord)> {
    (1..).zip(records).collect()
}

/// Records after download, and how many of them the sink accepted.
#[derive(Debug, Default)]
pub struct MediaBatch {
    pub records: Vec<MediaRecord>,
    pub saved: usize,
}

/// Downloads media records into the media tree and settles their status.
pub struct MediaDownloader {
    transport: Arc<dyn Transport>,
    media_root: PathBuf,
    download_enabled: bool,
    overwrite: bool,
    semaphore: Arc<Semaphore>,
}

impl MediaDownloader {
    pub fn new(transport: Arc<dyn Transport>, config: &Config) -> Self {
        Self {
            transport,
            media_root: config.media_root(),
            download_enabled: config.media.download,
            overwrite: config.media.overwrite,
            semaphore: Arc::new(Semaphore::new(config.concurrency.media_download)),
        }
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    /// Download every numbered record and hand each to `sink` as soon as it
    /// settles.
    ///
    /// With downloads disabled every record is marked `skipped` and only its
    /// link is recorded.
    pub async fn download_all(
        &self,
        records: Vec<(usize, MediaRecord)>,
        sink: Option<&dyn MediaSink>,
    ) -> MediaBatch {
        if records.is_empty() {
            return MediaBatch::default();
        }

        if !self.download_enabled {
            let mut batch = MediaBatch::default();
            for (_, mut record) in records {
                record.settle(DownloadStatus::Skipped, None);
                if let Some(sink) = sink {
                    batch.saved += sink.media_settled(&record).await;
                }
                batch.records.push(record);
            }
            return batch;
        }

        let tasks = records.into_iter().map(|(index, record)| {
            let fallback = record.clone();
            async move {
                let outcome = AssertUnwindSafe(self.download_one(record, index))
                    .catch_unwind()
                    .await;
                let record = match outcome {
                    Ok(record) => record,
                    Err(_) => {
                        tracing::warn!("Media download panicked: {}", fallback.media_url);
                        let mut record = fallback;
                        record.settle(DownloadStatus::Failed, None);
                        record
                    }
                };
                let saved = match sink {
                    Some(sink) => sink.media_settled(&record).await,
                    None => 0,
                };
                (record, saved)
            }
        });

        let mut batch = MediaBatch::default();
        for (record, saved) in join_all(tasks).await {
            batch.saved += saved;
            batch.records.push(record);
        }
        batch
    }

    async fn download_one(&self, mut record: MediaRecord, index: usize) -> MediaRecord {
        if record.media_url.is_empty() {
            record.settle(DownloadStatus::EmptyUrl, None);
            return record;
        }

        let Ok(_permit) = self.semaphore.acquire().await else {
            record.settle(DownloadStatus::Failed, None);
            return record;
        };

        let target = media_target_path(&self.media_root, &record, index);
        if !self.overwrite && target.exists() {
            tracing::debug!("Skipping existing file: {}", target.display());
            record.settle(DownloadStatus::Exists, Some(absolute_display(&target)));
            return record;
        }

        let referer = if record.post_url.is_empty() {
            DEFAULT_REFERER.to_string()
        } else {
            record.post_url.clone()
        };

        let ok = self
            .transport
            .download_file(&record.media_url, &target, &[("referer", referer)])
            .await;

        if ok {
            tracing::debug!("Downloaded: {}", target.display());
            record.settle(DownloadStatus::Success, Some(absolute_display(&target)));
        } else {
            record.settle(DownloadStatus::Failed, None);
        }
        record
    }
}

fn absolute_display(path: &Path) -> String {
    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}
