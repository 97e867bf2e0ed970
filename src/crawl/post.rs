//! Per-post processing shared by every crawl mode.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;

use crate::api::WeiboApi;
use crate::config::{Config, SourceMode};
use crate::crawl::comments::CommentPaginator;
use crate::media::{extract_media, numbered, DownloadStatus, MediaDownloader};
use crate::model::Post;
use crate::storage::{MediaSink, RecordStore};

/// Saves a post, its media and its comments.
pub struct PostProcessor {
    api: WeiboApi,
    store: Arc<RecordStore>,
    config: Arc<Config>,
    comments: CommentPaginator,
    media: MediaDownloader,
    detail_semaphore: Semaphore,
    comment_semaphore: Semaphore,
}

impl PostProcessor {
    pub fn new(api: WeiboApi, store: Arc<RecordStore>, config: Arc<Config>) -> Self {
        Self {
            comments: CommentPaginator::new(api.clone(), &config),
            media: MediaDownloader::new(api.transport(), &config),
            detail_semaphore: Semaphore::new(config.concurrency.post_detail),
            comment_semaphore: Semaphore::new(config.concurrency.comment),
            api,
            store,
            config,
        }
    }

    /// Fetch a post by id and process it. Returns the comments saved.
    pub async fn process_post_id(&self, post_id: &str, mode: SourceMode, target: &str) -> usize {
        let post_id = post_id.trim();
        if post_id.is_empty() {
            return 0;
        }

        let status = {
            let Ok(_permit) = self.detail_semaphore.acquire().await else {
                return 0;
            };
            self.api.post_detail(post_id).await
        };
        let Some(status) = status else {
            tracing::warn!("Could not fetch post detail: {}", post_id);
            return 0;
        };

        self.process_status(&status, mode, target).await
    }

    /// Process a status object already in hand. Returns the comments saved.
    pub async fn process_status(&self, status: &Value, mode: SourceMode, target: &str) -> usize {
        if !status.is_object() {
            tracing::warn!("Skipping malformed status from {} '{}'", mode, target);
            return 0;
        }

        let post = Post::from_status(status, mode, target);
        if post.post_id.is_empty() && post.content.is_empty() {
            return 0;
        }

        if self.store.save_post(&post).await {
            tracing::info!("New post: @{} | {}", post.user_name, post.title());
        }

        if self.config.media.enabled {
            self.capture_media(status, &post).await;
        }

        if !self.config.should_fetch_comments(mode) {
            return 0;
        }

        let saved = {
            let Ok(_permit) = self.comment_semaphore.acquire().await else {
                return 0;
            };
            self.comments.fetch_and_save(&post, self.store.as_ref()).await
        };

        if saved > 0 {
            let totals = self.store.totals().await;
            tracing::info!(
                "Comments +{} @{} | {} (total: {})",
                saved,
                post.user_name,
                post.title(),
                totals.comments
            );
        } else {
            tracing::debug!("No new comments for post {}", post.post_id);
        }
        saved
    }

    async fn capture_media(&self, status: &Value, post: &Post) {
        let records: Vec<_> = extract_media(status, post)
            .into_iter()
            .filter(|record| self.config.should_capture_media_type(record.media_type))
            .collect();
        let records = self.store.unseen_media(numbered(records)).await;
        if records.is_empty() {
            return;
        }

        let batch = self
            .media
            .download_all(records, Some(self.store.as_ref() as &dyn MediaSink))
            .await;
        if batch.saved == 0 {
            return;
        }

        let count = |status: DownloadStatus| {
            batch
                .records
                .iter()
                .filter(|record| record.status() == status)
                .count()
        };
        tracing::info!(
            "Media +{} for post {} (downloaded {}, existing {})",
            batch.saved,
            post.post_id,
            count(DownloadStatus::Success),
            count(DownloadStatus::Exists)
        );
    }
}
