//! Narrow save interfaces handed to the crawl components.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::media::MediaRecord;
use crate::model::Comment;
use crate::storage::store::RecordStore;

/// Receives each comment page as soon as it is fetched.
#[async_trait]
pub trait CommentSink: Send + Sync {
    /// Returns how many records were accepted.
    async fn save_comment_page(&self, records: Vec<Comment>) -> usize;
}

/// Receives each media record once its download has settled.
#[async_trait]
pub trait MediaSink: Send + Sync {
    /// Returns how many records were accepted.
    async fn media_settled(&self, record: &MediaRecord) -> usize;
}

#[async_trait]
impl CommentSink for RecordStore {
    async fn save_comment_page(&self, records: Vec<Comment>) -> usize {
        self.save_comments(&records).await
    }
}

#[async_trait]
impl MediaSink for RecordStore {
    async fn media_settled(&self, record: &MediaRecord) -> usize {
        self.save_media(std::slice::from_ref(record)).await
    }
}

/// Keeps every page in memory; used when comments are only collected.
#[derive(Debug, Default)]
pub struct CommentBuffer {
    records: Mutex<Vec<Comment>>,
}

impl CommentBuffer {
    pub fn into_records(self) -> Vec<Comment> {
        self.records
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl CommentSink for CommentBuffer {
    async fn save_comment_page(&self, records: Vec<Comment>) -> usize {
        let count = records.len();
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .extend(records);
        count
    }
}
