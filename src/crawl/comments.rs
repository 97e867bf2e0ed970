//! Comment pagination.
//!
//! Top-level pages are fetched in order and handed to a [`CommentSink`] one
//! page at a time, so partial results are already persisted when a crawl is
//! interrupted. Replies under each top-level comment are fetched concurrently
//! and saved with the page that listed their parent.

use std::panic::AssertUnwindSafe;

use futures::future::join_all;
use futures::FutureExt;
use serde_json::Value;

use crate::api::endpoints::{comment_items, is_login_wall_json, next_cursor};
use crate::api::WeiboApi;
use crate::config::{Config, DelayRange};
use crate::model::json::first_text;
use crate::model::text::parse_count;
use crate::model::{Comment, CommentLevel, Post};
use crate::storage::{CommentBuffer, CommentSink};

/// Position of a cursor-paginated fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    Start,
    HasMore(String),
    Exhausted,
    LoginRequired,
}

impl PageCursor {
    /// Cursor after a page: a missing or zero `max_id` ends pagination.
    pub fn after(data: &Value) -> Self {
        match next_cursor(data) {
            Some(cursor) => PageCursor::HasMore(cursor),
            None => PageCursor::Exhausted,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, PageCursor::Start | PageCursor::HasMore(_))
    }

    /// `max_id` to send with the next request.
    pub fn param(&self) -> Option<&str> {
        match self {
            PageCursor::HasMore(cursor) => Some(cursor.as_str()),
            _ => None,
        }
    }
}

/// Walks the comment pages of a post.
#[derive(Clone)]
pub struct CommentPaginator {
    api: WeiboApi,
    top_level: bool,
    nested: bool,
    max_pages: u32,
    max_nested_pages: u32,
    max_per_post: usize,
    page_delay: DelayRange,
}

impl CommentPaginator {
    pub fn new(api: WeiboApi, config: &Config) -> Self {
        Self {
            api,
            top_level: config.comments.top_level,
            nested: config.comments.nested,
            max_pages: config.limits.max_comment_pages,
            max_nested_pages: config.limits.max_nested_comment_pages,
            max_per_post: config.limits.max_comments_per_post,
            page_delay: config.delays.comment_page,
        }
    }

    /// Fetch the comments of `post`, saving each page as it arrives.
    ///
    /// Returns how many records the sink accepted.
    pub async fn fetch_and_save(&self, post: &Post, sink: &dyn CommentSink) -> usize {
        if post.post_id.is_empty() || !(self.top_level || self.nested) {
            return 0;
        }

        let mut cursor = PageCursor::Start;
        let mut pages = 0;
        let mut accepted = 0;

        while cursor.is_open() && pages < self.max_pages {
            if self.max_per_post > 0 && accepted >= self.max_per_post {
                break;
            }

            let Some(data) = self
                .api
                .comment_page(&post.post_id, &post.uid, cursor.param())
                .await
            else {
                break;
            };
            if !data.is_object() {
                tracing::warn!("Unexpected comment page for post {}", post.post_id);
                break;
            }
            if is_login_wall_json(&data) {
                tracing::warn!(
                    "Comments of post {} require login; check the session cookie",
                    post.post_id
                );
                cursor = PageCursor::LoginRequired;
                break;
            }

            let items = comment_items(&data);
            if items.is_empty() {
                break;
            }

            let mut records = self.page_records(items, post).await;
            if !records.is_empty() {
                if self.max_per_post > 0 {
                    records.truncate(self.max_per_post.saturating_sub(accepted));
                }
                accepted += sink.save_comment_page(records).await;
            }

            cursor = PageCursor::after(&data);
            pages += 1;
            if cursor.is_open() && pages < self.max_pages {
                self.page_delay.pause().await;
            }
        }

        if cursor == PageCursor::LoginRequired {
            tracing::debug!("Stopped comment pagination of {} at the login wall", post.post_id);
        }
        accepted
    }

    /// Fetch every comment of `post` into memory.
    pub async fn fetch_all(&self, post: &Post) -> Vec<Comment> {
        let buffer = CommentBuffer::default();
        self.fetch_and_save(post, &buffer).await;
        buffer.into_records()
    }

    /// Records of one top-level page, replies included.
    async fn page_records(&self, items: &[Value], post: &Post) -> Vec<Comment> {
        let mut records = Vec::new();
        let mut reply_parents = Vec::new();

        for item in items.iter().filter(|item| item.is_object()) {
            if self.top_level {
                let comment = Comment::from_api(item, post, CommentLevel::TopLevel);
                if comment.has_content() {
                    records.push(comment);
                }
            }
            if self.nested && has_replies(item) {
                let comment_id = first_text(item, &["idstr", "id"]);
                if !comment_id.is_empty() {
                    reply_parents.push(comment_id);
                }
            }
        }

        if reply_parents.is_empty() {
            return records;
        }

        let results = join_all(reply_parents.iter().map(|comment_id| {
            AssertUnwindSafe(self.fetch_replies(comment_id, post)).catch_unwind()
        }))
        .await;
        for (comment_id, result) in reply_parents.iter().zip(results) {
            match result {
                Ok(replies) => records.extend(replies),
                Err(_) => tracing::warn!("Failed to fetch replies of comment {}", comment_id),
            }
        }
        records
    }

    /// All reply pages under one top-level comment.
    async fn fetch_replies(&self, comment_id: &str, post: &Post) -> Vec<Comment> {
        let mut records = Vec::new();
        let mut cursor = PageCursor::Start;
        let mut pages = 0;

        while cursor.is_open() && pages < self.max_nested_pages {
            let Some(data) = self
                .api
                .nested_comment_page(comment_id, &post.uid, pages == 0, cursor.param())
                .await
            else {
                break;
            };
            if !data.is_object() {
                tracing::warn!("Unexpected reply page for comment {}", comment_id);
                break;
            }
            if is_login_wall_json(&data) {
                break;
            }

            let items = comment_items(&data);
            if items.is_empty() {
                break;
            }
            records.extend(
                items
                    .iter()
                    .filter(|item| item.is_object())
                    .map(|item| Comment::from_api(item, post, CommentLevel::Nested))
                    .filter(Comment::has_content),
            );

            cursor = PageCursor::after(&data);
            pages += 1;
            if cursor.is_open() && pages < self.max_nested_pages {
                self.page_delay.pause().await;
            }
        }
        records
    }
}

fn has_replies(item: &Value) -> bool {
    item.get("total_number").map(parse_count).unwrap_or(0) > 0
}
