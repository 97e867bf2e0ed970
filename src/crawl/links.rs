//! Direct post link crawling.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::api::extract_post_id_from_url;
use crate::config::{Config, SourceMode};
use crate::crawl::join_tolerant;
use crate::crawl::post::PostProcessor;

/// Resolves post links and processes each post.
pub struct LinkScheduler {
    processor: Arc<PostProcessor>,
    semaphore: Semaphore,
}

impl LinkScheduler {
    pub fn new(processor: Arc<PostProcessor>, config: &Config) -> Self {
        Self {
            processor,
            semaphore: Semaphore::new(config.concurrency.post_detail),
        }
    }

    /// Process every link concurrently. Returns the comments saved.
    pub async fn run(&self, links: &[String]) -> usize {
        let links: Vec<&str> = links
            .iter()
            .map(|link| link.trim())
            .filter(|link| !link.is_empty())
            .collect();

        let saved = join_tolerant("Link", links.iter().map(|link| self.process_link(link))).await;
        tracing::info!(
            "Link mode done: {} links, {} comments saved",
            links.len(),
            saved
        );
        saved
    }

    async fn process_link(&self, link: &str) -> usize {
        let post_id = extract_post_id_from_url(link);
        if post_id.is_empty() {
            tracing::warn!("Could not resolve a post id from {}", link);
            return 0;
        }

        let Ok(_permit) = self.semaphore.acquire().await else {
            return 0;
        };
        self.processor
            .process_post_id(&post_id, SourceMode::PostUrl, link)
            .await
    }
}
