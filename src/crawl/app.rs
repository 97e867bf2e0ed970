//! Run driver: loads history, sequences the crawl modes and tears down.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;

use crate::api::{Transport, WeiboApi};
use crate::config::{Config, SourceMode};
use crate::crawl::keyword::KeywordScheduler;
use crate::crawl::links::LinkScheduler;
use crate::crawl::post::PostProcessor;
use crate::crawl::user::UserScheduler;
use crate::error::Result;
use crate::storage::{RecordStore, StoreTotals};

/// Outcome of a run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub totals: StoreTotals,
    /// `(label, path)` of every output location.
    pub outputs: Vec<(String, PathBuf)>,
    pub recent_posts: Vec<String>,
    pub recent_users: Vec<String>,
    pub interrupted: bool,
}

/// Entries listed in the run summary.
const RECENT_LIMIT: usize = 5;

/// Owns every component of a crawl.
pub struct Harvester {
    config: Arc<Config>,
    store: Arc<RecordStore>,
    keywords: KeywordScheduler,
    links: LinkScheduler,
    users: UserScheduler,
}

impl Harvester {
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Self {
        let config = Arc::new(config);
        let api = WeiboApi::new(transport);
        let store = Arc::new(RecordStore::new(&config));
        let processor = Arc::new(PostProcessor::new(
            api.clone(),
            Arc::clone(&store),
            Arc::clone(&config),
        ));

        Self {
            keywords: KeywordScheduler::new(
                api.clone(),
                Arc::clone(&processor),
                Arc::clone(&store),
                Arc::clone(&config),
            ),
            links: LinkScheduler::new(Arc::clone(&processor), &config),
            users: UserScheduler::new(api, processor, Arc::clone(&store), Arc::clone(&config)),
            config,
            store,
        }
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    /// Run every enabled mode. `shutdown` resolving stops the crawl early;
    /// records already handed to the store are flushed either way.
    pub async fn run<F>(&self, shutdown: F) -> Result<RunReport>
    where
        F: Future<Output = ()>,
    {
        self.store.load_history().await?;
        self.log_plan();
        self.store.start_writer();

        let interrupted = tokio::select! {
            biased;
            _ = shutdown => {
                tracing::warn!("Interrupted, flushing pending records");
                true
            }
            result = AssertUnwindSafe(self.crawl()).catch_unwind() => {
                if result.is_err() {
                    tracing::error!("Crawl aborted by an unexpected failure");
                }
                false
            }
        };

        self.store.stop_writer().await;

        Ok(RunReport {
            totals: self.store.totals().await,
            outputs: self.store.output_summary(),
            recent_posts: self.store.recent_post_urls(RECENT_LIMIT).await,
            recent_users: self.store.recent_user_ids(RECENT_LIMIT).await,
            interrupted,
        })
    }

    async fn crawl(&self) {
        let keywords = self.config.active_keywords();
        if self.mode_has_targets(SourceMode::Keyword, &keywords) {
            self.keywords.run(&keywords).await;
        }

        let links = self.config.active_post_urls();
        if self.mode_has_targets(SourceMode::PostUrl, &links) {
            self.links.run(&links).await;
        }

        let users = self.config.active_users();
        if self.mode_has_targets(SourceMode::User, &users) {
            self.users.run(&users).await;
        }
    }

    fn mode_has_targets(&self, mode: SourceMode, targets: &[String]) -> bool {
        if !self.config.is_mode_enabled(mode) {
            return false;
        }
        if targets.is_empty() {
            tracing::warn!("Mode '{}' is enabled but has no targets, skipping", mode);
            return false;
        }
        true
    }

    fn log_plan(&self) {
        let config = &self.config;
        let modes: Vec<&str> = config.enabled_modes().iter().map(SourceMode::as_str).collect();
        let limits = &config.limits;

        tracing::info!(
            "Modes: {} | save format: {}",
            modes.join(", "),
            config.output.save_format
        );
        tracing::info!(
            "Targets: {} keywords, {} links, {} users",
            config.active_keywords().len(),
            config.active_post_urls().len(),
            config.active_users().len()
        );
        tracing::info!(
            "Concurrency: keyword {}, detail {}, comment {}, user {}, media {}, global {}",
            config.concurrency.keyword,
            config.concurrency.post_detail,
            config.concurrency.comment,
            config.concurrency.user,
            config.concurrency.media_download,
            config.concurrency.global
        );
        tracing::info!(
            "Comments: keyword {}, link {}, user {} (top-level {}, nested {})",
            config.comments.keyword,
            config.comments.post_url,
            config.comments.user,
            config.comments.top_level,
            config.comments.nested
        );
        tracing::info!(
            "Media: enabled {}, types {}, download {}, profile media {}",
            config.media.enabled,
            config.media.types,
            config.media.download,
            config.media.profile_media
        );
        tracing::info!(
            "Limits: {} search pages, {} posts/keyword, {} comments/keyword, {} comments/post, {} user pages",
            limits.max_search_pages,
            unlimited_or(limits.max_posts_per_keyword),
            unlimited_or(limits.max_comments_per_keyword),
            unlimited_or(limits.max_comments_per_post),
            if limits.max_user_pages == 0 {
                format!("unlimited (cap {})", limits.unlimited_user_page_cap)
            } else {
                limits.max_user_pages.to_string()
            }
        );
    }
}

fn unlimited_or(value: usize) -> String {
    if value == 0 {
        "unlimited".to_string()
    } else {
        value.to_string()
    }
}
