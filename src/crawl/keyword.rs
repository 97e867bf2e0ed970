//! Keyword search crawling.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use scraper::{Html, Selector};

use crate::api::endpoints::is_login_wall_html;
use crate::api::{extract_post_id_from_url, WeiboApi};
use crate::config::{Config, SourceMode};
use crate::crawl::join_tolerant;
use crate::crawl::post::PostProcessor;
use crate::error::Error;
use crate::storage::RecordStore;

static FEED_CARD: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"div[action-type="feed_list_item"]"#).expect("feed card selector is valid")
});

static CARD_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("card link selector is valid"));

/// What a scanned search page yielded.
enum PageScan {
    Processed(usize),
    Stop,
}

/// Runs keyword searches in batches and processes every hit.
pub struct KeywordScheduler {
    api: WeiboApi,
    processor: Arc<PostProcessor>,
    store: Arc<RecordStore>,
    config: Arc<Config>,
}

impl KeywordScheduler {
    pub fn new(
        api: WeiboApi,
        processor: Arc<PostProcessor>,
        store: Arc<RecordStore>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            api,
            processor,
            store,
            config,
        }
    }

    /// Crawl `keywords` in concurrent batches. Returns the comments saved.
    pub async fn run(&self, keywords: &[String]) -> usize {
        let batch_size = self.config.concurrency.keyword.max(1);
        let mut saved = 0;

        for (index, batch) in keywords.chunks(batch_size).enumerate() {
            tracing::info!("Keyword batch {}: {}", index + 1, batch.join(", "));
            saved += join_tolerant(
                "Keyword",
                batch.iter().map(|keyword| self.process_keyword(keyword)),
            )
            .await;
            tracing::info!(
                "Keyword batch {} done (comments so far: {})",
                index + 1,
                self.store.totals().await.comments
            );
        }
        saved
    }

    /// Walk the search pages of one keyword until a quota or the last page.
    pub async fn process_keyword(&self, keyword: &str) -> usize {
        let limits = &self.config.limits;
        let max_posts = limits.max_posts_per_keyword;
        let max_comments = limits.max_comments_per_keyword;
        tracing::info!("Searching keyword '{}'", keyword);

        let posts = self.store.source_post_count(SourceMode::Keyword, keyword).await;
        let comments = self
            .store
            .source_comment_count(SourceMode::Keyword, keyword)
            .await;
        if quota_reached(posts, max_posts) || quota_reached(comments, max_comments) {
            tracing::info!(
                "Keyword '{}' already at quota ({} posts, {} comments), skipping",
                keyword,
                posts,
                comments
            );
            return 0;
        }
        if posts > 0 || comments > 0 {
            tracing::info!(
                "Keyword '{}' resumes with {} posts and {} comments on record",
                keyword,
                posts,
                comments
            );
        }

        let mut saved = 0;
        for page in 1..=limits.max_search_pages {
            let posts = self.store.source_post_count(SourceMode::Keyword, keyword).await;
            let comments = self
                .store
                .source_comment_count(SourceMode::Keyword, keyword)
                .await;
            if quota_reached(posts, max_posts) {
                tracing::info!("Keyword '{}' reached its post quota ({})", keyword, max_posts);
                break;
            }
            if quota_reached(comments, max_comments) {
                tracing::info!(
                    "Keyword '{}' reached its comment quota ({})",
                    keyword,
                    max_comments
                );
                break;
            }

            let remaining = if max_posts > 0 { max_posts - posts } else { 0 };
            match self.process_page(keyword, page, remaining).await {
                PageScan::Processed(count) => saved += count,
                PageScan::Stop => break,
            }
            self.config.delays.search_page.pause().await;
        }

        tracing::info!("Keyword '{}' done, {} comments saved", keyword, saved);
        saved
    }

    async fn process_page(&self, keyword: &str, page: u32, remaining: usize) -> PageScan {
        tracing::info!("Scanning '{}' page {}", keyword, page);

        let Some(html) = self.api.search_page(keyword, page).await else {
            tracing::warn!("Search page {} for '{}' failed, moving on", page, keyword);
            return PageScan::Processed(0);
        };
        if is_login_wall_html(&html) {
            tracing::error!(
                "{}",
                Error::LoginRequired(format!("search for '{}' redirected to login", keyword))
            );
            return PageScan::Stop;
        }

        let card_ids = parse_card_ids(&html);
        if card_ids.is_empty() {
            tracing::info!("No more results for '{}' at page {}", keyword, page);
            return PageScan::Stop;
        }

        let limit = page_limit(self.config.limits.max_posts_per_search_page, remaining);
        let post_ids = select_post_ids(card_ids, limit);
        let saved = join_tolerant(
            "Post",
            post_ids.iter().map(|post_id| {
                self.processor
                    .process_post_id(post_id, SourceMode::Keyword, keyword)
            }),
        )
        .await;
        PageScan::Processed(saved)
    }
}

fn quota_reached(count: usize, quota: usize) -> bool {
    quota > 0 && count >= quota
}

/// Posts to take from one page: the per-page limit, tightened by what is
/// left of the keyword quota. Zero means no limit.
fn page_limit(per_page: usize, remaining: usize) -> usize {
    match (per_page, remaining) {
        (limit, 0) => limit,
        (0, remaining) => remaining,
        (limit, remaining) => limit.min(remaining),
    }
}

/// Post id of every result card, in page order. Cards without one are
/// skipped.
pub fn parse_card_ids(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&FEED_CARD)
        .filter_map(|card| {
            let mid = card.value().attr("mid").map(str::trim).unwrap_or_default();
            if !mid.is_empty() {
                return Some(mid.to_string());
            }
            card.select(&CARD_LINK)
                .filter_map(|link| link.value().attr("href"))
                .map(|href| extract_post_id_from_url(&absolute_href(href.trim())))
                .find(|post_id| !post_id.is_empty())
        })
        .collect()
}

fn absolute_href(href: &str) -> String {
    if href.starts_with("//") {
        format!("https:{}", href)
    } else if href.starts_with('/') {
        format!("https://weibo.com{}", href)
    } else {
        href.to_string()
    }
}

/// Drop repeated ids and keep at most `limit` (0 keeps all).
pub fn select_post_ids(ids: Vec<String>, limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let unique = ids.into_iter().filter(|id| seen.insert(id.clone()));
    if limit > 0 {
        unique.take(limit).collect()
    } else {
        unique.collect()
    }
}
