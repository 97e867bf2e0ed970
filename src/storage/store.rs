//! Dedup-aware record store with per-source quotas.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::config::{Config, SourceMode};
use crate::error::Result;
use crate::media::{MediaKey, MediaRecord};
use crate::model::{Comment, CommentKey, Post, PostKey, Profile};
use crate::storage::history::{load_history, HistoryCounts};
use crate::storage::schema::{DataKind, StoreLayout, OUTPUT_GROUPS};
use crate::storage::writer::{
    lock_sink, BackgroundWriter, CsvBatch, JsonBatch, SinkWriter, WritePayload,
    WRITER_BATCH_SIZE, WRITER_FLUSH_INTERVAL,
};

/// Output group for profile records.
const PROFILE_GROUP: &str = "user";

type SourceKey = (String, String);

/// Quotas applied at save time. Zero means unlimited.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreLimits {
    pub max_posts_per_keyword: usize,
    pub max_comments_per_keyword: usize,
    pub max_comments_per_post: usize,
}

impl StoreLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_posts_per_keyword: config.limits.max_posts_per_keyword,
            max_comments_per_keyword: config.limits.max_comments_per_keyword,
            max_comments_per_post: config.limits.max_comments_per_post,
        }
    }

    fn posts_for_source(&self, mode: &str) -> Option<usize> {
        (mode == SourceMode::Keyword.as_str() && self.max_posts_per_keyword > 0)
            .then_some(self.max_posts_per_keyword)
    }

    fn comments_for_source(&self, mode: &str) -> Option<usize> {
        (mode == SourceMode::Keyword.as_str() && self.max_comments_per_keyword > 0)
            .then_some(self.max_comments_per_keyword)
    }

    fn comments_per_post(&self) -> Option<usize> {
        (self.max_comments_per_post > 0).then_some(self.max_comments_per_post)
    }
}

/// Records accepted during this run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreTotals {
    pub posts: usize,
    pub comments: usize,
    pub media: usize,
    pub profiles: usize,
}

/// Everything the store remembers. Guarded by one lock.
#[derive(Debug, Default)]
pub(crate) struct StoreState {
    pub(crate) seen_posts: HashSet<PostKey>,
    pub(crate) seen_comments: HashSet<CommentKey>,
    pub(crate) seen_media: HashSet<MediaKey>,
    pub(crate) seen_profiles: HashSet<String>,
    pub(crate) source_post_counts: HashMap<SourceKey, usize>,
    pub(crate) source_comment_counts: HashMap<SourceKey, usize>,
    pub(crate) post_comment_counts: HashMap<String, usize>,
    totals: StoreTotals,
    recent_post_urls: Vec<String>,
    recent_user_ids: Vec<String>,
}

impl StoreState {
    fn remember_recent(&mut self, post_url: &str, uid: &str) {
        if !post_url.is_empty() && !self.recent_post_urls.iter().any(|u| u == post_url) {
            self.recent_post_urls.push(post_url.to_string());
        }
        if !uid.is_empty() && !self.recent_user_ids.iter().any(|u| u == uid) {
            self.recent_user_ids.push(uid.to_string());
        }
    }
}

/// The single owner of persisted output.
///
/// Every save checks dedup keys and quotas, writes (or queues) the rows and
/// only then updates its counters, all under one lock, so concurrent savers
/// never overshoot a quota or write a record twice.
pub struct RecordStore {
    layout: StoreLayout,
    limits: StoreLimits,
    state: tokio::sync::Mutex<StoreState>,
    sink: Arc<Mutex<SinkWriter>>,
    writer: Mutex<Option<BackgroundWriter>>,
}

impl RecordStore {
    pub fn new(config: &Config) -> Self {
        Self::with_parts(StoreLayout::from_config(config), StoreLimits::from_config(config))
    }

    pub fn with_parts(layout: StoreLayout, limits: StoreLimits) -> Self {
        Self {
            layout,
            limits,
            state: tokio::sync::Mutex::new(StoreState::default()),
            sink: Arc::new(Mutex::new(SinkWriter::new())),
            writer: Mutex::new(None),
        }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Create the output tree and rebuild dedup state from earlier runs.
    pub async fn load_history(&self) -> Result<HistoryCounts> {
        fs::create_dir_all(&self.layout.text_root)?;
        fs::create_dir_all(&self.layout.media_root)?;

        let mut state = self.state.lock().await;
        let counts = load_history(&mut state, &self.layout);
        tracing::info!(
            "Loaded history: {} posts, {} comments, {} media, {} profiles",
            counts.posts,
            counts.comments,
            counts.media,
            counts.profiles
        );
        Ok(counts)
    }

    /// Start the background writer. Saves queue their rows from now on.
    pub fn start_writer(&self) {
        let mut writer = self.writer_slot();
        if writer.as_ref().is_some_and(BackgroundWriter::is_active) {
            return;
        }
        *writer = Some(BackgroundWriter::spawn(Arc::clone(&self.sink)));
        tracing::info!(
            "Storage writer started: batch={}, flush={}ms",
            WRITER_BATCH_SIZE,
            WRITER_FLUSH_INTERVAL.as_millis()
        );
    }

    /// Drain the queue and stop the writer. Later saves write inline.
    pub async fn stop_writer(&self) {
        let writer = self.writer_slot().take();
        if let Some(writer) = writer {
            writer.stop().await;
            tracing::info!("Storage writer stopped, queue drained");
        }
    }

    /// Save one post. False for duplicates, quota hits and write failures.
    pub async fn save_post(&self, post: &Post) -> bool {
        if post.post_id.is_empty() && post.content.is_empty() {
            return false;
        }

        let mut state = self.state.lock().await;
        let key = post.dedup_key();
        if state.seen_posts.contains(&key) {
            return false;
        }

        let source = (post.source_mode.as_str().to_string(), post.source_target.clone());
        if let Some(limit) = self.limits.posts_for_source(&source.0) {
            if state.source_post_counts.get(&source).copied().unwrap_or(0) >= limit {
                return false;
            }
        }

        let payload = self.payload(
            DataKind::Posts,
            post.source_mode.output_group(),
            vec![post.csv_row()],
            vec![post.to_json()],
        );
        if !self.dispatch(vec![payload]) {
            return false;
        }

        state.seen_posts.insert(key);
        *state.source_post_counts.entry(source).or_default() += 1;
        state.totals.posts += 1;
        state.remember_recent(&post.post_url, &post.uid);
        true
    }

    /// Save a batch of comments. Returns how many were accepted.
    ///
    /// Duplicates (within the batch and across runs) are dropped, then the
    /// per-source and per-post quotas are applied in order.
    pub async fn save_comments(&self, records: &[Comment]) -> usize {
        if records.is_empty() {
            return 0;
        }

        let mut state = self.state.lock().await;
        let accepted = self.apply_comment_limits(&state, records);
        if accepted.is_empty() {
            return 0;
        }

        let mut groups: Vec<(&'static str, Vec<&Comment>)> = Vec::new();
        for comment in &accepted {
            let group = comment.source_mode.output_group();
            match groups.iter_mut().find(|(g, _)| *g == group) {
                Some((_, members)) => members.push(comment),
                None => groups.push((group, vec![comment])),
            }
        }

        let payloads = groups
            .into_iter()
            .map(|(group, members)| {
                self.payload(
                    DataKind::Comments,
                    group,
                    members.iter().map(|c| c.csv_row()).collect(),
                    members.iter().map(|c| c.to_json()).collect(),
                )
            })
            .collect();
        if !self.dispatch(payloads) {
            return 0;
        }

        for comment in &accepted {
            state.seen_comments.insert(comment.dedup_key());
            *state
                .source_comment_counts
                .entry((comment.source_mode.as_str().to_string(), comment.source_target.clone()))
                .or_default() += 1;
            if !comment.post_id.is_empty() {
                *state
                    .post_comment_counts
                    .entry(comment.post_id.clone())
                    .or_default() += 1;
            }
            state.remember_recent(&comment.post_url, "");
        }
        state.totals.comments += accepted.len();
        accepted.len()
    }

    fn apply_comment_limits<'a>(&self, state: &StoreState, records: &'a [Comment]) -> Vec<&'a Comment> {
        let mut batch_keys = HashSet::new();
        let mut source_counts: HashMap<SourceKey, usize> = HashMap::new();
        let mut post_counts: HashMap<&str, usize> = HashMap::new();
        let mut accepted = Vec::new();

        for comment in records {
            let key = comment.dedup_key();
            if state.seen_comments.contains(&key) || batch_keys.contains(&key) {
                continue;
            }

            let source = (comment.source_mode.as_str().to_string(), comment.source_target.clone());
            let source_count = *source_counts
                .entry(source.clone())
                .or_insert_with(|| state.source_comment_counts.get(&source).copied().unwrap_or(0));
            if let Some(limit) = self.limits.comments_for_source(&source.0) {
                if source_count >= limit {
                    continue;
                }
            }

            let post_id = comment.post_id.as_str();
            if !post_id.is_empty() {
                let post_count = *post_counts
                    .entry(post_id)
                    .or_insert_with(|| state.post_comment_counts.get(post_id).copied().unwrap_or(0));
                if let Some(limit) = self.limits.comments_per_post() {
                    if post_count >= limit {
                        continue;
                    }
                }
                *post_counts.entry(post_id).or_default() += 1;
            }

            *source_counts.entry(source).or_default() += 1;
            batch_keys.insert(key);
            accepted.push(comment);
        }

        accepted
    }

    /// Drop numbered records whose media is already on record.
    pub async fn unseen_media(
        &self,
        records: Vec<(usize, MediaRecord)>,
    ) -> Vec<(usize, MediaRecord)> {
        let state = self.state.lock().await;
        records
            .into_iter()
            .filter(|(_, r)| !state.seen_media.contains(&r.dedup_key()))
            .collect()
    }

    /// Save settled media records. Returns how many were accepted.
    pub async fn save_media(&self, records: &[MediaRecord]) -> usize {
        let mut state = self.state.lock().await;

        let mut batch_keys = HashSet::new();
        let accepted: Vec<&MediaRecord> = records
            .iter()
            .filter(|r| !r.media_url.is_empty())
            .filter(|r| {
                let key = r.dedup_key();
                !state.seen_media.contains(&key) && batch_keys.insert(key)
            })
            .collect();
        if accepted.is_empty() {
            return 0;
        }

        let mut groups: Vec<(&'static str, Vec<&MediaRecord>)> = Vec::new();
        for record in &accepted {
            let group = record.source_mode.output_group();
            match groups.iter_mut().find(|(g, _)| *g == group) {
                Some((_, members)) => members.push(record),
                None => groups.push((group, vec![record])),
            }
        }

        let payloads = groups
            .into_iter()
            .map(|(group, members)| {
                self.payload(
                    DataKind::Media,
                    group,
                    members.iter().map(|r| r.csv_row()).collect(),
                    members.iter().map(|r| r.to_json()).collect(),
                )
            })
            .collect();
        if !self.dispatch(payloads) {
            return 0;
        }

        for record in &accepted {
            state.seen_media.insert(record.dedup_key());
            state.remember_recent(&record.post_url, "");
        }
        state.totals.media += accepted.len();
        accepted.len()
    }

    /// Save a profile. The first record per uid wins.
    pub async fn save_profile(&self, profile: &Profile) -> bool {
        if profile.uid.is_empty() {
            return false;
        }

        let mut state = self.state.lock().await;
        if state.seen_profiles.contains(&profile.uid) {
            return false;
        }

        let payload = self.payload(
            DataKind::Profiles,
            PROFILE_GROUP,
            vec![profile.csv_row()],
            vec![profile.to_json()],
        );
        if !self.dispatch(vec![payload]) {
            return false;
        }

        state.seen_profiles.insert(profile.uid.clone());
        state.totals.profiles += 1;
        state.remember_recent("", &profile.uid);
        true
    }

    pub async fn source_post_count(&self, mode: SourceMode, target: &str) -> usize {
        let state = self.state.lock().await;
        state
            .source_post_counts
            .get(&(mode.as_str().to_string(), target.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub async fn source_comment_count(&self, mode: SourceMode, target: &str) -> usize {
        let state = self.state.lock().await;
        state
            .source_comment_counts
            .get(&(mode.as_str().to_string(), target.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Comments stored for a post, across runs.
    pub async fn post_comment_count(&self, post_id: &str) -> usize {
        let state = self.state.lock().await;
        state.post_comment_counts.get(post_id).copied().unwrap_or(0)
    }

    pub async fn totals(&self) -> StoreTotals {
        self.state.lock().await.totals
    }

    /// Most recent post URLs touched this run, oldest first.
    pub async fn recent_post_urls(&self, limit: usize) -> Vec<String> {
        let state = self.state.lock().await;
        tail(&state.recent_post_urls, limit)
    }

    /// Most recent user ids touched this run, oldest first.
    pub async fn recent_user_ids(&self, limit: usize) -> Vec<String> {
        let state = self.state.lock().await;
        tail(&state.recent_user_ids, limit)
    }

    /// Output locations worth reporting, as labelled absolute paths.
    pub fn output_summary(&self) -> Vec<(String, PathBuf)> {
        let mut summary = vec![("text_dir".to_string(), absolute(&self.layout.text_root))];
        for group in OUTPUT_GROUPS {
            let dir = self.layout.group_dir(group);
            if dir.exists() {
                summary.push((format!("text_{}", group), absolute(&dir)));
            }
        }
        summary.push(("media_files".to_string(), absolute(&self.layout.media_root)));
        summary
    }

    fn payload(
        &self,
        kind: DataKind,
        group: &str,
        csv_rows: Vec<Vec<String>>,
        json_rows: Vec<Value>,
    ) -> WritePayload {
        let format = self.layout.format;
        WritePayload {
            csv: format.writes_csv().then(|| CsvBatch {
                path: self.layout.csv_path(group, kind),
                columns: kind.columns(),
                rows: csv_rows,
            }),
            json: format.writes_json().then(|| JsonBatch {
                path: self.layout.jsonl_path(group, kind),
                rows: json_rows,
            }),
        }
    }

    /// Queue payloads on the writer, or write them now if it is not running.
    fn dispatch(&self, payloads: Vec<WritePayload>) -> bool {
        let writer = self.writer_slot();
        for payload in payloads {
            let payload = match writer.as_ref().filter(|w| w.is_active()) {
                Some(active) => match active.enqueue(payload) {
                    Ok(()) => continue,
                    Err(returned) => returned,
                },
                None => payload,
            };
            if !lock_sink(&self.sink).write_payload(&payload) {
                return false;
            }
        }
        true
    }

    fn writer_slot(&self) -> std::sync::MutexGuard<'_, Option<BackgroundWriter>> {
        self.writer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn tail(items: &[String], limit: usize) -> Vec<String> {
    items[items.len().saturating_sub(limit)..].to_vec()
}

fn absolute(path: &std::path::Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
