//! Rebuilds dedup state from files written by earlier runs.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::media::MediaKey;
use crate::model::json::display;
use crate::model::{CommentKey, PostKey};
use crate::storage::schema::{DataKind, StoreLayout};
use crate::storage::store::StoreState;

/// One persisted row, keyed by column title or JSON field name.
pub type Row = HashMap<String, String>;

/// Records recovered per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryCounts {
    pub posts: usize,
    pub comments: usize,
    pub media: usize,
    pub profiles: usize,
}

/// Read every history file under the text root into `state`.
pub(crate) fn load_history(state: &mut StoreState, layout: &StoreLayout) -> HistoryCounts {
    let mut counts = HistoryCounts::default();

    for path in layout.history_files(&DataKind::Posts.jsonl_file()) {
        for row in read_jsonl_rows(&path) {
            if state.ingest_post(
                field(&row, "post_id"),
                field(&row, "uid"),
                raw_field(&row, "content"),
                field(&row, "source_mode"),
                field(&row, "source_target"),
            ) {
                counts.posts += 1;
            }
        }
    }
    for path in layout.history_files(&DataKind::Posts.csv_file()) {
        for row in read_csv_rows(&path) {
            if state.ingest_post(
                field(&row, "帖子ID"),
                field(&row, "发布者ID"),
                raw_field(&row, "帖子内容"),
                field(&row, "来源模式"),
                field(&row, "来源目标"),
            ) {
                counts.posts += 1;
            }
        }
    }

    for file in [DataKind::Comments.csv_file(), DataKind::Comments.jsonl_file()] {
        for path in layout.history_files(&file) {
            for row in read_rows(&path) {
                if state.ingest_comment(&row) {
                    counts.comments += 1;
                }
            }
        }
    }

    for file in [DataKind::Media.csv_file(), DataKind::Media.jsonl_file()] {
        for path in layout.history_files(&file) {
            for row in read_rows(&path) {
                let url = field(&row, "媒体链接");
                if url.is_empty() {
                    continue;
                }
                let key = MediaKey::new(field(&row, "帖子ID"), field(&row, "媒体类型"), url);
                if state.seen_media.insert(key) {
                    counts.media += 1;
                }
            }
        }
    }

    for (file, uid_field) in [
        (DataKind::Profiles.jsonl_file(), "uid"),
        (DataKind::Profiles.csv_file(), "用户ID"),
    ] {
        for path in layout.history_files(&file) {
            for row in read_rows(&path) {
                let uid = field(&row, uid_field);
                if !uid.is_empty() && state.seen_profiles.insert(uid.to_string()) {
                    counts.profiles += 1;
                }
            }
        }
    }

    counts
}

impl StoreState {
    fn ingest_post(
        &mut self,
        post_id: &str,
        uid: &str,
        content: &str,
        mode: &str,
        target: &str,
    ) -> bool {
        let key = if !post_id.is_empty() {
            PostKey::Id(post_id.to_string())
        } else if !uid.is_empty() && !content.is_empty() {
            PostKey::user_content(uid, content)
        } else {
            return false;
        };

        if !self.seen_posts.insert(key) {
            return false;
        }
        if !mode.is_empty() && !target.is_empty() {
            *self
                .source_post_counts
                .entry((mode.to_string(), target.to_string()))
                .or_default() += 1;
        }
        true
    }

    fn ingest_comment(&mut self, row: &Row) -> bool {
        let post_id = field(row, "帖子ID");
        let key = CommentKey::new(
            post_id,
            field(row, "评论者"),
            raw_field(row, "评论内容"),
            field(row, "评论时间"),
        );
        if !self.seen_comments.insert(key) {
            return false;
        }

        if !post_id.is_empty() {
            *self.post_comment_counts.entry(post_id.to_string()).or_default() += 1;
        }
        let (mode, target) = (field(row, "来源模式"), field(row, "来源目标"));
        if !mode.is_empty() && !target.is_empty() {
            *self
                .source_comment_counts
                .entry((mode.to_string(), target.to_string()))
                .or_default() += 1;
        }
        true
    }
}

fn field<'a>(row: &'a Row, key: &str) -> &'a str {
    raw_field(row, key).trim()
}

fn raw_field<'a>(row: &'a Row, key: &str) -> &'a str {
    row.get(key).map(String::as_str).unwrap_or("")
}

fn read_rows(path: &Path) -> Vec<Row> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("jsonl") => read_jsonl_rows(path),
        _ => read_csv_rows(path),
    }
}

/// Rows of a CSV file keyed by header. Unreadable rows are skipped.
pub fn read_csv_rows(path: &Path) -> Vec<Row> {
    let mut reader = match csv::ReaderBuilder::new().flexible(true).from_path(path) {
        Ok(reader) => reader,
        Err(e) => {
            tracing::warn!("Could not open history file {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    let headers: Vec<String> = match reader.headers() {
        Ok(headers) => headers
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect(),
        Err(e) => {
            tracing::warn!("Unreadable header in {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        match record {
            Ok(record) => rows.push(
                headers
                    .iter()
                    .cloned()
                    .zip(record.iter().map(str::to_string))
                    .collect(),
            ),
            Err(e) => tracing::warn!(
                "Skipping malformed row {} in {}: {}",
                index + 2,
                path.display(),
                e
            ),
        }
    }
    rows
}

/// Objects of a JSONL file with values rendered as text. Bad lines are skipped.
pub fn read_jsonl_rows(path: &Path) -> Vec<Row> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!("Could not read history file {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    let mut rows = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(map)) => {
                rows.push(map.iter().map(|(k, v)| (k.clone(), display(v))).collect())
            }
            Ok(_) => tracing::warn!(
                "Skipping non-object line {} in {}",
                index + 1,
                path.display()
            ),
            Err(e) => tracing::warn!(
                "Skipping malformed line {} in {}: {}",
                index + 1,
                path.display(),
                e
            ),
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn layout(root: &Path) -> StoreLayout {
        let mut config = Config::default();
        config.output.directory = root.to_path_buf();
        StoreLayout::from_config(&config)
    }

    #[test]
    fn test_csv_rows_strip_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posts.csv");
        fs::write(&path, "\u{feff}帖子ID,帖子内容\n1,hello\n2\n").unwrap();

        let rows = read_csv_rows(&path);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("帖子ID").map(String::as_str), Some("1"));
        assert_eq!(rows[1].get("帖子内容"), None);
    }

    #[test]
    fn test_jsonl_rows_skip_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posts.jsonl");
        fs::write(&path, "{\"post_id\":\"1\"}\nnot json\n\n[1]\n{\"post_id\":2}\n").unwrap();

        let rows = read_jsonl_rows(&path);
        let ids: Vec<&str> = rows.iter().map(|r| r["post_id"].as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn test_load_history_counts_and_sources() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(dir.path());
        let keyword_dir = layout.group_dir("keyword");
        fs::create_dir_all(&keyword_dir).unwrap();

        fs::write(
            keyword_dir.join("posts.jsonl"),
            "{\"post_id\":\"1\",\"source_mode\":\"keyword\",\"source_target\":\"猫\"}\n\
             {\"post_id\":\"\",\"uid\":\"9\",\"content\":\"no id\",\"source_mode\":\"keyword\",\"source_target\":\"猫\"}\n",
        )
        .unwrap();
        fs::write(
            keyword_dir.join("posts.csv"),
            "帖子ID,帖子内容,来源模式,来源目标\n1,dup,keyword,猫\n",
        )
        .unwrap();
        fs::write(
            keyword_dir.join("comments.csv"),
            "来源模式,来源目标,帖子ID,评论者,评论内容,评论时间\n\
             keyword,猫,1,甲,好,2026-01-01 00:00:00\n\
             keyword,猫,1,乙,好,2026-01-01 00:00:00\n",
        )
        .unwrap();
        fs::write(
            keyword_dir.join("media.jsonl"),
            "{\"帖子ID\":\"1\",\"媒体类型\":\"image\",\"媒体链接\":\"https://h/a.jpg?sig=1\"}\n\
             {\"帖子ID\":\"1\",\"媒体类型\":\"image\",\"媒体链接\":\"https://h/a.jpg?sig=2\"}\n",
        )
        .unwrap();

        let mut state = StoreState::default();
        let counts = load_history(&mut state, &layout);

        assert_eq!(counts.posts, 2);
        assert_eq!(counts.comments, 2);
        assert_eq!(counts.media, 1);
        let source = ("keyword".to_string(), "猫".to_string());
        assert_eq!(state.source_post_counts.get(&source), Some(&2));
        assert_eq!(state.source_comment_counts.get(&source), Some(&2));
        assert_eq!(state.post_comment_counts.get("1"), Some(&2));
    }

    #[test]
    fn test_csv_post_without_id_is_keyed_by_author() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(dir.path());
        let user_dir = layout.group_dir("user");
        fs::create_dir_all(&user_dir).unwrap();
        fs::write(
            user_dir.join("posts.csv"),
            "\u{feff}来源模式,来源目标,帖子ID,发布者ID,帖子内容\n\
             user,9,,9,no id here\n\
             user,9,,,no author either\n",
        )
        .unwrap();

        let mut state = StoreState::default();
        let counts = load_history(&mut state, &layout);

        assert_eq!(counts.posts, 1);
        assert!(state
            .seen_posts
            .contains(&PostKey::user_content("9", "no id here")));
    }

    #[test]
    fn test_legacy_flat_files_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(dir.path());
        fs::create_dir_all(&layout.text_root).unwrap();
        fs::write(layout.text_root.join("profiles.jsonl"), "{\"uid\":\"42\"}\n").unwrap();

        let mut state = StoreState::default();
        load_history(&mut state, &layout);
        assert!(state.seen_profiles.contains("42"));
    }
}
