//! Comment entity and IP-location normalization.

use serde_json::{Map, Value};

use crate::config::SourceMode;
use crate::model::json::{display, first_text, text_of};
use crate::model::post::{Post, UNKNOWN_USER};
use crate::model::text::{clean_html, parse_relative_time, prefix_chars};

/// Marker prepended to nested reply content.
pub const REPLY_PREFIX: &str = "[回复] ";

/// Characters of content used in the dedup key.
const KEY_CONTENT_CHARS: usize = 120;

/// Keys that may carry the commenter's IP location.
const IP_KEYS: &[&str] = &[
    "ip_location",
    "ipLocation",
    "region_name",
    "regionName",
    "location",
    "source_location",
    "sourceLocation",
    "source",
];

/// Subset of [`IP_KEYS`] that may appear on the commenter object.
const USER_IP_KEYS: &[&str] = &[
    "ip_location",
    "ipLocation",
    "region_name",
    "regionName",
    "location",
];

const IP_CONTAINERS: &[&str] = &["extensions", "ext", "extra"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentLevel {
    TopLevel,
    Nested,
}

impl CommentLevel {
    /// Persisted label.
    pub fn label(&self) -> &'static str {
        match self {
            CommentLevel::TopLevel => "主评论",
            CommentLevel::Nested => "楼中楼",
        }
    }
}

/// A comment attached to a post.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub source_mode: SourceMode,
    pub source_target: String,
    pub post_id: String,
    pub post_url: String,
    pub post_title: String,
    pub post_author: String,
    pub post_time: String,
    pub commenter_name: String,
    pub ip_location: String,
    pub content: String,
    pub comment_time: String,
    pub level: CommentLevel,
}

/// Identity of a comment: post, commenter, content head and time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommentKey {
    pub post_id: String,
    pub commenter: String,
    pub content_head: String,
    pub time: String,
}

impl CommentKey {
    pub fn new(post_id: &str, commenter: &str, content: &str, time: &str) -> Self {
        Self {
            post_id: post_id.to_string(),
            commenter: commenter.to_string(),
            content_head: prefix_chars(content, KEY_CONTENT_CHARS),
            time: time.to_string(),
        }
    }
}

impl Comment {
    /// Column titles of the comments CSV, also the JSONL keys.
    pub const COLUMNS: &'static [&'static str] = &[
        "来源模式",
        "来源目标",
        "帖子ID",
        "帖子链接",
        "帖子标题",
        "帖子发布者",
        "帖子发布时间",
        "评论者",
        "评论IP属地",
        "评论内容",
        "评论时间",
        "评论层级",
    ];

    /// Build a comment from one API item. Nested replies get [`REPLY_PREFIX`].
    pub fn from_api(item: &Value, post: &Post, level: CommentLevel) -> Self {
        let user = item
            .get("user")
            .filter(|u| u.is_object())
            .unwrap_or(&Value::Null);

        let commenter_name = match text_of(user.get("screen_name")) {
            name if name.is_empty() => UNKNOWN_USER.to_string(),
            name => name,
        };

        let mut content = clean_html(&first_text(item, &["text_raw", "text"]));
        if level == CommentLevel::Nested && !content.is_empty() {
            content = format!("{}{}", REPLY_PREFIX, content);
        }

        let created_at = item.get("created_at").map(display).unwrap_or_default();

        Self {
            source_mode: post.source_mode,
            source_target: post.source_target.clone(),
            post_id: post.post_id.clone(),
            post_url: post.post_url.clone(),
            post_title: post.title(),
            post_author: post.user_name.clone(),
            post_time: post.post_time.clone(),
            commenter_name,
            ip_location: extract_ip_location(item),
            content,
            comment_time: parse_relative_time(&created_at),
            level,
        }
    }

    /// Whether the record carries text worth saving.
    pub fn has_content(&self) -> bool {
        !self.content.is_empty() && self.content != REPLY_PREFIX
    }

    pub fn dedup_key(&self) -> CommentKey {
        CommentKey::new(
            &self.post_id,
            &self.commenter_name,
            &self.content,
            &self.comment_time,
        )
    }

    /// CSV cells in [`Comment::COLUMNS`] order.
    pub fn csv_row(&self) -> Vec<String> {
        vec![
            self.source_mode.to_string(),
            self.source_target.clone(),
            self.post_id.clone(),
            self.post_url.clone(),
            self.post_title.clone(),
            self.post_author.clone(),
            self.post_time.clone(),
            self.commenter_name.clone(),
            self.ip_location.clone(),
            self.content.clone(),
            self.comment_time.clone(),
            self.level.label().to_string(),
        ]
    }

    /// JSONL object keyed by the CSV column titles.
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = Self::COLUMNS
            .iter()
            .zip(self.csv_row())
            .map(|(column, cell)| (column.to_string(), Value::String(cell)))
            .collect();
        Value::Object(map)
    }
}

/// First normalizable IP location among the known keys.
pub fn extract_ip_location(item: &Value) -> String {
    let mut candidates: Vec<&Value> = IP_KEYS.iter().filter_map(|k| item.get(*k)).collect();

    if let Some(user) = item.get("user").filter(|u| u.is_object()) {
        candidates.extend(USER_IP_KEYS.iter().filter_map(|k| user.get(*k)));
    }

    for container in IP_CONTAINERS {
        if let Some(inner) = item.get(*container).filter(|c| c.is_object()) {
            candidates.extend(IP_KEYS.iter().filter_map(|k| inner.get(*k)));
        }
    }

    candidates
        .into_iter()
        .map(|value| normalize_ip_location(&text_of(Some(value))))
        .find(|normalized| !normalized.is_empty())
        .unwrap_or_default()
}

/// Normalize an IP location label to `IP属地 <place>`, or empty when unrecognized.
pub fn normalize_ip_location(raw: &str) -> String {
    let text = clean_html(raw);
    if text.is_empty() {
        return String::new();
    }

    let compact = collapse_whitespace(&text.replace('\u{a0}', " ")).replace('：', ":");

    if let Some(idx) = compact.find("IP属地") {
        let tail = compact[idx..].replace("IP属地:", "IP属地 ");
        return collapse_whitespace(&tail);
    }

    if compact.to_lowercase().starts_with("ip location") {
        let tail = match compact.split_once(':') {
            Some((_, rest)) => rest.trim().to_string(),
            None => compact
                .get("ip location".len()..)
                .unwrap_or_default()
                .trim()
                .to_string(),
        };
        if !tail.is_empty() {
            return format!("IP属地 {}", tail);
        }
    }

    for prefix in ["发布于", "来自"] {
        if let Some(rest) = compact.strip_prefix(prefix) {
            let tail = rest.trim();
            if !tail.is_empty() {
                return format!("IP属地 {}", tail);
            }
        }
    }

    String::new()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
