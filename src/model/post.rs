//! Post entity built from a status payload.

use serde::Serialize;
use serde_json::{json, Value};

use crate::config::SourceMode;
use crate::model::json::{display, first_text, is_truthy, text_of};
use crate::model::text::{clean_html, parse_count, parse_relative_time, prefix_chars, truncate_chars};

/// Author name used when a payload carries none.
pub const UNKNOWN_USER: &str = "未知用户";

/// Characters of content kept in the title.
const TITLE_CHARS: usize = 40;

/// Characters of content used in the fallback dedup key.
const KEY_CONTENT_CHARS: usize = 80;

/// A resolved Weibo post.
#[derive(Debug, Clone, Serialize)]
pub struct Post {
    pub post_id: String,
    pub mid: String,
    pub uid: String,
    pub user_name: String,
    pub author_verified: bool,
    pub content: String,
    pub post_time: String,
    pub source_mode: SourceMode,
    pub source_target: String,
    pub reposts_count: i64,
    pub comments_count: i64,
    pub attitudes_count: i64,
    pub post_url: String,
    pub raw_status: Value,
}

/// Identity of a post across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PostKey {
    Id(String),
    UserContent(String),
}

impl PostKey {
    /// Key for a post without id: author plus the head of its content.
    pub fn user_content(uid: &str, content: &str) -> Self {
        PostKey::UserContent(format!("{}:{}", uid, prefix_chars(content, KEY_CONTENT_CHARS)))
    }
}

impl Post {
    /// Column titles of the posts CSV.
    pub const COLUMNS: &'static [&'static str] = &[
        "来源模式",
        "来源目标",
        "帖子ID",
        "帖子链接",
        "帖子发布者",
        "发布者ID",
        "是否带V",
        "帖子发布时间",
        "转发量",
        "评论量",
        "点赞量",
        "帖子标题",
        "帖子内容",
    ];

    /// Build a post from a status object. Missing fields fall back to defaults.
    pub fn from_status(status: &Value, source_mode: SourceMode, source_target: &str) -> Self {
        let user = status
            .get("user")
            .filter(|u| u.is_object())
            .unwrap_or(&Value::Null);

        let post_id = first_text(status, &["idstr", "id"]);
        let mid = match text_of(status.get("mid")) {
            mid if mid.is_empty() => post_id.clone(),
            mid => mid,
        };
        let uid = first_text(user, &["idstr", "id"]);

        let user_name = [user.get("screen_name"), user.get("name"), status.get("user_name")]
            .into_iter()
            .flatten()
            .find(|v| is_truthy(v))
            .map(display)
            .unwrap_or_else(|| UNKNOWN_USER.to_string());

        let content = clean_html(&first_text(status, &["text_raw", "text"]));
        let created_at = status.get("created_at").map(display).unwrap_or_default();
        let post_url = Self::build_post_url(&uid, &post_id);

        Self {
            author_verified: author_is_verified(user),
            post_time: parse_relative_time(&created_at),
            reposts_count: parse_count(status.get("reposts_count").unwrap_or(&Value::Null)),
            comments_count: parse_count(status.get("comments_count").unwrap_or(&Value::Null)),
            attitudes_count: parse_count(status.get("attitudes_count").unwrap_or(&Value::Null)),
            raw_status: if status.is_object() {
                status.clone()
            } else {
                json!({})
            },
            post_id,
            mid,
            uid,
            user_name,
            content,
            source_mode,
            source_target: source_target.to_string(),
            post_url,
        }
    }

    /// Canonical post URL.
    pub fn build_post_url(uid: &str, post_id: &str) -> String {
        match (uid.is_empty(), post_id.is_empty()) {
            (false, false) => format!("https://weibo.com/{}/{}", uid, post_id),
            (true, false) => format!("https://weibo.com/detail/{}", post_id),
            _ => String::new(),
        }
    }

    /// First 40 characters of the content.
    pub fn title(&self) -> String {
        truncate_chars(&self.content, TITLE_CHARS)
    }

    pub fn dedup_key(&self) -> PostKey {
        if self.post_id.is_empty() {
            PostKey::user_content(&self.uid, &self.content)
        } else {
            PostKey::Id(self.post_id.clone())
        }
    }

    /// JSONL object: every field plus the derived title.
    pub fn to_json(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| json!({}));
        if let Value::Object(map) = &mut value {
            map.insert("title".to_string(), Value::String(self.title()));
        }
        value
    }

    /// CSV cells in [`Post::COLUMNS`] order.
    pub fn csv_row(&self) -> Vec<String> {
        vec![
            self.source_mode.to_string(),
            self.source_target.clone(),
            self.post_id.clone(),
            self.post_url.clone(),
            self.user_name.clone(),
            self.uid.clone(),
            if self.author_verified { "是" } else { "否" }.to_string(),
            self.post_time.clone(),
            self.reposts_count.to_string(),
            self.comments_count.to_string(),
            self.attitudes_count.to_string(),
            self.title(),
            self.content.clone(),
        ]
    }
}

/// `verified`, a non-negative `verified_type`, or a verification reason.
fn author_is_verified(user: &Value) -> bool {
    if user.get("verified").map(is_truthy).unwrap_or(false) {
        return true;
    }

    let type_is_verified = match user.get("verified_type") {
        Some(Value::Number(n)) => n.as_f64().map(|f| f.trunc() >= 0.0).unwrap_or(false),
        Some(Value::String(s)) => s.trim().parse::<i64>().map(|t| t >= 0).unwrap_or(false),
        Some(Value::Bool(_)) => true,
        _ => false,
    };
    if type_is_verified {
        return true;
    }

    !text_of(user.get("verified_reason")).trim().is_empty()
}
