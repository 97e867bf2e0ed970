//! User profile entity.
//!
//! Profile responses nest the user object differently per endpoint, so every
//! field is picked from the scopes `[user, data, root]`: direct keys first,
//! then a recursive search of each scope.

use chrono::Local;
use serde::Serialize;
use serde_json::Value;

use crate::model::json::{display, is_truthy, walk_for_key};
use crate::model::text::{parse_count, TIMESTAMP_FORMAT};

const YESTERDAY_POSTS_KEYS: &[&str] = &[
    "yesterday_statuses_count",
    "yesterday_mblog_count",
    "yesterday_post_count",
    "statuses_yesterday_count",
];

const YESTERDAY_READS_KEYS: &[&str] = &[
    "yesterday_read_count",
    "yesterday_read_num",
    "read_count_yesterday",
];

const YESTERDAY_INTERACTIONS_KEYS: &[&str] = &[
    "yesterday_interaction_count",
    "yesterday_interact_count",
    "interaction_count",
    "interact_count",
];

const VIDEO_PLAYS_KEYS: &[&str] = &[
    "video_play_count_total",
    "video_total_play_count",
    "video_play_count",
    "video_play_total",
    "video_play_num",
];

/// A user's public profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub uid: String,
    pub screen_name: String,
    pub gender: String,
    pub followers_count: i64,
    pub follow_count: i64,
    pub statuses_count: i64,
    pub verified: bool,
    pub description: String,
    pub location: String,
    pub avatar_url: String,
    pub cover_image_url: String,
    pub verified_reason: String,
    pub yesterday_posts_count: i64,
    pub yesterday_read_count: i64,
    pub yesterday_interaction_count: i64,
    pub video_play_count: i64,
    pub profile_url: String,
    pub source_target: String,
    pub crawled_at: String,
}

impl Profile {
    /// Column titles of the profiles CSV.
    pub const COLUMNS: &'static [&'static str] = &[
        "用户ID",
        "昵称",
        "性别",
        "粉丝数",
        "关注数",
        "微博数",
        "是否认证",
        "简介",
        "地区",
        "头像链接",
        "封面链接",
        "认证说明",
        "昨日发博数",
        "昨日阅读数",
        "昨日互动数",
        "视频累计播放量",
        "主页链接",
        "来源目标",
        "抓取时间",
    ];

    /// Build a profile from a `profile/info` response (or any user object).
    pub fn from_api(payload: &Value, source_target: &str) -> Self {
        let root = if payload.is_object() {
            payload
        } else {
            &Value::Null
        };
        let data = root.get("data").filter(|d| d.is_object()).unwrap_or(&Value::Null);

        let user = [
            root.get("user"),
            data.get("user"),
            data.get("userInfo"),
        ]
        .into_iter()
        .flatten()
        .find(|u| u.is_object())
        .unwrap_or(root);

        let scopes = [user, data, root];
        let uid = pick_str(&scopes, &["idstr", "id"]);
        let profile_url = if uid.is_empty() {
            String::new()
        } else {
            format!("https://weibo.com/u/{}", uid)
        };

        Self {
            screen_name: pick_str(&scopes, &["screen_name", "name"]),
            gender: pick_str(&scopes, &["gender"]),
            followers_count: pick_int(&scopes, &["followers_count", "fans_count", "followers"]),
            follow_count: pick_int(&scopes, &["friends_count", "follow_count", "following_count"]),
            statuses_count: pick_int(&scopes, &["statuses_count", "mblog_num", "weibo_count"]),
            verified: user.get("verified").map(is_truthy).unwrap_or(false),
            description: pick_str(&scopes, &["description", "desc"]),
            location: pick_str(&scopes, &["location"]),
            avatar_url: pick_str(&scopes, &["avatar_hd", "avatar_large", "avatar_url"]),
            cover_image_url: pick_str(
                &scopes,
                &["cover_image_phone", "cover_image_hd", "cover_image"],
            ),
            verified_reason: pick_str(&scopes, &["verified_reason"]),
            yesterday_posts_count: pick_int(&scopes, YESTERDAY_POSTS_KEYS),
            yesterday_read_count: pick_int(&scopes, YESTERDAY_READS_KEYS),
            yesterday_interaction_count: pick_int(&scopes, YESTERDAY_INTERACTIONS_KEYS),
            video_play_count: pick_int(&scopes, VIDEO_PLAYS_KEYS),
            source_target: source_target.to_string(),
            crawled_at: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            uid,
            profile_url,
        }
    }

    /// JSONL object with English field names.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// CSV cells in [`Profile::COLUMNS`] order.
    pub fn csv_row(&self) -> Vec<String> {
        vec![
            self.uid.clone(),
            self.screen_name.clone(),
            self.gender.clone(),
            self.followers_count.to_string(),
            self.follow_count.to_string(),
            self.statuses_count.to_string(),
            if self.verified { "True" } else { "False" }.to_string(),
            self.description.clone(),
            self.location.clone(),
            self.avatar_url.clone(),
            self.cover_image_url.clone(),
            self.verified_reason.clone(),
            self.yesterday_posts_count.to_string(),
            self.yesterday_read_count.to_string(),
            self.yesterday_interaction_count.to_string(),
            self.video_play_count.to_string(),
            self.profile_url.clone(),
            self.source_target.clone(),
            self.crawled_at.clone(),
        ]
    }
}

fn is_blank(value: &Value) -> bool {
    matches!(value, Value::Null) || value.as_str() == Some("")
}

fn pick_str(scopes: &[&Value], keys: &[&str]) -> String {
    let direct = scopes
        .iter()
        .copied()
        .flat_map(|scope| keys.iter().filter_map(move |key| scope.get(*key)))
        .find(|v| !is_blank(v));
    if let Some(value) = direct {
        return display(value).trim().to_string();
    }

    for scope in scopes.iter().copied().filter(|s| s.is_object()) {
        for key in keys {
            let mut found = Vec::new();
            walk_for_key(scope, key, &mut found);
            if let Some(value) = found.into_iter().find(|v| !is_blank(v)) {
                return display(value).trim().to_string();
            }
        }
    }

    String::new()
}

fn pick_int(scopes: &[&Value], keys: &[&str]) -> i64 {
    let direct = scopes
        .iter()
        .copied()
        .flat_map(|scope| keys.iter().filter_map(move |key| scope.get(*key)))
        .map(parse_count)
        .find(|n| *n > 0);
    if let Some(n) = direct {
        return n;
    }

    for scope in scopes.iter().copied().filter(|s| s.is_object()) {
        for key in keys {
            let mut found = Vec::new();
            walk_for_key(scope, key, &mut found);
            if let Some(n) = found.into_iter().map(parse_count).find(|n| *n > 0) {
                return n;
            }
        }
    }

    0
}
