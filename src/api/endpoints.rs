//! Weibo endpoints and response shape helpers.

use std::sync::Arc;

use serde_json::Value;

use crate::api::transport::Transport;
use crate::model::json::{array_at, display, is_truthy, text_of};

pub const COMMENTS_API: &str = "https://weibo.com/ajax/statuses/buildComments";
pub const POST_DETAIL_API: &str = "https://weibo.com/ajax/statuses/show";
pub const SEARCH_URL: &str = "https://s.weibo.com/weibo";
pub const PROFILE_API: &str = "https://weibo.com/ajax/profile/info";

/// Timeline endpoints, tried in order until one returns statuses.
pub const TIMELINE_APIS: [&str; 3] = [
    "https://weibo.com/ajax/statuses/mymblog",
    "https://weibo.com/ajax/profile/getWaterFallContent",
    "https://weibo.com/ajax/profile/getProfileFeed",
];

/// Host of the login page every wall redirects to.
const LOGIN_HOST: &str = "passport.weibo.com";

/// Comments requested per page.
const COMMENT_PAGE_SIZE: &str = "20";

/// How a user target is looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserLookup {
    Uid(String),
    Custom(String),
}

/// Typed access to the endpoints the harvester uses.
#[derive(Clone)]
pub struct WeiboApi {
    transport: Arc<dyn Transport>,
}

impl WeiboApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// Status object of a post. `{"data": {...}}` wrappers are removed.
    pub async fn post_detail(&self, post_id: &str) -> Option<Value> {
        let data = self
            .transport
            .get_json(POST_DETAIL_API, &[("id", post_id.to_string())])
            .await?;
        if !is_truthy(&data) {
            return None;
        }
        match data.get("data") {
            Some(inner) if inner.is_object() => Some(inner.clone()),
            _ => Some(data),
        }
    }

    /// One page of top-level comments.
    pub async fn comment_page(&self, post_id: &str, uid: &str, cursor: Option<&str>) -> Option<Value> {
        let mut params = vec![
            ("flow", "0".to_string()),
            ("is_reload", "1".to_string()),
            ("id", post_id.to_string()),
            ("is_show_bulletin", "2".to_string()),
            ("is_mix", "0".to_string()),
            ("count", COMMENT_PAGE_SIZE.to_string()),
            ("uid", uid.to_string()),
            ("fetch_level", "0".to_string()),
            ("locale", "zh-CN".to_string()),
        ];
        if let Some(cursor) = cursor {
            params.push(("max_id", cursor.to_string()));
        }
        self.transport.get_json(COMMENTS_API, &params).await
    }

    /// One page of replies under a top-level comment.
    pub async fn nested_comment_page(
        &self,
        comment_id: &str,
        uid: &str,
        first_page: bool,
        cursor: Option<&str>,
    ) -> Option<Value> {
        let mut params = vec![
            ("is_reload", if first_page { "1" } else { "0" }.to_string()),
            ("id", comment_id.to_string()),
            ("is_show_bulletin", "2".to_string()),
            ("is_mix", "1".to_string()),
            ("fetch_level", "1".to_string()),
            ("count", COMMENT_PAGE_SIZE.to_string()),
            ("uid", uid.to_string()),
            ("locale", "zh-CN".to_string()),
        ];
        if let Some(cursor) = cursor {
            params.push(("max_id", cursor.to_string()));
        }
        self.transport.get_json(COMMENTS_API, &params).await
    }

    /// HTML of one search result page.
    pub async fn search_page(&self, keyword: &str, page: u32) -> Option<String> {
        self.transport
            .get_html(
                SEARCH_URL,
                &[("q", keyword.to_string()), ("page", page.to_string())],
            )
            .await
    }

    pub async fn profile_info(&self, lookup: &UserLookup) -> Option<Value> {
        let params = match lookup {
            UserLookup::Uid(uid) => [("uid", uid.clone())],
            UserLookup::Custom(name) => [("custom", name.clone())],
        };
        self.transport
            .get_json(PROFILE_API, &params)
            .await
            .filter(is_truthy)
    }

    /// Statuses of one timeline page from the first endpoint that has any.
    pub async fn timeline_page(&self, uid: &str, page: u32) -> Vec<Value> {
        let params = [("uid", uid.to_string()), ("page", page.to_string())];
        for api in TIMELINE_APIS {
            let Some(data) = self.transport.get_json(api, &params).await else {
                continue;
            };
            let statuses = extract_status_list(&data);
            if !statuses.is_empty() {
                return statuses.to_vec();
            }
        }
        Vec::new()
    }
}

/// The status list of a timeline response, in any of its known shapes.
pub fn extract_status_list(data: &Value) -> &[Value] {
    if let Some(list) = data.get("statuses").and_then(Value::as_array) {
        return list;
    }
    match data.get("data") {
        Some(Value::Array(list)) => return list,
        Some(inner @ Value::Object(_)) => {
            for key in ["list", "statuses"] {
                if let Some(list) = inner.get(key).and_then(Value::as_array) {
                    return list;
                }
            }
        }
        _ => {}
    }
    array_at(data, "list")
}

/// The status inside an `{mblog: {...}}` wrapper, or the entry itself.
pub fn unwrap_status(entry: &Value) -> Option<&Value> {
    match entry.get("mblog") {
        Some(inner) if inner.is_object() => Some(inner),
        _ => entry.is_object().then_some(entry),
    }
}

/// Items of a comment page.
pub fn comment_items(data: &Value) -> &[Value] {
    array_at(data, "data")
}

/// Cursor of the next comment page. Missing, `0`, `"0"` and `""` end it.
pub fn next_cursor(data: &Value) -> Option<String> {
    let raw = data.get("max_id")?;
    if !is_truthy(raw) {
        return None;
    }
    let cursor = display(raw);
    (cursor != "0" && !cursor.is_empty()).then_some(cursor)
}

pub fn is_login_wall_json(data: &Value) -> bool {
    let ok = data.get("ok").and_then(Value::as_i64);
    ok == Some(-100) || text_of(data.get("url")).contains(LOGIN_HOST)
}

pub fn is_login_wall_html(html: &str) -> bool {
    html.contains(LOGIN_HOST)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedTransport;
    use serde_json::json;

    #[test]
    fn test_next_cursor() {
        assert_eq!(next_cursor(&json!({"max_id": 1234})), Some("1234".to_string()));
        assert_eq!(next_cursor(&json!({"max_id": "abc"})), Some("abc".to_string()));
        assert_eq!(next_cursor(&json!({"max_id": 0})), None);
        assert_eq!(next_cursor(&json!({"max_id": "0"})), None);
        assert_eq!(next_cursor(&json!({"max_id": ""})), None);
        assert_eq!(next_cursor(&json!({"max_id": null})), None);
        assert_eq!(next_cursor(&json!({})), None);
    }

    #[test]
    fn test_status_list_shapes() {
        let status = json!({"idstr": "1"});
        for shape in [
            json!({"statuses": [status.clone()]}),
            json!({"data": [status.clone()]}),
            json!({"data": {"list": [status.clone()]}}),
            json!({"data": {"statuses": [status.clone()]}}),
            json!({"list": [status.clone()]}),
        ] {
            assert_eq!(extract_status_list(&shape).len(), 1, "{}", shape);
        }
        assert!(extract_status_list(&json!({"data": {}})).is_empty());
    }

    #[test]
    fn test_unwrap_status() {
        let wrapped = json!({"mblog": {"idstr": "9"}});
        assert_eq!(unwrap_status(&wrapped).unwrap()["idstr"], "9");
        assert!(unwrap_status(&json!("x")).is_none());
    }

    #[test]
    fn test_login_wall() {
        assert!(is_login_wall_json(&json!({"ok": -100})));
        assert!(is_login_wall_json(&json!({"url": "https://passport.weibo.com/visitor"})));
        assert!(!is_login_wall_json(&json!({"ok": 1, "data": []})));
        assert!(is_login_wall_html("<a href=\"https://passport.weibo.com/sso\">"));
    }

    #[tokio::test]
    async fn test_post_detail_unwraps_data() {
        let transport = ScriptedTransport::new().json(
            POST_DETAIL_API,
            &[("id", "5")],
            json!({"data": {"idstr": "5"}}),
        );
        let api = WeiboApi::new(Arc::new(transport));
        assert_eq!(api.post_detail("5").await.unwrap()["idstr"], "5");
        assert!(api.post_detail("6").await.is_none());
    }

    #[tokio::test]
    async fn test_timeline_falls_through_endpoints() {
        let transport = ScriptedTransport::new()
            .json(TIMELINE_APIS[0], &[("uid", "7")], json!({"data": {"list": []}}))
            .json(
                TIMELINE_APIS[2],
                &[("uid", "7"), ("page", "1")],
                json!({"statuses": [{"idstr": "1"}, {"idstr": "2"}]}),
            );
        let api = WeiboApi::new(Arc::new(transport));
        assert_eq!(api.timeline_page("7", 1).await.len(), 2);
        assert!(api.timeline_page("7", 2).await.is_empty());
    }
}
