//! Session cookie loading.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use directories::ProjectDirs;
use serde_json::Value;

use crate::config::AccountConfig;
use crate::error::{Error, Result};
use crate::model::json::display;

/// Cookie that carries the anti-forgery token.
pub const XSRF_COOKIE: &str = "XSRF-TOKEN";

/// Cookies present in a logged-in session.
const LOGIN_COOKIES: [&str; 2] = ["SUB", "SUBP"];

/// Supplies the cookies of a logged-in session.
#[async_trait]
pub trait CookieSource: Send + Sync {
    async fn session_cookies(&self) -> Result<BTreeMap<String, String>>;
}

/// Cookies given up front: inline text, a cookie file, or the per-user
/// default file `{config_dir}/cookie.txt`.
#[derive(Debug, Clone, Default)]
pub struct StaticCookies {
    inline: Option<String>,
    file: Option<PathBuf>,
}

impl StaticCookies {
    pub fn new(inline: Option<String>, file: Option<PathBuf>) -> Self {
        Self { inline, file }
    }

    pub fn from_config(account: &AccountConfig) -> Self {
        Self::new(account.cookie.clone(), account.cookie_file.clone())
    }

    /// `{config_dir}/cookie.txt` for this application, if a home exists.
    pub fn default_cookie_file() -> Option<PathBuf> {
        ProjectDirs::from("", "", "weibo-harvester").map(|dirs| dirs.config_dir().join("cookie.txt"))
    }

    async fn raw_text(&self) -> Result<Option<String>> {
        if let Some(inline) = self.inline.as_deref().filter(|c| !c.trim().is_empty()) {
            return Ok(Some(inline.to_string()));
        }

        if let Some(file) = &self.file {
            let text = tokio::fs::read_to_string(file).await.map_err(|e| {
                Error::Config(format!("Cannot read cookie file {}: {}", file.display(), e))
            })?;
            return Ok(Some(text));
        }

        match Self::default_cookie_file().filter(|p| p.is_file()) {
            Some(path) => {
                tracing::debug!("Using cookie file {}", path.display());
                Ok(Some(tokio::fs::read_to_string(path).await?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CookieSource for StaticCookies {
    async fn session_cookies(&self) -> Result<BTreeMap<String, String>> {
        let cookies = self
            .raw_text()
            .await?
            .map(|text| parse_cookie_text(&text))
            .unwrap_or_default();

        if cookies.is_empty() {
            return Err(Error::MissingConfig(
                "session cookie (set [account].cookie, [account].cookie_file or WEIBO_COOKIE)"
                    .to_string(),
            ));
        }

        if !has_login_cookies(&cookies) {
            tracing::warn!(
                "Cookie has no {} / {}; requests will likely hit the login wall",
                LOGIN_COOKIES[0],
                LOGIN_COOKIES[1]
            );
        }
        Ok(cookies)
    }
}

/// Parse a cookie header, a JSON object, or a JSON array of `{name, value}`.
pub fn parse_cookie_text(text: &str) -> BTreeMap<String, String> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            return cookies_from_json(&value);
        }
    }
    parse_cookie_header(trimmed)
}

fn cookies_from_json(value: &Value) -> BTreeMap<String, String> {
    match value {
        Value::Object(map) => map
            .iter()
            .filter(|(name, _)| !name.is_empty())
            .map(|(name, value)| (name.clone(), display(value)))
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let name = item.get("name")?.as_str()?;
                let value = item.get("value").map(display).unwrap_or_default();
                (!name.is_empty()).then(|| (name.to_string(), value))
            })
            .collect(),
        _ => BTreeMap::new(),
    }
}

/// Parse `name=value; name2=value2`, with or without a `Cookie:` prefix.
pub fn parse_cookie_header(header: &str) -> BTreeMap<String, String> {
    let header = header.trim();
    let header = header
        .strip_prefix("Cookie:")
        .or_else(|| header.strip_prefix("cookie:"))
        .unwrap_or(header);

    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
        })
        .collect()
}

pub fn cookie_header(cookies: &BTreeMap<String, String>) -> String {
    cookies
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn xsrf_token(cookies: &BTreeMap<String, String>) -> Option<&str> {
    cookies
        .get(XSRF_COOKIE)
        .map(String::as_str)
        .filter(|t| !t.is_empty())
}

pub fn has_login_cookies(cookies: &BTreeMap<String, String>) -> bool {
    LOGIN_COOKIES.iter().all(|name| cookies.contains_key(*name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cookie_header() {
        let cookies = parse_cookie_header("Cookie: SUB=abc; SUBP=def=1 ; broken; =x");
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies["SUB"], "abc");
        assert_eq!(cookies["SUBP"], "def=1");
        assert!(has_login_cookies(&cookies));
    }

    #[test]
    fn test_parse_json_exports() {
        let object = parse_cookie_text(r#"{"SUB": "a", "XSRF-TOKEN": "tok"}"#);
        assert_eq!(xsrf_token(&object), Some("tok"));

        let array = parse_cookie_text(r#"[{"name": "SUB", "value": "a"}, {"value": "orphan"}]"#);
        assert_eq!(array.len(), 1);
        assert!(!has_login_cookies(&array));
    }

    #[test]
    fn test_cookie_header_roundtrip_order() {
        let cookies = parse_cookie_header("b=2; a=1");
        assert_eq!(cookie_header(&cookies), "a=1; b=2");
    }

    #[test]
    fn test_inline_cookie_wins_over_file() {
        let source = StaticCookies::new(
            Some("SUB=1; SUBP=2".to_string()),
            Some(PathBuf::from("/nonexistent/cookie.txt")),
        );
        let cookies = tokio_test::block_on(source.session_cookies()).unwrap();
        assert_eq!(cookies["SUB"], "1");
    }

    #[tokio::test]
    async fn test_cookie_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookie.json");
        std::fs::write(&path, r#"{"SUB": "x", "SUBP": "y"}"#).unwrap();

        let cookies = StaticCookies::new(None, Some(path)).session_cookies().await.unwrap();
        assert_eq!(cookies["SUBP"], "y");
    }

    #[tokio::test]
    async fn test_unreadable_cookie_file_is_config_error() {
        let source = StaticCookies::new(None, Some(PathBuf::from("/nonexistent/cookie.txt")));
        assert!(matches!(source.session_cookies().await, Err(Error::Config(_))));
    }
}
