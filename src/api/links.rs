//! Post link and user target parsing.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

const BASE62_ALPHABET: &str = "0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

static LAYER_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{8,})").expect("layer id regex is valid"));

static PROFILE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:u/\d+|n/[^/]+)$").expect("profile path regex is valid"));

static POST_PATHS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"detail/([A-Za-z0-9]+)",
        r"status/([A-Za-z0-9]+)",
        r"tv/show/([A-Za-z0-9]+)",
        r"u/\d+/([A-Za-z0-9]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("post path regex is valid"))
    .collect()
});

static UID_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|/)u/(\d+)(?:/|$)").expect("uid path regex is valid"));

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

fn is_alnum(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric())
}

fn base62_value(chunk: &str) -> Option<u64> {
    chunk.chars().try_fold(0u64, |acc, c| {
        let digit = BASE62_ALPHABET.find(c)? as u64;
        acc.checked_mul(62)?.checked_add(digit)
    })
}

/// Convert a base62 `bid` into the numeric mid. Digits pass through.
///
/// The bid is decoded in 4-character groups from the right; every group but
/// the leftmost is zero-padded to 7 digits.
pub fn bid_to_mid(bid: &str) -> String {
    let bid = bid.trim();
    if bid.is_empty() || is_digits(bid) {
        return bid.to_string();
    }

    let chars: Vec<char> = bid.chars().collect();
    let mut groups = Vec::new();
    let mut end = chars.len();
    while end > 0 {
        let start = end.saturating_sub(4);
        let chunk: String = chars[start..end].iter().collect();
        let Some(value) = base62_value(&chunk) else {
            return String::new();
        };
        groups.push(if start > 0 {
            format!("{:07}", value)
        } else {
            value.to_string()
        });
        end = start;
    }

    let joined: String = groups.into_iter().rev().collect();
    match joined.trim_start_matches('0') {
        "" => "0".to_string(),
        mid => mid.to_string(),
    }
}

/// Parse a possibly scheme-less weibo.com URL.
fn parse_target_url(raw: &str) -> Option<Url> {
    match Url::parse(raw) {
        Ok(url) if url.has_host() => Some(url),
        _ if raw.contains("weibo.com") => {
            Url::parse(&format!("https://{}", raw.trim_start_matches('/'))).ok()
        }
        _ => None,
    }
}

fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, v)| k == key && !v.is_empty())
        .map(|(_, v)| v.trim().to_string())
}

fn as_post_id(value: &str) -> String {
    if is_digits(value) {
        value.to_string()
    } else {
        bid_to_mid(value)
    }
}

/// Resolve a post link to its post id, or an empty string.
///
/// Profile links (`u/{uid}`, `n/{name}`) are not posts.
pub fn extract_post_id_from_url(raw: &str) -> String {
    let cleaned = raw.trim();
    if cleaned.is_empty() {
        return String::new();
    }
    let Some(url) = parse_target_url(cleaned) else {
        return String::new();
    };

    for key in ["id", "mid"] {
        if let Some(value) = query_value(&url, key) {
            return value;
        }
    }
    if let Some(layer) = query_value(&url, "layerid") {
        if let Some(m) = LAYER_ID.captures(&layer).and_then(|c| c.get(1)) {
            return m.as_str().to_string();
        }
    }
    if let Some(bid) = query_value(&url, "bid") {
        return bid_to_mid(&bid);
    }

    let path = url.path().trim_matches('/');
    if path.is_empty() || PROFILE_PATH.is_match(path) {
        return String::new();
    }

    for pattern in POST_PATHS.iter() {
        if let Some(m) = pattern.captures(path).and_then(|c| c.get(1)) {
            return as_post_id(m.as_str());
        }
    }

    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    match parts.last() {
        Some(last) if parts.len() >= 2 && is_alnum(last) => as_post_id(last),
        _ => String::new(),
    }
}

/// Numeric uid named by a user target, or an empty string.
pub fn extract_uid_from_target(target: &str) -> String {
    let cleaned = target.trim();
    if cleaned.is_empty() {
        return String::new();
    }
    if is_digits(cleaned) {
        return cleaned.to_string();
    }

    let Some(url) = parse_target_url(cleaned) else {
        return String::new();
    };
    if let Some(uid) = query_value(&url, "uid").filter(|v| is_digits(v)) {
        return uid;
    }

    let path = url.path().trim_matches('/');
    if let Some(m) = UID_PATH.captures(path).and_then(|c| c.get(1)) {
        return m.as_str().to_string();
    }

    if url.host_str().is_some_and(|h| h.ends_with("weibo.com")) {
        if let Some(part) = path.split('/').find(|p| is_digits(p)) {
            return part.to_string();
        }
    }

    String::new()
}

/// Custom screen name named by a user target, or an empty string.
///
/// Accepts `@name`, a bare name, `weibo.com/n/{name}` and `weibo.com/{name}`.
pub fn extract_custom_from_target(target: &str) -> String {
    let cleaned = target.trim().trim_start_matches('@');
    if cleaned.is_empty() || is_digits(cleaned) {
        return String::new();
    }

    let Some(url) = parse_target_url(cleaned) else {
        return cleaned.to_string();
    };
    if !url.host_str().is_some_and(|h| h.ends_with("weibo.com")) {
        return cleaned.to_string();
    }

    let parts: Vec<&str> = url.path().split('/').filter(|p| !p.is_empty()).collect();
    let name = match parts.as_slice() {
        ["n", name, ..] => *name,
        [first, ..] if !["u", "detail", "status", "tv"].contains(first) => *first,
        _ => return String::new(),
    };
    urlencoding::decode(name)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bid_to_mid() {
        assert_eq!(bid_to_mid("123"), "123");
        assert_eq!(bid_to_mid(""), "");
        assert_eq!(bid_to_mid("a"), "10");
        assert_eq!(bid_to_mid("10"), "10");
        assert_eq!(bid_to_mid("1a"), "72");
        assert_eq!(bid_to_mid("z0000"), "350000000");
        assert_eq!(bid_to_mid("bad!"), "");
    }

    #[test]
    fn test_post_id_from_query() {
        assert_eq!(
            extract_post_id_from_url("https://weibo.com/?layerid=5270588752661663"),
            "5270588752661663"
        );
        assert_eq!(extract_post_id_from_url("https://m.weibo.cn/status?id=42"), "42");
        assert_eq!(extract_post_id_from_url("https://weibo.com/u/1?mid=77"), "77");
        assert_eq!(extract_post_id_from_url("https://weibo.com/?bid=1a"), "72");
    }

    #[test]
    fn test_post_id_from_path() {
        assert_eq!(extract_post_id_from_url("https://m.weibo.cn/detail/4999"), "4999");
        assert_eq!(extract_post_id_from_url("weibo.com/status/4999"), "4999");
        assert_eq!(extract_post_id_from_url("https://weibo.com/tv/show/1a"), "72");
        assert_eq!(extract_post_id_from_url("https://weibo.com/u/123/456"), "456");
        assert_eq!(extract_post_id_from_url("https://weibo.com/123/1a"), "72");
    }

    #[test]
    fn test_profile_links_are_not_posts() {
        assert_eq!(extract_post_id_from_url("https://weibo.com/u/1234567"), "");
        assert_eq!(extract_post_id_from_url("https://weibo.com/n/某人"), "");
        assert_eq!(extract_post_id_from_url("https://weibo.com/"), "");
        assert_eq!(extract_post_id_from_url("not a link"), "");
    }

    #[test]
    fn test_uid_from_target() {
        assert_eq!(extract_uid_from_target(" 1234 "), "1234");
        assert_eq!(extract_uid_from_target("https://weibo.com/u/1234"), "1234");
        assert_eq!(extract_uid_from_target("https://weibo.com/p?uid=99"), "99");
        assert_eq!(extract_uid_from_target("weibo.com/5678"), "5678");
        assert_eq!(extract_uid_from_target("@somebody"), "");
    }

    #[test]
    fn test_custom_from_target() {
        assert_eq!(extract_custom_from_target("@somebody"), "somebody");
        assert_eq!(extract_custom_from_target("1234"), "");
        assert_eq!(
            extract_custom_from_target("https://weibo.com/n/%E5%BE%AE%E5%8D%9A"),
            "微博"
        );
        assert_eq!(extract_custom_from_target("https://weibo.com/someone"), "someone");
        assert_eq!(extract_custom_from_target("https://weibo.com/u/1234"), "");
    }
}
