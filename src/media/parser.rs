//! Media extraction from status payloads.
//!
//! Each field is read through an ordered list of key paths; the first path
//! yielding a usable URL wins. New payload shapes only need a new path entry.

use std::collections::HashSet;

use serde_json::Value;

use crate::media::item::{normalize_media_url, MediaRecord, MediaType};
use crate::model::json::{array_at, lookup, text_of};
use crate::model::Post;

type KeyPath = &'static [&'static str];

/// Picture sizes in `pics[]`, largest first.
const PIC_LIST_PATHS: &[KeyPath] = &[&["largest", "url"], &["large", "url"], &["mw2000", "url"], &["url"]];

/// Picture sizes in `pic_infos{}` and mixed-media picture items.
const PIC_INFO_PATHS: &[KeyPath] = &[
    &["largest", "url"],
    &["original", "url"],
    &["mw2000", "url"],
    &["large", "url"],
    &["bmiddle", "url"],
    &["thumbnail", "url"],
    &["url"],
];

/// Video streams, best quality first.
const STREAM_PATHS: &[KeyPath] = &[
    &["stream_url_hd"],
    &["stream_url"],
    &["mp4_hd_url"],
    &["mp4_sd_url"],
];

/// Preview images of mixed-media video items.
const VIDEO_PREVIEW_PATHS: &[KeyPath] = &[&["poster"], &["cover"], &["cover_url"], &["page_pic", "url"]];

/// Extract every image and video of a status and its embedded reshare.
///
/// URLs are deduplicated per type after normalization.
pub fn extract_media(status: &Value, post: &Post) -> Vec<MediaRecord> {
    if !status.is_object() {
        return Vec::new();
    }

    let mut nodes = vec![status];
    if let Some(retweeted) = status.get("retweeted_status").filter(|r| r.is_object()) {
        nodes.push(retweeted);
    }

    let mut records = Vec::new();
    let mut seen_images = HashSet::new();
    let mut seen_videos = HashSet::new();

    for node in nodes {
        for url in collect_image_urls(node) {
            if seen_images.insert(normalize_media_url(&url)) {
                records.push(record_for(post, MediaType::Image, &url, &url));
            }
        }

        for (url, preview) in collect_video_urls(node) {
            if seen_videos.insert(normalize_media_url(&url)) {
                records.push(record_for(post, MediaType::Video, &url, &preview));
            }
        }
    }

    records
}

fn record_for(post: &Post, media_type: MediaType, url: &str, preview: &str) -> MediaRecord {
    MediaRecord::new(
        post.source_mode,
        &post.source_target,
        &post.post_id,
        &post.post_url,
        &post.user_name,
        media_type,
        url,
        preview,
        &post.post_time,
    )
}

fn collect_image_urls(node: &Value) -> Vec<String> {
    let mut candidates = Vec::new();

    for pic in array_at(node, "pics").iter().filter(|p| p.is_object()) {
        candidates.extend(pick_first_url(pic, PIC_LIST_PATHS));
    }

    if let Some(infos) = node.get("pic_infos").and_then(Value::as_object) {
        for info in infos.values().filter(|i| i.is_object()) {
            candidates.extend(pick_first_url(info, PIC_INFO_PATHS));
        }
    }

    for data in mixed_items(node, &["pic", "image"]) {
        candidates.extend(pick_first_url(data, PIC_INFO_PATHS));
    }

    let page_info = node.get("page_info").unwrap_or(&Value::Null);
    let media_info = page_info.get("media_info").unwrap_or(&Value::Null);
    if pick_first_url(media_info, STREAM_PATHS).is_none() {
        candidates.extend(split_url_candidates(&text_of(lookup(
            page_info,
            &["page_pic", "url"],
        ))));
    }

    dedupe_normalized(candidates)
}

fn collect_video_urls(node: &Value) -> Vec<(String, String)> {
    let mut videos = Vec::new();

    let page_info = node.get("page_info").unwrap_or(&Value::Null);
    let media_info = page_info.get("media_info").unwrap_or(&Value::Null);
    if let Some(url) = pick_first_url(media_info, STREAM_PATHS) {
        let preview = split_url_candidates(&text_of(lookup(page_info, &["page_pic", "url"])))
            .into_iter()
            .next()
            .unwrap_or_default();
        videos.push((url, preview));
    }

    for data in mixed_items(node, &["video", "story"]) {
        if let Some(url) = pick_first_url(data, STREAM_PATHS) {
            let preview = pick_first_url(data, VIDEO_PREVIEW_PATHS).unwrap_or_default();
            videos.push((url, preview));
        }
    }

    let mut seen = HashSet::new();
    videos
        .into_iter()
        .filter(|(url, _)| seen.insert(normalize_media_url(url)))
        .collect()
}

/// `data` objects of `mix_media_info.items` whose type is one of `types`.
fn mixed_items<'a>(node: &'a Value, types: &[&str]) -> Vec<&'a Value> {
    let items = node
        .get("mix_media_info")
        .map(|mix| array_at(mix, "items"))
        .unwrap_or(&[]);

    items
        .iter()
        .filter(|item| {
            let kind = text_of(item.get("type")).to_lowercase();
            types.contains(&kind.as_str())
        })
        .map(|item| item.get("data").filter(|d| d.is_object()).unwrap_or(&Value::Null))
        .collect()
}

/// First URL found along `paths`.
fn pick_first_url(obj: &Value, paths: &[KeyPath]) -> Option<String> {
    paths.iter().find_map(|path| {
        let raw = text_of(lookup(obj, path));
        split_url_candidates(raw.trim()).into_iter().next()
    })
}

fn dedupe_normalized(urls: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|url| {
            let normalized = normalize_media_url(url);
            !normalized.is_empty() && seen.insert(normalized)
        })
        .collect()
}

/// Split a field that may pack several URLs into one string.
///
/// Delimiters are `;`, `|` and `,` directly before another URL. Protocol
/// relative URLs gain `https:`; anything not http(s) is dropped.
pub fn split_url_candidates(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let packed = text.matches("http").count() > 1 || text.contains(";http") || text.contains("|http");
    let parts: Vec<String> = if packed {
        text.split([';', '|'])
            .flat_map(split_comma_joined)
            .collect()
    } else {
        vec![text.to_string()]
    };

    let mut seen = HashSet::new();
    parts
        .into_iter()
        .filter_map(|part| {
            let candidate = part.trim().trim_matches(',').trim();
            let candidate = match candidate.strip_prefix("//") {
                Some(rest) => format!("https://{}", rest),
                None => candidate.to_string(),
            };
            let is_http = candidate.starts_with("http://") || candidate.starts_with("https://");
            (is_http && seen.insert(candidate.clone())).then_some(candidate)
        })
        .collect()
}

/// Split on commas that start a new URL; other commas stay inside the URL.
fn split_comma_joined(part: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for segment in part.split(',') {
        let trimmed = segment.trim();
        let starts_url = trimmed.starts_with("http") || trimmed.starts_with("//");
        match urls.last_mut() {
            Some(last) if !starts_url => {
                last.push(',');
                last.push_str(segment);
            }
            _ => urls.push(segment.to_string()),
        }
    }
    urls
}
