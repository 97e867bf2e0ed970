//! End-to-end runs against a canned transport.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use weibo_harvester::api::endpoints::{COMMENTS_API, POST_DETAIL_API, SEARCH_URL, TIMELINE_APIS};
use weibo_harvester::config::DelayConfig;
use weibo_harvester::storage::DataKind;
use weibo_harvester::{Config, Harvester, SaveFormat, Transport};

/// Serves one keyword result page, two posts with comments and a timeline.
#[derive(Default)]
struct CannedWeibo {
    downloads: Mutex<Vec<String>>,
}

fn param<'a>(params: &'a [(&str, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.as_str())
}

fn status(id: &str) -> Value {
    json!({
        "idstr": id,
        "text_raw": format!("post body {}", id),
        "created_at": "2025-03-01 10:00:00",
        "comments_count": 2,
        "user": {"idstr": "900", "screen_name": "writer"},
        "pic_ids": ["p"],
        "pic_infos": {"p": {"largest": {
            "url": format!("https://wx1.sinaimg.cn/large/{}.jpg?Expires=1", id)
        }}}
    })
}

#[async_trait]
impl Transport for CannedWeibo {
    async fn get_json(&self, url: &str, params: &[(&str, String)]) -> Option<Value> {
        if url == POST_DETAIL_API {
            return param(params, "id").map(status);
        }
        if url == COMMENTS_API {
            let id = param(params, "id")?;
            return Some(match param(params, "fetch_level") {
                Some("0") => json!({
                    "data": [
                        {"idstr": format!("{}1", id), "text_raw": "first!", "total_number": 1,
                         "user": {"screen_name": "fan"}, "source": "来自北京"},
                        {"idstr": format!("{}2", id), "text_raw": "second", "user": {"screen_name": "fan2"}}
                    ],
                    "max_id": 0
                }),
                _ => json!({"data": [{"idstr": "r", "text_raw": "a reply", "user": {"screen_name": "fan3"}}]}),
            });
        }
        if url == TIMELINE_APIS[0] {
            return Some(match param(params, "page") {
                Some("1") => json!({"data": {"list": [status("30")]}}),
                _ => json!({"data": {"list": []}}),
            });
        }
        None
    }

    async fn get_html(&self, url: &str, params: &[(&str, String)]) -> Option<String> {
        if url != SEARCH_URL {
            return None;
        }
        Some(match param(params, "page") {
            Some("1") => concat!(
                r#"<div action-type="feed_list_item" mid="10"></div>"#,
                r#"<div action-type="feed_list_item" mid="20"></div>"#,
                r#"<div action-type="feed_list_item" mid="10"></div>"#,
            )
            .to_string(),
            _ => "<html></html>".to_string(),
        })
    }

    async fn download_file(&self, url: &str, dest: &Path, _headers: &[(&str, String)]) -> bool {
        self.downloads.lock().unwrap().push(url.to_string());
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(dest, b"img").unwrap();
        true
    }
}

fn config(root: &Path) -> Config {
    let mut config = Config::default();
    config.delays = DelayConfig::none();
    config.output.directory = root.to_path_buf();
    config.output.save_format = SaveFormat::Both;
    config.targets.keywords = vec!["rust".to_string()];
    config.targets.users = vec!["900".to_string()];
    config.profile.enabled = false;
    config.limits.max_search_pages = 5;
    config.limits.max_posts_per_search_page = 0;
    config.limits.max_posts_per_keyword = 0;
    config.limits.max_comments_per_keyword = 0;
    config.limits.max_comments_per_post = 0;
    config.limits.max_user_pages = 3;
    config
}

#[tokio::test]
async fn test_full_run_writes_grouped_output() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(CannedWeibo::default());
    let harvester = Harvester::new(config(dir.path()), transport.clone());

    let report = harvester.run(std::future::pending()).await.unwrap();

    assert!(!report.interrupted);
    assert_eq!(report.totals.posts, 3);
    assert_eq!(report.totals.comments, 9);
    assert_eq!(report.totals.media, 3);
    assert_eq!(transport.downloads.lock().unwrap().len(), 3);

    let layout = harvester.store().layout();
    let keyword_posts =
        std::fs::read_to_string(layout.csv_path("keyword", DataKind::Posts)).unwrap();
    assert!(keyword_posts.starts_with('\u{feff}'));
    assert_eq!(keyword_posts.lines().count(), 3);

    let user_comments =
        std::fs::read_to_string(layout.jsonl_path("user", DataKind::Comments)).unwrap();
    assert_eq!(user_comments.lines().count(), 3);
    assert!(user_comments.contains("[回复] a reply"));
    assert!(user_comments.contains("北京"));
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    Harvester::new(config(dir.path()), Arc::new(CannedWeibo::default()))
        .run(std::future::pending())
        .await
        .unwrap();

    let transport = Arc::new(CannedWeibo::default());
    let report = Harvester::new(config(dir.path()), transport.clone())
        .run(std::future::pending())
        .await
        .unwrap();

    assert_eq!(report.totals.posts, 0);
    assert_eq!(report.totals.comments, 0);
    assert_eq!(report.totals.media, 0);
    assert!(transport.downloads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_keyword_quotas_hold_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let mut limited = config(dir.path());
    limited.run.modes = vec!["keyword".to_string()];
    limited.limits.max_comments_per_keyword = 4;

    let first = Harvester::new(limited.clone(), Arc::new(CannedWeibo::default()))
        .run(std::future::pending())
        .await
        .unwrap();
    assert!(first.totals.comments <= 4);

    let second = Harvester::new(limited, Arc::new(CannedWeibo::default()))
        .run(std::future::pending())
        .await
        .unwrap();
    assert_eq!(second.totals.comments, 0);
}
