//! User crawling: profile, profile media and timeline.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::api::endpoints::{is_login_wall_json, unwrap_status};
use crate::api::{extract_custom_from_target, extract_uid_from_target, UserLookup, WeiboApi};
use crate::config::{Config, SourceMode};
use crate::crawl::join_tolerant;
use crate::crawl::post::PostProcessor;
use crate::media::{
    normalize_media_url, numbered, split_url_candidates, MediaDownloader, MediaRecord,
    MediaType,
};
use crate::model::Profile;
use crate::storage::{MediaSink, RecordStore};

/// Crawls user targets.
pub struct UserScheduler {
    api: WeiboApi,
    processor: Arc<PostProcessor>,
    store: Arc<RecordStore>,
    config: Arc<Config>,
    media: MediaDownloader,
    semaphore: Semaphore,
}

impl UserScheduler {
    pub fn new(
        api: WeiboApi,
        processor: Arc<PostProcessor>,
        store: Arc<RecordStore>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            media: MediaDownloader::new(api.transport(), &config),
            semaphore: Semaphore::new(config.concurrency.user),
            api,
            processor,
            store,
            config,
        }
    }

    /// Crawl every user target concurrently. Returns the comments saved.
    pub async fn run(&self, targets: &[String]) -> usize {
        join_tolerant("User", targets.iter().map(|target| self.process_target(target))).await
    }

    async fn process_target(&self, target: &str) -> usize {
        let Ok(_permit) = self.semaphore.acquire().await else {
            return 0;
        };

        let mut uid = extract_uid_from_target(target);
        let custom = extract_custom_from_target(target);
        if uid.is_empty() && custom.is_empty() {
            tracing::warn!("Cannot parse user target: {}", target);
            return 0;
        }

        if self.config.profile.enabled {
            let lookup = if uid.is_empty() {
                UserLookup::Custom(custom)
            } else {
                UserLookup::Uid(uid.clone())
            };
            if let Some(profile) = self.fetch_profile(&lookup, &uid, target).await {
                if uid.is_empty() {
                    uid = profile.uid.clone();
                }
            }
        }

        if uid.is_empty() {
            tracing::warn!("No uid for {}, skipping its timeline", target);
            return 0;
        }
        self.crawl_timeline(&uid, target).await
    }

    async fn fetch_profile(&self, lookup: &UserLookup, uid: &str, target: &str) -> Option<Profile> {
        let Some(data) = self.api.profile_info(lookup).await else {
            tracing::warn!("Could not fetch profile of {}", target);
            return None;
        };
        if is_login_wall_json(&data) {
            tracing::warn!("Profile of {} requires login; check the session cookie", target);
            return None;
        }

        let mut profile = Profile::from_api(&data, target);
        if profile.uid.is_empty() && !uid.is_empty() {
            profile.uid = uid.to_string();
            profile.profile_url = format!("https://weibo.com/u/{}", uid);
        }

        if self.store.save_profile(&profile).await {
            tracing::info!(
                "Profile saved: @{} ({}), {} followers",
                profile.screen_name,
                profile.uid,
                profile.followers_count
            );
        }

        if self.config.profile_media_enabled()
            && self.config.should_capture_media_type(MediaType::Image)
        {
            let records = self
                .store
                .unseen_media(numbered(profile_media_records(&profile)))
                .await;
            if !records.is_empty() {
                let batch = self
                    .media
                    .download_all(records, Some(self.store.as_ref() as &dyn MediaSink))
                    .await;
                tracing::debug!("Profile media of {}: {} saved", target, batch.saved);
            }
        }
        Some(profile)
    }

    async fn crawl_timeline(&self, uid: &str, target: &str) -> usize {
        let cap = self.config.user_page_cap();
        let max_posts = self.config.limits.max_posts_per_user;
        let mut processed = 0;
        let mut saved = 0;
        tracing::info!("Crawling timeline of {}", uid);

        for page in 1..=cap {
            if max_posts > 0 && processed >= max_posts {
                break;
            }

            let statuses = self.api.timeline_page(uid, page).await;
            if statuses.is_empty() {
                if page == 1 {
                    tracing::info!("User {} has no public posts", uid);
                }
                break;
            }

            for status in statuses.iter().filter_map(unwrap_status) {
                if max_posts > 0 && processed >= max_posts {
                    break;
                }
                processed += 1;
                saved += self
                    .processor
                    .process_status(status, SourceMode::User, target)
                    .await;
            }

            if page == cap && self.config.limits.max_user_pages == 0 {
                tracing::warn!(
                    "Timeline of {} stopped at the safety cap of {} pages",
                    uid,
                    cap
                );
            }
            self.config.delays.user_page.pause().await;
        }

        tracing::info!(
            "Timeline of {} done: {} posts processed, {} comments saved",
            uid,
            processed,
            saved
        );
        saved
    }
}

/// Avatar and cover image records of a profile.
pub fn profile_media_records(profile: &Profile) -> Vec<MediaRecord> {
    let post_id = if profile.uid.is_empty() {
        "profile_unknown".to_string()
    } else {
        format!("profile_{}", profile.uid)
    };
    let author = [profile.screen_name.as_str(), profile.uid.as_str()]
        .into_iter()
        .find(|name| !name.is_empty())
        .unwrap_or("unknown_user");

    let mut seen = HashSet::new();
    [&profile.avatar_url, &profile.cover_image_url]
        .into_iter()
        .flat_map(|field| split_url_candidates(field))
        .filter(|url| seen.insert(normalize_media_url(url)))
        .map(|url| {
            MediaRecord::new(
                SourceMode::Profile,
                &profile.source_target,
                &post_id,
                &profile.profile_url,
                author,
                MediaType::Image,
                &url,
                &url,
                &profile.crawled_at,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::endpoints::{PROFILE_API, TIMELINE_APIS};
    use crate::config::DelayConfig;
    use crate::test_support::ScriptedTransport;
    use serde_json::json;

    fn config(root: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.delays = DelayConfig::none();
        config.output.directory = root.to_path_buf();
        config.comments.user = false;
        config.profile.enabled = true;
        config.media.enabled = true;
        config.media.download = true;
        config.media.profile_media = true;
        config.limits.max_user_pages = 0;
        config.limits.unlimited_user_page_cap = 3;
        config.limits.max_posts_per_user = 0;
        config
    }

    fn scheduler(
        transport: ScriptedTransport,
        config: Config,
    ) -> (UserScheduler, Arc<RecordStore>, Arc<ScriptedTransport>) {
        let transport = Arc::new(transport);
        let api = WeiboApi::new(transport.clone());
        let config = Arc::new(config);
        let store = Arc::new(RecordStore::new(&config));
        let processor = Arc::new(PostProcessor::new(
            api.clone(),
            Arc::clone(&store),
            Arc::clone(&config),
        ));
        let scheduler = UserScheduler::new(api, processor, Arc::clone(&store), config);
        (scheduler, store, transport)
    }

    fn timeline(ids: &[&str]) -> serde_json::Value {
        let statuses: Vec<_> = ids
            .iter()
            .map(|id| {
                json!({"mblog": {
                    "idstr": id,
                    "text_raw": format!("post {}", id),
                    "user": {"idstr": "77"}
                }})
            })
            .collect();
        json!({"data": {"list": statuses}})
    }

    #[tokio::test]
    async fn test_custom_name_resolves_uid_and_saves_profile_media() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new()
            .json(
                PROFILE_API,
                &[("custom", "someone")],
                json!({"data": {"user": {
                    "idstr": "77",
                    "screen_name": "someone",
                    "avatar_hd": "https://tvax1.sinaimg.cn/a.jpg?KID=1",
                    "cover_image_phone": "https://tvax1.sinaimg.cn/a.jpg?KID=2;https://ww1.sinaimg.cn/c.jpg"
                }}}),
            )
            .json(TIMELINE_APIS[0], &[("uid", "77"), ("page", "1")], timeline(&["1", "2"]));
        let (scheduler, store, transport) = scheduler(transport, config(dir.path()));

        scheduler.run(&["@someone".to_string()]).await;

        let totals = store.totals().await;
        assert_eq!(totals.profiles, 1);
        assert_eq!(totals.posts, 2);
        assert_eq!(totals.media, 2);
        assert_eq!(transport.downloads().len(), 2);
    }

    #[tokio::test]
    async fn test_unlimited_pages_stop_at_safety_cap() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.profile.enabled = false;
        let transport =
            ScriptedTransport::new().json(TIMELINE_APIS[0], &[("uid", "77")], timeline(&["1"]));
        let (scheduler, _, transport) = scheduler(transport, config);

        scheduler.run(&["77".to_string()]).await;

        assert_eq!(transport.requests_to(TIMELINE_APIS[0]).len(), 3);
    }

    #[tokio::test]
    async fn test_post_cap_per_user() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.profile.enabled = false;
        config.limits.max_posts_per_user = 3;
        let transport = ScriptedTransport::new().json(
            TIMELINE_APIS[0],
            &[("uid", "77")],
            timeline(&["1", "2"]),
        );
        let (scheduler, store, transport) = scheduler(transport, config);

        scheduler.run(&["https://weibo.com/u/77".to_string()]).await;

        assert_eq!(transport.requests_to(TIMELINE_APIS[0]).len(), 2);
        assert_eq!(store.totals().await.posts, 2);
    }

    #[tokio::test]
    async fn test_unparseable_target_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, _, transport) = scheduler(ScriptedTransport::new(), config(dir.path()));

        assert_eq!(scheduler.run(&["@".to_string(), " ".to_string()]).await, 0);
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn test_profile_media_records_dedupe() {
        let mut profile = Profile::from_api(&json!({"idstr": "5", "screen_name": "x"}), "5");
        profile.avatar_url = "https://a/1.jpg?x=1".to_string();
        profile.cover_image_url = "https://a/1.jpg?x=2".to_string();

        let records = profile_media_records(&profile);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].post_id, "profile_5");
        assert_eq!(records[0].post_author, "x");
        assert_eq!(records[0].source_mode, SourceMode::Profile);
    }
}
