//! Configuration structures and loading logic.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::modes::{resolve_modes, MediaTypeFilter, SaveFormat, SourceMode};
use crate::error::{Error, Result};
use crate::media::MediaType;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub targets: TargetConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub account: AccountConfig,

    #[serde(default)]
    pub media: MediaConfig,

    #[serde(default)]
    pub profile: ProfileConfig,

    #[serde(default)]
    pub comments: CommentConfig,

    #[serde(default)]
    pub concurrency: ConcurrencyConfig,

    #[serde(default)]
    pub delays: DelayConfig,

    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Which modes run and how progress is shown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Crawl modes (keyword, post_url, user). Empty enables all three.
    #[serde(default)]
    pub modes: Vec<String>,

    /// Show progress bars for large media downloads.
    #[serde(default = "default_true")]
    pub show_progress: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            modes: Vec::new(),
            show_progress: true,
        }
    }
}

/// Crawl targets per mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Search keywords.
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Post links in any supported format.
    #[serde(default)]
    pub post_urls: Vec<String>,

    /// User targets: uid, profile URL, `n/<name>` URL, `@name` or name.
    #[serde(default)]
    pub users: Vec<String>,
}

/// Output locations and format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,

    #[serde(default = "default_text_dir")]
    pub text_dir: String,

    #[serde(default = "default_media_dir")]
    pub media_dir: String,

    #[serde(default)]
    pub save_format: SaveFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            text_dir: default_text_dir(),
            media_dir: default_media_dir(),
            save_format: SaveFormat::default(),
        }
    }
}

/// Session credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Raw cookie header copied from a logged-in browser session.
    #[serde(default)]
    pub cookie: Option<String>,

    /// File holding a cookie header or a JSON cookie export.
    #[serde(default)]
    pub cookie_file: Option<PathBuf>,

    /// Browser user agent string.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            cookie: None,
            cookie_file: None,
            user_agent: default_user_agent(),
        }
    }
}

/// Media capture and download behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Extract media from posts at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Which media types to keep.
    #[serde(default)]
    pub types: MediaTypeFilter,

    /// Download files; when off, links are still recorded.
    #[serde(default = "default_true")]
    pub download: bool,

    /// Replace files that already exist on disk.
    #[serde(default = "default_true")]
    pub overwrite: bool,

    /// Capture profile avatar and cover images.
    #[serde(default = "default_true")]
    pub profile_media: bool,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            types: MediaTypeFilter::default(),
            download: true,
            overwrite: true,
            profile_media: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Fetch profile information for user targets.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Comment capture switches per origin mode and per tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentConfig {
    #[serde(default = "default_true")]
    pub keyword: bool,

    #[serde(default = "default_true")]
    pub post_url: bool,

    #[serde(default = "default_true")]
    pub user: bool,

    #[serde(default = "default_true")]
    pub top_level: bool,

    #[serde(default = "default_true")]
    pub nested: bool,
}

impl Default for CommentConfig {
    fn default() -> Self {
        Self {
            keyword: true,
            post_url: true,
            user: true,
            top_level: true,
            nested: true,
        }
    }
}

/// Pool sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    #[serde(default = "default_keyword_concurrency")]
    pub keyword: usize,

    #[serde(default = "default_post_detail_concurrency")]
    pub post_detail: usize,

    #[serde(default = "default_comment_concurrency")]
    pub comment: usize,

    #[serde(default = "default_user_concurrency")]
    pub user: usize,

    #[serde(default = "default_media_download_concurrency")]
    pub media_download: usize,

    /// Upper bound on in-flight requests across the whole run.
    #[serde(default = "default_global_concurrency")]
    pub global: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            keyword: default_keyword_concurrency(),
            post_detail: default_post_detail_concurrency(),
            comment: default_comment_concurrency(),
            user: default_user_concurrency(),
            media_download: default_media_download_concurrency(),
            global: default_global_concurrency(),
        }
    }
}

/// Inclusive `[min, max]` range of seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayRange(pub f64, pub f64);

impl DelayRange {
    pub fn min(&self) -> f64 {
        self.0
    }

    pub fn max(&self) -> f64 {
        self.1
    }

    /// Draw a random duration from the range.
    pub fn sample(&self) -> Duration {
        let (min, max) = (self.0.max(0.0), self.1.max(0.0));
        let secs = if max > min {
            rand::thread_rng().gen_range(min..=max)
        } else {
            min
        };
        Duration::from_secs_f64(secs)
    }

    /// Sleep for a randomly drawn duration.
    pub async fn pause(&self) {
        let delay = self.sample();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Randomized delays, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayConfig {
    /// After every request.
    #[serde(default = "default_request_delay")]
    pub request: DelayRange,

    /// Between search result pages.
    #[serde(default = "default_search_page_delay")]
    pub search_page: DelayRange,

    /// Between comment pages.
    #[serde(default = "default_comment_page_delay")]
    pub comment_page: DelayRange,

    /// Between user timeline pages.
    #[serde(default = "default_user_page_delay")]
    pub user_page: DelayRange,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            request: default_request_delay(),
            search_page: default_search_page_delay(),
            comment_page: default_comment_page_delay(),
            user_page: default_user_page_delay(),
        }
    }
}

impl DelayConfig {
    /// All ranges set to zero.
    pub fn none() -> Self {
        let zero = DelayRange(0.0, 0.0);
        Self {
            request: zero,
            search_page: zero,
            comment_page: zero,
            user_page: zero,
        }
    }
}

/// Request behaviour, page caps and quotas. Zero quotas mean unlimited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_max_search_pages")]
    pub max_search_pages: u32,

    #[serde(default = "default_max_posts_per_search_page")]
    pub max_posts_per_search_page: usize,

    #[serde(default = "default_max_comment_pages")]
    pub max_comment_pages: u32,

    #[serde(default = "default_max_nested_comment_pages")]
    pub max_nested_comment_pages: u32,

    #[serde(default = "default_max_comments_per_post")]
    pub max_comments_per_post: usize,

    #[serde(default = "default_max_posts_per_keyword")]
    pub max_posts_per_keyword: usize,

    #[serde(default = "default_max_comments_per_keyword")]
    pub max_comments_per_keyword: usize,

    /// Timeline pages per user; 0 falls back to `unlimited_user_page_cap`.
    #[serde(default = "default_max_user_pages")]
    pub max_user_pages: u32,

    #[serde(default = "default_unlimited_user_page_cap")]
    pub unlimited_user_page_cap: u32,

    #[serde(default = "default_max_posts_per_user")]
    pub max_posts_per_user: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
            max_search_pages: default_max_search_pages(),
            max_posts_per_search_page: default_max_posts_per_search_page(),
            max_comment_pages: default_max_comment_pages(),
            max_nested_comment_pages: default_max_nested_comment_pages(),
            max_comments_per_post: default_max_comments_per_post(),
            max_posts_per_keyword: default_max_posts_per_keyword(),
            max_comments_per_keyword: default_max_comments_per_keyword(),
            max_user_pages: default_max_user_pages(),
            unlimited_user_page_cap: default_unlimited_user_page_cap(),
            max_posts_per_user: default_max_posts_per_user(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_text_dir() -> String {
    "text".to_string()
}

fn default_media_dir() -> String {
    "media".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/145.0.0.0 Safari/537.36".to_string()
}

fn default_keyword_concurrency() -> usize {
    2
}

fn default_post_detail_concurrency() -> usize {
    4
}

fn default_comment_concurrency() -> usize {
    3
}

fn default_user_concurrency() -> usize {
    2
}

fn default_media_download_concurrency() -> usize {
    6
}

fn default_global_concurrency() -> usize {
    8
}

fn default_request_delay() -> DelayRange {
    DelayRange(0.3, 0.8)
}

fn default_search_page_delay() -> DelayRange {
    DelayRange(0.8, 1.5)
}

fn default_comment_page_delay() -> DelayRange {
    DelayRange(0.3, 0.7)
}

fn default_user_page_delay() -> DelayRange {
    DelayRange(0.6, 1.2)
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_retries() -> u32 {
    3
}

fn default_max_search_pages() -> u32 {
    30
}

fn default_max_posts_per_search_page() -> usize {
    20
}

fn default_max_comment_pages() -> u32 {
    80
}

fn default_max_nested_comment_pages() -> u32 {
    30
}

fn default_max_comments_per_post() -> usize {
    100
}

fn default_max_posts_per_keyword() -> usize {
    4
}

fn default_max_comments_per_keyword() -> usize {
    100
}

fn default_max_user_pages() -> u32 {
    2
}

fn default_unlimited_user_page_cap() -> u32 {
    500
}

fn default_max_posts_per_user() -> usize {
    20
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Config(format!(
                    "Configuration file not found: {}. Create one from harvester.example.toml",
                    path.display()
                ))
            } else {
                Error::Io(e)
            }
        })?;

        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Crawl modes enabled for this run, in run order.
    pub fn enabled_modes(&self) -> Vec<SourceMode> {
        resolve_modes(&self.run.modes)
    }

    pub fn is_mode_enabled(&self, mode: SourceMode) -> bool {
        self.enabled_modes().contains(&mode)
    }

    /// Keywords to search, empty when keyword mode is off.
    pub fn active_keywords(&self) -> Vec<String> {
        self.active_targets(SourceMode::Keyword, &self.targets.keywords)
    }

    /// Post links to resolve, empty when link mode is off.
    pub fn active_post_urls(&self) -> Vec<String> {
        self.active_targets(SourceMode::PostUrl, &self.targets.post_urls)
    }

    /// User targets to crawl, empty when user mode is off.
    pub fn active_users(&self) -> Vec<String> {
        self.active_targets(SourceMode::User, &self.targets.users)
    }

    fn active_targets(&self, mode: SourceMode, targets: &[String]) -> Vec<String> {
        if !self.is_mode_enabled(mode) {
            return Vec::new();
        }
        normalize_targets(targets)
    }

    /// Whether posts from `mode` should have their comments fetched.
    pub fn should_fetch_comments(&self, mode: SourceMode) -> bool {
        let enabled = match mode {
            SourceMode::Keyword => self.comments.keyword,
            SourceMode::PostUrl => self.comments.post_url,
            SourceMode::User => self.comments.user,
            SourceMode::Profile => false,
        };
        enabled && (self.comments.top_level || self.comments.nested)
    }

    pub fn should_capture_media_type(&self, media_type: MediaType) -> bool {
        match self.media.types {
            MediaTypeFilter::All => true,
            MediaTypeFilter::Image => media_type == MediaType::Image,
            MediaTypeFilter::Video => media_type == MediaType::Video,
        }
    }

    pub fn profile_media_enabled(&self) -> bool {
        self.media.enabled && self.media.profile_media
    }

    /// Timeline page cap per user, resolving 0 to the safety cap.
    pub fn user_page_cap(&self) -> u32 {
        if self.limits.max_user_pages > 0 {
            self.limits.max_user_pages
        } else {
            self.limits.unlimited_user_page_cap
        }
    }

    /// Root of the structured text output.
    pub fn text_root(&self) -> PathBuf {
        self.output.directory.join(&self.output.text_dir)
    }

    /// Root of the downloaded media tree.
    pub fn media_root(&self) -> PathBuf {
        self.output.directory.join(&self.output.media_dir)
    }
}

/// Trim targets, drop blanks and remove duplicates keeping first occurrence.
pub fn normalize_targets(targets: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    targets
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.to_string()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.concurrency.global, 8);
        assert_eq!(config.limits.max_posts_per_keyword, 4);
        assert_eq!(config.delays.search_page, DelayRange(0.8, 1.5));
        assert_eq!(config.output.save_format, SaveFormat::Csv);
        assert_eq!(config.enabled_modes(), SourceMode::CRAWL_MODES.to_vec());
    }

    #[test]
    fn test_parse_sections() {
        let config: Config = toml::from_str(
            r#"
            [run]
            modes = ["link"]

            [targets]
            keywords = ["ignored"]
            post_urls = [" https://weibo.com/?layerid=5270588752661663 ", "", "https://weibo.com/?layerid=5270588752661663"]

            [output]
            save_format = "everything"

            [delays]
            request = [0.0, 0.1]

            [limits]
            max_user_pages = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.enabled_modes(), vec![SourceMode::PostUrl]);
        assert!(config.active_keywords().is_empty());
        assert_eq!(
            config.active_post_urls(),
            vec!["https://weibo.com/?layerid=5270588752661663".to_string()]
        );
        assert_eq!(config.output.save_format, SaveFormat::Both);
        assert_eq!(config.delays.request, DelayRange(0.0, 0.1));
        assert_eq!(config.user_page_cap(), 500);
    }

    #[test]
    fn test_should_fetch_comments() {
        let mut config = Config::default();
        assert!(config.should_fetch_comments(SourceMode::Keyword));
        assert!(!config.should_fetch_comments(SourceMode::Profile));

        config.comments.user = false;
        assert!(!config.should_fetch_comments(SourceMode::User));

        config.comments.top_level = false;
        config.comments.nested = false;
        assert!(!config.should_fetch_comments(SourceMode::PostUrl));
    }

    #[test]
    fn test_media_type_filter() {
        let mut config = Config::default();
        assert!(config.should_capture_media_type(MediaType::Video));
        config.media.types = MediaTypeFilter::Image;
        assert!(config.should_capture_media_type(MediaType::Image));
        assert!(!config.should_capture_media_type(MediaType::Video));
    }

    #[test]
    fn test_delay_sample_within_range() {
        let range = DelayRange(0.2, 0.4);
        for _ in 0..20 {
            let secs = range.sample().as_secs_f64();
            assert!((0.2..=0.4).contains(&secs));
        }
        assert!(DelayRange(0.0, 0.0).sample().is_zero());
    }

    #[test]
    fn test_example_config_parses() {
        let config: Config = toml::from_str(include_str!("../../harvester.example.toml")).unwrap();
        assert_eq!(config.active_keywords(), vec!["rust".to_string()]);
        assert!(config.active_post_urls().is_empty());
        crate::config::validate_config(&config).unwrap();
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
