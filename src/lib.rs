//! Weibo Harvester - concurrent collection of Weibo posts, comments, media
//! and profiles.
//!
//! # Features
//!
//! - Keyword search, direct post links and user timelines
//! - Top-level and nested comment pagination with per-post and per-keyword quotas
//! - Image and video capture with signed-URL deduplication
//! - CSV (Excel friendly) and JSON Lines output, grouped by crawl mode
//! - Crash-safe batched writes; reruns skip everything already on disk
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use weibo_harvester::{CookieSource, Config, Harvester, StaticCookies, WeiboClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(Path::new("harvester.toml"))?;
//!     let cookies = StaticCookies::from_config(&config.account).session_cookies().await?;
//!     let client = WeiboClient::new(&config, &cookies)?;
//!
//!     let report = Harvester::new(config, Arc::new(client))
//!         .run(std::future::pending())
//!         .await?;
//!     println!("{} new comments", report.totals.comments);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod crawl;
pub mod error;
pub mod fs;
pub mod media;
pub mod model;
pub mod output;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for convenience
pub use api::{CookieSource, StaticCookies, Transport, WeiboApi, WeiboClient};
pub use config::{Config, SaveFormat, SourceMode};
pub use crawl::{Harvester, RunReport};
pub use error::{Error, Result};
pub use media::{MediaRecord, MediaType};
pub use model::{Comment, Post, Profile};
pub use storage::{RecordStore, StoreTotals};
