//! The request primitive the crawl components depend on.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

/// Rate-limited, retrying HTTP access.
///
/// Implementations never return errors: transient failures are retried and
/// then reported as `None` or `false`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `url` with query `params` and decode a JSON body.
    async fn get_json(&self, url: &str, params: &[(&str, String)]) -> Option<Value>;

    /// GET `url` with query `params` and return the body as text.
    async fn get_html(&self, url: &str, params: &[(&str, String)]) -> Option<String>;

    /// Stream `url` into `dest` atomically. True when the file is in place.
    async fn download_file(&self, url: &str, dest: &Path, extra_headers: &[(&str, String)])
        -> bool;
}
