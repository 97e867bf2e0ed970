//! Weibo HTTP client.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::api::auth::xsrf_token;
use crate::api::transport::Transport;
use crate::config::{Config, DelayRange};
use crate::error::{Error, Result};
use crate::fs::stream_to_file;
use crate::output::{create_download_bar, PROGRESS_THRESHOLD};

/// Site the session cookies belong to.
const COOKIE_URL: &str = "https://weibo.com/";

/// Characters of a URL shown in log lines.
const LOG_URL_CHARS: usize = 80;

/// Browser-like headers sent with every request.
const BROWSER_HEADERS: &[(&str, &str)] = &[
    ("accept", "application/json, text/plain, */*"),
    ("accept-language", "en,zh-CN;q=0.9,zh;q=0.8"),
    ("client-version", "3.0.0"),
    ("referer", "https://weibo.com/"),
    ("sec-fetch-dest", "empty"),
    ("sec-fetch-mode", "cors"),
    ("sec-fetch-site", "same-origin"),
    ("x-requested-with", "XMLHttpRequest"),
];

enum Body {
    Json(Value),
    Text(String),
}

enum AttemptError {
    Status(StatusCode),
    Failed(Error),
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptError::Status(status) => write!(f, "HTTP {}", status),
            AttemptError::Failed(e) => write!(f, "{}", e),
        }
    }
}

/// Weibo client with a global concurrency limit, retries and request delays.
pub struct WeiboClient {
    client: Client,
    semaphore: Arc<Semaphore>,
    retries: u32,
    request_delay: DelayRange,
    show_progress: bool,
}

impl WeiboClient {
    /// Build a client carrying `cookies` for weibo.com and its subdomains.
    pub fn new(config: &Config, cookies: &BTreeMap<String, String>) -> Result<Self> {
        let cookie_url: Url = COOKIE_URL
            .parse()
            .map_err(|e| Error::Client(format!("Invalid cookie URL: {}", e)))?;
        let jar = Jar::default();
        for (name, value) in cookies {
            jar.add_cookie_str(
                &format!("{}={}; Domain=.weibo.com; Path=/", name, value),
                &cookie_url,
            );
        }

        let client = Client::builder()
            .user_agent(&config.account.user_agent)
            .default_headers(default_headers(cookies)?)
            .cookie_provider(Arc::new(jar))
            .timeout(Duration::from_secs(config.limits.timeout_secs))
            .pool_max_idle_per_host(config.concurrency.global)
            .build()
            .map_err(|e| Error::Client(e.to_string()))?;

        tracing::info!(
            "HTTP client ready (global concurrency: {})",
            config.concurrency.global
        );

        Ok(Self {
            client,
            semaphore: Arc::new(Semaphore::new(config.concurrency.global)),
            retries: config.limits.retries.max(1),
            request_delay: config.delays.request,
            show_progress: config.run.show_progress,
        })
    }

    async fn attempt(
        &self,
        url: &str,
        params: &[(&str, String)],
        as_json: bool,
    ) -> std::result::Result<Body, AttemptError> {
        let Ok(_permit) = self.semaphore.acquire().await else {
            return Err(AttemptError::Failed(Error::Client("request pool closed".into())));
        };

        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| AttemptError::Failed(e.into()))?;
        self.request_delay.pause().await;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(AttemptError::Status(status));
        }

        let text = response
            .text()
            .await
            .map_err(|e| AttemptError::Failed(e.into()))?;
        if as_json {
            serde_json::from_str(&text)
                .map(Body::Json)
                .map_err(|e| AttemptError::Failed(e.into()))
        } else {
            Ok(Body::Text(text))
        }
    }

    async fn request(&self, url: &str, params: &[(&str, String)], as_json: bool) -> Option<Body> {
        for attempt in 1..=self.retries {
            match self.attempt(url, params, as_json).await {
                Ok(body) => return Some(body),
                Err(e) if attempt < self.retries => {
                    let wait = backoff(attempt);
                    tracing::warn!(
                        "Request failed ({}) {} (retry {}/{}, waiting {:.1}s)",
                        e,
                        short(url),
                        attempt,
                        self.retries,
                        wait.as_secs_f64()
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    tracing::error!("Request failed after {} attempts ({}) {}", attempt, e, short(url));
                }
            }
        }
        None
    }

    async fn download_attempt(
        &self,
        url: &str,
        dest: &Path,
        headers: &HeaderMap,
    ) -> std::result::Result<u64, AttemptError> {
        let Ok(_permit) = self.semaphore.acquire().await else {
            return Err(AttemptError::Failed(Error::Client("request pool closed".into())));
        };

        let response = self
            .client
            .get(url)
            .headers(headers.clone())
            .send()
            .await
            .map_err(|e| AttemptError::Failed(e.into()))?;
        self.request_delay.pause().await;

        if response.status() != StatusCode::OK {
            return Err(AttemptError::Status(response.status()));
        }

        let total = response.content_length().unwrap_or(0);
        let progress = (self.show_progress && total > PROGRESS_THRESHOLD)
            .then(|| create_download_bar(total));

        let result = stream_to_file(Box::pin(response.bytes_stream()), dest, progress.as_ref()).await;
        if let Some(pb) = progress {
            pb.finish_and_clear();
        }
        result.map_err(AttemptError::Failed)
    }
}

#[async_trait]
impl Transport for WeiboClient {
    async fn get_json(&self, url: &str, params: &[(&str, String)]) -> Option<Value> {
        match self.request(url, params, true).await? {
            Body::Json(value) => Some(value),
            Body::Text(_) => None,
        }
    }

    async fn get_html(&self, url: &str, params: &[(&str, String)]) -> Option<String> {
        match self.request(url, params, false).await? {
            Body::Text(text) => Some(text),
            Body::Json(_) => None,
        }
    }

    async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        extra_headers: &[(&str, String)],
    ) -> bool {
        let mut headers = HeaderMap::new();
        for (name, value) in extra_headers {
            match (HeaderName::try_from(*name), HeaderValue::try_from(value.as_str())) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => tracing::debug!("Skipping invalid header {}", name),
            }
        }

        for attempt in 1..=self.retries {
            match self.download_attempt(url, dest, &headers).await {
                Ok(bytes) => {
                    tracing::debug!("Saved {} bytes to {}", bytes, dest.display());
                    return true;
                }
                Err(_) if attempt < self.retries => tokio::time::sleep(backoff(attempt)).await,
                Err(e) => tracing::warn!("Media download failed ({}) {}", e, short(url)),
            }
        }
        false
    }
}

fn default_headers(cookies: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in BROWSER_HEADERS {
        headers.insert(*name, HeaderValue::from_static(*value));
    }
    if let Some(token) = xsrf_token(cookies) {
        let value = HeaderValue::from_str(token)
            .map_err(|e| Error::Client(format!("Invalid XSRF token: {}", e)))?;
        headers.insert("x-xsrf-token", value);
    }
    Ok(headers)
}

/// Linear backoff: one second per attempt made.
fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(u64::from(attempt))
}

fn short(url: &str) -> String {
    url.chars().take(LOG_URL_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DelayConfig;
    use wiremock::matchers::{header as header_is, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> Config {
        let mut config = Config::default();
        config.delays = DelayConfig::none();
        config.limits.retries = 2;
        config.limits.timeout_secs = 5;
        config
    }

    fn cookies() -> BTreeMap<String, String> {
        [("SUB", "s"), ("XSRF-TOKEN", "tok")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_get_json_sends_params_and_xsrf() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ajax/statuses/show"))
            .and(query_param("id", "42"))
            .and(header_is("x-xsrf-token", "tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"idstr": "42"})))
            .mount(&server)
            .await;

        let client = WeiboClient::new(&config(), &cookies()).unwrap();
        let url = format!("{}/ajax/statuses/show", server.uri());
        let value = client.get_json(&url, &[("id", "42".to_string())]).await.unwrap();
        assert_eq!(value["idstr"], "42");
    }

    #[tokio::test]
    async fn test_non_200_is_retried_then_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let client = WeiboClient::new(&config(), &cookies()).unwrap();
        assert!(client.get_html(&server.uri(), &[]).await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_json_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = WeiboClient::new(&config(), &cookies()).unwrap();
        assert!(client.get_json(&server.uri(), &[]).await.is_none());
    }

    #[tokio::test]
    async fn test_download_writes_file_with_referer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.jpg"))
            .and(header_is("referer", "https://weibo.com/1/2"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("img/a.jpg");
        let client = WeiboClient::new(&config(), &cookies()).unwrap();
        let ok = client
            .download_file(
                &format!("{}/a.jpg", server.uri()),
                &dest,
                &[("referer", "https://weibo.com/1/2".to_string())],
            )
            .await;

        assert!(ok);
        assert_eq!(std::fs::read(&dest).unwrap(), b"jpeg");
        assert!(!crate::fs::sidecar_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_failed_download_leaves_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.jpg");
        let client = WeiboClient::new(&config(), &cookies()).unwrap();

        assert!(!client.download_file(&server.uri(), &dest, &[]).await);
        assert!(!dest.exists());
    }
}
