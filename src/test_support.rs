//! Scripted collaborators for unit tests.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::api::Transport;
use crate::media::MediaRecord;
use crate::storage::MediaSink;

type Params = Vec<(String, String)>;

struct Route<T> {
    url: String,
    params: Params,
    response: T,
}

/// Transport answering from fixed routes and recording every call.
///
/// A route matches when the URL is equal and all its params are present in
/// the request; the route with the most params wins.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    json_routes: Vec<Route<Value>>,
    html_routes: Vec<Route<String>>,
    fail_downloads: bool,
    requests: Mutex<Vec<(String, Params)>>,
    downloads: Mutex<Vec<(String, Params)>>,
}

fn owned(params: &[(&str, &str)]) -> Params {
    params
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn pick<'a, T>(routes: &'a [Route<T>], url: &str, params: &Params) -> Option<&'a T> {
    routes
        .iter()
        .filter(|r| r.url == url && r.params.iter().all(|p| params.contains(p)))
        .max_by_key(|r| r.params.len())
        .map(|r| &r.response)
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn json(mut self, url: &str, params: &[(&str, &str)], response: Value) -> Self {
        self.json_routes.push(Route {
            url: url.to_string(),
            params: owned(params),
            response,
        });
        self
    }

    pub(crate) fn html(mut self, url: &str, params: &[(&str, &str)], response: &str) -> Self {
        self.html_routes.push(Route {
            url: url.to_string(),
            params: owned(params),
            response: response.to_string(),
        });
        self
    }

    pub(crate) fn failing_downloads(mut self) -> Self {
        self.fail_downloads = true;
        self
    }

    /// Every get request made, as `(url, params)`.
    pub(crate) fn requests(&self) -> Vec<(String, Params)> {
        self.requests.lock().unwrap().clone()
    }

    /// Params of the requests made to `url`.
    pub(crate) fn requests_to(&self, url: &str) -> Vec<Params> {
        self.requests()
            .into_iter()
            .filter(|(u, _)| u == url)
            .map(|(_, p)| p)
            .collect()
    }

    /// Every download made, as `(url, headers)`.
    pub(crate) fn downloads(&self) -> Vec<(String, Params)> {
        self.downloads.lock().unwrap().clone()
    }

    fn record(&self, url: &str, params: &[(&str, String)]) -> Params {
        let params: Params = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), params.clone()));
        params
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get_json(&self, url: &str, params: &[(&str, String)]) -> Option<Value> {
        let params = self.record(url, params);
        pick(&self.json_routes, url, &params).cloned()
    }

    async fn get_html(&self, url: &str, params: &[(&str, String)]) -> Option<String> {
        let params = self.record(url, params);
        pick(&self.html_routes, url, &params).cloned()
    }

    async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        extra_headers: &[(&str, String)],
    ) -> bool {
        let headers = extra_headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        self.downloads
            .lock()
            .unwrap()
            .push((url.to_string(), headers));

        if self.fail_downloads {
            return false;
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(dest, b"media").unwrap();
        true
    }
}

/// Media sink that keeps every settled record.
#[derive(Default)]
pub(crate) struct CollectingMediaSink {
    records: Mutex<Vec<MediaRecord>>,
}

impl CollectingMediaSink {
    pub(crate) fn count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl MediaSink for CollectingMediaSink {
    async fn media_settled(&self, record: &MediaRecord) -> usize {
        self.records.lock().unwrap().push(record.clone());
        1
    }
}
