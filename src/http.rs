//! HTTP access for reddit-media
//! One pooled reqwest client shared by every pipeline running in the process

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use crate::config::AppConfig;
use crate::error::{PipelineError, PipelineResult};

/// Best-effort downloads. Failures are reported as `None`, never as errors,
/// so callers can skip the item and carry on.
#[async_trait]
pub trait ByteFetcher: Send + Sync {
    /// GET `url`; body on HTTP 200, `None` otherwise
    async fn fetch(&self, url: &str) -> Option<Vec<u8>>;

    /// HEAD `url` and return its Content-Type header
    async fn content_type(&self, url: &str) -> Option<String>;
}

/// Thin wrapper over `reqwest::Client`. Cloning shares the connection pool.
///
/// API calls and HEAD probes are bounded by `timeout` as a whole. Media
/// downloads only bound connecting and each read, so long video streams
/// can finish as long as bytes keep arriving.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(user_agent: &str, timeout: Duration) -> PipelineResult<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Config(format!("http client: {}", e)))?;
        Ok(Self { client, timeout })
    }

    pub fn from_config(config: &AppConfig) -> PipelineResult<Self> {
        Self::new(
            &config.user_agent,
            Duration::from_secs(config.http_timeout_secs),
        )
    }

    /// GET a JSON document. Unlike `fetch`, any failure is an error.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> PipelineResult<T> {
        let response = self.client.get(url).timeout(self.timeout).send().await?;
        let status = response.status();

        if status != StatusCode::OK {
            return Err(PipelineError::Reddit(format!(
                "GET {} returned {}",
                url, status
            )));
        }

        log::info!("GET {} - {}", url, status.as_u16());

        response
            .json::<T>()
            .await
            .map_err(|e| PipelineError::Reddit(format!("Failed to decode {}: {}", url, e)))
    }
}

#[async_trait]
impl ByteFetcher for HttpClient {
    async fn fetch(&self, url: &str) -> Option<Vec<u8>> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Download request failed: {}: {}", url, e);
                return None;
            }
        };

        if response.status() != StatusCode::OK {
            log::warn!(
                "Failed to download bytes from {} (status {})",
                url,
                response.status().as_u16()
            );
            return None;
        }

        match response.bytes().await {
            Ok(bytes) => {
                log::debug!("Downloaded {} bytes from {}", bytes.len(), url);
                Some(bytes.to_vec())
            }
            Err(e) => {
                log::warn!("Failed to read body from {}: {}", url, e);
                None
            }
        }
    }

    async fn content_type(&self, url: &str) -> Option<String> {
        match self.client.head(url).timeout(self.timeout).send().await {
            Ok(response) => response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.to_string()),
            Err(e) => {
                log::warn!("HEAD request failed: {}: {}", url, e);
                None
            }
        }
    }
}

/// Segment `index` of a URL's path split on `/`; index 0 is the empty
/// string before the leading slash. Query and fragment are ignored.
pub fn path_segment(raw: &str, index: usize) -> Option<String> {
    let parsed = Url::parse(raw).ok()?;
    parsed.path().split('/').nth(index).map(str::to_string)
}
