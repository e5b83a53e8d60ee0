//! HTTP fetch capability for remote CSV exports, sheet pages and sitemap XML.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info_span, Instrument};

pub const CRATE_NAME: &str = "pinrank-fetch";

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub global_concurrency: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: None,
            global_concurrency: 16,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: Vec<u8>,
}

impl FetchedResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            FetchError::Request { url, .. } | FetchError::HttpStatus { url, .. } => url,
        }
    }
}

/// Single-attempt fetcher; a failed request is reported, never retried.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    global_limit: Arc<Semaphore>,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;

        Ok(Self {
            client,
            global_limit: Arc::new(Semaphore::new(config.global_concurrency.max(1))),
        })
    }

    pub async fn fetch_bytes(&self, url: &str) -> Result<FetchedResponse, FetchError> {
        let span = info_span!("http_fetch", url);
        async {
            let _permit = self
                .global_limit
                .acquire()
                .await
                .expect("semaphore not closed");

            let resp = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|source| FetchError::Request {
                    url: url.to_string(),
                    source,
                })?;
            let status = resp.status();
            let final_url = resp.url().to_string();

            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url: final_url,
                });
            }

            let body = resp
                .bytes()
                .await
                .map_err(|source| FetchError::Request {
                    url: final_url.clone(),
                    source,
                })?
                .to_vec();
            debug!(status = status.as_u16(), bytes = body.len(), "fetched");
            Ok(FetchedResponse {
                status,
                final_url,
                body,
            })
        }
        .instrument(span)
        .await
    }

    /// Fetches `url` and decodes the body as (lossy) UTF-8.
    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        Ok(self.fetch_bytes(url).await?.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method, MockServer};

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(HttpClientConfig {
            user_agent: Some("pinrank-test".into()),
            ..Default::default()
        })
        .expect("fetcher")
    }

    #[tokio::test]
    async fn fetch_text_returns_body_on_success() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(Method::GET)
                    .path("/export.csv")
                    .header("user-agent", "pinrank-test");
                then.status(200).body("Keyword,Link\nsoup,https://a.com/soup\n");
            })
            .await;

        let text = fetcher()
            .fetch_text(&server.url("/export.csv"))
            .await
            .expect("fetch");
        assert!(text.starts_with("Keyword,Link"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_an_error_without_retry() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(Method::GET).path("/missing.xml");
                then.status(503);
            })
            .await;

        let err = fetcher()
            .fetch_text(&server.url("/missing.xml"))
            .await
            .expect_err("should fail");
        match err {
            FetchError::HttpStatus { status, ref url } => {
                assert_eq!(status, 503);
                assert!(url.ends_with("/missing.xml"));
            }
            other => panic!("unexpected error: {other}"),
        }
        mock.assert_hits_async(1).await;
    }
}
