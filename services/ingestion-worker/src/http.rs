use std::sync::Arc;
use std::time::Duration;

use registry_core::FetchError;
use registry_resilience::{retry_async, CircuitBreaker, ResilienceError, RetryPolicy};
use reqwest::{header, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::settings::WorkerConfig;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HttpError {
    #[error("http status {0}")]
    Status(u16),
    #[error("request timed out")]
    Timeout,
    #[error("transport: {0}")]
    Transport(String),
    #[error("undecodable body: {0}")]
    Decode(String),
    #[error("upstream circuit open")]
    CircuitOpen,
}

impl HttpError {
    /// Server-side or transient failures. A 404 or other 4xx is final.
    pub fn retryable(&self) -> bool {
        match self {
            Self::Status(s) => *s == 429 || *s >= 500,
            Self::Timeout | Self::Transport(_) => true,
            Self::Decode(_) | Self::CircuitOpen => false,
        }
    }

    pub fn into_fetch_error(self, what: &str) -> FetchError {
        match self {
            Self::Status(404) => FetchError::NotFound(what.to_string()),
            Self::Timeout => FetchError::Timeout,
            Self::Decode(e) => FetchError::Malformed(format!("{what}: {e}")),
            other => FetchError::Upstream(format!("{what}: {other}")),
        }
    }
}

impl From<reqwest::Error> for HttpError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() { Self::Timeout }
        else if let Some(s) = e.status() { Self::Status(s.as_u16()) }
        else if e.is_decode() { Self::Decode(e.to_string()) }
        else { Self::Transport(e.to_string()) }
    }
}

/// One reqwest client shared by the fetcher and the license resolver. Every
/// request goes through the retry policy and a single circuit breaker.
#[derive(Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    retry: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
    github_api_base: String,
    github_token: Option<String>,
}

impl HttpClient {
    pub fn new(cfg: &WorkerConfig) -> anyhow::Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(cfg.http_timeout())
            .user_agent(concat!("registry-ingestion-worker/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            inner,
            retry: RetryPolicy::new(cfg.retry_attempts, Duration::from_millis(cfg.retry_base_delay_ms)),
            breaker: Arc::new(CircuitBreaker::new(cfg.breaker_failure_threshold, cfg.breaker_reset())),
            github_api_base: cfg.github_api_base.trim_end_matches('/').to_string(),
            github_token: cfg.github_token.clone(),
        })
    }

    pub async fn json(&self, url: &str) -> Result<Value, HttpError> {
        self.send(url, "application/json", |r| async move { r.json::<Value>().await.map_err(|e| HttpError::Decode(e.to_string())) }).await
    }

    /// Raw text body. `Ok(None)` on 404, which callers treat as "file absent".
    pub async fn text(&self, url: &str, accept: &str) -> Result<Option<String>, HttpError> {
        match self.send(url, accept, |r| async move { r.text().await.map_err(HttpError::from) }).await {
            Ok(body) => Ok(Some(body)),
            Err(HttpError::Status(404)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn send<T, F, Fut>(&self, url: &str, accept: &str, read: F) -> Result<T, HttpError>
    where
        F: Fn(reqwest::Response) -> Fut,
        Fut: std::future::Future<Output = Result<T, HttpError>>,
    {
        let read = &read;
        retry_async(&self.retry, HttpError::retryable, || async move {
            let res = self.breaker.call(HttpError::retryable, async {
                let mut req = self.inner.get(url).header(header::ACCEPT, accept);
                if let Some(token) = self.github_token.as_deref().filter(|_| url.starts_with(&self.github_api_base)) {
                    req = req.bearer_auth(token);
                }
                let resp = req.send().await?;
                let status = resp.status();
                if status != StatusCode::OK {
                    debug!(url, status = status.as_u16(), "non-success response");
                    return Err(HttpError::Status(status.as_u16()));
                }
                read(resp).await
            }).await;
            res.map_err(|e| match e {
                ResilienceError::CircuitOpen => { warn!(url, "request short-circuited"); HttpError::CircuitOpen }
                ResilienceError::Inner(e) => e,
            })
        }).await
    }
}
