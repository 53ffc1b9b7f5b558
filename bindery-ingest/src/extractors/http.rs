//! Shared plumbing for remote catalog extractors
//!
//! Every request waits on a `governor` rate limiter, is bounded as a whole
//! (limiter wait included) by the configured timeout, and races the run's
//! cancellation token.

use crate::types::ExtractionError;
use governor::{clock::DefaultClock, state::direct::NotKeyed, state::InMemoryState, Quota, RateLimiter};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// User-Agent sent to catalog services
pub const USER_AGENT: &str = concat!("bindery/", env!("CARGO_PKG_VERSION"));

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Connection settings for one catalog service
#[derive(Debug, Clone)]
pub struct CatalogOptions {
    /// Service base URL, without trailing slash
    pub base_url: String,
    /// Whole-request timeout
    pub timeout: Duration,
    /// API key, for services that need one
    pub api_key: Option<String>,
    /// Request rate cap; 0 disables limiting
    pub requests_per_second: u32,
}

impl CatalogOptions {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            api_key: None,
            requests_per_second: 1,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    pub fn with_rate_limit(mut self, requests_per_second: u32) -> Self {
        self.requests_per_second = requests_per_second;
        self
    }
}

/// HTTP client, limiter and timeout shared by a catalog extractor
pub struct CatalogHttp {
    client: Client,
    limiter: Option<DirectLimiter>,
    timeout: Duration,
    service: &'static str,
}

/// Outcome of a catalog GET that reached the server
pub enum CatalogResponse<T> {
    Found(T),
    NotFound,
}

impl CatalogHttp {
    pub fn new(service: &'static str, options: &CatalogOptions) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(options.timeout)
            .connect_timeout(options.timeout.min(Duration::from_secs(5)))
            .user_agent(USER_AGENT)
            .build()?;

        let limiter = NonZeroU32::new(options.requests_per_second)
            .map(|rps| RateLimiter::direct(Quota::per_second(rps)));

        Ok(Self {
            client,
            limiter,
            timeout: options.timeout,
            service,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Send `request` and decode a JSON body
    ///
    /// 404 is `NotFound`; other non-success statuses, transport errors,
    /// timeouts and undecodable bodies are `ExtractionError::Lookup`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        file: &Path,
        request: RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<CatalogResponse<T>, ExtractionError> {
        let work = async {
            if let Some(limiter) = &self.limiter {
                limiter.until_ready().await;
            }

            let response = request.send().await.map_err(|e| self.transport_error(file, e))?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Ok(CatalogResponse::NotFound);
            }
            if !status.is_success() {
                return Err(ExtractionError::lookup(
                    file,
                    self.service,
                    format!("unexpected status {}", status),
                ));
            }

            let body = response.json::<T>().await.map_err(|e| {
                if e.is_timeout() {
                    self.transport_error(file, e)
                } else {
                    ExtractionError::lookup(file, self.service, format!("invalid response: {}", e))
                }
            })?;
            Ok(CatalogResponse::Found(body))
        };

        // The limiter wait counts against the timeout too
        let bounded = tokio::time::timeout(self.timeout, work);

        tokio::select! {
            _ = cancel.cancelled() => Err(ExtractionError::Cancelled { path: file.to_path_buf() }),
            result = bounded => result.unwrap_or_else(|_| Err(self.timed_out(file))),
        }
    }

    fn timed_out(&self, file: &Path) -> ExtractionError {
        ExtractionError::lookup(
            file,
            self.service,
            format!("request timed out after {:?}", self.timeout),
        )
    }

    fn transport_error(&self, file: &Path, e: reqwest::Error) -> ExtractionError {
        if e.is_timeout() {
            self.timed_out(file)
        } else {
            ExtractionError::lookup(file, self.service, format!("request failed: {}", e))
        }
    }
}
