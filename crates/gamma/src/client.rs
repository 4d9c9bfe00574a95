//! Paginated Gamma API client.
//!
//! Walks an endpoint with `limit`/`offset` paging until the API runs dry,
//! retrying transient connection failures with exponential backoff.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{Quota, RateLimiter};
use market_warehouse_core::{
    ApiConfig, EntityKind, ExtractionConfig, PipelineConfig, RawRecord, GAMMA_API_URL,
};
use nonzero_ext::nonzero;
use reqwest::Client;
use serde_json::Value;

use crate::error::{FetchError, Result};
use crate::retry::RetryPolicy;

type DirectLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Why a crawl stopped requesting pages.
#[derive(Debug)]
pub enum CrawlStop {
    /// The API returned an empty page.
    EmptyPage,
    /// A page came back shorter than the requested limit.
    ShortPage,
    /// The record cap was reached.
    MaxRecords,
    /// A page failed; records gathered before it are kept.
    Failed(FetchError),
}

/// Outcome of crawling one endpoint.
#[derive(Debug)]
pub struct Crawl {
    pub records: Vec<RawRecord>,
    /// Page requests issued, counting a failed page once.
    pub pages_requested: usize,
    pub stop: CrawlStop,
}

impl Crawl {
    /// True if the crawl ran to a natural end rather than failing.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !matches!(self.stop, CrawlStop::Failed(_))
    }

    #[must_use]
    pub fn error(&self) -> Option<&FetchError> {
        match &self.stop {
            CrawlStop::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Converts into a plain result, discarding partial records on failure.
    ///
    /// # Errors
    ///
    /// Returns the page error if the crawl failed.
    pub fn into_result(self) -> Result<Vec<RawRecord>> {
        match self.stop {
            CrawlStop::Failed(err) => Err(err),
            _ => Ok(self.records),
        }
    }
}

/// Gamma API client for bulk extraction.
pub struct GammaClient {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
    stop_on_short_page: bool,
    extra_params: Vec<(String, String)>,
    rate_limiter: Arc<DirectLimiter>,
}

impl GammaClient {
    /// Creates a client against the public Gamma API with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        Self::from_api_config(&ApiConfig::default())
    }

    /// Builds a client from the `[api]` settings alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_api_config(api: &ApiConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(api.timeout_secs))
            .user_agent(api.user_agent.clone())
            .danger_accept_invalid_certs(!api.verify_tls)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        if !api.verify_tls {
            tracing::warn!(base_url = %api.base_url, "TLS certificate verification disabled");
        }

        let rpm = NonZeroU32::new(api.requests_per_minute).unwrap_or(nonzero!(120u32));
        let base_url = if api.base_url.trim().is_empty() {
            GAMMA_API_URL.to_string()
        } else {
            api.base_url.trim_end_matches('/').to_string()
        };

        Ok(Self {
            http,
            base_url,
            retry: RetryPolicy::default(),
            stop_on_short_page: true,
            extra_params: Vec::new(),
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_minute(rpm))),
        })
    }

    /// Builds a client from the full pipeline configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Ok(Self::from_api_config(&config.api)?
            .with_retry_policy(RetryPolicy::from(&config.retry))
            .with_stop_on_short_page(config.extraction.stop_on_short_page))
    }

    /// Sets a custom base URL (useful for testing).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// When disabled, only an empty page ends a crawl.
    #[must_use]
    pub fn with_stop_on_short_page(mut self, stop: bool) -> Self {
        self.stop_on_short_page = stop;
        self
    }

    /// Adds a query parameter sent with every page request.
    #[must_use]
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_params.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Fetches a single page, retrying transient failures.
    ///
    /// `extra_params` are sent after `limit`, `offset` and the client-wide
    /// parameters set with [`Self::with_query_param`].
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::RetriesExhausted`] if every attempt failed with a
    /// connection error, or the first non-transient error otherwise.
    pub async fn fetch_page<K, V>(
        &self,
        endpoint: &str,
        limit: u32,
        offset: usize,
        extra_params: &[(K, V)],
    ) -> Result<Vec<RawRecord>>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        let mut query: Vec<(String, String)> = vec![
            ("limit".to_string(), limit.to_string()),
            ("offset".to_string(), offset.to_string()),
        ];
        query.extend(self.extra_params.iter().cloned());
        query.extend(
            extra_params
                .iter()
                .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string())),
        );

        self.retry
            .run(|attempt| {
                let url = url.as_str();
                let query = query.as_slice();
                async move {
                    tracing::debug!(url, limit, offset, attempt, "GET page");
                    self.get_records(url, query).await
                }
            })
            .await
    }

    async fn get_records(&self, url: &str, query: &[(String, String)]) -> Result<Vec<RawRecord>> {
        self.rate_limiter.until_ready().await;

        let response = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(FetchError::http(status.as_u16(), text));
        }

        let body = response.bytes().await?;
        let value: Value = serde_json::from_slice(&body)?;
        parse_page(value)
    }

    /// Crawls `endpoint` from offset zero.
    ///
    /// Stops on an empty page, on a short page (if enabled), once
    /// `max_records` have been gathered (`0` means unbounded), or on the first
    /// failed page. A failed crawl keeps the records fetched before it.
    pub async fn fetch_all(&self, endpoint: &str, limit: u32, max_records: usize) -> Crawl {
        let limit = limit.max(1);
        let mut records: Vec<RawRecord> = Vec::new();
        let mut pages_requested = 0usize;
        let mut offset = 0usize;

        let stop = loop {
            pages_requested += 1;
            let page = match self.fetch_page(endpoint, limit, offset, NO_PARAMS).await {
                Ok(page) => page,
                Err(err) => {
                    tracing::error!(
                        endpoint,
                        offset,
                        fetched = records.len(),
                        error = %err,
                        "Page fetch failed, stopping crawl"
                    );
                    break CrawlStop::Failed(err);
                }
            };

            let received = page.len();
            if received == 0 {
                break CrawlStop::EmptyPage;
            }

            offset += received;
            records.extend(page);
            tracing::info!(endpoint, received, total = records.len(), "Fetched page");

            if max_records > 0 && records.len() >= max_records {
                records.truncate(max_records);
                break CrawlStop::MaxRecords;
            }
            if self.stop_on_short_page && received < limit as usize {
                break CrawlStop::ShortPage;
            }
        };

        tracing::info!(
            endpoint,
            records = records.len(),
            pages = pages_requested,
            stop = ?stop,
            "Crawl finished"
        );

        Crawl {
            records,
            pages_requested,
            stop,
        }
    }

    /// Crawls one entity collection using the extraction settings.
    pub async fn fetch_entity(&self, kind: EntityKind, extraction: &ExtractionConfig) -> Crawl {
        self.fetch_all(
            kind.endpoint(),
            extraction.page_limit_for(kind),
            extraction.max_records,
        )
        .await
    }
}

const NO_PARAMS: &[(&str, &str)] = &[];

fn parse_page(value: Value) -> Result<Vec<RawRecord>> {
    let Value::Array(items) = value else {
        return Err(FetchError::UnexpectedShape(format!(
            "expected a JSON array, got {}",
            json_kind(&value)
        )));
    };

    let mut records = Vec::with_capacity(items.len());
    let mut skipped = 0usize;
    for item in items {
        match RawRecord::from_json(item) {
            Some(record) => records.push(record),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        tracing::warn!(skipped, "Ignored non-object array elements");
    }
    Ok(records)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
