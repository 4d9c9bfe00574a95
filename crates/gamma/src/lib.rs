//! Gamma API extraction for the market warehouse.
//!
//! Provides:
//! - [`GammaClient`]: rate-limited `limit`/`offset` crawler
//! - [`RetryPolicy`]: exponential backoff for connection failures
//! - [`Crawl`]: records gathered plus the reason the crawl stopped

pub mod client;
pub mod error;
pub mod retry;

pub use client::{Crawl, CrawlStop, GammaClient};
pub use error::{FetchError, Result};
pub use retry::RetryPolicy;
