//! Upstream fetch module.
//!
//! This module provides:
//! - The [`Fetcher`] seam used by the pipelines
//! - An HTTP list fetcher backed by a shared `reqwest::Client`
//! - A retry decorator with exponential backoff
//!
//! ## Flow
//!
//! ```text
//! Pipeline tick → RetryingFetcher → HttpFetcher → GET {base_url}{path}
//! ```

pub mod http;
pub mod retry;

use async_trait::async_trait;

use crate::error::FetchError;

pub use http::HttpFetcher;
pub use retry::{RetryPolicy, RetryingFetcher, MAX_BACKOFF};

/// Source of one snapshot of upstream records.
#[async_trait]
pub trait Fetcher<T>: Send + Sync {
    /// Human-readable location of the source, used in logs.
    fn source(&self) -> &str;

    /// Fetch the current snapshot, in upstream order.
    async fn fetch(&self) -> Result<Vec<T>, FetchError>;
}
