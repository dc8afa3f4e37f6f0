//! HTTP list fetcher for the CRM and inventory endpoints.

use std::marker::PhantomData;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

use super::Fetcher;
use crate::error::FetchError;
use crate::queue::Record;

/// Fetches a JSON array of records with a single GET request.
///
/// Performs no retries of its own; wrap it in a
/// [`RetryingFetcher`](super::RetryingFetcher) for that.
pub struct HttpFetcher<T> {
    client: Client,
    url: String,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> HttpFetcher<T> {
    /// Create a fetcher for `{base_url}{path}`.
    ///
    /// Fails if the combined URL is not a valid absolute URL.
    pub fn new(client: Client, base_url: &str, path: &str) -> Result<Self, FetchError> {
        let url = endpoint_url(base_url, path)?;
        Ok(Self {
            client,
            url,
            _record: PhantomData,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Join a base URL and a resource path without doubling the slash.
fn endpoint_url(base_url: &str, path: &str) -> Result<String, FetchError> {
    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    let url = Url::parse(&format!("{base}/{path}"))?;
    Ok(url.to_string())
}

/// Decode a list response. An empty body or a JSON `null` is an empty list.
fn decode_records<T: Record>(body: &[u8]) -> Result<Vec<T>, FetchError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    let records: Option<Vec<T>> = serde_json::from_slice(body)?;
    Ok(records.unwrap_or_default())
}

#[async_trait]
impl<T: Record> Fetcher<T> for HttpFetcher<T> {
    fn source(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<Vec<T>, FetchError> {
        info!(kind = T::KIND, url = %self.url, "fetch_started");

        let resp = self
            .client
            .get(&self.url)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let body = resp.bytes().await?;
        debug!(url = %self.url, body_length = body.len(), "fetch_body_received");

        let records = decode_records::<T>(&body)?;

        if records.is_empty() {
            warn!(kind = T::KIND, url = %self.url, "fetch_returned_empty");
        } else {
            info!(
                kind = T::KIND,
                url = %self.url,
                count = records.len(),
                "fetch_completed"
            );
        }

        Ok(records)
    }
}
