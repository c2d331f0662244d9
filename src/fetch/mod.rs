//! Retrieval of the network document and snapshot payloads.

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use reqwest::header::{CACHE_CONTROL, HeaderValue, PRAGMA};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::FetchError;

/// Fetches the raw network document text.
///
/// A millisecond timestamp is appended as a query parameter so intermediate
/// caches never serve a stale document. If the first attempt fails for any
/// reason, the request is retried exactly once with explicit no-cache
/// directives before a [`FetchError`] surfaces.
pub async fn fetch_document<C: HttpClient>(client: &C, url: &str) -> Result<String, FetchError> {
    match attempt(client, url, false).await {
        Ok(text) => Ok(text),
        Err(err) => {
            warn!(url, error = %err, "fetch failed, retrying with no-cache directives");
            attempt(client, url, true).await
        }
    }
}

/// Fetches and decodes a JSON payload under the same cache-defeating retry
/// policy as [`fetch_document`].
pub async fn fetch_json<C: HttpClient, T: DeserializeOwned>(
    client: &C,
    url: &str,
) -> Result<T, FetchError> {
    let text = fetch_document(client, url).await?;
    Ok(serde_json::from_str(&text)?)
}

async fn attempt<C: HttpClient>(
    client: &C,
    url: &str,
    no_cache: bool,
) -> Result<String, FetchError> {
    let mut req = reqwest::Request::new(
        reqwest::Method::GET,
        url.parse()
            .map_err(|_| FetchError::InvalidUrl(url.to_string()))?,
    );

    req.url_mut()
        .query_pairs_mut()
        .append_pair("t", &chrono::Utc::now().timestamp_millis().to_string());

    if no_cache {
        let headers = req.headers_mut();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    }

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status(status));
    }

    debug!(url, status = %status, "document fetched");
    Ok(resp.text().await?)
}
