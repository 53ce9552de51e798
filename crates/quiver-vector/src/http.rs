//! Shared request plumbing for the HTTP-backed providers.

use quiver_core::{Error, Result};
use serde::de::DeserializeOwned;

/// Send `request`, failing on transport errors and non-2xx statuses.
///
/// The error keeps the status and response body so callers see what the
/// service actually said.
pub(crate) async fn send(provider: &str, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
    let response = request
        .send()
        .await
        .map_err(|e| Error::backend(provider, e))?;

    if !response.status().is_success() {
        return Err(status_error(provider, response).await);
    }
    Ok(response)
}

/// Error for a non-2xx `response`, keeping its status and body.
pub(crate) async fn status_error(provider: &str, response: reqwest::Response) -> Error {
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Error::backend(provider, format!("API error {status}: {error_text}"))
}

/// Send `request` and decode the JSON response body.
pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<T> {
    send(provider, request)
        .await?
        .json()
        .await
        .map_err(|e| Error::backend(provider, e))
}

/// Join a base URL and a path without doubling or dropping the slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
