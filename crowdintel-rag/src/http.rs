//! Helpers shared by the HTTP backends.
//!
//! Failures are split into transient ones ([`RagError::Transport`], retried by
//! the retry policy) and permanent ones reported against the embedding or
//! generation provider.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::error;

use crate::error::{RagError, Result};

/// Default per-request timeout for every HTTP backend.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Which collaborator a request was sent to.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Upstream {
    Embedding,
    Generation,
}

impl Upstream {
    fn permanent(self, provider: &str, message: String) -> RagError {
        match self {
            Upstream::Embedding => RagError::EmbeddingError { provider: provider.into(), message },
            Upstream::Generation => RagError::GenerationError { provider: provider.into(), message },
        }
    }
}

pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RagError::ConfigError(format!("failed to build HTTP client: {e}")))
}

/// Map a failure to send or receive a request.
pub(crate) fn request_error(provider: &str, upstream: Upstream, e: reqwest::Error) -> RagError {
    error!(provider, error = %e, "request failed");
    if e.is_timeout() || e.is_connect() || e.is_request() {
        RagError::Transport { provider: provider.into(), message: format!("request failed: {e}") }
    } else {
        upstream.permanent(provider, format!("request failed: {e}"))
    }
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Turn a non-success response into an error, reading the API's error message
/// when the body carries one.
pub(crate) async fn status_error(provider: &str, upstream: Upstream, response: Response) -> RagError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail =
        serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);

    error!(provider, %status, "API error");
    let message = format!("API returned {status}: {detail}");
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        RagError::Transport { provider: provider.into(), message }
    } else {
        upstream.permanent(provider, message)
    }
}

/// Map a response body that could not be decoded.
pub(crate) fn decode_error(provider: &str, e: reqwest::Error) -> RagError {
    error!(provider, error = %e, "failed to parse response");
    RagError::MalformedResponse {
        backend: provider.into(),
        message: format!("failed to parse response: {e}"),
    }
}
