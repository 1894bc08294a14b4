//! HTTP retry helpers for transient backend errors.
//!
//! Every backend call goes through [`send`] (or [`send_json`]). Idempotent
//! requests retry connection failures, timeouts, HTTP 429 and HTTP 5xx
//! with exponential backoff. Requests that create state use
//! [`Retry::ConnectOnly`] and are only repeated when the connection was
//! never established. Other 4xx responses are permanent and returned
//! immediately.
//!
//! ```ignore
//! let body = retry::send_json(|| client.get(&url), Retry::Idempotent).await?;
//! retry::send(|| client.post(&url).json(&body), Retry::ConnectOnly).await?;
//! ```

use std::time::Duration;

use crate::ApiError;

/// Retries after the first attempt. With the default base delay the
/// backoff sequence is 500ms, 1s, 2s.
pub const MAX_RETRIES: u32 = 3;

/// Delay before the first retry; doubles on each subsequent one.
const BASE_DELAY: Duration = Duration::from_millis(500);

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 300;

/// Backoff before retry number `attempt` (1-based).
#[must_use]
pub fn backoff_delay(attempt: u32) -> Duration {
    BASE_DELAY * 2u32.saturating_pow(attempt.saturating_sub(1))
}

/// Which failures a request may be repeated after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    /// Repeating the request is harmless (GET, DELETE-all).
    Idempotent,
    /// The request creates state; only retry when it never left the client.
    ConnectOnly,
}

impl Retry {
    fn retries_error(self, e: &reqwest::Error) -> bool {
        match self {
            Self::Idempotent => is_transient(e),
            Self::ConnectOnly => e.is_connect(),
        }
    }

    fn retries_status(self, status: reqwest::StatusCode) -> bool {
        match self {
            Self::Idempotent => is_retryable_status(status),
            Self::ConnectOnly => false,
        }
    }
}

/// Sends a request and parses the response body as JSON.
///
/// `build_request` is called once per attempt since builders are consumed
/// by `send()`.
///
/// # Errors
///
/// Returns [`ApiError`] if the request still fails after the retries
/// allowed by `retry`, the server answers with an error status, or the body
/// is not valid JSON.
pub async fn send_json<F>(build_request: F, retry: Retry) -> Result<serde_json::Value, ApiError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = send(build_request, retry).await?;
    let url = response.url().to_string();
    let status = response.status();
    let text = response.text().await?;

    serde_json::from_str(&text).map_err(|e| {
        let preview = if text.len() > BODY_PREVIEW_LEN {
            format!("{}...", text.chars().take(BODY_PREVIEW_LEN).collect::<String>())
        } else {
            text.clone()
        };
        log::error!(
            "JSON parse failed\n  \
             url: {url}\n  \
             status: {status}\n  \
             received: {} bytes\n  \
             parse error: {e}\n  \
             body preview: {preview}",
            text.len(),
        );
        ApiError::Json(e)
    })
}

/// Sends a request, retrying the failures `retry` allows, and returns the
/// first successful response.
///
/// # Errors
///
/// Returns [`ApiError::Unavailable`] for transport failures that outlast the
/// retries, or [`ApiError::Status`] for error statuses.
pub async fn send<F>(build_request: F, retry: Retry) -> Result<reqwest::Response, ApiError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            log::warn!("  retry {attempt}/{MAX_RETRIES} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        match build_request().send().await {
            Err(e) => {
                if retry.retries_error(&e) && attempt < MAX_RETRIES {
                    log::warn!("  transient error: {e}");
                    attempt += 1;
                    continue;
                }
                return Err(ApiError::Unavailable(e));
            }
            Ok(response) => {
                let status = response.status();

                if retry.retries_status(status) && attempt < MAX_RETRIES {
                    log::warn!("  HTTP {status} from {}", response.url());
                    attempt += 1;
                    continue;
                }

                if status.is_client_error() || status.is_server_error() {
                    return Err(ApiError::Status { status });
                }

                return Ok(response);
            }
        }
    }
}

/// 429 and 5xx are worth another attempt; other statuses are final.
#[must_use]
pub fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_request()
}
