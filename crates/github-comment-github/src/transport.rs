//! Retry and error-shaping helpers shared by the REST and GraphQL paths.

use std::time::Duration;

pub(crate) fn is_retryable_status(status: u16) -> bool {
    status == 429 || status >= 500
}

pub(crate) fn is_retryable_transport_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect()
}

pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let value = headers.get(reqwest::header::RETRY_AFTER)?;
    let seconds = value.to_str().ok()?.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(seconds))
}

/// Exponential backoff from `base_delay_ms`, overridden by a server-provided
/// Retry-After when that is longer.
pub(crate) fn retry_delay(
    base_delay_ms: u64,
    attempt: usize,
    retry_after: Option<Duration>,
) -> Duration {
    let shift = attempt.saturating_sub(1).min(6) as u32;
    let backoff = Duration::from_millis(base_delay_ms.saturating_mul(1_u64 << shift));
    match retry_after {
        Some(server) if server > backoff => server,
        _ => backoff,
    }
}

pub(crate) fn truncate_for_error(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        return body.to_string();
    }
    let truncated: String = body.chars().take(max_chars).collect();
    format!("{truncated}...")
}
