// src/error.rs
//! Provider-facing failure taxonomy.
//!
//! Every variant is recoverable: the fetchers translate it into "try the next
//! tier/stage". Configuration problems never show up here; they are `anyhow`
//! errors raised while loading [`crate::config::ResolverConfig`].

use std::time::Duration;

#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// Provider signalled throttling (HTTP 429, quota exceeded, etc.).
    #[error("{provider} rate limited (retry after {retry_after:?})")]
    ProviderRateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    /// Breaker is open or a cooldown is active; nothing was sent.
    #[error("{provider} blocked by circuit breaker for {wait:?}")]
    CircuitOpen { provider: String, wait: Duration },

    /// Network error, timeout, or 5xx.
    #[error("{provider} unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    #[error("content too short ({len} < {min})")]
    ContentTooShort { len: usize, min: usize },

    /// Every tier or stage for one URL was exhausted.
    #[error("no matching content: {0}")]
    NoMatchFound(String),
}

impl FetchError {
    pub fn unavailable(provider: impl Into<String>, reason: impl ToString) -> Self {
        Self::ProviderUnavailable {
            provider: provider.into(),
            reason: reason.to_string(),
        }
    }

    pub fn rate_limited(provider: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::ProviderRateLimited {
            provider: provider.into(),
            retry_after,
        }
    }

    pub fn no_match(why: impl Into<String>) -> Self {
        Self::NoMatchFound(why.into())
    }

    /// Short, stable label used for metrics and the not-found report.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProviderRateLimited { .. } => "rate_limited",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::ProviderUnavailable { .. } => "unavailable",
            Self::ContentTooShort { .. } => "too_short",
            Self::NoMatchFound(_) => "no_match",
        }
    }

    /// Map a reqwest failure onto the taxonomy.
    pub fn from_reqwest(provider: &str, e: &reqwest::Error) -> Self {
        if e.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
            return Self::rate_limited(provider, None);
        }
        let reason = if e.is_timeout() {
            "timeout".to_string()
        } else if e.is_connect() {
            "connect error".to_string()
        } else {
            e.to_string()
        };
        Self::unavailable(provider, reason)
    }
}

/// Parse a `Retry-After` header given in seconds. HTTP-date values are ignored
/// and fall back to the limiter's default cooldown.
pub fn retry_after_from_headers(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

    #[test]
    fn kinds_are_stable_labels() {
        assert_eq!(FetchError::rate_limited("x", None).kind(), "rate_limited");
        assert_eq!(FetchError::unavailable("x", "boom").kind(), "unavailable");
        assert_eq!(
            FetchError::ContentTooShort { len: 3, min: 500 }.kind(),
            "too_short"
        );
        assert_eq!(FetchError::no_match("none").kind(), "no_match");
    }

    #[test]
    fn retry_after_seconds_only() {
        let mut h = HeaderMap::new();
        assert_eq!(retry_after_from_headers(&h), None);
        h.insert(RETRY_AFTER, HeaderValue::from_static("120"));
        assert_eq!(retry_after_from_headers(&h), Some(Duration::from_secs(120)));
        h.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after_from_headers(&h), None);
    }
}
