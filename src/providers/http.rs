// src/providers/http.rs
use std::time::Duration;

use async_trait::async_trait;

use super::{build_client, HttpFetcher, Page, BROWSER_USER_AGENT};
use crate::error::{retry_after_from_headers, FetchError};
use crate::limiter::provider_key_for_url;

/// Plain GET with a browser user agent.
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(BROWSER_USER_AGENT, timeout)?,
        })
    }
}

/// Status handling shared by the fetchers: 429 is throttling, anything else
/// outside 2xx means this route did not produce the page.
pub(crate) fn classify_status(
    provider: &str,
    status: reqwest::StatusCode,
    headers: &reqwest::header::HeaderMap,
) -> Result<(), FetchError> {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(FetchError::rate_limited(provider, retry_after_from_headers(headers)));
    }
    if !status.is_success() {
        return Err(FetchError::unavailable(provider, format!("http {}", status.as_u16())));
    }
    Ok(())
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn get(&self, url: &str) -> Result<Page, FetchError> {
        let provider = provider_key_for_url(url);
        let resp = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&provider, &e))?;

        let status = resp.status();
        classify_status(&provider, status, resp.headers())?;
        let final_url = resp.url().to_string();
        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(&provider, &e))?;

        Ok(Page {
            final_url,
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
    use reqwest::StatusCode;

    #[test]
    fn statuses_map_to_taxonomy() {
        let mut h = HeaderMap::new();
        h.insert(RETRY_AFTER, HeaderValue::from_static("42"));
        match classify_status("a.com", StatusCode::TOO_MANY_REQUESTS, &h) {
            Err(FetchError::ProviderRateLimited { retry_after, .. }) => {
                assert_eq!(retry_after, Some(Duration::from_secs(42)))
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            classify_status("a.com", StatusCode::FORBIDDEN, &HeaderMap::new()),
            Err(FetchError::ProviderUnavailable { .. })
        ));
        assert!(classify_status("a.com", StatusCode::OK, &HeaderMap::new()).is_ok());
    }
}
