// src/providers/search.rs
//! Google Custom Search JSON API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::http::classify_status;
use super::{build_client, SearchApi, SearchHit, PROVIDER_SEARCH, USER_AGENT};
use crate::error::FetchError;

pub const DEFAULT_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

#[derive(Debug, Deserialize)]
struct Resp {
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

pub struct GoogleSearchClient {
    http: reqwest::Client,
    api_key: String,
    engine_id: String,
    endpoint: String,
}

impl GoogleSearchClient {
    pub fn new(api_key: String, engine_id: String, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            http: build_client(USER_AGENT, timeout)?,
            api_key,
            engine_id,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        })
    }
}

#[async_trait]
impl SearchApi for GoogleSearchClient {
    async fn search(&self, query: &str, num: usize) -> Result<Vec<SearchHit>, FetchError> {
        let num = num.clamp(1, 10).to_string();
        let resp = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(PROVIDER_SEARCH, &e))?;

        // Daily quota exhaustion comes back as 403.
        if resp.status() == reqwest::StatusCode::FORBIDDEN {
            return Err(FetchError::rate_limited(PROVIDER_SEARCH, None));
        }
        classify_status(PROVIDER_SEARCH, resp.status(), resp.headers())?;

        let body: Resp = resp
            .json()
            .await
            .map_err(|e| FetchError::unavailable(PROVIDER_SEARCH, format!("decode: {e}")))?;
        Ok(body
            .items
            .into_iter()
            .filter(|i| !i.link.is_empty())
            .map(|i| SearchHit {
                title: i.title,
                url: i.link,
                snippet: i.snippet,
            })
            .collect())
    }
}
