// src/providers/scrapfly.rs
//! Managed anti-bot scraping through the ScrapFly HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use super::http::classify_status;
use super::{build_client, ManagedScraper, ScenarioStep, ScrapeRequest, ScrapeResponse, PROVIDER_SCRAPFLY, USER_AGENT};
use crate::error::FetchError;

pub const DEFAULT_ENDPOINT: &str = "https://api.scrapfly.io/scrape";

static RE_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title regex"));

#[derive(Debug, Deserialize, Default)]
struct ApiResponse {
    #[serde(default)]
    result: ApiResult,
    #[serde(default)]
    context: ApiContext,
}

#[derive(Debug, Deserialize, Default)]
struct ApiResult {
    #[serde(default)]
    content: String,
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiContext {
    #[serde(default)]
    cost: Option<ApiCost>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiCost {
    #[serde(default)]
    total: Option<u32>,
}

pub struct ScrapflyClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl ScrapflyClient {
    pub fn new(api_key: String, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            http: build_client(USER_AGENT, timeout)?,
            api_key,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// ScrapFly expects the browser scenario as base64url-encoded JSON.
pub fn encode_scenario(steps: &[ScenarioStep]) -> String {
    let actions: Vec<serde_json::Value> = steps
        .iter()
        .map(|s| match s {
            ScenarioStep::ScrollToBottom => json!({ "scroll": { "selector": "bottom" } }),
            ScenarioStep::WaitMs(ms) => json!({ "wait": ms }),
        })
        .collect();
    let raw = serde_json::Value::Array(actions).to_string();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw)
}

pub fn extract_title(html: &str) -> Option<String> {
    RE_TITLE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| html_escape::decode_html_entities(m.as_str().trim()).to_string())
        .filter(|t| !t.is_empty())
}

fn query_params(req: &ScrapeRequest, key: &str) -> Vec<(&'static str, String)> {
    let mut q = vec![
        ("key", key.to_string()),
        ("url", req.url.clone()),
        ("country", req.country.to_ascii_lowercase()),
    ];
    if req.render_js {
        q.push(("render_js", "true".into()));
    }
    if req.stealth {
        q.push(("asp", "true".into()));
    }
    if let Some(steps) = req.scenario.as_deref().filter(|s| !s.is_empty()) {
        q.push(("js_scenario", encode_scenario(steps)));
        if !req.render_js {
            q.push(("render_js", "true".into()));
        }
    }
    q
}

#[async_trait]
impl ManagedScraper for ScrapflyClient {
    async fn scrape(&self, req: &ScrapeRequest) -> Result<ScrapeResponse, FetchError> {
        let resp = self
            .http
            .get(&self.endpoint)
            .query(&query_params(req, &self.api_key))
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(PROVIDER_SCRAPFLY, &e))?;
        classify_status(PROVIDER_SCRAPFLY, resp.status(), resp.headers())?;

        let body: ApiResponse = resp
            .json()
            .await
            .map_err(|e| FetchError::unavailable(PROVIDER_SCRAPFLY, format!("decode: {e}")))?;

        let cost = body.context.cost.and_then(|c| c.total);
        let error = body.result.error.filter(|e| !e.is_null()).map(|e| e.to_string());
        if let Some(err) = &error {
            if err.contains("THROTTLE") || err.contains("QUOTA") {
                return Err(FetchError::rate_limited(PROVIDER_SCRAPFLY, None));
            }
        }
        tracing::debug!(url = %req.url, render_js = req.render_js, cost = ?cost, "scrapfly response");

        let title = extract_title(&body.result.content);
        Ok(ScrapeResponse {
            success: body.result.success && !body.result.content.is_empty(),
            content: body.result.content,
            title,
            cost,
            error,
        })
    }
}
