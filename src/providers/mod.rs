// src/providers/mod.rs
//! External collaborators the engine calls, one trait per seam.
//!
//! Every implementation maps its failures onto [`FetchError`]; none of them
//! touch the rate limiter. Pacing and breaker accounting happen in the tiers
//! that call them (see [`crate::limiter::RateLimiter::guarded`]).

pub mod audio;
pub mod captions;
pub mod http;
pub mod scrapfly;
pub mod search;
pub mod whisper;
pub mod youtube_api;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

pub const PROVIDER_SCRAPFLY: &str = "scrapfly";
pub const PROVIDER_SEARCH: &str = "google_search";
pub const PROVIDER_VIDEO_API: &str = "youtube_api";
pub const PROVIDER_WHISPER: &str = "whisper";
pub const PROVIDER_VIDEO_SITE: &str = "youtube.com";

pub const USER_AGENT: &str = "content-resolver/0.1";
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// reqwest client with explicit connect and overall timeouts.
pub fn build_client(user_agent: &str, timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .connect_timeout(Duration::from_secs(4))
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .context("building reqwest client")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Location after redirects.
    pub final_url: String,
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn get(&self, url: &str) -> Result<Page, FetchError>;
}

/// One step of a scripted browser session on the managed scraper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioStep {
    ScrollToBottom,
    WaitMs(u64),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeRequest {
    pub url: String,
    pub render_js: bool,
    /// Anti-bot bypass mode.
    pub stealth: bool,
    pub country: String,
    pub scenario: Option<Vec<ScenarioStep>>,
}

impl ScrapeRequest {
    pub fn plain(url: &str, country: &str) -> Self {
        Self {
            url: url.to_string(),
            render_js: false,
            stealth: false,
            country: country.to_string(),
            scenario: None,
        }
    }

    pub fn rendered(url: &str, country: &str) -> Self {
        Self {
            render_js: true,
            stealth: true,
            ..Self::plain(url, country)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapeResponse {
    pub success: bool,
    pub content: String,
    pub title: Option<String>,
    pub cost: Option<u32>,
    pub error: Option<String>,
}

#[async_trait]
pub trait ManagedScraper: Send + Sync {
    async fn scrape(&self, req: &ScrapeRequest) -> Result<ScrapeResponse, FetchError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[async_trait]
pub trait SearchApi: Send + Sync {
    async fn search(&self, query: &str, num: usize) -> Result<Vec<SearchHit>, FetchError>;
}

/// A video as seen in a channel listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoEntry {
    pub video_id: String,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDetails {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub channel_title: String,
    pub view_count: Option<u64>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Official video platform API.
#[async_trait]
pub trait VideoApi: Send + Sync {
    async fn channel_id_for_handle(&self, handle: &str) -> Result<Option<String>, FetchError>;
    /// Newest first.
    async fn list_channel_videos(&self, channel_id: &str, max: usize)
        -> Result<Vec<VideoEntry>, FetchError>;
    async fn video_details(&self, video_id: &str) -> Result<Option<VideoDetails>, FetchError>;
}

/// Native captions; `Ok(None)` when the video has none.
#[async_trait]
pub trait CaptionSource: Send + Sync {
    async fn captions(&self, video_id: &str) -> Result<Option<String>, FetchError>;
}

/// Downloads a video's audio track into `dir`, returning the file path.
#[async_trait]
pub trait AudioSource: Send + Sync {
    async fn download(&self, video_id: &str, dir: &Path) -> Result<PathBuf, FetchError>;
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String, FetchError>;
}
