// tests/common/mod.rs
//
// In-memory fakes for the provider traits. Every fake records its calls so
// tests can assert on escalation order and cache reuse.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;

use content_resolver::error::FetchError;
use content_resolver::limiter::{provider_key_for_url, LimiterSettings, Pace, RateLimiter};
use content_resolver::providers::{
    AudioSource, CaptionSource, HttpFetcher, ManagedScraper, Page, ScrapeRequest, ScrapeResponse,
    SearchApi, SearchHit, Transcriber, VideoApi, VideoDetails, VideoEntry,
};
use content_resolver::types::Loan;
use content_resolver::web::WebSettings;

pub fn loan(work_order: &str, make: &str, model: &str, urls: &[&str]) -> Loan {
    Loan {
        work_order: work_order.into(),
        make: make.into(),
        model: model.into(),
        candidate_urls: urls.iter().map(|u| u.to_string()).collect(),
        loan_start_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        media_person: String::new(),
    }
}

/// A review page of roughly 2 KB of body text.
pub fn article_html(title: &str, vehicle: &str, published: &str) -> String {
    let para = format!(
        "We spent a week with the {vehicle}, covering highway miles and school runs alike. "
    )
    .repeat(24);
    format!(
        r#"<!DOCTYPE html><html><head><title>{title}</title>
        <meta property="article:published_time" content="{published}"></head>
        <body><nav>Reviews News Buyers Guide</nav><article><h1>{title}</h1><p>{para}</p></article>
        <footer>Copyright</footer></body></html>"#
    )
}

/// Limiter that never makes tests wait for pacing tokens.
pub fn fast_limiter() -> Arc<RateLimiter> {
    let mut s = LimiterSettings::default();
    s.paces.clear();
    s.default_pace = Pace {
        requests: 1000,
        per_secs: 1,
    };
    Arc::new(RateLimiter::new(s))
}

pub fn quick_web_settings() -> WebSettings {
    WebSettings {
        managed_pause_ms: 0,
        search_delay_ms: 0,
        ..WebSettings::default()
    }
}

pub fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
        .and_utc()
}

// ---------------------------------------------------------------------------

/// Serves fixed bodies per URL; unknown URLs are unavailable.
#[derive(Default)]
pub struct RoutedHttp {
    pages: Mutex<HashMap<String, Result<String, FetchError>>>,
    pub calls: Mutex<Vec<String>>,
}

impl RoutedHttp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn page(self: &Arc<Self>, url: &str, body: impl Into<String>) -> Arc<Self> {
        self.pages.lock().insert(url.to_string(), Ok(body.into()));
        self.clone()
    }

    pub fn fail(self: &Arc<Self>, url: &str, err: FetchError) -> Arc<Self> {
        self.pages.lock().insert(url.to_string(), Err(err));
        self.clone()
    }

    pub fn count(&self, url: &str) -> usize {
        self.calls.lock().iter().filter(|u| u.as_str() == url).count()
    }
}

#[async_trait]
impl HttpFetcher for RoutedHttp {
    async fn get(&self, url: &str) -> Result<Page, FetchError> {
        self.calls.lock().push(url.to_string());
        match self.pages.lock().get(url).cloned() {
            Some(Ok(body)) => Ok(Page {
                final_url: url.to_string(),
                status: 200,
                body,
            }),
            Some(Err(e)) => Err(e),
            None => Err(FetchError::unavailable(provider_key_for_url(url), "http 404")),
        }
    }
}

/// Managed scraper answering by render mode.
pub struct ScriptedScraper {
    pub plain: ScrapeResponse,
    pub rendered: ScrapeResponse,
    pub calls: Mutex<Vec<ScrapeRequest>>,
}

impl ScriptedScraper {
    pub fn new(plain: ScrapeResponse, rendered: ScrapeResponse) -> Arc<Self> {
        Arc::new(Self {
            plain,
            rendered,
            calls: Mutex::new(Vec::new()),
        })
    }
}

pub fn scraped(content: impl Into<String>) -> ScrapeResponse {
    ScrapeResponse {
        success: true,
        content: content.into(),
        title: None,
        cost: Some(1),
        error: None,
    }
}

#[async_trait]
impl ManagedScraper for ScriptedScraper {
    async fn scrape(&self, req: &ScrapeRequest) -> Result<ScrapeResponse, FetchError> {
        self.calls.lock().push(req.clone());
        Ok(if req.render_js {
            self.rendered.clone()
        } else {
            self.plain.clone()
        })
    }
}

pub struct FixedSearch {
    pub hits: Vec<SearchHit>,
    pub queries: Mutex<Vec<String>>,
}

impl FixedSearch {
    pub fn new(hits: Vec<SearchHit>) -> Arc<Self> {
        Arc::new(Self {
            hits,
            queries: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl SearchApi for FixedSearch {
    async fn search(&self, query: &str, _num: usize) -> Result<Vec<SearchHit>, FetchError> {
        self.queries.lock().push(query.to_string());
        Ok(self.hits.clone())
    }
}

#[derive(Default)]
pub struct FakeVideoApi {
    pub videos: Vec<VideoEntry>,
    pub details: HashMap<String, VideoDetails>,
    pub handles: HashMap<String, String>,
    pub list_calls: Mutex<u32>,
}

#[async_trait]
impl VideoApi for FakeVideoApi {
    async fn channel_id_for_handle(&self, handle: &str) -> Result<Option<String>, FetchError> {
        Ok(self.handles.get(handle).cloned())
    }

    async fn list_channel_videos(&self, _channel_id: &str, max: usize) -> Result<Vec<VideoEntry>, FetchError> {
        *self.list_calls.lock() += 1;
        Ok(self.videos.iter().take(max).cloned().collect())
    }

    async fn video_details(&self, video_id: &str) -> Result<Option<VideoDetails>, FetchError> {
        Ok(self.details.get(video_id).cloned())
    }
}

/// Captions for the listed ids only.
#[derive(Default)]
pub struct MapCaptions {
    pub texts: HashMap<String, String>,
    pub calls: Mutex<Vec<String>>,
}

#[async_trait]
impl CaptionSource for MapCaptions {
    async fn captions(&self, video_id: &str) -> Result<Option<String>, FetchError> {
        self.calls.lock().push(video_id.to_string());
        Ok(self.texts.get(video_id).cloned())
    }
}

pub struct NoAudio;

#[async_trait]
impl AudioSource for NoAudio {
    async fn download(&self, video_id: &str, _dir: &Path) -> Result<PathBuf, FetchError> {
        Err(FetchError::no_match(format!("no audio for {video_id}")))
    }
}

#[async_trait]
impl Transcriber for NoAudio {
    async fn transcribe(&self, _audio: Vec<u8>, _file_name: &str) -> Result<String, FetchError> {
        Err(FetchError::unavailable("whisper", "unused"))
    }
}

pub fn atom_feed(entries: &[(&str, &str, &str)]) -> String {
    let body: String = entries
        .iter()
        .map(|(id, title, published)| {
            format!(
                "<entry><id>yt:video:{id}</id><yt:videoId>{id}</yt:videoId><title>{title}</title><published>{published}</published></entry>"
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><feed xmlns:yt="http://www.youtube.com/xml/schemas/2015" xmlns="http://www.w3.org/2005/Atom"><title>Channel</title>{body}</feed>"#
    )
}
