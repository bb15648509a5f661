// src/video/mod.rs
//! Video platform resolution: a direct video, or the right upload on a channel.
//!
//! Channel listings escalate feed -> managed scrape -> official API. Every
//! stage is filtered by model name and loan window before any per-video work,
//! and each stage's listing is cached per channel so loans for other models of
//! the same channel reuse it.

pub mod address;
pub mod feed;
pub mod listing;
pub mod transcript;

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{source_key, vehicle_key, ContentCache, DEFAULT_MAX_ENTRIES};
use crate::dates::{extract_relative_from_page, in_window, parse_date_string, DEFAULT_FORWARD_DAYS, EXTENDED_FORWARD_DAYS};
use crate::error::FetchError;
use crate::limiter::RateLimiter;
use crate::matcher::title_matches;
use crate::providers::{
    HttpFetcher, ManagedScraper, ScrapeRequest, VideoApi, VideoDetails, VideoEntry, PROVIDER_SCRAPFLY,
    PROVIDER_VIDEO_API, PROVIDER_VIDEO_SITE,
};
use crate::types::{ContentType, Loan, Provenance, ResolvedContent, Tier};
use transcript::{TranscriptPipeline, DEFAULT_TRANSCRIPT_TTL_DAYS};
use address::{ChannelRef, VideoTarget};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VideoSettings {
    pub forward_days: i64,
    /// Second pass over the same listings when nothing fits `forward_days`.
    pub extended_forward_days: i64,
    pub scrape_scrolls: usize,
    pub scrape_wait_ms: u64,
    pub api_max_videos: usize,
    pub country: String,
    pub caption_concurrency: usize,
    pub allow_auto_captions: bool,
    pub max_audio_secs: u64,
    pub audio_timeout_secs: u64,
    pub transcript_cache_dir: Option<String>,
    pub transcript_ttl_days: i64,
    /// Channel listings go stale as new uploads land; kept far shorter than content.
    pub listing_ttl_hours: i64,
}

pub const DEFAULT_LISTING_TTL_HOURS: i64 = 6;

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            forward_days: DEFAULT_FORWARD_DAYS,
            extended_forward_days: EXTENDED_FORWARD_DAYS,
            scrape_scrolls: 5,
            scrape_wait_ms: 2000,
            api_max_videos: 200,
            country: "US".to_string(),
            caption_concurrency: 2,
            allow_auto_captions: true,
            max_audio_secs: 1800,
            audio_timeout_secs: 600,
            transcript_cache_dir: Some("cache/transcripts".to_string()),
            transcript_ttl_days: DEFAULT_TRANSCRIPT_TTL_DAYS,
            listing_ttl_hours: DEFAULT_LISTING_TTL_HOURS,
        }
    }
}

static RE_OWNER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""ownerChannelName"\s*:\s*"([^"]+)""#).expect("owner regex"));
static RE_VIEWS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""viewCount"\s*:\s*"(\d+)""#).expect("views regex"));
static RE_PUBLISH_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""(?:publishDate|uploadDate)"\s*:\s*"([^"]+)""#).expect("publish date regex"));

/// Metadata-only text blob for videos without any transcript.
pub fn metadata_text(d: &VideoDetails) -> String {
    let views = d
        .view_count
        .map(|v| v.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "Title: {}\nChannel: {}\nViews: {}\nDescription: {}",
        d.title, d.channel_title, views, d.description
    )
}

/// Details scraped from a watch page when the official API is not configured.
pub fn details_from_watch_page(video_id: &str, html: &str) -> VideoDetails {
    let doc = scraper::Html::parse_document(html);
    let title = crate::web::extract::extract_title(&doc)
        .trim_end_matches(" - YouTube")
        .to_string();
    let description = scraper::Selector::parse(r#"meta[name="description"], meta[property="og:description"]"#)
        .ok()
        .and_then(|sel| {
            doc.select(&sel)
                .filter_map(|e| e.value().attr("content"))
                .map(crate::web::extract::normalize_text)
                .find(|s| !s.is_empty())
        })
        .unwrap_or_default();
    let capture = |re: &Regex| re.captures(html).and_then(|c| c.get(1)).map(|m| m.as_str().to_string());
    let published_at = capture(&RE_PUBLISH_DATE)
        .and_then(|s| parse_date_string(&s))
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .or_else(|| extract_relative_from_page(html, Utc::now()));
    VideoDetails {
        video_id: video_id.to_string(),
        title,
        description,
        channel_title: capture(&RE_OWNER).unwrap_or_default(),
        view_count: capture(&RE_VIEWS).and_then(|v| v.parse().ok()),
        published_at,
    }
}

/// Earliest in-window upload whose title names the vehicle.
pub fn pick_video<'a>(entries: &'a [VideoEntry], loan: &Loan, forward_days: i64) -> Option<&'a VideoEntry> {
    entries
        .iter()
        .filter(|v| title_matches(&v.title, &loan.make, &loan.model))
        .filter_map(|v| {
            let d = v.published_at?.date_naive();
            in_window(d, loan.loan_start_date, forward_days).then_some((d, v))
        })
        .min_by_key(|(d, _)| *d)
        .map(|(_, v)| v)
}

/// Limiter key a listing stage is guarded under.
fn stage_provider(tier: Tier) -> &'static str {
    match tier {
        Tier::VideoScrape => PROVIDER_SCRAPFLY,
        Tier::VideoApi => PROVIDER_VIDEO_API,
        _ => PROVIDER_VIDEO_SITE,
    }
}

pub struct VideoPlatformResolver {
    http: Arc<dyn HttpFetcher>,
    scraper: Option<Arc<dyn ManagedScraper>>,
    api: Option<Arc<dyn VideoApi>>,
    transcripts: TranscriptPipeline,
    limiter: Arc<RateLimiter>,
    cache: Arc<ContentCache>,
    /// Per-channel, per-stage video lists.
    listings: ContentCache,
    settings: VideoSettings,
}

impl VideoPlatformResolver {
    pub fn new(
        http: Arc<dyn HttpFetcher>,
        transcripts: TranscriptPipeline,
        limiter: Arc<RateLimiter>,
        cache: Arc<ContentCache>,
        settings: VideoSettings,
    ) -> Self {
        let listings = ContentCache::with_ttl(
            DEFAULT_MAX_ENTRIES,
            chrono::Duration::hours(settings.listing_ttl_hours.max(1)),
        );
        Self {
            http,
            scraper: None,
            api: None,
            transcripts,
            limiter,
            cache,
            listings,
            settings,
        }
    }

    pub fn listing_ttl(&self) -> chrono::Duration {
        self.listings.ttl()
    }

    pub fn with_scraper(mut self, scraper: Arc<dyn ManagedScraper>) -> Self {
        self.scraper = Some(scraper);
        self
    }

    pub fn with_api(mut self, api: Arc<dyn VideoApi>) -> Self {
        self.api = Some(api);
        self
    }

    pub async fn resolve(&self, loan: &Loan, url: &str) -> Result<ResolvedContent, FetchError> {
        crate::metrics::ensure_metrics_described();
        match address::classify(url) {
            Some(VideoTarget::Video(id)) => {
                let key = vehicle_key(&format!("video:{id}"), &loan.make, &loan.model);
                if let Some(hit) = self.cached(&key) {
                    return Ok(hit);
                }
                counter!("resolver_tier_attempts_total", "tier" => Tier::VideoDirect.as_str()).increment(1);
                let content = self.video_content(url, &id, None, Tier::VideoDirect).await?;
                counter!("resolver_tier_success_total", "tier" => Tier::VideoDirect.as_str()).increment(1);
                self.store(&key, &content);
                Ok(content)
            }
            Some(VideoTarget::Channel(r)) => self.resolve_channel(loan, url, &r).await,
            None => Err(FetchError::no_match("not a video platform url")),
        }
    }

    fn cached(&self, key: &str) -> Option<ResolvedContent> {
        let raw = self.cache.get(key)?;
        match serde_json::from_str::<ResolvedContent>(&raw) {
            Ok(mut c) => {
                c.provenance.cached = true;
                Some(c)
            }
            Err(e) => {
                warn!(error = ?e, "dropping unreadable cache entry");
                None
            }
        }
    }

    fn store(&self, key: &str, content: &ResolvedContent) {
        match serde_json::to_string(content) {
            Ok(json) => self.cache.put(key, json),
            Err(e) => warn!(error = ?e, "could not cache video result"),
        }
    }

    async fn resolve_channel(&self, loan: &Loan, url: &str, r: &ChannelRef) -> Result<ResolvedContent, FetchError> {
        let key = vehicle_key(&r.identity(), &loan.make, &loan.model);
        if let Some(hit) = self.cached(&key) {
            // The key has no loan date; an earlier loan's pick may sit outside this window.
            match hit.published_at {
                Some(d) if in_window(d, loan.loan_start_date, self.settings.forward_days) => return Ok(hit),
                _ => debug!(
                    work_order = %loan.work_order,
                    published = ?hit.published_at,
                    "cached video outside loan window"
                ),
            }
        }
        let channel_id = self.channel_id(r).await?;

        let mut seen: Vec<(Tier, Vec<VideoEntry>)> = Vec::new();
        let mut reasons = Vec::new();
        for tier in [Tier::VideoFeed, Tier::VideoScrape, Tier::VideoApi] {
            if !self.stage_enabled(tier) {
                continue;
            }
            counter!("resolver_tier_attempts_total", "tier" => tier.as_str()).increment(1);
            let entries = match self.listing(tier, &channel_id).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(
                        error = ?e,
                        provider = stage_provider(tier),
                        tier = %tier,
                        work_order = %loan.work_order,
                        "listing stage failed"
                    );
                    reasons.push(format!("{tier}: {e}"));
                    continue;
                }
            };
            if let Some(v) = pick_video(&entries, loan, self.settings.forward_days) {
                return self.finish(loan, url, &key, v.clone(), tier).await;
            }
            debug!(tier = %tier, videos = entries.len(), "no in-window match");
            reasons.push(format!("{tier}: no match among {} videos", entries.len()));
            seen.push((tier, entries));
        }

        for (tier, entries) in &seen {
            if let Some(v) = pick_video(entries, loan, self.settings.extended_forward_days) {
                info!(
                    work_order = %loan.work_order,
                    days = self.settings.extended_forward_days,
                    "matched only in extended window"
                );
                return self.finish(loan, url, &key, v.clone(), *tier).await;
            }
        }
        Err(FetchError::no_match(reasons.join("; ")))
    }

    async fn finish(
        &self,
        loan: &Loan,
        url: &str,
        key: &str,
        entry: VideoEntry,
        tier: Tier,
    ) -> Result<ResolvedContent, FetchError> {
        let content = self.video_content(url, &entry.video_id, Some(&entry), tier).await?;
        counter!("resolver_tier_success_total", "tier" => tier.as_str()).increment(1);
        info!(work_order = %loan.work_order, tier = %tier, video_id = %entry.video_id, "video resolved");
        self.store(key, &content);
        Ok(content)
    }

    fn stage_enabled(&self, tier: Tier) -> bool {
        match tier {
            Tier::VideoScrape => self.scraper.is_some(),
            Tier::VideoApi => self.api.is_some(),
            _ => true,
        }
    }

    async fn channel_id(&self, r: &ChannelRef) -> Result<String, FetchError> {
        if let ChannelRef::Id(id) = r {
            return Ok(id.clone());
        }
        let key = format!("{}:channel_id", source_key(&r.identity()));
        if let Some(id) = self.cache.get(&key) {
            return Ok(id);
        }
        for page in r.candidate_pages() {
            match self
                .limiter
                .guarded(PROVIDER_VIDEO_SITE, || self.http.get(&page))
                .await
            {
                Ok(p) => {
                    if let Some(id) = address::channel_id_from_page(&p.body) {
                        self.cache.put(&key, id.clone());
                        return Ok(id);
                    }
                }
                Err(e) => debug!(error = ?e, "channel page fetch failed"),
            }
        }
        if let (Some(api), ChannelRef::Handle(h) | ChannelRef::Custom(h) | ChannelRef::User(h)) = (&self.api, r) {
            if let Some(id) = self
                .limiter
                .guarded(PROVIDER_VIDEO_API, || api.channel_id_for_handle(h))
                .await?
            {
                self.cache.put(&key, id.clone());
                return Ok(id);
            }
        }
        Err(FetchError::no_match(format!("channel id not found for {}", r.identity())))
    }

    async fn listing(&self, tier: Tier, channel_id: &str) -> Result<Vec<VideoEntry>, FetchError> {
        let key = format!("{}:{}", source_key(channel_id), tier.as_str());
        let (json, cached) = self
            .listings
            .get_or_fetch(&key, move || async move {
                let entries = self.fetch_listing(tier, channel_id).await?;
                if entries.is_empty() {
                    return Err(FetchError::no_match("empty listing"));
                }
                serde_json::to_string(&entries)
                    .map_err(|e| FetchError::unavailable(tier.as_str(), e))
            })
            .await?;
        debug!(tier = %tier, cached, "channel listing");
        serde_json::from_str(&json).map_err(|e| FetchError::unavailable(tier.as_str(), e))
    }

    async fn fetch_listing(&self, tier: Tier, channel_id: &str) -> Result<Vec<VideoEntry>, FetchError> {
        match tier {
            Tier::VideoFeed => {
                let feed = feed::feed_url(channel_id);
                let page = self
                    .limiter
                    .guarded(PROVIDER_VIDEO_SITE, || self.http.get(&feed))
                    .await?;
                feed::parse_feed(&page.body)
            }
            Tier::VideoScrape => {
                let Some(scraper) = &self.scraper else {
                    return Err(FetchError::no_match("managed scraper not configured"));
                };
                let req = ScrapeRequest {
                    scenario: Some(listing::scroll_scenario(
                        self.settings.scrape_scrolls,
                        self.settings.scrape_wait_ms,
                    )),
                    ..ScrapeRequest::rendered(&listing::videos_page_url(channel_id), &self.settings.country)
                };
                let req = &req;
                let resp = self
                    .limiter
                    .guarded(PROVIDER_SCRAPFLY, move || async move {
                        let resp = scraper.scrape(req).await?;
                        if !resp.success {
                            return Err(FetchError::unavailable(
                                PROVIDER_SCRAPFLY,
                                resp.error.as_deref().unwrap_or("scrape unsuccessful"),
                            ));
                        }
                        Ok(resp)
                    })
                    .await?;
                Ok(listing::parse_videos_page(&resp.content, Utc::now()))
            }
            Tier::VideoApi => {
                let Some(api) = &self.api else {
                    return Err(FetchError::no_match("video api not configured"));
                };
                self.limiter
                    .guarded(PROVIDER_VIDEO_API, || {
                        api.list_channel_videos(channel_id, self.settings.api_max_videos)
                    })
                    .await
            }
            other => Err(FetchError::no_match(format!("{other} is not a listing stage"))),
        }
    }

    async fn details(&self, video_id: &str) -> Option<VideoDetails> {
        if let Some(api) = &self.api {
            match self
                .limiter
                .guarded(PROVIDER_VIDEO_API, || api.video_details(video_id))
                .await
            {
                Ok(Some(d)) => return Some(d),
                Ok(None) => {}
                Err(e) => warn!(error = ?e, provider = PROVIDER_VIDEO_API, "video details failed"),
            }
        }
        let watch = format!("https://www.youtube.com/watch?v={video_id}");
        match self
            .limiter
            .guarded(PROVIDER_VIDEO_SITE, || self.http.get(&watch))
            .await
        {
            Ok(page) => Some(details_from_watch_page(video_id, &page.body)),
            Err(e) => {
                warn!(error = ?e, provider = PROVIDER_VIDEO_SITE, "watch page fetch failed");
                None
            }
        }
    }

    /// Transcript when one exists, metadata text otherwise.
    async fn video_content(
        &self,
        url: &str,
        video_id: &str,
        entry: Option<&VideoEntry>,
        tier: Tier,
    ) -> Result<ResolvedContent, FetchError> {
        let watch = format!("https://www.youtube.com/watch?v={video_id}");
        let transcript = self.transcripts.transcript(video_id).await;

        let details = match (&transcript, entry) {
            // A listing entry already carries title and date.
            (Some(_), Some(_)) => None,
            _ => self.details(video_id).await,
        };

        let title = entry
            .map(|e| e.title.clone())
            .filter(|t| !t.is_empty())
            .or_else(|| details.as_ref().map(|d| d.title.clone()))
            .unwrap_or_default();
        let published_at: Option<NaiveDate> = entry
            .and_then(|e| e.published_at)
            .or_else(|| details.as_ref().and_then(|d| d.published_at))
            .map(|d| d.date_naive());
        let channel_name = details
            .as_ref()
            .map(|d| d.channel_title.clone())
            .filter(|c| !c.is_empty());

        let (raw_text, content_type) = match transcript {
            Some(t) => (t.text, ContentType::Video),
            None => {
                let d = match details {
                    Some(d) => d,
                    None => match entry {
                        Some(e) => VideoDetails {
                            video_id: video_id.to_string(),
                            title: e.title.clone(),
                            description: e.description.clone(),
                            channel_title: String::new(),
                            view_count: None,
                            published_at: e.published_at,
                        },
                        None => {
                            return Err(FetchError::no_match(format!(
                                "no transcript or metadata for video {video_id}"
                            )))
                        }
                    },
                };
                (metadata_text(&d), ContentType::VideoMetadata)
            }
        };

        Ok(ResolvedContent {
            source_url: watch,
            original_url: url.to_string(),
            content_type,
            raw_text,
            title,
            provenance: Provenance {
                tier_used: tier,
                cached: false,
            },
            published_at,
            date_missing: published_at.is_none(),
            channel_name,
            video_id: Some(video_id.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};

    fn loan(model: &str) -> Loan {
        Loan {
            work_order: "WO-1".into(),
            make: "Mazda".into(),
            model: model.into(),
            candidate_urls: vec![],
            loan_start_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            media_person: String::new(),
        }
    }

    fn entry(id: &str, title: &str, published: Option<DateTime<Utc>>) -> VideoEntry {
        VideoEntry {
            video_id: id.into(),
            title: title.into(),
            published_at: published,
            description: String::new(),
        }
    }

    fn day(m: u32, d: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2025, m, d, 10, 0, 0).unwrap())
    }

    #[test]
    fn pick_prefers_earliest_matching_in_window() {
        let entries = vec![
            entry("A", "2025 Mazda CX-90 long-term update", day(5, 20)),
            entry("B", "Mazda CX-90 first drive", day(3, 10)),
            entry("C", "Mazda CX-50 review", day(3, 5)),
            entry("D", "Mazda CX-90 teaser", day(2, 1)),
            entry("E", "Mazda CX-90 no date", None),
        ];
        let v = pick_video(&entries, &loan("CX-90"), 90).unwrap();
        assert_eq!(v.video_id, "B");
        assert_eq!(pick_video(&entries, &loan("CX-5"), 90), None);
    }

    #[test]
    fn extended_window_reaches_further() {
        let entries = vec![entry("A", "Mazda CX-90 six months on", day(7, 15))];
        assert!(pick_video(&entries, &loan("CX-90"), 90).is_none());
        assert!(pick_video(&entries, &loan("CX-90"), 180).is_some());
    }

    #[test]
    fn listing_stages_log_their_limiter_key() {
        assert_eq!(stage_provider(Tier::VideoFeed), PROVIDER_VIDEO_SITE);
        assert_eq!(stage_provider(Tier::VideoScrape), PROVIDER_SCRAPFLY);
        assert_eq!(stage_provider(Tier::VideoApi), PROVIDER_VIDEO_API);
    }

    #[test]
    fn metadata_blob_lists_fields() {
        let d = VideoDetails {
            video_id: "X".into(),
            title: "CX-90 Walkaround".into(),
            description: "Quick look".into(),
            channel_title: "Auto Reviewer".into(),
            view_count: Some(1234),
            published_at: None,
        };
        assert_eq!(
            metadata_text(&d),
            "Title: CX-90 Walkaround\nChannel: Auto Reviewer\nViews: 1234\nDescription: Quick look"
        );
    }

    #[test]
    fn watch_page_details_are_scraped() {
        let html = r#"<html><head><title>2025 Mazda CX-90 Review - YouTube</title>
            <meta name="description" content="Full review of the CX-90."></head>
            <body><script>var ytInitialPlayerResponse = {"videoDetails":{"viewCount":"98765",
            "ownerChannelName":"Auto Reviewer"},"microformat":{"publishDate":"2025-03-09T07:00:00-07:00"}};</script></body></html>"#;
        let d = details_from_watch_page("AAAAAAAAAAA", html);
        assert_eq!(d.title, "2025 Mazda CX-90 Review");
        assert_eq!(d.description, "Full review of the CX-90.");
        assert_eq!(d.channel_title, "Auto Reviewer");
        assert_eq!(d.view_count, Some(98765));
        assert_eq!(d.published_at.map(|p| p.date_naive()), NaiveDate::from_ymd_opt(2025, 3, 9));
    }
}
