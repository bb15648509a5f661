// src/web/mod.rs
//! Article fetching as an ordered ladder of tiers.
//!
//! Each [`FetchTier`] produces raw HTML for a candidate URL; the fetcher owns
//! extraction and the acceptance checks (length, vehicle relevance, loan date)
//! so every tier is judged by the same rules.

pub mod extract;
pub mod index;
pub mod search;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{article_url_key, short_id, vehicle_key, ContentCache};
use crate::dates::extract_published_date;
use crate::error::FetchError;
use crate::limiter::{provider_key_for_url, RateLimiter};
use crate::matcher::title_matches;
use crate::providers::{
    HttpFetcher, ManagedScraper, ScrapeRequest, SearchApi, PROVIDER_SCRAPFLY, PROVIDER_SEARCH,
};
use crate::types::{ContentType, Loan, Provenance, ResolvedContent, Tier};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WebSettings {
    /// Extracted text shorter than this is a failed attempt.
    pub min_content_len: usize,
    pub max_content_chars: usize,
    /// Pause enforced before the rendered managed attempt.
    pub managed_pause_ms: u64,
    pub country: String,
    pub search_results: usize,
    pub search_delay_ms: u64,
    /// How much of the body, besides the title, the relevance check reads.
    pub relevance_chars: usize,
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            min_content_len: 500,
            max_content_chars: 20_000,
            managed_pause_ms: 1000,
            country: "US".to_string(),
            search_results: 5,
            search_delay_ms: 500,
            relevance_chars: 2000,
        }
    }
}

/// One candidate URL for one loan.
#[derive(Debug, Clone, Copy)]
pub struct WebRequest<'a> {
    pub loan: &'a Loan,
    pub url: &'a str,
}

/// Raw page a tier produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierOutput {
    /// The page actually fetched; differs from the request for search hits.
    pub page_url: String,
    pub html: String,
}

#[async_trait]
pub trait FetchTier: Send + Sync {
    fn tier(&self) -> Tier;
    /// Limiter key the attempt is guarded under.
    fn provider_key(&self, req: &WebRequest<'_>) -> String;
    async fn attempt(&self, req: &WebRequest<'_>) -> Result<TierOutput, FetchError>;
}

/// Known outlet quirks: pages that moved to a different section.
pub fn rewrite_url(url: &str) -> String {
    let lower = url.to_lowercase();
    if lower.contains("motortrend.com/automobilemag") {
        return url.replacen("/automobilemag", "/car-reviews", 1);
    }
    if lower.contains("tightwadgarage.com") && !lower.contains("/blog") {
        return if url.ends_with('/') {
            format!("{url}blog")
        } else {
            format!("{url}/blog")
        };
    }
    url.to_string()
}

pub struct DirectTier {
    http: Arc<dyn HttpFetcher>,
    limiter: Arc<RateLimiter>,
}

impl DirectTier {
    pub fn new(http: Arc<dyn HttpFetcher>, limiter: Arc<RateLimiter>) -> Self {
        Self { http, limiter }
    }
}

#[async_trait]
impl FetchTier for DirectTier {
    fn tier(&self) -> Tier {
        Tier::Direct
    }

    fn provider_key(&self, req: &WebRequest<'_>) -> String {
        provider_key_for_url(req.url)
    }

    async fn attempt(&self, req: &WebRequest<'_>) -> Result<TierOutput, FetchError> {
        let key = provider_key_for_url(req.url);
        let page = self.limiter.guarded(&key, || self.http.get(req.url)).await?;
        Ok(TierOutput {
            page_url: page.final_url,
            html: page.body,
        })
    }
}

async fn managed_fetch(
    scraper: &dyn ManagedScraper,
    limiter: &RateLimiter,
    req: ScrapeRequest,
) -> Result<TierOutput, FetchError> {
    let sreq = &req;
    let resp = limiter
        .guarded(PROVIDER_SCRAPFLY, move || async move {
            let resp = scraper.scrape(sreq).await?;
            if !resp.success {
                return Err(FetchError::unavailable(
                    PROVIDER_SCRAPFLY,
                    resp.error.as_deref().unwrap_or("scrape unsuccessful"),
                ));
            }
            Ok(resp)
        })
        .await?;
    if let Some(cost) = resp.cost {
        debug!(cost, render_js = req.render_js, "managed scrape cost");
    }
    Ok(TierOutput {
        page_url: req.url,
        html: resp.content,
    })
}

pub struct ManagedPlainTier {
    scraper: Arc<dyn ManagedScraper>,
    limiter: Arc<RateLimiter>,
    country: String,
}

impl ManagedPlainTier {
    pub fn new(scraper: Arc<dyn ManagedScraper>, limiter: Arc<RateLimiter>, country: &str) -> Self {
        Self {
            scraper,
            limiter,
            country: country.to_string(),
        }
    }
}

#[async_trait]
impl FetchTier for ManagedPlainTier {
    fn tier(&self) -> Tier {
        Tier::ManagedPlain
    }

    fn provider_key(&self, _req: &WebRequest<'_>) -> String {
        PROVIDER_SCRAPFLY.to_string()
    }

    async fn attempt(&self, req: &WebRequest<'_>) -> Result<TierOutput, FetchError> {
        let sreq = ScrapeRequest::plain(req.url, &self.country);
        managed_fetch(self.scraper.as_ref(), &self.limiter, sreq).await
    }
}

pub struct ManagedRenderedTier {
    scraper: Arc<dyn ManagedScraper>,
    limiter: Arc<RateLimiter>,
    country: String,
    pause: Duration,
}

impl ManagedRenderedTier {
    pub fn new(
        scraper: Arc<dyn ManagedScraper>,
        limiter: Arc<RateLimiter>,
        country: &str,
        pause: Duration,
    ) -> Self {
        Self {
            scraper,
            limiter,
            country: country.to_string(),
            pause,
        }
    }
}

#[async_trait]
impl FetchTier for ManagedRenderedTier {
    fn tier(&self) -> Tier {
        Tier::ManagedRendered
    }

    fn provider_key(&self, _req: &WebRequest<'_>) -> String {
        PROVIDER_SCRAPFLY.to_string()
    }

    async fn attempt(&self, req: &WebRequest<'_>) -> Result<TierOutput, FetchError> {
        if !self.pause.is_zero() {
            tokio::time::sleep(self.pause).await;
        }
        let sreq = ScrapeRequest::rendered(req.url, &self.country);
        managed_fetch(self.scraper.as_ref(), &self.limiter, sreq).await
    }
}

/// Finds the outlet's own article for the vehicle through site-scoped search.
pub struct SearchFallbackTier {
    search: Arc<dyn SearchApi>,
    http: Arc<dyn HttpFetcher>,
    scraper: Option<Arc<dyn ManagedScraper>>,
    limiter: Arc<RateLimiter>,
    cache: Arc<ContentCache>,
    settings: WebSettings,
}

impl SearchFallbackTier {
    pub fn new(
        search: Arc<dyn SearchApi>,
        http: Arc<dyn HttpFetcher>,
        scraper: Option<Arc<dyn ManagedScraper>>,
        limiter: Arc<RateLimiter>,
        cache: Arc<ContentCache>,
        settings: WebSettings,
    ) -> Self {
        Self {
            search,
            http,
            scraper,
            limiter,
            cache,
            settings,
        }
    }

    async fn discover(&self, loan: &Loan, domain: &str) -> Result<String, FetchError> {
        let key = article_url_key(domain, &loan.make, &loan.model);
        if let Some(url) = self.cache.get(&key) {
            debug!(domain, "search url cache hit");
            return Ok(url);
        }
        let queries = search::build_queries(domain, &loan.make, &loan.model, &loan.media_person);
        for (i, q) in queries.iter().enumerate() {
            if i > 0 && self.settings.search_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.settings.search_delay_ms)).await;
            }
            let hits = self
                .limiter
                .guarded(PROVIDER_SEARCH, || {
                    self.search.search(q, self.settings.search_results)
                })
                .await?;
            if let Some(hit) =
                search::best_hit(&hits, &loan.make, &loan.model, &loan.media_person, domain)
            {
                self.cache.put(&key, hit.url.clone());
                return Ok(hit.url);
            }
        }
        Err(FetchError::no_match(format!(
            "no qualifying search hit on {domain}"
        )))
    }
}

#[async_trait]
impl FetchTier for SearchFallbackTier {
    fn tier(&self) -> Tier {
        Tier::SearchFallback
    }

    fn provider_key(&self, _req: &WebRequest<'_>) -> String {
        PROVIDER_SEARCH.to_string()
    }

    async fn attempt(&self, req: &WebRequest<'_>) -> Result<TierOutput, FetchError> {
        let domain = provider_key_for_url(req.url);
        let found = self.discover(req.loan, &domain).await?;
        info!(work_order = %req.loan.work_order, page = %short_id(&found), "search substituted article");

        let direct = self
            .limiter
            .guarded(&provider_key_for_url(&found), || self.http.get(&found))
            .await;
        match (direct, &self.scraper) {
            (Ok(page), _) => Ok(TierOutput {
                page_url: page.final_url,
                html: page.body,
            }),
            (Err(e), Some(scraper)) => {
                debug!(error = ?e, "direct fetch of search hit failed, using managed scraper");
                let sreq = ScrapeRequest::rendered(&found, &self.settings.country);
                managed_fetch(scraper.as_ref(), &self.limiter, sreq).await
            }
            (Err(e), None) => Err(e),
        }
    }
}

/// Article pages linked from an index page.
const MAX_INDEX_LINKS: usize = 3;

struct LinkFollow {
    http: Arc<dyn HttpFetcher>,
    limiter: Arc<RateLimiter>,
}

pub struct WebContentFetcher {
    tiers: Vec<Box<dyn FetchTier>>,
    cache: Arc<ContentCache>,
    follow: Option<LinkFollow>,
    settings: WebSettings,
}

impl WebContentFetcher {
    pub fn new(tiers: Vec<Box<dyn FetchTier>>, cache: Arc<ContentCache>, settings: WebSettings) -> Self {
        Self {
            tiers,
            cache,
            follow: None,
            settings,
        }
    }

    /// Lets a tier that landed on a review index follow its best article link.
    /// Without it, index pages are rejected.
    pub fn with_link_follow(mut self, http: Arc<dyn HttpFetcher>, limiter: Arc<RateLimiter>) -> Self {
        self.follow = Some(LinkFollow { http, limiter });
        self
    }

    /// Direct, then the managed pair when a scraper is configured, then search.
    pub fn standard(
        http: Arc<dyn HttpFetcher>,
        scraper: Option<Arc<dyn ManagedScraper>>,
        search: Option<Arc<dyn SearchApi>>,
        limiter: Arc<RateLimiter>,
        cache: Arc<ContentCache>,
        settings: WebSettings,
    ) -> Self {
        let mut tiers: Vec<Box<dyn FetchTier>> =
            vec![Box::new(DirectTier::new(http.clone(), limiter.clone()))];
        if let Some(s) = &scraper {
            tiers.push(Box::new(ManagedPlainTier::new(
                s.clone(),
                limiter.clone(),
                &settings.country,
            )));
            tiers.push(Box::new(ManagedRenderedTier::new(
                s.clone(),
                limiter.clone(),
                &settings.country,
                Duration::from_millis(settings.managed_pause_ms),
            )));
        }
        if let Some(search) = search {
            tiers.push(Box::new(SearchFallbackTier::new(
                search,
                http.clone(),
                scraper,
                limiter.clone(),
                cache.clone(),
                settings.clone(),
            )));
        }
        Self::new(tiers, cache, settings).with_link_follow(http, limiter)
    }

    pub fn tiers(&self) -> Vec<Tier> {
        self.tiers.iter().map(|t| t.tier()).collect()
    }

    /// One hop from an index page to the article it lists for this vehicle.
    async fn follow_index(
        &self,
        loan: &Loan,
        original_url: &str,
        tier: Tier,
        out: TierOutput,
    ) -> Result<ResolvedContent, FetchError> {
        let Some(follow) = &self.follow else {
            return Err(FetchError::no_match(format!(
                "{} is an index page",
                short_id(&out.page_url)
            )));
        };
        let links = index::ranked_links(&out.page_url, &out.html, &loan.make, &loan.model);
        let mut last = None;
        for link in links.iter().take(MAX_INDEX_LINKS) {
            let key = provider_key_for_url(link);
            let attempt = match follow.limiter.guarded(&key, || follow.http.get(link)).await {
                Ok(page) => self.accept(
                    loan,
                    original_url,
                    tier,
                    TierOutput {
                        page_url: page.final_url,
                        html: page.body,
                    },
                ),
                Err(e) => Err(e),
            };
            match attempt {
                Ok(content) => {
                    debug!(index = %short_id(&out.page_url), page = %short_id(link), "followed index link");
                    return Ok(content);
                }
                Err(e) => {
                    debug!(error = ?e, page = %short_id(link), "index link rejected");
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or_else(|| {
            FetchError::no_match(format!(
                "index page links no {} {} article",
                loan.make, loan.model
            ))
        }))
    }

    fn accept(&self, loan: &Loan, original_url: &str, tier: Tier, out: TierOutput) -> Result<ResolvedContent, FetchError> {
        let page = extract::extract_article(&out.html, self.settings.max_content_chars);
        let len = page.text.chars().count();
        if len < self.settings.min_content_len {
            return Err(FetchError::ContentTooShort {
                len,
                min: self.settings.min_content_len,
            });
        }

        let head: String = page.text.chars().take(self.settings.relevance_chars).collect();
        if !title_matches(&format!("{} {}", page.title, head), &loan.make, &loan.model) {
            return Err(FetchError::no_match(format!(
                "page does not mention {} {}",
                loan.make, loan.model
            )));
        }

        let published_at = extract_published_date(&out.html, &out.page_url);
        if let Some(d) = published_at {
            if d < loan.loan_start_date {
                return Err(FetchError::no_match(format!(
                    "published {d} before loan start {}",
                    loan.loan_start_date
                )));
            }
        }

        Ok(ResolvedContent {
            source_url: out.page_url,
            original_url: original_url.to_string(),
            content_type: ContentType::Article,
            raw_text: page.text,
            title: page.title,
            provenance: Provenance {
                tier_used: tier,
                cached: false,
            },
            published_at,
            date_missing: published_at.is_none(),
            channel_name: None,
            video_id: None,
        })
    }

    /// Runs the tiers in order until one yields an acceptable article.
    pub async fn fetch(&self, loan: &Loan, url: &str) -> Result<ResolvedContent, FetchError> {
        crate::metrics::ensure_metrics_described();
        let target = rewrite_url(url);
        if target != url {
            debug!(from = %short_id(url), to = %short_id(&target), "rewrote outlet url");
        }
        let domain = provider_key_for_url(&target);
        let key = vehicle_key(&domain, &loan.make, &loan.model);

        if let Some(hit) = self.cache.get(&key) {
            match serde_json::from_str::<ResolvedContent>(&hit) {
                // The key has no loan date, so the date guard runs again per loan.
                Ok(content) if content.published_at.is_some_and(|d| d < loan.loan_start_date) => {
                    debug!(
                        work_order = %loan.work_order,
                        published = ?content.published_at,
                        "cached article predates loan"
                    );
                }
                Ok(mut content) => {
                    content.provenance.cached = true;
                    return Ok(content);
                }
                Err(e) => warn!(error = ?e, "dropping unreadable cache entry"),
            }
        }

        let req = WebRequest { loan, url: &target };
        let mut failures = Vec::with_capacity(self.tiers.len());
        for tier in &self.tiers {
            let t = tier.tier();
            counter!("resolver_tier_attempts_total", "tier" => t.as_str()).increment(1);
            let outcome = match tier.attempt(&req).await {
                Ok(out) if index::is_index_page(&out.page_url, &out.html) => {
                    self.follow_index(loan, url, t, out).await
                }
                Ok(out) => self.accept(loan, url, t, out),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(content) => {
                    counter!("resolver_tier_success_total", "tier" => t.as_str()).increment(1);
                    info!(
                        work_order = %loan.work_order,
                        tier = %t,
                        url = %short_id(&content.source_url),
                        chars = content.raw_text.len(),
                        "article resolved"
                    );
                    match serde_json::to_string(&content) {
                        Ok(json) => self.cache.put(&key, json),
                        Err(e) => warn!(error = ?e, "could not cache resolved article"),
                    }
                    return Ok(content);
                }
                Err(e) => {
                    warn!(
                        error = ?e,
                        provider = %tier.provider_key(&req),
                        tier = %t,
                        work_order = %loan.work_order,
                        "tier failed"
                    );
                    failures.push(format!("{t}: {e}"));
                }
            }
        }
        Err(FetchError::no_match(if failures.is_empty() {
            "no fetch tiers configured".to_string()
        } else {
            failures.join("; ")
        }))
    }
}
