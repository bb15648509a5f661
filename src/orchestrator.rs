// src/orchestrator.rs
//! Loan-level resolution: walk candidate URLs, dispatch each to the web or
//! video source, stop at the first hit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::short_id;
use crate::error::FetchError;
use crate::types::{Loan, Resolution, ResolvedContent, UrlAttempt};
use crate::video::address::is_video_platform_url;
use crate::video::VideoPlatformResolver;
use crate::web::WebContentFetcher;

pub const BUDGET_EXCEEDED: &str = "budget_exceeded";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorSettings {
    pub worker_count: usize,
    /// Wall-clock cap for one loan across all its URLs and tiers.
    pub budget_secs: u64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            worker_count: 4,
            budget_secs: 120,
        }
    }
}

/// Where a candidate URL gets resolved.
#[derive(Clone)]
pub enum ContentSource {
    WebArticle(Arc<WebContentFetcher>),
    VideoPlatform(Arc<VideoPlatformResolver>),
}

impl ContentSource {
    pub fn name(&self) -> &'static str {
        match self {
            ContentSource::WebArticle(_) => "web",
            ContentSource::VideoPlatform(_) => "video",
        }
    }

    pub async fn fetch(&self, loan: &Loan, url: &str) -> Result<ResolvedContent, FetchError> {
        match self {
            ContentSource::WebArticle(w) => w.fetch(loan, url).await,
            ContentSource::VideoPlatform(v) => v.resolve(loan, url).await,
        }
    }
}

pub struct ResolutionOrchestrator {
    web: Arc<WebContentFetcher>,
    video: Option<Arc<VideoPlatformResolver>>,
    settings: OrchestratorSettings,
}

impl ResolutionOrchestrator {
    pub fn new(
        web: Arc<WebContentFetcher>,
        video: Option<Arc<VideoPlatformResolver>>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            web,
            video,
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn source_for(&self, url: &str) -> Option<ContentSource> {
        if is_video_platform_url(url) {
            return self.video.clone().map(ContentSource::VideoPlatform);
        }
        Some(ContentSource::WebArticle(self.web.clone()))
    }

    async fn walk_candidates(&self, loan: &Loan, attempted: &mut Vec<UrlAttempt>) -> Option<ResolvedContent> {
        for url in &loan.candidate_urls {
            let url = url.trim();
            if url.is_empty() {
                continue;
            }
            let Some(source) = self.source_for(url) else {
                attempted.push(UrlAttempt {
                    url: url.to_string(),
                    reason: "no source configured for url".to_string(),
                });
                continue;
            };
            match source.fetch(loan, url).await {
                Ok(content) => return Some(content),
                Err(e) => {
                    warn!(
                        error = ?e,
                        provider = source.name(),
                        work_order = %loan.work_order,
                        url = %short_id(url),
                        "candidate url exhausted"
                    );
                    attempted.push(UrlAttempt::from_error(url, &e));
                }
            }
        }
        None
    }

    /// Never fails: exhaustion, including budget expiry, is `NotFound`.
    pub async fn resolve(&self, loan: &Loan) -> Resolution {
        crate::metrics::ensure_metrics_described();
        let t0 = Instant::now();
        let budget = Duration::from_secs(self.settings.budget_secs.max(1));

        let mut attempted = Vec::new();
        let found = match tokio::time::timeout(budget, self.walk_candidates(loan, &mut attempted)).await {
            Ok(found) => found,
            Err(_) => {
                let url = loan
                    .candidate_urls
                    .get(attempted.len())
                    .cloned()
                    .unwrap_or_default();
                warn!(work_order = %loan.work_order, budget_secs = budget.as_secs(), "loan budget exceeded");
                attempted.push(UrlAttempt {
                    url,
                    reason: BUDGET_EXCEEDED.to_string(),
                });
                None
            }
        };

        histogram!("resolver_resolve_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        match found {
            Some(content) => {
                info!(
                    work_order = %loan.work_order,
                    tier = %content.provenance.tier_used,
                    cached = content.provenance.cached,
                    "loan resolved"
                );
                Resolution::Found(content)
            }
            None => {
                counter!("resolver_not_found_total").increment(1);
                info!(work_order = %loan.work_order, attempts = attempted.len(), "loan not found");
                Resolution::NotFound {
                    work_order: loan.work_order.clone(),
                    attempted,
                }
            }
        }
    }

    /// Resolves loans concurrently, `worker_count` at a time, in input order.
    pub async fn resolve_many(&self, loans: Vec<Loan>) -> Vec<Resolution> {
        let workers = self.settings.worker_count.max(1);
        stream::iter(loans)
            .map(|loan| async move { self.resolve(&loan).await })
            .buffered(workers)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ContentCache;
    use crate::limiter::RateLimiter;
    use crate::providers::{HttpFetcher, Page};
    use crate::types::Tier;
    use async_trait::async_trait;
    use chrono::NaiveDate;

    struct Stalled;

    #[async_trait]
    impl HttpFetcher for Stalled {
        async fn get(&self, _url: &str) -> Result<Page, FetchError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(FetchError::unavailable("stalled", "never"))
        }
    }

    struct EchoPage;

    #[async_trait]
    impl HttpFetcher for EchoPage {
        async fn get(&self, url: &str) -> Result<Page, FetchError> {
            let body = format!(
                "<html><head><title>Review of the Kia EV9</title></head><body><article><p>{}</p></article></body></html>",
                "The Kia EV9 is a large electric SUV with a calm ride. ".repeat(20)
            );
            Ok(Page {
                final_url: url.to_string(),
                status: 200,
                body,
            })
        }
    }

    fn loan(wo: &str, urls: &[&str]) -> Loan {
        Loan {
            work_order: wo.into(),
            make: "Kia".into(),
            model: "EV9".into(),
            candidate_urls: urls.iter().map(|s| s.to_string()).collect(),
            loan_start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            media_person: String::new(),
        }
    }

    fn orchestrator(http: Arc<dyn HttpFetcher>, budget_secs: u64) -> ResolutionOrchestrator {
        let web = WebContentFetcher::standard(
            http,
            None,
            None,
            Arc::new(RateLimiter::default()),
            Arc::new(ContentCache::default()),
            Default::default(),
        );
        ResolutionOrchestrator::new(
            Arc::new(web),
            None,
            OrchestratorSettings {
                worker_count: 2,
                budget_secs,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn budget_expiry_is_not_found() {
        let o = orchestrator(Arc::new(Stalled), 5);
        let r = o.resolve(&loan("WO-9", &["https://slow.example/review"])).await;
        match r {
            Resolution::NotFound { work_order, attempted } => {
                assert_eq!(work_order, "WO-9");
                assert_eq!(attempted.len(), 1);
                assert_eq!(attempted[0].reason, BUDGET_EXCEEDED);
                assert_eq!(attempted[0].url, "https://slow.example/review");
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_candidates_and_video_without_resolver() {
        let o = orchestrator(Arc::new(EchoPage), 10);
        let r = o.resolve(&loan("WO-1", &[])).await;
        assert_eq!(
            r,
            Resolution::NotFound {
                work_order: "WO-1".into(),
                attempted: vec![]
            }
        );
        let r = o
            .resolve(&loan("WO-2", &["https://www.youtube.com/watch?v=dQw4w9WgXcQ"]))
            .await;
        let Resolution::NotFound { attempted, .. } = r else {
            panic!("video url must not reach the web fetcher");
        };
        assert_eq!(attempted[0].reason, "no source configured for url");
    }

    #[tokio::test]
    async fn batch_keeps_input_order() {
        let o = orchestrator(Arc::new(EchoPage), 10);
        let loans = vec![
            loan("A", &["https://a.example/ev9"]),
            loan("B", &[]),
            loan("C", &["https://c.example/ev9"]),
        ];
        let out = o.resolve_many(loans).await;
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].content().map(|c| c.provenance.tier_used), Some(Tier::Direct));
        assert!(!out[1].is_found());
        assert_eq!(out[2].content().map(|c| c.source_url.as_str()), Some("https://c.example/ev9"));
    }
}
