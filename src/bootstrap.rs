// src/bootstrap.rs
use crate::cache::ContentCache;
use crate::config::ResolverConfig;
use crate::limiter::RateLimiter;
use crate::orchestrator::ResolutionOrchestrator;
use crate::providers::audio::YtDlpAudio;
use crate::providers::captions::TimedTextCaptions;
use crate::providers::http::ReqwestFetcher;
use crate::providers::scrapfly::ScrapflyClient;
use crate::providers::search::GoogleSearchClient;
use crate::providers::whisper::WhisperClient;
use crate::providers::youtube_api::YoutubeApiClient;
use crate::providers::{HttpFetcher, ManagedScraper, SearchApi};
use crate::video::transcript::TranscriptPipeline;
use crate::video::VideoPlatformResolver;
use crate::web::WebContentFetcher;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Shared components of a running resolver.
#[derive(Clone)]
pub struct Runtime {
    pub orchestrator: Arc<ResolutionOrchestrator>,
    pub limiter: Arc<RateLimiter>,
    pub cache: Arc<ContentCache>,
}

impl Runtime {
    /// `ResolverConfig::load_default()` + [`Runtime::from_config`].
    pub fn from_default_config() -> anyhow::Result<Self> {
        let cfg = ResolverConfig::load_default()?;
        Self::from_config(&cfg)
    }

    /// Builds real HTTP-backed providers for every enabled section.
    pub fn from_config(cfg: &ResolverConfig) -> anyhow::Result<Self> {
        let t = &cfg.timeouts;
        let p = &cfg.providers;
        // Safe diagnostics: only which providers are on, never keys.
        info!(
            scrapfly = p.scrapfly.enabled,
            search = p.search.enabled,
            youtube_api = p.youtube_api.enabled,
            whisper = p.whisper.enabled,
            audio = p.audio.enabled,
            captions = p.captions.enabled,
            workers = cfg.orchestrator.worker_count,
            "resolver cfg loaded"
        );

        let limiter = Arc::new(RateLimiter::new(cfg.limiter.clone()));
        let cache = Arc::new(ContentCache::new(cfg.cache.max_entries, cfg.cache.ttl_days));

        let http: Arc<dyn HttpFetcher> = Arc::new(ReqwestFetcher::new(Duration::from_secs(t.direct_secs))?);
        let scraper: Option<Arc<dyn ManagedScraper>> = if p.scrapfly.enabled {
            Some(Arc::new(ScrapflyClient::new(
                p.scrapfly.api_key.clone(),
                Duration::from_secs(t.managed_secs),
            )?))
        } else {
            None
        };
        let search: Option<Arc<dyn SearchApi>> = if p.search.enabled {
            Some(Arc::new(GoogleSearchClient::new(
                p.search.api_key.clone(),
                p.search.engine_id.clone(),
                Duration::from_secs(t.api_secs),
            )?))
        } else {
            None
        };

        let web = WebContentFetcher::standard(
            http.clone(),
            scraper.clone(),
            search,
            limiter.clone(),
            cache.clone(),
            cfg.web.clone(),
        );
        info!(tiers = ?web.tiers(), "web tiers");

        let v = &cfg.video;
        let mut transcripts = TranscriptPipeline::new(limiter.clone(), v.caption_concurrency);
        if p.captions.enabled {
            transcripts = transcripts.with_captions(Arc::new(TimedTextCaptions::new(
                Duration::from_secs(t.api_secs),
                v.allow_auto_captions,
            )?));
        }
        match (p.audio.enabled, p.whisper.enabled) {
            (true, true) => {
                transcripts = transcripts.with_audio(
                    Arc::new(YtDlpAudio::new(
                        p.audio.binary.clone(),
                        v.max_audio_secs,
                        Duration::from_secs(v.audio_timeout_secs),
                    )),
                    Arc::new(WhisperClient::new(
                        p.whisper.api_key.clone(),
                        Duration::from_secs(t.transcription_secs),
                    )?),
                );
            }
            (true, false) => warn!("audio download enabled without whisper; audio path disabled"),
            _ => {}
        }
        if let Some(dir) = &v.transcript_cache_dir {
            transcripts = transcripts.with_cache_dir(dir, v.transcript_ttl_days);
        }

        let mut video = VideoPlatformResolver::new(http, transcripts, limiter.clone(), cache.clone(), v.clone());
        if let Some(s) = scraper {
            video = video.with_scraper(s);
        }
        if p.youtube_api.enabled {
            video = video.with_api(Arc::new(YoutubeApiClient::new(
                p.youtube_api.api_key.clone(),
                Duration::from_secs(t.api_secs),
            )?));
        }

        let orchestrator = Arc::new(ResolutionOrchestrator::new(
            Arc::new(web),
            Some(Arc::new(video)),
            cfg.orchestrator.clone(),
        ));
        Ok(Self {
            orchestrator,
            limiter,
            cache,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds_without_credentials() {
        let rt = Runtime::from_config(&ResolverConfig::default()).unwrap();
        assert_eq!(rt.orchestrator.settings().worker_count, 4);
        assert!(rt.cache.is_empty());
    }
}
