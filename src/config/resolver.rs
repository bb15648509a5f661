// src/config/resolver.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::providers::ProvidersConfig;
use crate::cache::{DEFAULT_MAX_ENTRIES, DEFAULT_TTL_DAYS};
use crate::limiter::LimiterSettings;
use crate::orchestrator::OrchestratorSettings;
use crate::video::VideoSettings;
use crate::web::WebSettings;

pub const ENV_PATH: &str = "RESOLVER_CONFIG_PATH";
pub const ENV_WORKERS: &str = "RESOLVER_WORKERS";
pub const ENV_MIN_CONTENT_LEN: &str = "RESOLVER_MIN_CONTENT_LEN";
pub const ENV_COOLDOWN_SECS: &str = "RESOLVER_COOLDOWN_SECS";
pub const ENV_CAPTION_CONCURRENCY: &str = "RESOLVER_CAPTION_CONCURRENCY";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheSettings {
    pub max_entries: usize,
    pub ttl_days: i64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            ttl_days: DEFAULT_TTL_DAYS,
        }
    }
}

/// Overall request timeouts per kind of call. Connect timeout is fixed at 4 s.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutSettings {
    pub direct_secs: u64,
    pub managed_secs: u64,
    pub api_secs: u64,
    pub transcription_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            direct_secs: 10,
            managed_secs: 90,
            api_secs: 30,
            transcription_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub limiter: LimiterSettings,
    pub cache: CacheSettings,
    pub web: WebSettings,
    pub video: VideoSettings,
    pub orchestrator: OrchestratorSettings,
    pub timeouts: TimeoutSettings,
    pub providers: ProvidersConfig,
}

fn parse_clamped_env<T>(raw: Option<String>, min: T, max: T) -> Option<T>
where
    T: FromStr + PartialOrd + Copy,
{
    let v = raw.and_then(|s| s.trim().parse::<T>().ok())?;
    Some(if v < min {
        min
    } else if v > max {
        max
    } else {
        v
    })
}

impl ResolverConfig {
    /// Parse a TOML or JSON document. No env overrides, no credential lookup.
    pub fn from_str_hinted(s: &str, hint_ext: &str) -> Result<Self> {
        if hint_ext == "json" {
            return serde_json::from_str(s).context("parsing resolver config json");
        }
        match toml::from_str(s) {
            Ok(cfg) => Ok(cfg),
            Err(toml_err) => serde_json::from_str(s)
                .map_err(|_| anyhow!("unsupported resolver config format: {toml_err}")),
        }
    }

    /// Env overrides, clamped to sane ranges.
    pub fn apply_env_overrides(&mut self) {
        let var = |name: &str| std::env::var(name).ok();
        if let Some(v) = parse_clamped_env(var(ENV_WORKERS), 1usize, 64) {
            self.orchestrator.worker_count = v;
        }
        if let Some(v) = parse_clamped_env(var(ENV_MIN_CONTENT_LEN), 50usize, 100_000) {
            self.web.min_content_len = v;
        }
        if let Some(v) = parse_clamped_env(var(ENV_COOLDOWN_SECS), 1u64, 86_400) {
            self.limiter.cooldown_secs = v;
        }
        if let Some(v) = parse_clamped_env(var(ENV_CAPTION_CONCURRENCY), 1usize, 16) {
            self.video.caption_concurrency = v;
        }
    }

    fn finish(mut self) -> Result<Self> {
        self.apply_env_overrides();
        self.providers.resolve_credentials()?;
        Ok(self)
    }

    /// Load from an explicit path. Supports TOML or JSON formats.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading resolver config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        Self::from_str_hinted(&content, &ext)?.finish()
    }

    /// Load using env var + fallbacks:
    /// 1) $RESOLVER_CONFIG_PATH
    /// 2) config/resolver.toml
    /// 3) config/resolver.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_PATH} points to non-existent path"));
        }
        for candidate in ["config/resolver.toml", "config/resolver.json"] {
            let p = PathBuf::from(candidate);
            if p.exists() {
                return Self::load_from(&p);
            }
        }
        Self::default().finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamping() {
        assert_eq!(parse_clamped_env(Some("0".into()), 1usize, 64), Some(1));
        assert_eq!(parse_clamped_env(Some(" 500 ".into()), 1usize, 64), Some(64));
        assert_eq!(parse_clamped_env(Some("8".into()), 1usize, 64), Some(8));
        assert_eq!(parse_clamped_env(Some("x".into()), 1usize, 64), None);
        assert_eq!(parse_clamped_env::<u64>(None, 1, 2), None);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = ResolverConfig::from_str_hinted(
            r#"
            [web]
            min_content_len = 800

            [limiter.paces."caranddriver.com"]
            requests = 2
            per_secs = 10
            "#,
            "toml",
        )
        .unwrap();
        assert_eq!(cfg.web.min_content_len, 800);
        assert_eq!(cfg.web.country, "US");
        assert_eq!(cfg.orchestrator.worker_count, 4);
        assert_eq!(cfg.limiter.paces["caranddriver.com"].requests, 2);
        assert_eq!(cfg.cache.ttl_days, 30);
    }

    #[test]
    fn json_is_accepted() {
        let cfg = ResolverConfig::from_str_hinted(r#"{"orchestrator":{"budget_secs":30}}"#, "json").unwrap();
        assert_eq!(cfg.orchestrator.budget_secs, 30);
        assert_eq!(cfg.orchestrator.worker_count, 4);
    }
}
