// src/config/providers.rs
use serde::{Deserialize, Serialize};
use std::env;

/// Marker meaning "read the key from the provider's env var".
pub const FROM_ENV: &str = "ENV";

fn default_api_key() -> String {
    FROM_ENV.to_string()
}
fn default_true() -> bool {
    true
}
fn default_binary() -> String {
    "yt-dlp".to_string()
}

/// A keyed external service. Disabled services drop their tier or stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyedProvider {
    #[serde(default)]
    pub enabled: bool,
    /// "ENV" means: read from the provider's env var (see [`ProvidersConfig::resolve_credentials`]).
    #[serde(default = "default_api_key")]
    pub api_key: String,
}

impl Default for KeyedProvider {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: default_api_key(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchProvider {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_api_key")]
    pub engine_id: String,
}

impl Default for SearchProvider {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: default_api_key(),
            engine_id: default_api_key(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaptionsProvider {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for CaptionsProvider {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Local audio downloader; transcription also needs `whisper` enabled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudioProvider {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_binary")]
    pub binary: String,
}

impl Default for AudioProvider {
    fn default() -> Self {
        Self {
            enabled: false,
            binary: default_binary(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProvidersConfig {
    pub scrapfly: KeyedProvider,
    pub search: SearchProvider,
    pub youtube_api: KeyedProvider,
    pub whisper: KeyedProvider,
    pub captions: CaptionsProvider,
    pub audio: AudioProvider,
}

fn resolve_key(enabled: bool, key: &mut String, var: &str) -> anyhow::Result<()> {
    if !enabled {
        return Ok(());
    }
    if key.trim().eq_ignore_ascii_case(FROM_ENV) {
        *key = env::var(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("Missing {var} env var"))?;
    }
    if key.trim().is_empty() {
        anyhow::bail!("Empty credential for provider using {var}");
    }
    Ok(())
}

impl ProvidersConfig {
    /// Replaces every "ENV" marker of an enabled provider with its env value.
    /// An enabled provider without a usable key is a fatal error.
    pub fn resolve_credentials(&mut self) -> anyhow::Result<()> {
        resolve_key(self.scrapfly.enabled, &mut self.scrapfly.api_key, "SCRAPFLY_API_KEY")?;
        resolve_key(self.search.enabled, &mut self.search.api_key, "GOOGLE_SEARCH_API_KEY")?;
        resolve_key(self.search.enabled, &mut self.search.engine_id, "GOOGLE_SEARCH_ENGINE_ID")?;
        resolve_key(self.youtube_api.enabled, &mut self.youtube_api.api_key, "YOUTUBE_API_KEY")?;
        resolve_key(self.whisper.enabled, &mut self.whisper.api_key, "OPENAI_API_KEY")?;
        Ok(())
    }
}
