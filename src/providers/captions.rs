// src/providers/captions.rs
//! Native captions from the platform's timedtext endpoint (json3 format).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::http::classify_status;
use super::{build_client, CaptionSource, BROWSER_USER_AGENT, PROVIDER_VIDEO_SITE};
use crate::error::FetchError;

pub const TIMEDTEXT_URL: &str = "https://www.youtube.com/api/timedtext";
pub const LANGUAGE_PREFERENCE: &[&str] = &["en", "en-US", "en-GB"];

#[derive(Debug, Deserialize)]
struct Json3 {
    #[serde(default)]
    events: Vec<Event>,
}

#[derive(Debug, Deserialize)]
struct Event {
    #[serde(default)]
    segs: Vec<Seg>,
}

#[derive(Debug, Deserialize)]
struct Seg {
    #[serde(default)]
    utf8: String,
}

/// Joins caption segments into one whitespace-normalized string.
pub fn json3_to_text(raw: &str) -> Option<String> {
    let doc: Json3 = serde_json::from_str(raw).ok()?;
    let joined = doc
        .events
        .iter()
        .flat_map(|e| e.segs.iter())
        .map(|s| s.utf8.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let text = joined.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

pub struct TimedTextCaptions {
    http: reqwest::Client,
    allow_auto: bool,
}

impl TimedTextCaptions {
    pub fn new(timeout: Duration, allow_auto: bool) -> anyhow::Result<Self> {
        Ok(Self {
            http: build_client(BROWSER_USER_AGENT, timeout)?,
            allow_auto,
        })
    }

    async fn fetch_track(&self, video_id: &str, lang: &str, auto: bool) -> Result<Option<String>, FetchError> {
        let mut q = vec![("v", video_id), ("lang", lang), ("fmt", "json3")];
        if auto {
            q.push(("kind", "asr"));
        }
        let resp = self
            .http
            .get(TIMEDTEXT_URL)
            .query(&q)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(PROVIDER_VIDEO_SITE, &e))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        classify_status(PROVIDER_VIDEO_SITE, resp.status(), resp.headers())?;
        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(PROVIDER_VIDEO_SITE, &e))?;
        Ok(json3_to_text(&body))
    }
}

#[async_trait]
impl CaptionSource for TimedTextCaptions {
    async fn captions(&self, video_id: &str) -> Result<Option<String>, FetchError> {
        for lang in LANGUAGE_PREFERENCE {
            if let Some(t) = self.fetch_track(video_id, lang, false).await? {
                return Ok(Some(t));
            }
        }
        if self.allow_auto {
            return self.fetch_track(video_id, "en", true).await;
        }
        Ok(None)
    }
}
