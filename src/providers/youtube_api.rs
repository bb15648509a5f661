// src/providers/youtube_api.rs
//! YouTube Data API v3. Used last in the listing ladder because every call
//! spends quota.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::http::classify_status;
use super::{build_client, VideoApi, VideoDetails, VideoEntry, PROVIDER_VIDEO_API, USER_AGENT};
use crate::error::FetchError;

pub const DEFAULT_BASE: &str = "https://www.googleapis.com/youtube/v3";
const PAGE_SIZE: usize = 50;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResp {
    #[serde(default)]
    items: Vec<SearchItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    id: SearchId,
    snippet: Snippet,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    channel_id: String,
    #[serde(default)]
    channel_title: String,
    published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct VideosResp {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    id: String,
    snippet: Snippet,
    #[serde(default)]
    statistics: Option<Statistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Statistics {
    view_count: Option<String>,
}

pub struct YoutubeApiClient {
    http: reqwest::Client,
    api_key: String,
    base: String,
}

impl YoutubeApiClient {
    pub fn new(api_key: String, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            http: build_client(USER_AGENT, timeout)?,
            api_key,
            base: DEFAULT_BASE.to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        let resp = self
            .http
            .get(format!("{}/{}", self.base, path))
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(PROVIDER_VIDEO_API, &e))?;
        if resp.status() == reqwest::StatusCode::FORBIDDEN {
            // quotaExceeded / rateLimitExceeded
            return Err(FetchError::rate_limited(PROVIDER_VIDEO_API, None));
        }
        classify_status(PROVIDER_VIDEO_API, resp.status(), resp.headers())?;
        resp.json::<T>()
            .await
            .map_err(|e| FetchError::unavailable(PROVIDER_VIDEO_API, format!("decode: {e}")))
    }
}

#[async_trait]
impl VideoApi for YoutubeApiClient {
    async fn channel_id_for_handle(&self, handle: &str) -> Result<Option<String>, FetchError> {
        let q = handle.trim_start_matches('@');
        let resp: SearchResp = self
            .get_json(
                "search",
                &[("part", "snippet"), ("type", "channel"), ("q", q), ("maxResults", "1")],
            )
            .await?;
        Ok(resp
            .items
            .into_iter()
            .next()
            .map(|i| i.snippet.channel_id)
            .filter(|id| !id.is_empty()))
    }

    async fn list_channel_videos(
        &self,
        channel_id: &str,
        max: usize,
    ) -> Result<Vec<VideoEntry>, FetchError> {
        let mut out: Vec<VideoEntry> = Vec::new();
        let mut page_token: Option<String> = None;
        while out.len() < max {
            let page_size = (max - out.len()).min(PAGE_SIZE).to_string();
            let mut params = vec![
                ("part", "snippet"),
                ("channelId", channel_id),
                ("type", "video"),
                ("order", "date"),
                ("maxResults", page_size.as_str()),
            ];
            if let Some(tok) = page_token.as_deref() {
                params.push(("pageToken", tok));
            }
            let resp: SearchResp = self.get_json("search", &params).await?;
            out.extend(resp.items.into_iter().filter_map(|i| {
                Some(VideoEntry {
                    video_id: i.id.video_id?,
                    title: html_escape::decode_html_entities(&i.snippet.title).to_string(),
                    published_at: i.snippet.published_at,
                    description: i.snippet.description,
                })
            }));
            match resp.next_page_token {
                Some(t) if !t.is_empty() => page_token = Some(t),
                _ => break,
            }
        }
        out.truncate(max);
        Ok(out)
    }

    async fn video_details(&self, video_id: &str) -> Result<Option<VideoDetails>, FetchError> {
        let resp: VideosResp = self
            .get_json("videos", &[("part", "snippet,statistics"), ("id", video_id)])
            .await?;
        Ok(resp.items.into_iter().next().map(|v| VideoDetails {
            video_id: v.id,
            title: v.snippet.title,
            description: v.snippet.description,
            channel_title: v.snippet.channel_title,
            view_count: v
                .statistics
                .and_then(|s| s.view_count)
                .and_then(|c| c.parse().ok()),
            published_at: v.snippet.published_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_page_decodes() {
        let j = r#"{
          "nextPageToken": "CAUQAA",
          "items": [
            {"id": {"kind": "youtube#video", "videoId": "abcdefghijk"},
             "snippet": {"title": "2025 Mazda CX-90 Review", "description": "d",
                         "channelId": "UC1", "channelTitle": "Cars", "publishedAt": "2025-03-10T14:00:00Z"}},
            {"id": {"kind": "youtube#channel"}, "snippet": {"title": "x", "channelId": "UC1"}}
          ]
        }"#;
        let r: SearchResp = serde_json::from_str(j).unwrap();
        assert_eq!(r.next_page_token.as_deref(), Some("CAUQAA"));
        assert_eq!(r.items[0].id.video_id.as_deref(), Some("abcdefghijk"));
        assert!(r.items[1].id.video_id.is_none());
        assert_eq!(
            r.items[0].snippet.published_at.unwrap().to_rfc3339(),
            "2025-03-10T14:00:00+00:00"
        );
    }

    #[test]
    fn video_details_decode_view_count() {
        let j = r#"{"items":[{"id":"abcdefghijk","snippet":{"title":"t","description":"d","channelTitle":"Cars"},
                    "statistics":{"viewCount":"1234"}}]}"#;
        let r: VideosResp = serde_json::from_str(j).unwrap();
        let s = r.items[0].statistics.as_ref().unwrap();
        assert_eq!(s.view_count.as_deref(), Some("1234"));
    }
}
