// src/video/listing.rs
//! Video list recovered from a rendered channel "videos" page.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::dates::parse_relative_at;
use crate::providers::{ScenarioStep, VideoEntry};

pub const SCRAPE_CAP: usize = 100;
/// Window of markup after a video id searched for its title and age.
const RENDERER_SPAN: usize = 4000;

static RE_RENDERER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""(?:videoRenderer|gridVideoRenderer|reelItemRenderer)"\s*:\s*\{\s*"videoId"\s*:\s*"([A-Za-z0-9_-]{11})""#)
        .expect("renderer regex")
});
static RE_TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""title"\s*:\s*\{\s*(?:"runs"\s*:\s*\[\s*\{\s*"text"|"simpleText")\s*:\s*"((?:[^"\\]|\\.)*)""#)
        .expect("title regex")
});
static RE_AGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""publishedTimeText"\s*:\s*\{\s*"simpleText"\s*:\s*"([^"]*)""#).expect("age regex")
});

pub fn videos_page_url(channel_id: &str) -> String {
    format!("https://www.youtube.com/channel/{channel_id}/videos")
}

/// Scroll script that loads roughly `scrolls` extra pages of the grid.
pub fn scroll_scenario(scrolls: usize, wait_ms: u64) -> Vec<ScenarioStep> {
    let mut steps = Vec::with_capacity(scrolls * 2);
    for _ in 0..scrolls {
        steps.push(ScenarioStep::ScrollToBottom);
        steps.push(ScenarioStep::WaitMs(wait_ms));
    }
    steps
}

fn json_unescape(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{raw}\"")).unwrap_or_else(|_| raw.to_string())
}

/// Parses renderer blobs out of page markup. Relative ages ("3 days ago")
/// are resolved against `now`.
pub fn parse_videos_page(html: &str, now: DateTime<Utc>) -> Vec<VideoEntry> {
    let starts: Vec<(usize, String)> = RE_RENDERER
        .captures_iter(html)
        .filter_map(|c| {
            let whole = c.get(0)?;
            Some((whole.end(), c.get(1)?.as_str().to_string()))
        })
        .collect();

    let mut out: Vec<VideoEntry> = Vec::new();
    for (i, (start, id)) in starts.iter().enumerate() {
        if out.iter().any(|v| &v.video_id == id) {
            continue;
        }
        let next = starts.get(i + 1).map(|(s, _)| *s).unwrap_or(html.len());
        let mut end = next.min(start + RENDERER_SPAN).min(html.len());
        while !html.is_char_boundary(end) {
            end -= 1;
        }
        let chunk = &html[*start..end];
        let title = RE_TITLE
            .captures(chunk)
            .and_then(|c| c.get(1))
            .map(|m| json_unescape(m.as_str()))
            .unwrap_or_default();
        let published_at = RE_AGE
            .captures(chunk)
            .and_then(|c| c.get(1))
            .and_then(|m| parse_relative_at(m.as_str(), now));
        out.push(VideoEntry {
            video_id: id.clone(),
            title,
            published_at,
            description: String::new(),
        });
        if out.len() >= SCRAPE_CAP {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn renderers_yield_id_title_and_age() {
        let now = Utc.with_ymd_and_hms(2025, 4, 1, 12, 0, 0).unwrap();
        let html = r#"var ytInitialData = {"contents":[
            {"richItemRenderer":{"content":{"videoRenderer":{"videoId":"AAAAAAAAAAA","thumbnail":{},
              "title":{"runs":[{"text":"2025 Mazda CX-90 & the \"Turbo S\""}]},
              "publishedTimeText":{"simpleText":"3 days ago"}}}}},
            {"richItemRenderer":{"content":{"videoRenderer":{"videoId":"BBBBBBBBBBB",
              "title":{"simpleText":"Kia EV9 Long Term"},
              "publishedTimeText":{"simpleText":"Streamed 2 weeks ago"}}}}},
            {"richItemRenderer":{"content":{"videoRenderer":{"videoId":"AAAAAAAAAAA"}}}}
        ]};"#;
        let v = parse_videos_page(html, now);
        assert_eq!(v.len(), 2);
        assert_eq!(v[0].title, r#"2025 Mazda CX-90 & the "Turbo S""#);
        assert_eq!(v[0].published_at, Some(now - chrono::Duration::days(3)));
        assert_eq!(v[1].video_id, "BBBBBBBBBBB");
        assert_eq!(v[1].published_at, Some(now - chrono::Duration::days(14)));
    }

    #[test]
    fn scenario_alternates_scroll_and_wait() {
        let s = scroll_scenario(2, 1500);
        assert_eq!(
            s,
            vec![
                ScenarioStep::ScrollToBottom,
                ScenarioStep::WaitMs(1500),
                ScenarioStep::ScrollToBottom,
                ScenarioStep::WaitMs(1500)
            ]
        );
    }
}
