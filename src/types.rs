// src/types.rs
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// A vehicle loaned to a media reviewer. Produced by the ingestion layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Loan {
    pub work_order: String,
    pub make: String,
    pub model: String,
    #[serde(default)]
    pub candidate_urls: Vec<String>,
    pub loan_start_date: NaiveDate,
    #[serde(default)]
    pub media_person: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Article,
    Video,
    VideoMetadata,
}

/// Escalation step that produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Direct,
    ManagedPlain,
    ManagedRendered,
    SearchFallback,
    VideoDirect,
    VideoFeed,
    VideoScrape,
    VideoApi,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Direct => "direct",
            Tier::ManagedPlain => "managed_plain",
            Tier::ManagedRendered => "managed_rendered",
            Tier::SearchFallback => "search_fallback",
            Tier::VideoDirect => "video_direct",
            Tier::VideoFeed => "video_feed",
            Tier::VideoScrape => "video_scrape",
            Tier::VideoApi => "video_api",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Provenance {
    pub tier_used: Tier,
    pub cached: bool,
}

/// Content found for a loan. Immutable once returned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedContent {
    /// Where the content actually lives (may be a search-substituted page).
    pub source_url: String,
    pub original_url: String,
    pub content_type: ContentType,
    pub raw_text: String,
    pub title: String,
    pub provenance: Provenance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<NaiveDate>,
    /// Article had no extractable publish date; needs a manual check.
    #[serde(default)]
    pub date_missing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
}

/// Why one candidate URL produced nothing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UrlAttempt {
    pub url: String,
    pub reason: String,
}

impl UrlAttempt {
    pub fn from_error(url: &str, e: &FetchError) -> Self {
        Self {
            url: url.to_string(),
            reason: format!("{}: {}", e.kind(), e),
        }
    }
}

/// Outcome of resolving one loan. `NotFound` is a value, never an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    Found(ResolvedContent),
    NotFound {
        work_order: String,
        attempted: Vec<UrlAttempt>,
    },
}

impl Resolution {
    pub fn content(&self) -> Option<&ResolvedContent> {
        match self {
            Resolution::Found(c) => Some(c),
            Resolution::NotFound { .. } => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loan_deserializes_with_defaults() {
        let j = r#"{"work_order":"WO-1","make":"Mazda","model":"CX-90","loan_start_date":"2025-03-01"}"#;
        let loan: Loan = serde_json::from_str(j).unwrap();
        assert!(loan.candidate_urls.is_empty());
        assert_eq!(loan.media_person, "");
        assert_eq!(
            loan.loan_start_date,
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
        );
    }

    #[test]
    fn resolution_serializes_snake_case() {
        let r = Resolution::Found(ResolvedContent {
            source_url: "https://a/x".into(),
            original_url: "https://a".into(),
            content_type: ContentType::VideoMetadata,
            raw_text: "t".into(),
            title: "x".into(),
            provenance: Provenance {
                tier_used: Tier::ManagedRendered,
                cached: false,
            },
            published_at: None,
            date_missing: false,
            channel_name: None,
            video_id: None,
        });
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["outcome"], "found");
        assert_eq!(v["content_type"], "video_metadata");
        assert_eq!(v["provenance"]["tier_used"], "managed_rendered");
        assert!(v.get("video_id").is_none());
    }
}
