// src/video/address.rs
//! Video platform URL classification and channel-id scraping.

use once_cell::sync::Lazy;
use regex::Regex;

const PLATFORM_HOSTS: &[&str] = &["youtube.com", "m.youtube.com", "youtu.be", "music.youtube.com"];

static RE_VIDEO_ID: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"[?&]v=([A-Za-z0-9_-]{11})",
        r"youtu\.be/([A-Za-z0-9_-]{11})",
        r"/shorts/([A-Za-z0-9_-]{11})",
        r"/embed/([A-Za-z0-9_-]{11})",
        r"/live/([A-Za-z0-9_-]{11})",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("video id regex"))
    .collect()
});

static RE_CHANNEL_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"youtube\.com/(?:(@)([A-Za-z0-9_.-]+)|(channel|c|user)/([A-Za-z0-9_.-]+))")
        .expect("channel ref regex")
});

static RE_CHANNEL_ID_IN_PAGE: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#""channelId"\s*:\s*"(UC[A-Za-z0-9_-]{22})""#,
        r#""externalId"\s*:\s*"(UC[A-Za-z0-9_-]{22})""#,
        r#"<meta\s+itemprop="(?:channelId|identifier)"\s+content="(UC[A-Za-z0-9_-]{22})""#,
        r#"<link\s+rel="canonical"\s+href="https://www\.youtube\.com/channel/(UC[A-Za-z0-9_-]{22})""#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("channel id regex"))
    .collect()
});

/// How a channel is addressed in a URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelRef {
    Id(String),
    Handle(String),
    Custom(String),
    User(String),
}

impl ChannelRef {
    /// Stable identity used for cache keys.
    pub fn identity(&self) -> String {
        match self {
            ChannelRef::Id(id) => id.clone(),
            ChannelRef::Handle(h) => format!("@{}", h.to_lowercase()),
            ChannelRef::Custom(c) => format!("c/{}", c.to_lowercase()),
            ChannelRef::User(u) => format!("user/{}", u.to_lowercase()),
        }
    }

    /// Pages that might embed the channel id, most likely first.
    pub fn candidate_pages(&self) -> Vec<String> {
        let name = match self {
            ChannelRef::Id(_) => return Vec::new(),
            ChannelRef::Handle(h) | ChannelRef::Custom(h) | ChannelRef::User(h) => h,
        };
        let mut pages = vec![
            format!("https://www.youtube.com/@{name}"),
            format!("https://www.youtube.com/c/{name}"),
            format!("https://www.youtube.com/user/{name}"),
        ];
        match self {
            ChannelRef::Custom(_) => pages.swap(0, 1),
            ChannelRef::User(_) => pages.swap(0, 2),
            _ => {}
        }
        pages
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoTarget {
    Video(String),
    Channel(ChannelRef),
}

fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url.trim())
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_ascii_lowercase()))
}

pub fn is_video_platform_url(url: &str) -> bool {
    host_of(url).is_some_and(|h| PLATFORM_HOSTS.contains(&h.as_str()))
}

pub fn extract_video_id(url: &str) -> Option<String> {
    RE_VIDEO_ID
        .iter()
        .find_map(|re| re.captures(url))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn channel_ref(url: &str) -> Option<ChannelRef> {
    let caps = RE_CHANNEL_REF.captures(url)?;
    if caps.get(1).is_some() {
        return caps.get(2).map(|m| ChannelRef::Handle(m.as_str().to_string()));
    }
    let name = caps.get(4)?.as_str().to_string();
    match caps.get(3)?.as_str() {
        "channel" => Some(ChannelRef::Id(name)),
        "c" => Some(ChannelRef::Custom(name)),
        _ => Some(ChannelRef::User(name)),
    }
}

/// Video first: a watch URL that also names a channel is a video.
pub fn classify(url: &str) -> Option<VideoTarget> {
    if !is_video_platform_url(url) {
        return None;
    }
    extract_video_id(url)
        .map(VideoTarget::Video)
        .or_else(|| channel_ref(url).map(VideoTarget::Channel))
}

/// Finds a `UC...` channel id in channel page markup.
pub fn channel_id_from_page(html: &str) -> Option<String> {
    RE_CHANNEL_ID_IN_PAGE
        .iter()
        .find_map(|re| re.captures(html))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_ids_from_all_url_shapes() {
        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=10",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://youtube.com/live/dQw4w9WgXcQ?feature=share",
        ] {
            assert_eq!(extract_video_id(url).as_deref(), Some("dQw4w9WgXcQ"), "{url}");
            assert!(matches!(classify(url), Some(VideoTarget::Video(_))));
        }
    }

    #[test]
    fn channel_refs_are_classified() {
        assert_eq!(
            classify("https://www.youtube.com/@AutoReviewer/videos"),
            Some(VideoTarget::Channel(ChannelRef::Handle("AutoReviewer".into())))
        );
        assert_eq!(
            channel_ref("https://www.youtube.com/channel/UCabcdefghijklmnopqrstuv"),
            Some(ChannelRef::Id("UCabcdefghijklmnopqrstuv".into()))
        );
        assert_eq!(
            channel_ref("https://youtube.com/c/CarGuy"),
            Some(ChannelRef::Custom("CarGuy".into()))
        );
        assert_eq!(
            channel_ref("https://youtube.com/user/oldschool"),
            Some(ChannelRef::User("oldschool".into()))
        );
        assert_eq!(classify("https://www.motortrend.com/watch?v=dQw4w9WgXcQ"), None);
    }

    #[test]
    fn candidate_pages_start_with_the_given_shape() {
        let p = ChannelRef::User("oldschool".into()).candidate_pages();
        assert_eq!(p[0], "https://www.youtube.com/user/oldschool");
        assert_eq!(p.len(), 3);
        assert!(ChannelRef::Id("UCx".into()).candidate_pages().is_empty());
    }

    #[test]
    fn channel_id_found_in_markup() {
        let id = "UC0123456789abcdefghijkl";
        let html = format!(r#"<html><head><meta itemprop="channelId" content="{id}"></head></html>"#);
        assert_eq!(channel_id_from_page(&html).as_deref(), Some(id));
        let json = format!(r#"{{"metadata":{{"externalId":"{id}"}}}}"#);
        assert_eq!(channel_id_from_page(&json).as_deref(), Some(id));
        assert_eq!(channel_id_from_page("<html></html>"), None);
    }
}
