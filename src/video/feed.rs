// src/video/feed.rs
//! Channel Atom feed: the cheapest listing, newest ~15-25 uploads.

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::FetchError;
use crate::providers::{VideoEntry, PROVIDER_VIDEO_SITE};

pub const FEED_CAP: usize = 25;

pub fn feed_url(channel_id: &str) -> String {
    format!("https://www.youtube.com/feeds/videos.xml?channel_id={channel_id}")
}

fn parse_rfc3339(ts: &str) -> Option<DateTime<Utc>> {
    let odt = OffsetDateTime::parse(ts.trim(), &Rfc3339).ok()?;
    DateTime::from_timestamp(odt.unix_timestamp(), 0)
}

/// Entries in feed order, capped at [`FEED_CAP`].
pub fn parse_feed(xml: &str) -> Result<Vec<VideoEntry>, FetchError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut entries = Vec::new();
    let mut in_entry = false;
    let mut tag = String::new();
    let (mut id, mut title, mut published, mut description) =
        (String::new(), String::new(), String::new(), String::new());

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if name == "entry" {
                    in_entry = true;
                    id.clear();
                    title.clear();
                    published.clear();
                    description.clear();
                }
                tag = name;
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if name == "entry" && in_entry {
                    in_entry = false;
                    if !id.is_empty() {
                        entries.push(VideoEntry {
                            video_id: id.clone(),
                            title: title.clone(),
                            published_at: parse_rfc3339(&published),
                            description: description.clone(),
                        });
                        if entries.len() >= FEED_CAP {
                            break;
                        }
                    }
                }
                tag.clear();
            }
            Ok(Event::Text(e)) if in_entry => {
                let text = e.unescape().unwrap_or_default().to_string();
                match tag.as_str() {
                    "videoId" => id = text.trim().to_string(),
                    "title" => title = text.trim().to_string(),
                    "published" => published = text.trim().to_string(),
                    "description" => description = text.trim().to_string(),
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(FetchError::unavailable(
                    PROVIDER_VIDEO_SITE,
                    format!("feed xml: {e}"),
                ))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns:yt="http://www.youtube.com/xml/schemas/2015" xmlns:media="http://search.yahoo.com/mrss/" xmlns="http://www.w3.org/2005/Atom">
 <title>Auto Reviewer</title>
 <entry>
  <id>yt:video:AAAAAAAAAAA</id>
  <yt:videoId>AAAAAAAAAAA</yt:videoId>
  <title>2025 Mazda CX-90 &amp; CX-70 Compared</title>
  <published>2025-03-12T15:00:00+00:00</published>
  <media:group><media:description>Two Mazdas, one week.</media:description></media:group>
 </entry>
 <entry>
  <yt:videoId>BBBBBBBBBBB</yt:videoId>
  <title>Kia EV9 Road Trip</title>
  <published>not a date</published>
 </entry>
</feed>"#;

    #[test]
    fn entries_are_read_in_order() {
        let e = parse_feed(FEED).unwrap();
        assert_eq!(e.len(), 2);
        assert_eq!(e[0].video_id, "AAAAAAAAAAA");
        assert_eq!(e[0].title, "2025 Mazda CX-90 & CX-70 Compared");
        assert_eq!(e[0].description, "Two Mazdas, one week.");
        assert_eq!(
            e[0].published_at.map(|d| d.date_naive().to_string()).as_deref(),
            Some("2025-03-12")
        );
        assert_eq!(e[1].published_at, None);
    }

    #[test]
    fn feed_url_targets_channel() {
        assert!(feed_url("UCx").ends_with("channel_id=UCx"));
    }
}
