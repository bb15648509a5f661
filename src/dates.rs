// src/dates.rs
//! Relative timestamps ("3 days ago") and publish-date extraction.
//!
//! Month = 30 days and year = 365 days. Good enough for freshness gating,
//! not for reporting exact dates.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

pub const DEFAULT_FORWARD_DAYS: i64 = 90;
pub const EXTENDED_FORWARD_DAYS: i64 = 180;

/// Anything older than this is assumed to be a parse error.
const MAX_ARTICLE_AGE_DAYS: i64 = 3650;

static RE_NUMERIC_AGO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d+)\s*(second|minute|hour|day|week|month|year)s?\s+ago\b")
        .expect("numeric ago regex")
});
static RE_ARTICLE_AGO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(a|an|one)\s+(second|minute|hour|day|week|month|year)\s+ago\b")
        .expect("article ago regex")
});
static RE_YESTERDAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\byesterday\b").expect("yesterday regex"));
static RE_TODAY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\btoday\b").expect("today regex"));

static RE_PAGE_RELATIVE: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#""publishedTimeText"\s*:\s*\{\s*"simpleText"\s*:\s*"([^"]*ago[^"]*)""#,
        r#""dateText"\s*:\s*\{\s*"simpleText"\s*:\s*"([^"]*)""#,
        r#""publishedTimeText"[^}]*"text"\s*:\s*"([^"]*ago[^"]*)""#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("page relative regex"))
    .collect()
});

static RE_PUBLISHED_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:published|posted|updated)\s*:?\s*(?:on\s+)?([A-Za-z]{3,9}\.?\s+\d{1,2},?\s+\d{4})")
        .expect("published text regex")
});
static RE_URL_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(\d{4})/(\d{2})/(\d{2})/").expect("url date regex"));

fn unit_duration(unit: &str, n: i64) -> Option<Duration> {
    let d = match unit.to_ascii_lowercase().as_str() {
        "second" => Duration::seconds(n),
        "minute" => Duration::minutes(n),
        "hour" => Duration::hours(n),
        "day" => Duration::days(n),
        "week" => Duration::weeks(n),
        "month" => Duration::days(30 * n),
        "year" => Duration::days(365 * n),
        _ => return None,
    };
    Some(d)
}

fn at_noon(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default())
        .and_utc()
}

/// Resolve a relative phrase against `now`. Handles "N unit(s) ago",
/// "a/an/one unit ago", "yesterday", "today", and the "Streamed ..." /
/// "Premiered ..." prefixes platforms put in front of them.
pub fn parse_relative_at(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if let Some(c) = RE_NUMERIC_AGO.captures(text) {
        let n: i64 = c.get(1)?.as_str().parse().ok()?;
        return Some(now - unit_duration(c.get(2)?.as_str(), n)?);
    }
    if let Some(c) = RE_ARTICLE_AGO.captures(text) {
        return Some(now - unit_duration(c.get(2)?.as_str(), 1)?);
    }
    if RE_YESTERDAY.is_match(text) {
        return Some(at_noon((now - Duration::days(1)).date_naive()));
    }
    if RE_TODAY.is_match(text) {
        return Some(at_noon(now.date_naive()));
    }
    None
}

pub fn parse_relative(text: &str) -> Option<DateTime<Utc>> {
    parse_relative_at(text, Utc::now())
}

/// Content published before the loan cannot describe the loaned vehicle.
pub fn in_window(candidate: NaiveDate, loan_start: NaiveDate, forward_days: i64) -> bool {
    candidate >= loan_start && candidate <= loan_start + Duration::days(forward_days)
}

/// First relative timestamp found in raw video-page markup.
pub fn extract_relative_from_page(html: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    RE_PAGE_RELATIVE
        .iter()
        .filter_map(|re| re.captures(html))
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .find_map(|s| parse_relative_at(&s, now))
}

/// Parse the loose date strings found in article markup.
pub fn parse_date_string(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Some(prefix) = s.get(..10) {
        if let Ok(d) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Some(d);
        }
    }
    let cleaned = s.replace(['.', ','], " ");
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    for fmt in ["%B %d %Y", "%b %d %Y", "%d %B %Y", "%d %b %Y", "%m/%d/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(&cleaned, fmt) {
            return Some(d);
        }
    }
    None
}

fn sane(date: NaiveDate, today: NaiveDate) -> Option<NaiveDate> {
    if date > today || (today - date).num_days() > MAX_ARTICLE_AGE_DAYS {
        return None;
    }
    Some(date)
}

fn json_ld_date(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::Array(items) => items.iter().find_map(json_ld_date),
        serde_json::Value::Object(map) => {
            for field in ["datePublished", "dateCreated", "uploadDate"] {
                if let Some(s) = map.get(field).and_then(|x| x.as_str()) {
                    return Some(s.to_string());
                }
            }
            map.get("@graph").and_then(json_ld_date)
        }
        _ => None,
    }
}

fn selector(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

/// Publish date of an article page, checked against `today`.
///
/// Looks at JSON-LD, then meta tags, then `<time datetime>`, then
/// "Published: Month D, YYYY" text, then a `/YYYY/MM/DD/` URL path.
pub fn extract_published_date_at(html: &str, url: &str, today: NaiveDate) -> Option<NaiveDate> {
    let doc = Html::parse_document(html);

    if let Some(sel) = selector(r#"script[type="application/ld+json"]"#) {
        for el in doc.select(&sel) {
            let raw = el.text().collect::<String>();
            let Ok(v) = serde_json::from_str::<serde_json::Value>(&raw) else {
                continue;
            };
            if let Some(d) = json_ld_date(&v).and_then(|s| parse_date_string(&s)) {
                if let Some(ok) = sane(d, today) {
                    return Some(ok);
                }
            }
        }
    }

    for prop in [
        "article:published_time",
        "og:published_time",
        "datePublished",
        "date",
        "publish_date",
        "publication_date",
        "dc.date",
    ] {
        let q = format!(r#"meta[property="{prop}"], meta[name="{prop}"], meta[itemprop="{prop}"]"#);
        let Some(sel) = selector(&q) else { continue };
        for el in doc.select(&sel) {
            if let Some(d) = el.value().attr("content").and_then(parse_date_string) {
                if let Some(ok) = sane(d, today) {
                    return Some(ok);
                }
            }
        }
    }

    if let Some(sel) = selector("time[datetime]") {
        for el in doc.select(&sel) {
            if let Some(d) = el.value().attr("datetime").and_then(parse_date_string) {
                if let Some(ok) = sane(d, today) {
                    return Some(ok);
                }
            }
        }
    }

    let body_text = doc.root_element().text().collect::<Vec<_>>().join(" ");
    if let Some(d) = RE_PUBLISHED_TEXT
        .captures(&body_text)
        .and_then(|c| c.get(1))
        .and_then(|m| parse_date_string(m.as_str()))
        .and_then(|d| sane(d, today))
    {
        return Some(d);
    }

    RE_URL_DATE.captures(url).and_then(|c| {
        let y = c.get(1)?.as_str().parse().ok()?;
        let m = c.get(2)?.as_str().parse().ok()?;
        let d = c.get(3)?.as_str().parse().ok()?;
        NaiveDate::from_ymd_opt(y, m, d).and_then(|d| sane(d, today))
    })
}

pub fn extract_published_date(html: &str, url: &str) -> Option<NaiveDate> {
    extract_published_date_at(html, url, Utc::now().date_naive())
}
