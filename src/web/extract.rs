// src/web/extract.rs
//! Main-content extraction from article HTML.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// Selector priority for the article body; first one with substantial text wins.
const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role='main']",
    ".post-content",
    ".article-content",
    ".entry-content",
    ".article-body",
    ".article__body",
    ".story-body",
    "#article-body",
    "#content",
];

const SKIP_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "nav", "footer", "header", "aside", "form", "svg",
];

/// Below this a selector match is treated as a stub and the next one is tried.
const SUBSTANTIAL_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub title: String,
    pub text: String,
}

/// Decode entities, unify typographic quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws regex"));
    let decoded = html_escape::decode_html_entities(s).to_string();
    let quotes = decoded
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace('\u{00A0}', " ");
    RE_WS.replace_all(&quotes, " ").trim().to_string()
}

fn visible_text(el: ElementRef<'_>) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in el.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| SKIP_ELEMENTS.contains(&e.name()))
        });
        if !hidden {
            parts.push(&**text);
        }
    }
    normalize_text(&parts.join(" "))
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    match cut.rfind(' ') {
        Some(i) => cut[..i].to_string(),
        None => cut,
    }
}

fn first_attr(doc: &Html, css: &str, attr: &str) -> Option<String> {
    let sel = Selector::parse(css).ok()?;
    doc.select(&sel)
        .filter_map(|e| e.value().attr(attr))
        .map(normalize_text)
        .find(|s| !s.is_empty())
}

fn first_text(doc: &Html, css: &str) -> Option<String> {
    let sel = Selector::parse(css).ok()?;
    doc.select(&sel)
        .map(|e| normalize_text(&e.text().collect::<Vec<_>>().join(" ")))
        .find(|s| !s.is_empty())
}

pub fn extract_title(doc: &Html) -> String {
    first_text(doc, "title")
        .or_else(|| first_attr(doc, r#"meta[property="og:title"]"#, "content"))
        .or_else(|| first_text(doc, "h1"))
        .unwrap_or_default()
}

/// Title and main text of a page, text capped at `max_chars`.
pub fn extract_article(html: &str, max_chars: usize) -> Extracted {
    let doc = Html::parse_document(html);
    let title = extract_title(&doc);

    for css in CONTENT_SELECTORS {
        let Ok(sel) = Selector::parse(css) else {
            continue;
        };
        if let Some(el) = doc.select(&sel).next() {
            let text = visible_text(el);
            if text.chars().count() > SUBSTANTIAL_CHARS {
                return Extracted {
                    title,
                    text: truncate_chars(&text, max_chars),
                };
            }
        }
    }

    let text = Selector::parse("body")
        .ok()
        .and_then(|sel| doc.select(&sel).next().map(visible_text))
        .unwrap_or_default();
    Extracted {
        title,
        text: truncate_chars(&text, max_chars),
    }
}
