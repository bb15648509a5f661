// src/web/index.rs
//! Review index and listing pages.
//!
//! Outlets often hand out a section page ("/reviews") instead of the article.
//! Its headlines can name the vehicle and its text can be long enough to pass
//! acceptance, so it is detected first and the best matching article link on
//! the same site is followed instead.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use url::Url;

use super::extract::normalize_text;
use super::search::is_article_url;
use crate::limiter::provider_key_for_url;
use crate::matcher::title_matches;

/// Last path segments that name a section rather than an article.
const INDEX_SEGMENTS: &[&str] = &[
    "reviews",
    "car-reviews",
    "auto-reviews",
    "road-tests",
    "first-drives",
    "car-comparison-tests",
    "news",
    "blog",
];

const LISTING_MIN_LINKS: usize = 12;
/// Share of page text sitting inside article links.
const LISTING_LINK_SHARE: f64 = 0.5;
const REVIEW_WORDS: &[&str] = &["review", "test", "drive", "first look", "driven"];

static SEL_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("link selector"));
static SEL_BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").expect("body selector"));

#[derive(Debug, Clone, PartialEq, Eq)]
struct Link {
    url: String,
    text: String,
}

fn index_like_path(page: &Url) -> bool {
    let last = page
        .path_segments()
        .and_then(|mut s| s.rfind(|p| !p.is_empty()))
        .unwrap_or_default()
        .to_ascii_lowercase();
    INDEX_SEGMENTS.contains(&last.as_str())
}

/// Same-site links in document order, fragments stripped, self-links dropped.
fn site_links(page: &Url, doc: &Html) -> Vec<Link> {
    let host = provider_key_for_url(page.as_str());
    let mut out: Vec<Link> = Vec::new();
    for a in doc.select(&SEL_LINK) {
        let Some(href) = a.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") || href.starts_with("mailto:") {
            continue;
        }
        let Ok(mut target) = page.join(href) else {
            continue;
        };
        target.set_fragment(None);
        if target.path() == page.path() || provider_key_for_url(target.as_str()) != host {
            continue;
        }
        let url = target.to_string();
        if out.iter().any(|l| l.url == url) {
            continue;
        }
        out.push(Link {
            url,
            text: normalize_text(&a.text().collect::<Vec<_>>().join(" ")),
        });
    }
    out
}

fn link_heavy(links: &[Link], doc: &Html) -> bool {
    let articles: Vec<&Link> = links.iter().filter(|l| is_article_url(&l.url)).collect();
    if articles.len() < LISTING_MIN_LINKS {
        return false;
    }
    let body_chars = doc
        .select(&SEL_BODY)
        .next()
        .map(|b| normalize_text(&b.text().collect::<Vec<_>>().join(" ")).chars().count())
        .unwrap_or(0);
    let link_chars: usize = articles.iter().map(|l| l.text.chars().count()).sum();
    body_chars == 0 || link_chars as f64 / body_chars as f64 >= LISTING_LINK_SHARE
}

/// Section path, or a page that is mostly article links.
pub fn is_index_page(page_url: &str, html: &str) -> bool {
    let Ok(page) = Url::parse(page_url) else {
        return false;
    };
    if index_like_path(&page) {
        return true;
    }
    let doc = Html::parse_document(html);
    link_heavy(&site_links(&page, &doc), &doc)
}

fn slug_words(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string())
        .replace(['/', '-', '_', '.'], " ")
}

fn link_score(link: &Link, make: &str, model: &str) -> i32 {
    let mut score = 0;
    if title_matches(&link.text, make, model) {
        score += 10;
    }
    let slug = slug_words(&link.url);
    if title_matches(&slug, make, model) {
        score += 5;
    }
    let hay = format!("{} {}", link.text, slug).to_lowercase();
    if REVIEW_WORDS.iter().any(|w| hay.contains(w)) {
        score += 2;
    }
    score
}

/// Article links naming the vehicle, best first.
pub fn ranked_links(page_url: &str, html: &str, make: &str, model: &str) -> Vec<String> {
    let Ok(page) = Url::parse(page_url) else {
        return Vec::new();
    };
    let doc = Html::parse_document(html);
    let mut scored: Vec<(i32, usize, String)> = site_links(&page, &doc)
        .into_iter()
        .filter(|l| is_article_url(&l.url) && !index_like_path_str(&l.url))
        .enumerate()
        .filter_map(|(i, l)| {
            let s = link_score(&l, make, model);
            (s >= 5).then_some((s, i, l.url))
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    scored.into_iter().map(|(_, _, url)| url).collect()
}

fn index_like_path_str(url: &str) -> bool {
    Url::parse(url).map(|u| index_like_path(&u)).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(extra: &str) -> String {
        let filler: String = (0..14)
            .map(|i| format!(r#"<li><a href="/reviews/a{i}/2025-model-{i}-review/">2025 Model {i} Review</a></li>"#))
            .collect();
        format!("<html><body><h1>Reviews</h1><ul>{extra}{filler}</ul></body></html>")
    }

    #[test]
    fn section_paths_are_index_pages() {
        assert!(is_index_page("https://www.motortrend.com/car-reviews/", "<html></html>"));
        assert!(is_index_page("https://tightwadgarage.com/blog", "<html></html>"));
        assert!(!is_index_page("https://www.motortrend.com/reviews/2025-mazda-cx-90-review/", "<html></html>"));
        assert!(!is_index_page("https://www.caranddriver.com/", "<html><body>Latest</body></html>"));
    }

    #[test]
    fn link_heavy_page_is_listing_even_on_article_like_path() {
        let url = "https://www.outlet.com/latest-stories-2025";
        assert!(is_index_page(url, &listing("")));

        let para = "A long paragraph about how the car drives. ".repeat(60);
        let article = format!(
            r#"<html><body><article><p>{para}</p><a href="/reviews/x/other-review/">Other review</a></article></body></html>"#
        );
        assert!(!is_index_page(url, &article));
    }

    #[test]
    fn best_link_names_the_vehicle() {
        let html = listing(
            r#"<li><a href="/reviews/a99/2025-mazda-cx-50-review/">2025 Mazda CX-50 Review</a></li>
               <li><a href="https://www.outlet.com/reviews/a98/2025-mazda-cx-90-review/#comments">2025 Mazda CX-90 Review: Big and Smooth</a></li>
               <li><a href="https://other.com/mazda-cx-90-review/">Mazda CX-90 review elsewhere</a></li>
               <li><a href="/tag/mazda-cx-90/">Mazda CX-90</a></li>"#,
        );
        let links = ranked_links("https://www.outlet.com/reviews/", &html, "Mazda", "CX-90");
        assert_eq!(
            links.first().map(String::as_str),
            Some("https://www.outlet.com/reviews/a98/2025-mazda-cx-90-review/")
        );
        assert!(links.iter().all(|l| !l.contains("other.com") && !l.contains("/tag/")));
        assert!(ranked_links("https://www.outlet.com/reviews/", &html, "Kia", "EV9").is_empty());
    }
}
