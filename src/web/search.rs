// src/web/search.rs
//! Query building and hit scoring for the search fallback tier.

use crate::matcher::{names_other_make, normalize_tokens, title_matches};
use crate::providers::SearchHit;

const REVIEW_INDICATORS: &[&str] = &["review", "first test", "first drive", "test drive", "road test", "tested", "driven"];
const REVIEW_PATHS: &[&str] = &["/review", "/reviews", "/car-reviews", "/first-drive", "/road-test", "/test-drive"];
const SPEC_PAGE_MARKERS: &[&str] = &["msrp", "specifications", "specs", "compare", "pricing and trims", "configurator", "for sale"];
const TEMPLATE_MARKERS: &[&str] = &["related posts", "you may also like", "more from", "latest news"];
const NON_ARTICLE_PATHS: &[&str] = &[
    "/search", "/category", "/tag/", "/tags/", "/author", "/page/", "/index", "/sitemap", "/feed",
];
const NON_ARTICLE_EXTS: &[&str] = &[".pdf", ".jpg", ".jpeg", ".png", ".gif", ".webp"];

/// Targeted queries, most specific first. Person-specific ones only when a
/// person is known.
pub fn build_queries(domain: &str, make: &str, model: &str, person: &str) -> Vec<String> {
    let mut q = Vec::with_capacity(4);
    let person = person.trim();
    if !person.is_empty() {
        q.push(format!(r#"site:{domain} "{make} {model}" "{person}" review"#));
    }
    q.push(format!(r#"site:{domain} "{make} {model}" review"#));
    q.push(format!(r#"site:{domain} "{make}" "{model}" review"#));
    q.push(format!(r#"site:{domain} "{make} {model}" "first drive""#));
    q
}

/// Rejects listing, tag and media URLs.
pub fn is_article_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    let path = url::Url::parse(&lower)
        .map(|u| u.path().to_string())
        .unwrap_or(lower.clone());
    if path == "/" || path.is_empty() {
        return false;
    }
    !NON_ARTICLE_PATHS.iter().any(|p| path.contains(p))
        && !NON_ARTICLE_EXTS.iter().any(|e| path.ends_with(e))
}

fn on_domain(url: &str, domain: &str) -> bool {
    if domain.is_empty() {
        return true;
    }
    let host = crate::limiter::provider_key_for_url(url);
    host == domain || host.ends_with(&format!(".{domain}"))
}

fn word_present(words: &[String], w: &str) -> bool {
    words
        .iter()
        .any(|t| t == w || strsim::normalized_levenshtein(t, w) >= 0.85)
}

/// Heuristic score; `None` when the hit must not be used.
pub fn score_hit(hit: &SearchHit, make: &str, model: &str, person: &str, domain: &str) -> Option<i32> {
    if !is_article_url(&hit.url) || !on_domain(&hit.url, domain) {
        return None;
    }
    if names_other_make(&hit.title, make) {
        return None;
    }
    if !title_matches(&hit.title, make, model) {
        return None;
    }

    let title = hit.title.to_lowercase();
    let snippet = hit.snippet.to_lowercase();
    let url = hit.url.to_lowercase();
    let review_context = REVIEW_INDICATORS
        .iter()
        .any(|w| title.contains(w) || snippet.contains(w) || url.contains(&w.replace(' ', "-")));
    if !review_context {
        return None;
    }

    let mut score = 0i32;
    if REVIEW_PATHS.iter().any(|p| url.contains(p)) {
        score += 200;
    }

    let model_words = normalize_tokens(model);
    let title_words = normalize_tokens(&hit.title);
    if !model_words.is_empty() {
        let hits = model_words.iter().filter(|w| word_present(&title_words, w)).count();
        if hits * 10 >= model_words.len() * 7 {
            score += 100;
        }
    }

    let person = person.trim().to_lowercase();
    if !person.is_empty() {
        if title.contains(&person) {
            score += 75;
        }
        if snippet.contains(&person) {
            score += 50;
        }
    }

    for ind in REVIEW_INDICATORS {
        if title.contains(ind) || snippet.contains(ind) {
            score += 50;
        }
    }
    if SPEC_PAGE_MARKERS.iter().any(|m| title.contains(m) || snippet.contains(m)) {
        score -= 150;
    }
    if TEMPLATE_MARKERS.iter().any(|m| snippet.contains(m)) {
        score -= 50;
    }
    Some(score)
}

/// Best qualifying hit; earlier hits win ties.
pub fn best_hit(hits: &[SearchHit], make: &str, model: &str, person: &str, domain: &str) -> Option<SearchHit> {
    let mut best: Option<(i32, &SearchHit)> = None;
    for h in hits {
        if let Some(s) = score_hit(h, make, model, person, domain) {
            if best.map_or(true, |(b, _)| s > b) {
                best = Some((s, h));
            }
        }
    }
    best.map(|(_, h)| h.clone())
}
