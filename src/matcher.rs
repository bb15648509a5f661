// src/matcher.rs
//! Vehicle name variants and fuzzy title/transcript matching.
//!
//! Titles abbreviate, reorder and drop words, so matching is threshold based
//! over normalized tokens instead of substring containment. Tokens are
//! lowercase alphanumerics with short letter+number model codes rejoined
//! (`CX-90`, `cx 90` and `cx90` all become `cx90`), which also keeps `cx5`
//! from matching `cx50`.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// Single-word makes. Multi-word makes whose words collide with model names
/// (Land Rover, Aston Martin) are left out.
pub const KNOWN_MAKES: &[&str] = &[
    "acura", "audi", "bentley", "bmw", "buick", "cadillac", "chevrolet", "chevy", "chrysler",
    "dodge", "ferrari", "fiat", "ford", "genesis", "gmc", "honda", "hyundai", "infiniti",
    "jaguar", "jeep", "kia", "lamborghini", "lexus", "lincoln", "lotus", "lucid", "maserati",
    "mazda", "mclaren", "mercedes", "benz", "mini", "mitsubishi", "nissan", "polestar",
    "porsche", "ram", "rivian", "subaru", "tesla", "toyota", "volkswagen", "vw", "volvo",
];

/// Drivetrain and filler words that titles routinely drop.
const OPTIONAL_WORDS: &[&str] = &["awd", "4wd", "fwd", "rwd", "2wd", "4x4", "drive", "wheel", "all"];

/// Words that turn a model into a different sibling model when they follow it.
const SIBLING_SUFFIXES: &[&str] = &["cross", "max", "plus", "prime", "hatchback", "sportback", "l", "xl"];

const SIBLING_PREFIXES: &[&str] = &["grand"];

/// Trim designations recognised at the tail of a model string.
pub const TRIM_INDICATORS: &[&str] = &[
    "grand touring", "sport touring", "crew cab", "premium plus", "carbon edition", "n line",
    "king ranch", "type s", "a-spec", "ex-l", "gt-line", "x-line", "s plus", "off-road",
    "limited", "platinum", "premium", "ultimate", "signature", "touring", "sport", "preferred",
    "select", "luxury", "prestige", "technology", "advance", "titanium", "denali", "lariat",
    "rubicon", "sahara", "trailhawk", "rs", "gt", "se", "sel", "le", "xle", "xse", "lx", "ex",
    "lt", "ltz", "trd", "sr", "sr5", "sv", "sl", "st", "sxt", "xlt", "at4", "pro", "base",
    "hybrid", "turbo", "awd", "4wd", "fwd", "rwd",
];

/// Bidirectional word swaps applied to variants.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("electric", "ev"),
    ("awd", "all wheel drive"),
    ("awd", "4wd"),
    ("suv", "sport utility"),
    ("hybrid", "h"),
    ("turbo", "t"),
    ("coupe", "coup"),
];

static RE_LETTERS_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([a-z]+)(\d+)\b").expect("letters-digits regex"));
static RE_DIGITS_LETTERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d+)([a-z]+)\b").expect("digits-letters regex"));
static RE_MX5_MIATA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(mx-?5\s+miata)\b\s*(.*)$").expect("miata regex"));

fn is_make(word: &str) -> bool {
    KNOWN_MAKES.contains(&word)
}

fn is_optional(word: &str) -> bool {
    OPTIONAL_WORDS.contains(&word)
}

fn is_code_prefix(w: &str) -> bool {
    (1..=3).contains(&w.len()) && w.chars().all(|c| c.is_ascii_alphabetic())
}

fn is_code_number(w: &str) -> bool {
    (1..=3).contains(&w.len()) && w.chars().all(|c| c.is_ascii_digit())
}

/// Lowercase alphanumeric tokens with `cx 90` style codes joined into `cx90`.
pub fn normalize_tokens(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let raw: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .collect();

    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let w = raw[i];
        if let Some(next) = raw.get(i + 1) {
            if is_code_prefix(w) && is_code_number(next) {
                out.push(format!("{w}{next}"));
                i += 2;
                continue;
            }
        }
        out.push(w.to_string());
        i += 1;
    }
    out
}

/// Splits a model into its base name and a trailing trim, if one is recognised.
///
/// `"Kona Limited AWD"` gives `("Kona", Some("Limited AWD"))`. The base always
/// keeps at least one word.
pub fn strip_trim(model: &str) -> (String, Option<String>) {
    let model = model.trim();
    if let Some(c) = RE_MX5_MIATA.captures(model) {
        let base = c.get(1).map(|m| m.as_str()).unwrap_or(model).to_string();
        let rest = c.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
        return (base, (!rest.is_empty()).then(|| rest.to_string()));
    }

    let words: Vec<&str> = model.split_whitespace().collect();
    let mut end = words.len();
    'outer: while end > 1 {
        for tail in (1..=3usize).rev() {
            if tail >= end {
                continue;
            }
            let candidate = words[end - tail..end].join(" ").to_lowercase();
            if TRIM_INDICATORS.contains(&candidate.as_str()) {
                end -= tail;
                continue 'outer;
            }
        }
        // Short all-caps tail without digits reads as a trim code (e.g. "XSE").
        let last = words[end - 1];
        if (2..=4).contains(&last.len())
            && last.chars().any(|c| c.is_ascii_alphabetic())
            && last.chars().all(|c| c.is_ascii_uppercase() || c == '-')
        {
            end -= 1;
            continue;
        }
        break;
    }

    if end == words.len() {
        return (model.to_string(), None);
    }
    (words[..end].join(" "), Some(words[end..].join(" ")))
}

fn separator_forms(s: &str) -> Vec<String> {
    let mut out = vec![
        s.to_string(),
        s.replace('-', " "),
        s.replace(' ', "-"),
        s.replace([' ', '-'], ""),
    ];
    let joined = s.replace([' ', '-'], "");
    out.push(RE_LETTERS_DIGITS.replace_all(&joined, "$1 $2").to_string());
    out.push(RE_LETTERS_DIGITS.replace_all(&joined, "$1-$2").to_string());
    out.push(RE_DIGITS_LETTERS.replace_all(s, "$1 $2").to_string());
    out
}

fn swap_abbreviations(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let padded = format!(" {s} ");
    for (long, short) in ABBREVIATIONS {
        for (from, to) in [(long, short), (short, long)] {
            let needle = format!(" {from} ");
            if padded.contains(&needle) {
                out.push(padded.replace(&needle, &format!(" {to} ")).trim().to_string());
            }
        }
    }
    out
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Every spelling of `model` (and `make model`) a title is likely to use.
pub fn generate_variants(make: &str, model: &str) -> BTreeSet<String> {
    let make_l = collapse_ws(&make.to_lowercase());
    let model_l = collapse_ws(&model.to_lowercase());

    let mut bases = vec![model_l.clone()];
    let (base, trim) = strip_trim(model);
    if trim.is_some() {
        bases.push(collapse_ws(&base.to_lowercase()));
    }

    let mut forms: BTreeSet<String> = BTreeSet::new();
    for b in &bases {
        for f in separator_forms(b) {
            for swapped in swap_abbreviations(&f) {
                forms.insert(collapse_ws(&swapped));
            }
            forms.insert(collapse_ws(&f));
        }
    }

    let mut out: BTreeSet<String> = BTreeSet::new();
    out.insert(model_l);
    let make_joined = make_l.replace(' ', "");
    for f in &forms {
        out.insert(f.clone());
        if make_l.is_empty() {
            continue;
        }
        out.insert(format!("{make_l} {f}"));
        if !f.contains(' ') {
            out.insert(format!("{make_joined}{f}"));
            out.insert(format!("{make_joined}-{f}"));
        }
    }
    out.retain(|v| v.chars().count() > 1);
    out
}

/// Threshold match of one variant against pre-tokenized text.
pub fn matches_tokens(text_tokens: &[String], variant: &str) -> bool {
    let words = normalize_tokens(variant);
    if words.is_empty() {
        return false;
    }
    let present = |w: &str| text_tokens.iter().any(|t| t == w);

    let core: Vec<&str> = words
        .iter()
        .map(String::as_str)
        .filter(|w| !is_make(w) && !is_optional(w))
        .collect();

    if core.is_empty() {
        return words.iter().all(|w| present(w));
    }

    if core.len() == 1 {
        return whole_word_model(text_tokens, core[0]);
    }

    let core_hits = core.iter().filter(|w| present(w)).count();
    if core_hits == core.len() || core_hits >= 2 {
        return true;
    }
    let all_hits = words.iter().filter(|w| present(w)).count();
    core_hits >= 1 && all_hits * 10 >= words.len() * 8
}

/// The sole core word must stand as its own model, not the head of a sibling
/// such as "Corolla Cross" or the tail of "Grand Cherokee".
fn whole_word_model(tokens: &[String], core: &str) -> bool {
    tokens.iter().enumerate().any(|(i, t)| {
        if t != core {
            return false;
        }
        let next_ok = tokens
            .get(i + 1)
            .map_or(true, |n| !SIBLING_SUFFIXES.contains(&n.as_str()));
        let prev_ok = i == 0 || !SIBLING_PREFIXES.contains(&tokens[i - 1].as_str());
        next_ok && prev_ok
    })
}

pub fn matches(text: &str, variant: &str) -> bool {
    matches_tokens(&normalize_tokens(text), variant)
}

/// True when any variant of make/model matches `text`.
pub fn title_matches(text: &str, make: &str, model: &str) -> bool {
    let tokens = normalize_tokens(text);
    generate_variants(make, model)
        .iter()
        .any(|v| matches_tokens(&tokens, v))
}

/// A known make other than `make` appears in `text` while `make` does not.
pub fn names_other_make(text: &str, make: &str) -> bool {
    let tokens = normalize_tokens(text);
    let own = normalize_tokens(make);
    if own.iter().any(|w| tokens.contains(w)) {
        return false;
    }
    tokens
        .iter()
        .any(|t| is_make(t) && !own.contains(t))
}
