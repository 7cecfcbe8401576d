//! URL/domain canonicalization, the content fingerprint used as the dedup
//! key, and text cleanup for titles and excerpts.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use url::Url;

/// Query parameters dropped during URL normalization (matched
/// case-insensitively). Any other `utm_*` key is dropped as well.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "utm_id",
    "ref",
    "source",
    "fbclid",
    "gclid",
];

/// Excerpt length cap, in chars.
pub const MAX_TEXT_CHARS: usize = 1500;

fn is_tracking_param(key: &str) -> bool {
    let k = key.to_ascii_lowercase();
    k.starts_with("utm_") || TRACKING_PARAMS.contains(&k.as_str())
}

/// Canonical form of an absolute URL: lower-case host, no fragment, no
/// tracking parameters, no single trailing slash (unless the path is `/`).
/// Idempotent.
pub fn normalize_url(raw: &str) -> Result<String, url::ParseError> {
    let mut url = Url::parse(raw.trim())?;

    // `Url` already lower-cases hosts of special schemes; do it for the rest.
    if let Some(host) = url.host_str() {
        let lower = host.to_ascii_lowercase();
        if lower != host {
            url.set_host(Some(&lower))?;
        }
    }

    url.set_fragment(None);

    if url.query().is_some() {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !is_tracking_param(k))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    let path = url.path().to_string();
    if path != "/" && path.ends_with('/') {
        url.set_path(&path[..path.len() - 1]);
    }

    Ok(url.to_string())
}

/// Lower-case, strip a trailing port and a leading `www.`.
pub fn normalize_domain(host: &str) -> String {
    let mut h = host.trim().to_ascii_lowercase();
    if h.starts_with('[') {
        // bracketed IPv6 literal, optionally with a port
        if let Some(end) = h.find(']') {
            h.truncate(end + 1);
        }
    } else if let Some(idx) = h.find(':') {
        h.truncate(idx);
    }
    match h.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => h,
    }
}

/// Normalized domain of an absolute URL, or empty if it does not parse.
pub fn domain_of(raw_url: &str) -> String {
    Url::parse(raw_url.trim())
        .ok()
        .and_then(|u| u.host_str().map(normalize_domain))
        .unwrap_or_default()
}

/// SHA-256 over `lower(trim(title)) | normalize_url(url)`, lowercase hex.
/// Falls back to the raw URL when it does not parse.
pub fn content_fingerprint(title: &str, url: &str) -> String {
    let normalized_url = normalize_url(url).unwrap_or_else(|_| url.to_string());
    let normalized_title = title.trim().to_lowercase();

    let mut hasher = Sha256::new();
    hasher.update(normalized_title.as_bytes());
    hasher.update(b"|");
    hasher.update(normalized_url.as_bytes());
    format!("{:x}", hasher.finalize())
}

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Normalize feed text: decode entities, strip markup, fold typographic
/// quotes, collapse whitespace, cap the length.
pub fn normalize_text(s: &str) -> String {
    // Entities first so escaped markup (`&lt;p&gt;`) is stripped too.
    let decoded = html_escape::decode_html_entities(s).to_string();
    let stripped = RE_TAGS.replace_all(&decoded, " ");

    let folded = stripped
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    let mut out = RE_WS.replace_all(&folded, " ").trim().to_string();

    if out.chars().count() > MAX_TEXT_CHARS {
        out = out.chars().take(MAX_TEXT_CHARS).collect();
    }
    out
}
