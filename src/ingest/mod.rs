// src/ingest/mod.rs
pub mod rss;
pub mod types;

use crate::ingest::types::FeedReader;
use crate::model::NewsItem;
use metrics::counter;
use sha2::{Digest, Sha256};

/// Max chars kept for titles/summaries after normalization.
const TEXT_CAP: usize = 1500;

/// Normalize feed text: decode entities, strip tags, collapse whitespace, cap length.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("ws regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > TEXT_CAP {
        out = out.chars().take(TEXT_CAP).collect();
    }

    out
}

const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_cid", "mc_eid", "ref"];

/// Canonical form of an article URL: lowercase scheme/host (done by `url`),
/// no fragment, no tracking params, no trailing slash. `None` if unparsable
/// or not http(s).
pub fn canonical_url(raw: &str) -> Option<String> {
    let mut u = url::Url::parse(raw.trim()).ok()?;
    if !matches!(u.scheme(), "http" | "https") {
        return None;
    }
    u.set_fragment(None);

    let kept: Vec<(String, String)> = u
        .query_pairs()
        .filter(|(k, _)| {
            let k = k.to_ascii_lowercase();
            !k.starts_with("utm_") && !TRACKING_PARAMS.contains(&k.as_str())
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        u.set_query(None);
    } else {
        u.query_pairs_mut().clear().extend_pairs(kept);
    }

    let mut s = u.to_string();
    while s.ends_with('/') && u.query().is_none() {
        s.pop();
    }
    Some(s)
}

/// Stable item key: canonical URL, else `sha256:<hex>` of source name + title.
pub fn compute_source_id(link: Option<&str>, source_name: &str, title: &str) -> String {
    if let Some(c) = link.and_then(canonical_url) {
        return c;
    }
    let mut hasher = Sha256::new();
    hasher.update(source_name.as_bytes());
    hasher.update(b"\n");
    hasher.update(title.trim().as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(7 + 64);
    out.push_str("sha256:");
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Fetch from every feed in configured order. A failing feed is logged and
/// skipped; it never aborts the others.
pub async fn fetch_all(feeds: &[Box<dyn FeedReader>]) -> Vec<NewsItem> {
    let mut raw = Vec::new();
    for f in feeds {
        match f.fetch_latest().await {
            Ok(mut v) => {
                tracing::debug!(target: "ingest", feed = f.name(), items = v.len(), "feed fetched");
                counter!("ingest_events_total").increment(v.len() as u64);
                raw.append(&mut v);
            }
            Err(e) => {
                tracing::warn!(target: "ingest", error = ?e, feed = f.name(), "feed error");
                counter!("ingest_feed_errors_total").increment(1);
            }
        }
    }
    raw
}
