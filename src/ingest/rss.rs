// src/ingest/rss.rs
//! RSS 2.0 / Atom feed reader. One instance per configured endpoint.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::ingest::types::FeedReader;
use crate::ingest::{compute_source_id, normalize_text};
use crate::model::NewsItem;

// ---- RSS 2.0 ----

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    title: Option<String>,
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    #[serde(rename = "enclosure", default)]
    enclosures: Vec<MediaRef>,
    // quick-xml matches local names: `<media:content>` arrives as `content`.
    #[serde(rename = "content", default)]
    media_content: Vec<MediaRef>,
    #[serde(rename = "thumbnail", default)]
    media_thumbnail: Vec<MediaRef>,
}

#[derive(Debug, Deserialize)]
struct MediaRef {
    #[serde(rename = "@url")]
    url: Option<String>,
    #[serde(rename = "@type")]
    mime: Option<String>,
    #[serde(rename = "@medium")]
    medium: Option<String>,
}

impl MediaRef {
    fn image_url(&self) -> Option<&str> {
        let url = self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
        let mime_ok = self.mime.as_deref().map_or(true, |m| m.starts_with("image/"));
        let medium_ok = self.medium.as_deref().map_or(true, |m| m == "image");
        (mime_ok && medium_ok).then_some(url)
    }
}

// ---- Atom ----

#[derive(Debug, Deserialize)]
struct AtomFeed {
    title: Option<AtomText>,
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<AtomText>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    summary: Option<AtomText>,
    /// `<content>` and `<media:content>` share a local name; the media one has no text.
    #[serde(rename = "content", default)]
    content: Vec<AtomText>,
    published: Option<String>,
    updated: Option<String>,
    #[serde(rename = "thumbnail", default)]
    media_thumbnail: Vec<MediaRef>,
}

#[derive(Debug, Deserialize)]
struct AtomText {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
    #[serde(rename = "@type")]
    mime: Option<String>,
}

fn parse_feed_date(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    DateTime::parse_from_rfc2822(ts)
        .or_else(|_| DateTime::parse_from_rfc3339(ts))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn build_item(
    source_name: &str,
    title: Option<&str>,
    link: Option<&str>,
    summary: Option<&str>,
    published: Option<&str>,
    image: Option<&str>,
) -> Option<NewsItem> {
    let title = normalize_text(title.unwrap_or_default());
    let link = link.map(str::trim).filter(|l| !l.is_empty());
    if title.is_empty() && link.is_none() {
        return None;
    }
    let summary = normalize_text(summary.unwrap_or_default());
    let source_id = compute_source_id(link, source_name, &title);

    let mut item = NewsItem::new(source_id, title, summary, source_name);
    if let Some(l) = link {
        item = item.with_link(l);
    }
    if let Some(ts) = published.and_then(parse_feed_date) {
        item = item.with_published_at(ts);
    }
    if let Some(img) = image {
        item = item.with_embedded_image(img);
    }
    Some(item)
}

/// Parse an RSS 2.0 or Atom document. `fallback_name` is used when the feed has no title.
pub fn parse_feed(xml: &str, fallback_name: &str) -> Result<Vec<NewsItem>> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);

    let out = match from_str::<Rss>(&xml_clean) {
        Ok(rss) => {
            let name = feed_name(rss.channel.title.as_deref(), fallback_name);
            rss.channel
                .item
                .iter()
                .filter_map(|it| {
                    let image = it
                        .enclosures
                        .iter()
                        .chain(it.media_content.iter())
                        .chain(it.media_thumbnail.iter())
                        .find_map(MediaRef::image_url);
                    build_item(
                        &name,
                        it.title.as_deref(),
                        it.link.as_deref(),
                        it.description.as_deref(),
                        it.pub_date.as_deref(),
                        image,
                    )
                })
                .collect::<Vec<_>>()
        }
        Err(rss_err) => {
            if !xml_clean.contains("<feed") {
                return Err(anyhow!("not an RSS or Atom document: {rss_err}"))
                    .with_context(|| format!("parsing feed {fallback_name}"));
            }
            let atom: AtomFeed = from_str(&xml_clean)
                .map_err(|atom_err| anyhow!("not RSS ({rss_err}) nor Atom ({atom_err})"))
                .with_context(|| format!("parsing feed {fallback_name}"))?;
            let name = feed_name(atom.title.as_ref().map(|t| t.value.as_str()), fallback_name);
            atom.entry
                .iter()
                .filter_map(|e| {
                    let link = e
                        .links
                        .iter()
                        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
                        .and_then(|l| l.href.as_deref());
                    let image = e
                        .links
                        .iter()
                        .filter(|l| l.rel.as_deref() == Some("enclosure"))
                        .filter(|l| l.mime.as_deref().map_or(true, |m| m.starts_with("image/")))
                        .find_map(|l| l.href.as_deref())
                        .or_else(|| e.media_thumbnail.iter().find_map(MediaRef::image_url));
                    let content = e.content.iter().find(|t| !t.value.trim().is_empty());
                    let summary = e.summary.as_ref().or(content).map(|t| t.value.as_str());
                    build_item(
                        &name,
                        e.title.as_ref().map(|t| t.value.as_str()),
                        link,
                        summary,
                        e.published.as_deref().or(e.updated.as_deref()),
                        image,
                    )
                })
                .collect::<Vec<_>>()
        }
    };

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("ingest_parse_ms").record(ms);
    Ok(out)
}

fn feed_name(title: Option<&str>, fallback: &str) -> String {
    title
        .map(normalize_text)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

pub struct RssFeed {
    name: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RssFeed {
    /// Feed served from a string (tests, local runs).
    pub fn from_fixture(name: &str, xml: &str) -> Self {
        Self {
            name: name.to_string(),
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn from_url(url: &str, client: reqwest::Client) -> Self {
        let name = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string());
        Self {
            name,
            mode: Mode::Http {
                url: url.to_string(),
                client,
            },
        }
    }
}

#[async_trait]
impl FeedReader for RssFeed {
    async fn fetch_latest(&self) -> Result<Vec<NewsItem>> {
        match &self.mode {
            Mode::Fixture(s) => parse_feed(s, &self.name),
            Mode::Http { url, client } => {
                let resp = client
                    .get(url.as_str())
                    .send()
                    .await
                    .with_context(|| format!("GET {url}"))?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(anyhow!("GET {url}: HTTP {status}"));
                }
                let body = resp.text().await.with_context(|| format!("reading {url}"))?;
                parse_feed(&body, &self.name)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Named HTML entities are not valid XML; map the common ones before parsing.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&hellip;", "...")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
