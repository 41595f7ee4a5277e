// src/images/mod.rs
//! Image sourcing fallback chain: embedded feed image → stock photo → generated.
//!
//! Every candidate is uploaded to the public host before it is accepted; an
//! upload failure counts as that stage's failure and falls through.

pub mod fetch;
pub mod freeimage;
pub mod pexels;

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;

use crate::ai::GenerationBackend;
use crate::error::CallError;
use crate::model::{ImageCandidate, ImageOrigin, ItemStatus, NewsItem};
use crate::retry::RetryPolicy;

pub use fetch::HttpImageFetcher;
pub use freeimage::FreeImageHost;
pub use pexels::PexelsSearch;

/// What to do with an item whose every image stage failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFallbackPolicy {
    /// The item is marked Failed (image stage) and not written.
    FailItem,
    /// The item is written with an empty image URL.
    WriteWithoutImage,
}

impl ImageFallbackPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageFallbackPolicy::FailItem => "fail-item",
            ImageFallbackPolicy::WriteWithoutImage => "write-without-image",
        }
    }
}

impl FromStr for ImageFallbackPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "fail-item" | "fail" => Ok(ImageFallbackPolicy::FailItem),
            "write-without-image" | "write" => Ok(ImageFallbackPolicy::WriteWithoutImage),
            other => anyhow::bail!("unknown image fallback policy '{other}'"),
        }
    }
}

// ---- collaborator seams ----

/// Download raw image bytes; non-image responses are errors.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, CallError>;
}

/// Stock-photo search; `Ok(None)` means no result for the query.
#[async_trait]
pub trait StockPhotoSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Option<String>, CallError>;
}

/// Public image host; returns a stable URL.
#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn upload(&self, bytes: &[u8]) -> Result<String, CallError>;
}

/// One step of the fallback chain. `Ok(None)` = nothing to offer (not an error).
#[async_trait]
pub trait ImageStage: Send + Sync {
    fn origin(&self) -> ImageOrigin;
    async fn attempt(&self, item: &NewsItem) -> Result<Option<ImageCandidate>, CallError>;
}

// ---- stages ----

pub struct EmbeddedStage {
    fetcher: Arc<dyn ImageFetcher>,
    retry: RetryPolicy,
}

impl EmbeddedStage {
    pub fn new(fetcher: Arc<dyn ImageFetcher>, retry: RetryPolicy) -> Self {
        Self { fetcher, retry }
    }
}

#[async_trait]
impl ImageStage for EmbeddedStage {
    fn origin(&self) -> ImageOrigin {
        ImageOrigin::Embedded
    }

    async fn attempt(&self, item: &NewsItem) -> Result<Option<ImageCandidate>, CallError> {
        let Some(url) = item.embedded_image_url.as_deref() else {
            return Ok(None);
        };
        let bytes = self
            .retry
            .run("fetch-embedded", || self.fetcher.fetch(url))
            .await?;
        Ok(Some(ImageCandidate {
            bytes,
            origin: ImageOrigin::Embedded,
            prompt: None,
        }))
    }
}

pub struct StockStage {
    search: Option<Arc<dyn StockPhotoSearch>>,
    fetcher: Arc<dyn ImageFetcher>,
    retry: RetryPolicy,
}

impl StockStage {
    /// `search = None` disables the stage (always `NoResult`).
    pub fn new(
        search: Option<Arc<dyn StockPhotoSearch>>,
        fetcher: Arc<dyn ImageFetcher>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            search,
            fetcher,
            retry,
        }
    }
}

#[async_trait]
impl ImageStage for StockStage {
    fn origin(&self) -> ImageOrigin {
        ImageOrigin::Stock
    }

    async fn attempt(&self, item: &NewsItem) -> Result<Option<ImageCandidate>, CallError> {
        let Some(search) = &self.search else {
            return Ok(None);
        };
        let query = stock_query(item);
        let found = self
            .retry
            .run("stock-search", || search.search(&query))
            .await?;
        let Some(url) = found else {
            return Ok(None);
        };
        let bytes = self
            .retry
            .run("fetch-stock", || self.fetcher.fetch(&url))
            .await?;
        Ok(Some(ImageCandidate {
            bytes,
            origin: ImageOrigin::Stock,
            prompt: Some(query),
        }))
    }
}

pub struct GeneratedStage {
    backend: Arc<dyn GenerationBackend>,
    retry: RetryPolicy,
}

impl GeneratedStage {
    pub fn new(backend: Arc<dyn GenerationBackend>, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }
}

#[async_trait]
impl ImageStage for GeneratedStage {
    fn origin(&self) -> ImageOrigin {
        ImageOrigin::Generated
    }

    async fn attempt(&self, item: &NewsItem) -> Result<Option<ImageCandidate>, CallError> {
        let prompt = image_prompt(item);
        let bytes = self
            .retry
            .run("generate-image", || self.backend.generate_image(&prompt))
            .await?;
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(ImageCandidate {
            bytes,
            origin: ImageOrigin::Generated,
            prompt: Some(prompt),
        }))
    }
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "that", "this", "into", "about", "over", "after", "its",
    "are", "was", "will", "has", "have", "how", "why", "what", "new", "now", "you", "your", "our",
    "can", "says", "say", "just", "more", "than", "out", "not", "but", "who",
];

/// Keywords from the title for the stock search, falling back to post hashtags.
pub fn stock_query(item: &NewsItem) -> String {
    let words: Vec<String> = item
        .title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .take(5)
        .collect();
    if !words.is_empty() {
        return words.join(" ");
    }
    if let Some(post) = &item.generated_post {
        let tags: Vec<&str> = post
            .hashtags
            .iter()
            .map(|t| t.trim_start_matches('#').trim())
            .filter(|t| !t.is_empty())
            .collect();
        if !tags.is_empty() {
            return tags.join(" ");
        }
    }
    "artificial intelligence".to_string()
}

/// Illustration prompt derived from the post body (plus headline/summary context).
pub fn image_prompt(item: &NewsItem) -> String {
    let head = |s: &str| s.chars().take(200).collect::<String>();
    let body = item
        .generated_post
        .as_ref()
        .map(|p| head(&p.body))
        .unwrap_or_default();
    format!(
        "Photorealistic illustration for an article about artificial intelligence. No text or logos.\n\
         Headline: {}\nSummary: {}\nPost gist: {}",
        item.title,
        head(&item.summary),
        body
    )
}

// ---- resolver ----

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    Resolved { url: String, origin: ImageOrigin },
    Exhausted,
}

pub struct ImageResolver {
    stages: Vec<Box<dyn ImageStage>>,
    host: Arc<dyn ImageHost>,
    retry: RetryPolicy,
}

impl ImageResolver {
    /// Stages run in the given order; first success wins.
    pub fn new(stages: Vec<Box<dyn ImageStage>>, host: Arc<dyn ImageHost>, retry: RetryPolicy) -> Self {
        Self {
            stages,
            host,
            retry,
        }
    }

    /// The standard chain: embedded → stock → generated.
    pub fn standard(
        fetcher: Arc<dyn ImageFetcher>,
        stock: Option<Arc<dyn StockPhotoSearch>>,
        backend: Arc<dyn GenerationBackend>,
        host: Arc<dyn ImageHost>,
        retry: RetryPolicy,
    ) -> Self {
        let stages: Vec<Box<dyn ImageStage>> = vec![
            Box::new(EmbeddedStage::new(fetcher.clone(), retry)),
            Box::new(StockStage::new(stock, fetcher, retry)),
            Box::new(GeneratedStage::new(backend, retry)),
        ];
        Self::new(stages, host, retry)
    }

    /// Walk the chain. On success sets `resolved_image_url`/`image_origin` and moves
    /// the item to `ImageResolved`; on exhaustion the item is left untouched.
    pub async fn resolve(&self, item: &mut NewsItem) -> ImageOutcome {
        for stage in &self.stages {
            let origin = stage.origin();
            let candidate = match stage.attempt(item).await {
                Ok(Some(c)) => c,
                Ok(None) => {
                    tracing::debug!(source_id = %item.source_id, stage = origin.as_str(), "image stage: no result");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(source_id = %item.source_id, stage = origin.as_str(), error = %e, "image stage failed");
                    continue;
                }
            };

            match self
                .retry
                .run("upload", || self.host.upload(&candidate.bytes))
                .await
            {
                Ok(url) => {
                    counter!("image_stage_success_total", "stage" => origin.as_str()).increment(1);
                    tracing::info!(source_id = %item.source_id, stage = origin.as_str(), %url, "image resolved");
                    item.resolved_image_url = Some(url.clone());
                    item.image_origin = Some(origin);
                    item.advance(ItemStatus::ImageResolved);
                    return ImageOutcome::Resolved { url, origin };
                }
                Err(e) => {
                    tracing::warn!(source_id = %item.source_id, stage = origin.as_str(), error = %e, "image upload failed");
                }
            }
        }
        counter!("image_chain_exhausted_total").increment(1);
        ImageOutcome::Exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GeneratedPost;

    #[test]
    fn policy_parses() {
        assert_eq!("fail-item".parse::<ImageFallbackPolicy>().unwrap(), ImageFallbackPolicy::FailItem);
        assert_eq!(
            "WRITE_WITHOUT_IMAGE".parse::<ImageFallbackPolicy>().unwrap(),
            ImageFallbackPolicy::WriteWithoutImage
        );
        assert!("sometimes".parse::<ImageFallbackPolicy>().is_err());
    }

    #[test]
    fn stock_query_uses_title_keywords() {
        let it = NewsItem::new("a", "Google unveils the new Gemini model for robots", "", "F");
        assert_eq!(stock_query(&it), "google unveils gemini model robots");
    }

    #[test]
    fn stock_query_falls_back_to_hashtags_then_default() {
        let mut it = NewsItem::new("a", "AI", "", "F");
        assert_eq!(stock_query(&it), "artificial intelligence");
        it.generated_post = Some(GeneratedPost {
            title: String::new(),
            summary: String::new(),
            body: String::new(),
            hashtags: vec!["#robots".into(), "chips".into()],
        });
        assert_eq!(stock_query(&it), "robots chips");
    }
}
