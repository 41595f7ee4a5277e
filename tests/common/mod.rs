// tests/common/mod.rs
//
// In-memory fakes for every collaborator seam. Each one records its calls so
// tests can assert on what was (and was not) invoked.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use ai_news_writer::ai::{GenerationBackend, TextTask};
use ai_news_writer::config::{PipelineConfig, RssConfig};
use ai_news_writer::images::{ImageFetcher, ImageHost, StockPhotoSearch};
use ai_news_writer::ingest::types::FeedReader;
use ai_news_writer::model::{NewsItem, SheetRow};
use ai_news_writer::sink::LedgerSink;
use ai_news_writer::{CallError, Components, Pipeline, RetryPolicy};

// ---------- feeds ----------

pub struct FakeFeed {
    pub name: String,
    pub items: Mutex<Vec<NewsItem>>,
    pub fail: bool,
}

impl FakeFeed {
    pub fn new(name: &str, items: Vec<NewsItem>) -> Self {
        Self {
            name: name.to_string(),
            items: Mutex::new(items),
            fail: false,
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            items: Mutex::new(Vec::new()),
            fail: true,
        }
    }
}

#[async_trait]
impl FeedReader for FakeFeed {
    async fn fetch_latest(&self) -> anyhow::Result<Vec<NewsItem>> {
        if self.fail {
            anyhow::bail!("feed {} unreachable", self.name);
        }
        Ok(self.items.lock().clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Shared handle so a test can keep feeding the same items across runs.
pub struct SharedFeed(pub Arc<FakeFeed>);

#[async_trait]
impl FeedReader for SharedFeed {
    async fn fetch_latest(&self) -> anyhow::Result<Vec<NewsItem>> {
        self.0.fetch_latest().await
    }

    fn name(&self) -> &str {
        self.0.name()
    }
}

pub fn item(id: &str, title: &str, summary: &str) -> NewsItem {
    NewsItem::new(id, title, summary, "Test Feed")
}

// ---------- generation backend ----------

#[derive(Default)]
pub struct FakeBackend {
    /// (needle in prompt, reply) for scoring; first match wins.
    pub scores: Mutex<Vec<(String, String)>>,
    /// Prompts containing any of these fail post generation transiently.
    pub post_failures: Mutex<Vec<String>>,
    /// `None` means image generation fails permanently.
    pub image: Mutex<Option<Vec<u8>>>,
    pub calls: Mutex<Vec<(TextTask, String)>>,
    pub image_calls: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        let b = Self::default();
        *b.image.lock() = Some(vec![0x89, b'P', b'N', b'G']);
        b
    }

    pub fn score(self, needle: &str, reply: &str) -> Self {
        self.scores.lock().push((needle.to_string(), reply.to_string()));
        self
    }

    pub fn fail_post_for(self, needle: &str) -> Self {
        self.post_failures.lock().push(needle.to_string());
        self
    }

    pub fn without_images(self) -> Self {
        *self.image.lock() = None;
        self
    }

    pub fn calls_for(&self, task: TextTask) -> usize {
        self.calls.lock().iter().filter(|(t, _)| *t == task).count()
    }

    pub fn prompts_mentioning(&self, task: TextTask, needle: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|(t, p)| *t == task && p.contains(needle))
            .count()
    }
}

pub fn valid_post_json() -> String {
    serde_json::json!({
        "title": "Agents move from demo to production",
        "summary": "A short take on what changed and why it matters for teams shipping automation.",
        "body": "Practical takeaways for engineers. ".repeat(30),
        "hashtags": ["ai", "automation", "agents"],
    })
    .to_string()
}

#[async_trait]
impl GenerationBackend for FakeBackend {
    async fn complete(&self, task: TextTask, prompt: &str) -> Result<String, CallError> {
        self.calls.lock().push((task, prompt.to_string()));
        match task {
            TextTask::Score => {
                let reply = self
                    .scores
                    .lock()
                    .iter()
                    .find(|(needle, _)| prompt.contains(needle.as_str()))
                    .map(|(_, r)| r.clone())
                    .unwrap_or_else(|| "score: 8 - useful".to_string());
                Ok(reply)
            }
            TextTask::Post => {
                if self
                    .post_failures
                    .lock()
                    .iter()
                    .any(|n| prompt.contains(n.as_str()))
                {
                    return Err(CallError::transient("503 from backend"));
                }
                Ok(valid_post_json())
            }
        }
    }

    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, CallError> {
        self.image_calls.lock().push(prompt.to_string());
        self.image
            .lock()
            .clone()
            .ok_or_else(|| CallError::permanent("content policy"))
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}

// ---------- images ----------

#[derive(Default)]
pub struct FakeStock {
    pub result: Mutex<Option<String>>,
    pub queries: Mutex<Vec<String>>,
}

impl FakeStock {
    pub fn returning(url: Option<&str>) -> Self {
        Self {
            result: Mutex::new(url.map(str::to_string)),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.queries.lock().len()
    }
}

#[async_trait]
impl StockPhotoSearch for FakeStock {
    async fn search(&self, query: &str) -> Result<Option<String>, CallError> {
        self.queries.lock().push(query.to_string());
        Ok(self.result.lock().clone())
    }
}

/// Serves bytes for known URLs; anything else is a 404.
#[derive(Default)]
pub struct FakeFetcher {
    pub images: Mutex<HashMap<String, Vec<u8>>>,
    pub fetched: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn serving(urls: &[&str]) -> Self {
        let f = Self::default();
        for u in urls {
            f.images.lock().insert(u.to_string(), u.as_bytes().to_vec());
        }
        f
    }
}

#[async_trait]
impl ImageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, CallError> {
        self.fetched.lock().push(url.to_string());
        self.images
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| CallError::permanent(format!("fetch-image: 404 for {url}")))
    }
}

/// Uploads succeed unless the bytes are in `reject`.
#[derive(Default)]
pub struct FakeHost {
    pub reject: Mutex<HashSet<Vec<u8>>>,
    pub uploads: Mutex<Vec<Vec<u8>>>,
}

impl FakeHost {
    pub fn rejecting(bytes: &[u8]) -> Self {
        let h = Self::default();
        h.reject.lock().insert(bytes.to_vec());
        h
    }

    pub fn calls(&self) -> usize {
        self.uploads.lock().len()
    }
}

#[async_trait]
impl ImageHost for FakeHost {
    async fn upload(&self, bytes: &[u8]) -> Result<String, CallError> {
        let n = {
            let mut u = self.uploads.lock();
            u.push(bytes.to_vec());
            u.len()
        };
        if self.reject.lock().contains(bytes) {
            return Err(CallError::permanent("upload: rejected"));
        }
        Ok(format!("https://img.test/{n}.jpg"))
    }
}

// ---------- sink ----------

#[derive(Default)]
pub struct FakeSink {
    pub rows: Mutex<Vec<SheetRow>>,
    /// Appends for these ids fail transiently (until removed).
    pub failing_ids: Mutex<HashSet<String>>,
    pub unreachable: Mutex<bool>,
    pub append_calls: Mutex<usize>,
    pub header_written: Mutex<bool>,
}

impl FakeSink {
    pub fn written_ids(&self) -> Vec<String> {
        self.rows.lock().iter().map(|r| r.source_id.clone()).collect()
    }

    pub fn fail_appends_for(&self, id: &str) {
        self.failing_ids.lock().insert(id.to_string());
    }

    pub fn heal(&self) {
        self.failing_ids.lock().clear();
    }
}

#[async_trait]
impl LedgerSink for FakeSink {
    async fn ensure_header(&self) -> Result<(), CallError> {
        if *self.unreachable.lock() {
            return Err(CallError::transient("sheets: 503"));
        }
        *self.header_written.lock() = true;
        Ok(())
    }

    async fn read_known_ids(&self) -> Result<HashSet<String>, CallError> {
        if *self.unreachable.lock() {
            return Err(CallError::transient("sheets: 503"));
        }
        Ok(self.written_ids().into_iter().collect())
    }

    async fn append_row(&self, row: &SheetRow) -> Result<(), CallError> {
        *self.append_calls.lock() += 1;
        if self.failing_ids.lock().contains(&row.source_id) {
            return Err(CallError::transient("sheets: 500"));
        }
        self.rows.lock().push(row.clone());
        Ok(())
    }
}

// ---------- wiring ----------

pub struct Fakes {
    pub backend: Arc<FakeBackend>,
    pub stock: Arc<FakeStock>,
    pub fetcher: Arc<FakeFetcher>,
    pub host: Arc<FakeHost>,
    pub sink: Arc<FakeSink>,
}

impl Fakes {
    pub fn new(backend: FakeBackend) -> Self {
        Self {
            backend: Arc::new(backend),
            stock: Arc::new(FakeStock::returning(None)),
            fetcher: Arc::new(FakeFetcher::default()),
            host: Arc::new(FakeHost::default()),
            sink: Arc::new(FakeSink::default()),
        }
    }

    pub fn components(&self, feeds: Vec<Box<dyn FeedReader>>) -> Components {
        Components {
            feeds,
            backend: self.backend.clone(),
            stock: Some(self.stock.clone()),
            fetcher: self.fetcher.clone(),
            host: self.host.clone(),
            sink: self.sink.clone(),
        }
    }
}

pub fn rss_config(keywords: &[&str]) -> RssConfig {
    RssConfig {
        sources: Vec::new(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        similarity_threshold: 0.85,
        max_items: 25,
    }
}

pub fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        retry: RetryPolicy::immediate(3),
        ..Default::default()
    }
}

pub fn pipeline(fakes: &Fakes, feeds: Vec<Box<dyn FeedReader>>, keywords: &[&str]) -> Pipeline {
    Pipeline::new(fakes.components(feeds), &rss_config(keywords), &pipeline_config())
}
