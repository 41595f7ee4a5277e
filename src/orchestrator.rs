// src/orchestrator.rs
//! One pipeline run: ledger read → fetch → dedupe → keyword gate → cap → per-item
//! (score → post → image → append), items processed independently with a
//! bounded concurrency and a run-level deadline.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::Mutex;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::ai::cache::ScoreCache;
use crate::ai::{GenerationBackend, OpenAiBackend};
use crate::compose::{ComposeSettings, PostComposer};
use crate::config::{AppConfig, PipelineConfig, RssConfig};
use crate::dedupe::{dedupe_with_report, narrow_batch};
use crate::error::{CallError, PipelineError};
use crate::images::{
    FreeImageHost, HttpImageFetcher, ImageFallbackPolicy, ImageFetcher, ImageHost, ImageOutcome,
    ImageResolver, PexelsSearch, StockPhotoSearch,
};
use crate::ingest::rss::RssFeed;
use crate::ingest::types::FeedReader;
use crate::ingest::fetch_all;
use crate::metrics::ensure_metrics_described;
use crate::model::{ItemStatus, NewsItem, RunRecord, SheetRow, Stage};
use crate::relevance::{KeywordGate, RelevanceScorer, ScoreVerdict};
use crate::retry::RetryPolicy;
use crate::sink::{GoogleSheetsSink, LedgerSink};

const USER_AGENT: &str = concat!("ai-news-writer/", env!("CARGO_PKG_VERSION"));

/// External collaborators, built once per process and reused across runs.
pub struct Components {
    pub feeds: Vec<Box<dyn FeedReader>>,
    pub backend: Arc<dyn GenerationBackend>,
    /// `None` disables the stock-photo stage.
    pub stock: Option<Arc<dyn StockPhotoSearch>>,
    pub fetcher: Arc<dyn ImageFetcher>,
    pub host: Arc<dyn ImageHost>,
    pub sink: Arc<dyn LedgerSink>,
}

/// How one item left the per-item stages.
#[derive(Debug)]
enum ItemOutcome {
    Written,
    BelowThreshold,
    Failed { stage: Stage, reason: String },
}

pub struct Pipeline {
    feeds: Vec<Box<dyn FeedReader>>,
    sink: Arc<dyn LedgerSink>,
    gate: KeywordGate,
    scorer: RelevanceScorer,
    composer: PostComposer,
    images: ImageResolver,
    image_policy: ImageFallbackPolicy,
    similarity_threshold: f64,
    max_items: usize,
    concurrency: usize,
    run_timeout: Duration,
    retry: RetryPolicy,
    running: Mutex<()>,
}

impl Pipeline {
    pub fn new(components: Components, rss: &RssConfig, cfg: &PipelineConfig) -> Self {
        let Components {
            feeds,
            backend,
            stock,
            fetcher,
            host,
            sink,
        } = components;
        let compose = ComposeSettings {
            language: cfg.post_language.clone(),
            min_chars: cfg.post_min_chars,
            max_chars: cfg.post_max_chars,
            regenerate_attempts: cfg.regenerate_attempts,
        };
        Self {
            feeds,
            sink,
            gate: KeywordGate::new(rss.keywords.as_slice()),
            scorer: RelevanceScorer::new(backend.clone(), cfg.retry, cfg.relevance_threshold),
            composer: PostComposer::new(backend.clone(), cfg.retry, compose),
            images: ImageResolver::standard(fetcher, stock, backend, host, cfg.retry),
            image_policy: cfg.image_policy,
            similarity_threshold: rss.similarity_threshold,
            max_items: rss.max_items,
            concurrency: cfg.concurrency.max(1),
            run_timeout: cfg.run_timeout,
            retry: cfg.retry,
            running: Mutex::new(()),
        }
    }

    /// Reuse relevance scores across runs for items that never reached the sheet.
    pub fn with_score_cache(mut self, cache: ScoreCache) -> Self {
        self.scorer = self.scorer.with_cache(cache);
        self
    }

    /// Wire the production collaborators from configuration.
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .timeout(cfg.http_timeout)
            .build()?;

        let feeds: Vec<Box<dyn FeedReader>> = cfg
            .rss
            .sources
            .iter()
            .map(|url| Box::new(RssFeed::from_url(url, http.clone())) as Box<dyn FeedReader>)
            .collect();
        let stock: Option<Arc<dyn StockPhotoSearch>> = if cfg.pexels.enabled {
            Some(Arc::new(PexelsSearch::new(http.clone(), &cfg.pexels.api_key)))
        } else {
            None
        };
        let backend: Arc<dyn GenerationBackend> =
            Arc::new(OpenAiBackend::new(&cfg.openai, cfg.http_timeout)?);
        let provider = backend.provider_name();
        let components = Components {
            feeds,
            backend,
            stock,
            fetcher: Arc::new(HttpImageFetcher::new(http.clone())),
            host: Arc::new(FreeImageHost::new(
                http.clone(),
                &cfg.freeimagehost.api_key,
                &cfg.freeimagehost.endpoint,
            )),
            sink: Arc::new(GoogleSheetsSink::from_config(&cfg.sheets, http)?),
        };

        info!(
            provider,
            feeds = cfg.rss.sources.len(),
            keywords = cfg.rss.keywords.len(),
            threshold = cfg.pipeline.relevance_threshold,
            concurrency = cfg.pipeline.concurrency,
            image_policy = cfg.pipeline.image_policy.as_str(),
            "pipeline configured"
        );
        Ok(Self::new(components, &cfg.rss, &cfg.pipeline).with_score_cache(ScoreCache::open(&cfg.cache_dir)))
    }

    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    /// Execute one run. Only a fatal condition (another run active, ledger
    /// unreachable) is an error; per-item failures land in the record.
    pub async fn run(&self) -> Result<RunRecord, PipelineError> {
        let _guard = self
            .running
            .try_lock()
            .map_err(|_| PipelineError::AlreadyRunning)?;
        ensure_metrics_described();
        counter!("pipeline_runs_total").increment(1);

        let mut record = RunRecord::start(Utc::now());
        let deadline = Instant::now() + self.run_timeout;
        info!("pipeline run started");

        let known = self.read_ledger().await?;

        let raw = match timeout_at(deadline, fetch_all(&self.feeds)).await {
            Ok(items) => items,
            Err(_) => {
                warn!("run timed out while fetching feeds");
                record.timed_out = true;
                return Ok(self.finish(record));
            }
        };
        record.items_seen = raw.len();

        let (unique, mut report) = dedupe_with_report(raw, &known);
        let (passed, rejected) = self.gate.partition(unique);
        record.items_filtered = rejected.len();
        let passed = narrow_batch(passed, &mut report, self.similarity_threshold, self.max_items);
        record.items_deduplicated = report.known + report.in_batch + report.similar;
        debug!(
            passed = passed.len(),
            rejected = rejected.len(),
            similar = report.similar,
            "keyword gate applied"
        );
        if report.capped > 0 {
            debug!(capped = report.capped, max_items = self.max_items, "batch capped");
        }

        let mut pending: Vec<String> = passed.iter().map(|i| i.source_id.clone()).collect();
        let mut done: HashSet<String> = HashSet::with_capacity(pending.len());

        let mut results = stream::iter(passed)
            .map(|item| self.process(item))
            .buffer_unordered(self.concurrency);
        loop {
            match timeout_at(deadline, results.next()).await {
                Ok(Some((id, outcome))) => {
                    match outcome {
                        ItemOutcome::Written => record.items_written += 1,
                        ItemOutcome::BelowThreshold => record.items_filtered += 1,
                        ItemOutcome::Failed { stage, reason } => {
                            record.record_failure(&id, stage, reason)
                        }
                    }
                    done.insert(id);
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(timeout_secs = self.run_timeout.as_secs(), "run timed out; abandoning in-flight items");
                    record.timed_out = true;
                    break;
                }
            }
        }
        drop(results);

        pending.retain(|id| !done.contains(id));
        for id in pending {
            record.record_failure(&id, Stage::Timeout, "run timed out before the item completed");
        }

        Ok(self.finish(record))
    }

    async fn read_ledger(&self) -> Result<HashSet<String>, PipelineError> {
        self.retry
            .run("sheets-header", || self.sink.ensure_header())
            .await
            .map_err(PipelineError::LedgerUnavailable)?;
        let known = self
            .retry
            .run("sheets-read", || self.sink.read_known_ids())
            .await
            .map_err(PipelineError::LedgerUnavailable)?;
        debug!(known = known.len(), "ledger loaded");
        Ok(known)
    }

    async fn process(&self, mut item: NewsItem) -> (String, ItemOutcome) {
        let id = item.source_id.clone();

        match self.scorer.score(&mut item).await {
            Ok(ScoreVerdict::Pass(_)) => {}
            Ok(ScoreVerdict::Below(_)) => return (id, ItemOutcome::BelowThreshold),
            Err(e) => return (id, fail(&mut item, Stage::Score, e)),
        }

        let keywords = self.gate.matched(&item);
        if let Err(e) = self.composer.generate_post(&mut item, &keywords).await {
            return (id, fail(&mut item, Stage::Generate, e));
        }

        if let ImageOutcome::Exhausted = self.images.resolve(&mut item).await {
            match self.image_policy {
                ImageFallbackPolicy::FailItem => {
                    let e = CallError::permanent("image fallback chain exhausted");
                    return (id, fail(&mut item, Stage::Image, e));
                }
                ImageFallbackPolicy::WriteWithoutImage => {
                    warn!(source_id = %id, "no image resolved; writing without one");
                }
            }
        }

        let row = SheetRow::written(&item, Utc::now());
        match self
            .retry
            .run("sheets-append", || self.sink.append_row(&row))
            .await
        {
            Ok(()) => {
                item.advance(ItemStatus::Written);
                info!(
                    source_id = %id,
                    score = item.relevance_score,
                    image = item.image_origin.map(|o| o.as_str()).unwrap_or("none"),
                    "item written"
                );
                (id, ItemOutcome::Written)
            }
            Err(e) => (id, fail(&mut item, Stage::Write, e)),
        }
    }

    fn finish(&self, mut record: RunRecord) -> RunRecord {
        record.finish(Utc::now());
        counter!("pipeline_items_seen_total").increment(record.items_seen as u64);
        counter!("pipeline_items_written_total").increment(record.items_written as u64);
        counter!("pipeline_items_failed_total").increment(record.items_failed as u64);
        counter!("pipeline_items_filtered_total").increment(record.items_filtered as u64);
        if let Some(ms) = record.duration_ms() {
            histogram!("pipeline_run_duration_ms").record(ms as f64);
        }
        gauge!("pipeline_last_run_ts").set(record.started_at.timestamp() as f64);

        info!(summary = %record.summary_line(), "pipeline run finished");
        for f in &record.failures {
            warn!(source_id = %f.source_id, stage = f.stage.as_str(), reason = %f.reason, "item failed");
        }
        record
    }
}

fn fail(item: &mut NewsItem, stage: Stage, err: CallError) -> ItemOutcome {
    item.advance(ItemStatus::Failed);
    debug!(source_id = %item.source_id, stage = stage.as_str(), error = %err, "item failed");
    ItemOutcome::Failed {
        stage,
        reason: err.to_string(),
    }
}
