// tests/orchestrator_scenarios.rs
//
// End-to-end runs against in-memory fakes: filtering, per-item failure
// isolation, idempotency across runs, single-run guard and run timeout.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use ai_news_writer::ai::{GenerationBackend, TextTask};
use ai_news_writer::images::ImageFallbackPolicy;
use ai_news_writer::ingest::types::FeedReader;
use ai_news_writer::model::{NewsItem, Stage};
use ai_news_writer::{CallError, Pipeline, PipelineError};

use common::*;

fn feeds(items: Vec<NewsItem>) -> Vec<Box<dyn FeedReader>> {
    vec![Box::new(FakeFeed::new("Test Feed", items))]
}

#[tokio::test]
async fn three_items_one_written() {
    let fakes = Fakes::new(FakeBackend::new().score("New model tops", "score: 3 - meh"));
    let fetcher = Arc::new(FakeFetcher::serving(&["https://cdn.test/c.jpg"]));
    let fakes = Fakes { fetcher, ..fakes };

    let items = vec![
        item("a", "Football results", "Weekend scores"),
        item("b", "New model tops leaderboard", "Benchmarks only"),
        item("c", "OpenAI ships agent toolkit", "For developers").with_embedded_image("https://cdn.test/c.jpg"),
    ];
    let p = pipeline(&fakes, feeds(items), &["openai", "model"]);

    let rec = p.run().await.expect("run ok");
    assert_eq!(rec.items_seen, 3);
    assert_eq!(rec.items_written, 1);
    assert_eq!(rec.items_failed, 0);
    assert_eq!(rec.items_filtered, 2);
    assert_eq!(fakes.sink.written_ids(), vec!["c".to_string()]);

    // keyword-rejected item never reached the scorer
    assert_eq!(fakes.backend.prompts_mentioning(TextTask::Score, "Football results"), 0);
    assert_eq!(fakes.backend.calls_for(TextTask::Score), 2);
    // below-threshold item never reached generation
    assert_eq!(fakes.backend.prompts_mentioning(TextTask::Post, "New model tops"), 0);
    // embedded image worked: no stock search, no generation
    assert_eq!(fakes.stock.calls(), 0);
    assert!(fakes.backend.image_calls.lock().is_empty());

    let rows = fakes.sink.rows.lock();
    assert_eq!(rows[0].status, "Written");
    assert_eq!(rows[0].resolved_image_url, "https://img.test/1.jpg");
    assert!(rows[0].generated_post.ends_with("#ai #automation #agents"));
}

#[tokio::test]
async fn generation_failure_isolated_to_one_item() {
    let fakes = Fakes::new(FakeBackend::new().fail_post_for("Broken story"));
    let items = vec![
        item("ok", "Good story about AI", "fine"),
        item("bad", "Broken story on chip export rules", "fails"),
    ];
    let p = pipeline(&fakes, feeds(items), &[]);

    let rec = p.run().await.expect("partial failure is not an error");
    assert_eq!(rec.items_written, 1);
    assert_eq!(rec.items_failed, 1);
    assert_eq!(rec.failures[0].source_id, "bad");
    assert_eq!(rec.failures[0].stage, Stage::Generate);
    assert_eq!(fakes.sink.written_ids(), vec!["ok".to_string()]);
    // bounded retry: exactly max_attempts requests for the failing item
    assert_eq!(fakes.backend.prompts_mentioning(TextTask::Post, "Broken story"), 3);
}

#[tokio::test]
async fn failed_append_is_retried_next_run_and_never_duplicated() {
    let fakes = Fakes::new(FakeBackend::new());
    let feed = Arc::new(FakeFeed::new("Test Feed", vec![item("c", "AI agents", "news")]));
    let p = pipeline(&fakes, vec![Box::new(SharedFeed(feed.clone()))], &[]);

    fakes.sink.fail_appends_for("c");
    let first = p.run().await.unwrap();
    assert_eq!(first.items_written, 0);
    assert_eq!(first.items_failed, 1);
    assert_eq!(first.failures[0].stage, Stage::Write);
    assert!(fakes.sink.written_ids().is_empty());
    assert_eq!(*fakes.sink.append_calls.lock(), 3);

    fakes.sink.heal();
    let second = p.run().await.unwrap();
    assert_eq!(second.items_written, 1, "item must be reprocessed, not skipped");

    let third = p.run().await.unwrap();
    assert_eq!(third.items_written, 0);
    assert_eq!(third.items_deduplicated, 1);
    assert_eq!(fakes.sink.written_ids(), vec!["c".to_string()]);
}

#[tokio::test]
async fn duplicate_ids_in_one_batch_written_once() {
    let fakes = Fakes::new(FakeBackend::new());
    let items = vec![
        item("same", "First telling of the AI story", "one"),
        item("same", "Second telling, different words entirely", "two"),
    ];
    let p = pipeline(&fakes, feeds(items), &[]);
    let rec = p.run().await.unwrap();
    assert_eq!(rec.items_written, 1);
    assert_eq!(rec.items_deduplicated, 1);
    let rows = fakes.sink.rows.lock();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].title, "First telling of the AI story");
}

#[tokio::test]
async fn unreachable_ledger_aborts_before_any_item() {
    let fakes = Fakes::new(FakeBackend::new());
    *fakes.sink.unreachable.lock() = true;
    let p = pipeline(&fakes, feeds(vec![item("a", "AI", "x")]), &[]);

    let err = p.run().await.unwrap_err();
    assert!(matches!(err, PipelineError::LedgerUnavailable(_)), "{err}");
    assert!(fakes.backend.calls.lock().is_empty());
    assert_eq!(*fakes.sink.append_calls.lock(), 0);
}

#[tokio::test]
async fn image_exhaustion_follows_policy() {
    // default: fail the item
    let fakes = Fakes::new(FakeBackend::new().without_images());
    let p = pipeline(&fakes, feeds(vec![item("a", "AI chips", "x")]), &[]);
    let rec = p.run().await.unwrap();
    assert_eq!(rec.items_failed, 1);
    assert_eq!(rec.failures[0].stage, Stage::Image);
    assert!(fakes.sink.written_ids().is_empty());

    // write without image
    let fakes = Fakes::new(FakeBackend::new().without_images());
    let mut cfg = pipeline_config();
    cfg.image_policy = ImageFallbackPolicy::WriteWithoutImage;
    let p = Pipeline::new(
        fakes.components(feeds(vec![item("a", "AI chips", "x")])),
        &rss_config(&[]),
        &cfg,
    );
    let rec = p.run().await.unwrap();
    assert_eq!(rec.items_written, 1);
    assert_eq!(fakes.sink.rows.lock()[0].resolved_image_url, "");
}

#[tokio::test]
async fn failing_feed_does_not_block_others() {
    let fakes = Fakes::new(FakeBackend::new());
    let feeds: Vec<Box<dyn FeedReader>> = vec![
        Box::new(FakeFeed::failing("down")),
        Box::new(FakeFeed::new("up", vec![item("a", "AI news", "x")])),
    ];
    let p = pipeline(&fakes, feeds, &[]);
    let rec = p.run().await.unwrap();
    assert_eq!(rec.items_seen, 1);
    assert_eq!(rec.items_written, 1);
}

/// Feed that blocks until released, to hold a run open.
struct GatedFeed {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl FeedReader for GatedFeed {
    async fn fetch_latest(&self) -> anyhow::Result<Vec<NewsItem>> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "gated"
    }
}

#[tokio::test]
async fn second_trigger_during_run_is_rejected() {
    let fakes = Fakes::new(FakeBackend::new());
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let feed = GatedFeed {
        entered: entered.clone(),
        release: release.clone(),
    };
    let p = Arc::new(pipeline(&fakes, vec![Box::new(feed)], &[]));

    let bg = {
        let p = p.clone();
        tokio::spawn(async move { p.run().await })
    };
    entered.notified().await;
    assert!(p.is_running());
    assert!(matches!(p.run().await, Err(PipelineError::AlreadyRunning)));

    release.notify_one();
    let first = bg.await.unwrap().expect("first run completes");
    assert_eq!(first.items_seen, 0);
    assert!(!p.is_running());
}

/// Scoring never answers within the run deadline.
struct StalledBackend;

#[async_trait]
impl GenerationBackend for StalledBackend {
    async fn complete(&self, _task: TextTask, _prompt: &str) -> Result<String, CallError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok("score: 9".into())
    }

    async fn generate_image(&self, _prompt: &str) -> Result<Vec<u8>, CallError> {
        Err(CallError::permanent("unused"))
    }

    fn provider_name(&self) -> &'static str {
        "stalled"
    }
}

#[tokio::test(start_paused = true)]
async fn run_timeout_abandons_in_flight_items() {
    let fakes = Fakes::new(FakeBackend::new());
    let mut components = fakes.components(feeds(vec![
        item("a", "AI one", "x"),
        item("b", "AI two, quite different", "y"),
    ]));
    components.backend = Arc::new(StalledBackend);
    let mut cfg = pipeline_config();
    cfg.run_timeout = Duration::from_secs(5);
    cfg.concurrency = 1;
    let p = Pipeline::new(components, &rss_config(&[]), &cfg);

    let rec = p.run().await.expect("timeout is not a process fault");
    assert!(rec.timed_out);
    assert_eq!(rec.items_written, 0);
    assert_eq!(rec.items_failed, 2);
    assert!(rec.failures.iter().all(|f| f.stage == Stage::Timeout));
    assert!(fakes.sink.written_ids().is_empty());
}

#[tokio::test]
async fn off_topic_items_do_not_fill_the_batch_cap() {
    let fakes = Fakes::new(FakeBackend::new());
    let mut items: Vec<NewsItem> = (0..30)
        .map(|i| item(&format!("sports-{i}"), &format!("Sports roundup {i}"), "Weekend scores"))
        .collect();
    items.push(item("hit", "OpenAI ships agent toolkit", "For developers"));

    let mut rss = rss_config(&["openai"]);
    rss.similarity_threshold = 1.1;
    let p = Pipeline::new(fakes.components(feeds(items)), &rss, &pipeline_config());

    let rec = p.run().await.expect("run ok");
    assert_eq!(rec.items_seen, 31);
    assert_eq!(rec.items_filtered, 30);
    assert_eq!(rec.items_written, 1);
    assert_eq!(fakes.sink.written_ids(), vec!["hit".to_string()]);
    assert_eq!(fakes.backend.calls_for(TextTask::Score), 1);

    let rec = p.run().await.expect("second run ok");
    assert_eq!(rec.items_written, 0);
    assert_eq!(rec.items_deduplicated, 1);
    assert_eq!(fakes.sink.written_ids(), vec!["hit".to_string()]);
}

#[tokio::test]
async fn off_topic_lookalike_title_does_not_shadow_relevant_item() {
    let fakes = Fakes::new(FakeBackend::new());
    let items = vec![
        item("decoy", "Open Al ships agent toolkit", "Garden tools catalogue"),
        item("hit", "OpenAI ships agent toolkit", "For developers"),
    ];
    let p = pipeline(&fakes, feeds(items), &["openai"]);

    let rec = p.run().await.expect("run ok");
    assert_eq!(rec.items_filtered, 1);
    assert_eq!(rec.items_deduplicated, 0);
    assert_eq!(rec.items_written, 1);
    assert_eq!(fakes.sink.written_ids(), vec!["hit".to_string()]);
}
