// src/ingest/types.rs
use anyhow::Result;

use crate::model::NewsItem;

/// One configured feed. `fetch_latest` is finite per call and restartable on
/// the next trigger; items come back with status `New`.
#[async_trait::async_trait]
pub trait FeedReader: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<NewsItem>>;
    fn name(&self) -> &str;
}
