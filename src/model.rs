// src/model.rs
//! Data carried through one pipeline run: the candidate item, its status
//! progression, the generated post, image candidates and the run record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-item status. Declaration order is the forward order; an item never
/// moves back to an earlier variant within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ItemStatus {
    New,
    DeduplicatedOut,
    FilteredOut,
    Scored,
    PostGenerated,
    ImageResolved,
    Written,
    Failed,
}

impl ItemStatus {
    /// Terminal states end the item's progress for this run.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ItemStatus::DeduplicatedOut
                | ItemStatus::FilteredOut
                | ItemStatus::Written
                | ItemStatus::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::New => "New",
            ItemStatus::DeduplicatedOut => "Deduplicated-Out",
            ItemStatus::FilteredOut => "Filtered-Out",
            ItemStatus::Scored => "Scored",
            ItemStatus::PostGenerated => "PostGenerated",
            ItemStatus::ImageResolved => "ImageResolved",
            ItemStatus::Written => "Written",
            ItemStatus::Failed => "Failed",
        }
    }
}

/// One candidate article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub source_id: String,
    pub title: String,
    pub summary: String,
    pub link: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub source_name: String,
    pub embedded_image_url: Option<String>,

    pub relevance_score: Option<u8>,
    pub generated_post: Option<GeneratedPost>,
    pub resolved_image_url: Option<String>,
    pub image_origin: Option<ImageOrigin>,
    status: ItemStatus,
}

impl NewsItem {
    pub fn new(
        source_id: impl Into<String>,
        title: impl Into<String>,
        summary: impl Into<String>,
        source_name: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            title: title.into(),
            summary: summary.into(),
            link: None,
            published_at: None,
            source_name: source_name.into(),
            embedded_image_url: None,
            relevance_score: None,
            generated_post: None,
            resolved_image_url: None,
            image_origin: None,
            status: ItemStatus::New,
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_published_at(mut self, ts: DateTime<Utc>) -> Self {
        self.published_at = Some(ts);
        self
    }

    pub fn with_embedded_image(mut self, url: impl Into<String>) -> Self {
        self.embedded_image_url = Some(url.into());
        self
    }

    pub fn status(&self) -> ItemStatus {
        self.status
    }

    /// Move forward to `next`. Returns `false` (and leaves the status alone)
    /// for a backward move or any move out of a terminal state.
    pub fn advance(&mut self, next: ItemStatus) -> bool {
        if self.status.is_terminal() || next < self.status {
            tracing::warn!(
                source_id = %self.source_id,
                from = self.status.as_str(),
                to = next.as_str(),
                "rejected status regression"
            );
            return false;
        }
        self.status = next;
        true
    }

    /// `title + " " + summary`, the haystack for keyword matching.
    pub fn text(&self) -> String {
        format!("{} {}", self.title, self.summary)
    }
}

/// A finished post as returned by the generation backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedPost {
    pub title: String,
    pub summary: String,
    pub body: String,
    pub hashtags: Vec<String>,
}

impl GeneratedPost {
    /// Body followed by the hashtag line; this is what lands in the sheet.
    pub fn formatted(&self) -> String {
        let tags = self
            .hashtags
            .iter()
            .map(|t| format!("#{}", t.trim_start_matches('#')))
            .collect::<Vec<_>>()
            .join(" ");
        format!("{}\n\n{}", self.body.trim(), tags)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageOrigin {
    Embedded,
    Stock,
    Generated,
}

impl ImageOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageOrigin::Embedded => "embedded",
            ImageOrigin::Stock => "stock",
            ImageOrigin::Generated => "generated",
        }
    }
}

/// Image bytes produced by one fallback stage, before upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCandidate {
    pub bytes: Vec<u8>,
    pub origin: ImageOrigin,
    pub prompt: Option<String>,
}

/// The pipeline stage an item failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Score,
    Generate,
    Image,
    Write,
    Timeout,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Score => "score",
            Stage::Generate => "generate",
            Stage::Image => "image",
            Stage::Write => "write",
            Stage::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub source_id: String,
    pub stage: Stage,
    pub reason: String,
}

/// Statistics for one scheduled or manual invocation. Owned by the
/// orchestrator for the duration of the run; only logged afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub items_seen: usize,
    pub items_deduplicated: usize,
    pub items_filtered: usize,
    pub items_written: usize,
    pub items_failed: usize,
    pub timed_out: bool,
    pub failures: Vec<ItemFailure>,
}

impl RunRecord {
    pub fn start(now: DateTime<Utc>) -> Self {
        Self {
            started_at: now,
            finished_at: None,
            items_seen: 0,
            items_deduplicated: 0,
            items_filtered: 0,
            items_written: 0,
            items_failed: 0,
            timed_out: false,
            failures: Vec::new(),
        }
    }

    pub fn record_failure(&mut self, source_id: &str, stage: Stage, reason: impl Into<String>) {
        self.items_failed += 1;
        self.failures.push(ItemFailure {
            source_id: source_id.to_string(),
            stage,
            reason: reason.into(),
        });
    }

    pub fn finish(&mut self, now: DateTime<Utc>) {
        self.finished_at = Some(now);
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|f| (f - self.started_at).num_milliseconds())
    }

    /// One-line operator summary.
    pub fn summary_line(&self) -> String {
        format!(
            "seen={} deduplicated={} filtered={} written={} failed={}{}",
            self.items_seen,
            self.items_deduplicated,
            self.items_filtered,
            self.items_written,
            self.items_failed,
            if self.timed_out { " (timed out)" } else { "" }
        )
    }
}

/// Fixed column order of the review sheet.
pub const SHEET_HEADER: [&str; 8] = [
    "source_id",
    "title",
    "source_name",
    "published_at",
    "generated_post",
    "resolved_image_url",
    "status",
    "written_at",
];

/// One row as appended to the sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetRow {
    pub source_id: String,
    pub title: String,
    pub source_name: String,
    pub published_at: String,
    pub generated_post: String,
    pub resolved_image_url: String,
    pub status: String,
    pub written_at: String,
}

impl SheetRow {
    /// Build the row for a completed item. Status is always `Written`.
    pub fn written(item: &NewsItem, written_at: DateTime<Utc>) -> Self {
        Self {
            source_id: item.source_id.clone(),
            title: item.title.clone(),
            source_name: item.source_name.clone(),
            published_at: item
                .published_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            generated_post: item
                .generated_post
                .as_ref()
                .map(GeneratedPost::formatted)
                .unwrap_or_default(),
            resolved_image_url: item.resolved_image_url.clone().unwrap_or_default(),
            status: ItemStatus::Written.as_str().to_string(),
            written_at: written_at.to_rfc3339(),
        }
    }

    pub fn to_cells(&self) -> Vec<String> {
        vec![
            self.source_id.clone(),
            self.title.clone(),
            self.source_name.clone(),
            self.published_at.clone(),
            self.generated_post.clone(),
            self.resolved_image_url.clone(),
            self.status.clone(),
            self.written_at.clone(),
        ]
    }
}
