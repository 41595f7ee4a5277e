// src/relevance.rs
//! Two-stage relevance filter, order fixed:
//! 1. keyword gate (local, never calls out),
//! 2. score gate (generation backend, 1..=10, threshold inclusive).

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::ai::cache::{CachedScore, ScoreCache};
use crate::ai::{GenerationBackend, TextTask};
use crate::error::CallError;
use crate::model::{ItemStatus, NewsItem};
use crate::retry::RetryPolicy;

pub const SCORE_MIN: u8 = 1;
pub const SCORE_MAX: u8 = 10;

/// Case-insensitive substring match over `title + summary`.
#[derive(Debug, Clone, Default)]
pub struct KeywordGate {
    keywords: Vec<String>,
}

impl KeywordGate {
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Self {
        Self {
            keywords: keywords
                .iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// An empty keyword list lets everything through.
    pub fn passes(&self, item: &NewsItem) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        let haystack = item.text().to_lowercase();
        self.keywords.iter().any(|k| haystack.contains(k.as_str()))
    }

    /// Split into (passed, rejected). Rejected items are marked `FilteredOut`.
    pub fn partition(&self, items: Vec<NewsItem>) -> (Vec<NewsItem>, Vec<NewsItem>) {
        let mut pass = Vec::with_capacity(items.len());
        let mut reject = Vec::new();
        for mut it in items {
            if self.passes(&it) {
                pass.push(it);
            } else {
                it.advance(ItemStatus::FilteredOut);
                reject.push(it);
            }
        }
        (pass, reject)
    }

    /// Keywords that occur in the item (for prompts).
    pub fn matched<'a>(&'a self, item: &NewsItem) -> Vec<&'a str> {
        let haystack = item.text().to_lowercase();
        self.keywords
            .iter()
            .filter(|k| haystack.contains(k.as_str()))
            .map(String::as_str)
            .collect()
    }
}

static SCORE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{1,2})").expect("score regex"));

/// First 1–2 digit integer in the reply, clamped to 1..=10.
pub fn parse_score(text: &str) -> Option<u8> {
    let caps = SCORE_RE.captures(text)?;
    let n: u8 = caps.get(1)?.as_str().parse().ok()?;
    Some(n.clamp(SCORE_MIN, SCORE_MAX))
}

pub fn build_score_prompt(item: &NewsItem) -> String {
    format!(
        "Rate from 1 to 10 how much this news gives AI practitioners and business owners \
         something practical to apply, argue about, or learn from.\n\
         Reply in the format 'score: <number> - <short comment>'.\n\n\
         Title: {}\nDescription: {}\nSource: {}\nLink: {}",
        item.title,
        item.summary,
        item.source_name,
        item.link.as_deref().unwrap_or("-"),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreVerdict {
    Pass(u8),
    Below(u8),
}

pub struct RelevanceScorer {
    backend: Arc<dyn GenerationBackend>,
    retry: RetryPolicy,
    threshold: u8,
    cache: Option<ScoreCache>,
}

impl RelevanceScorer {
    pub fn new(backend: Arc<dyn GenerationBackend>, retry: RetryPolicy, threshold: u8) -> Self {
        Self {
            backend,
            retry,
            threshold: threshold.clamp(SCORE_MIN, SCORE_MAX),
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: ScoreCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Score one item and apply the threshold. Sets `relevance_score` and moves the
    /// item to `Scored` or `FilteredOut`. Errors leave the status untouched.
    pub async fn score(&self, item: &mut NewsItem) -> Result<ScoreVerdict, CallError> {
        let score = match self.cache.as_ref().and_then(|c| c.get(&item.source_id)) {
            Some(hit) => {
                debug!(target: "relevance", source_id = %item.source_id, score = hit.score, "score cache hit");
                hit.score
            }
            None => {
                let prompt = build_score_prompt(item);
                let reply = self
                    .retry
                    .run("score", || self.backend.complete(TextTask::Score, &prompt))
                    .await?;
                let score = parse_score(&reply).ok_or_else(|| {
                    CallError::permanent(format!("score: no number in reply '{}'", truncate(&reply, 80)))
                })?;
                if let Some(c) = &self.cache {
                    c.put(
                        &item.source_id,
                        CachedScore {
                            score,
                            notes: Some(truncate(&reply, 300)),
                        },
                    );
                }
                score
            }
        };

        item.relevance_score = Some(score);
        let verdict = if score >= self.threshold {
            item.advance(ItemStatus::Scored);
            ScoreVerdict::Pass(score)
        } else {
            item.advance(ItemStatus::FilteredOut);
            ScoreVerdict::Below(score)
        };
        debug!(
            target: "relevance",
            source_id = %item.source_id,
            score,
            threshold = self.threshold,
            verdict = ?verdict,
            "scored"
        );
        Ok(verdict)
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
