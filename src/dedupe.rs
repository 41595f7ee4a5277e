// src/dedupe.rs
//! Batch deduplication against the idempotency ledger and within the batch.

use std::collections::HashSet;

use crate::model::{ItemStatus, NewsItem};

/// Counts of what each dedup rule removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupeReport {
    pub known: usize,
    pub in_batch: usize,
    pub similar: usize,
    pub capped: usize,
}

impl DedupeReport {
    pub fn total(&self) -> usize {
        self.known + self.in_batch + self.similar + self.capped
    }
}

/// Drop items whose `source_id` is in `known_ids` or already appeared earlier
/// in `candidates`. First occurrence wins; order is preserved. Pure.
pub fn dedupe(candidates: Vec<NewsItem>, known_ids: &HashSet<String>) -> Vec<NewsItem> {
    dedupe_with_report(candidates, known_ids).0
}

pub fn dedupe_with_report(
    candidates: Vec<NewsItem>,
    known_ids: &HashSet<String>,
) -> (Vec<NewsItem>, DedupeReport) {
    let mut report = DedupeReport::default();
    let mut seen: HashSet<String> = HashSet::with_capacity(candidates.len());
    let mut keep = Vec::with_capacity(candidates.len());
    for mut item in candidates {
        if known_ids.contains(&item.source_id) {
            report.known += 1;
            item.advance(ItemStatus::DeduplicatedOut);
            continue;
        }
        if !seen.insert(item.source_id.clone()) {
            report.in_batch += 1;
            item.advance(ItemStatus::DeduplicatedOut);
            continue;
        }
        keep.push(item);
    }
    (keep, report)
}

/// Within-batch near-duplicate titles: an item is dropped when its title is at
/// least `threshold` similar to an earlier kept title. Threshold above 1.0 disables.
pub fn drop_similar_titles(items: Vec<NewsItem>, threshold: f64) -> (Vec<NewsItem>, usize) {
    if threshold > 1.0 {
        return (items, 0);
    }
    let mut kept_titles: Vec<String> = Vec::new();
    let mut keep = Vec::with_capacity(items.len());
    let mut dropped = 0usize;
    for item in items {
        let title = item.title.to_lowercase();
        if !title.is_empty()
            && kept_titles
                .iter()
                .any(|t| strsim::normalized_levenshtein(t, &title) >= threshold)
        {
            dropped += 1;
            continue;
        }
        kept_titles.push(title);
        keep.push(item);
    }
    (keep, dropped)
}

/// Narrow a batch that already passed the ledger dedup and the keyword gate:
/// title similarity, then the batch cap.
pub fn narrow_batch(
    items: Vec<NewsItem>,
    report: &mut DedupeReport,
    similarity_threshold: f64,
    max_items: usize,
) -> Vec<NewsItem> {
    let (mut distinct, similar) = drop_similar_titles(items, similarity_threshold);
    report.similar += similar;
    if distinct.len() > max_items {
        report.capped += distinct.len() - max_items;
        distinct.truncate(max_items);
    }
    distinct
}
