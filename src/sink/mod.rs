// src/sink/mod.rs
//! Review sheet writer. The sheet doubles as the idempotency ledger: an id
//! with a `Written` row is never processed again.

pub mod sheets;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::CallError;
use crate::model::{ItemStatus, SheetRow, SHEET_HEADER};

pub use sheets::GoogleSheetsSink;

/// Column index of `status` in [`SHEET_HEADER`].
pub const STATUS_COLUMN: usize = 6;

#[async_trait]
pub trait LedgerSink: Send + Sync {
    /// Write the header row if the sheet is empty.
    async fn ensure_header(&self) -> Result<(), CallError>;
    /// Every `source_id` that already has a `Written` row.
    async fn read_known_ids(&self) -> Result<HashSet<String>, CallError>;
    /// Append one row. Only called for items that completed every stage.
    async fn append_row(&self, row: &SheetRow) -> Result<(), CallError>;
}

/// Collect written ids from raw sheet rows (header and blank rows skipped).
pub fn known_ids_from_rows(rows: &[Vec<String>]) -> HashSet<String> {
    let written = ItemStatus::Written.as_str();
    rows.iter()
        .filter_map(|row| {
            let id = row.first()?.trim();
            if id.is_empty() || id == SHEET_HEADER[0] {
                return None;
            }
            let status = row.get(STATUS_COLUMN).map(|s| s.trim()).unwrap_or_default();
            status.eq_ignore_ascii_case(written).then(|| id.to_string())
        })
        .collect()
}
