// src/history.rs
//! In-memory ring of recent run records for the status endpoint.

use std::sync::Mutex;

use crate::model::RunRecord;

#[derive(Debug)]
pub struct RunHistory {
    inner: Mutex<Vec<RunRecord>>,
    cap: usize,
}

impl RunHistory {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.clamp(1, 1_000);
        Self {
            inner: Mutex::new(Vec::with_capacity(cap)),
            cap,
        }
    }

    pub fn push(&self, record: RunRecord) {
        let Ok(mut v) = self.inner.lock() else {
            tracing::warn!("run history lock poisoned; record dropped");
            return;
        };
        v.push(record);
        if v.len() > self.cap {
            let excess = v.len() - self.cap;
            v.drain(0..excess);
        }
    }

    /// Newest last.
    pub fn snapshot_last_n(&self, n: usize) -> Vec<RunRecord> {
        match self.inner.lock() {
            Ok(v) => {
                let start = v.len().saturating_sub(n);
                v[start..].to_vec()
            }
            Err(_) => Vec::new(),
        }
    }

    pub fn last(&self) -> Option<RunRecord> {
        self.snapshot_last_n(1).pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn keeps_only_the_newest() {
        let h = RunHistory::with_capacity(2);
        for i in 0..3 {
            let mut r = RunRecord::start(Utc.timestamp_opt(1_700_000_000 + i, 0).unwrap());
            r.items_seen = i as usize;
            h.push(r);
        }
        let snap = h.snapshot_last_n(10);
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].items_seen, 1);
        assert_eq!(h.last().map(|r| r.items_seen), Some(2));
    }
}
