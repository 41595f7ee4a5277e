// src/ai/cache.rs
//! On-disk relevance score cache keyed by `source_id`.
//!
//! Lets an item that failed later in a run (and so never reached the sheet)
//! skip the scoring call when it comes back on the next run.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedScore {
    pub score: u8,
    #[serde(default)]
    pub notes: Option<String>,
}

pub struct ScoreCache {
    path: PathBuf,
    entries: Mutex<HashMap<String, CachedScore>>,
}

impl ScoreCache {
    /// Open (or start) `dir/relevance_cache.json`. A corrupt file starts an empty cache.
    pub fn open(dir: &Path) -> Self {
        if let Err(e) = fs::create_dir_all(dir) {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot create score cache dir; scores will not persist");
        }
        let path = dir.join("relevance_cache.json");
        let entries = match fs::read_to_string(&path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "corrupt score cache; starting fresh");
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn get(&self, source_id: &str) -> Option<CachedScore> {
        self.entries
            .lock()
            .ok()
            .and_then(|g| g.get(source_id).cloned())
    }

    /// Insert and persist. Persistence errors are logged, never surfaced.
    pub fn put(&self, source_id: &str, value: CachedScore) {
        let snapshot = match self.entries.lock() {
            Ok(mut g) => {
                g.insert(source_id.to_string(), value);
                serde_json::to_string_pretty(&*g).unwrap_or_else(|_| "{}".to_string())
            }
            Err(_) => return,
        };
        if let Err(e) = write_atomic(&self.path, &snapshot) {
            tracing::warn!(path = %self.path.display(), error = %e, "score cache write failed");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    let mut f = fs::File::create(&tmp)?;
    f.write_all(content.as_bytes())?;
    fs::rename(tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let c = ScoreCache::open(dir.path());
        assert!(c.is_empty());
        c.put(
            "https://x.test/a",
            CachedScore {
                score: 8,
                notes: Some("score: 8".into()),
            },
        );

        let again = ScoreCache::open(dir.path());
        assert_eq!(again.get("https://x.test/a").map(|s| s.score), Some(8));
        assert!(again.get("https://x.test/b").is_none());
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("relevance_cache.json"), "{not json").unwrap();
        let c = ScoreCache::open(dir.path());
        assert!(c.is_empty());
    }

    #[test]
    fn uncreatable_dir_keeps_scores_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "file").unwrap();

        let c = ScoreCache::open(&blocker.join("cache"));
        c.put("a", CachedScore { score: 9, notes: None });
        assert_eq!(c.get("a").map(|s| s.score), Some(9));
        assert!(!blocker.join("cache").exists());
    }
}
