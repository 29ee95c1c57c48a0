//! Durable set of fingerprints already posted (or handled in dry-run).
//! Loads tolerantly, flushes atomically: a torn write must never be
//! observable, so we write to a temp file and rename over the target.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DEFAULT_STORE_PATH: &str = "data/news_processed.json";

#[derive(Debug)]
pub struct ArticleStore {
    path: PathBuf,
    set: BTreeSet<String>,
}

impl ArticleStore {
    /// Load from `path`. A missing, corrupted, or unreadable file is a
    /// warning and an empty store: re-posting risk, not a crash.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let set = match fs::read_to_string(&path) {
            Ok(s) => match serde_json::from_str::<BTreeSet<String>>(&s) {
                Ok(set) => set,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e,
                        "processed store corrupted, starting fresh");
                    BTreeSet::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeSet::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e,
                    "processed store unreadable, starting fresh");
                BTreeSet::new()
            }
        };
        Self { path, set }
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.set.contains(fingerprint)
    }

    /// Idempotent.
    pub fn add(&mut self, fingerprint: impl Into<String>) {
        self.set.insert(fingerprint.into());
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Persist the current state. Safe to call repeatedly; replaces the
    /// prior file atomically via temp-write-then-rename. Fingerprints are
    /// sorted on disk (BTreeSet ordering) for stable diffs.
    pub fn flush(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("creating store dir {}", dir.display()))?;
            }
        }
        let json = serde_json::to_string(&self.set).context("serializing processed store")?;
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut f = fs::File::create(&tmp)
                .with_context(|| format!("creating {}", tmp.display()))?;
            f.write_all(json.as_bytes()).context("writing store tmp")?;
            f.sync_all().context("syncing store tmp")?;
        }
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent_and_contains_works() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArticleStore::load(dir.path().join("p.json"));
        store.add("abc");
        store.add("abc");
        assert_eq!(store.len(), 1);
        assert!(store.contains("abc"));
        assert!(!store.contains("def"));
    }

    #[test]
    fn flush_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        let mut store = ArticleStore::load(&path);
        store.add("b");
        store.add("a");
        store.flush().unwrap();

        let reloaded = ArticleStore::load(&path);
        assert!(reloaded.contains("a") && reloaded.contains("b"));
        assert_eq!(reloaded.len(), 2);

        // sorted on disk
        let raw = fs::read_to_string(&path).unwrap();
        assert_eq!(raw, r#"["a","b"]"#);
    }

    #[test]
    fn corrupted_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        fs::write(&path, "{not json").unwrap();
        let store = ArticleStore::load(&path);
        assert!(store.is_empty());
    }

    #[test]
    fn interrupted_flush_leaves_last_good_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        let mut store = ArticleStore::load(&path);
        store.add("committed");
        store.flush().unwrap();

        // Simulate a crash mid-flush: a temp file exists, target untouched.
        fs::write(path.with_extension("json.tmp"), "[\"torn").unwrap();

        let reloaded = ArticleStore::load(&path);
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.contains("committed"));
    }

    #[test]
    fn repeated_flush_is_safe() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArticleStore::load(dir.path().join("p.json"));
        store.add("x");
        store.flush().unwrap();
        store.flush().unwrap();
        assert_eq!(ArticleStore::load(store.path()).len(), 1);
    }
}
