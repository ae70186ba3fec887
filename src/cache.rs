//! Extraction cache: one JSON text artifact per distinct [`FileIdentity`].
//!
//! OCR and document conversion dominate the pipeline's runtime, so extraction
//! results are persisted between runs. The cache only ever holds derived
//! data — clearing it discards an optimization, never ground truth.

use crate::models::{ExtractionResult, FileIdentity};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct ExtractionCache {
    dir: PathBuf,
}

impl ExtractionCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, identity: &FileIdentity) -> PathBuf {
        self.dir.join(format!("{}.json", identity.cache_key()))
    }

    /// Look up a previously extracted result. A missing, unreadable, or
    /// corrupt entry is a miss, never an error — the caller re-extracts.
    pub fn get(&self, identity: &FileIdentity) -> Option<ExtractionResult> {
        let path = self.entry_path(identity);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return None,
        };
        match serde_json::from_str(&content) {
            Ok(result) => Some(result),
            Err(e) => {
                debug!(entry = %path.display(), error = %e, "discarding corrupt cache entry");
                None
            }
        }
    }

    /// Persist an extraction result. Written to a temp file then renamed, so
    /// a crash never leaves a half-written entry; concurrent writers for the
    /// same identity produce identical content and the race is benign.
    pub fn put(&self, identity: &FileIdentity, result: &ExtractionResult) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache dir: {}", self.dir.display()))?;
        let path = self.entry_path(identity);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(result)?;
        fs::write(&tmp, json)
            .with_context(|| format!("Failed to write cache entry: {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to commit cache entry: {}", path.display()))?;
        Ok(())
    }

    /// Remove the whole cache directory. Safe at any time.
    pub fn clear(&self) -> Result<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)
                .with_context(|| format!("Failed to remove cache dir: {}", self.dir.display()))?;
        }
        Ok(())
    }

    /// (entry count, total bytes) for `cache stats`.
    pub fn stats(&self) -> Result<(u64, u64)> {
        let mut entries = 0u64;
        let mut bytes = 0u64;
        if !self.dir.exists() {
            return Ok((0, 0));
        }
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.path().extension().map(|e| e == "json").unwrap_or(false) {
                entries += 1;
                bytes += entry.metadata()?.len();
            }
        }
        Ok((entries, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FormatKind;
    use std::collections::BTreeMap;

    fn identity(name: &str) -> FileIdentity {
        FileIdentity {
            path: PathBuf::from(name),
            size: 100,
            mtime_unix: 1_600_000_000,
        }
    }

    fn result() -> ExtractionResult {
        ExtractionResult {
            kind: FormatKind::PlainText,
            lines: vec!["Budget 2019".to_string(), "second line".to_string()],
            metadata: BTreeMap::from([("Author".to_string(), "alice".to_string())]),
            text_ok: true,
            metadata_ok: true,
            error: None,
        }
    }

    #[test]
    fn roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ExtractionCache::new(dir.path().join("cache"));
        let id = identity("f1.txt");

        assert!(cache.get(&id).is_none());
        cache.put(&id, &result()).unwrap();
        assert_eq!(cache.get(&id), Some(result()));
    }

    #[test]
    fn corrupt_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ExtractionCache::new(dir.path().join("cache"));
        let id = identity("f1.txt");

        cache.put(&id, &result()).unwrap();
        let entry = cache.dir().join(format!("{}.json", id.cache_key()));
        fs::write(&entry, "{ not json").unwrap();
        assert!(cache.get(&id).is_none());
    }

    #[test]
    fn clear_then_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ExtractionCache::new(dir.path().join("cache"));
        let id = identity("f1.txt");

        cache.put(&id, &result()).unwrap();
        cache.clear().unwrap();
        assert!(cache.get(&id).is_none());
        // Clearing an already-cleared cache is fine.
        cache.clear().unwrap();
    }

    #[test]
    fn stats_counts_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ExtractionCache::new(dir.path().join("cache"));
        assert_eq!(cache.stats().unwrap(), (0, 0));

        cache.put(&identity("a"), &result()).unwrap();
        cache.put(&identity("b"), &result()).unwrap();
        let (entries, bytes) = cache.stats().unwrap();
        assert_eq!(entries, 2);
        assert!(bytes > 0);
    }
}
