//! Operation log: the durable, append-only record of every planned and
//! executed copy.
//!
//! One JSON record per line. Appends are fsynced before the copy is
//! acknowledged, so the ledger survives a crash mid-batch; a torn trailing
//! line (the crash artifact) is tolerated on read, anything else is
//! corruption and fails loudly. Rollback replays `Copied` records in
//! reverse and only ever *reads* the log — it remains a faithful history.

use anyhow::{bail, Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

use crate::models::{Outcome, PlacementRecord};

pub struct OperationLog {
    path: PathBuf,
}

/// What a rollback pass actually did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RollbackStats {
    pub removed: u64,
    /// Destinations already missing — a prior rollback or manual cleanup.
    pub already_gone: u64,
}

impl OperationLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append one record and fsync. A failure here aborts the whole run:
    /// the ledger is the durability guarantee and must not lose records.
    pub fn append(&self, record: &PlacementRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log dir: {}", parent.display()))?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open log: {}", self.path.display()))?;
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        file.write_all(line.as_bytes())
            .with_context(|| format!("Failed to append to log: {}", self.path.display()))?;
        file.sync_all()
            .with_context(|| format!("Failed to sync log: {}", self.path.display()))?;
        Ok(())
    }

    /// All records, oldest first. A missing log is an empty history.
    pub fn read_all(&self) -> Result<Vec<PlacementRecord>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read log: {}", self.path.display()))
            }
        };
        let lines: Vec<&str> = content.lines().collect();
        let mut records = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<PlacementRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) if i == lines.len() - 1 => {
                    // Torn final line: the crash the WAL exists to survive.
                    warn!(log = %self.path.display(), "ignoring torn trailing log line");
                    let _ = e;
                }
                Err(e) => bail!(
                    "Corrupt log {} at line {}: {}",
                    self.path.display(),
                    i + 1,
                    e
                ),
            }
        }
        Ok(records)
    }

    /// Destinations of every successful copy ever logged, for collision
    /// seeding.
    pub fn copied_destinations(&self) -> Result<Vec<PathBuf>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|r| r.outcome == Outcome::Copied)
            .map(|r| r.destination)
            .collect())
    }

    /// Remove every `Copied` destination among `records`, newest first.
    /// Idempotent: a missing destination counts as already rolled back.
    pub fn rollback(records: &[PlacementRecord]) -> Result<RollbackStats> {
        let mut stats = RollbackStats::default();
        for record in records.iter().rev() {
            if record.outcome != Outcome::Copied {
                continue;
            }
            match std::fs::remove_file(&record.destination) {
                Ok(()) => stats.removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => stats.already_gone += 1,
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to remove {}", record.destination.display())
                    })
                }
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::Path;

    fn record(seq: u64, destination: &Path, outcome: Outcome) -> PlacementRecord {
        PlacementRecord {
            run_id: "test-run".to_string(),
            seq,
            source: PathBuf::from("/carved/f001.pdf"),
            destination: destination.to_path_buf(),
            cache_key: "abc".to_string(),
            year: Some(2019),
            month: Some(3),
            title: Some("report".to_string()),
            outcome,
            error: None,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn append_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let log = OperationLog::new(dir.path().join("log.jsonl"));

        log.append(&record(0, Path::new("/out/a.pdf"), Outcome::Copied)).unwrap();
        log.append(&record(1, Path::new("/out/b.pdf"), Outcome::SkippedDryRun)).unwrap();

        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].seq, 0);
        assert_eq!(records[1].outcome, Outcome::SkippedDryRun);
    }

    #[test]
    fn missing_log_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let log = OperationLog::new(dir.path().join("absent.jsonl"));
        assert!(log.read_all().unwrap().is_empty());
        assert!(log.copied_destinations().unwrap().is_empty());
    }

    #[test]
    fn torn_trailing_line_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let log = OperationLog::new(&path);
        log.append(&record(0, Path::new("/out/a.pdf"), Outcome::Copied)).unwrap();

        // Simulate a crash mid-append.
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"run_id\": \"trunc").unwrap();
        drop(file);

        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn corruption_elsewhere_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let log = OperationLog::new(&path);
        std::fs::write(&path, "garbage line\n").unwrap();
        log.append(&record(0, Path::new("/out/a.pdf"), Outcome::Copied)).unwrap();

        assert!(log.read_all().is_err());
    }

    #[test]
    fn copied_destinations_filters_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let log = OperationLog::new(dir.path().join("log.jsonl"));
        log.append(&record(0, Path::new("/out/a.pdf"), Outcome::Copied)).unwrap();
        log.append(&record(1, Path::new("/out/b.pdf"), Outcome::Failed)).unwrap();
        log.append(&record(2, Path::new("/out/c.pdf"), Outcome::SkippedDryRun)).unwrap();

        assert_eq!(
            log.copied_destinations().unwrap(),
            vec![PathBuf::from("/out/a.pdf")]
        );
    }

    #[test]
    fn rollback_removes_copies_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.pdf");
        let b = dir.path().join("b.pdf");
        std::fs::write(&a, b"x").unwrap();
        std::fs::write(&b, b"y").unwrap();

        let records = vec![
            record(0, &a, Outcome::Copied),
            record(1, &b, Outcome::Copied),
            record(2, &dir.path().join("c.pdf"), Outcome::Failed),
        ];

        let stats = OperationLog::rollback(&records).unwrap();
        assert_eq!(stats, RollbackStats { removed: 2, already_gone: 0 });
        assert!(!a.exists());
        assert!(!b.exists());

        let again = OperationLog::rollback(&records).unwrap();
        assert_eq!(again, RollbackStats { removed: 0, already_gone: 2 });
    }
}
