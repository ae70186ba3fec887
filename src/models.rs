//! Core data models used throughout reclaim.
//!
//! These types represent the extracted material, inferred candidates, and
//! placement records that flow through the recovery pipeline.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Stable identity for an input file, used as the cache and ledger key.
///
/// Derived from the file *name* (not the full path — carving tools produce a
/// fresh `recup_dir.N` parent on every pass) plus size and modification time.
/// Two files with the same identity are interchangeable for caching purposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIdentity {
    pub path: PathBuf,
    pub size: u64,
    pub mtime_unix: i64,
}

impl FileIdentity {
    pub fn of(path: &Path) -> anyhow::Result<Self> {
        let meta = std::fs::metadata(path)?;
        if !meta.is_file() {
            anyhow::bail!("not a regular file: {}", path.display());
        }
        let mtime_unix = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Ok(Self {
            path: path.to_path_buf(),
            size: meta.len(),
            mtime_unix,
        })
    }

    /// Deterministic cache key: sha256 over (file name, size, mtime).
    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        hasher.update(name.as_bytes());
        hasher.update(self.size.to_le_bytes());
        hasher.update(self.mtime_unix.to_le_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Filesystem modification time, the date inference of last resort.
    pub fn mtime(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.mtime_unix, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    /// Original filename stem (without extension).
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// File format detected by content sniffing (never by extension — carved
/// files frequently have wrong or missing extensions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    Pdf,
    /// docx / pptx / xlsx (ZIP container with `[Content_Types].xml`).
    OfficeOpenXml,
    /// Legacy binary office formats (OLE2 container: doc, xls, ppt).
    OfficeLegacy,
    /// odt / ods / odp (ZIP container with an `application/vnd.oasis` mimetype).
    OpenDocument,
    Rtf,
    Html,
    PlainText,
    Mbox,
    Zip,
    Tar,
    Image,
    Unknown,
}

impl FormatKind {
    /// Extension used for the destination filename when the source has none.
    pub fn default_extension(self) -> Option<&'static str> {
        match self {
            FormatKind::Pdf => Some("pdf"),
            FormatKind::OfficeOpenXml => Some("docx"),
            FormatKind::OfficeLegacy => Some("doc"),
            FormatKind::OpenDocument => Some("odt"),
            FormatKind::Rtf => Some("rtf"),
            FormatKind::Html => Some("html"),
            FormatKind::PlainText | FormatKind::Mbox => Some("txt"),
            FormatKind::Zip => Some("zip"),
            FormatKind::Tar => Some("tar"),
            FormatKind::Image => Some("png"),
            FormatKind::Unknown => None,
        }
    }

    pub fn is_text_like(self) -> bool {
        matches!(self, FormatKind::PlainText | FormatKind::Mbox)
    }
}

impl std::fmt::Display for FormatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FormatKind::Pdf => "pdf",
            FormatKind::OfficeOpenXml => "office-openxml",
            FormatKind::OfficeLegacy => "office-legacy",
            FormatKind::OpenDocument => "opendocument",
            FormatKind::Rtf => "rtf",
            FormatKind::Html => "html",
            FormatKind::PlainText => "text",
            FormatKind::Mbox => "mbox",
            FormatKind::Zip => "zip",
            FormatKind::Tar => "tar",
            FormatKind::Image => "image",
            FormatKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Everything extraction produced for one file. Immutable once created and
/// persisted in the extraction cache keyed by [`FileIdentity`].
///
/// Text and metadata are extracted independently: either side may fail
/// without discarding the other.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractionResult {
    pub kind: FormatKind,
    pub lines: Vec<String>,
    pub metadata: BTreeMap<String, String>,
    pub text_ok: bool,
    pub metadata_ok: bool,
    pub error: Option<String>,
}

impl ExtractionResult {
    /// A fully failed extraction: empty text and metadata, never an error
    /// raised to the caller. Downstream stages degrade to fallback naming.
    pub fn failed(kind: FormatKind, error: impl Into<String>) -> Self {
        Self {
            kind,
            lines: Vec::new(),
            metadata: BTreeMap::new(),
            text_ok: false,
            metadata_ok: false,
            error: Some(error.into()),
        }
    }

}

/// Where a date candidate came from, in descending trust order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateSource {
    Metadata,
    Text,
    Filesystem,
}

/// A tentatively inferred calendar date. Year is always present; month and
/// day may be missing (a bare "2018" in a heading still buckets the file).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateCandidate {
    pub year: i32,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub source: DateSource,
    pub score: u32,
    /// Zero-based line index the candidate was found on (0 for non-text sources).
    pub line: usize,
}

impl DateCandidate {
    /// Number of populated calendar fields, for tie-breaking.
    pub fn completeness(&self) -> u32 {
        1 + self.month.is_some() as u32 + self.day.is_some() as u32
    }
}

/// A tentatively inferred title with its heuristic score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleCandidate {
    pub text: String,
    pub score: u32,
}

/// Outcome of one placement attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Copied,
    SkippedDryRun,
    Failed,
}

/// One line of the operation log: a planned or executed copy.
///
/// Append-only; the sequence of all records across all runs is the ledger.
/// Among `Copied` records of a given output root, `destination` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementRecord {
    pub run_id: String,
    pub seq: u64,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub cache_key: String,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub title: Option<String>,
    pub outcome: Outcome,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Aggregated result of a batch run.
#[derive(Debug, Default)]
pub struct Summary {
    pub copied: u64,
    pub skipped: u64,
    pub failed: u64,
    pub cache_hits: u64,
    pub failures: Vec<(PathBuf, String)>,
}
