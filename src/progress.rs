//! Batch progress reporting.
//!
//! Reports observable progress during `reclaim run` so users see which file
//! is being extracted, how much is left, and what was placed where.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;
use std::path::Path;

/// A single progress event for a batch run.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    /// Extraction phase: file `n` of `total` is being processed.
    Extracting {
        n: u64,
        total: u64,
        file: String,
    },
    /// Placement phase: a destination was decided for file `n` of `total`.
    Placed {
        n: u64,
        total: u64,
        destination: String,
    },
}

impl ProgressEvent {
    pub fn extracting(n: u64, total: u64, file: &Path) -> Self {
        ProgressEvent::Extracting {
            n,
            total,
            file: file.display().to_string(),
        }
    }

    pub fn placed(n: u64, total: u64, destination: &Path) -> Self {
        ProgressEvent::Placed {
            n,
            total,
            destination: destination.display().to_string(),
        }
    }
}

/// Reports batch progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "extract  12 / 340  f0012044.pdf".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Extracting { n, total, file } => {
                format!("extract  {} / {}  {}\n", n, total, file)
            }
            ProgressEvent::Placed {
                n,
                total,
                destination,
            } => format!("place    {} / {}  -> {}\n", n, total, destination),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Extracting { n, total, file } => serde_json::json!({
                "event": "progress",
                "phase": "extract",
                "n": n,
                "total": total,
                "file": file,
            }),
            ProgressEvent::Placed {
                n,
                total,
                destination,
            } => serde_json::json!({
                "event": "progress",
                "phase": "place",
                "n": n,
                "total": total,
                "destination": destination,
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode. Caller passes it to the batch run.
    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
