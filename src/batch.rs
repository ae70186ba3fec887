//! Batch orchestration.
//!
//! Drives the full per-file flow: cache lookup → extraction → date/title
//! inference → placement resolution → copy → ledger append. Extraction is
//! embarrassingly parallel and runs under a semaphore; resolution, copy, and
//! append are serialized in input order, so every append is fully applied
//! before the next file's collision check — the one cross-file ordering
//! guarantee the system makes.
//!
//! A single file's failure never aborts the batch; only a ledger write
//! failure does, because the ledger is the durability guarantee.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::cache::ExtractionCache;
use crate::config::Config;
use crate::dates::DateInferencer;
use crate::extract::FormatExtractor;
use crate::ledger::OperationLog;
use crate::models::{
    ExtractionResult, FileIdentity, FormatKind, Outcome, PlacementRecord, Summary,
};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::resolve::Resolver;
use crate::titles::{self, TitleInferencer};
use crate::tools::Toolbox;

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    /// Extract and log, but copy nothing.
    pub dry_run: bool,
    /// Keep original filenames; only the date decides placement.
    pub keep_name: bool,
}

/// Result of the concurrent extraction stage for one file.
enum PreparedOutcome {
    Ready {
        identity: FileIdentity,
        extraction: ExtractionResult,
        cache_hit: bool,
    },
    Failed(String),
    Cancelled,
}

struct Prepared {
    path: PathBuf,
    outcome: PreparedOutcome,
}

pub async fn run_batch(
    files: &[PathBuf],
    config: &Config,
    toolbox: Arc<Toolbox>,
    options: BatchOptions,
    progress: Arc<dyn ProgressReporter>,
    stop: Arc<AtomicBool>,
) -> Result<Summary> {
    let run_id = uuid::Uuid::new_v4().to_string();
    let total = files.len() as u64;
    debug!(%run_id, total, dry_run = options.dry_run, "starting batch");

    let date_inferencer = DateInferencer::new(config)?;
    let title_inferencer = TitleInferencer::new(config)?;
    let ledger = OperationLog::new(&config.ledger.path);
    let mut resolver = Resolver::new(
        &config.output.root,
        ledger.copied_destinations()?,
        config.limits.title_max_len,
    );

    let slots = extract_all(files, config, toolbox, &progress, &stop, total).await?;

    // Placement: strictly serialized, in input order.
    let mut summary = Summary::default();
    let mut seq = 0u64;
    for (index, prepared) in slots.into_iter().enumerate() {
        if stop.load(Ordering::Relaxed) {
            warn!("stop requested, leaving remaining files for a future run");
            break;
        }
        let (identity, extraction, cache_hit) = match prepared.outcome {
            PreparedOutcome::Cancelled => break,
            PreparedOutcome::Failed(error) => {
                let record = PlacementRecord {
                    run_id: run_id.clone(),
                    seq,
                    source: prepared.path.clone(),
                    destination: PathBuf::new(),
                    cache_key: String::new(),
                    year: None,
                    month: None,
                    title: None,
                    outcome: Outcome::Failed,
                    error: Some(error.clone()),
                    recorded_at: Utc::now(),
                };
                ledger.append(&record)?;
                seq += 1;
                summary.failed += 1;
                summary.failures.push((prepared.path, error));
                continue;
            }
            PreparedOutcome::Ready {
                identity,
                extraction,
                cache_hit,
            } => (identity, extraction, cache_hit),
        };
        if cache_hit {
            summary.cache_hits += 1;
        }

        let date = date_inferencer.infer(&extraction, identity.mtime());
        let title = if options.keep_name {
            None
        } else {
            effective_title(&title_inferencer, &identity, &extraction, config.limits.title_max_len)
        };

        let destination = resolver.resolve(
            date.as_ref(),
            title.as_deref(),
            &identity.path,
            extraction.kind,
            options.keep_name,
        );
        progress.report(ProgressEvent::placed(index as u64 + 1, total, &destination));

        let mut record = PlacementRecord {
            run_id: run_id.clone(),
            seq,
            source: identity.path.clone(),
            destination: destination.clone(),
            cache_key: identity.cache_key(),
            year: date.map(|d| d.year),
            month: date.and_then(|d| d.month),
            title: title.clone(),
            outcome: Outcome::SkippedDryRun,
            error: None,
            recorded_at: Utc::now(),
        };

        if options.dry_run {
            ledger.append(&record)?;
            seq += 1;
            summary.skipped += 1;
            continue;
        }

        match copy_into_place(&identity.path, &destination) {
            Ok(()) => {
                record.outcome = Outcome::Copied;
                // The copy is only acknowledged once its record is durable.
                ledger.append(&record)?;
                seq += 1;
                summary.copied += 1;
            }
            Err(e) => {
                let error = format!("{:#}", e);
                record.outcome = Outcome::Failed;
                record.error = Some(error.clone());
                ledger.append(&record)?;
                seq += 1;
                summary.failed += 1;
                summary.failures.push((identity.path.clone(), error));
            }
        }
    }

    Ok(summary)
}

/// Concurrent extraction stage. Results come back in input order; the
/// semaphore bounds parallel tool invocations.
async fn extract_all(
    files: &[PathBuf],
    config: &Config,
    toolbox: Arc<Toolbox>,
    progress: &Arc<dyn ProgressReporter>,
    stop: &Arc<AtomicBool>,
    total: u64,
) -> Result<Vec<Prepared>> {
    let cache = Arc::new(ExtractionCache::new(&config.cache.dir));
    let extractor = Arc::new(FormatExtractor::new(toolbox, config));
    let semaphore = Arc::new(Semaphore::new(config.limits.concurrency));
    let started = Arc::new(AtomicU64::new(0));
    let file_timeout = Duration::from_secs(config.limits.file_timeout_secs);

    let mut set: JoinSet<(usize, Prepared)> = JoinSet::new();
    for (index, path) in files.iter().enumerate() {
        let path = path.clone();
        let cache = cache.clone();
        let extractor = extractor.clone();
        let semaphore = semaphore.clone();
        let stop = stop.clone();
        let progress = progress.clone();
        let started = started.clone();
        set.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    return (
                        index,
                        Prepared {
                            path,
                            outcome: PreparedOutcome::Cancelled,
                        },
                    )
                }
            };
            if stop.load(Ordering::Relaxed) {
                return (
                    index,
                    Prepared {
                        path,
                        outcome: PreparedOutcome::Cancelled,
                    },
                );
            }
            let n = started.fetch_add(1, Ordering::Relaxed) + 1;
            progress.report(ProgressEvent::extracting(n, total, &path));

            let outcome = prepare_one(&path, &cache, &extractor, file_timeout).await;
            (index, Prepared { path, outcome })
        });
    }

    let mut slots: Vec<Option<Prepared>> = files.iter().map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        let (index, prepared) = joined.context("extraction task panicked")?;
        slots[index] = Some(prepared);
    }
    Ok(slots.into_iter().flatten().collect())
}

async fn prepare_one(
    path: &PathBuf,
    cache: &ExtractionCache,
    extractor: &FormatExtractor,
    file_timeout: Duration,
) -> PreparedOutcome {
    let identity = match FileIdentity::of(path) {
        Ok(identity) => identity,
        Err(e) => return PreparedOutcome::Failed(format!("{:#}", e)),
    };

    if let Some(extraction) = cache.get(&identity) {
        debug!(file = %path.display(), "extraction cache hit");
        return PreparedOutcome::Ready {
            identity,
            extraction,
            cache_hit: true,
        };
    }

    let extraction = match tokio::time::timeout(file_timeout, extractor.extract(path)).await {
        Ok(extraction) => extraction,
        Err(_) => ExtractionResult::failed(
            FormatKind::Unknown,
            format!("extraction timed out after {:?}", file_timeout),
        ),
    };

    // Fully failed extractions are not cached: a missing tool or transient
    // error should be retried on the next run.
    if extraction.text_ok || extraction.metadata_ok {
        if let Err(e) = cache.put(&identity, &extraction) {
            warn!(file = %path.display(), error = %e, "cache write failed");
        }
    }

    PreparedOutcome::Ready {
        identity,
        extraction,
        cache_hit: false,
    }
}

/// Inferred title merged with the original stem (kept as a prefix when it
/// looks meaningful, i.e. not a carved `f1234567` name).
fn effective_title(
    inferencer: &TitleInferencer,
    identity: &FileIdentity,
    extraction: &ExtractionResult,
    max_len: usize,
) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    if let Some(prefix) = titles::keep_original_stem(&identity.stem()) {
        parts.push(prefix);
    }
    if let Some(candidate) = inferencer.infer(extraction) {
        parts.push(candidate.text);
    }
    if parts.is_empty() {
        return None;
    }
    let joined = titles::sanitize(&parts.join("-"), max_len);
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

/// Copy preserving the destination-uniqueness contract: parents are created,
/// the copy itself goes through `fs::copy` (permissions come along), and any
/// error is a per-file `DestinationWriteFailure`.
fn copy_into_place(source: &PathBuf, destination: &PathBuf) -> Result<()> {
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::copy(source, destination)
        .with_context(|| format!("Failed to copy to {}", destination.display()))?;
    Ok(())
}
