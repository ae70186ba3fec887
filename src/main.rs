//! # reclaim CLI
//!
//! The `reclaim` binary recovers names and dates for carved files. It
//! provides commands for running a recovery batch, inspecting and rolling
//! back the operation log, and managing the extraction cache.
//!
//! ## Usage
//!
//! ```bash
//! reclaim --config ./reclaim.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `reclaim run <files>…` | Infer titles/dates and copy into the output tree |
//! | `reclaim rollback` | Undo the copies of the last (or a given) run |
//! | `reclaim log` | Print the operation log |
//! | `reclaim cache stats` | Show extraction cache size |
//! | `reclaim cache clear` | Drop the extraction cache |
//!
//! ## Examples
//!
//! ```bash
//! # Dry run over a photorec output tree, French documents
//! reclaim run --dry-run --batch recup_dir.*/
//!
//! # The real thing, keeping original names
//! reclaim run --keep-name --output ~/sorted recup_dir.*/
//!
//! # Undo the last run
//! reclaim rollback
//! ```

mod batch;
mod cache;
mod config;
mod dates;
mod extract;
mod input;
mod ledger;
mod models;
mod progress;
mod resolve;
mod sniff;
mod titles;
mod tools;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::batch::BatchOptions;
use crate::cache::ExtractionCache;
use crate::ledger::OperationLog;
use crate::models::Outcome;
use crate::progress::ProgressMode;
use crate::tools::Toolbox;

/// reclaim — rename and reorganize recovered files by their contents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/reclaim.example.toml` for a full example; without a
/// config file sensible defaults apply (output under `./output`, English
/// month names, all external tools enabled).
#[derive(Parser)]
#[command(
    name = "reclaim",
    about = "Recover names and dates for carved files by looking at their contents",
    version,
    long_about = "reclaim extracts text and metadata from recovered files (running OCR on \
    images and scanned PDFs), infers a plausible title and date for each, and copies them \
    into an OUTPUT/YEAR/MONTH tree with collision-free names. Every copy is recorded in an \
    append-only log that supports resume and rollback."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Missing file is fine: defaults apply. All paths, locale month
    /// tables, limits, and tool names are read from this file.
    #[arg(long, global = true, default_value = "./reclaim.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Recover names and dates for a set of files.
    ///
    /// Directories are walked (honoring the configured include/exclude
    /// globs); explicit files are always processed. Extraction results are
    /// cached, so re-running after an interruption is cheap.
    Run {
        /// Files and/or directories to process.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Override the configured output root.
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Extract, infer, and log — but copy nothing.
        #[arg(long, short = 'd')]
        dry_run: bool,

        /// Keep original filenames; only detect dates for reorganizing.
        #[arg(long, short)]
        keep_name: bool,

        /// Unattended mode: never ask questions.
        #[arg(long, short)]
        batch: bool,

        /// Always OCR PDFs instead of trusting their embedded text layer.
        #[arg(long)]
        force_pdf_ocr: bool,

        /// Maximum number of files to process this run.
        #[arg(long)]
        limit: Option<usize>,

        /// Progress output: auto, off, human, or json.
        #[arg(long, default_value = "auto")]
        progress: String,
    },

    /// Remove the files copied by a previous run.
    ///
    /// Replays the operation log in reverse, deleting every `copied`
    /// destination. Idempotent: destinations already gone are skipped.
    /// The log itself is never truncated.
    Rollback {
        /// Run to roll back (defaults to the most recent run in the log).
        #[arg(long)]
        run_id: Option<String>,
    },

    /// Print the operation log, oldest first.
    Log,

    /// Manage the extraction cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

/// Extraction cache maintenance.
#[derive(Subcommand)]
enum CacheAction {
    /// Show entry count and total size.
    Stats,
    /// Remove the cache directory. Only discards an optimization —
    /// extraction will simply run again.
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        config::Config::default()
    };

    match cli.command {
        Commands::Run {
            files,
            output,
            dry_run,
            keep_name,
            batch,
            force_pdf_ocr,
            limit,
            progress,
        } => {
            let mut cfg = cfg;
            if let Some(output) = output {
                cfg.output.root = output;
            }
            if force_pdf_ocr {
                cfg.tools.force_pdf_ocr = true;
            }
            run(cfg, files, dry_run, keep_name, batch, limit, &progress).await?;
        }
        Commands::Rollback { run_id } => {
            rollback(&cfg, run_id)?;
        }
        Commands::Log => {
            print_log(&cfg)?;
        }
        Commands::Cache { action } => {
            let cache = ExtractionCache::new(&cfg.cache.dir);
            match action {
                CacheAction::Stats => {
                    let (entries, bytes) = cache.stats()?;
                    println!("cache {}", cache.dir().display());
                    println!("  entries: {}", entries);
                    println!("  bytes:   {}", bytes);
                }
                CacheAction::Clear => {
                    cache.clear()?;
                    println!("Cache cleared.");
                }
            }
        }
    }

    Ok(())
}

async fn run(
    cfg: config::Config,
    args: Vec<PathBuf>,
    dry_run: bool,
    keep_name: bool,
    batch_mode: bool,
    limit: Option<usize>,
    progress: &str,
) -> Result<()> {
    let mut files = input::collect_files(&args, &cfg.input)?;
    if let Some(limit) = limit {
        files.truncate(limit);
    }
    if files.is_empty() {
        println!("Nothing to do.");
        return Ok(());
    }

    // Copying thousands of files is hard to undo by hand; give the user one
    // chance to bail out. Unattended runs (and pipes) skip the question.
    if !batch_mode && !dry_run && atty::is(atty::Stream::Stdin) {
        println!(
            "About to process {} files into {}. Press enter to continue, Ctrl-C to abort.",
            files.len(),
            cfg.output.root.display()
        );
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
    }

    let progress_mode = match progress {
        "off" => ProgressMode::Off,
        "human" => ProgressMode::Human,
        "json" => ProgressMode::Json,
        _ => ProgressMode::default_for_tty(),
    };

    // Cooperative cancellation: first Ctrl-C finishes the current file and
    // stops cleanly, leaving the log and cache resumable.
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Interrupt received, finishing current file...");
                stop.store(true, Ordering::Relaxed);
            }
        });
    }

    let toolbox = Arc::new(Toolbox::from_config(&cfg));
    let options = BatchOptions { dry_run, keep_name };
    let summary = batch::run_batch(
        &files,
        &cfg,
        toolbox,
        options,
        progress_mode.reporter().into(),
        stop,
    )
    .await?;

    println!("run {}", if dry_run { "(dry-run)" } else { "" });
    println!("  files:      {}", files.len());
    println!("  copied:     {}", summary.copied);
    println!("  skipped:    {}", summary.skipped);
    println!("  failed:     {}", summary.failed);
    println!("  cache hits: {}", summary.cache_hits);
    if !summary.failures.is_empty() {
        println!("  failures:");
        for (path, error) in &summary.failures {
            println!("    {}: {}", path.display(), error);
        }
    }
    println!("ok");
    Ok(())
}

fn rollback(cfg: &config::Config, run_id: Option<String>) -> Result<()> {
    let ledger = OperationLog::new(&cfg.ledger.path);
    let records = ledger.read_all()?;
    let run_id = match run_id.or_else(|| records.last().map(|r| r.run_id.clone())) {
        Some(id) => id,
        None => {
            println!("Log is empty, nothing to roll back.");
            return Ok(());
        }
    };
    let selected: Vec<_> = records.into_iter().filter(|r| r.run_id == run_id).collect();
    if selected.is_empty() {
        anyhow::bail!("No records for run {}", run_id);
    }
    let stats = OperationLog::rollback(&selected)?;
    println!("rollback {}", run_id);
    println!("  removed:      {}", stats.removed);
    println!("  already gone: {}", stats.already_gone);
    println!("ok");
    Ok(())
}

fn print_log(cfg: &config::Config) -> Result<()> {
    let ledger = OperationLog::new(&cfg.ledger.path);
    for record in ledger.read_all()? {
        let outcome = match record.outcome {
            Outcome::Copied => "copied",
            Outcome::SkippedDryRun => "dry-run",
            Outcome::Failed => "failed",
        };
        println!(
            "{} {:>7}  [{}] -> [{}]{}",
            record.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            outcome,
            record.source.display(),
            record.destination.display(),
            record
                .error
                .as_deref()
                .map(|e| format!("  ({})", e))
                .unwrap_or_default(),
        );
    }
    Ok(())
}
