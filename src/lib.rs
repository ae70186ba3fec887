//! # reclaim
//!
//! Recover usable identity — a title and a date — for files whose original
//! names and locations were lost, typically the output of a block-level
//! carving tool (photorec and friends) after a crash or accidental deletion.
//!
//! reclaim extracts text and metadata from each file (OCR included), infers
//! a plausible title and date, and copies the file into a date-derived
//! hierarchy:
//!
//! ```text
//! OUTPUT/2019/03/Compte_rendu_conseil.pdf
//! OUTPUT/2019/03/Compte_rendu_conseil_01.pdf
//! OUTPUT/unknown-date/f0042.zip
//! ```
//!
//! Every copy is appended to a durable operation log first consulted for
//! collision resolution, making batches idempotent, resumable, and
//! reversible (`reclaim rollback`).
//!
//! ## Pipeline
//!
//! ```text
//! ┌─────────┐   ┌────────────┐   ┌─────────────────┐   ┌──────────┐
//! │  Input  │──▶│ Extraction │──▶│ Date + Title     │──▶│ Placement │
//! │ (globs) │   │ (cached)   │   │ inference        │   │ + ledger  │
//! └─────────┘   └────────────┘   └─────────────────┘   └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`sniff`] | Content-based format detection |
//! | [`cache`] | Persistent extraction cache |
//! | [`tools`] | External tool capability layer (OCR, converters, exiftool) |
//! | [`extract`] | Format-dispatched text/metadata extraction |
//! | [`dates`] | Date inference |
//! | [`titles`] | Title inference and filename sanitization |
//! | [`resolve`] | Destination resolution and collision suffixing |
//! | [`ledger`] | Append-only operation log and rollback |
//! | [`batch`] | Batch orchestration |
//! | [`input`] | Input file collection |
//! | [`progress`] | Progress reporting |

pub mod batch;
pub mod cache;
pub mod config;
pub mod dates;
pub mod extract;
pub mod input;
pub mod ledger;
pub mod models;
pub mod progress;
pub mod resolve;
pub mod sniff;
pub mod titles;
pub mod tools;
