//! # timesheet-ingest
//!
//! Turn a folder of employee timesheet attachments (PDFs, scans,
//! spreadsheets, CSV exports) into one deduplicated table of monthly hours.
//!
//! ## Why this crate?
//!
//! Timesheets arrive from many employers in many shapes: digital PDFs,
//! phone scans with no text layer, Excel exports, and the same employee sent
//! twice with different fields filled in. This crate extracts text the
//! cheapest way that works, lets an LLM map it onto a fixed record schema,
//! and reconciles duplicate partial records into one canonical row per
//! employee before anything is written.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input dir
//!  │
//!  ├─ 1. Discover   list and classify .pdf / .xlsx / .csv attachments
//!  ├─ 2. Extract    tabular reader, or PDF text layer → OCR fallback
//!  ├─ 3. Interpret  LLM → JSON records (retry, timeout, schema validation)
//!  ├─ 4. Merge      one canonical record per identity group
//!  ├─ 5. Reconcile  optional roster match + hours validation
//!  └─ 6. Publish    dated CSV report, hours summary, custom sinks
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use timesheet_ingest::{run_to_dir, IngestConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = IngestConfig::builder()
//!         .output_dir("downloads/reports")
//!         .roster_path("master_employee.json")
//!         .build()?;
//!     let output = run_to_dir("downloads/attachments", &config, &[]).await?;
//!     eprintln!(
//!         "{} files → {} employees",
//!         output.stats.processed_files, output.stats.canonical_records
//!     );
//!     eprint!("{}", output.skipped_summary());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `timesheet-ingest` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! timesheet-ingest = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod aggregate;
pub mod config;
pub mod error;
pub mod merge;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod roster;
pub mod sink;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use aggregate::{publish, run, run_files, run_paths, run_sync, run_to_dir};
pub use config::{IngestConfig, IngestConfigBuilder, OcrBackend};
pub use error::{FileError, IngestError, RecordRejection};
pub use merge::{merge, MergeInput};
pub use output::{FileOutcome, RunOutput, RunStats};
pub use pipeline::extract::{ReadabilityPolicy, TextLayer};
pub use pipeline::input::{discover, FileKind, InputFile};
pub use pipeline::llm::{RawRecord, RecordInterpreter};
pub use pipeline::ocr::OcrEngine;
pub use progress::{IngestProgressCallback, NoopProgressCallback, ProgressCallback};
pub use record::{CanonicalRecord, ExtractionMethod, Hours, TimesheetRecord};
pub use roster::{HoursStatus, Roster, RosterEntry, SummaryRow};
pub use sink::{CsvReportSink, RecordSink};
