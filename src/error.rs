//! Error types for the timesheet-ingest library.
//!
//! Three distinct types reflect three distinct failure scopes:
//!
//! * [`IngestError`]: **Fatal**: the run cannot produce output at all
//!   (missing input directory, no file could be processed, output not
//!   writable). Returned as `Err(IngestError)` from the top-level `run*`
//!   functions.
//!
//! * [`FileError`]: **Per file**: one attachment could not be extracted or
//!   interpreted. Stored inside [`crate::output::FileOutcome`] so the batch
//!   keeps going and the caller gets a list of skipped files with reasons.
//!
//! * [`RecordRejection`]: **Per record**: an interpreted object lacked both
//!   identity fields and was dropped. The rest of the file is unaffected.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the timesheet-ingest library.
#[derive(Debug, Error)]
pub enum IngestError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The configured input directory does not exist.
    #[error("Input directory not found: '{path}'")]
    InputDirNotFound { path: PathBuf },

    /// Listing the input directory failed.
    #[error("Failed to read input directory '{path}': {source}")]
    InputDirUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Not a single file could be extracted and interpreted.
    #[error("None of the {total} input files could be processed.\nFirst error: {first_error}")]
    NoUsableFiles { total: usize, first_error: String },

    // ── Roster errors ─────────────────────────────────────────────────────
    /// The roster file exists but is not valid roster JSON.
    #[error("Roster file '{path}' is invalid: {detail}")]
    RosterInvalid { path: PathBuf, detail: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH to the directory containing libpdfium, or install it system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write an output report.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A sink rejected the merged records.
    #[error("Sink '{sink}' failed: {detail}")]
    SinkFailed { sink: String, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single input file.
///
/// The file is skipped; every other file in the batch is still processed.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum FileError {
    /// Neither the fast path nor OCR recovered usable text.
    #[error("{file}: extraction failed: {detail}")]
    ExtractionFailed { file: String, detail: String },

    /// The interpreter was unreachable or returned unusable output.
    #[error("{file}: interpretation failed: {detail}")]
    InterpretationFailed { file: String, detail: String },

    /// The file type is not one the extractor understands.
    #[error("{file}: unsupported file type")]
    Unsupported { file: String },
}

impl FileError {
    /// Name of the file this error belongs to.
    pub fn file(&self) -> &str {
        match self {
            FileError::ExtractionFailed { file, .. }
            | FileError::InterpretationFailed { file, .. }
            | FileError::Unsupported { file } => file,
        }
    }
}

/// An interpreted object that was discarded at the schema boundary.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[error("{file}: record #{index} has neither employee_name nor employee_id")]
pub struct RecordRejection {
    pub file: String,
    /// 0-based position of the object in the interpreter response.
    pub index: usize,
}
