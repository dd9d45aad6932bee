//! Result types returned by a run.

use crate::error::{FileError, RecordRejection};
use crate::record::{CanonicalRecord, ExtractionMethod};
use crate::roster::SummaryRow;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What happened to one input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub file: String,
    pub path: PathBuf,
    /// How the text was obtained; `None` when extraction failed.
    pub method: Option<ExtractionMethod>,
    /// Records kept after schema validation.
    pub record_count: usize,
    /// Set when the file was skipped.
    pub error: Option<FileError>,
    pub duration_ms: u64,
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub total_files: usize,
    pub processed_files: usize,
    pub skipped_files: usize,
    pub raw_records: usize,
    pub rejected_records: usize,
    pub canonical_records: usize,
    pub ocr_files: usize,
    pub total_duration_ms: u64,
}

/// Everything a run produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    /// One record per identity group, in merge order.
    pub records: Vec<CanonicalRecord>,
    /// Per-file outcomes, in processing order.
    pub files: Vec<FileOutcome>,
    pub rejections: Vec<RecordRejection>,
    /// Present when a roster was configured.
    pub summary: Option<Vec<SummaryRow>>,
    /// Reports written by the local sinks.
    pub written: Vec<PathBuf>,
    pub stats: RunStats,
}

impl RunOutput {
    /// Files that were skipped, with the reason.
    pub fn skipped(&self) -> impl Iterator<Item = &FileError> {
        self.files.iter().filter_map(|f| f.error.as_ref())
    }

    /// Human-readable list of skipped files, one per line.
    pub fn skipped_summary(&self) -> String {
        self.skipped()
            .map(|e| format!("  - {}\n", e))
            .collect()
    }
}
