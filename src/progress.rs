//! Progress-callback trait for per-file ingestion events.
//!
//! Inject an [`Arc<dyn IngestProgressCallback>`] via
//! [`crate::config::IngestConfigBuilder::progress_callback`] to receive
//! events as the aggregator works through the batch. Files are processed
//! one at a time, but the trait is still `Send + Sync` so implementations can
//! live inside an `Arc` shared with the async runtime.
//!
//! # Example
//!
//! ```rust
//! use timesheet_ingest::{IngestProgressCallback, IngestConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl IngestProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, index: usize, total: usize, file: &str, records: usize) {
//!         self.done.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{index}/{total} {file}: {records} records");
//!     }
//! }
//!
//! let config = IngestConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { done: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the aggregator as it processes each input file.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `index` is 1-based.
pub trait IngestProgressCallback: Send + Sync {
    /// Called once after discovery, before the first file is opened.
    fn on_run_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called before extraction of a file starts.
    fn on_file_start(&self, index: usize, total: usize, file: &str) {
        let _ = (index, total, file);
    }

    /// Called when a file was extracted and interpreted.
    ///
    /// `records` counts the records kept after schema validation.
    fn on_file_complete(&self, index: usize, total: usize, file: &str, records: usize) {
        let _ = (index, total, file, records);
    }

    /// Called when a file is skipped because of an extraction or
    /// interpretation failure.
    fn on_file_error(&self, index: usize, total: usize, file: &str, error: &str) {
        let _ = (index, total, file, error);
    }

    /// Called once after all files were attempted and the batch was merged.
    fn on_run_complete(&self, total_files: usize, success_count: usize, canonical_records: usize) {
        let _ = (total_files, success_count, canonical_records);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl IngestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::IngestConfig`].
pub type ProgressCallback = Arc<dyn IngestProgressCallback>;
