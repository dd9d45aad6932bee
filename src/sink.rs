//! Output sinks for merged records.
//!
//! Sinks run only after the whole batch has been merged, so an interrupted
//! run never leaves a half-written report behind. Local reports are written
//! atomically (temp file + rename).
//!
//! [`RecordSink`] is the seam for external destinations such as a shared
//! spreadsheet; [`CsvReportSink`] is the built-in local one.

use crate::error::IngestError;
use crate::record::{CanonicalRecord, Hours};
use crate::roster::SummaryRow;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::info;

/// Receives the deduplicated records of a run, in merge order.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Short name for logs and errors.
    fn name(&self) -> &str;

    async fn publish(&self, records: &[CanonicalRecord]) -> Result<(), IngestError>;
}

/// `timesheet_summary_<date>.csv` in `dir`.
pub fn report_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("timesheet_summary_{}.csv", date.format("%Y-%m-%d")))
}

/// `hours_summary_<date>.csv` in `dir`.
pub fn summary_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("hours_summary_{}.csv", date.format("%Y-%m-%d")))
}

/// Writes one CSV row per canonical record.
pub struct CsvReportSink {
    path: PathBuf,
}

impl CsvReportSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Sink writing the dated report into `dir`.
    pub fn dated(dir: &Path, date: NaiveDate) -> Self {
        Self::new(report_path(dir, date))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordSink for CsvReportSink {
    fn name(&self) -> &str {
        "csv-report"
    }

    async fn publish(&self, records: &[CanonicalRecord]) -> Result<(), IngestError> {
        let bytes = render_report(records).map_err(|e| IngestError::SinkFailed {
            sink: self.name().to_string(),
            detail: e.to_string(),
        })?;
        atomic_write(&self.path, &bytes).await?;
        info!(
            "Wrote {} records to {}",
            records.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Write the roster summary table.
pub async fn write_summary(path: &Path, rows: &[SummaryRow]) -> Result<(), IngestError> {
    let bytes = render_summary(rows).map_err(|e| IngestError::SinkFailed {
        sink: "hours-summary".to_string(),
        detail: e.to_string(),
    })?;
    atomic_write(path, &bytes).await?;
    info!("Wrote hours summary to {}", path.display());
    Ok(())
}

// ── Rendering ────────────────────────────────────────────────────────────────

fn render_report(records: &[CanonicalRecord]) -> Result<Vec<u8>, csv::Error> {
    let mut wtr = csv::Writer::from_writer(Vec::new());

    let mut header = vec!["employee_name", "employee_id", "period"];
    header.extend(Hours::FIELDS);
    header.extend(["source_files", "extraction_methods"]);
    wtr.write_record(&header)?;

    for record in records {
        let mut row = vec![
            record.employee_name.clone().unwrap_or_default(),
            record.employee_id.clone().unwrap_or_default(),
            record.period.clone().unwrap_or_default(),
        ];
        row.extend(record.hours.values().iter().map(|v| format_number(*v)));
        row.push(record.source_files.join("; "));
        row.push(
            record
                .extraction_methods
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        );
        wtr.write_record(&row)?;
    }

    wtr.into_inner().map_err(|e| e.into_error().into())
}

fn render_summary(rows: &[SummaryRow]) -> Result<Vec<u8>, csv::Error> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record([
        "Employee Name",
        "Company",
        "Standard Hours",
        "Reported Hours",
        "Difference",
        "Status",
    ])?;

    for row in rows {
        wtr.write_record([
            row.employee_name.clone(),
            row.company.clone().unwrap_or_default(),
            format_number(row.standard_hours),
            format_number(row.reported_hours),
            format_number(row.difference),
            row.status.to_string(),
        ])?;
    }

    wtr.into_inner().map_err(|e| e.into_error().into())
}

/// Up to two decimals, no trailing zeros; empty when absent.
fn format_number(value: Option<f64>) -> String {
    let Some(v) = value else {
        return String::new();
    };
    let s = format!("{:.2}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), IngestError> {
    let write_failed = |source: std::io::Error| IngestError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    let tmp_path = path.with_extension("csv.tmp");
    tokio::fs::write(&tmp_path, bytes).await.map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_failed)
}
