//! Integration tests for timesheet-ingest.
//!
//! Every LLM and pdfium touch point is replaced by an in-process stub, so
//! these run offline and without a pdfium library:
//!
//! * [`LineInterpreter`] turns `name|id|hours|period` lines (or the
//!   tab-joined rows the tabular reader produces) into records.
//! * [`ScriptedLayer`] / [`ScriptedOcr`] return canned text per file name;
//!   the OCR stub also counts how often it was asked.
//!
//! Run with:
//!   cargo test --test ingest -- --nocapture

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use timesheet_ingest::{
    run, run_paths, run_to_dir, CanonicalRecord, ExtractionMethod, FileError, HoursStatus, IngestConfig,
    IngestError, IngestProgressCallback, OcrEngine, RawRecord, RecordInterpreter, RecordSink,
    TextLayer,
};

// ── Stubs ────────────────────────────────────────────────────────────────────

/// Splits each data line on `|` or tab: `name | id | hours | period`.
struct LineInterpreter;

#[async_trait]
impl RecordInterpreter for LineInterpreter {
    async fn interpret(&self, text: &str, _source_file: &str) -> Result<Vec<RawRecord>, String> {
        let cell = |cells: &[&str], i: usize| -> Value {
            cells
                .get(i)
                .map(|c| c.trim())
                .filter(|c| !c.is_empty())
                .map(|c| Value::String(c.to_string()))
                .unwrap_or(Value::Null)
        };

        Ok(text
            .lines()
            .filter(|l| l.contains('|') || l.contains('\t'))
            .map(|l| {
                let cells: Vec<&str> = l.split(['|', '\t']).collect();
                let mut obj = Map::new();
                obj.insert("employee_name".into(), cell(&cells, 0));
                obj.insert("employee_id".into(), cell(&cells, 1));
                obj.insert("total_presence_hours".into(), cell(&cells, 2));
                obj.insert("report_month".into(), cell(&cells, 3));
                obj
            })
            .collect())
    }
}

/// Always fails; for runs where interpretation must not succeed.
struct BrokenInterpreter;

#[async_trait]
impl RecordInterpreter for BrokenInterpreter {
    async fn interpret(&self, _text: &str, _source_file: &str) -> Result<Vec<RawRecord>, String> {
        Err("model returned no JSON".to_string())
    }
}

/// Canned PDF text layer per file name; missing entries read as empty.
#[derive(Default)]
struct ScriptedLayer {
    pages: HashMap<String, String>,
}

impl ScriptedLayer {
    fn with(mut self, file: &str, text: &str) -> Self {
        self.pages.insert(file.to_string(), text.to_string());
        self
    }
}

#[async_trait]
impl TextLayer for ScriptedLayer {
    async fn read(&self, path: &Path) -> Result<String, String> {
        Ok(self.pages.get(&file_name(path)).cloned().unwrap_or_default())
    }
}

/// Canned OCR output per file name; missing entries fail.
#[derive(Default)]
struct ScriptedOcr {
    pages: HashMap<String, String>,
    calls: AtomicUsize,
}

impl ScriptedOcr {
    fn with(mut self, file: &str, text: &str) -> Self {
        self.pages.insert(file.to_string(), text.to_string());
        self
    }
}

#[async_trait]
impl OcrEngine for ScriptedOcr {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn recognize(&self, path: &Path) -> Result<String, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pages
            .get(&file_name(path))
            .cloned()
            .ok_or_else(|| format!("no OCR text for {}", path.display()))
    }
}

/// Captures whatever a run publishes.
#[derive(Default)]
struct CollectingSink {
    received: Mutex<Vec<CanonicalRecord>>,
}

#[async_trait]
impl RecordSink for CollectingSink {
    fn name(&self) -> &str {
        "collect"
    }

    async fn publish(&self, records: &[CanonicalRecord]) -> Result<(), IngestError> {
        self.received.lock().unwrap().extend_from_slice(records);
        Ok(())
    }
}

/// Records callback events as strings.
#[derive(Default)]
struct EventLog {
    events: Mutex<Vec<String>>,
}

impl IngestProgressCallback for EventLog {
    fn on_run_start(&self, total_files: usize) {
        self.events.lock().unwrap().push(format!("start {total_files}"));
    }
    fn on_file_complete(&self, index: usize, _total: usize, file: &str, records: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("ok {index} {file} {records}"));
    }
    fn on_file_error(&self, index: usize, _total: usize, file: &str, _error: &str) {
        self.events.lock().unwrap().push(format!("err {index} {file}"));
    }
    fn on_run_complete(&self, total: usize, success: usize, canonical: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("done {total} {success} {canonical}"));
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn write(dir: &Path, name: &str, body: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}

/// A text layer long and wordy enough to pass the readability check.
fn digital_pdf_text(rows: &[&str]) -> String {
    let mut text = String::from(
        "Monthly attendance report\nAcme Staffing Ltd., Tel Aviv branch\n\
         Employee, ID, Presence hours, Month\n",
    );
    for row in rows {
        text.push_str(row);
        text.push('\n');
    }
    text
}

fn stub_config(layer: ScriptedLayer, ocr: ScriptedOcr) -> IngestConfig {
    IngestConfig::builder()
        .interpreter(Arc::new(LineInterpreter))
        .text_layer(Arc::new(layer))
        .ocr_engine(Arc::new(ocr))
        .build()
        .unwrap()
}

fn find<'a>(records: &'a [CanonicalRecord], id: &str) -> &'a CanonicalRecord {
    records
        .iter()
        .find(|r| r.employee_id.as_deref() == Some(id))
        .unwrap_or_else(|| panic!("no record with id {id}"))
}

// ── Batch behaviour ──────────────────────────────────────────────────────────

#[tokio::test]
async fn one_bad_file_does_not_stop_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "01_march.csv", b"Dana Levi,7,160,2024-03\n");
    write(dir.path(), "02_march.csv", b"Omer Cohen,8,150,2024-03\n");
    write(dir.path(), "03_broken.xlsx", b"this is not a workbook");
    write(dir.path(), "04_march.tsv", b"Noa Katz\t9\t120\t2024-03\n");
    write(dir.path(), "05_march.csv", b"Yael Ben-David;10;171;2024-03\n");

    let events = Arc::new(EventLog::default());
    let config = IngestConfig::builder()
        .interpreter(Arc::new(LineInterpreter))
        .text_layer(Arc::new(ScriptedLayer::default()))
        .ocr_engine(Arc::new(ScriptedOcr::default()))
        .progress_callback(events.clone())
        .build()
        .unwrap();

    let out = run(dir.path(), &config).await.unwrap();

    assert_eq!(out.stats.total_files, 5);
    assert_eq!(out.stats.processed_files, 4);
    assert_eq!(out.stats.skipped_files, 1);
    assert_eq!(out.records.len(), 4);

    let skipped: Vec<&FileError> = out.skipped().collect();
    assert_eq!(skipped.len(), 1);
    assert!(matches!(
        skipped[0],
        FileError::ExtractionFailed { file, .. } if file == "03_broken.xlsx"
    ));
    assert!(out.skipped_summary().contains("03_broken.xlsx"));

    let yael = find(&out.records, "10");
    assert_eq!(yael.hours.total_presence_hours, Some(171.0));
    assert_eq!(yael.extraction_methods, vec![ExtractionMethod::Tabular]);

    let events = events.events.lock().unwrap();
    assert_eq!(events.first().map(String::as_str), Some("start 5"));
    assert!(events.contains(&"err 3 03_broken.xlsx".to_string()));
    assert_eq!(events.last().map(String::as_str), Some("done 5 4 4"));
}

#[tokio::test]
async fn partial_records_across_files_become_one_row() {
    let dir = tempfile::tempdir().unwrap();
    // Same employee: the first file only has the ID and month, the second
    // has the name and hours under a differently formatted ID.
    write(dir.path(), "a.csv", b",A 123,,2024-03\n");
    write(dir.path(), "b.csv", b"Dana  LEVI,a123,160,\n");
    write(dir.path(), "c.csv", b"Omer Cohen,,150,2024-03\n");

    let out = run(
        dir.path(),
        &stub_config(ScriptedLayer::default(), ScriptedOcr::default()),
    )
    .await
    .unwrap();

    assert_eq!(out.stats.raw_records, 3);
    assert_eq!(out.records.len(), 2);

    let dana = &out.records[0];
    assert_eq!(dana.employee_name.as_deref(), Some("Dana  LEVI"));
    assert_eq!(dana.period.as_deref(), Some("2024-03"));
    assert_eq!(dana.hours.total_presence_hours, Some(160.0));
    assert_eq!(dana.source_files, vec!["a.csv", "b.csv"]);

    assert_eq!(out.records[1].employee_name.as_deref(), Some("Omer Cohen"));
}

#[tokio::test]
async fn nothing_usable_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.csv", b"Dana Levi,7,160\n");
    write(dir.path(), "b.csv", b"Omer Cohen,8,150\n");

    let config = IngestConfig::builder()
        .interpreter(Arc::new(BrokenInterpreter))
        .text_layer(Arc::new(ScriptedLayer::default()))
        .ocr_engine(Arc::new(ScriptedOcr::default()))
        .build()
        .unwrap();

    let err = run(dir.path(), &config).await.unwrap_err();
    match err {
        IngestError::NoUsableFiles { total, first_error } => {
            assert_eq!(total, 2);
            assert!(first_error.contains("a.csv"), "got: {first_error}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn empty_input_dir_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "notes.docx", b"ignored");

    let err = run(
        dir.path(),
        &stub_config(ScriptedLayer::default(), ScriptedOcr::default()),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, IngestError::NoUsableFiles { total: 0, .. }));
}

#[tokio::test]
async fn missing_input_dir_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");

    let err = run(
        &missing,
        &stub_config(ScriptedLayer::default(), ScriptedOcr::default()),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, IngestError::InputDirNotFound { .. }));
}

#[tokio::test]
async fn explicit_paths_report_unsupported_files() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write(dir.path(), "a.csv", b"Dana Levi,7,160\n");
    let doc = write(dir.path(), "memo.docx", b"PK");

    let out = run_paths(
        &[doc, csv],
        &stub_config(ScriptedLayer::default(), ScriptedOcr::default()),
    )
    .await
    .unwrap();

    assert_eq!(out.stats.total_files, 2);
    assert_eq!(out.stats.processed_files, 1);
    assert_eq!(out.stats.skipped_files, 1);
    assert!(matches!(
        out.skipped().next(),
        Some(FileError::Unsupported { file }) if file == "memo.docx"
    ));
}

// ── PDF text layer / OCR fallback ────────────────────────────────────────────

#[tokio::test]
async fn readable_text_layer_skips_ocr() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "digital.pdf", b"%PDF-1.7 stub");

    let layer = ScriptedLayer::default().with(
        "digital.pdf",
        &digital_pdf_text(&["Dana Levi | 7 | 160 | 2024-03"]),
    );
    let ocr = Arc::new(ScriptedOcr::default());
    let config = IngestConfig::builder()
        .interpreter(Arc::new(LineInterpreter))
        .text_layer(Arc::new(layer))
        .ocr_engine(ocr.clone())
        .build()
        .unwrap();

    let out = run(dir.path(), &config).await.unwrap();

    assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
    assert_eq!(out.files[0].method, Some(ExtractionMethod::TextLayer));
    assert_eq!(out.stats.ocr_files, 0);
    assert_eq!(out.records[0].hours.total_presence_hours, Some(160.0));
}

#[tokio::test]
async fn scanned_pdf_falls_back_to_ocr() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "scan.pdf", b"%PDF-1.4 stub");

    // Empty text layer, as for an image-only scan.
    let ocr = Arc::new(ScriptedOcr::default().with("scan.pdf", "Noa Katz | 9 | 120 | 2024-03"));
    let config = IngestConfig::builder()
        .interpreter(Arc::new(LineInterpreter))
        .text_layer(Arc::new(ScriptedLayer::default()))
        .ocr_engine(ocr.clone())
        .build()
        .unwrap();

    let out = run(dir.path(), &config).await.unwrap();

    assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
    assert_eq!(out.files[0].method, Some(ExtractionMethod::Ocr));
    assert_eq!(out.stats.ocr_files, 1);
    assert_eq!(out.records[0].extraction_methods, vec![ExtractionMethod::Ocr]);
}

#[tokio::test]
async fn failed_ocr_skips_only_that_pdf() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.csv", b"Dana Levi,7,160\n");
    write(dir.path(), "scan.pdf", b"%PDF-1.4 stub");

    let out = run(
        dir.path(),
        &stub_config(ScriptedLayer::default(), ScriptedOcr::default()),
    )
    .await
    .unwrap();

    assert_eq!(out.stats.processed_files, 1);
    let failed = out.files.iter().find(|f| f.file == "scan.pdf").unwrap();
    assert!(matches!(
        failed.error,
        Some(FileError::ExtractionFailed { .. })
    ));
}

// ── Reports and sinks ────────────────────────────────────────────────────────

#[tokio::test]
async fn run_to_dir_writes_dated_reports() {
    let input = tempfile::tempdir().unwrap();
    let reports = tempfile::tempdir().unwrap();
    write(
        input.path(),
        "march.csv",
        b"Dana Levi,7,150,2024-03\nOmer Cohen,8,100,2024-03\nStranger,99,40,2024-03\n",
    );
    let roster = write(
        input.path(),
        "master_employee.json",
        json!({
            "master_employees": [
                {"employee_name": "Dana Levi", "company_name": "Acme", "standard_hours": 160},
                {"employee_name": "Omer Cohen", "company_name": "Acme", "standard_hours": "160"}
            ]
        })
        .to_string()
        .as_bytes(),
    );

    let sink = Arc::new(CollectingSink::default());
    let config = IngestConfig::builder()
        .interpreter(Arc::new(LineInterpreter))
        .text_layer(Arc::new(ScriptedLayer::default()))
        .ocr_engine(Arc::new(ScriptedOcr::default()))
        .output_dir(reports.path())
        .roster_path(&roster)
        .build()
        .unwrap();

    let out = run_to_dir(input.path(), &config, &[sink.clone() as Arc<dyn RecordSink>])
        .await
        .unwrap();

    let date = chrono::Local::now().date_naive().format("%Y-%m-%d");
    let report = reports.path().join(format!("timesheet_summary_{date}.csv"));
    let summary = reports.path().join(format!("hours_summary_{date}.csv"));
    assert_eq!(out.written, vec![report.clone(), summary.clone()]);

    let report_text = std::fs::read_to_string(&report).unwrap();
    assert_eq!(report_text.lines().count(), 4);
    assert!(report_text.contains("Dana Levi,7,2024-03,150"));

    let rows = out.summary.as_ref().unwrap();
    assert_eq!(rows[0].status, HoursStatus::Ok);
    assert!(matches!(rows[1].status, HoursStatus::Irregular { .. }));
    assert_eq!(rows[2].status, HoursStatus::Unmatched);

    let summary_text = std::fs::read_to_string(&summary).unwrap();
    assert!(summary_text.contains("Omer Cohen,Acme,160,100,-60,Irregular (37.5% deviation)"));
    assert!(summary_text.contains("**CHECK: Stranger"));

    assert_eq!(*sink.received.lock().unwrap(), out.records);
    // Inputs are kept unless removal was requested.
    assert!(input.path().join("march.csv").exists());
}

#[tokio::test]
async fn roster_spellings_merge_into_one_employee() {
    let input = tempfile::tempdir().unwrap();
    write(input.path(), "a.csv", b"Dana Levy,,100\n");
    write(input.path(), "b.csv", b"Dana Levi,,,2024-03\n");
    let roster = write(
        input.path(),
        "master_employee.json",
        json!({
            "master_employees": [
                {"employee_name": "Dana Levi", "company_name": "Acme", "standard_hours": 160}
            ]
        })
        .to_string()
        .as_bytes(),
    );

    let config = IngestConfig::builder()
        .interpreter(Arc::new(LineInterpreter))
        .text_layer(Arc::new(ScriptedLayer::default()))
        .ocr_engine(Arc::new(ScriptedOcr::default()))
        .roster_path(&roster)
        .build()
        .unwrap();

    let out = run(input.path(), &config).await.unwrap();

    assert_eq!(out.records.len(), 1);
    let dana = &out.records[0];
    assert_eq!(dana.employee_name.as_deref(), Some("Dana Levi"));
    assert_eq!(dana.period.as_deref(), Some("2024-03"));
    assert_eq!(dana.hours.total_presence_hours, Some(100.0));
    assert_eq!(dana.source_files, vec!["a.csv", "b.csv"]);

    let rows = out.summary.as_ref().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].employee_name, "Dana Levi");
    assert_eq!(
        rows[0].status,
        HoursStatus::Irregular {
            deviation_percent: 37.5
        }
    );
}

#[tokio::test]
async fn remove_processed_keeps_failed_inputs() {
    let input = tempfile::tempdir().unwrap();
    let reports = tempfile::tempdir().unwrap();
    let good = write(input.path(), "good.csv", b"Dana Levi,7,160\n");
    let bad = write(input.path(), "bad.xlsx", b"garbage");

    let config = IngestConfig::builder()
        .interpreter(Arc::new(LineInterpreter))
        .text_layer(Arc::new(ScriptedLayer::default()))
        .ocr_engine(Arc::new(ScriptedOcr::default()))
        .output_dir(reports.path())
        .remove_processed(true)
        .build()
        .unwrap();

    let out = run_to_dir(input.path(), &config, &[]).await.unwrap();

    assert_eq!(out.stats.processed_files, 1);
    assert!(!good.exists());
    assert!(bad.exists());
}

#[tokio::test]
async fn dry_run_writes_nothing() {
    let input = tempfile::tempdir().unwrap();
    let reports = tempfile::tempdir().unwrap();
    write(input.path(), "a.csv", b"Dana Levi,7,160\n");

    let config = IngestConfig::builder()
        .interpreter(Arc::new(LineInterpreter))
        .text_layer(Arc::new(ScriptedLayer::default()))
        .ocr_engine(Arc::new(ScriptedOcr::default()))
        .output_dir(reports.path())
        .build()
        .unwrap();

    let out = run(input.path(), &config).await.unwrap();

    assert!(out.written.is_empty());
    assert_eq!(std::fs::read_dir(reports.path()).unwrap().count(), 0);
}
