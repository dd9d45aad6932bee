//! Batch entry points: discover → extract → interpret → merge → publish.
//!
//! ## Why sequential?
//!
//! A run is a monthly batch of a few dozen attachments. Processing one file
//! at a time keeps the record collection append-only while files are read,
//! keeps LLM usage well under provider rate limits, and makes the log read
//! in file order. Blocking pdfium work still leaves the runtime via
//! `spawn_blocking`.
//!
//! ## Failure scopes
//!
//! A file that cannot be extracted or interpreted is recorded in
//! [`RunOutput::files`] and skipped; the batch continues. The run only fails
//! when *no* file succeeded. Nothing is written until every file has been
//! attempted and the collection merged, so an interrupted run commits
//! nothing.

use crate::config::{IngestConfig, OcrBackend};
use crate::error::{FileError, IngestError, RecordRejection};
use crate::merge::merge;
use crate::output::{FileOutcome, RunOutput, RunStats};
use crate::pipeline::extract::{PdfiumTextLayer, ReadabilityPolicy, TextExtractor, TextLayer};
use crate::pipeline::input::{self, InputFile};
use crate::pipeline::llm::{LlmInterpreter, RecordInterpreter};
use crate::pipeline::ocr::{OcrEngine, TesseractOcr, VisionOcr};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::record::{record_from_json, CanonicalRecord, ExtractionMethod, TimesheetRecord};
use crate::roster::{canonicalize_names, reconcile, Roster};
use crate::sink::{summary_path, write_summary, CsvReportSink, RecordSink};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Ingest every supported file in `input_dir`.
///
/// This is the primary entry point for the library. Nothing is written to
/// disk; use [`run_to_dir`] for the full pipeline including reports.
///
/// # Returns
/// `Ok(RunOutput)` when at least one file succeeded, even if others were
/// skipped (check `output.stats.skipped_files`).
///
/// # Errors
/// Returns `Err(IngestError)` only for fatal errors:
/// - Input directory missing or unreadable
/// - Roster file present but invalid
/// - No LLM provider available
/// - No file could be extracted and interpreted
pub async fn run(
    input_dir: impl AsRef<Path>,
    config: &IngestConfig,
) -> Result<RunOutput, IngestError> {
    let files = input::discover(input_dir.as_ref())?;
    run_files(&files, config).await
}

/// Ingest explicit paths, in the given order.
///
/// Unlike [`run`], a path with an unsupported extension is not silently
/// ignored: it is reported in [`RunOutput::files`] as
/// [`FileError::Unsupported`] and counted as skipped.
pub async fn run_paths<P: AsRef<Path>>(
    paths: &[P],
    config: &IngestConfig,
) -> Result<RunOutput, IngestError> {
    let mut files = Vec::with_capacity(paths.len());
    let mut unsupported = Vec::new();

    for path in paths.iter().map(AsRef::as_ref) {
        match InputFile::from_path(path) {
            Some(file) => files.push(file),
            None => {
                let file = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                warn!("Skipping {}: unsupported file type", file);
                unsupported.push(FileOutcome {
                    file: file.clone(),
                    path: path.to_path_buf(),
                    method: None,
                    record_count: 0,
                    error: Some(FileError::Unsupported { file }),
                    duration_ms: 0,
                });
            }
        }
    }

    let total = paths.len();
    let first_unsupported = unsupported
        .first()
        .and_then(|o| o.error.as_ref())
        .map(ToString::to_string);

    if files.is_empty() {
        return Err(IngestError::NoUsableFiles {
            total,
            first_error: first_unsupported
                .unwrap_or_else(|| "no supported input files found".to_string()),
        });
    }

    let mut output = run_files(&files, config).await.map_err(|e| match e {
        IngestError::NoUsableFiles { first_error, .. } => {
            IngestError::NoUsableFiles { total, first_error }
        }
        other => other,
    })?;

    output.stats.total_files = total;
    output.stats.skipped_files += unsupported.len();
    output.files.extend(unsupported);
    Ok(output)
}

/// Ingest an explicit list of files, in the given order.
pub async fn run_files(
    files: &[InputFile],
    config: &IngestConfig,
) -> Result<RunOutput, IngestError> {
    let total_start = Instant::now();
    let total = files.len();
    info!("Starting run over {} files", total);

    if files.is_empty() {
        return Err(IngestError::NoUsableFiles {
            total: 0,
            first_error: "no supported input files found".to_string(),
        });
    }

    // ── Step 1: Load roster (fail fast before any LLM spend) ─────────────
    let roster = match &config.roster_path {
        Some(path) => Some(Roster::load(path)?),
        None => None,
    };

    // ── Step 2: Build extraction and interpretation stages ──────────────
    let (extractor, interpreter) = build_stages(config).await?;
    let cb: ProgressCallback = config
        .progress_callback
        .clone()
        .unwrap_or_else(|| Arc::new(NoopProgressCallback));
    cb.on_run_start(total);

    // ── Step 3: Process files one at a time ──────────────────────────────
    let mut raw: Vec<TimesheetRecord> = Vec::new();
    let mut rejections: Vec<RecordRejection> = Vec::new();
    let mut outcomes: Vec<FileOutcome> = Vec::with_capacity(total);

    for (i, file) in files.iter().enumerate() {
        let index = i + 1;
        cb.on_file_start(index, total, &file.name);
        let start = Instant::now();

        let mut outcome = FileOutcome {
            file: file.name.clone(),
            path: file.path.clone(),
            method: None,
            record_count: 0,
            error: None,
            duration_ms: 0,
        };

        match process_file(file, &extractor, interpreter.as_ref(), &mut outcome).await {
            Ok((records, rejected)) => {
                outcome.record_count = records.len();
                cb.on_file_complete(index, total, &file.name, records.len());
                raw.extend(records);
                rejections.extend(rejected);
            }
            Err(e) => {
                warn!("Skipping {}", e);
                cb.on_file_error(index, total, &file.name, &e.to_string());
                outcome.error = Some(e);
            }
        }
        outcome.duration_ms = start.elapsed().as_millis() as u64;
        outcomes.push(outcome);
    }

    let processed = outcomes.iter().filter(|o| o.is_success()).count();
    if processed == 0 {
        let first_error = outcomes
            .iter()
            .find_map(|o| o.error.as_ref())
            .map(ToString::to_string)
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(IngestError::NoUsableFiles { total, first_error });
    }

    // ── Step 4: Roster spelling, merge, then reconcile ───────────────────
    if let Some(roster) = &roster {
        let renamed = canonicalize_names(&mut raw, roster, config.name_match_threshold);
        debug!("{} names rewritten to roster spelling", renamed);
    }
    let records = merge(&raw);
    let summary = roster.as_ref().map(|roster| {
        reconcile(
            &records,
            roster,
            config.name_match_threshold,
            config.hours_tolerance_percent,
        )
    });
    cb.on_run_complete(total, processed, records.len());

    let stats = RunStats {
        total_files: total,
        processed_files: processed,
        skipped_files: total - processed,
        raw_records: raw.len(),
        rejected_records: rejections.len(),
        canonical_records: records.len(),
        ocr_files: outcomes
            .iter()
            .filter(|o| o.method == Some(ExtractionMethod::Ocr))
            .count(),
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Run complete: {}/{} files, {} raw → {} canonical records, {}ms",
        stats.processed_files,
        stats.total_files,
        stats.raw_records,
        stats.canonical_records,
        stats.total_duration_ms
    );

    Ok(RunOutput {
        records,
        files: outcomes,
        rejections,
        summary,
        written: Vec::new(),
        stats,
    })
}

/// Run the full pipeline and write the dated reports to `config.output_dir`.
///
/// After the merge, writes `timesheet_summary_<date>.csv` (and
/// `hours_summary_<date>.csv` when a roster is configured), then hands the
/// records to `extra_sinks` in order. Processed inputs are deleted last, and
/// only when `config.remove_processed` is set.
pub async fn run_to_dir(
    input_dir: impl AsRef<Path>,
    config: &IngestConfig,
    extra_sinks: &[Arc<dyn RecordSink>],
) -> Result<RunOutput, IngestError> {
    let mut output = run(input_dir, config).await?;
    let date = chrono::Local::now().date_naive();

    let report = CsvReportSink::dated(&config.output_dir, date);
    report.publish(&output.records).await?;
    output.written.push(report.path().to_path_buf());

    if let Some(rows) = &output.summary {
        let path = summary_path(&config.output_dir, date);
        write_summary(&path, rows).await?;
        output.written.push(path);
    }

    publish(&output.records, extra_sinks).await?;

    if config.remove_processed {
        remove_processed(&output.files).await;
    }

    Ok(output)
}

/// Hand merged records to each sink in order; the first failure aborts.
pub async fn publish(
    records: &[CanonicalRecord],
    sinks: &[Arc<dyn RecordSink>],
) -> Result<(), IngestError> {
    for sink in sinks {
        debug!("Publishing {} records to {}", records.len(), sink.name());
        sink.publish(records).await?;
    }
    Ok(())
}

/// Synchronous wrapper around [`run`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_sync(
    input_dir: impl AsRef<Path>,
    config: &IngestConfig,
) -> Result<RunOutput, IngestError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| IngestError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run(input_dir, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Extract, interpret and validate one file.
///
/// Records the extraction method on `outcome` as soon as it is known so an
/// interpretation failure still reports how the text was obtained.
async fn process_file(
    file: &InputFile,
    extractor: &TextExtractor,
    interpreter: &dyn RecordInterpreter,
    outcome: &mut FileOutcome,
) -> Result<(Vec<TimesheetRecord>, Vec<RecordRejection>), FileError> {
    let extraction = extractor.extract(file).await?;
    outcome.method = Some(extraction.method);
    debug!(
        "{}: {} chars via {}",
        file.name,
        extraction.text.len(),
        extraction.method
    );

    let objects = interpreter
        .interpret(&extraction.text, &file.name)
        .await
        .map_err(|detail| FileError::InterpretationFailed {
            file: file.name.clone(),
            detail,
        })?;

    let mut records = Vec::with_capacity(objects.len());
    let mut rejected = Vec::new();
    for (idx, obj) in objects.iter().enumerate() {
        match record_from_json(obj, idx, &file.name, extraction.method) {
            Ok(record) => records.push(record),
            Err(rejection) => {
                warn!("Discarding {}", rejection);
                rejected.push(rejection);
            }
        }
    }
    info!(
        "{}: {} records ({} discarded) via {}",
        file.name,
        records.len(),
        rejected.len(),
        extraction.method
    );
    Ok((records, rejected))
}

async fn build_stages(
    config: &IngestConfig,
) -> Result<(TextExtractor, Arc<dyn RecordInterpreter>), IngestError> {
    // Resolved at most once, and only if some stage needs it.
    let provider: OnceCell<Arc<dyn LLMProvider>> = OnceCell::new();

    let interpreter: Arc<dyn RecordInterpreter> = match &config.interpreter {
        Some(interpreter) => Arc::clone(interpreter),
        None => {
            let p = provider.get_or_try_init(|| resolve_provider(config)).await?;
            Arc::new(LlmInterpreter::new(Arc::clone(p), config))
        }
    };

    let ocr: Arc<dyn OcrEngine> = match (&config.ocr_engine, config.ocr_backend) {
        (Some(engine), _) => Arc::clone(engine),
        (None, OcrBackend::Tesseract) => Arc::new(TesseractOcr::new(config)),
        (None, OcrBackend::Vision) => {
            let p = provider.get_or_try_init(|| resolve_provider(config)).await?;
            Arc::new(VisionOcr::new(Arc::clone(p), config))
        }
    };

    let text_layer: Arc<dyn TextLayer> = match &config.text_layer {
        Some(layer) => Arc::clone(layer),
        None => Arc::new(PdfiumTextLayer::new(config.pdfium_lib_path.clone())),
    };

    let extractor = TextExtractor::new(text_layer, ocr, ReadabilityPolicy::from_config(config));
    Ok((extractor, interpreter))
}

async fn remove_processed(outcomes: &[FileOutcome]) {
    for outcome in outcomes.iter().filter(|o| o.is_success()) {
        match tokio::fs::remove_file(&outcome.path).await {
            Ok(()) => debug!("Removed {}", outcome.path.display()),
            Err(e) => warn!("Could not remove {}: {}", outcome.path.display(), e),
        }
    }
}

/// Instantiate a named provider with the given model.
fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, IngestError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        IngestError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`): used as-is.
/// 2. **Named provider + model** (`config.provider_name`): built with
///    [`ProviderFactory::create_llm_provider`], which reads the matching API
///    key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`):
///    honoured before auto-detection so the model choice survives when
///    several API keys are present.
/// 4. **OpenAI key** (`OPENAI_API_KEY`): preferred over other detected keys.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
async fn resolve_provider(config: &IngestConfig) -> Result<Arc<dyn LLMProvider>, IngestError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| IngestError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
