//! CLI binary for timesheet-ingest.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `IngestConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use timesheet_ingest::{
    run, run_to_dir, IngestConfig, IngestProgressCallback, OcrBackend, ProgressCallback, RunOutput,
};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch and a log line per file.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Start of the file currently being processed.
    current: Mutex<Option<Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Scanning attachments…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            current: Mutex::new(None),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.current
            .lock()
            .ok()
            .and_then(|mut guard| guard.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl IngestProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_files: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total_files as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Ingesting");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_files} attachments…"))
        ));
    }

    fn on_file_start(&self, _index: usize, _total: usize, file: &str) {
        if let Ok(mut guard) = self.current.lock() {
            *guard = Some(Instant::now());
        }
        self.bar.set_message(file.to_string());
    }

    fn on_file_complete(&self, index: usize, total: usize, file: &str, records: usize) {
        let secs = self.elapsed_secs();
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {}  {}  {}",
            green("✓"),
            index,
            total,
            file,
            dim(&format!("{records} records")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, index: usize, total: usize, file: &str, error: &str) {
        let secs = self.elapsed_secs();
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3} {}  {}  {}",
            red("✗"),
            index,
            total,
            file,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_files: usize, success_count: usize, canonical_records: usize) {
        let failed = total_files.saturating_sub(success_count);
        self.bar.finish_and_clear();

        eprintln!(
            "{} {}/{} files processed → {} employees{}",
            if failed == 0 { green("✔") } else { cyan("⚠") },
            bold(&success_count.to_string()),
            total_files,
            bold(&canonical_records.to_string()),
            if failed == 0 {
                String::new()
            } else {
                format!("  ({} skipped)", red(&failed.to_string()))
            },
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Process downloaded attachments, write dated reports
  timesheet-ingest downloads/attachments

  # Validate against the master roster
  timesheet-ingest downloads/attachments --roster master_employee.json

  # Use local tesseract instead of a vision model for scanned PDFs
  timesheet-ingest downloads/attachments --ocr tesseract

  # Inspect results without writing anything
  timesheet-ingest downloads/attachments --dry-run --json > run.json

OUTPUT FILES:
  <output-dir>/timesheet_summary_<YYYY-MM-DD>.csv   one row per employee
  <output-dir>/hours_summary_<YYYY-MM-DD>.csv       roster validation (with --roster)

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Directory containing libpdfium
  RUST_LOG                Log filter (overrides -v / -q)
"#;

/// Extract, deduplicate and report employee timesheets.
#[derive(Parser, Debug)]
#[command(
    name = "timesheet-ingest",
    version,
    about = "Extract, deduplicate and report employee timesheets",
    long_about = "Read every timesheet attachment (PDF, scanned PDF, Excel, CSV) in a directory, \
extract one record per employee with an LLM, merge duplicate partial records, and write a \
dated CSV report. Files that cannot be read are skipped and listed at the end.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory holding the downloaded attachments.
    input_dir: PathBuf,

    /// Directory for the dated reports.
    #[arg(short, long, env = "TIMESHEET_OUTPUT_DIR", default_value = "downloads/reports")]
    output_dir: PathBuf,

    /// Master roster JSON for name matching and hours validation.
    #[arg(long, env = "TIMESHEET_ROSTER")]
    roster: Option<PathBuf>,

    /// OCR engine for scanned PDFs.
    #[arg(long, env = "TIMESHEET_OCR", value_enum, default_value = "vision")]
    ocr: OcrArg,

    /// Tesseract language list.
    #[arg(long, env = "TIMESHEET_TESSERACT_LANGS", default_value = "heb+eng")]
    tesseract_langs: String,

    /// LLM model ID (e.g. gpt-4o-mini, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI for OCR (72–400).
    #[arg(long, env = "TIMESHEET_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Directory containing the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Minimum visible characters for a PDF text layer to skip OCR.
    #[arg(long, env = "TIMESHEET_MIN_TEXT_CHARS", default_value_t = 80)]
    min_text_chars: usize,

    /// Retries per LLM call.
    #[arg(long, env = "TIMESHEET_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "TIMESHEET_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Path to a text file containing a custom extraction prompt.
    #[arg(long, env = "TIMESHEET_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Minimum fuzzy similarity for roster name matches (0.0–1.0).
    #[arg(long, env = "TIMESHEET_NAME_THRESHOLD", default_value_t = 0.8)]
    name_threshold: f64,

    /// Allowed deviation from standard hours, in percent.
    #[arg(long, env = "TIMESHEET_HOURS_TOLERANCE", default_value_t = 10.0)]
    hours_tolerance: f64,

    /// Print the run output as JSON on stdout.
    #[arg(long, env = "TIMESHEET_JSON")]
    json: bool,

    /// Process and print, but write no reports and remove nothing.
    #[arg(long)]
    dry_run: bool,

    /// Delete successfully processed attachments after the reports are written.
    #[arg(long, env = "TIMESHEET_REMOVE_PROCESSED")]
    remove_processed: bool,

    /// Disable progress bar.
    #[arg(long, env = "TIMESHEET_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "TIMESHEET_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "TIMESHEET_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OcrArg {
    Vision,
    Tesseract,
}

impl From<OcrArg> for OcrBackend {
    fn from(v: OcrArg) -> Self {
        match v {
            OcrArg::Vision => OcrBackend::Vision,
            OcrArg::Tesseract => OcrBackend::Tesseract,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn IngestProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    let output = if cli.dry_run {
        run(&cli.input_dir, &config).await.context("Run failed")?
    } else {
        run_to_dir(&cli.input_dir, &config, &[])
            .await
            .context("Run failed")?
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if cli.dry_run {
        print_records(&output);
    }

    if !cli.quiet {
        report(&output, show_progress);
    }

    Ok(())
}

/// Map CLI args to `IngestConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<IngestConfig> {
    let mut builder = IngestConfig::builder()
        .output_dir(&cli.output_dir)
        .ocr_backend(cli.ocr.into())
        .tesseract_langs(&cli.tesseract_langs)
        .dpi(cli.dpi)
        .min_text_chars(cli.min_text_chars)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .name_match_threshold(cli.name_threshold)
        .hours_tolerance_percent(cli.hours_tolerance)
        .remove_processed(cli.remove_processed && !cli.dry_run);

    if let Some(ref path) = cli.roster {
        builder = builder.roster_path(path);
    }
    if let Some(ref path) = cli.pdfium_lib_path {
        builder = builder.pdfium_lib_path(path);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Dry-run listing of merged records on stdout.
fn print_records(output: &RunOutput) {
    for record in &output.records {
        let hours = record
            .hours
            .total_presence_hours
            .map(|h| format!("{h}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<28} {:<12} {:<10} {:>8}  {}",
            record.employee_name.as_deref().unwrap_or("-"),
            record.employee_id.as_deref().unwrap_or("-"),
            record.period.as_deref().unwrap_or("-"),
            hours,
            record.source_files.join(", "),
        );
    }
}

/// Final summary on stderr: written files, skipped files, discarded records.
fn report(output: &RunOutput, progress_shown: bool) {
    let stats = &output.stats;
    if !progress_shown {
        eprintln!(
            "Processed {}/{} files in {}ms → {} employees",
            stats.processed_files,
            stats.total_files,
            stats.total_duration_ms,
            stats.canonical_records
        );
    }

    for path in &output.written {
        eprintln!("   {} {}", dim("wrote"), bold(&path.display().to_string()));
    }

    if stats.skipped_files > 0 {
        eprintln!("{} Skipped files:", cyan("⚠"));
        eprint!("{}", output.skipped_summary());
    }
    if stats.rejected_records > 0 {
        eprintln!(
            "   {} records discarded (no name or ID)",
            dim(&stats.rejected_records.to_string())
        );
    }
}
