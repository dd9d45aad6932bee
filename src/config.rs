//! Configuration for an ingestion run.
//!
//! Every knob lives in [`IngestConfig`], built via [`IngestConfigBuilder`].
//! The config is created once at startup and passed by reference into the
//! orchestrator; nothing in the library reads process-wide mutable state
//! except the provider auto-detection fallback in
//! [`crate::aggregate`], which only runs when no provider was configured.

use crate::error::IngestError;
use crate::pipeline::extract::TextLayer;
use crate::pipeline::llm::RecordInterpreter;
use crate::pipeline::ocr::OcrEngine;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for one batch run.
///
/// # Example
/// ```rust
/// use timesheet_ingest::{IngestConfig, OcrBackend};
///
/// let config = IngestConfig::builder()
///     .output_dir("reports")
///     .ocr_backend(OcrBackend::Tesseract)
///     .tesseract_langs("heb+eng")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct IngestConfig {
    /// Directory the dated reports are written to. Default: `downloads/reports`.
    pub output_dir: PathBuf,

    /// Optional master roster (JSON) for name matching and hours validation.
    pub roster_path: Option<PathBuf>,

    /// Directory holding the pdfium shared library. `None` falls back to
    /// `PDFIUM_LIB_PATH`, then the system library search path.
    pub pdfium_lib_path: Option<PathBuf>,

    // ── Extraction ───────────────────────────────────────────────────────
    /// Minimum non-whitespace characters for a text layer to count as readable. Default: 80.
    pub min_text_chars: usize,

    /// Minimum share of alphabetic characters in a readable text layer. Default: 0.03.
    pub min_letter_ratio: f64,

    /// OCR engine used when the text layer is unreadable. Default: [`OcrBackend::Vision`].
    pub ocr_backend: OcrBackend,

    /// Rendering DPI for OCR rasterisation. Range: 72–400. Default: 200.
    pub dpi: u32,

    /// Longest edge of a rendered page in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Tesseract language list. Default: `heb+eng`.
    pub tesseract_langs: String,

    /// Pre-constructed text-layer reader. Takes precedence over pdfium.
    pub text_layer: Option<Arc<dyn TextLayer>>,

    /// Pre-constructed OCR engine. Takes precedence over `ocr_backend`.
    pub ocr_engine: Option<Arc<dyn OcrEngine>>,

    // ── Interpretation ───────────────────────────────────────────────────
    /// Pre-constructed interpreter. Takes precedence over every LLM setting.
    pub interpreter: Option<Arc<dyn RecordInterpreter>>,

    /// LLM model identifier. If None, uses `gpt-4o-mini`.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0 (extraction must be deterministic).
    pub temperature: f32,

    /// Maximum tokens per LLM response. Default: 2048.
    pub max_tokens: usize,

    /// Maximum retry attempts on a failed LLM call. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-LLM-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Custom system prompt for record extraction.
    pub system_prompt: Option<String>,

    // ── Reconciliation ───────────────────────────────────────────────────
    /// Minimum fuzzy similarity for a roster name match. Default: 0.8.
    pub name_match_threshold: f64,

    /// Allowed deviation from standard hours, in percent. Default: 10.
    pub hours_tolerance_percent: f64,

    // ── Housekeeping ─────────────────────────────────────────────────────
    /// Delete successfully processed input files after the reports are written.
    pub remove_processed: bool,

    /// Per-file progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("downloads/reports"),
            roster_path: None,
            pdfium_lib_path: None,
            min_text_chars: 80,
            min_letter_ratio: 0.03,
            ocr_backend: OcrBackend::default(),
            dpi: 200,
            max_rendered_pixels: 2000,
            tesseract_langs: "heb+eng".to_string(),
            text_layer: None,
            ocr_engine: None,
            interpreter: None,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 2048,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            system_prompt: None,
            name_match_threshold: 0.8,
            hours_tolerance_percent: 10.0,
            remove_processed: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestConfig")
            .field("output_dir", &self.output_dir)
            .field("roster_path", &self.roster_path)
            .field("min_text_chars", &self.min_text_chars)
            .field("min_letter_ratio", &self.min_letter_ratio)
            .field("ocr_backend", &self.ocr_backend)
            .field("ocr_engine", &self.ocr_engine.as_ref().map(|_| "<dyn OcrEngine>"))
            .field("interpreter", &self.interpreter.as_ref().map(|_| "<dyn RecordInterpreter>"))
            .field("dpi", &self.dpi)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("name_match_threshold", &self.name_match_threshold)
            .field("hours_tolerance_percent", &self.hours_tolerance_percent)
            .field("remove_processed", &self.remove_processed)
            .finish()
    }
}

impl IngestConfig {
    /// Create a new builder for `IngestConfig`.
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`IngestConfig`].
#[derive(Debug)]
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn roster_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.roster_path = Some(path.into());
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn min_text_chars(mut self, n: usize) -> Self {
        self.config.min_text_chars = n;
        self
    }

    pub fn min_letter_ratio(mut self, ratio: f64) -> Self {
        self.config.min_letter_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    pub fn ocr_backend(mut self, backend: OcrBackend) -> Self {
        self.config.ocr_backend = backend;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn tesseract_langs(mut self, langs: impl Into<String>) -> Self {
        self.config.tesseract_langs = langs.into();
        self
    }

    pub fn text_layer(mut self, reader: Arc<dyn TextLayer>) -> Self {
        self.config.text_layer = Some(reader);
        self
    }

    pub fn ocr_engine(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.config.ocr_engine = Some(engine);
        self
    }

    pub fn interpreter(mut self, interpreter: Arc<dyn RecordInterpreter>) -> Self {
        self.config.interpreter = Some(interpreter);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn name_match_threshold(mut self, threshold: f64) -> Self {
        self.config.name_match_threshold = threshold;
        self
    }

    pub fn hours_tolerance_percent(mut self, pct: f64) -> Self {
        self.config.hours_tolerance_percent = pct;
        self
    }

    pub fn remove_processed(mut self, v: bool) -> Self {
        self.config.remove_processed = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IngestConfig, IngestError> {
        let c = &self.config;
        if !(0.0..=1.0).contains(&c.name_match_threshold) {
            return Err(IngestError::InvalidConfig(format!(
                "name match threshold must be 0.0–1.0, got {}",
                c.name_match_threshold
            )));
        }
        if c.hours_tolerance_percent < 0.0 {
            return Err(IngestError::InvalidConfig(format!(
                "hours tolerance must be ≥ 0, got {}",
                c.hours_tolerance_percent
            )));
        }
        if c.api_timeout_secs == 0 {
            return Err(IngestError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.tesseract_langs.trim().is_empty() {
            return Err(IngestError::InvalidConfig(
                "tesseract language list is empty".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Which OCR engine reads pages whose text layer is unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OcrBackend {
    /// Rasterise with pdfium and transcribe each page with a vision LLM. (default)
    #[default]
    Vision,
    /// Rasterise with pdfium and run the `tesseract` CLI on each page.
    Tesseract,
}
