//! Text extraction: raw file → plain text plus the method that produced it.
//!
//! ## Fallback order
//!
//! Spreadsheets and delimited text are read directly; there is nothing to
//! fall back to. PDFs try the embedded text layer first because it is free
//! and exact. Only when it is missing, broken, or unreadable does the
//! extractor pay for OCR.
//!
//! ## What counts as unreadable?
//!
//! Scanned timesheets often carry a junk text layer: a handful of page
//! numbers, or thousands of `:` and `/` from the table grid with almost no
//! letters. [`ReadabilityPolicy`] rejects those so they go to OCR instead of
//! reaching the interpreter as noise.

use crate::config::IngestConfig;
use crate::error::FileError;
use crate::pipeline::input::{FileKind, InputFile};
use crate::pipeline::ocr::OcrEngine;
use crate::pipeline::render::extract_text_layer;
use crate::pipeline::tabular::{read_delimited, read_spreadsheet};
use crate::record::ExtractionMethod;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reads the embedded text layer of a PDF.
#[async_trait]
pub trait TextLayer: Send + Sync {
    async fn read(&self, path: &Path) -> Result<String, String>;
}

/// [`TextLayer`] backed by pdfium.
pub struct PdfiumTextLayer {
    lib_dir: Option<PathBuf>,
}

impl PdfiumTextLayer {
    pub fn new(lib_dir: Option<PathBuf>) -> Self {
        Self { lib_dir }
    }
}

#[async_trait]
impl TextLayer for PdfiumTextLayer {
    async fn read(&self, path: &Path) -> Result<String, String> {
        extract_text_layer(path, self.lib_dir.clone()).await
    }
}

// ── Readability ──────────────────────────────────────────────────────────────

/// Above this many grid-artifact characters a layer needs real letters too.
const ARTIFACT_LIMIT: usize = 200;

/// Decides whether a text layer is good enough to skip OCR.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadabilityPolicy {
    pub min_text_chars: usize,
    pub min_letter_ratio: f64,
}

impl Default for ReadabilityPolicy {
    fn default() -> Self {
        Self {
            min_text_chars: 80,
            min_letter_ratio: 0.03,
        }
    }
}

impl ReadabilityPolicy {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            min_text_chars: config.min_text_chars,
            min_letter_ratio: config.min_letter_ratio,
        }
    }

    /// `Some(reason)` when `text` should be sent to OCR instead.
    pub fn unreadable_reason(&self, text: &str) -> Option<String> {
        let visible = text.chars().filter(|c| !c.is_whitespace()).count();
        if visible < self.min_text_chars {
            return Some(format!(
                "{} visible characters (< {})",
                visible, self.min_text_chars
            ));
        }

        let total = text.chars().count();
        let letters = text.chars().filter(|c| c.is_alphabetic()).count();
        let ratio = letters as f64 / total as f64;
        if ratio < self.min_letter_ratio {
            return Some(format!("letter ratio {:.3} (< {})", ratio, self.min_letter_ratio));
        }

        let artifacts = text
            .chars()
            .filter(|c| matches!(c, ':' | '/' | '\\' | '*'))
            .count();
        if artifacts > ARTIFACT_LIMIT && letters < ARTIFACT_LIMIT {
            return Some(format!(
                "{} grid artifacts with only {} letters",
                artifacts, letters
            ));
        }

        None
    }

    pub fn is_readable(&self, text: &str) -> bool {
        self.unreadable_reason(text).is_none()
    }
}

// ── Extractor ────────────────────────────────────────────────────────────────

/// Extracted text and how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub text: String,
    pub method: ExtractionMethod,
}

/// Runs the per-format extraction strategy for one file at a time.
pub struct TextExtractor {
    text_layer: Arc<dyn TextLayer>,
    ocr: Arc<dyn OcrEngine>,
    policy: ReadabilityPolicy,
}

impl TextExtractor {
    pub fn new(
        text_layer: Arc<dyn TextLayer>,
        ocr: Arc<dyn OcrEngine>,
        policy: ReadabilityPolicy,
    ) -> Self {
        Self {
            text_layer,
            ocr,
            policy,
        }
    }

    /// Extract text from one file.
    ///
    /// Fails with [`FileError::ExtractionFailed`] when every applicable path
    /// fails or yields no text.
    pub async fn extract(&self, file: &InputFile) -> Result<Extraction, FileError> {
        let failed = |detail: String| FileError::ExtractionFailed {
            file: file.name.clone(),
            detail,
        };

        let extraction = match file.kind {
            FileKind::Spreadsheet | FileKind::Delimited => {
                let path = file.path.clone();
                let kind = file.kind;
                let text = tokio::task::spawn_blocking(move || match kind {
                    FileKind::Spreadsheet => read_spreadsheet(&path),
                    _ => read_delimited(&path),
                })
                .await
                .map_err(|e| failed(format!("tabular reader panicked: {}", e)))?
                .map_err(failed)?;
                Extraction {
                    text,
                    method: ExtractionMethod::Tabular,
                }
            }
            FileKind::Pdf => self.extract_pdf(file).await.map_err(failed)?,
        };

        if !has_content(&extraction.text) {
            return Err(failed(format!("{} extraction produced no text", extraction.method)));
        }
        Ok(extraction)
    }

    async fn extract_pdf(&self, file: &InputFile) -> Result<Extraction, String> {
        let layer_problem = match self.text_layer.read(&file.path).await {
            Ok(text) => match self.policy.unreadable_reason(&text) {
                None => {
                    debug!("{}: text layer readable ({} chars)", file.name, text.len());
                    return Ok(Extraction {
                        text,
                        method: ExtractionMethod::TextLayer,
                    });
                }
                Some(reason) => reason,
            },
            Err(e) => e,
        };

        info!(
            "{}: text layer unusable ({}), falling back to {} OCR",
            file.name,
            layer_problem,
            self.ocr.name()
        );

        let text = self.ocr.recognize(&file.path).await.map_err(|e| {
            warn!("{}: OCR failed: {}", file.name, e);
            format!("text layer: {}; OCR: {}", layer_problem, e)
        })?;
        Ok(Extraction {
            text,
            method: ExtractionMethod::Ocr,
        })
    }
}

/// Tabular output always carries sheet headers; those alone are not content.
fn has_content(text: &str) -> bool {
    text.lines()
        .any(|line| !line.trim().is_empty() && !line.starts_with("--- Sheet: "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const READABLE: &str = "Monthly attendance report\nEmployee: Dana Levi\nID: 3141\n\
        Total presence hours: 182.5\nOvertime hours: 12\nVacation days: 2\n";

    struct FixedLayer(Result<String, String>);

    #[async_trait]
    impl TextLayer for FixedLayer {
        async fn read(&self, _path: &Path) -> Result<String, String> {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct CountingOcr {
        calls: AtomicUsize,
        reply: Option<String>,
    }

    #[async_trait]
    impl OcrEngine for CountingOcr {
        fn name(&self) -> &str {
            "stub"
        }

        async fn recognize(&self, _path: &Path) -> Result<String, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone().ok_or_else(|| "engine offline".to_string())
        }
    }

    fn pdf() -> InputFile {
        InputFile::from_path("/tmp/march.pdf").unwrap()
    }

    fn extractor(layer: Result<String, String>, ocr: Arc<CountingOcr>) -> TextExtractor {
        TextExtractor::new(
            Arc::new(FixedLayer(layer)),
            ocr,
            ReadabilityPolicy::default(),
        )
    }

    #[test]
    fn short_text_is_unreadable() {
        let policy = ReadabilityPolicy::default();
        assert!(!policy.is_readable("Page 1 of 2"));
        assert!(policy.is_readable(READABLE));
    }

    #[test]
    fn low_letter_ratio_is_unreadable() {
        let policy = ReadabilityPolicy::default();
        let digits = "12:30 ".repeat(40);
        let reason = policy.unreadable_reason(&digits).unwrap();
        assert!(reason.contains("letter ratio"), "got: {reason}");
    }

    #[test]
    fn grid_artifacts_are_unreadable() {
        let policy = ReadabilityPolicy::default();
        let text = format!("{}{}", "a/:*".repeat(120), "Name ".repeat(10));
        let reason = policy.unreadable_reason(&text).unwrap();
        assert!(reason.contains("grid artifacts"), "got: {reason}");
    }

    #[tokio::test]
    async fn readable_text_layer_skips_ocr() {
        let ocr = Arc::new(CountingOcr::default());
        let ex = extractor(Ok(READABLE.to_string()), Arc::clone(&ocr));

        let out = ex.extract(&pdf()).await.unwrap();
        assert_eq!(out.method, ExtractionMethod::TextLayer);
        assert_eq!(out.text, READABLE);
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_text_layer_falls_back_to_ocr() {
        let ocr = Arc::new(CountingOcr {
            reply: Some("Dana Levi 182.5".into()),
            ..Default::default()
        });
        let ex = extractor(Ok(String::new()), Arc::clone(&ocr));

        let out = ex.extract(&pdf()).await.unwrap();
        assert_eq!(out.method, ExtractionMethod::Ocr);
        assert_eq!(out.text, "Dana Levi 182.5");
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn text_layer_error_falls_back_to_ocr() {
        let ocr = Arc::new(CountingOcr {
            reply: Some("Dana Levi 182.5".into()),
            ..Default::default()
        });
        let ex = extractor(Err("corrupt or unreadable PDF".into()), Arc::clone(&ocr));

        let out = ex.extract(&pdf()).await.unwrap();
        assert_eq!(out.method, ExtractionMethod::Ocr);
    }

    #[tokio::test]
    async fn both_paths_failing_is_extraction_failure() {
        let ocr = Arc::new(CountingOcr::default());
        let ex = extractor(Ok(String::new()), ocr);

        let err = ex.extract(&pdf()).await.unwrap_err();
        match err {
            FileError::ExtractionFailed { file, detail } => {
                assert_eq!(file, "march.pdf");
                assert!(detail.contains("engine offline"), "got: {detail}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_ocr_result_is_extraction_failure() {
        let ocr = Arc::new(CountingOcr {
            reply: Some("   \n".into()),
            ..Default::default()
        });
        let ex = extractor(Ok(String::new()), ocr);

        assert!(matches!(
            ex.extract(&pdf()).await,
            Err(FileError::ExtractionFailed { .. })
        ));
    }

    #[tokio::test]
    async fn csv_is_tabular_and_never_touches_pdf_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("april.csv");
        std::fs::write(&path, "Name,Hours\nDana Levi,160\n").unwrap();

        let ocr = Arc::new(CountingOcr::default());
        let ex = extractor(Err("unused".into()), Arc::clone(&ocr));

        let out = ex.extract(&InputFile::from_path(&path).unwrap()).await.unwrap();
        assert_eq!(out.method, ExtractionMethod::Tabular);
        assert!(out.text.contains("Dana Levi\t160"));
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn header_only_csv_has_no_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, "\n\n").unwrap();

        let ex = extractor(Err("unused".into()), Arc::new(CountingOcr::default()));
        assert!(ex.extract(&InputFile::from_path(&path).unwrap()).await.is_err());
    }
}
