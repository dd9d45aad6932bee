//! OCR engines for scanned or garbled PDFs.
//!
//! Both engines rasterise pages with pdfium ([`super::render`]) and differ
//! only in who reads the pixels:
//!
//! - [`VisionOcr`] sends each page as a base64 PNG to a vision LLM.
//! - [`TesseractOcr`] writes each page to a temporary PNG and runs the
//!   `tesseract` CLI on it.
//!
//! ## Why PNG?
//!
//! Lossless compression preserves text crispness. JPEG artefacts around thin
//! table rules and small Hebrew glyphs degrade recognition at low DPI.
//!
//! Page texts are joined with newlines in page order and cleaned with
//! [`super::postprocess::clean_ocr_text`].

use crate::config::IngestConfig;
use crate::pipeline::llm::{chat_with_retry, CallPolicy};
use crate::pipeline::postprocess::clean_ocr_text;
use crate::pipeline::render::render_pages;
use crate::prompts::OCR_TRANSCRIBE_PROMPT;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, ImageData, LLMProvider};
use image::DynamicImage;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Recognises the text of a PDF that has no usable text layer.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Short engine name for logs.
    fn name(&self) -> &str;

    /// Return the recognised text of every page, joined with newlines.
    async fn recognize(&self, path: &Path) -> Result<String, String>;
}

/// Rasterisation settings shared by both engines.
#[derive(Debug, Clone)]
struct RenderSettings {
    lib_dir: Option<PathBuf>,
    dpi: u32,
    max_pixels: u32,
}

impl RenderSettings {
    fn from_config(config: &IngestConfig) -> Self {
        Self {
            lib_dir: config.pdfium_lib_path.clone(),
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
        }
    }

    async fn render(&self, path: &Path) -> Result<Vec<DynamicImage>, String> {
        let pages = render_pages(path, self.lib_dir.clone(), self.dpi, self.max_pixels).await?;
        if pages.is_empty() {
            return Err("PDF has no pages".to_string());
        }
        Ok(pages)
    }
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, String> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| format!("PNG encoding failed: {}", e))?;
    Ok(buf)
}

/// Encode a rendered page as a base64 PNG attachment.
///
/// `detail: "high"` lets GPT-4-class models tile the page at full
/// resolution; the low-detail single tile loses the small print in
/// attendance tables.
fn encode_page(img: &DynamicImage) -> Result<ImageData, String> {
    let b64 = STANDARD.encode(encode_png(img)?);
    debug!("Encoded page → {} bytes base64", b64.len());
    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

fn join_pages(pages: Vec<String>) -> String {
    clean_ocr_text(&pages.join("\n"))
}

// ── Vision LLM ──────────────────────────────────────────────────────────────

/// Transcribes rendered pages with a vision-capable LLM.
pub struct VisionOcr {
    provider: Arc<dyn LLMProvider>,
    policy: CallPolicy,
    render: RenderSettings,
}

impl VisionOcr {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &IngestConfig) -> Self {
        Self {
            provider,
            policy: CallPolicy::from_config(config),
            render: RenderSettings::from_config(config),
        }
    }
}

#[async_trait]
impl OcrEngine for VisionOcr {
    fn name(&self) -> &str {
        "vision"
    }

    async fn recognize(&self, path: &Path) -> Result<String, String> {
        let pages = self.render.render(path).await?;
        let file = path.display().to_string();
        info!("Vision OCR on {} ({} pages)", file, pages.len());

        let mut texts = Vec::with_capacity(pages.len());
        for (idx, page) in pages.iter().enumerate() {
            let image = encode_page(page)?;
            let messages = vec![
                ChatMessage::system(OCR_TRANSCRIBE_PROMPT),
                ChatMessage::user_with_images("", vec![image]),
            ];
            let label = format!("{} page {}", file, idx + 1);
            let text = chat_with_retry(&self.provider, &messages, &self.policy, &label)
                .await
                .map_err(|e| format!("page {}: {}", idx + 1, e))?;
            texts.push(text);
        }
        Ok(join_pages(texts))
    }
}

// ── Tesseract ───────────────────────────────────────────────────────────────

/// Runs the `tesseract` CLI on rendered pages.
pub struct TesseractOcr {
    langs: String,
    render: RenderSettings,
}

impl TesseractOcr {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            langs: config.tesseract_langs.clone(),
            render: RenderSettings::from_config(config),
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, path: &Path) -> Result<String, String> {
        let pages = self.render.render(path).await?;
        info!("Tesseract OCR on {} ({} pages)", path.display(), pages.len());

        let temp_dir = tempfile::tempdir().map_err(|e| format!("cannot create temp dir: {}", e))?;
        let mut texts = Vec::with_capacity(pages.len());

        for (idx, page) in pages.iter().enumerate() {
            let png = temp_dir.path().join(format!("page-{:03}.png", idx + 1));
            tokio::fs::write(&png, encode_png(page)?)
                .await
                .map_err(|e| format!("cannot write {}: {}", png.display(), e))?;

            let output = tokio::process::Command::new("tesseract")
                .arg(&png)
                .arg("stdout")
                .args(["-l", &self.langs])
                .output()
                .await
                .map_err(|e| format!("failed to launch tesseract: {}", e))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(format!(
                    "tesseract failed on page {}: {}",
                    idx + 1,
                    stderr.trim()
                ));
            }
            texts.push(String::from_utf8_lossy(&output.stdout).into_owned());
        }
        Ok(join_pages(texts))
    }
}
