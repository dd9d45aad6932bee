//! pdfium access: read the embedded text layer and rasterise pages for OCR.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto a dedicated thread pool
//! thread, so the runtime keeps servicing LLM requests while a scanned
//! attachment is being rendered.
//!
//! ## Why cap pixels as well as DPI?
//!
//! Timesheets arrive as anything from A4 scans to A3 landscape exports.
//! `max_rendered_pixels` caps the longest edge regardless of physical size,
//! keeping memory bounded and the image inside the vision-model sweet spot.
//!
//! Errors are returned as detail strings: every failure here is per file and
//! ends up inside [`crate::error::FileError`].

use crate::error::IngestError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Bind to pdfium from `lib_dir`, then `PDFIUM_LIB_PATH`, then the system
/// library search path.
pub fn bind_pdfium(lib_dir: Option<&Path>) -> Result<Pdfium, IngestError> {
    let dir = lib_dir
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

    let bindings = match dir {
        Some(dir) => {
            debug!("Binding pdfium from {}", dir.display());
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
        }
        None => Pdfium::bind_to_system_library(),
    };

    bindings
        .map(Pdfium::new)
        .map_err(|e| IngestError::PdfiumBindingFailed(format!("{:?}", e)))
}

fn open_document<'a>(pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, String> {
    pdfium.load_pdf_from_file(path, None).map_err(|e| {
        let detail = format!("{:?}", e);
        if detail.to_ascii_lowercase().contains("password") {
            "PDF is password-protected".to_string()
        } else {
            format!("corrupt or unreadable PDF: {}", detail)
        }
    })
}

/// Read the embedded text layer of every page, one page per line block.
pub async fn extract_text_layer(path: &Path, lib_dir: Option<PathBuf>) -> Result<String, String> {
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium(lib_dir.as_deref()).map_err(|e| e.to_string())?;
        let document = open_document(&pdfium, &path)?;

        let mut out = String::new();
        for (idx, page) in document.pages().iter().enumerate() {
            let text = page
                .text()
                .map_err(|e| format!("page {}: text layer unavailable: {:?}", idx + 1, e))?;
            out.push_str(&text.all());
            out.push('\n');
        }
        debug!("Text layer of {}: {} chars", path.display(), out.len());
        Ok(out)
    })
    .await
    .map_err(|e| format!("text-layer task panicked: {}", e))?
}

/// Rasterise every page of a PDF for OCR.
pub async fn render_pages(
    path: &Path,
    lib_dir: Option<PathBuf>,
    dpi: u32,
    max_pixels: u32,
) -> Result<Vec<DynamicImage>, String> {
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium(lib_dir.as_deref()).map_err(|e| e.to_string())?;
        let document = open_document(&pdfium, &path)?;

        let pages = document.pages();
        info!("Rendering {} pages of {}", pages.len(), path.display());

        // PDF user space is 72 units per inch.
        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(dpi as f32 / 72.0)
            .set_maximum_width(max_pixels as i32)
            .set_maximum_height(max_pixels as i32);

        let mut images = Vec::with_capacity(pages.len() as usize);
        for (idx, page) in pages.iter().enumerate() {
            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| format!("page {}: rasterisation failed: {:?}", idx + 1, e))?;
            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            images.push(image);
        }
        Ok(images)
    })
    .await
    .map_err(|e| format!("render task panicked: {}", e))?
}
