//! Pipeline stages for timesheet ingestion.
//!
//! Each submodule implements exactly one step, so each is independently
//! testable and the two external boundaries (OCR and the interpreter) can be
//! swapped without touching the rest.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──────────────────────────▶ llm ──▶ record
//! (discover)  ├─ tabular (calamine / csv)       (JSON)   (schema)
//!             └─ render (pdfium text layer)
//!                  └─ ocr (vision LLM / tesseract)
//! ```
//!
//! 1. [`input`]: list and classify attachment files
//! 2. [`extract`]: per-format strategy with the readability fallback
//! 3. [`tabular`]: spreadsheets and delimited text to tab-separated text
//! 4. [`render`]: pdfium text layer and page rasterisation; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 5. [`ocr`]: recognise rendered pages
//! 6. [`llm`]: interpreter boundary with retry/backoff; the only stage
//!    with network I/O besides vision OCR
//! 7. [`postprocess`]: deterministic cleanup of OCR text and model replies

pub mod extract;
pub mod input;
pub mod llm;
pub mod ocr;
pub mod postprocess;
pub mod render;
pub mod tabular;
