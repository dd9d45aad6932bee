//! Input discovery: list candidate attachments in a directory and classify them.
//!
//! ## Why classify by extension?
//!
//! The attachments come from a mailbox download step that preserves the
//! sender's file names, so the extension is the best signal we have before
//! opening the file. A PDF whose bytes do not start with `%PDF` is still
//! classified as a PDF here; the extractor reports it as an extraction
//! failure, which keeps the skipped-file summary honest about *why* it
//! was skipped.

use crate::error::IngestError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Declared type of an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// `.pdf`: text layer first, OCR on failure.
    Pdf,
    /// `.xlsx`, `.xls`, `.xlsm`, `.ods`: read every sheet with calamine.
    Spreadsheet,
    /// `.csv`, `.tsv`, `.txt`: read with the csv crate.
    Delimited,
}

impl FileKind {
    /// Classify a path by its (case-insensitive) extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(FileKind::Pdf),
            "xlsx" | "xls" | "xlsm" | "ods" => Some(FileKind::Spreadsheet),
            "csv" | "tsv" | "txt" => Some(FileKind::Delimited),
            _ => None,
        }
    }
}

/// A discovered input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub path: PathBuf,
    /// File name, used as `source_file` on every record extracted from it.
    pub name: String,
    pub kind: FileKind,
}

impl InputFile {
    /// Build an `InputFile` for an explicit path, or `None` if unsupported.
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let kind = FileKind::from_path(&path)?;
        let name = path.file_name()?.to_string_lossy().into_owned();
        Some(Self { path, name, kind })
    }
}

/// Files the pipeline writes itself or that the OS drops next to downloads.
fn is_ignored(name: &str) -> bool {
    name.starts_with('.') || name.contains("_parsed")
}

/// List supported files in `dir`, sorted by file name.
///
/// Hidden files, generated `_parsed` files and unsupported extensions are
/// skipped with a debug log line; they are not errors.
pub fn discover(dir: &Path) -> Result<Vec<InputFile>, IngestError> {
    if !dir.is_dir() {
        return Err(IngestError::InputDirNotFound {
            path: dir.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(dir).map_err(|source| IngestError::InputDirUnreadable {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| IngestError::InputDirUnreadable {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_ignored(&name) {
            debug!("Skipping {}", name);
            continue;
        }
        match InputFile::from_path(&path) {
            Some(file) => files.push(file),
            None => debug!("Skipping {} (unsupported extension)", name),
        }
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    info!("Discovered {} input files in {}", files.len(), dir.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_extensions() {
        assert_eq!(FileKind::from_path(Path::new("a.PDF")), Some(FileKind::Pdf));
        assert_eq!(
            FileKind::from_path(Path::new("march.xlsx")),
            Some(FileKind::Spreadsheet)
        );
        assert_eq!(
            FileKind::from_path(Path::new("march.csv")),
            Some(FileKind::Delimited)
        );
        assert_eq!(FileKind::from_path(Path::new("photo.jpg")), None);
        assert_eq!(FileKind::from_path(Path::new("README")), None);
    }

    #[test]
    fn discover_sorts_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "b.pdf",
            "a.csv",
            ".hidden.pdf",
            "a_parsed.csv",
            "notes.docx",
            "c.xlsx",
        ] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.pdf")).unwrap();

        let files = discover(dir.path()).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.csv", "b.pdf", "c.xlsx"]);
        assert_eq!(files[1].kind, FileKind::Pdf);
    }

    #[test]
    fn discover_missing_dir_is_fatal() {
        let err = discover(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, IngestError::InputDirNotFound { .. }));
    }
}
