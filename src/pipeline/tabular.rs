//! Tabular readers: spreadsheets (calamine) and delimited text (csv).
//!
//! Both produce the same plain-text layout so the interpreter sees one
//! format regardless of where the table came from:
//!
//! ```text
//! --- Sheet: March ---
//! Name<TAB>ID<TAB>Hours
//! Dana Levi<TAB>3141<TAB>182.5
//! ```
//!
//! Blank rows are dropped and trailing empty cells trimmed; merged or
//! formatted cells in HR exports otherwise produce pages of tabs.

use calamine::{open_workbook_auto, Data, Reader};
use std::path::Path;
use tracing::debug;

/// Read every sheet of a workbook into tab-separated text.
pub fn read_spreadsheet(path: &Path) -> Result<String, String> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| format!("cannot open workbook: {}", e))?;

    let mut out = String::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| format!("sheet '{}': {}", name, e))?;
        let rows = range.rows().map(|row| row.iter().map(cell_text).collect());
        push_sheet(&mut out, &name, rows);
    }
    debug!("Spreadsheet {}: {} chars", path.display(), out.len());
    Ok(out)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string().trim().to_string(),
    }
}

/// Read a delimited text file into tab-separated text.
///
/// `.tsv` files are tab-delimited; everything else is split on commas, or on
/// semicolons when the first line has more of those (European exports).
pub fn read_delimited(path: &Path) -> Result<String, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("cannot read file: {}", e))?;
    let delimiter = sniff_delimiter(path, &bytes);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes.as_slice());

    let mut rows = Vec::new();
    for result in reader.byte_records() {
        let record = result.map_err(|e| format!("malformed delimited text: {}", e))?;
        rows.push(
            record
                .iter()
                .map(|field| String::from_utf8_lossy(field).trim().to_string())
                .collect::<Vec<_>>(),
        );
    }

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut out = String::new();
    push_sheet(&mut out, &name, rows.into_iter());
    Ok(out)
}

fn sniff_delimiter(path: &Path, bytes: &[u8]) -> u8 {
    let is_tsv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("tsv"));
    if is_tsv {
        return b'\t';
    }
    let first_line = bytes.split(|&b| b == b'\n').next().unwrap_or_default();
    let count = |c: u8| first_line.iter().filter(|&&b| b == c).count();
    if count(b';') > count(b',') {
        b';'
    } else {
        b','
    }
}

fn push_sheet(out: &mut String, name: &str, rows: impl Iterator<Item = Vec<String>>) {
    out.push_str(&format!("--- Sheet: {} ---\n", name));
    for mut row in rows {
        while row.last().is_some_and(|c| c.is_empty()) {
            row.pop();
        }
        if row.is_empty() {
            continue;
        }
        out.push_str(&row.join("\t"));
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_becomes_tab_separated_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("march.csv");
        std::fs::write(&path, "Name,ID,Hours\nDana Levi,3141,182.5\n,,\nOmer Cohen,2718,\n").unwrap();

        let text = read_delimited(&path).unwrap();
        assert_eq!(
            text,
            "--- Sheet: march ---\nName\tID\tHours\nDana Levi\t3141\t182.5\nOmer Cohen\t2718\n"
        );
    }

    #[test]
    fn semicolon_delimiter_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("april.csv");
        std::fs::write(&path, "Name;Hours\nDana;160,5\n").unwrap();

        let text = read_delimited(&path).unwrap();
        assert!(text.contains("Dana\t160,5"), "got: {text}");
    }

    #[test]
    fn tsv_uses_tabs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("may.tsv");
        std::fs::write(&path, "Name\tHours, approved\nDana\t150\n").unwrap();

        let text = read_delimited(&path).unwrap();
        assert!(text.contains("Name\tHours, approved"));
    }

    #[test]
    fn garbage_workbook_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, b"this is not a zip archive").unwrap();

        assert!(read_spreadsheet(&path).is_err());
    }
}
