//! Prompts for record extraction and vision OCR.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth**: the record schema the model is asked for
//!    must match the keys [`crate::record::record_from_json`] reads, so both
//!    are reviewed together.
//!
//! 2. **Testability**: unit tests can inspect the prompts directly without
//!    a live model, making schema drift easy to catch.
//!
//! Callers can override the extraction prompt via
//! [`crate::config::IngestConfig::system_prompt`].

/// Default system prompt for turning extracted timesheet text into JSON.
pub const EXTRACTION_SYSTEM_PROMPT: &str = r#"You are a payroll assistant that reads monthly employee timesheets and attendance reports. The text you receive was extracted from a PDF, a scan, or a spreadsheet, and may be in Hebrew or English. Hebrew text extracted from PDFs is sometimes reversed.

Return ONLY JSON, no commentary and no markdown fences.

If the document describes one employee, return one object. If it describes several employees, return an array with one object per employee.

Each object uses exactly these keys:
- "employee_name": full name as written in the document, or null
- "employee_id": employee or ID number as a string, or null
- "report_month": the reporting period, e.g. "2024-03" or "March 2024", or null
- "total_presence_hours": total hours present
- "total_approved_hours": total approved hours
- "total_payable_hours": total payable hours
- "overtime_hours": overtime hours
- "vacation_days": vacation days taken
- "sick_days": sick days taken
- "holiday_days": holiday days

Rules:
1. Numbers must be JSON numbers. Convert H:MM durations to decimal hours (160:30 → 160.5).
2. Use null for any value that is not in the document. Never guess.
3. Do not invent employees. If the text contains no timesheet, return []."#;

/// Build the user message carrying the extracted document text.
pub fn extraction_user_prompt(text: &str) -> String {
    format!("Extract the timesheet records from this document:\n\n{}", text)
}

/// Prompt for transcribing a rendered timesheet page with a vision model.
pub const OCR_TRANSCRIBE_PROMPT: &str = r#"Transcribe all text on this timesheet page exactly as printed, in reading order. Keep table rows on one line with cells separated by tabs. Hebrew must be written right-to-left in logical order. Output only the transcription, with no commentary."#;
