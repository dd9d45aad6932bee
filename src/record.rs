//! Timesheet record schema, identity normalisation, and boundary coercion.
//!
//! The interpreter returns loosely-typed JSON. This module is where that JSON
//! becomes a [`TimesheetRecord`]: identity fields are trimmed, numeric fields
//! are parsed permissively (a malformed value becomes `None`, never an error),
//! and objects without any identity are rejected.

use crate::error::RecordRejection;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// How the text behind a record was recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionMethod {
    /// Embedded PDF text layer.
    TextLayer,
    /// Spreadsheet or delimited-text reader.
    Tabular,
    /// Rendered page images run through an OCR engine.
    Ocr,
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExtractionMethod::TextLayer => "text-layer",
            ExtractionMethod::Tabular => "tabular",
            ExtractionMethod::Ocr => "ocr",
        })
    }
}

/// The numeric totals a timesheet can report. All optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hours {
    pub total_presence_hours: Option<f64>,
    pub total_approved_hours: Option<f64>,
    pub total_payable_hours: Option<f64>,
    pub overtime_hours: Option<f64>,
    pub vacation_days: Option<f64>,
    pub sick_days: Option<f64>,
    pub holiday_days: Option<f64>,
}

impl Hours {
    /// Column names in output order.
    pub const FIELDS: [&'static str; 7] = [
        "total_presence_hours",
        "total_approved_hours",
        "total_payable_hours",
        "overtime_hours",
        "vacation_days",
        "sick_days",
        "holiday_days",
    ];

    /// Values in the same order as [`Hours::FIELDS`].
    pub fn values(&self) -> [Option<f64>; 7] {
        [
            self.total_presence_hours,
            self.total_approved_hours,
            self.total_payable_hours,
            self.overtime_hours,
            self.vacation_days,
            self.sick_days,
            self.holiday_days,
        ]
    }

    fn from_values(v: [Option<f64>; 7]) -> Self {
        Self {
            total_presence_hours: v[0],
            total_approved_hours: v[1],
            total_payable_hours: v[2],
            overtime_hours: v[3],
            vacation_days: v[4],
            sick_days: v[5],
            holiday_days: v[6],
        }
    }

    /// Build by picking each field independently from `pick`.
    pub(crate) fn from_fn(mut pick: impl FnMut(usize) -> Option<f64>) -> Self {
        let mut v = [None; 7];
        for (i, slot) in v.iter_mut().enumerate() {
            *slot = pick(i);
        }
        Self::from_values(v)
    }

    /// Hours used for roster validation: presence, else approved.
    pub fn reported(&self) -> Option<f64> {
        self.total_presence_hours.or(self.total_approved_hours)
    }
}

/// One entry per (employee, reporting period) extracted from a source file.
///
/// Immutable once created; merging produces a [`CanonicalRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimesheetRecord {
    pub employee_name: Option<String>,
    pub employee_id: Option<String>,
    pub period: Option<String>,
    #[serde(flatten)]
    pub hours: Hours,
    pub source_file: String,
    pub extraction_method: ExtractionMethod,
}

/// The single merged output record for one identity group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub employee_name: Option<String>,
    pub employee_id: Option<String>,
    pub period: Option<String>,
    #[serde(flatten)]
    pub hours: Hours,
    /// Every file that contributed to this record, first-seen order.
    pub source_files: Vec<String>,
    /// Distinct extraction methods of the contributing records.
    pub extraction_methods: Vec<ExtractionMethod>,
}

// ── Identity ─────────────────────────────────────────────────────────────

/// Normalised `(name, id)` pair used to group records.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    pub name: Option<String>,
    pub id: Option<String>,
}

impl IdentityKey {
    pub fn new(name: Option<&str>, id: Option<&str>) -> Self {
        Self {
            name: name.and_then(name_key),
            id: id.and_then(normalize_id),
        }
    }
}

static RE_NAME_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[-"'׳״]"#).unwrap());

/// Case-fold, strip dash/quote punctuation and collapse whitespace.
pub fn normalize_name(name: &str) -> String {
    let replaced = RE_NAME_PUNCT.replace_all(name.trim(), " ");
    replaced
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Normalised values that stand for "not filled in".
const PLACEHOLDERS: &[&str] = &["", "none", "null", "n/a", "na", "nan", "-", "unknown"];

/// Normalised name usable as an identity; placeholder names are absent.
pub fn name_key(name: &str) -> Option<String> {
    let key = normalize_name(name);
    (!PLACEHOLDERS.contains(&key.as_str())).then_some(key)
}

/// Trim, drop internal whitespace and case-fold; placeholder values are absent.
pub fn normalize_id(id: &str) -> Option<String> {
    let compact: String = id.chars().filter(|c| !c.is_whitespace()).collect();
    let folded = compact.to_lowercase();
    (!PLACEHOLDERS.contains(&folded.as_str())).then_some(folded)
}

// ── Boundary coercion ────────────────────────────────────────────────────

static RE_DURATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(-?\d+):([0-5]\d)$").unwrap());

/// Parse a loosely-typed numeric value.
///
/// Accepts JSON numbers, numeric strings, `1,234.5`, `12,5` (decimal comma)
/// and `H:MM` durations. Anything else is `None`.
pub fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_number_str(s),
        _ => None,
    }
}

fn parse_number_str(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(caps) = RE_DURATION.captures(s) {
        let h: f64 = caps[1].parse().ok()?;
        let m: f64 = caps[2].parse().ok()?;
        return Some(if s.starts_with('-') { h - m / 60.0 } else { h + m / 60.0 });
    }
    let cleaned = if s.contains('.') {
        s.replace(',', "")
    } else if s.matches(',').count() == 1 && s.rsplit(',').next().is_some_and(|t| t.len() != 3) {
        s.replace(',', ".")
    } else {
        s.replace(',', "")
    };
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
}

fn coerce_text(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    match text.to_lowercase().as_str() {
        "" | "null" | "none" => None,
        _ => Some(text),
    }
}

fn first_text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    first_text_where(obj, keys, |_| true)
}

/// First value under `keys` that is text and passes `usable`.
fn first_text_where(
    obj: &Map<String, Value>,
    keys: &[&str],
    usable: impl Fn(&str) -> bool,
) -> Option<String> {
    keys.iter()
        .find_map(|k| coerce_text(obj.get(*k)).filter(|text| usable(text)))
}

fn first_number(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| obj.get(*k).and_then(coerce_number))
}

/// Convert one interpreter object into a record.
///
/// Returns `Err` when the object has neither a name nor an ID; the caller
/// logs and drops it.
pub fn record_from_json(
    obj: &Map<String, Value>,
    index: usize,
    source_file: &str,
    method: ExtractionMethod,
) -> Result<TimesheetRecord, RecordRejection> {
    let employee_name =
        first_text_where(obj, &["employee_name", "name"], |n| name_key(n).is_some());
    let employee_id = first_text_where(obj, &["employee_id", "employee_number", "id"], |id| {
        normalize_id(id).is_some()
    });

    if employee_name.is_none() && employee_id.is_none() {
        return Err(RecordRejection {
            file: source_file.to_string(),
            index,
        });
    }

    Ok(TimesheetRecord {
        employee_name,
        employee_id,
        period: first_text(obj, &["period", "report_month", "report_period"]),
        hours: Hours {
            total_presence_hours: first_number(
                obj,
                &["total_presence_hours", "hours_worked", "hours"],
            ),
            total_approved_hours: first_number(obj, &["total_approved_hours"]),
            total_payable_hours: first_number(obj, &["total_payable_hours"]),
            overtime_hours: first_number(obj, &["overtime_hours", "overtime"]),
            vacation_days: first_number(obj, &["vacation_days"]),
            sick_days: first_number(obj, &["sick_days"]),
            holiday_days: first_number(obj, &["holiday_days"]),
        },
        source_file: source_file.to_string(),
        extraction_method: method,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::MergeInput;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn name_normalisation_folds_case_and_spacing() {
        assert_eq!(normalize_name("  Jane   DOE "), "jane doe");
        assert_eq!(normalize_name("Ben-Ami \"Dani\""), "ben ami dani");
    }

    #[test]
    fn id_normalisation_drops_placeholders() {
        assert_eq!(normalize_id(" E 12 "), Some("e12".to_string()));
        assert_eq!(normalize_id("None"), None);
        assert_eq!(normalize_id("  "), None);
    }

    #[test]
    fn coerce_number_variants() {
        assert_eq!(coerce_number(&json!(40)), Some(40.0));
        assert_eq!(coerce_number(&json!("40.5")), Some(40.5));
        assert_eq!(coerce_number(&json!("1,234.5")), Some(1234.5));
        assert_eq!(coerce_number(&json!("1,234")), Some(1234.0));
        assert_eq!(coerce_number(&json!("12,5")), Some(12.5));
        assert_eq!(coerce_number(&json!("8:30")), Some(8.5));
        assert_eq!(coerce_number(&json!("n/a")), None);
        assert_eq!(coerce_number(&json!(null)), None);
        assert_eq!(coerce_number(&json!(true)), None);
    }

    #[test]
    fn record_from_json_keeps_partial_identity() {
        let r = record_from_json(
            &obj(json!({"employee_id": "77", "total_presence_hours": "oops"})),
            0,
            "a.pdf",
            ExtractionMethod::TextLayer,
        )
        .unwrap();
        assert_eq!(r.employee_name, None);
        assert_eq!(r.employee_id.as_deref(), Some("77"));
        assert_eq!(r.hours.total_presence_hours, None);
    }

    #[test]
    fn record_from_json_falls_back_to_employee_number_and_month() {
        let r = record_from_json(
            &obj(json!({
                "employee_name": "Dana Levi",
                "employee_id": null,
                "employee_number": 1042,
                "report_month": "06/2025",
                "hours_worked": 162.5,
                "overtime": "4:15"
            })),
            0,
            "june.pdf",
            ExtractionMethod::Ocr,
        )
        .unwrap();
        assert_eq!(r.employee_id.as_deref(), Some("1042"));
        assert_eq!(r.period.as_deref(), Some("06/2025"));
        assert_eq!(r.hours.total_presence_hours, Some(162.5));
        assert_eq!(r.hours.overtime_hours, Some(4.25));
        assert_eq!(r.completeness(), 3);
    }

    #[test]
    fn record_without_identity_is_rejected() {
        let err = record_from_json(
            &obj(json!({"employee_name": " ", "employee_id": "None", "sick_days": 2})),
            3,
            "x.csv",
            ExtractionMethod::Tabular,
        )
        .unwrap_err();
        assert_eq!(err.index, 3);
        assert_eq!(err.file, "x.csv");

        for name in ["-", "N/A", "unknown", "\"\""] {
            let result = record_from_json(
                &obj(json!({"employee_name": name, "total_presence_hours": 40})),
                0,
                "x.csv",
                ExtractionMethod::Tabular,
            );
            assert!(result.is_err(), "name {name:?} should not count as identity");
        }
    }

    #[test]
    fn placeholder_id_falls_through_to_employee_number() {
        let r = record_from_json(
            &obj(json!({
                "employee_name": "Dana Levi",
                "employee_id": "N/A",
                "employee_number": "1042"
            })),
            0,
            "a.pdf",
            ExtractionMethod::TextLayer,
        )
        .unwrap();
        assert_eq!(r.employee_id.as_deref(), Some("1042"));
    }

    #[test]
    fn placeholder_names_have_no_identity() {
        assert_eq!(name_key("N/A"), None);
        assert_eq!(name_key(" - "), None);
        assert_eq!(name_key("Dana  LEVI"), Some("dana levi".to_string()));
        assert_eq!(IdentityKey::new(Some("n/a"), None), IdentityKey { name: None, id: None });
    }
}
