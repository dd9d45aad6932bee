//! Master roster reconciliation: match merged records to known employees and
//! validate their reported hours against the contracted standard.
//!
//! ## Why fuzzy and reversed matching?
//!
//! Names reach us through OCR and LLM transcription, so `Dana Levy` must
//! still find `Dana Levi`. Hebrew names extracted from a PDF text layer are
//! sometimes stored in visual order, which reads as the name spelled
//! backwards; a second pass with the reversed string catches those.

use crate::error::IngestError;
use crate::record::{coerce_number, normalize_name, CanonicalRecord, TimesheetRecord};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// Prefix marking a summary row whose employee is not in the roster.
pub const UNMATCHED_PREFIX: &str = "**CHECK: ";

/// One employee from the master roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub employee_name: String,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default, deserialize_with = "loose_number")]
    pub standard_hours: Option<f64>,
}

fn loose_number<'de, D: Deserializer<'de>>(de: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<Value>::deserialize(de)?;
    Ok(value.as_ref().and_then(coerce_number))
}

#[derive(Deserialize)]
struct RosterFile {
    master_employees: Vec<RosterEntry>,
}

/// The master employee list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster {
    entries: Vec<RosterEntry>,
    /// `normalize_name` of each entry, same order.
    keys: Vec<String>,
}

/// A roster hit for one name.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterMatch<'a> {
    pub entry: &'a RosterEntry,
    /// Similarity in `0.0..=1.0`; `1.0` for an exact normalised match.
    pub score: f64,
    /// The name only matched after reversing it.
    pub reversed: bool,
}

impl Roster {
    pub fn new(entries: Vec<RosterEntry>) -> Self {
        let keys = entries
            .iter()
            .map(|e| normalize_name(&e.employee_name))
            .collect();
        Self { entries, keys }
    }

    /// Load `{"master_employees": [...]}` from disk.
    ///
    /// A missing file yields an empty roster with a warning; a file that
    /// exists but does not parse is fatal.
    pub fn load(path: &Path) -> Result<Self, IngestError> {
        if !path.exists() {
            warn!(
                "Roster {} not found; every record will be unmatched",
                path.display()
            );
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|e| IngestError::RosterInvalid {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let file: RosterFile =
            serde_json::from_str(&raw).map_err(|e| IngestError::RosterInvalid {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;

        info!(
            "Loaded {} roster entries from {}",
            file.master_employees.len(),
            path.display()
        );
        Ok(Self::new(file.master_employees))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the roster entry for `name`.
    ///
    /// Tries an exact normalised match, then the best fuzzy match at or above
    /// `threshold`, then both again with the name reversed.
    pub fn match_name(&self, name: &str, threshold: f64) -> Option<RosterMatch<'_>> {
        let key = normalize_name(name);
        if key.is_empty() {
            return None;
        }

        if let Some(hit) = self.best_match(&key, threshold) {
            return Some(hit);
        }

        let reversed: String = key.chars().rev().collect();
        let hit = self.best_match(&reversed, threshold)?;
        debug!("'{}' matched roster entry only when reversed", name);
        Some(RosterMatch {
            reversed: true,
            ..hit
        })
    }

    fn best_match(&self, key: &str, threshold: f64) -> Option<RosterMatch<'_>> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, candidate) in self.keys.iter().enumerate() {
            let score = if candidate == key {
                1.0
            } else {
                strsim::normalized_levenshtein(key, candidate)
            };
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((idx, score));
            }
            if score >= 1.0 {
                break;
            }
        }

        let (idx, score) = best.filter(|&(_, s)| s >= threshold)?;
        Some(RosterMatch {
            entry: &self.entries[idx],
            score,
            reversed: false,
        })
    }
}

/// Rewrite each extracted name to its roster spelling.
///
/// Runs before merging so that fuzzy and reversed spellings of one employee
/// share an identity. Unmatched names are left as extracted. Returns the
/// number of records whose name changed.
pub fn canonicalize_names(
    records: &mut [TimesheetRecord],
    roster: &Roster,
    threshold: f64,
) -> usize {
    let mut renamed = 0;
    for record in records.iter_mut() {
        let Some(name) = record.employee_name.as_deref() else {
            continue;
        };
        let Some(hit) = roster.match_name(name, threshold) else {
            continue;
        };
        if hit.entry.employee_name != name {
            debug!(
                "{}: '{}' → roster name '{}' (score {:.2})",
                record.source_file, name, hit.entry.employee_name, hit.score
            );
            record.employee_name = Some(hit.entry.employee_name.clone());
            renamed += 1;
        }
    }
    renamed
}

// ── Hours validation ─────────────────────────────────────────────────────────

/// Outcome of comparing reported hours with the roster's standard hours.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoursStatus {
    /// Within tolerance.
    Ok,
    /// Outside tolerance by this many percent.
    Irregular { deviation_percent: f64 },
    /// Reported or standard hours missing or non-positive.
    NoValidation,
    /// Employee not found in the roster.
    Unmatched,
}

impl fmt::Display for HoursStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HoursStatus::Ok => f.write_str("OK"),
            HoursStatus::Irregular { deviation_percent } => {
                write!(f, "Irregular ({:.1}% deviation)", deviation_percent)
            }
            HoursStatus::NoValidation => f.write_str("No validation"),
            HoursStatus::Unmatched => f.write_str("Unmatched"),
        }
    }
}

/// Compare `reported` with `standard`, allowing `tolerance_percent` deviation.
pub fn validate_hours(
    reported: Option<f64>,
    standard: Option<f64>,
    tolerance_percent: f64,
) -> HoursStatus {
    let (Some(reported), Some(standard)) = (reported, standard) else {
        return HoursStatus::NoValidation;
    };
    if standard <= 0.0 {
        return HoursStatus::NoValidation;
    }

    let deviation_percent = (reported - standard).abs() / standard * 100.0;
    if deviation_percent <= tolerance_percent {
        HoursStatus::Ok
    } else {
        HoursStatus::Irregular { deviation_percent }
    }
}

// ── Summary ──────────────────────────────────────────────────────────────────

/// One row of the hours summary table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    /// Roster spelling when matched, otherwise the extracted name with
    /// [`UNMATCHED_PREFIX`].
    pub employee_name: String,
    pub company: Option<String>,
    pub standard_hours: Option<f64>,
    pub reported_hours: Option<f64>,
    /// `reported_hours - standard_hours`.
    pub difference: Option<f64>,
    pub status: HoursStatus,
}

/// Build one summary row per merged record, in merge order.
pub fn reconcile(
    records: &[CanonicalRecord],
    roster: &Roster,
    threshold: f64,
    tolerance_percent: f64,
) -> Vec<SummaryRow> {
    let rows: Vec<SummaryRow> = records
        .iter()
        .map(|record| {
            let reported = record.hours.reported();
            let extracted_name = record
                .employee_name
                .clone()
                .or_else(|| record.employee_id.clone())
                .unwrap_or_default();

            match record
                .employee_name
                .as_deref()
                .and_then(|n| roster.match_name(n, threshold))
            {
                Some(hit) => {
                    let standard = hit.entry.standard_hours;
                    SummaryRow {
                        employee_name: hit.entry.employee_name.clone(),
                        company: hit.entry.company_name.clone(),
                        standard_hours: standard,
                        reported_hours: reported,
                        difference: reported.zip(standard).map(|(r, s)| r - s),
                        status: validate_hours(reported, standard, tolerance_percent),
                    }
                }
                None => SummaryRow {
                    employee_name: format!("{}{}", UNMATCHED_PREFIX, extracted_name),
                    company: None,
                    standard_hours: None,
                    reported_hours: reported,
                    difference: None,
                    status: HoursStatus::Unmatched,
                },
            }
        })
        .collect();

    let unmatched = rows
        .iter()
        .filter(|r| r.status == HoursStatus::Unmatched)
        .count();
    info!(
        "Reconciled {} records against roster ({} unmatched)",
        rows.len(),
        unmatched
    );
    rows
}
