//! Deduplication: group records by employee identity and merge each group.
//!
//! ## Identity precedence
//!
//! The employee ID is authoritative whenever both sides carry one: equal IDs
//! merge regardless of how the name was spelled (OCR routinely garbles
//! names), and different IDs never merge even when the names agree. A record
//! without an ID joins the first ID group that already contains its
//! normalised name; failing that it groups with other ID-less records of the
//! same name.
//!
//! ## Field resolution
//!
//! Inside a group every field is resolved independently. Members are ranked
//! by completeness (descending) then input position (ascending), and each
//! field takes its value from the first ranked member where it is present.
//! A value is never invented and a present value is never replaced by an
//! absent one.
//!
//! Output groups appear in the order their earliest member appeared in the
//! input, so identical input always yields identical row placement.

use crate::record::{CanonicalRecord, ExtractionMethod, Hours, IdentityKey, TimesheetRecord};
use std::collections::HashMap;
use tracing::{debug, info};

/// Anything that can be fed to [`merge`].
///
/// Implemented for raw [`TimesheetRecord`]s and for already-merged
/// [`CanonicalRecord`]s, so a merged batch can be merged again.
pub trait MergeInput {
    fn employee_name(&self) -> Option<&str>;
    fn employee_id(&self) -> Option<&str>;
    fn period(&self) -> Option<&str>;
    fn hours(&self) -> &Hours;
    fn source_files(&self) -> &[String];
    fn extraction_methods(&self) -> &[ExtractionMethod];

    fn identity(&self) -> IdentityKey {
        IdentityKey::new(self.employee_name(), self.employee_id())
    }

    fn completeness(&self) -> usize {
        usize::from(self.period().is_some()) + self.hours().values().iter().flatten().count()
    }
}

impl MergeInput for TimesheetRecord {
    fn employee_name(&self) -> Option<&str> {
        self.employee_name.as_deref()
    }
    fn employee_id(&self) -> Option<&str> {
        self.employee_id.as_deref()
    }
    fn period(&self) -> Option<&str> {
        self.period.as_deref()
    }
    fn hours(&self) -> &Hours {
        &self.hours
    }
    fn source_files(&self) -> &[String] {
        std::slice::from_ref(&self.source_file)
    }
    fn extraction_methods(&self) -> &[ExtractionMethod] {
        std::slice::from_ref(&self.extraction_method)
    }
}

impl MergeInput for CanonicalRecord {
    fn employee_name(&self) -> Option<&str> {
        self.employee_name.as_deref()
    }
    fn employee_id(&self) -> Option<&str> {
        self.employee_id.as_deref()
    }
    fn period(&self) -> Option<&str> {
        self.period.as_deref()
    }
    fn hours(&self) -> &Hours {
        &self.hours
    }
    fn source_files(&self) -> &[String] {
        &self.source_files
    }
    fn extraction_methods(&self) -> &[ExtractionMethod] {
        &self.extraction_methods
    }
}

/// Merge candidate records into one canonical record per identity group.
///
/// Pure function: inputs are not modified. The output length is at most the
/// input length, equal when no two records share an identity.
pub fn merge<R: MergeInput>(records: &[R]) -> Vec<CanonicalRecord> {
    let groups = group_indices(records);
    let merged: Vec<CanonicalRecord> = groups
        .iter()
        .map(|members| merge_group(records, members))
        .collect();

    info!(
        "Merged {} records into {} canonical records",
        records.len(),
        merged.len()
    );
    merged
}

/// Partition record indices into identity groups.
///
/// Each returned group is sorted ascending, and groups are ordered by their
/// first member.
fn group_indices<R: MergeInput>(records: &[R]) -> Vec<Vec<usize>> {
    let keys: Vec<IdentityKey> = records.iter().map(MergeInput::identity).collect();
    let mut groups: Vec<Vec<usize>> = Vec::new();

    // Pass 1: records carrying an ID group by ID alone.
    let mut by_id: HashMap<&str, usize> = HashMap::new();
    for (i, key) in keys.iter().enumerate() {
        if let Some(id) = key.id.as_deref() {
            let g = *by_id.entry(id).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[g].push(i);
        }
    }

    // Names seen inside each ID group, lowest (first-seen) group first.
    let mut id_groups_by_name: HashMap<&str, Vec<usize>> = HashMap::new();
    for (g, members) in groups.iter().enumerate() {
        for &i in members {
            if let Some(name) = keys[i].name.as_deref() {
                let slot = id_groups_by_name.entry(name).or_default();
                if !slot.contains(&g) {
                    slot.push(g);
                }
            }
        }
    }

    // Pass 2: ID-less records attach by name.
    let mut by_name: HashMap<&str, usize> = HashMap::new();
    for (i, key) in keys.iter().enumerate() {
        if key.id.is_some() {
            continue;
        }
        let Some(name) = key.name.as_deref() else {
            // No identity at all: cannot match anything, stands alone.
            groups.push(vec![i]);
            continue;
        };
        if let Some(candidates) = id_groups_by_name.get(name) {
            if candidates.len() > 1 {
                debug!(
                    "Name '{}' appears under {} different IDs; attaching record {} to the first",
                    name,
                    candidates.len(),
                    i
                );
            }
            groups[candidates[0]].push(i);
            continue;
        }
        let g = *by_name.entry(name).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[g].push(i);
    }

    for members in &mut groups {
        members.sort_unstable();
    }
    groups.sort_by_key(|members| members[0]);
    groups
}

/// Resolve one group field-by-field.
fn merge_group<R: MergeInput>(records: &[R], members: &[usize]) -> CanonicalRecord {
    let mut ranked = members.to_vec();
    ranked.sort_by(|&a, &b| {
        records[b]
            .completeness()
            .cmp(&records[a].completeness())
            .then(a.cmp(&b))
    });

    let pick = |field: fn(&R) -> Option<&str>| -> Option<String> {
        ranked
            .iter()
            .find_map(|&i| field(&records[i]))
            .map(str::to_string)
    };

    let hours = Hours::from_fn(|f| ranked.iter().find_map(|&i| records[i].hours().values()[f]));

    let mut source_files: Vec<String> = Vec::new();
    let mut extraction_methods: Vec<ExtractionMethod> = Vec::new();
    for &i in members {
        for file in records[i].source_files() {
            if !source_files.contains(file) {
                source_files.push(file.clone());
            }
        }
        for method in records[i].extraction_methods() {
            if !extraction_methods.contains(method) {
                extraction_methods.push(*method);
            }
        }
    }

    if members.len() > 1 {
        debug!(
            "Merged {} records for {:?} from {:?}",
            members.len(),
            pick(R::employee_name),
            source_files
        );
    }

    CanonicalRecord {
        employee_name: pick(R::employee_name),
        employee_id: pick(R::employee_id),
        period: pick(R::period),
        hours,
        source_files,
        extraction_methods,
    }
}
