//! Cross-source consistency checks and merging.
//!
//! Findings are data. Every disagreement becomes a [`Conflict`] in the
//! [`ConflictReport`]; only blocking conflicts prevent a [`UnifiedRecord`],
//! and the caller may accept those too. Input order decides ties: the first
//! record holding a value wins.

use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

use crate::calendar::{Calendar, CalendarDateTime};
use crate::config::ReconcileOptions;
use crate::model::{
    AttributeValue, Attributes, DimensionSpec, NormalizedRecord, TimeAxis, TimeStatus, VariableSpec,
};

/// Relative slack when comparing a gap against the time step.
const STEP_SLACK: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictKind {
    /// Non-time dimension with differing lengths
    DimensionConflict,
    /// Same variable with differing dtype or dimension order
    SchemaConflict,
    AttributeConflict,
    CalendarConflict,
    /// Variable present in some records only
    VariableCoverageGap,
    /// Time ranges overlap without being identical
    TimeOverlap,
    /// Time ranges are disjoint with a gap larger than one step
    TimeGap,
}

impl ConflictKind {
    /// Whether the conflict prevents unification under `options`.
    pub fn is_blocking(&self, options: &ReconcileOptions) -> bool {
        match self {
            ConflictKind::SchemaConflict | ConflictKind::CalendarConflict => true,
            ConflictKind::VariableCoverageGap => false,
            ConflictKind::DimensionConflict
            | ConflictKind::AttributeConflict
            | ConflictKind::TimeOverlap
            | ConflictKind::TimeGap => options.strict,
        }
    }
}

/// A value as seen in one source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub source: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    /// Dotted path of the disagreeing field, e.g. `variables.tas.dtype`
    pub field: String,
    pub a: Observation,
    pub b: Observation,
    pub blocking: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoteKind {
    TimeUndecodable,
    TimeCoverageUnknown,
    TimeNotCompared,
}

/// Non-conflict observation worth reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Note {
    pub kind: NoteKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeRelation {
    /// Same start and end, e.g. files split by variable
    Identical,
    Contiguous,
    Overlapping,
    Gap,
}

/// Relation between two time ranges adjacent in start order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeLink {
    pub first: String,
    pub second: String,
    pub relation: TimeRelation,
    /// Seconds from the end of `first` to the start of `second`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_seconds: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConflictReport {
    pub conflicts: Vec<Conflict>,
    pub time_links: Vec<TimeLink>,
    pub notes: Vec<Note>,
}

impl ConflictReport {
    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn has_blocking(&self) -> bool {
        self.conflicts.iter().any(|c| c.blocking)
    }

    pub fn count(&self, kind: ConflictKind) -> usize {
        self.conflicts.iter().filter(|c| c.kind == kind).count()
    }
}

/// Union of the decoded time ranges.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedTime {
    pub variable: String,
    pub units: String,
    pub calendar: Calendar,
    pub start: CalendarDateTime,
    pub end: CalendarDateTime,
}

/// Merged view over all reconciled sources.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedRecord {
    pub sources: Vec<String>,
    pub byte_size: u64,
    pub data_bytes: u64,
    pub dimensions: Vec<DimensionSpec>,
    pub variables: Vec<VariableSpec>,
    pub global_attributes: Attributes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<UnifiedTime>,
    /// Produced despite blocking conflicts because the caller accepted them
    pub accepted_conflicts: bool,
}

impl UnifiedRecord {
    pub fn variable(&self, name: &str) -> Option<&VariableSpec> {
        self.variables.iter().find(|v| v.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unified: Option<UnifiedRecord>,
    pub report: ConflictReport,
}

/// Outcome of the time-axis checks.
#[derive(Default)]
struct TimeSummary {
    union: Option<UnifiedTime>,
    /// Every record covers exactly the same range
    all_identical: bool,
}

struct Reconciler<'a> {
    records: &'a [NormalizedRecord],
    options: ReconcileOptions,
    report: ConflictReport,
}

fn display(value: &AttributeValue, other: &AttributeValue) -> String {
    if value.type_label() == other.type_label() {
        value.to_string()
    } else {
        format!("{} ({})", value, value.type_label())
    }
}

/// Names in order of first appearance across records.
fn ordered_names<'r, F, I>(records: &'r [NormalizedRecord], names: F) -> Vec<&'r str>
where
    F: Fn(&'r NormalizedRecord) -> I,
    I: Iterator<Item = &'r str>,
{
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    for record in records {
        for name in names(record) {
            if seen.insert(name) {
                order.push(name);
            }
        }
    }
    order
}

impl<'a> Reconciler<'a> {
    fn uri(&self, index: usize) -> String {
        self.records[index].source.uri.clone()
    }

    fn push(&mut self, kind: ConflictKind, field: String, a: (usize, String), b: (usize, String)) {
        let blocking = kind.is_blocking(&self.options);
        let conflict = Conflict {
            kind,
            field,
            a: Observation {
                source: self.uri(a.0),
                value: a.1,
            },
            b: Observation {
                source: self.uri(b.0),
                value: b.1,
            },
            blocking,
        };
        self.report.conflicts.push(conflict);
    }

    fn note(&mut self, kind: NoteKind, source: Option<usize>, message: String) {
        let source = source.map(|i| self.uri(i));
        self.report.notes.push(Note {
            kind,
            source,
            message,
        });
    }

    fn check_dimensions(&mut self, names: &[&str]) {
        for name in names {
            let records = self.records;
            if records.iter().any(|r| r.is_time_like_dimension(name)) {
                continue;
            }
            let holders: Vec<(usize, &DimensionSpec)> = records
                .iter()
                .enumerate()
                .filter_map(|(i, r)| r.dimension(name).map(|d| (i, d)))
                .collect();
            let Some(&(first, reference)) = holders.first() else {
                continue;
            };
            for &(i, dim) in &holders[1..] {
                if dim.length != reference.length {
                    self.push(
                        ConflictKind::DimensionConflict,
                        format!("dimensions.{}", name),
                        (first, reference.length.to_string()),
                        (i, dim.length.to_string()),
                    );
                }
            }
        }
    }

    fn check_attributes(&mut self, prefix: &str, holders: &[(usize, &Attributes)], skip: &[&str]) {
        for (position, &(i, attributes)) in holders.iter().enumerate() {
            for (key, value) in attributes {
                if skip.contains(&key.as_str()) {
                    continue;
                }
                // The first record holding the key is the reference for it.
                let earlier = holders[..position]
                    .iter()
                    .find_map(|&(j, other)| other.get(key).map(|v| (j, v)));
                if let Some((first, expected)) = earlier {
                    if expected != value {
                        self.push(
                            ConflictKind::AttributeConflict,
                            format!("{}{}", prefix, key),
                            (first, display(expected, value)),
                            (i, display(value, expected)),
                        );
                    }
                }
            }
        }
    }

    fn check_variables(&mut self, names: &[&str]) {
        let records = self.records;
        for name in names {
            let holders: Vec<(usize, &VariableSpec)> = records
                .iter()
                .enumerate()
                .filter_map(|(i, r)| r.variable(name).map(|v| (i, v)))
                .collect();
            let Some(&(first, reference)) = holders.first() else {
                continue;
            };

            let missing: Vec<usize> = (0..records.len())
                .filter(|i| holders.iter().all(|(h, _)| h != i))
                .collect();
            for index in missing {
                self.push(
                    ConflictKind::VariableCoverageGap,
                    format!("variables.{}", name),
                    (first, "present".to_string()),
                    (index, "absent".to_string()),
                );
            }

            for &(i, variable) in &holders[1..] {
                if variable.dtype != reference.dtype {
                    self.push(
                        ConflictKind::SchemaConflict,
                        format!("variables.{}.dtype", name),
                        (first, reference.dtype.to_string()),
                        (i, variable.dtype.to_string()),
                    );
                }
                if variable.dimensions != reference.dimensions {
                    self.push(
                        ConflictKind::SchemaConflict,
                        format!("variables.{}.dimensions", name),
                        (first, format!("({})", reference.dimensions.join(", "))),
                        (i, format!("({})", variable.dimensions.join(", "))),
                    );
                }
            }

            // Time offsets are compared as decoded instants, not as encodings.
            let skip: &[&str] = if reference.time_encoded {
                &["units", "calendar"]
            } else {
                &[]
            };
            let attribute_holders: Vec<(usize, &Attributes)> =
                holders.iter().map(|(i, v)| (*i, &v.attributes)).collect();
            self.check_attributes(&format!("variables.{}.attributes.", name), &attribute_holders, skip);
        }
    }

    fn check_time(&mut self) -> TimeSummary {
        let records = self.records;
        let mut axes: Vec<(usize, &TimeAxis)> = Vec::new();
        for (i, record) in records.iter().enumerate() {
            match &record.time {
                TimeStatus::Decoded(axis) => axes.push((i, axis)),
                TimeStatus::Undecodable { variable, reason } => self.note(
                    NoteKind::TimeUndecodable,
                    Some(i),
                    format!("time variable '{}' could not be decoded: {}", variable, reason),
                ),
                TimeStatus::Absent => {}
            }
        }

        if axes.len() != records.len() {
            if !axes.is_empty() {
                self.note(
                    NoteKind::TimeNotCompared,
                    None,
                    format!(
                        "time coverage not compared: {} of {} sources have a decodable time axis",
                        axes.len(),
                        records.len()
                    ),
                );
            }
            return TimeSummary::default();
        }

        let (first, reference) = axes[0];
        let mut calendars_agree = true;
        for &(i, axis) in &axes[1..] {
            if axis.calendar != reference.calendar {
                calendars_agree = false;
                self.push(
                    ConflictKind::CalendarConflict,
                    "time.calendar".to_string(),
                    (first, reference.calendar.to_string()),
                    (i, axis.calendar.to_string()),
                );
            }
        }
        if !calendars_agree {
            return TimeSummary::default();
        }

        let mut covered: Vec<(usize, &TimeAxis, CalendarDateTime, CalendarDateTime)> = Vec::new();
        for &(i, axis) in &axes {
            match (&axis.start, &axis.end) {
                (Some(start), Some(end)) => covered.push((i, axis, *start, *end)),
                _ => self.note(
                    NoteKind::TimeCoverageUnknown,
                    Some(i),
                    format!("values of time variable '{}' could not be read", axis.variable),
                ),
            }
        }
        let Some(union_start) = covered.iter().map(|c| c.2).min() else {
            return TimeSummary::default();
        };
        let union_end = covered.iter().map(|c| c.3).max().unwrap_or(union_start);

        covered.sort_by(|a, b| (&a.2, &a.3, a.0).cmp(&(&b.2, &b.3, b.0)));
        let calendar = reference.calendar;
        let mut all_identical = covered.len() == records.len();
        let mut reach = 0;
        for next in 1..covered.len() {
            let previous = &covered[next - 1];
            let (q_index, q_axis, q_start, q_end) = &covered[next];
            let (r_index, r_axis, _, r_end) = &covered[reach];

            let (relation, distance) = if &previous.2 == q_start && &previous.3 == q_end {
                (TimeRelation::Identical, None)
            } else if q_start <= r_end {
                let overlap = calendar.seconds_between(q_start, r_end).ok();
                (TimeRelation::Overlapping, overlap.map(|s| -s))
            } else {
                let distance = calendar.seconds_between(r_end, q_start).ok();
                let step = step_seconds(calendar, r_axis).or_else(|| step_seconds(calendar, q_axis));
                let relation = match (distance, step) {
                    (Some(d), Some(step)) if d > step * (1.0 + STEP_SLACK) => TimeRelation::Gap,
                    _ => TimeRelation::Contiguous,
                };
                (relation, distance)
            };

            let (first_index, first_end) = if relation == TimeRelation::Identical {
                (previous.0, previous.3)
            } else {
                (*r_index, *r_end)
            };
            match relation {
                TimeRelation::Identical => {}
                TimeRelation::Contiguous => all_identical = false,
                TimeRelation::Overlapping => {
                    all_identical = false;
                    self.push(
                        ConflictKind::TimeOverlap,
                        "time.coverage".to_string(),
                        (first_index, format!("ends {}", first_end)),
                        (*q_index, format!("starts {}", q_start)),
                    );
                }
                TimeRelation::Gap => {
                    all_identical = false;
                    self.push(
                        ConflictKind::TimeGap,
                        "time.coverage".to_string(),
                        (first_index, format!("ends {}", first_end)),
                        (*q_index, format!("starts {}", q_start)),
                    );
                }
            }
            let link = TimeLink {
                first: self.uri(first_index),
                second: self.uri(*q_index),
                relation,
                distance_seconds: distance,
            };
            self.report.time_links.push(link);

            if q_end > r_end {
                reach = next;
            }
        }

        TimeSummary {
            union: Some(UnifiedTime {
                variable: reference.variable.clone(),
                units: reference.units.clone(),
                calendar,
                start: union_start,
                end: union_end,
            }),
            all_identical,
        }
    }

    fn unify(
        &self,
        dimension_names: &[&str],
        variable_names: &[&str],
        time: TimeSummary,
    ) -> UnifiedRecord {
        let records = self.records;
        let dimensions: Vec<DimensionSpec> = dimension_names
            .iter()
            .filter_map(|name| {
                let holders: Vec<&DimensionSpec> = records.iter().filter_map(|r| r.dimension(name)).collect();
                let mut merged = (*holders.first()?).clone();
                if records.iter().any(|r| r.is_time_like_dimension(name)) {
                    merged.length = if time.all_identical {
                        holders.iter().map(|d| d.length).max().unwrap_or(0)
                    } else {
                        holders.iter().map(|d| d.length).sum()
                    };
                    merged.unlimited = holders.iter().any(|d| d.unlimited);
                }
                Some(merged)
            })
            .collect();

        let variables = variable_names
            .iter()
            .filter_map(|name| {
                let mut holders = records.iter().filter_map(|r| r.variable(name));
                let mut merged = holders.next()?.clone();
                for other in holders {
                    merge_attributes(&mut merged.attributes, &other.attributes);
                }
                merged.shape = merged
                    .dimensions
                    .iter()
                    .zip(&merged.shape)
                    .map(|(dim, len)| {
                        dimensions
                            .iter()
                            .find(|d| &d.name == dim)
                            .map_or(*len, |d| d.length)
                    })
                    .collect();
                Some(merged)
            })
            .collect();

        let mut global_attributes = Attributes::new();
        for record in records {
            merge_attributes(&mut global_attributes, &record.global_attributes);
        }

        UnifiedRecord {
            sources: records.iter().map(|r| r.source.uri.clone()).collect(),
            byte_size: records.iter().map(|r| r.source.byte_size).sum(),
            data_bytes: records.iter().map(|r| r.data_bytes).sum(),
            dimensions,
            variables,
            global_attributes,
            time: time.union,
            accepted_conflicts: self.report.has_blocking(),
        }
    }
}

/// Step of an axis in seconds, estimated from its span when not recorded.
fn step_seconds(calendar: Calendar, axis: &TimeAxis) -> Option<f64> {
    if let Some(step) = axis.step_seconds {
        return Some(step);
    }
    let (start, end) = (axis.start.as_ref()?, axis.end.as_ref()?);
    if axis.length < 2 {
        return None;
    }
    let span = calendar.seconds_between(start, end).ok()?;
    (span > 0.0).then(|| span / (axis.length - 1) as f64)
}

/// Union of attribute sets; values already present are kept.
fn merge_attributes(into: &mut Attributes, from: &Attributes) {
    for (key, value) in from {
        into.entry(key.clone()).or_insert_with(|| value.clone());
    }
}

/// Reconcile records believed to form one logical dataset.
pub fn reconcile(records: &[NormalizedRecord], options: ReconcileOptions) -> Reconciliation {
    let mut reconciler = Reconciler {
        records,
        options,
        report: ConflictReport::default(),
    };
    if records.is_empty() {
        return Reconciliation {
            unified: None,
            report: reconciler.report,
        };
    }

    let dimension_names = ordered_names(records, |r| r.dimensions.iter().map(|d| d.name.as_str()));
    let variable_names = ordered_names(records, |r| r.variables.iter().map(|v| v.name.as_str()));

    reconciler.check_dimensions(&dimension_names);
    reconciler.check_variables(&variable_names);
    let globals: Vec<(usize, &Attributes)> = records
        .iter()
        .enumerate()
        .map(|(i, r)| (i, &r.global_attributes))
        .collect();
    reconciler.check_attributes("attributes.", &globals, &[]);
    let time = reconciler.check_time();

    let blocked = reconciler.report.has_blocking();
    let unified = if !blocked || options.accept_conflicts {
        Some(reconciler.unify(&dimension_names, &variable_names, time))
    } else {
        None
    };

    debug!(
        records = records.len(),
        conflicts = reconciler.report.conflicts.len(),
        blocked,
        unified = unified.is_some(),
        "Reconciled records"
    );
    Reconciliation {
        unified,
        report: reconciler.report,
    }
}
