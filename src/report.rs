//! Report assembly.
//!
//! Turns per-source outcomes and the reconciliation into one serializable
//! document. Field order is fixed by the struct declarations and attribute
//! maps are sorted, so equal inputs serialize to identical bytes.

use serde::Serialize;

use crate::error::InspectError;
use crate::model::{Attributes, BackendKind, DimensionSpec, NormalizedRecord, TimeStatus, VariableSpec};
use crate::reconciler::{Conflict, Note, Reconciliation, TimeLink, UnifiedRecord, UnifiedTime};
use crate::size::format_bytes;

/// Result of inspecting one input, kept in input order.
#[derive(Debug)]
pub struct SourceOutcome {
    pub uri: String,
    pub result: Result<NormalizedRecord, InspectError>,
}

impl SourceOutcome {
    pub fn record(&self) -> Option<&NormalizedRecord> {
        self.result.as_ref().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceReport {
    pub uri: String,
    pub backend: BackendKind,
    pub byte_size: u64,
    pub size: String,
    pub data_bytes: u64,
    pub data_size: String,
    pub dimensions: Vec<DimensionSpec>,
    pub coordinates: Vec<VariableSpec>,
    pub data_variables: Vec<VariableSpec>,
    pub global_attributes: Attributes,
    pub time: TimeStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceFailure {
    pub uri: String,
    pub kind: &'static str,
    pub message: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceEntry {
    Ok(Box<SourceReport>),
    Error(SourceFailure),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedReport {
    pub sources: Vec<String>,
    pub byte_size: u64,
    pub size: String,
    pub data_bytes: u64,
    pub data_size: String,
    pub dimensions: Vec<DimensionSpec>,
    pub coordinates: Vec<VariableSpec>,
    pub data_variables: Vec<VariableSpec>,
    pub global_attributes: Attributes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<UnifiedTime>,
    pub accepted_conflicts: bool,
}

/// Cross-source section, present when two or more sources were reconciled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub compatible: bool,
    pub blocking: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unified: Option<UnifiedReport>,
    pub conflicts: Vec<Conflict>,
    pub time_links: Vec<TimeLink>,
    pub notes: Vec<Note>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub succeeded: usize,
    pub failed: usize,
    pub sources: Vec<SourceEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
}

impl Report {
    pub fn is_partial(&self) -> bool {
        self.failed > 0
    }

    pub fn has_blocking_conflicts(&self) -> bool {
        self.summary.as_ref().is_some_and(|s| s.blocking)
    }

    /// Structured document as a JSON value.
    pub fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

fn split_variables(variables: &[VariableSpec]) -> (Vec<VariableSpec>, Vec<VariableSpec>) {
    variables.iter().cloned().partition(|v| v.is_coordinate)
}

fn source_report(record: &NormalizedRecord) -> SourceReport {
    let (coordinates, data_variables) = split_variables(&record.variables);
    SourceReport {
        uri: record.source.uri.clone(),
        backend: record.source.backend_kind,
        byte_size: record.source.byte_size,
        size: format_bytes(record.source.byte_size),
        data_bytes: record.data_bytes,
        data_size: format_bytes(record.data_bytes),
        dimensions: record.dimensions.clone(),
        coordinates,
        data_variables,
        global_attributes: record.global_attributes.clone(),
        time: record.time.clone(),
    }
}

fn unified_report(unified: &UnifiedRecord) -> UnifiedReport {
    let (coordinates, data_variables) = split_variables(&unified.variables);
    UnifiedReport {
        sources: unified.sources.clone(),
        byte_size: unified.byte_size,
        size: format_bytes(unified.byte_size),
        data_bytes: unified.data_bytes,
        data_size: format_bytes(unified.data_bytes),
        dimensions: unified.dimensions.clone(),
        coordinates,
        data_variables,
        global_attributes: unified.global_attributes.clone(),
        time: unified.time.clone(),
        accepted_conflicts: unified.accepted_conflicts,
    }
}

/// Assemble the report from outcomes in input order and an optional
/// reconciliation of the successful records.
pub fn assemble(outcomes: &[SourceOutcome], reconciliation: Option<&Reconciliation>) -> Report {
    let sources: Vec<SourceEntry> = outcomes
        .iter()
        .map(|outcome| match &outcome.result {
            Ok(record) => SourceEntry::Ok(Box::new(source_report(record))),
            Err(e) => SourceEntry::Error(SourceFailure {
                uri: outcome.uri.clone(),
                kind: e.kind(),
                message: e.to_string(),
                retryable: e.is_retryable(),
            }),
        })
        .collect();
    let succeeded = outcomes.iter().filter(|o| o.result.is_ok()).count();

    let summary = reconciliation.map(|r| Summary {
        compatible: r.report.is_empty(),
        blocking: r.report.has_blocking(),
        unified: r.unified.as_ref().map(unified_report),
        conflicts: r.report.conflicts.clone(),
        time_links: r.report.time_links.clone(),
        notes: r.report.notes.clone(),
    });

    Report {
        succeeded,
        failed: outcomes.len() - succeeded,
        sources,
        summary,
    }
}
