//! Assertion utilities for inspecting assembled reports.

use metadata_inspector::report::{Report, SourceEntry, SourceFailure, SourceReport, Summary};
use metadata_inspector::ConflictKind;

/// The successful entry at `index`, panicking with the failure otherwise.
pub fn source_ok(report: &Report, index: usize) -> &SourceReport {
    match &report.sources[index] {
        SourceEntry::Ok(source) => source,
        SourceEntry::Error(failure) => panic!(
            "source {} failed: {} ({})",
            failure.uri, failure.message, failure.kind
        ),
    }
}

/// The failed entry at `index`.
pub fn source_failed(report: &Report, index: usize) -> &SourceFailure {
    match &report.sources[index] {
        SourceEntry::Error(failure) => failure,
        SourceEntry::Ok(source) => panic!("source {} unexpectedly succeeded", source.uri),
    }
}

pub fn summary(report: &Report) -> &Summary {
    report
        .summary
        .as_ref()
        .expect("report has no cross-source summary")
}

/// Conflict kinds in report order.
pub fn conflict_kinds(report: &Report) -> Vec<ConflictKind> {
    summary(report).conflicts.iter().map(|c| c.kind).collect()
}

/// Assert a conflict of `kind` exists on `field`.
pub fn assert_conflict(report: &Report, kind: ConflictKind, field: &str) {
    let conflicts = &summary(report).conflicts;
    assert!(
        conflicts.iter().any(|c| c.kind == kind && c.field == field),
        "expected {:?} on '{}', got {:?}",
        kind,
        field,
        conflicts
    );
}
