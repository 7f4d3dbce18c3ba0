//! Plain-text rendering of a [`Report`].

use std::fmt::Write;

use crate::model::{Attributes, DimensionSpec, TimeStatus, VariableSpec};
use crate::reconciler::{Conflict, TimeRelation};
use crate::report::{Report, SourceEntry, Summary};

const INDENT: &str = "    ";

fn dimensions(out: &mut String, dims: &[DimensionSpec]) {
    let parts: Vec<String> = dims
        .iter()
        .map(|d| {
            if d.unlimited {
                format!("{}: {} (unlimited)", d.name, d.length)
            } else {
                format!("{}: {}", d.name, d.length)
            }
        })
        .collect();
    let _ = writeln!(out, "Dimensions:  ({})", parts.join(", "));
}

fn attributes(out: &mut String, attrs: &Attributes, depth: usize) {
    let pad = INDENT.repeat(depth);
    for (key, value) in attrs {
        let _ = writeln!(out, "{}{}: {}", pad, key, value);
    }
}

fn variables(out: &mut String, title: &str, vars: &[VariableSpec]) {
    if vars.is_empty() {
        return;
    }
    let _ = writeln!(out, "{}:", title);
    let width = vars.iter().map(|v| v.name.len()).max().unwrap_or(0);
    for var in vars {
        let marker = if var.is_coordinate { "*" } else { " " };
        let _ = writeln!(
            out,
            "  {} {:<width$}  ({})  {}",
            marker,
            var.name,
            var.dimensions.join(", "),
            var.dtype,
            width = width
        );
        attributes(out, &var.attributes, 2);
    }
}

fn time(out: &mut String, status: &TimeStatus) {
    match status {
        TimeStatus::Absent => {}
        TimeStatus::Decoded(axis) => {
            let _ = write!(out, "Time: {} [{}] {} values", axis.variable, axis.calendar, axis.length);
            match (&axis.start, &axis.end) {
                (Some(start), Some(end)) => {
                    let _ = write!(out, ", {} to {}", start, end);
                }
                _ => out.push_str(", coverage unknown"),
            }
            if let Some(step) = axis.step_seconds {
                let _ = write!(out, ", step {}s", step);
            } else if axis.regular == Some(false) {
                out.push_str(", irregular");
            }
            out.push('\n');
        }
        TimeStatus::Undecodable { variable, reason } => {
            let _ = writeln!(out, "Time: {} undecodable ({})", variable, reason);
        }
    }
}

fn conflict_line(conflict: &Conflict) -> String {
    format!(
        "{}{}: {}: {} = {} vs {} = {}",
        if conflict.blocking { "[blocking] " } else { "" },
        serde_json::to_value(conflict.kind)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default(),
        conflict.field,
        conflict.a.source,
        conflict.a.value,
        conflict.b.source,
        conflict.b.value
    )
}

fn summary(out: &mut String, summary: &Summary) {
    if let Some(unified) = &summary.unified {
        let _ = writeln!(
            out,
            "Unified dataset of {} sources (dataset-size: {}, storage: {})",
            unified.sources.len(),
            unified.data_size,
            unified.size
        );
        if unified.accepted_conflicts {
            let _ = writeln!(out, "{}produced despite blocking conflicts", INDENT);
        }
        dimensions(out, &unified.dimensions);
        if let Some(t) = &unified.time {
            let _ = writeln!(out, "Time: {} [{}] {} to {}", t.variable, t.calendar, t.start, t.end);
        }
    } else {
        out.push_str("No unified dataset: blocking conflicts\n");
    }

    if summary.conflicts.is_empty() {
        out.push_str("Conflicts: none\n");
    } else {
        let _ = writeln!(out, "Conflicts ({}):", summary.conflicts.len());
        for conflict in &summary.conflicts {
            let _ = writeln!(out, "{}{}", INDENT, conflict_line(conflict));
        }
    }

    let links: Vec<_> = summary
        .time_links
        .iter()
        .filter(|l| l.relation != TimeRelation::Identical)
        .collect();
    if !links.is_empty() {
        out.push_str("Time coverage:\n");
        for link in links {
            let _ = writeln!(out, "{}{} -> {}: {:?}", INDENT, link.first, link.second, link.relation);
        }
    }

    if !summary.notes.is_empty() {
        out.push_str("Notes:\n");
        for note in &summary.notes {
            match &note.source {
                Some(source) => {
                    let _ = writeln!(out, "{}{}: {}", INDENT, source, note.message);
                }
                None => {
                    let _ = writeln!(out, "{}{}", INDENT, note.message);
                }
            }
        }
    }
}

/// Render the report for a terminal.
pub fn render_text(report: &Report) -> String {
    let mut out = String::new();
    if report.succeeded == 0 && !report.sources.is_empty() {
        out.push_str("No data found, file(s) might be corrupted. See error messages below:

");
    }
    for entry in &report.sources {
        match entry {
            SourceEntry::Ok(source) => {
                let _ = writeln!(out, "{}", source.uri);
                let _ = writeln!(
                    out,
                    "Dataset (dataset-size: {}, storage: {})",
                    source.data_size, source.size
                );
                dimensions(&mut out, &source.dimensions);
                variables(&mut out, "Coordinates", &source.coordinates);
                variables(&mut out, "Data variables", &source.data_variables);
                if !source.global_attributes.is_empty() {
                    out.push_str("Attributes:\n");
                    attributes(&mut out, &source.global_attributes, 1);
                }
                time(&mut out, &source.time);
            }
            SourceEntry::Error(failure) => {
                let _ = writeln!(out, "{}", failure.uri);
                let _ = writeln!(out, "Error ({}): {}", failure.kind, failure.message);
            }
        }
        out.push('\n');
    }

    if let Some(s) = &report.summary {
        summary(&mut out, s);
    }
    out
}
