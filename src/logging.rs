//! Logging utilities for metadata-inspector.
//!
//! The library only emits `tracing` events; the binary installs the
//! subscriber through [`init_tracing`]. Events carry structured fields
//! (`operation`, `operation_id`, `uri`, `duration_ms`) so batch runs stay
//! searchable.

use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::InspectError;
use crate::model::NormalizedRecord;

/// Initialize the tracing subscriber with the given log level.
///
/// `RUST_LOG` wins over the configured level. Output goes to stderr so the
/// report on stdout stays machine readable.
pub fn init_tracing(log_level: &str) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(val) => val,
        Err(_) => log_level.to_string(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

/// Log a start message for a significant operation
pub fn log_operation_start(operation: &str, operation_id: &str, details: Option<&str>) {
    if let Some(details) = details {
        info!(
            operation = operation,
            operation_id = operation_id,
            details = details,
            "Starting operation"
        );
    } else {
        info!(operation = operation, operation_id = operation_id, "Starting operation");
    }
}

/// Log the completion of a significant operation
pub fn log_operation_end(operation: &str, operation_id: &str, start_time: Instant, success: bool) {
    let duration_ms = start_time.elapsed().as_secs_f64() * 1000.0;

    if success {
        info!(
            operation = operation,
            operation_id = operation_id,
            duration_ms = duration_ms,
            "Operation completed successfully"
        );
    } else {
        warn!(
            operation = operation,
            operation_id = operation_id,
            duration_ms = duration_ms,
            "Operation completed with failures"
        );
    }
}

/// Run `f`, logging its duration under `operation`.
pub fn log_timed_operation<F, R>(operation: &str, f: F) -> R
where
    F: FnOnce() -> R,
{
    let start = Instant::now();
    let operation_id = Uuid::new_v4();

    debug!(
        operation = operation,
        operation_id = %operation_id,
        "Starting operation"
    );

    let result = f();

    debug!(
        operation = operation,
        operation_id = %operation_id,
        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
        "Operation completed"
    );

    result
}

/// Log what was extracted from one source.
pub fn log_source_stats(record: &NormalizedRecord) {
    let var_names: Vec<&str> = record.variables.iter().map(|v| v.name.as_str()).collect();
    let dims: Vec<String> = record
        .dimensions
        .iter()
        .map(|d| format!("{}={}", d.name, d.length))
        .collect();
    info!(
        operation = "extract",
        uri = %record.source.uri,
        backend = %record.source.backend_kind,
        var_count = var_names.len(),
        vars = %var_names.join(", "),
        dims = %dims.join(", "),
        byte_size = record.source.byte_size,
        time = record.time.variable().unwrap_or("none"),
        "Source inspected"
    );
}

/// Log a per-source failure. Retryable failures are warnings.
pub fn log_source_error(error: &InspectError, uri: &str) {
    if error.is_retryable() {
        warn!(error = %error, uri = uri, error_kind = error.kind(), "Source unreachable");
    } else {
        error!(error = %error, uri = uri, error_kind = error.kind(), "Source failed");
    }
}

/// Log an error with context
pub fn log_error(error: &InspectError, context: &str) {
    error!(
        error = %error,
        context = context,
        error_kind = error.kind(),
        "Error occurred"
    );
}

/// Generate a unique operation ID
pub fn generate_operation_id() -> String {
    Uuid::new_v4().to_string()
}
