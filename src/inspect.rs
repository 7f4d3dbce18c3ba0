//! Batch inspection: expand inputs, extract every source concurrently,
//! then reconcile and assemble once all extractions have finished.

use futures::stream::{self, StreamExt};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::backend::extract;
use crate::config::Config;
use crate::error::{InspectError, Result};
use crate::logging::{
    generate_operation_id, log_operation_end, log_operation_start, log_source_error,
    log_source_stats, log_timed_operation,
};
use crate::model::NormalizedRecord;
use crate::reconciler::{reconcile, Reconciliation};
use crate::report::{assemble, Report, SourceOutcome};
use crate::resolver::{expand_inputs, resolve};

/// Everything one inspection produced.
#[derive(Debug)]
pub struct Inspection {
    pub outcomes: Vec<SourceOutcome>,
    /// Present when at least two sources were extracted
    pub reconciliation: Option<Reconciliation>,
    pub report: Report,
}

impl Inspection {
    pub fn records(&self) -> impl Iterator<Item = &NormalizedRecord> {
        self.outcomes.iter().filter_map(SourceOutcome::record)
    }
}

/// One finished source and whether it got past resolution.
struct Attempt {
    outcome: SourceOutcome,
    resolved: bool,
}

/// Resolve and extract one source under the per-source timeout.
pub async fn inspect_source(uri: String, config: &Config) -> SourceOutcome {
    attempt(uri, config).await.outcome
}

async fn attempt(uri: String, config: &Config) -> Attempt {
    let timeout = Duration::from_secs(config.inspect.timeout_secs);
    let mut resolved = false;
    let work = async {
        let source = resolve(&uri, &config.storage).await?;
        resolved = true;
        extract(source, &config.storage, config.inspect.max_coordinate_values).await
    };

    let result = match tokio::time::timeout(timeout, work).await {
        Ok(result) => result,
        Err(_) => Err(InspectError::unreachable(
            &uri,
            format!("timed out after {}s", config.inspect.timeout_secs),
        )),
    };

    match &result {
        Ok(record) => log_source_stats(record),
        Err(e) => log_source_error(e, &uri),
    }
    Attempt {
        outcome: SourceOutcome { uri, result },
        resolved,
    }
}

/// Inspect all inputs and build the report.
///
/// Per-source failures land in that source's slot. The call itself fails
/// only when nothing could be expanded, when no source could even be
/// resolved, or on the first failure if `fail_fast` is set. Sources that
/// resolved but could not be read still get a report.
pub async fn inspect<S: AsRef<str>>(inputs: &[S], config: &Config) -> Result<Inspection> {
    let operation_id = generate_operation_id();
    let start = Instant::now();

    let uris = expand_inputs(inputs)?;
    log_operation_start("inspect", &operation_id, Some(&format!("{} source(s)", uris.len())));

    let count = uris.len();
    let mut pending = stream::iter(uris)
        .map(|uri| attempt(uri, config))
        .buffered(config.inspect.concurrency.max(1));

    let mut outcomes = Vec::with_capacity(count);
    let mut resolved = 0;
    while let Some(Attempt { outcome, resolved: ok }) = pending.next().await {
        if config.inspect.fail_fast {
            if let Err(e) = outcome.result {
                debug!(uri = %outcome.uri, "Stopping at first failure");
                log_operation_end("inspect", &operation_id, start, false);
                return Err(e);
            }
        }
        resolved += usize::from(ok);
        outcomes.push(outcome);
    }

    let records: Vec<NormalizedRecord> = outcomes
        .iter()
        .filter_map(SourceOutcome::record)
        .cloned()
        .collect();
    if resolved == 0 {
        log_operation_end("inspect", &operation_id, start, false);
        return Err(InspectError::AllSourcesFailed { count });
    }

    let reconciliation = (records.len() >= 2).then(|| {
        log_timed_operation("reconcile", || reconcile(&records, config.reconcile))
    });
    let report = assemble(&outcomes, reconciliation.as_ref());

    info!(
        operation_id = %operation_id,
        succeeded = report.succeeded,
        failed = report.failed,
        conflicts = reconciliation.as_ref().map_or(0, |r| r.report.conflicts.len()),
        "Inspection finished"
    );
    log_operation_end("inspect", &operation_id, start, report.failed == 0);

    Ok(Inspection {
        outcomes,
        reconciliation,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn zarr_store(dir: &std::path::Path, name: &str) -> String {
        let root = dir.join(name);
        fs::create_dir_all(root.join("tas")).unwrap();
        fs::write(root.join(".zgroup"), r#"{"zarr_format": 2}"#).unwrap();
        fs::write(root.join(".zattrs"), r#"{"title": "test"}"#).unwrap();
        fs::write(
            root.join("tas/.zarray"),
            r#"{"zarr_format": 2, "shape": [2, 3], "chunks": [2, 3], "dtype": "<f4",
                "compressor": null, "fill_value": null, "filters": null, "order": "C"}"#,
        )
        .unwrap();
        fs::write(root.join("tas/.zattrs"), r#"{"_ARRAY_DIMENSIONS": ["y", "x"]}"#).unwrap();
        root.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_missing_source_keeps_slot() {
        let dir = TempDir::new().unwrap();
        let good = zarr_store(dir.path(), "a.zarr");
        let missing = dir.path().join("nope").join("b.nc").to_string_lossy().into_owned();

        let inspection = inspect(&[good.clone(), missing.clone()], &Config::default())
            .await
            .unwrap();

        assert_eq!(inspection.report.succeeded, 1);
        assert_eq!(inspection.report.failed, 1);
        assert!(inspection.reconciliation.is_none());
        assert_eq!(inspection.outcomes[0].uri, good);
        assert!(matches!(
            inspection.outcomes[1].result,
            Err(InspectError::SourceNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_fail_fast_returns_first_error() {
        let dir = TempDir::new().unwrap();
        let good = zarr_store(dir.path(), "a.zarr");
        let missing = dir.path().join("nope").join("b.nc").to_string_lossy().into_owned();
        let mut config = Config::default();
        config.inspect.fail_fast = true;

        let err = inspect(&[good, missing], &config).await.unwrap_err();
        assert!(matches!(err, InspectError::SourceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_no_resolvable_source() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope").join("b.nc").to_string_lossy().into_owned();

        let err = inspect(&[missing], &Config::default()).await.unwrap_err();
        assert!(matches!(err, InspectError::AllSourcesFailed { count: 1 }));
    }

    #[tokio::test]
    async fn test_unreadable_sources_still_get_a_report() {
        let dir = TempDir::new().unwrap();
        let broken = dir.path().join("broken.zarr");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join(".zgroup"), "{ not json").unwrap();
        let broken = broken.to_string_lossy().into_owned();

        let inspection = inspect(&[broken.clone()], &Config::default()).await.unwrap();
        let report = &inspection.report;
        assert_eq!((report.succeeded, report.failed), (0, 1));
        assert!(report.summary.is_none());
        assert!(inspection.reconciliation.is_none());
        assert!(matches!(
            inspection.outcomes[0].result,
            Err(InspectError::CorruptMetadata { ref uri, .. }) if *uri == broken
        ));
    }

    #[tokio::test]
    async fn test_two_stores_are_reconciled() {
        let dir = TempDir::new().unwrap();
        let a = zarr_store(dir.path(), "a.zarr");
        let b = zarr_store(dir.path(), "b.zarr");

        let inspection = inspect(&[a, b], &Config::default()).await.unwrap();
        let reconciliation = inspection.reconciliation.as_ref().unwrap();
        assert!(reconciliation.report.is_empty());
        let unified = reconciliation.unified.as_ref().unwrap();
        assert_eq!(
            unified.byte_size,
            inspection.records().map(|r| r.source.byte_size).sum::<u64>()
        );
    }
}
