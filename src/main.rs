//! metadata-inspector command-line entry point.
//!
//! Exit codes: 0 success, 1 total failure, 2 configuration or usage error,
//! 3 partial failure or blocking conflicts.

use anyhow::Context;
use std::process::ExitCode;
use tracing::{error, info};

use metadata_inspector::config::Args;
use metadata_inspector::{init_tracing, inspect, log_error, render_text, Config, InspectError};

const EXIT_FAILURE: u8 = 1;
const EXIT_USAGE: u8 = 2;
const EXIT_PARTIAL: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    let (config, args) = match Config::load().and_then(|(config, args)| {
        config.validate()?;
        Ok((config, args))
    }) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::from(EXIT_USAGE);
        }
    };

    init_tracing(&config.log_level);
    info!("Starting metadata-inspector v{}", env!("CARGO_PKG_VERSION"));

    match run(&config, &args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            match e.downcast_ref::<InspectError>() {
                Some(InspectError::Config { .. }) => ExitCode::from(EXIT_USAGE),
                _ => ExitCode::from(EXIT_FAILURE),
            }
        }
    }
}

async fn run(config: &Config, args: &Args) -> anyhow::Result<ExitCode> {
    let inspection = inspect(&args.inputs, config).await.map_err(|e| {
        log_error(&e, "inspect");
        e
    })?;
    let report = &inspection.report;

    let output = if args.json {
        serde_json::to_string_pretty(report).context("Failed to serialize report")?
    } else {
        render_text(report)
    };
    println!("{}", output.trim_end());

    if report.succeeded == 0 {
        Ok(ExitCode::from(EXIT_FAILURE))
    } else if report.is_partial() || report.has_blocking_conflicts() {
        Ok(ExitCode::from(EXIT_PARTIAL))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
