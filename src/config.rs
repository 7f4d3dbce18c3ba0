//! Configuration management for metadata-inspector.
//!
//! This module handles the layered configuration system with the following precedence:
//! 1. Command-line arguments (highest priority)
//! 2. Environment variables
//! 3. JSON config file
//! 4. Default values (lowest priority)

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{InspectError, Result};

/// Command-line arguments for metadata-inspector
#[derive(Parser, Debug, Default)]
#[command(name = "metadata-inspector")]
#[command(author, version, about = "Inspect meta data of weather/climate datasets", long_about = None)]
pub struct Args {
    /// Input files, directories, glob patterns or s3:// URIs
    #[arg(required = true)]
    pub inputs: Vec<String>,

    /// Emit the structured JSON document instead of text
    #[arg(long)]
    pub json: bool,

    /// Treat attribute and time-coverage conflicts as blocking
    #[arg(long, env = "METADATA_INSPECTOR_STRICT")]
    pub strict: bool,

    /// Build the unified view even when blocking conflicts exist
    #[arg(long)]
    pub accept_conflicts: bool,

    /// Abort the whole run on the first failing source
    #[arg(long, env = "METADATA_INSPECTOR_FAIL_FAST")]
    pub fail_fast: bool,

    /// Per-source timeout in seconds
    #[arg(long, env = "METADATA_INSPECTOR_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Number of sources inspected concurrently
    #[arg(long, env = "METADATA_INSPECTOR_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Custom S3-compatible endpoint URL
    #[arg(long, env = "METADATA_INSPECTOR_S3_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Object storage region
    #[arg(long, env = "METADATA_INSPECTOR_S3_REGION")]
    pub region: Option<String>,

    /// Access public buckets without signing requests
    #[arg(long, env = "METADATA_INSPECTOR_ANONYMOUS")]
    pub anonymous: bool,

    /// Path to JSON configuration file
    #[arg(short, long, env = "METADATA_INSPECTOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "METADATA_INSPECTOR_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Turn on debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Object storage configuration, handed opaquely to the store builder
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// S3-compatible endpoint (None = AWS)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Region (None = taken from the environment)
    #[serde(default)]
    pub region: Option<String>,

    /// Allow plain-HTTP endpoints
    #[serde(default)]
    pub allow_http: bool,

    /// Skip request signing for public buckets
    #[serde(default)]
    pub skip_signature: bool,
}

/// Per-run inspection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InspectConfig {
    /// Timeout for resolving and normalizing one source
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum number of sources in flight
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Abort on the first per-source failure
    #[serde(default)]
    pub fail_fast: bool,

    /// Longer time coordinates are sampled at their endpoints only
    #[serde(default = "default_max_coordinate_values")]
    pub max_coordinate_values: u64,
}

/// Reconciliation policy
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Attribute and time-coverage conflicts block unification
    #[serde(default)]
    pub strict: bool,

    /// Produce a unified record even when blocking conflicts exist
    #[serde(default)]
    pub accept_conflicts: bool,
}

/// Complete configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub inspect: InspectConfig,

    #[serde(default)]
    pub reconcile: ReconcileOptions,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with proper precedence
    pub fn load() -> Result<(Self, Args)> {
        let args = Args::parse();
        let config = Self::from_args(&args)?;
        Ok((config, args))
    }

    /// Build the configuration for already-parsed arguments
    pub fn from_args(args: &Args) -> Result<Self> {
        // Start with defaults
        let mut config = Config::default();

        // Load from JSON file if provided
        if let Some(config_path) = &args.config {
            let json_config = Self::load_from_file(config_path)?;
            config.merge(json_config);
        }

        // Override with command-line arguments and their environment variables
        config.reconcile.strict |= args.strict;
        config.reconcile.accept_conflicts |= args.accept_conflicts;
        config.inspect.fail_fast |= args.fail_fast;
        if let Some(timeout) = args.timeout {
            config.inspect.timeout_secs = timeout;
        }
        if let Some(concurrency) = args.concurrency {
            config.inspect.concurrency = concurrency;
        }
        if args.endpoint.is_some() {
            config.storage.endpoint = args.endpoint.clone();
            config.storage.allow_http = config
                .storage
                .endpoint
                .as_deref()
                .is_some_and(|e| e.starts_with("http://"));
        }
        if args.region.is_some() {
            config.storage.region = args.region.clone();
        }
        config.storage.skip_signature |= args.anonymous;
        if let Some(level) = &args.log_level {
            config.log_level = level.clone();
        }
        if args.verbose {
            config.log_level = "debug".to_string();
        }

        Ok(config)
    }

    /// Load configuration from a JSON file
    fn load_from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| InspectError::Config {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        if other.storage.endpoint.is_some() {
            self.storage.endpoint = other.storage.endpoint;
        }
        if other.storage.region.is_some() {
            self.storage.region = other.storage.region;
        }
        self.storage.allow_http = other.storage.allow_http;
        self.storage.skip_signature = other.storage.skip_signature;
        self.inspect = other.inspect;
        self.reconcile = other.reconcile;
        self.log_level = other.log_level;
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.inspect.timeout_secs == 0 {
            return Err(InspectError::Config {
                message: "Timeout must be at least one second".to_string(),
            });
        }

        if self.inspect.concurrency == 0 {
            return Err(InspectError::Config {
                message: "Concurrency cannot be 0".to_string(),
            });
        }

        if self.inspect.max_coordinate_values < 2 {
            return Err(InspectError::Config {
                message: "max_coordinate_values must be at least 2".to_string(),
            });
        }

        // Validate log level
        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(InspectError::Config {
                    message: format!(
                        "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                        self.log_level
                    ),
                });
            }
        }

        if let Some(endpoint) = &self.storage.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(InspectError::Config {
                    message: format!("Endpoint must be an http(s) URL: {}", endpoint),
                });
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            inspect: InspectConfig::default(),
            reconcile: ReconcileOptions::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for InspectConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
            fail_fast: false,
            max_coordinate_values: default_max_coordinate_values(),
        }
    }
}

// Default value functions for serde
fn default_timeout_secs() -> u64 {
    30
}

fn default_concurrency() -> usize {
    8
}

fn default_max_coordinate_values() -> u64 {
    100_000
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.inspect.timeout_secs, 30);
        assert_eq!(config.inspect.concurrency, 8);
        assert!(!config.inspect.fail_fast);
        assert!(!config.reconcile.strict);
        assert_eq!(config.log_level, "warn");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_merge() {
        let mut config1 = Config::default();
        let mut config2 = Config::default();

        config2.inspect.timeout_secs = 5;
        config2.storage.region = Some("eu-central-1".to_string());

        config1.merge(config2);

        assert_eq!(config1.inspect.timeout_secs, 5);
        assert_eq!(config1.storage.region.as_deref(), Some("eu-central-1"));
    }

    #[test]
    fn test_args_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"inspect": {{"timeout_secs": 10, "fail_fast": false}}, "log_level": "info"}}"#
        )
        .unwrap();

        let args = Args {
            inputs: vec!["a.nc".to_string()],
            config: Some(file.path().to_path_buf()),
            timeout: Some(3),
            fail_fast: true,
            verbose: true,
            ..Default::default()
        };
        let config = Config::from_args(&args).unwrap();

        assert_eq!(config.inspect.timeout_secs, 3);
        assert!(config.inspect.fail_fast);
        assert_eq!(config.inspect.concurrency, 8);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.inspect.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.inspect.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.log_level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.storage.endpoint = Some("minio:9000".to_string());
        assert!(config.validate().is_err());
    }
}
