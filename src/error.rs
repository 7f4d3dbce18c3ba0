//! Error types for metadata-inspector.
//!
//! Per-source failures (`SourceNotFound` through `Normalization`) are fatal for
//! that one source only; the inspection driver attaches them to the source's
//! slot in the report instead of aborting the batch. Reconciliation findings
//! are not errors at all, see [`crate::reconciler`].

use thiserror::Error;

/// The main error type for metadata-inspector operations.
#[derive(Error, Debug)]
pub enum InspectError {
    /// The path or object does not exist
    #[error("Source not found: {uri}")]
    SourceNotFound { uri: String },

    /// The remote endpoint could not be contacted (network, auth, timeout)
    #[error("Source unreachable: {uri} - {message}")]
    SourceUnreachable { uri: String, message: String },

    /// No backend accepts the source
    #[error("Unsupported format: {uri} - {message}")]
    UnsupportedFormat { uri: String, message: String },

    /// The source opened but its structural metadata cannot be parsed
    #[error("Corrupt metadata: {uri} - {message}")]
    CorruptMetadata { uri: String, message: String },

    /// Dimension/variable structural invariants are violated
    #[error("Normalization error: {uri} - {message}")]
    Normalization { uri: String, message: String },

    /// Negative byte count handed to the size formatter
    #[error("Invalid size: {value}")]
    InvalidSize { value: i64 },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Input expansion produced no sources at all
    #[error("No files found")]
    NoSources,

    /// No source could be resolved
    #[error("None of the {count} source(s) could be resolved")]
    AllSourcesFailed { count: usize },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// NetCDF library errors not attributable to a specific source
    #[cfg(feature = "netcdf")]
    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),
}

impl InspectError {
    /// Only unreachable sources are worth retrying; a missing object stays missing.
    pub fn is_retryable(&self) -> bool {
        matches!(self, InspectError::SourceUnreachable { .. })
    }

    /// Stable snake_case tag used in reports and for exit-code mapping.
    pub fn kind(&self) -> &'static str {
        match self {
            InspectError::SourceNotFound { .. } => "source_not_found",
            InspectError::SourceUnreachable { .. } => "source_unreachable",
            InspectError::UnsupportedFormat { .. } => "unsupported_format",
            InspectError::CorruptMetadata { .. } => "corrupt_metadata",
            InspectError::Normalization { .. } => "normalization_error",
            InspectError::InvalidSize { .. } => "invalid_size",
            InspectError::Config { .. } => "config",
            InspectError::NoSources => "no_sources",
            InspectError::AllSourcesFailed { .. } => "all_sources_failed",
            InspectError::Io(_) => "io",
            InspectError::Json(_) => "json",
            #[cfg(feature = "netcdf")]
            InspectError::NetCdf(_) => "netcdf",
        }
    }

    pub(crate) fn corrupt(uri: &str, message: impl Into<String>) -> Self {
        InspectError::CorruptMetadata {
            uri: uri.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn unsupported(uri: &str, message: impl Into<String>) -> Self {
        InspectError::UnsupportedFormat {
            uri: uri.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn unreachable(uri: &str, message: impl Into<String>) -> Self {
        InspectError::SourceUnreachable {
            uri: uri.to_string(),
            message: message.into(),
        }
    }
}

/// Convenience type alias for Results with InspectError
pub type Result<T> = std::result::Result<T, InspectError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unreachable_is_retryable() {
        let unreachable = InspectError::unreachable("s3://bucket/a.nc", "connection refused");
        let missing = InspectError::SourceNotFound {
            uri: "s3://bucket/a.nc".to_string(),
        };

        assert!(unreachable.is_retryable());
        assert!(!missing.is_retryable());
        assert_eq!(unreachable.kind(), "source_unreachable");
        assert_eq!(missing.kind(), "source_not_found");
    }

    #[test]
    fn test_display_includes_uri() {
        let err = InspectError::corrupt("/data/x.zarr", "bad .zarray");
        assert_eq!(
            err.to_string(),
            "Corrupt metadata: /data/x.zarr - bad .zarray"
        );
    }
}
