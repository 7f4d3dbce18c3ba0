//! Common test utilities for metadata-inspector.
//!
//! Fixtures write small netCDF files and zarr stores to scratch
//! directories; assertions inspect the assembled report.

pub mod assertions;
pub mod fixtures;
