//! # metadata-inspector
//!
//! Inspect and cross-check the metadata of gridded scientific datasets
//! (netCDF classic, netCDF-4/HDF5 and zarr) on local disk or S3-compatible
//! object storage, without reading bulk array payloads.
//!
//! ## Pipeline
//!
//! - **Resolver**: classifies each input and measures its storage footprint
//! - **Backends**: one adapter per format family behind [`backend::BackendAdapter`]
//! - **Normalizer**: turns an adapter into a [`model::NormalizedRecord`],
//!   decoding the time axis with the CF calendars in [`calendar`]
//! - **Reconciler**: checks records against each other and merges them
//! - **Report**: a deterministic, serializable document plus a text rendering
//!
//! [`inspect::inspect`] runs the whole pipeline for a batch of inputs.

pub mod backend;
pub mod calendar;
pub mod config;
pub mod error;
pub mod inspect;
pub mod logging;
pub mod model;
pub mod normalizer;
pub mod reconciler;
pub mod render;
pub mod report;
pub mod resolver;
pub mod size;
pub mod store;

pub use config::{Config, ReconcileOptions};
pub use error::{InspectError, Result};
pub use inspect::{inspect, Inspection};
pub use logging::{
    generate_operation_id, init_tracing, log_error, log_operation_end, log_operation_start,
    log_timed_operation,
};
pub use model::{
    AttributeValue, BackendKind, DataType, DatasetSource, DimensionSpec, NormalizedRecord,
    TimeAxis, TimeStatus, VariableSpec,
};
pub use reconciler::{reconcile, Conflict, ConflictKind, ConflictReport, Reconciliation, UnifiedRecord};
pub use render::render_text;
pub use report::{assemble, Report, SourceOutcome};
pub use size::{format_bytes, format_size};
