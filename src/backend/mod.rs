//! Backend adapters: one implementation per storage format family.
//!
//! An adapter answers structural questions about one opened source. It is
//! selected from [`BackendKind`], never by sniffing, and lives only for the
//! duration of one [`extract`] call.

#[cfg(feature = "netcdf")]
pub mod netcdf;
pub mod zarr;

use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::calendar::looks_like_time_units;
use crate::config::StorageConfig;
use crate::error::{InspectError, Result};
use crate::model::{AttributeValue, BackendKind, DataType, DatasetSource, DimensionSpec, NormalizedRecord};
use crate::normalizer::normalize;
use crate::store::{open_object_store, ObjectMetadataStore};

/// Where an attribute lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeScope<'a> {
    Global,
    Variable(&'a str),
}

/// Values of a 1-D coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateValues {
    /// Number of elements in the coordinate
    pub length: u64,
    /// All values when `complete`, otherwise only the first and last
    pub values: Vec<f64>,
    pub complete: bool,
}

/// Uniform metadata contract over a concrete storage format.
///
/// Only structural metadata, attribute values and the values of the time
/// coordinate are ever read. Bulk variable payloads are not.
pub trait BackendAdapter {
    fn source(&self) -> &DatasetSource;

    fn list_dimensions(&self) -> Result<Vec<DimensionSpec>>;

    /// Variable names in storage order.
    fn list_variables(&self) -> Result<Vec<String>>;

    fn attribute_names(&self, scope: AttributeScope<'_>) -> Result<Vec<String>>;

    fn get_attribute(&self, scope: AttributeScope<'_>, name: &str) -> Result<Option<AttributeValue>>;

    fn get_variable_dimensions(&self, name: &str) -> Result<Vec<String>>;

    fn get_variable_shape(&self, name: &str) -> Result<Vec<u64>>;

    fn get_variable_dtype(&self, name: &str) -> Result<DataType>;

    /// Values of a 1-D coordinate, `None` when they cannot be read.
    fn read_coordinate(&self, name: &str) -> Result<Option<CoordinateValues>>;

    /// Pick the time coordinate by CF naming and attribute conventions.
    ///
    /// Evidence is a `<unit> since <date>` units attribute, a datetime dtype,
    /// `axis = "T"`, `standard_name = "time"` or the name `time`. Coordinate
    /// variables win ties against auxiliary ones; then storage order decides.
    fn get_time_variable_name(&self) -> Result<Option<String>> {
        let mut best: Option<(u32, String)> = None;
        for name in self.list_variables()? {
            let dims = self.get_variable_dimensions(&name)?;
            if dims.len() != 1 {
                continue;
            }
            let text = |attr: &str| -> Result<Option<String>> {
                Ok(self
                    .get_attribute(AttributeScope::Variable(&name), attr)?
                    .and_then(|v| v.as_text().map(str::to_string)))
            };

            let mut score = 0;
            if text("units")?.is_some_and(|u| looks_like_time_units(&u)) {
                score += 4;
            }
            if matches!(self.get_variable_dtype(&name)?, DataType::DateTime(_)) {
                score += 4;
            }
            if text("axis")?.is_some_and(|a| a.trim().eq_ignore_ascii_case("t")) {
                score += 2;
            }
            if text("standard_name")?.is_some_and(|s| s.trim() == "time") {
                score += 2;
            }
            if name.eq_ignore_ascii_case("time") {
                score += 2;
            }
            if score == 0 {
                continue;
            }
            if dims[0] == name {
                score += 1;
            }
            if best.as_ref().map_or(true, |(top, _)| score > *top) {
                best = Some((score, name));
            }
        }
        Ok(best.map(|(_, name)| name))
    }
}

/// Open the adapter matching `source.backend_kind`, normalize, release.
pub async fn extract(
    source: DatasetSource,
    storage: &StorageConfig,
    max_coordinate_values: u64,
) -> Result<NormalizedRecord> {
    let start = Instant::now();
    let uri = source.uri.clone();
    let kind = source.backend_kind;

    let record = match kind {
        BackendKind::Zarr => {
            let inner = open_object_store(&source.uri, &source.location, storage)?;
            let store = Arc::new(ObjectMetadataStore::new(inner.clone(), ""));
            let chunks = zarr::chunk_store(inner);
            let adapter = zarr::ZarrAdapter::open(source, store, chunks, max_coordinate_values).await?;
            normalize(&adapter)?
        }
        BackendKind::Hdf5Netcdf | BackendKind::Other => {
            extract_netcdf(source, storage.clone(), max_coordinate_values).await?
        }
    };

    debug!(
        uri = %uri,
        backend = %kind,
        duration_ms = start.elapsed().as_millis() as u64,
        variables = record.variables.len(),
        "Extracted metadata"
    );
    Ok(record)
}

#[cfg(feature = "netcdf")]
async fn extract_netcdf(
    source: DatasetSource,
    storage: StorageConfig,
    max_coordinate_values: u64,
) -> Result<NormalizedRecord> {
    let uri = source.uri.clone();
    tokio::task::spawn_blocking(move || {
        let adapter = self::netcdf::NetCdfAdapter::open(source, &storage, max_coordinate_values)?;
        normalize(&adapter)
    })
    .await
    .map_err(|e| InspectError::corrupt(&uri, format!("extraction task failed: {}", e)))?
}

#[cfg(not(feature = "netcdf"))]
async fn extract_netcdf(
    source: DatasetSource,
    _storage: StorageConfig,
    _max_coordinate_values: u64,
) -> Result<NormalizedRecord> {
    Err(InspectError::unsupported(
        &source.uri,
        "built without netCDF support",
    ))
}
