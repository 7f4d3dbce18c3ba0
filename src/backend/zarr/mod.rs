//! Zarr hierarchical-store adapter (v2 and v3).
//!
//! Opening reads the group and array metadata documents of the root group,
//! preferring consolidated metadata when present, and builds a `zarrs` array
//! for each. Chunks are read for exactly one array: the time coordinate, so
//! its coverage can be decoded.

pub mod metadata;

use bytes::Bytes;
use object_store::ObjectStore;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use zarrs::array::{Array, ArrayError, DataType as ZarrDataType};
use zarrs::array_subset::ArraySubset;
use zarrs_object_store::AsyncObjectStore;

use self::metadata::{
    dtype_from_name, json_attribute, take_array_dimensions, v2_document, v3_document, ArrayDocument,
    ZarrFormat,
};
use super::{AttributeScope, BackendAdapter, CoordinateValues};
use crate::error::{InspectError, Result};
use crate::model::{AttributeValue, DataType, DatasetSource, DimensionSpec};
use crate::store::MetadataStore;

/// zarrs storage over the dataset's object store.
pub type ChunkStore = AsyncObjectStore<Arc<dyn ObjectStore>>;

/// Wrap a rooted object store for zarrs.
pub fn chunk_store(inner: Arc<dyn ObjectStore>) -> Arc<ChunkStore> {
    Arc::new(AsyncObjectStore::new(inner))
}

/// One root-level array.
struct ZarrVariable {
    name: String,
    shape: Vec<u64>,
    dtype: DataType,
    dimensions: Vec<String>,
    attributes: Map<String, Value>,
    fill_value: Option<f64>,
    datetime: bool,
    /// `None` when zarrs cannot open the array; its values are then unknown
    array: Option<Array<ChunkStore>>,
}

impl ZarrVariable {
    fn open(uri: &str, document: ArrayDocument, chunks: &Arc<ChunkStore>) -> Self {
        let path = format!("/{}", document.name);
        let array = document
            .metadata
            .clone()
            .map(|metadata| Array::new_with_metadata(chunks.clone(), &path, metadata));
        let array = match array {
            Some(Ok(array)) => array,
            Some(Err(e)) => {
                debug!(uri = %uri, array = %document.name, error = %e, "Array not supported by zarrs");
                return Self::declared(document);
            }
            None => {
                debug!(uri = %uri, array = %document.name, "Array metadata not readable by zarrs");
                return Self::declared(document);
            }
        };

        let mut attributes = array.attributes().clone();
        let carried = take_array_dimensions(&mut attributes);
        let declared = array.dimension_names().as_ref().and_then(|names| {
            names
                .iter()
                .map(|n| n.as_str().map(str::to_string))
                .collect::<Option<Vec<String>>>()
        });
        let dtype = match &document.datetime_unit {
            Some(unit) => DataType::DateTime(unit.clone()),
            None => zarr_dtype(array.data_type()),
        };
        let shape = array.shape().to_vec();
        Self {
            dimensions: dimension_names(&document.name, declared.or(carried), shape.len()),
            name: document.name,
            shape,
            dtype,
            attributes,
            fill_value: document.fill_value,
            datetime: document.datetime_unit.is_some(),
            array: Some(array),
        }
    }

    /// Describe an array from its document alone.
    fn declared(document: ArrayDocument) -> Self {
        Self {
            dimensions: dimension_names(&document.name, document.dimension_names, document.shape.len()),
            name: document.name,
            shape: document.shape,
            dtype: document.declared_dtype,
            attributes: document.attributes,
            fill_value: document.fill_value,
            datetime: document.datetime_unit.is_some(),
            array: None,
        }
    }

    fn mask(&self, value: f64) -> f64 {
        let nat = self.datetime && value == i64::MIN as f64;
        if nat || self.fill_value == Some(value) {
            f64::NAN
        } else {
            value
        }
    }
}

/// Names of the dimensions of an array, synthesized as `<array>_dim<i>`
/// when undeclared.
fn dimension_names(array: &str, declared: Option<Vec<String>>, rank: usize) -> Vec<String> {
    declared.unwrap_or_else(|| (0..rank).map(|i| format!("{}_dim{}", array, i)).collect())
}

fn zarr_dtype(dtype: &ZarrDataType) -> DataType {
    dtype_from_name(&dtype.name().to_string())
}

pub struct ZarrAdapter {
    source: DatasetSource,
    format: ZarrFormat,
    variables: Vec<ZarrVariable>,
    dimensions: Vec<DimensionSpec>,
    attributes: Map<String, Value>,
    coordinates: HashMap<String, CoordinateValues>,
}

/// Root attributes and array documents read from the store.
struct Hierarchy {
    format: ZarrFormat,
    attributes: Map<String, Value>,
    arrays: Vec<ArrayDocument>,
}

impl ZarrAdapter {
    /// Read all root-level metadata and prefetch the time coordinate.
    ///
    /// `store` serves the metadata documents, `chunks` the same location
    /// to zarrs.
    pub async fn open(
        source: DatasetSource,
        store: Arc<dyn MetadataStore>,
        chunks: Arc<ChunkStore>,
        max_coordinate_values: u64,
    ) -> Result<Self> {
        let uri = source.uri.clone();
        let hierarchy = read_hierarchy(&uri, store.as_ref()).await?;
        let variables: Vec<ZarrVariable> = hierarchy
            .arrays
            .into_iter()
            .map(|document| ZarrVariable::open(&uri, document, &chunks))
            .collect();
        let dimensions = build_dimensions(&uri, &variables)?;
        debug!(
            uri = %uri,
            format = ?hierarchy.format,
            arrays = variables.len(),
            "Opened zarr store"
        );

        let mut adapter = Self {
            source,
            format: hierarchy.format,
            variables,
            dimensions,
            attributes: hierarchy.attributes,
            coordinates: HashMap::new(),
        };

        if let Some(name) = adapter.get_time_variable_name()? {
            let values = match adapter.variable(&name) {
                Ok(variable) => load_coordinate(&uri, variable, max_coordinate_values).await?,
                Err(_) => None,
            };
            if let Some(values) = values {
                adapter.coordinates.insert(name, values);
            }
        }
        Ok(adapter)
    }

    pub fn format(&self) -> ZarrFormat {
        self.format
    }

    fn variable(&self, name: &str) -> Result<&ZarrVariable> {
        self.variables
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| InspectError::corrupt(&self.source.uri, format!("no array '{}'", name)))
    }
}

async fn get_json(uri: &str, store: &dyn MetadataStore, key: &str) -> Result<Option<Value>> {
    let Some(bytes): Option<Bytes> = store.get(key).await.map_err(|e| e.into_inspect(uri))? else {
        return Ok(None);
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| InspectError::corrupt(uri, format!("{}: {}", key, e)))
}

fn object(uri: &str, key: &str, value: Option<Value>) -> Result<Map<String, Value>> {
    match value {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(InspectError::corrupt(uri, format!("{} is not a JSON object", key))),
    }
}

async fn read_hierarchy(uri: &str, store: &dyn MetadataStore) -> Result<Hierarchy> {
    if let Some(consolidated) = get_json(uri, store, ".zmetadata").await? {
        return consolidated_v2(uri, consolidated);
    }
    if let Some(root) = get_json(uri, store, "zarr.json").await? {
        return hierarchy_v3(uri, store, root).await;
    }
    if get_json(uri, store, ".zarray").await?.is_some() {
        return Err(InspectError::unsupported(uri, "store root is an array, not a group"));
    }
    let Some(group) = get_json(uri, store, ".zgroup").await? else {
        return Err(InspectError::corrupt(uri, "no zarr metadata found"));
    };
    if !group.is_object() {
        return Err(InspectError::corrupt(uri, ".zgroup is not a JSON object"));
    }

    let attributes = object(uri, ".zattrs", get_json(uri, store, ".zattrs").await?)?;
    let listing = store.list_dir("").await.map_err(|e| e.into_inspect(uri))?;
    let mut arrays = Vec::new();
    for child in listing.prefixes {
        let Some(zarray) = get_json(uri, store, &format!("{}/.zarray", child)).await? else {
            continue;
        };
        let zattrs = get_json(uri, store, &format!("{}/.zattrs", child)).await?;
        arrays.push(v2_document(&child, &zarray, zattrs.as_ref()).map_err(|e| InspectError::corrupt(uri, e))?);
    }
    Ok(Hierarchy {
        format: ZarrFormat::V2,
        attributes,
        arrays,
    })
}

fn consolidated_v2(uri: &str, consolidated: Value) -> Result<Hierarchy> {
    let Some(Value::Object(entries)) = consolidated.get("metadata").cloned() else {
        return Err(InspectError::corrupt(uri, ".zmetadata has no metadata mapping"));
    };
    let attributes = object(uri, ".zattrs", entries.get(".zattrs").cloned())?;
    let mut names: Vec<&str> = entries
        .keys()
        .filter_map(|k| k.strip_suffix("/.zarray"))
        .filter(|name| !name.contains('/'))
        .collect();
    names.sort_unstable();

    let mut arrays = Vec::with_capacity(names.len());
    for name in names {
        let zarray = &entries[&format!("{}/.zarray", name)];
        let zattrs = entries.get(&format!("{}/.zattrs", name));
        arrays.push(v2_document(name, zarray, zattrs).map_err(|e| InspectError::corrupt(uri, e))?);
    }
    Ok(Hierarchy {
        format: ZarrFormat::V2,
        attributes,
        arrays,
    })
}

async fn hierarchy_v3(uri: &str, store: &dyn MetadataStore, root: Value) -> Result<Hierarchy> {
    match root.get("node_type").and_then(Value::as_str) {
        Some("group") => {}
        Some("array") => return Err(InspectError::unsupported(uri, "store root is an array, not a group")),
        _ => return Err(InspectError::corrupt(uri, "zarr.json without a valid node_type")),
    }
    let attributes = object(uri, "zarr.json attributes", root.get("attributes").cloned())?;

    let consolidated = root
        .get("consolidated_metadata")
        .and_then(|c| c.get("metadata"))
        .and_then(Value::as_object);

    let mut arrays = Vec::new();
    if let Some(entries) = consolidated {
        let mut names: Vec<&String> = entries.keys().filter(|k| !k.contains('/')).collect();
        names.sort_unstable();
        for name in names {
            let doc = &entries[name.as_str()];
            if doc.get("node_type").and_then(Value::as_str) == Some("array") {
                arrays.push(v3_document(name, doc).map_err(|e| InspectError::corrupt(uri, e))?);
            }
        }
    } else {
        let listing = store.list_dir("").await.map_err(|e| e.into_inspect(uri))?;
        for child in listing.prefixes {
            let Some(doc) = get_json(uri, store, &format!("{}/zarr.json", child)).await? else {
                continue;
            };
            if doc.get("node_type").and_then(Value::as_str) == Some("array") {
                arrays.push(v3_document(&child, &doc).map_err(|e| InspectError::corrupt(uri, e))?);
            }
        }
    }
    Ok(Hierarchy {
        format: ZarrFormat::V3,
        attributes,
        arrays,
    })
}

/// Dimensions implied by array shapes; a name used with two lengths is corrupt.
fn build_dimensions(uri: &str, variables: &[ZarrVariable]) -> Result<Vec<DimensionSpec>> {
    let mut dimensions: Vec<DimensionSpec> = Vec::new();
    for variable in variables {
        if variable.dimensions.len() != variable.shape.len() {
            return Err(InspectError::corrupt(
                uri,
                format!(
                    "array '{}' names {} dimensions but has rank {}",
                    variable.name,
                    variable.dimensions.len(),
                    variable.shape.len()
                ),
            ));
        }
        for (name, &length) in variable.dimensions.iter().zip(&variable.shape) {
            match dimensions.iter().find(|d| &d.name == name) {
                Some(existing) if existing.length != length => {
                    return Err(InspectError::corrupt(
                        uri,
                        format!(
                            "dimension '{}' has length {} and {} (array '{}')",
                            name, existing.length, length, variable.name
                        ),
                    ));
                }
                Some(_) => {}
                None => dimensions.push(DimensionSpec {
                    name: name.clone(),
                    length,
                    unlimited: false,
                }),
            }
        }
    }
    Ok(dimensions)
}

macro_rules! retrieve_as_f64 {
    ($array:expr, $subset:expr, $t:ty) => {
        $array
            .async_retrieve_array_subset_elements::<$t>($subset)
            .await?
            .into_iter()
            .map(|v| v as f64)
            .collect()
    };
}

/// Elements of `subset` widened to `f64`; `None` for non-numeric dtypes.
async fn retrieve_f64(
    array: &Array<ChunkStore>,
    subset: &ArraySubset,
) -> std::result::Result<Option<Vec<f64>>, ArrayError> {
    let values = match array.data_type() {
        ZarrDataType::Int8 => retrieve_as_f64!(array, subset, i8),
        ZarrDataType::Int16 => retrieve_as_f64!(array, subset, i16),
        ZarrDataType::Int32 => retrieve_as_f64!(array, subset, i32),
        ZarrDataType::Int64 => retrieve_as_f64!(array, subset, i64),
        ZarrDataType::UInt8 => retrieve_as_f64!(array, subset, u8),
        ZarrDataType::UInt16 => retrieve_as_f64!(array, subset, u16),
        ZarrDataType::UInt32 => retrieve_as_f64!(array, subset, u32),
        ZarrDataType::UInt64 => retrieve_as_f64!(array, subset, u64),
        ZarrDataType::Float32 => retrieve_as_f64!(array, subset, f32),
        ZarrDataType::Float64 => retrieve_as_f64!(array, subset, f64),
        _ => return Ok(None),
    };
    Ok(Some(values))
}

/// Read the values of a 1-D array. Long arrays only get their first and
/// last element read, so only the end chunks are fetched. `None` when the
/// values cannot be decoded; a store failure is still an error.
async fn load_coordinate(
    uri: &str,
    variable: &ZarrVariable,
    max_values: u64,
) -> Result<Option<CoordinateValues>> {
    let (Some(array), [length]) = (&variable.array, variable.shape.as_slice()) else {
        return Ok(None);
    };
    let length = *length;
    if length == 0 {
        return Ok(Some(CoordinateValues {
            length,
            values: Vec::new(),
            complete: true,
        }));
    }

    let complete = length <= max_values;
    let ranges = if complete {
        vec![0..length]
    } else {
        vec![0..1, length - 1..length]
    };

    let mut values = Vec::with_capacity(if complete { length as usize } else { 2 });
    for range in ranges {
        let subset = ArraySubset::new_with_ranges(&[range]);
        match retrieve_f64(array, &subset).await {
            Ok(Some(part)) => values.extend(part.into_iter().map(|v| variable.mask(v))),
            Ok(None) => {
                debug!(uri = %uri, array = %variable.name, dtype = %variable.dtype, "Coordinate is not numeric");
                return Ok(None);
            }
            Err(ArrayError::StorageError(e)) => {
                return Err(InspectError::unreachable(uri, e.to_string()));
            }
            Err(e) => {
                debug!(uri = %uri, array = %variable.name, error = %e, "Coordinate not decodable");
                return Ok(None);
            }
        }
    }
    Ok(Some(CoordinateValues {
        length,
        values,
        complete,
    }))
}

impl BackendAdapter for ZarrAdapter {
    fn source(&self) -> &DatasetSource {
        &self.source
    }

    fn list_dimensions(&self) -> Result<Vec<DimensionSpec>> {
        Ok(self.dimensions.clone())
    }

    fn list_variables(&self) -> Result<Vec<String>> {
        Ok(self.variables.iter().map(|a| a.name.clone()).collect())
    }

    fn attribute_names(&self, scope: AttributeScope<'_>) -> Result<Vec<String>> {
        Ok(match scope {
            AttributeScope::Global => self.attributes.keys().cloned().collect(),
            AttributeScope::Variable(name) => self.variable(name)?.attributes.keys().cloned().collect(),
        })
    }

    fn get_attribute(&self, scope: AttributeScope<'_>, name: &str) -> Result<Option<AttributeValue>> {
        let map = match scope {
            AttributeScope::Global => &self.attributes,
            AttributeScope::Variable(var) => &self.variable(var)?.attributes,
        };
        Ok(map.get(name).map(json_attribute))
    }

    fn get_variable_dimensions(&self, name: &str) -> Result<Vec<String>> {
        Ok(self.variable(name)?.dimensions.clone())
    }

    fn get_variable_shape(&self, name: &str) -> Result<Vec<u64>> {
        Ok(self.variable(name)?.shape.clone())
    }

    fn get_variable_dtype(&self, name: &str) -> Result<DataType> {
        Ok(self.variable(name)?.dtype.clone())
    }

    fn read_coordinate(&self, name: &str) -> Result<Option<CoordinateValues>> {
        Ok(self.coordinates.get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BackendKind, Location};
    use crate::store::testing::RecordingStore;
    use serde_json::json;

    fn source() -> DatasetSource {
        DatasetSource {
            uri: "memory://run.zarr".to_string(),
            location: Location::Local {
                path: "run.zarr".into(),
            },
            backend_kind: BackendKind::Zarr,
            byte_size: 0,
        }
    }

    fn i64_chunk(values: &[i64]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    async fn open(store: &Arc<RecordingStore>, max_values: u64) -> Result<ZarrAdapter> {
        let chunks = chunk_store(store.object_store());
        ZarrAdapter::open(source(), store.clone(), chunks, max_values).await
    }

    /// Store the chunks of a 1-D `int64` array through zarrs, so they are
    /// encoded with the array's own codecs.
    async fn write_i64(store: &RecordingStore, name: &str, values: &[i64]) {
        let zarray = store.get(&format!("{}/.zarray", name)).await.unwrap().unwrap();
        let zarray: Value = serde_json::from_slice(&zarray).unwrap();
        let document = v2_document(name, &zarray, None).unwrap();
        let array = Array::new_with_metadata(
            chunk_store(store.object_store()),
            &format!("/{}", name),
            document.metadata.unwrap(),
        )
        .unwrap();
        let subset = ArraySubset::new_with_ranges(&[0..values.len() as u64]);
        array
            .async_store_array_subset_elements::<i64>(&subset, values)
            .await
            .unwrap();
    }

    async fn v2_store() -> Arc<RecordingStore> {
        let store = RecordingStore::new();
        store.put_json(".zgroup", json!({"zarr_format": 2})).await;
        store.put_json(".zattrs", json!({"title": "run", "history": ["a", "b"]})).await;

        store
            .put_json(
                "time/.zarray",
                json!({"zarr_format": 2, "shape": [5], "chunks": [3], "dtype": "<i8",
                       "compressor": {"id": "blosc", "cname": "lz4", "clevel": 5, "shuffle": 1},
                       "fill_value": null, "filters": null, "order": "C"}),
            )
            .await;
        store
            .put_json(
                "time/.zattrs",
                json!({"_ARRAY_DIMENSIONS": ["time"], "units": "days since 2000-01-01", "calendar": "360_day"}),
            )
            .await;
        write_i64(&store, "time", &[0, 1, 2, 3, 4]).await;

        store
            .put_json(
                "tas/.zarray",
                json!({"zarr_format": 2, "shape": [5, 2], "chunks": [5, 2], "dtype": "<f4",
                       "compressor": {"id": "blosc", "cname": "lz4", "clevel": 5, "shuffle": 1},
                       "fill_value": "NaN", "filters": null, "order": "C"}),
            )
            .await;
        store
            .put_json("tas/.zattrs", json!({"_ARRAY_DIMENSIONS": ["time", "x"], "units": "K"}))
            .await;
        // Not a valid blosc frame: decoding it would fail the whole source.
        store.put("tas/0.0", vec![0_u8; 40]).await;
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_v2_store_structure() {
        let store = v2_store().await;
        let adapter = open(&store, 100).await.unwrap();

        assert_eq!(adapter.format(), ZarrFormat::V2);
        assert_eq!(adapter.list_variables().unwrap(), vec!["tas", "time"]);
        let dims = adapter.list_dimensions().unwrap();
        assert_eq!(
            dims.iter().map(|d| (d.name.as_str(), d.length)).collect::<Vec<_>>(),
            vec![("time", 5), ("x", 2)]
        );
        assert_eq!(adapter.get_variable_dimensions("tas").unwrap(), vec!["time", "x"]);
        assert_eq!(adapter.get_variable_dtype("tas").unwrap(), DataType::Float32);
        assert_eq!(adapter.get_variable_dtype("time").unwrap(), DataType::Int64);
        assert_eq!(
            adapter.get_attribute(AttributeScope::Global, "title").unwrap(),
            Some(AttributeValue::text("run"))
        );
        assert_eq!(
            adapter.attribute_names(AttributeScope::Variable("tas")).unwrap(),
            vec!["units"]
        );
    }

    #[tokio::test]
    async fn test_blosc_time_coordinate_is_decoded() {
        let store = v2_store().await;
        let adapter = open(&store, 100).await.unwrap();

        let coordinate = adapter.read_coordinate("time").unwrap().unwrap();
        assert!(coordinate.complete);
        assert_eq!(coordinate.values, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert!(adapter.read_coordinate("tas").unwrap().is_none());

        assert!(!store.reads().contains(&"tas/0.0".to_string()));
    }

    #[tokio::test]
    async fn test_long_coordinate_reads_end_chunks_only() {
        let store = RecordingStore::new();
        store.put_json(".zgroup", json!({"zarr_format": 2})).await;
        store
            .put_json(
                "time/.zarray",
                json!({"shape": [7], "chunks": [2], "dtype": "<i8", "compressor": null, "fill_value": null}),
            )
            .await;
        store
            .put_json("time/.zattrs", json!({"_ARRAY_DIMENSIONS": ["time"], "units": "hours since 2000-01-01"}))
            .await;
        store.put("time/0", i64_chunk(&[0, 1])).await;
        store.put("time/3", i64_chunk(&[6, 0])).await;
        // Middle chunks hold garbage; reading them would fail the decode.
        store.put("time/1", vec![1_u8; 3]).await;
        store.put("time/2", vec![1_u8; 3]).await;
        let store = Arc::new(store);

        let adapter = open(&store, 4).await.unwrap();
        let coordinate = adapter.read_coordinate("time").unwrap().unwrap();
        assert!(!coordinate.complete);
        assert_eq!(coordinate.length, 7);
        assert_eq!(coordinate.values, vec![0.0, 6.0]);
    }

    #[tokio::test]
    async fn test_fill_value_is_masked() {
        let store = RecordingStore::new();
        store.put_json(".zgroup", json!({"zarr_format": 2})).await;
        store
            .put_json(
                "time/.zarray",
                json!({"shape": [3], "chunks": [3], "dtype": "<i8", "compressor": null, "fill_value": -1}),
            )
            .await;
        store
            .put_json("time/.zattrs", json!({"_ARRAY_DIMENSIONS": ["time"], "units": "days since 2000-01-01"}))
            .await;
        store.put("time/0", i64_chunk(&[0, -1, 2])).await;
        let store = Arc::new(store);

        let adapter = open(&store, 100).await.unwrap();
        let values = adapter.coordinates_of("time");
        assert_eq!(values[0], 0.0);
        assert!(values[1].is_nan());
        assert_eq!(values[2], 2.0);
    }

    #[tokio::test]
    async fn test_consolidated_v2_skips_per_array_documents() {
        let store = RecordingStore::new();
        store
            .put_json(
                ".zmetadata",
                json!({
                    "zarr_consolidated_format": 1,
                    "metadata": {
                        ".zgroup": {"zarr_format": 2},
                        ".zattrs": {"source": "model"},
                        "lat/.zarray": {"shape": [3], "chunks": [3], "dtype": "<f8", "compressor": null, "fill_value": null},
                        "lat/.zattrs": {"_ARRAY_DIMENSIONS": ["lat"]},
                        "nested/group/.zarray": {"shape": [1], "chunks": [1], "dtype": "<f8", "compressor": null, "fill_value": null}
                    }
                }),
            )
            .await;
        let store = Arc::new(store);

        let adapter = open(&store, 100).await.unwrap();
        assert_eq!(adapter.list_variables().unwrap(), vec!["lat"]);
        assert_eq!(adapter.get_variable_dtype("lat").unwrap(), DataType::Float64);
        assert_eq!(store.reads(), vec![".zmetadata".to_string()]);
    }

    #[tokio::test]
    async fn test_v3_store_with_datetime_coordinate() {
        let store = RecordingStore::new();
        store
            .put_json("zarr.json", json!({"zarr_format": 3, "node_type": "group", "attributes": {"Conventions": "CF-1.8"}}))
            .await;
        store
            .put_json(
                "time/zarr.json",
                json!({
                    "zarr_format": 3, "node_type": "array", "shape": [3],
                    "data_type": {"name": "numpy.datetime64", "configuration": {"unit": "s", "scale_factor": 1}},
                    "chunk_grid": {"name": "regular", "configuration": {"chunk_shape": [3]}},
                    "chunk_key_encoding": {"name": "default", "configuration": {"separator": "/"}},
                    "fill_value": "NaT",
                    "codecs": [{"name": "bytes", "configuration": {"endian": "little"}}],
                    "attributes": {},
                    "dimension_names": ["time"]
                }),
            )
            .await;
        store.put("time/c/0", i64_chunk(&[0, 86_400, i64::MIN])).await;
        let store = Arc::new(store);

        let adapter = open(&store, 100).await.unwrap();
        assert_eq!(adapter.format(), ZarrFormat::V3);
        assert_eq!(
            adapter.get_variable_dtype("time").unwrap(),
            DataType::DateTime("s".to_string())
        );
        assert_eq!(adapter.get_time_variable_name().unwrap().as_deref(), Some("time"));
        let values = adapter.coordinates_of("time");
        assert_eq!(&values[..2], &[0.0, 86_400.0]);
        assert!(values[2].is_nan());
    }

    #[tokio::test]
    async fn test_unsupported_array_keeps_declared_metadata() {
        let store = RecordingStore::new();
        store.put_json(".zgroup", json!({"zarr_format": 2})).await;
        store
            .put_json(
                "label/.zarray",
                json!({"shape": [4], "chunks": [4], "dtype": "<U8", "compressor": {"id": "lzma"}, "fill_value": ""}),
            )
            .await;
        store
            .put_json("label/.zattrs", json!({"_ARRAY_DIMENSIONS": ["site"], "long_name": "site label"}))
            .await;
        let store = Arc::new(store);

        let adapter = open(&store, 100).await.unwrap();
        assert_eq!(adapter.get_variable_shape("label").unwrap(), vec![4]);
        assert_eq!(adapter.get_variable_dimensions("label").unwrap(), vec!["site"]);
        assert_eq!(
            adapter.attribute_names(AttributeScope::Variable("label")).unwrap(),
            vec!["long_name"]
        );
        assert!(adapter.read_coordinate("label").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_conflicting_dimension_lengths_are_corrupt() {
        let store = RecordingStore::new();
        store.put_json(".zgroup", json!({"zarr_format": 2})).await;
        for (name, len) in [("a", 3), ("b", 4)] {
            store
                .put_json(
                    &format!("{}/.zarray", name),
                    json!({"shape": [len], "chunks": [len], "dtype": "<f4", "compressor": null, "fill_value": null}),
                )
                .await;
            store
                .put_json(&format!("{}/.zattrs", name), json!({"_ARRAY_DIMENSIONS": ["x"]}))
                .await;
        }

        let result = open(&Arc::new(store), 100).await;
        assert!(matches!(result, Err(InspectError::CorruptMetadata { .. })));
    }

    #[tokio::test]
    async fn test_empty_store_is_corrupt() {
        let result = open(&Arc::new(RecordingStore::new()), 100).await;
        assert!(matches!(result, Err(InspectError::CorruptMetadata { .. })));
    }

    impl ZarrAdapter {
        fn coordinates_of(&self, name: &str) -> Vec<f64> {
            self.read_coordinate(name).unwrap().unwrap().values
        }
    }
}
