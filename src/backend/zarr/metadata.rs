//! Zarr v2 (`.zarray`/`.zattrs`/`.zmetadata`) and v3 (`zarr.json`) array
//! documents, prepared for `zarrs`.
//!
//! zarrs owns the array model and the codecs. What it cannot carry is kept
//! next to its metadata: the declared shape and dtype for arrays it refuses,
//! the numpy datetime unit (handed to zarrs as plain `int64`) and the fill
//! value used to mask coordinates.

use serde_json::{json, Map, Value};
use zarrs::array::ArrayMetadata;

use crate::model::{AttributeValue, DataType};

/// Attribute xarray uses to carry dimension names in zarr v2.
pub const ARRAY_DIMENSIONS: &str = "_ARRAY_DIMENSIONS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZarrFormat {
    V2,
    V3,
}

/// One array as declared in the store.
#[derive(Debug, Clone)]
pub struct ArrayDocument {
    pub name: String,
    /// Metadata for zarrs; `None` when the document does not deserialize
    pub metadata: Option<ArrayMetadata>,
    pub shape: Vec<u64>,
    /// Declared dtype, used only when zarrs cannot open the array
    pub declared_dtype: DataType,
    /// Unit of a numpy `datetime64` array
    pub datetime_unit: Option<String>,
    /// Numeric fill value; `None` when the store declares none
    pub fill_value: Option<f64>,
    /// Declared dimension names (v3 `dimension_names` or `_ARRAY_DIMENSIONS`)
    pub dimension_names: Option<Vec<String>>,
    /// User attributes without the dimension-name carrier
    pub attributes: Map<String, Value>,
}

fn as_object(name: &str, key: &str, value: &Value) -> Result<Map<String, Value>, String> {
    match value {
        Value::Object(map) => Ok(map.clone()),
        _ => Err(format!("{}/{} is not a JSON object", name, key)),
    }
}

fn shape_of(name: &str, key: &str, doc: &Map<String, Value>) -> Result<Vec<u64>, String> {
    let shape = doc
        .get("shape")
        .ok_or_else(|| format!("{}/{}: missing shape", name, key))?;
    serde_json::from_value(shape.clone()).map_err(|e| format!("{}/{}: shape: {}", name, key, e))
}

/// Strip `_ARRAY_DIMENSIONS` from `attributes`, returning it when well formed.
pub fn take_array_dimensions(attributes: &mut Map<String, Value>) -> Option<Vec<String>> {
    attributes.remove(ARRAY_DIMENSIONS).and_then(|v| string_list(&v))
}

/// Numeric fill value, when it is one.
pub fn fill_value_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            _ => None,
        },
        _ => None,
    }
}

fn v2_datetime_unit(dtype: &str) -> Option<String> {
    let body = dtype.get(1..)?;
    let unit = body.strip_prefix("M8")?;
    Some(
        unit.strip_prefix('[')
            .and_then(|u| u.strip_suffix(']'))
            .unwrap_or("generic")
            .to_string(),
    )
}

fn v3_datetime_unit(dtype: &Value) -> Option<String> {
    let object = dtype.as_object()?;
    if object.get("name").and_then(Value::as_str) != Some("numpy.datetime64") {
        return None;
    }
    Some(
        object
            .get("configuration")
            .and_then(|c| c.get("unit"))
            .and_then(Value::as_str)
            .unwrap_or("generic")
            .to_string(),
    )
}

/// Build the document of a v2 array from its `.zarray` and `.zattrs`.
///
/// zarrs has no null fill value for numeric arrays, so a missing one is
/// handed over as `0` and not used for masking. Datetimes are handed over
/// as `int64` ticks.
pub fn v2_document(name: &str, zarray: &Value, zattrs: Option<&Value>) -> Result<ArrayDocument, String> {
    let mut doc = as_object(name, ".zarray", zarray)?;
    let shape = shape_of(name, ".zarray", &doc)?;
    let mut attributes = match zattrs {
        Some(Value::Null) | None => Map::new(),
        Some(value) => as_object(name, ".zattrs", value)?,
    };

    let dtype = doc.get("dtype").and_then(Value::as_str).unwrap_or("").to_string();
    let datetime_unit = v2_datetime_unit(&dtype);
    let declared_dtype = match &datetime_unit {
        Some(unit) => DataType::DateTime(unit.clone()),
        None => DataType::Other(dtype.clone()),
    };
    let fill = doc.get("fill_value").cloned().unwrap_or(Value::Null);
    let fill_value = fill_value_f64(&fill);

    doc.entry("zarr_format").or_insert(json!(2));
    doc.entry("order").or_insert(json!("C"));
    if fill_value.is_none() {
        doc.insert("fill_value".to_string(), json!(0));
    }
    if datetime_unit.is_some() {
        let endian = dtype.get(..1).unwrap_or("<");
        doc.insert("dtype".to_string(), json!(format!("{}i8", endian)));
    }
    doc.insert("attributes".to_string(), Value::Object(attributes.clone()));
    let metadata = serde_json::from_value(Value::Object(doc)).ok();

    let dimension_names = take_array_dimensions(&mut attributes);
    Ok(ArrayDocument {
        name: name.to_string(),
        metadata,
        shape,
        declared_dtype,
        datetime_unit,
        fill_value,
        dimension_names,
        attributes,
    })
}

/// Build the document of a v3 array from its `zarr.json`.
pub fn v3_document(name: &str, zarr_json: &Value) -> Result<ArrayDocument, String> {
    let mut doc = as_object(name, "zarr.json", zarr_json)?;
    let shape = shape_of(name, "zarr.json", &doc)?;
    let mut attributes = match doc.get("attributes") {
        Some(Value::Null) | None => Map::new(),
        Some(value) => as_object(name, "zarr.json attributes", value)?,
    };

    let dtype = doc.get("data_type").cloned().unwrap_or(Value::Null);
    let datetime_unit = v3_datetime_unit(&dtype);
    let declared_dtype = match (&datetime_unit, &dtype) {
        (Some(unit), _) => DataType::DateTime(unit.clone()),
        (None, Value::String(name)) => dtype_from_name(name),
        (None, other) => DataType::Other(
            other
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
        ),
    };
    let fill = doc.get("fill_value").cloned().unwrap_or(Value::Null);
    let fill_value = fill_value_f64(&fill);
    if datetime_unit.is_some() {
        doc.insert("data_type".to_string(), json!("int64"));
        if fill_value.is_none() {
            doc.insert("fill_value".to_string(), json!(i64::MIN));
        }
    }
    let metadata = serde_json::from_value(Value::Object(doc.clone())).ok();

    let declared = doc
        .get("dimension_names")
        .and_then(Value::as_array)
        .and_then(|names| {
            names
                .iter()
                .map(|n| n.as_str().map(str::to_string))
                .collect::<Option<Vec<String>>>()
        });
    let carried = take_array_dimensions(&mut attributes);
    Ok(ArrayDocument {
        name: name.to_string(),
        metadata,
        shape,
        declared_dtype,
        datetime_unit,
        fill_value,
        dimension_names: declared.or(carried),
        attributes,
    })
}

/// Neutral dtype of a zarr v3 data type name.
pub fn dtype_from_name(name: &str) -> DataType {
    match name {
        "bool" => DataType::Bool,
        "int8" => DataType::Int8,
        "int16" => DataType::Int16,
        "int32" => DataType::Int32,
        "int64" => DataType::Int64,
        "uint8" => DataType::UInt8,
        "uint16" => DataType::UInt16,
        "uint32" => DataType::UInt32,
        "uint64" => DataType::UInt64,
        "float16" => DataType::Float16,
        "float32" => DataType::Float32,
        "float64" => DataType::Float64,
        "complex64" => DataType::Complex64,
        "complex128" => DataType::Complex128,
        "string" => DataType::String,
        other => match other.strip_prefix('r').and_then(|bits| bits.parse::<u32>().ok()) {
            Some(bits) if bits % 8 == 0 => DataType::FixedBytes(bits / 8),
            _ => DataType::Other(other.to_string()),
        },
    }
}

pub fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

/// Convert a JSON attribute value to the neutral form.
///
/// JSON has no widths: integers become `int64` (or `uint64` above its
/// range), any other number `float64`.
pub fn json_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::String(s) => AttributeValue::Text(s.clone()),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(_) => numbers(std::slice::from_ref(value)).unwrap_or(AttributeValue::Json(value.clone())),
        Value::Array(items) if !items.is_empty() => {
            if let Some(strings) = string_list(value) {
                AttributeValue::TextList(strings)
            } else {
                numbers(items).unwrap_or_else(|| AttributeValue::Json(value.clone()))
            }
        }
        other => AttributeValue::Json(other.clone()),
    }
}

fn numbers(items: &[Value]) -> Option<AttributeValue> {
    if let Some(values) = items.iter().map(Value::as_i64).collect::<Option<Vec<i64>>>() {
        return Some(AttributeValue::Int {
            dtype: DataType::Int64,
            values,
        });
    }
    if let Some(values) = items.iter().map(Value::as_u64).collect::<Option<Vec<u64>>>() {
        return Some(AttributeValue::UInt {
            dtype: DataType::UInt64,
            values,
        });
    }
    items
        .iter()
        .map(Value::as_f64)
        .collect::<Option<Vec<f64>>>()
        .map(|values| AttributeValue::Float {
            dtype: DataType::Float64,
            values,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v2_document_strips_dimension_names() {
        let zarray = json!({
            "zarr_format": 2,
            "shape": [4, 3],
            "chunks": [2, 3],
            "dtype": "<f4",
            "compressor": {"id": "blosc", "cname": "lz4", "clevel": 5, "shuffle": 1},
            "fill_value": "NaN",
            "order": "C",
            "filters": null
        });
        let zattrs = json!({"_ARRAY_DIMENSIONS": ["time", "x"], "units": "K"});
        let doc = v2_document("tas", &zarray, Some(&zattrs)).unwrap();

        assert_eq!(doc.shape, vec![4, 3]);
        assert_eq!(doc.dimension_names, Some(vec!["time".to_string(), "x".to_string()]));
        assert!(!doc.attributes.contains_key(ARRAY_DIMENSIONS));
        assert!(doc.fill_value.unwrap().is_nan());
        assert!(matches!(doc.metadata, Some(ArrayMetadata::V2(_))));
    }

    #[test]
    fn test_v2_null_fill_and_missing_keys_still_deserialize() {
        let zarray = json!({"shape": [5], "chunks": [5], "dtype": "<i8", "compressor": null, "fill_value": null});
        let doc = v2_document("idx", &zarray, None).unwrap();
        assert_eq!(doc.fill_value, None);
        assert_eq!(doc.dimension_names, None);
        assert!(doc.metadata.is_some());
    }

    #[test]
    fn test_v2_datetime_is_read_as_ticks() {
        let zarray = json!({"shape": [2], "chunks": [2], "dtype": ">M8[ns]", "compressor": null, "fill_value": null});
        let doc = v2_document("time", &zarray, None).unwrap();
        assert_eq!(doc.datetime_unit.as_deref(), Some("ns"));
        assert_eq!(doc.declared_dtype, DataType::DateTime("ns".to_string()));
        let Some(ArrayMetadata::V2(metadata)) = doc.metadata else {
            panic!("not v2 metadata");
        };
        assert_eq!(serde_json::to_value(&metadata).unwrap()["dtype"], json!(">i8"));
    }

    #[test]
    fn test_v3_document() {
        let doc = json!({
            "zarr_format": 3,
            "node_type": "array",
            "shape": [10],
            "data_type": "int64",
            "chunk_grid": {"name": "regular", "configuration": {"chunk_shape": [4]}},
            "chunk_key_encoding": {"name": "default", "configuration": {"separator": "/"}},
            "fill_value": 0,
            "codecs": [
                {"name": "bytes", "configuration": {"endian": "little"}},
                {"name": "zstd", "configuration": {"level": 0, "checksum": false}}
            ],
            "attributes": {"units": "days since 2000-01-01"},
            "dimension_names": ["time"]
        });
        let array = v3_document("time", &doc).unwrap();
        assert_eq!(array.shape, vec![10]);
        assert_eq!(array.declared_dtype, DataType::Int64);
        assert_eq!(array.fill_value, Some(0.0));
        assert_eq!(array.dimension_names, Some(vec!["time".to_string()]));
        assert!(matches!(array.metadata, Some(ArrayMetadata::V3(_))));
    }

    #[test]
    fn test_corrupt_zarray() {
        assert!(v2_document("x", &json!({"shape": "ten"}), None).is_err());
        assert!(v2_document("x", &json!([1, 2]), None).is_err());
        assert!(v2_document("x", &json!({"shape": [1]}), Some(&json!("attrs"))).is_err());
    }

    #[test]
    fn test_dtype_names() {
        assert_eq!(dtype_from_name("float32"), DataType::Float32);
        assert_eq!(dtype_from_name("r16"), DataType::FixedBytes(2));
        assert_eq!(dtype_from_name("bfloat16"), DataType::Other("bfloat16".to_string()));
    }

    #[test]
    fn test_json_attributes() {
        assert_eq!(json_attribute(&json!("K")), AttributeValue::text("K"));
        assert_eq!(
            json_attribute(&json!(3)),
            AttributeValue::Int {
                dtype: DataType::Int64,
                values: vec![3]
            }
        );
        assert_eq!(
            json_attribute(&json!([1, 2.5])),
            AttributeValue::Float {
                dtype: DataType::Float64,
                values: vec![1.0, 2.5]
            }
        );
        assert_eq!(
            json_attribute(&json!(["a", "b"])),
            AttributeValue::TextList(vec!["a".into(), "b".into()])
        );
        assert!(matches!(json_attribute(&json!({"k": 1})), AttributeValue::Json(_)));
    }
}
