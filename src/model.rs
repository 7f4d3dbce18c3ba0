//! Backend-neutral metadata model.
//!
//! Records hold no file handles; they are plain values produced by the
//! normalizer and owned by whoever asked for them.

use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::calendar::{Calendar, CalendarDateTime};

/// Storage format family, decided by classification rather than sniffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// netCDF classic or netCDF-4/HDF5
    Hdf5Netcdf,
    /// zarr hierarchical store (v2 or v3)
    Zarr,
    /// Anything else; tried with the netCDF library
    Other,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Hdf5Netcdf => "hdf5_netcdf",
            BackendKind::Zarr => "zarr",
            BackendKind::Other => "other",
        })
    }
}

/// Where a source physically lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Location {
    Local { path: PathBuf },
    S3 { bucket: String, key: String },
}

/// One physical file or object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetSource {
    /// Locator as given by the caller
    pub uri: String,
    #[serde(skip)]
    pub location: Location,
    pub backend_kind: BackendKind,
    /// Stored size in bytes (sum of all objects for zarr stores)
    pub byte_size: u64,
}

/// A named dimension of one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionSpec {
    pub name: String,
    /// Current length (for unlimited dimensions, the number of records written)
    pub length: u64,
    pub unlimited: bool,
}

/// Element data type, semantic rather than backend specific.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float16,
    Float32,
    Float64,
    Complex64,
    Complex128,
    Char,
    /// Fixed-width byte string (zarr `|S<n>`)
    FixedBytes(u32),
    /// Fixed-width unicode string (zarr `<U<n>`)
    FixedUnicode(u32),
    String,
    /// `datetime64` with its resolution, e.g. `ns`
    DateTime(String),
    /// `timedelta64` with its resolution
    TimeDelta(String),
    /// Compound, vlen, enum, opaque or unknown types
    Other(String),
}

impl DataType {
    /// Decoded element size in bytes, when fixed.
    pub fn item_size(&self) -> Option<u64> {
        Some(match self {
            DataType::Bool | DataType::Int8 | DataType::UInt8 | DataType::Char => 1,
            DataType::Int16 | DataType::UInt16 | DataType::Float16 => 2,
            DataType::Int32 | DataType::UInt32 | DataType::Float32 => 4,
            DataType::Int64
            | DataType::UInt64
            | DataType::Float64
            | DataType::Complex64
            | DataType::DateTime(_)
            | DataType::TimeDelta(_) => 8,
            DataType::Complex128 => 16,
            DataType::FixedBytes(n) => *n as u64,
            DataType::FixedUnicode(n) => 4 * *n as u64,
            DataType::String | DataType::Other(_) => return None,
        })
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::UInt8
                | DataType::UInt16
                | DataType::UInt32
                | DataType::UInt64
                | DataType::Float16
                | DataType::Float32
                | DataType::Float64
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Bool => f.write_str("bool"),
            DataType::Int8 => f.write_str("int8"),
            DataType::Int16 => f.write_str("int16"),
            DataType::Int32 => f.write_str("int32"),
            DataType::Int64 => f.write_str("int64"),
            DataType::UInt8 => f.write_str("uint8"),
            DataType::UInt16 => f.write_str("uint16"),
            DataType::UInt32 => f.write_str("uint32"),
            DataType::UInt64 => f.write_str("uint64"),
            DataType::Float16 => f.write_str("float16"),
            DataType::Float32 => f.write_str("float32"),
            DataType::Float64 => f.write_str("float64"),
            DataType::Complex64 => f.write_str("complex64"),
            DataType::Complex128 => f.write_str("complex128"),
            DataType::Char => f.write_str("char"),
            DataType::FixedBytes(n) => write!(f, "bytes{}", n),
            DataType::FixedUnicode(n) => write!(f, "unicode{}", n),
            DataType::String => f.write_str("string"),
            DataType::DateTime(unit) => write!(f, "datetime64[{}]", unit),
            DataType::TimeDelta(unit) => write!(f, "timedelta64[{}]", unit),
            DataType::Other(name) => f.write_str(name),
        }
    }
}

impl Serialize for DataType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Attribute value in a backend-neutral form. Numeric values keep their
/// stored type: `1_i16` and `1_i32` are different values.
#[derive(Debug, Clone)]
pub enum AttributeValue {
    Text(String),
    TextList(Vec<String>),
    Bool(bool),
    Int { dtype: DataType, values: Vec<i64> },
    UInt { dtype: DataType, values: Vec<u64> },
    Float { dtype: DataType, values: Vec<f64> },
    /// Structured values (zarr JSON objects, nulls)
    Json(serde_json::Value),
}

impl AttributeValue {
    pub fn text(value: impl Into<String>) -> Self {
        AttributeValue::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// First numeric element as `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int { values, .. } => values.first().map(|v| *v as f64),
            AttributeValue::UInt { values, .. } => values.first().map(|v| *v as f64),
            AttributeValue::Float { values, .. } => values.first().copied(),
            _ => None,
        }
    }

    /// Short type label used in conflict reports.
    pub fn type_label(&self) -> String {
        match self {
            AttributeValue::Text(_) => "text".to_string(),
            AttributeValue::TextList(_) => "text[]".to_string(),
            AttributeValue::Bool(_) => "bool".to_string(),
            AttributeValue::Int { dtype, .. }
            | AttributeValue::UInt { dtype, .. }
            | AttributeValue::Float { dtype, .. } => dtype.to_string(),
            AttributeValue::Json(_) => "json".to_string(),
        }
    }
}

fn same_float(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

impl PartialEq for AttributeValue {
    /// NaN equals NaN here; a `_FillValue` of NaN must agree with itself.
    fn eq(&self, other: &Self) -> bool {
        use AttributeValue::*;
        match (self, other) {
            (Text(a), Text(b)) => a == b,
            (TextList(a), TextList(b)) => a == b,
            (Bool(a), Bool(b)) => a == b,
            (Int { dtype: da, values: a }, Int { dtype: db, values: b }) => da == db && a == b,
            (UInt { dtype: da, values: a }, UInt { dtype: db, values: b }) => da == db && a == b,
            (Float { dtype: da, values: a }, Float { dtype: db, values: b }) => {
                da == db && a.len() == b.len() && a.iter().zip(b).all(|(x, y)| same_float(*x, *y))
            }
            (Json(a), Json(b)) => a == b,
            _ => false,
        }
    }
}

fn serialize_numbers<S, T>(serializer: S, values: &[T]) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize,
{
    if values.len() == 1 {
        values[0].serialize(serializer)
    } else {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for v in values {
            seq.serialize_element(v)?;
        }
        seq.end()
    }
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AttributeValue::Text(s) => serializer.serialize_str(s),
            AttributeValue::TextList(v) => v.serialize(serializer),
            AttributeValue::Bool(b) => serializer.serialize_bool(*b),
            AttributeValue::Int { values, .. } => serialize_numbers(serializer, values),
            AttributeValue::UInt { values, .. } => serialize_numbers(serializer, values),
            AttributeValue::Float { values, .. } => serialize_numbers(serializer, values),
            AttributeValue::Json(v) => v.serialize(serializer),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, values: &[T]) -> fmt::Result {
            if values.len() == 1 {
                return write!(f, "{}", values[0]);
            }
            f.write_str("[")?;
            for (i, v) in values.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", v)?;
            }
            f.write_str("]")
        }
        match self {
            AttributeValue::Text(s) => f.write_str(s),
            AttributeValue::TextList(v) => list(f, v),
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::Int { values, .. } => list(f, values),
            AttributeValue::UInt { values, .. } => list(f, values),
            AttributeValue::Float { values, .. } => list(f, values),
            AttributeValue::Json(v) => write!(f, "{}", v),
        }
    }
}

/// Attribute mapping; sorted keys give deterministic output.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// One variable of a source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableSpec {
    pub name: String,
    /// Dimension names in declared order
    pub dimensions: Vec<String>,
    pub shape: Vec<u64>,
    pub dtype: DataType,
    pub attributes: Attributes,
    /// 1-D variable named like its dimension
    pub is_coordinate: bool,
    /// Recognized as the source's time coordinate
    pub time_encoded: bool,
}

impl VariableSpec {
    /// Decoded size in bytes, 0 when the element size is not fixed.
    pub fn data_bytes(&self) -> u64 {
        let elements: u64 = self.shape.iter().product();
        elements.saturating_mul(self.dtype.item_size().unwrap_or(0))
    }
}

/// Decoded time coordinate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeAxis {
    pub variable: String,
    pub dimension: Option<String>,
    pub units: String,
    pub calendar: Calendar,
    pub length: u64,
    /// First instant, absent when the coordinate values could not be read
    pub start: Option<CalendarDateTime>,
    pub end: Option<CalendarDateTime>,
    /// Step between consecutive values, in seconds
    pub step_seconds: Option<f64>,
    /// Whether every step is equal; `None` when not all values were read
    pub regular: Option<bool>,
}

impl TimeAxis {
    pub fn has_coverage(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }
}

/// Outcome of time-axis detection for one source.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TimeStatus {
    /// No variable looks like a time coordinate
    Absent,
    Decoded(TimeAxis),
    /// A time coordinate exists but its encoding could not be decoded
    Undecodable { variable: String, reason: String },
}

impl TimeStatus {
    pub fn axis(&self) -> Option<&TimeAxis> {
        match self {
            TimeStatus::Decoded(axis) => Some(axis),
            _ => None,
        }
    }

    pub fn variable(&self) -> Option<&str> {
        match self {
            TimeStatus::Decoded(axis) => Some(&axis.variable),
            TimeStatus::Undecodable { variable, .. } => Some(variable),
            TimeStatus::Absent => None,
        }
    }
}

/// Normalized description of one source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRecord {
    pub source: DatasetSource,
    pub dimensions: Vec<DimensionSpec>,
    pub variables: Vec<VariableSpec>,
    pub global_attributes: Attributes,
    pub time: TimeStatus,
    /// Decoded in-memory size of all variables
    pub data_bytes: u64,
}

impl NormalizedRecord {
    pub fn dimension(&self, name: &str) -> Option<&DimensionSpec> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    pub fn variable(&self, name: &str) -> Option<&VariableSpec> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Dimension of the time coordinate, if one was recognized.
    pub fn time_dimension(&self) -> Option<&str> {
        let variable = self.variable(self.time.variable()?)?;
        match variable.dimensions.as_slice() {
            [dim] => Some(dim),
            _ => None,
        }
    }

    /// Whether `name` is the time or an unlimited dimension in this record.
    pub fn is_time_like_dimension(&self, name: &str) -> bool {
        self.time_dimension() == Some(name)
            || self.dimension(name).is_some_and(|d| d.unlimited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_value_serialization() {
        let text = AttributeValue::text("test");
        assert_eq!(serde_json::to_string(&text).unwrap(), r#""test""#);

        let scalar = AttributeValue::Float {
            dtype: DataType::Float64,
            values: vec![42.5],
        };
        assert_eq!(serde_json::to_string(&scalar).unwrap(), "42.5");

        let array = AttributeValue::Int {
            dtype: DataType::Int32,
            values: vec![1, 2, 3],
        };
        assert_eq!(serde_json::to_string(&array).unwrap(), "[1,2,3]");
    }

    #[test]
    fn test_attribute_equality_keeps_width() {
        let narrow = AttributeValue::Int {
            dtype: DataType::Int16,
            values: vec![1],
        };
        let wide = AttributeValue::Int {
            dtype: DataType::Int32,
            values: vec![1],
        };
        assert_ne!(narrow, wide);
        assert_eq!(narrow, narrow.clone());
    }

    #[test]
    fn test_nan_attributes_compare_equal() {
        let fill = AttributeValue::Float {
            dtype: DataType::Float32,
            values: vec![f64::NAN],
        };
        assert_eq!(fill, fill.clone());
    }

    #[test]
    fn test_variable_data_bytes() {
        let var = VariableSpec {
            name: "tas".to_string(),
            dimensions: vec!["time".into(), "lat".into(), "lon".into()],
            shape: vec![10, 4, 5],
            dtype: DataType::Float32,
            attributes: Attributes::new(),
            is_coordinate: false,
            time_encoded: false,
        };
        assert_eq!(var.data_bytes(), 800);

        let label = VariableSpec {
            dtype: DataType::String,
            ..var
        };
        assert_eq!(label.data_bytes(), 0);
    }

    #[test]
    fn test_data_type_display() {
        assert_eq!(DataType::Float64.to_string(), "float64");
        assert_eq!(DataType::DateTime("ns".into()).to_string(), "datetime64[ns]");
        assert_eq!(DataType::FixedUnicode(8).item_size(), Some(32));
    }
}
