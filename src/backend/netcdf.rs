//! netCDF classic / netCDF-4 (HDF5) adapter on top of libnetcdf.
//!
//! Everything here blocks; callers run it inside `spawn_blocking`. Remote
//! objects are opened through libnetcdf's HTTP byte-range mode, which only
//! fetches the header blocks it needs.

use ::netcdf::types::{FloatType, IntType, NcVariableType};
use ::netcdf::AttributeValue as NcAttributeValue;
use std::ops::Range;
use tracing::debug;

use super::{AttributeScope, BackendAdapter, CoordinateValues};
use crate::config::StorageConfig;
use crate::error::{InspectError, Result};
use crate::model::{AttributeValue, BackendKind, DataType, DatasetSource, DimensionSpec, Location};
use crate::store::s3_http_url;

/// libnetcdf's "not a netCDF file" status.
const NC_ENOTNC: i32 = -51;

pub struct NetCdfAdapter {
    source: DatasetSource,
    file: ::netcdf::File,
    max_coordinate_values: u64,
}

impl NetCdfAdapter {
    /// Open the file or remote object. The handle closes when the adapter drops.
    pub fn open(source: DatasetSource, storage: &StorageConfig, max_coordinate_values: u64) -> Result<Self> {
        let (target, remote) = match &source.location {
            Location::Local { path } => (path.display().to_string(), false),
            Location::S3 { bucket, key } => {
                (format!("{}#mode=bytes", s3_http_url(bucket, key, storage)), true)
            }
        };

        let file = ::netcdf::open(&target).map_err(|e| open_error(&source, remote, e))?;
        debug!(
            uri = %source.uri,
            variables = file.variables().count(),
            dimensions = file.dimensions().count(),
            "Opened netCDF file"
        );
        Ok(Self {
            source,
            file,
            max_coordinate_values,
        })
    }

    fn variable(&self, name: &str) -> Result<::netcdf::Variable<'_>> {
        self.file
            .variable(name)
            .ok_or_else(|| InspectError::corrupt(&self.source.uri, format!("variable '{}' vanished", name)))
    }

    fn nc_error(&self, e: ::netcdf::Error) -> InspectError {
        InspectError::corrupt(&self.source.uri, e.to_string())
    }
}

fn open_error(source: &DatasetSource, remote: bool, err: ::netcdf::Error) -> InspectError {
    match err {
        ::netcdf::Error::Netcdf(code) if code == NC_ENOTNC => InspectError::unsupported(
            &source.uri,
            "not a netCDF or HDF5 file",
        ),
        other if source.backend_kind == BackendKind::Other => {
            InspectError::unsupported(&source.uri, other.to_string())
        }
        other if remote => InspectError::unreachable(&source.uri, other.to_string()),
        other => InspectError::corrupt(&source.uri, other.to_string()),
    }
}

/// Map a libnetcdf attribute to the neutral form, keeping its width.
fn convert_attribute(value: NcAttributeValue) -> AttributeValue {
    fn int(dtype: DataType, values: Vec<i64>) -> AttributeValue {
        AttributeValue::Int { dtype, values }
    }
    fn uint(dtype: DataType, values: Vec<u64>) -> AttributeValue {
        AttributeValue::UInt { dtype, values }
    }
    fn float(dtype: DataType, values: Vec<f64>) -> AttributeValue {
        AttributeValue::Float { dtype, values }
    }

    match value {
        NcAttributeValue::Uchar(v) => uint(DataType::UInt8, vec![v as u64]),
        NcAttributeValue::Schar(v) => int(DataType::Int8, vec![v as i64]),
        NcAttributeValue::Ushort(v) => uint(DataType::UInt16, vec![v as u64]),
        NcAttributeValue::Short(v) => int(DataType::Int16, vec![v as i64]),
        NcAttributeValue::Uint(v) => uint(DataType::UInt32, vec![v as u64]),
        NcAttributeValue::Int(v) => int(DataType::Int32, vec![v as i64]),
        NcAttributeValue::Ulonglong(v) => uint(DataType::UInt64, vec![v]),
        NcAttributeValue::Longlong(v) => int(DataType::Int64, vec![v]),
        NcAttributeValue::Float(v) => float(DataType::Float32, vec![v as f64]),
        NcAttributeValue::Double(v) => float(DataType::Float64, vec![v]),
        NcAttributeValue::Str(s) => AttributeValue::Text(s),
        NcAttributeValue::Uchars(v) => uint(DataType::UInt8, v.into_iter().map(u64::from).collect()),
        NcAttributeValue::Schars(v) => int(DataType::Int8, v.into_iter().map(i64::from).collect()),
        NcAttributeValue::Ushorts(v) => uint(DataType::UInt16, v.into_iter().map(u64::from).collect()),
        NcAttributeValue::Shorts(v) => int(DataType::Int16, v.into_iter().map(i64::from).collect()),
        NcAttributeValue::Uints(v) => uint(DataType::UInt32, v.into_iter().map(u64::from).collect()),
        NcAttributeValue::Ints(v) => int(DataType::Int32, v.into_iter().map(i64::from).collect()),
        NcAttributeValue::Ulonglongs(v) => uint(DataType::UInt64, v),
        NcAttributeValue::Longlongs(v) => int(DataType::Int64, v),
        NcAttributeValue::Floats(v) => float(DataType::Float32, v.into_iter().map(f64::from).collect()),
        NcAttributeValue::Doubles(v) => float(DataType::Float64, v),
        NcAttributeValue::Strs(v) => AttributeValue::TextList(v),
    }
}

fn convert_type(vartype: NcVariableType) -> DataType {
    match vartype {
        NcVariableType::Int(IntType::I8) => DataType::Int8,
        NcVariableType::Int(IntType::I16) => DataType::Int16,
        NcVariableType::Int(IntType::I32) => DataType::Int32,
        NcVariableType::Int(IntType::I64) => DataType::Int64,
        NcVariableType::Int(IntType::U8) => DataType::UInt8,
        NcVariableType::Int(IntType::U16) => DataType::UInt16,
        NcVariableType::Int(IntType::U32) => DataType::UInt32,
        NcVariableType::Int(IntType::U64) => DataType::UInt64,
        NcVariableType::Float(FloatType::F32) => DataType::Float32,
        NcVariableType::Float(FloatType::F64) => DataType::Float64,
        NcVariableType::Char => DataType::Char,
        NcVariableType::String => DataType::String,
        other => DataType::Other(format!("{:?}", other).to_lowercase()),
    }
}

/// Read a slice of a 1-D numeric variable as `f64`. `None` for non-numeric types.
fn read_as_f64(
    var: &::netcdf::Variable<'_>,
    range: Range<usize>,
) -> std::result::Result<Option<Vec<f64>>, ::netcdf::Error> {
    macro_rules! typed {
        ($t:ty) => {
            var.get_values::<$t, _>([range])?
                .into_iter()
                .map(|v| v as f64)
                .collect()
        };
    }
    let values: Vec<f64> = match var.vartype() {
        NcVariableType::Float(FloatType::F64) => var.get_values::<f64, _>([range])?,
        NcVariableType::Float(FloatType::F32) => typed!(f32),
        NcVariableType::Int(IntType::I64) => typed!(i64),
        NcVariableType::Int(IntType::I32) => typed!(i32),
        NcVariableType::Int(IntType::I16) => typed!(i16),
        NcVariableType::Int(IntType::I8) => typed!(i8),
        NcVariableType::Int(IntType::U64) => typed!(u64),
        NcVariableType::Int(IntType::U32) => typed!(u32),
        NcVariableType::Int(IntType::U16) => typed!(u16),
        NcVariableType::Int(IntType::U8) => typed!(u8),
        _ => return Ok(None),
    };
    Ok(Some(values))
}

impl BackendAdapter for NetCdfAdapter {
    fn source(&self) -> &DatasetSource {
        &self.source
    }

    fn list_dimensions(&self) -> Result<Vec<DimensionSpec>> {
        Ok(self
            .file
            .dimensions()
            .map(|dim| DimensionSpec {
                name: dim.name().to_string(),
                length: dim.len() as u64,
                unlimited: dim.is_unlimited(),
            })
            .collect())
    }

    fn list_variables(&self) -> Result<Vec<String>> {
        Ok(self.file.variables().map(|v| v.name().to_string()).collect())
    }

    fn attribute_names(&self, scope: AttributeScope<'_>) -> Result<Vec<String>> {
        Ok(match scope {
            AttributeScope::Global => self.file.attributes().map(|a| a.name().to_string()).collect(),
            AttributeScope::Variable(name) => self
                .variable(name)?
                .attributes()
                .map(|a| a.name().to_string())
                .collect(),
        })
    }

    fn get_attribute(&self, scope: AttributeScope<'_>, name: &str) -> Result<Option<AttributeValue>> {
        let attr = match scope {
            AttributeScope::Global => self.file.attribute(name),
            AttributeScope::Variable(var) => self.variable(var)?.attribute(name),
        };
        match attr {
            Some(attr) => Ok(Some(convert_attribute(
                attr.value().map_err(|e| self.nc_error(e))?,
            ))),
            None => Ok(None),
        }
    }

    fn get_variable_dimensions(&self, name: &str) -> Result<Vec<String>> {
        Ok(self
            .variable(name)?
            .dimensions()
            .iter()
            .map(|d| d.name().to_string())
            .collect())
    }

    fn get_variable_shape(&self, name: &str) -> Result<Vec<u64>> {
        Ok(self
            .variable(name)?
            .dimensions()
            .iter()
            .map(|d| d.len() as u64)
            .collect())
    }

    fn get_variable_dtype(&self, name: &str) -> Result<DataType> {
        Ok(convert_type(self.variable(name)?.vartype()))
    }

    fn read_coordinate(&self, name: &str) -> Result<Option<CoordinateValues>> {
        let var = self.variable(name)?;
        let [dim] = var.dimensions() else {
            return Ok(None);
        };
        let length = dim.len();
        if length == 0 {
            return Ok(Some(CoordinateValues {
                length: 0,
                values: Vec::new(),
                complete: true,
            }));
        }

        if length as u64 <= self.max_coordinate_values {
            let values = read_as_f64(&var, 0..length).map_err(|e| self.nc_error(e))?;
            return Ok(values.map(|values| CoordinateValues {
                length: length as u64,
                values,
                complete: true,
            }));
        }

        let first = read_as_f64(&var, 0..1).map_err(|e| self.nc_error(e))?;
        let last = read_as_f64(&var, length - 1..length).map_err(|e| self.nc_error(e))?;
        Ok(first.zip(last).map(|(first, last)| CoordinateValues {
            length: length as u64,
            values: first.into_iter().chain(last).collect(),
            complete: false,
        }))
    }
}
