//! Test data generation utilities.
//!
//! Every fixture is a daily series `tas(time, lat)` with three latitudes and
//! time encoded as `days since 2000-01-01`. Bulk payloads are never written;
//! inspection must not need them.

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

type Result<T> = std::result::Result<T, netcdf::Error>;

/// Days since 2000-01-01 in the standard calendar for January and February.
pub const JANUARY: (f64, usize) = (0.0, 31);
pub const FEBRUARY: (f64, usize) = (31.0, 29);
/// February in the 360_day calendar.
pub const FEBRUARY_360: (f64, usize) = (30.0, 30);

/// Write a netCDF file holding `days.1` daily steps starting at `days.0`.
pub fn create_daily_nc(path: &Path, calendar: &str, days: (f64, usize)) -> Result<()> {
    create_nc_with_units(path, "days since 2000-01-01", calendar, days)
}

/// Same layout with arbitrary time units, for undecodable encodings.
pub fn create_nc_with_units(path: &Path, units: &str, calendar: &str, days: (f64, usize)) -> Result<()> {
    let (first, count) = days;
    let mut file = netcdf::create(path)?;

    file.add_unlimited_dimension("time")?;
    file.add_dimension("lat", 3)?;
    file.add_attribute("title", "metadata-inspector fixture")?;
    file.add_attribute("institution", "test suite")?;

    let time_values: Vec<f64> = (0..count).map(|i| first + i as f64).collect();
    {
        let mut time = file.add_variable::<f64>("time", &["time"])?;
        time.put_attribute("units", units)?;
        time.put_attribute("calendar", calendar)?;
        time.put_attribute("standard_name", "time")?;
        time.put_values(&time_values, [0..count])?;
    }
    {
        let mut lat = file.add_variable::<f32>("lat", &["lat"])?;
        lat.put_attribute("units", "degrees_north")?;
        lat.put_values(&[-45.0_f32, 0.0, 45.0], [0..3])?;
    }
    {
        let mut tas = file.add_variable::<f32>("tas", &["time", "lat"])?;
        tas.put_attribute("units", "K")?;
        tas.put_attribute("long_name", "Near-surface air temperature")?;
    }
    Ok(())
}

fn write_json(path: PathBuf, value: Value) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, serde_json::to_vec_pretty(&value).unwrap()).unwrap();
}

fn le_bytes(values: &[i64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Write a zarr v2 store (unconsolidated) with an uncompressed int64 time chunk.
pub fn create_zarr_v2(dir: &Path, name: &str, days: (f64, usize)) -> PathBuf {
    let root = dir.join(name);
    let (first, count) = days;
    let values: Vec<i64> = (0..count as i64).map(|i| first as i64 + i).collect();

    write_json(root.join(".zgroup"), json!({"zarr_format": 2}));
    write_json(root.join(".zattrs"), json!({"title": "metadata-inspector fixture"}));

    write_json(
        root.join("time/.zarray"),
        json!({
            "zarr_format": 2, "shape": [count], "chunks": [count], "dtype": "<i8",
            "compressor": null, "fill_value": null, "filters": null, "order": "C"
        }),
    );
    write_json(
        root.join("time/.zattrs"),
        json!({
            "_ARRAY_DIMENSIONS": ["time"],
            "units": "days since 2000-01-01",
            "calendar": "standard"
        }),
    );
    fs::write(root.join("time/0"), le_bytes(&values)).unwrap();

    write_json(
        root.join("tas/.zarray"),
        json!({
            "zarr_format": 2, "shape": [count, 3], "chunks": [count, 3], "dtype": "<f4",
            "compressor": {"id": "blosc", "cname": "lz4", "clevel": 5, "shuffle": 1},
            "fill_value": "NaN", "filters": null, "order": "C"
        }),
    );
    write_json(
        root.join("tas/.zattrs"),
        json!({"_ARRAY_DIMENSIONS": ["time", "lat"], "units": "K"}),
    );
    root
}

/// Write a zarr v3 store with an uncompressed int64 time chunk.
pub fn create_zarr_v3(dir: &Path, name: &str, days: (f64, usize)) -> PathBuf {
    let root = dir.join(name);
    let (first, count) = days;
    let values: Vec<i64> = (0..count as i64).map(|i| first as i64 + i).collect();
    let array = |shape: Value, dtype: &str, fill: Value, dims: Value, attrs: Value| {
        json!({
            "zarr_format": 3,
            "node_type": "array",
            "shape": shape.clone(),
            "data_type": dtype,
            "chunk_grid": {"name": "regular", "configuration": {"chunk_shape": shape}},
            "chunk_key_encoding": {"name": "default", "configuration": {"separator": "/"}},
            "fill_value": fill,
            "codecs": [{"name": "bytes", "configuration": {"endian": "little"}}],
            "attributes": attrs,
            "dimension_names": dims
        })
    };

    write_json(
        root.join("zarr.json"),
        json!({
            "zarr_format": 3,
            "node_type": "group",
            "attributes": {"title": "metadata-inspector fixture"}
        }),
    );
    write_json(
        root.join("time/zarr.json"),
        array(
            json!([count]),
            "int64",
            json!(-1),
            json!(["time"]),
            json!({"units": "days since 2000-01-01", "calendar": "standard"}),
        ),
    );
    fs::create_dir_all(root.join("time/c")).unwrap();
    fs::write(root.join("time/c/0"), le_bytes(&values)).unwrap();
    write_json(
        root.join("tas/zarr.json"),
        array(
            json!([count, 3]),
            "float32",
            json!("NaN"),
            json!(["time", "lat"]),
            json!({"units": "K"}),
        ),
    );
    root
}

pub fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
