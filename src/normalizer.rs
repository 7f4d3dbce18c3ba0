//! Metadata normalization: adapter answers in, one [`NormalizedRecord`] out.
//!
//! Structural violations are errors. Time metadata that cannot be decoded is
//! not; the record then carries [`TimeStatus::Undecodable`] with the reason.

use std::collections::HashSet;
use tracing::{debug, warn};

use crate::backend::{AttributeScope, BackendAdapter};
use crate::calendar::{decode_instant, Calendar, TimeUnits};
use crate::error::{InspectError, Result};
use crate::model::{
    Attributes, DataType, NormalizedRecord, TimeAxis, TimeStatus, VariableSpec,
};

/// Relative tolerance when judging whether time steps are equal.
const STEP_TOLERANCE: f64 = 1e-9;

/// Produce the backend-neutral record for an opened source.
pub fn normalize(handle: &dyn BackendAdapter) -> Result<NormalizedRecord> {
    let source = handle.source().clone();
    let uri = source.uri.as_str();
    let structural = |message: String| InspectError::Normalization {
        uri: uri.to_string(),
        message,
    };

    let dimensions = handle.list_dimensions()?;
    let mut seen = HashSet::new();
    for dim in &dimensions {
        if !seen.insert(dim.name.as_str()) {
            return Err(structural(format!("dimension '{}' declared twice", dim.name)));
        }
    }

    let time_variable = handle.get_time_variable_name()?;

    let mut variables = Vec::new();
    let mut names = HashSet::new();
    for name in handle.list_variables()? {
        if !names.insert(name.clone()) {
            return Err(structural(format!("variable '{}' declared twice", name)));
        }
        let var_dims = handle.get_variable_dimensions(&name)?;
        let shape = handle.get_variable_shape(&name)?;
        if var_dims.len() != shape.len() {
            return Err(structural(format!(
                "variable '{}' has {} dimensions but rank {}",
                name,
                var_dims.len(),
                shape.len()
            )));
        }
        for (dim_name, len) in var_dims.iter().zip(&shape) {
            let Some(dim) = dimensions.iter().find(|d| &d.name == dim_name) else {
                return Err(structural(format!(
                    "variable '{}' references undeclared dimension '{}'",
                    name, dim_name
                )));
            };
            if !dim.unlimited && dim.length != *len {
                return Err(structural(format!(
                    "variable '{}' has length {} along '{}' of length {}",
                    name, len, dim_name, dim.length
                )));
            }
        }

        let attributes = read_attributes(handle, AttributeScope::Variable(&name))?;
        variables.push(VariableSpec {
            is_coordinate: var_dims.len() == 1 && var_dims[0] == name,
            time_encoded: time_variable.as_deref() == Some(name.as_str()),
            dtype: handle.get_variable_dtype(&name)?,
            name,
            dimensions: var_dims,
            shape,
            attributes,
        });
    }

    let global_attributes = read_attributes(handle, AttributeScope::Global)?;

    let time = match &time_variable {
        None => TimeStatus::Absent,
        Some(name) => match variables.iter().find(|v| &v.name == name) {
            Some(variable) => decode_time_axis(handle, variable)?,
            None => TimeStatus::Absent,
        },
    };
    if let TimeStatus::Undecodable { variable, reason } = &time {
        debug!(uri = %uri, variable = %variable, reason = %reason, "Time axis undecodable");
    }

    let data_bytes = variables.iter().map(VariableSpec::data_bytes).sum();
    Ok(NormalizedRecord {
        source,
        dimensions,
        variables,
        global_attributes,
        time,
        data_bytes,
    })
}

fn read_attributes(handle: &dyn BackendAdapter, scope: AttributeScope<'_>) -> Result<Attributes> {
    let mut attributes = Attributes::new();
    for name in handle.attribute_names(scope)? {
        if let Some(value) = handle.get_attribute(scope, &name)? {
            attributes.insert(name, value);
        }
    }
    Ok(attributes)
}

fn undecodable(variable: &VariableSpec, reason: impl Into<String>) -> TimeStatus {
    TimeStatus::Undecodable {
        variable: variable.name.clone(),
        reason: reason.into(),
    }
}

/// Units and calendar of a time coordinate. A datetime-typed array without
/// `units` counts as `<unit> since 1970-01-01`, proleptic Gregorian.
fn time_encoding(variable: &VariableSpec) -> std::result::Result<(String, Calendar), String> {
    let calendar_attr = variable.attributes.get("calendar");
    let calendar_text = match calendar_attr {
        None => None,
        Some(value) => Some(value.as_text().ok_or("calendar attribute is not text")?),
    };

    match (variable.attributes.get("units"), &variable.dtype) {
        (Some(units), _) => {
            let units = units.as_text().ok_or("units attribute is not text")?;
            let calendar = Calendar::parse(calendar_text).map_err(|e| e.to_string())?;
            Ok((units.to_string(), calendar))
        }
        (None, DataType::DateTime(unit)) => {
            let calendar = match calendar_text {
                Some(text) => Calendar::parse(Some(text)).map_err(|e| e.to_string())?,
                None => Calendar::ProlepticGregorian,
            };
            Ok((format!("{} since 1970-01-01", unit), calendar))
        }
        (None, _) => Err("time coordinate has no units attribute".to_string()),
    }
}

fn decode_time_axis(handle: &dyn BackendAdapter, variable: &VariableSpec) -> Result<TimeStatus> {
    let (units_text, calendar) = match time_encoding(variable) {
        Ok(encoding) => encoding,
        Err(reason) => return Ok(undecodable(variable, reason)),
    };
    let units = match TimeUnits::parse(&units_text) {
        Ok(units) => units,
        Err(e) => return Ok(undecodable(variable, e.to_string())),
    };
    let unit_seconds = match units.unit.seconds(calendar) {
        Ok(seconds) => seconds,
        Err(e) => return Ok(undecodable(variable, e.to_string())),
    };
    // Validates the reference date against the calendar.
    if let Err(e) = decode_instant(&units, calendar, 0.0) {
        return Ok(undecodable(variable, e.to_string()));
    }

    let mut axis = TimeAxis {
        variable: variable.name.clone(),
        dimension: variable.dimensions.first().cloned(),
        units: units_text,
        calendar,
        length: variable.shape.first().copied().unwrap_or(0),
        start: None,
        end: None,
        step_seconds: None,
        regular: None,
    };

    let coordinate = match handle.read_coordinate(&variable.name) {
        Ok(coordinate) => coordinate,
        Err(e) if e.is_retryable() => return Err(e),
        Err(e) => {
            warn!(uri = %handle.source().uri, variable = %variable.name, error = %e, "Could not read time values");
            None
        }
    };
    let Some(coordinate) = coordinate else {
        return Ok(TimeStatus::Decoded(axis));
    };

    let missing: Vec<f64> = ["_FillValue", "missing_value"]
        .iter()
        .filter_map(|key| variable.attributes.get(*key))
        .filter_map(|value| value.as_f64())
        .collect();
    let values: Vec<f64> = coordinate
        .values
        .iter()
        .copied()
        .filter(|v| v.is_finite() && !missing.contains(v))
        .collect();
    if values.is_empty() {
        return Ok(TimeStatus::Decoded(axis));
    }

    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    let start = decode_instant(&units, calendar, min);
    let end = decode_instant(&units, calendar, max);
    match (start, end) {
        (Ok(start), Ok(end)) => {
            axis.start = Some(start);
            axis.end = Some(end);
        }
        (Err(e), _) | (_, Err(e)) => return Ok(undecodable(variable, e.to_string())),
    }

    if coordinate.complete && values.len() >= 2 {
        let first_step = values[1] - values[0];
        let regular = values.windows(2).all(|w| {
            let step = w[1] - w[0];
            (step - first_step).abs() <= STEP_TOLERANCE * first_step.abs().max(1.0)
        });
        axis.regular = Some(regular);
        if regular {
            axis.step_seconds = Some(first_step * unit_seconds);
        }
    }

    Ok(TimeStatus::Decoded(axis))
}
