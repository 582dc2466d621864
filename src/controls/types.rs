//! Control set types
//!
//! A control set is a flat `name -> scalar` mapping of camera driver
//! parameters (`FrameRate`, `AwbEnable`, `ExposureTime`, ...). Names are
//! opaque here: they are only interpreted by the camera device.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{AppError, Result};

/// Scalar value of a single camera control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ControlValue {
    /// Integer view of the value, rounding floats and mapping booleans to 0/1
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ControlValue::Bool(b) => Some(*b as i64),
            ControlValue::Integer(i) => Some(*i),
            ControlValue::Float(f) if f.is_finite() => Some(f.round() as i64),
            ControlValue::Float(_) | ControlValue::Text(_) => None,
        }
    }

    /// Boolean view of the value; any non-zero number is `true`
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ControlValue::Bool(b) => Some(*b),
            ControlValue::Integer(i) => Some(*i != 0),
            ControlValue::Float(f) => Some(*f != 0.0),
            ControlValue::Text(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "on" | "1" => Some(true),
                "false" | "off" | "0" => Some(false),
                _ => None,
            },
        }
    }
}

impl fmt::Display for ControlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlValue::Bool(b) => write!(f, "{}", b),
            ControlValue::Integer(i) => write!(f, "{}", i),
            ControlValue::Float(v) => write!(f, "{}", v),
            ControlValue::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<bool> for ControlValue {
    fn from(value: bool) -> Self {
        ControlValue::Bool(value)
    }
}

impl From<i64> for ControlValue {
    fn from(value: i64) -> Self {
        ControlValue::Integer(value)
    }
}

impl From<f64> for ControlValue {
    fn from(value: f64) -> Self {
        ControlValue::Float(value)
    }
}

impl From<&str> for ControlValue {
    fn from(value: &str) -> Self {
        ControlValue::Text(value.to_string())
    }
}

/// Control name to value mapping.
///
/// Kept sorted so the persisted document is stable between writes.
pub type ControlSet = BTreeMap<String, ControlValue>;

/// Parse a JSON document into a control set.
///
/// Accepts only a flat object of scalars. An empty object is accepted here;
/// callers that need a non-empty update check that themselves.
pub fn parse_control_set(value: serde_json::Value) -> Result<ControlSet> {
    let object = match value {
        serde_json::Value::Object(object) => object,
        other => {
            return Err(AppError::Validation(format!(
                "expected a JSON object of controls, got {}",
                json_kind(&other)
            )))
        }
    };

    let mut controls = ControlSet::new();
    for (name, value) in object {
        if name.trim().is_empty() {
            return Err(AppError::Validation(
                "control names must not be empty".to_string(),
            ));
        }

        let value = match value {
            serde_json::Value::Bool(b) => ControlValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => ControlValue::Integer(i),
                None => n
                    .as_f64()
                    .map(ControlValue::Float)
                    .ok_or_else(|| {
                        AppError::Validation(format!("control '{}' is out of range", name))
                    })?,
            },
            serde_json::Value::String(s) => ControlValue::Text(s),
            other => {
                return Err(AppError::Validation(format!(
                    "control '{}' must be a number, boolean or string, got {}",
                    name,
                    json_kind(&other)
                )))
            }
        };
        controls.insert(name, value);
    }

    Ok(controls)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
