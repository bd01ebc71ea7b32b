//! Type coercion of resolved parameter values.
//!
//! Converts a resolved JSON value to its declared parameter type. Coercion
//! is idempotent for values already of the target type, `Null` passes
//! through for every target, and every failure names the parameter, the
//! expected type, the received JSON type, and a truncated preview of the
//! received value.

use runlet_types::error::CoercionError;
use runlet_types::reference::ParamType;
use serde_json::Value;

/// Maximum length of the value preview embedded in failure messages.
const PREVIEW_MAX_CHARS: usize = 100;

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Coerce `value` to the declared target type, if one was declared.
///
/// `None` means the parameter carries no type declaration and the value
/// passes through untouched (credentials consumed as opaque blobs rely on
/// this).
pub fn coerce_declared(
    value: Value,
    expected_type: Option<&str>,
    param: &str,
) -> Result<Value, CoercionError> {
    match expected_type {
        Some(target) => coerce(value, target, param),
        None => Ok(value),
    }
}

/// Coerce `value` to the named target type.
pub fn coerce(value: Value, target: &str, param: &str) -> Result<Value, CoercionError> {
    let target = ParamType::parse(target, param)?;

    // Null coerces to null regardless of target.
    if value.is_null() {
        return Ok(Value::Null);
    }

    match target {
        ParamType::String => coerce_string(value),
        ParamType::Integer => coerce_integer(value, param),
        ParamType::Float => coerce_float(value, param),
        ParamType::Boolean => coerce_boolean(value, param),
        ParamType::Array => coerce_array(value, param),
        ParamType::Object => coerce_object(value, param),
    }
}

// ---------------------------------------------------------------------------
// Per-target rules
// ---------------------------------------------------------------------------

fn coerce_string(value: Value) -> Result<Value, CoercionError> {
    let s = match value {
        Value::String(s) => s,
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // Arrays and objects render as compact JSON.
        other => other.to_string(),
    };
    Ok(Value::String(s))
}

fn coerce_integer(value: Value, param: &str) -> Result<Value, CoercionError> {
    match &value {
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                return Ok(value);
            }
            // Floats truncate toward zero.
            if let Some(f) = n.as_f64() {
                return Ok(Value::from(f.trunc() as i64));
            }
            Err(incompatible(param, ParamType::Integer, &value))
        }
        Value::String(s) => {
            // Numeric strings parse via float-then-truncate; the empty
            // string is an explicit failure, not zero.
            match s.trim().parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(Value::from(f.trunc() as i64)),
                _ => Err(incompatible(param, ParamType::Integer, &value)),
            }
        }
        _ => Err(incompatible(param, ParamType::Integer, &value)),
    }
}

fn coerce_float(value: Value, param: &str) -> Result<Value, CoercionError> {
    match &value {
        Value::Number(n) => match n.as_f64() {
            Some(f) => Ok(Value::from(f)),
            None => Err(incompatible(param, ParamType::Float, &value)),
        },
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(f) if f.is_finite() => Ok(Value::from(f)),
            _ => Err(incompatible(param, ParamType::Float, &value)),
        },
        _ => Err(incompatible(param, ParamType::Float, &value)),
    }
}

fn coerce_boolean(value: Value, param: &str) -> Result<Value, CoercionError> {
    match &value {
        Value::Bool(_) => Ok(value),
        Value::Number(n) => Ok(Value::Bool(n.as_f64().unwrap_or(0.0) != 0.0)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Value::Bool(true)),
            "false" | "0" | "no" | "off" | "" => Ok(Value::Bool(false)),
            _ => Err(incompatible(param, ParamType::Boolean, &value)),
        },
        _ => Err(incompatible(param, ParamType::Boolean, &value)),
    }
}

fn coerce_array(value: Value, param: &str) -> Result<Value, CoercionError> {
    match &value {
        Value::Array(_) => Ok(value),
        Value::String(s) => {
            if s.is_empty() {
                return Ok(Value::Array(vec![]));
            }
            match serde_json::from_str::<Value>(s) {
                Ok(parsed @ Value::Array(_)) => Ok(parsed),
                // Valid JSON of the wrong shape and invalid JSON both fail.
                _ => Err(incompatible(param, ParamType::Array, &value)),
            }
        }
        _ => Err(incompatible(param, ParamType::Array, &value)),
    }
}

fn coerce_object(value: Value, param: &str) -> Result<Value, CoercionError> {
    match &value {
        Value::Object(_) => Ok(value),
        Value::String(s) => {
            if s.is_empty() {
                return Ok(Value::Object(serde_json::Map::new()));
            }
            match serde_json::from_str::<Value>(s) {
                Ok(parsed @ Value::Object(_)) => Ok(parsed),
                _ => Err(incompatible(param, ParamType::Object, &value)),
            }
        }
        _ => Err(incompatible(param, ParamType::Object, &value)),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The JSON type name of a value, for error messages.
fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn incompatible(param: &str, expected: ParamType, value: &Value) -> CoercionError {
    let rendered = value.to_string();
    let preview: String = rendered.chars().take(PREVIEW_MAX_CHARS).collect();
    CoercionError::Incompatible {
        param: param.to_string(),
        expected: expected.to_string(),
        received: json_type_name(value),
        preview,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
