//! Conversion between [`AttributeValue`]s and their two external encodings:
//! the JSON the remote speaks, and the string-typed `{name, type, value}`
//! entries of a configuration file.

use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::{
    error::CodecError,
    model::{AttributeName, DesiredValue, RemoteAttributeSet},
    value::{AttributeValue, FieldKind},
};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Strings longer than this are inferred to be long text.
const LONGTEXT_THRESHOLD: usize = 100;

/// Decode a remote value of a known kind. JSON `null` means the field holds no
/// value and decodes to `None`.
pub fn decode(kind: FieldKind, wire: &Value) -> Result<Option<AttributeValue>, CodecError> {
    if wire.is_null() {
        return Ok(None);
    }
    let unexpected = || CodecError::UnexpectedWireValue {
        kind,
        found: wire.clone(),
    };
    let value = match kind {
        FieldKind::Text => AttributeValue::Text(wire.as_str().ok_or_else(unexpected)?.to_string()),
        FieldKind::Longtext => {
            AttributeValue::LongText(wire.as_str().ok_or_else(unexpected)?.to_string())
        }
        FieldKind::Url => AttributeValue::Url(wire.as_str().ok_or_else(unexpected)?.to_string()),
        FieldKind::Select => {
            AttributeValue::Select(wire.as_str().ok_or_else(unexpected)?.to_string())
        }
        FieldKind::Integer => AttributeValue::Integer(wire_integer(wire).ok_or_else(unexpected)?),
        FieldKind::Decimal => {
            let n = match wire {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            AttributeValue::Decimal(n.ok_or_else(unexpected)?)
        }
        FieldKind::Boolean => AttributeValue::Boolean(wire.as_bool().ok_or_else(unexpected)?),
        FieldKind::Date => {
            let s = wire.as_str().ok_or_else(unexpected)?;
            AttributeValue::Date(
                NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|_| unexpected())?,
            )
        }
        FieldKind::Json => AttributeValue::Json(wire.clone()),
        FieldKind::Multiselect => {
            let items = wire.as_array().ok_or_else(unexpected)?;
            AttributeValue::MultiSelect(
                items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(unexpected)?,
            )
        }
        FieldKind::Object => AttributeValue::Object(object_id(wire).ok_or_else(unexpected)?),
        FieldKind::Multiobject => {
            let items = wire.as_array().ok_or_else(unexpected)?;
            AttributeValue::MultiObject(
                items
                    .iter()
                    .map(object_id)
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(unexpected)?,
            )
        }
    };
    Ok(Some(value))
}

/// Whole numbers only; `3.0` is accepted, `3.5` is not.
fn wire_integer(wire: &Value) -> Option<i64> {
    match wire {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        _ => None,
    }
}

/// Object references come back either as a bare id or as a nested object.
fn object_id(wire: &Value) -> Option<u64> {
    match wire {
        Value::Number(n) => n.as_u64(),
        Value::Object(o) => o.get("id").and_then(Value::as_u64),
        _ => None,
    }
}

pub fn encode(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::Text(s)
        | AttributeValue::LongText(s)
        | AttributeValue::Url(s)
        | AttributeValue::Select(s) => Value::String(s.clone()),
        AttributeValue::Integer(i) => Value::from(*i),
        AttributeValue::Decimal(f) => Value::from(*f),
        AttributeValue::Boolean(b) => Value::Bool(*b),
        AttributeValue::Date(d) => Value::String(d.format(DATE_FORMAT).to_string()),
        AttributeValue::Json(v) => v.clone(),
        AttributeValue::MultiSelect(items) => {
            Value::Array(items.iter().cloned().map(Value::String).collect())
        }
        AttributeValue::Object(id) => Value::from(*id),
        AttributeValue::MultiObject(ids) => Value::Array(ids.iter().copied().map(Value::from).collect()),
    }
}

/// Best-effort typing of a remote value whose field definition is unknown,
/// e.g. when importing an object.
pub fn infer(wire: &Value) -> Option<AttributeValue> {
    let value = match wire {
        Value::Null => return None,
        Value::Bool(b) => AttributeValue::Boolean(*b),
        Value::Number(_) => match wire_integer(wire) {
            Some(i) => AttributeValue::Integer(i),
            None => AttributeValue::Decimal(wire.as_f64()?),
        },
        Value::String(s) => {
            if let Ok(date) = NaiveDate::parse_from_str(s, DATE_FORMAT) {
                AttributeValue::Date(date)
            } else if s.starts_with("http://") || s.starts_with("https://") {
                AttributeValue::Url(s.clone())
            } else if s.len() > LONGTEXT_THRESHOLD || s.contains('\n') {
                AttributeValue::LongText(s.clone())
            } else {
                AttributeValue::Text(s.clone())
            }
        }
        Value::Array(_) | Value::Object(_) => AttributeValue::Json(wire.clone()),
    };
    Some(value)
}

/// Decode a whole `custom_fields` object. Names with a declared kind are
/// decoded strictly; undeclared names are inferred. Null values are dropped.
pub fn decode_all(
    wire: &Map<String, Value>,
    kind_of: impl Fn(&str) -> Option<FieldKind>,
) -> Result<RemoteAttributeSet<AttributeValue>, CodecError> {
    let mut out = RemoteAttributeSet::new();
    for (name, v) in wire {
        let decoded = match kind_of(name) {
            Some(kind) => decode(kind, v)?,
            None => infer(v),
        };
        if let Some(value) = decoded {
            out.insert(AttributeName::new(name.clone()), value);
        }
    }
    Ok(out)
}

/// Parse the string form used in configuration files. The empty string is an
/// explicit request to remove the value.
pub fn parse_config_value(
    kind: FieldKind,
    raw: &str,
) -> Result<DesiredValue<AttributeValue>, CodecError> {
    if raw.is_empty() {
        return Ok(DesiredValue::Unset);
    }
    let invalid = |reason: String| CodecError::InvalidConfigValue {
        kind,
        value: raw.to_string(),
        reason,
    };
    let value = match kind {
        FieldKind::Text => AttributeValue::Text(raw.to_string()),
        FieldKind::Longtext => AttributeValue::LongText(raw.to_string()),
        FieldKind::Url => AttributeValue::Url(raw.to_string()),
        FieldKind::Select => AttributeValue::Select(raw.to_string()),
        FieldKind::Integer => {
            AttributeValue::Integer(raw.trim().parse().map_err(|e| invalid(format!("{}", e)))?)
        }
        FieldKind::Decimal => {
            let f: f64 = raw.trim().parse().map_err(|e| invalid(format!("{}", e)))?;
            if !f.is_finite() {
                return Err(invalid("not a finite number".to_string()));
            }
            AttributeValue::Decimal(f)
        }
        FieldKind::Boolean => match raw.trim() {
            "true" => AttributeValue::Boolean(true),
            "false" => AttributeValue::Boolean(false),
            _ => return Err(invalid("expected 'true' or 'false'".to_string())),
        },
        FieldKind::Date => AttributeValue::Date(
            NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
                .map_err(|e| invalid(format!("{}", e)))?,
        ),
        FieldKind::Json => {
            AttributeValue::Json(serde_json::from_str(raw).map_err(|e| invalid(format!("{}", e)))?)
        }
        FieldKind::Multiselect => AttributeValue::MultiSelect(split_list(raw).map(str::to_string).collect()),
        FieldKind::Object => {
            AttributeValue::Object(raw.trim().parse().map_err(|e| invalid(format!("{}", e)))?)
        }
        FieldKind::Multiobject => AttributeValue::MultiObject(
            split_list(raw)
                .map(|item| item.parse::<u64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| invalid(format!("{}", e)))?,
        ),
    };
    Ok(DesiredValue::Set(value))
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Render a value in the string form accepted by [`parse_config_value`].
pub fn format_config_value(value: &AttributeValue) -> String {
    match value {
        AttributeValue::Text(s)
        | AttributeValue::LongText(s)
        | AttributeValue::Url(s)
        | AttributeValue::Select(s) => s.clone(),
        AttributeValue::Integer(i) => i.to_string(),
        AttributeValue::Decimal(f) => f.to_string(),
        AttributeValue::Boolean(b) => b.to_string(),
        AttributeValue::Date(d) => d.format(DATE_FORMAT).to_string(),
        AttributeValue::Json(v) => v.to_string(),
        AttributeValue::MultiSelect(items) => items.join(","),
        AttributeValue::Object(id) => id.to_string(),
        AttributeValue::MultiObject(ids) => ids
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(","),
    }
}
