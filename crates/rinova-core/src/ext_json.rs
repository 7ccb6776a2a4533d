//! Extended-JSON scalar unwrapping.
//!
//! Documents exported from a document store, or imported from one, encode
//! typed scalars as single-key wrapper objects such as
//! `{"$numberInt": "5"}` or `{"$date": {"$numberLong": "1709294400000"}}`.
//! [`unwrap_extended`] rewrites those wrappers into native JSON numbers and
//! RFC 3339 strings so typed deserialization can proceed.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Number, Value};

use crate::error::{Error, Result};

/// Recursively replace extended-JSON wrappers with native values.
///
/// Fails on a wrapper whose payload cannot be converted; callers reading a
/// batch of documents skip the offending record.
pub fn unwrap_extended(value: Value) -> Result<Value> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(unwrap_extended)
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some((key, inner)) = map.iter().next() {
                    if key.starts_with('$') {
                        return unwrap_wrapper(key, inner);
                    }
                }
            }
            map.into_iter()
                .map(|(k, v)| unwrap_extended(v).map(|v| (k, v)))
                .collect::<Result<Map<_, _>>>()
                .map(Value::Object)
        }
        scalar => Ok(scalar),
    }
}

fn unwrap_wrapper(key: &str, inner: &Value) -> Result<Value> {
    match key {
        "$numberInt" | "$numberLong" => integer(inner)
            .map(|i| Value::Number(i.into()))
            .ok_or_else(|| bad(key, inner)),
        "$numberDouble" | "$numberDecimal" => double(inner)
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| bad(key, inner)),
        "$date" => date(inner)
            .map(|dt| Value::String(dt.to_rfc3339()))
            .ok_or_else(|| bad(key, inner)),
        "$oid" => inner
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(|| bad(key, inner)),
        // Unknown operators are ordinary single-key objects.
        _ => {
            let mut map = Map::new();
            map.insert(key.to_string(), unwrap_extended(inner.clone())?);
            Ok(Value::Object(map))
        }
    }
}

fn integer(v: &Value) -> Option<i64> {
    match v {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

fn double(v: &Value) -> Option<f64> {
    match v {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn date(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::Object(map) => map
            .get("$numberLong")
            .and_then(integer)
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

fn bad(key: &str, inner: &Value) -> Error {
    Error::Serialization(format!("cannot unwrap {key} wrapper with payload {inner}"))
}
