//! List envelope normalization.
//!
//! List endpoints answer with a bare array or with the array wrapped in one
//! of a few known envelopes. The shapes are checked in this order:
//!
//! 1. `[...]`
//! 2. `{"data": [...]}`
//! 3. `{"events": [...]}`
//! 4. `{"items": [...]}`
//! 5. `{"results": [...]}`
//! 6. `{"data": {"items": [...]}}`
//! 7. `{"data": {"results": [...]}}`
//! 8. `{"data": {"docs": [...]}}`
//!
//! Anything else is an error, not an empty list.

use serde_json::Value;

use crate::error::ApiError;
use crate::types::{EventSummary, Page};

const TOP_LEVEL_KEYS: [&str; 4] = ["data", "events", "items", "results"];
const NESTED_KEYS: [&str; 3] = ["items", "results", "docs"];

/// Extract the item array from a list response.
pub fn normalize_list(value: Value) -> Result<Vec<Value>, ApiError> {
    let map = match value {
        Value::Array(items) => return Ok(items),
        Value::Object(map) => map,
        other => return Err(ApiError::UnrecognizedEnvelope(shape_of(&other))),
    };

    for key in TOP_LEVEL_KEYS {
        if let Some(Value::Array(items)) = map.get(key) {
            return Ok(items.clone());
        }
    }
    if let Some(nested) = map.get("data").filter(|d| d.is_object()) {
        for key in NESTED_KEYS {
            if let Some(Value::Array(items)) = nested.get(key) {
                return Ok(items.clone());
            }
        }
    }
    Err(ApiError::UnrecognizedEnvelope(shape_of(&Value::Object(map))))
}

/// Normalize a list response into event summaries, dropping items without an id.
pub fn normalize_events(value: Value) -> Result<Vec<EventSummary>, ApiError> {
    Ok(normalize_list(value)?
        .iter()
        .filter_map(EventSummary::from_value)
        .collect())
}

/// Normalize a paged response. Missing paging fields are derived from the items.
pub fn normalize_page(value: Value) -> Result<Page<EventSummary>, ApiError> {
    let total = value.get("total").and_then(Value::as_u64);
    let page = value.get("page").and_then(Value::as_u64);
    let pages = value.get("pages").and_then(Value::as_u64);
    let items = normalize_events(value)?;
    Ok(Page {
        total: total.unwrap_or(items.len() as u64),
        page: page.map_or(1, saturate_u32),
        pages: pages.map_or(1, saturate_u32),
        items,
    })
}

/// Unwrap a single-object response: bare object, `{"data": {...}}`, or a one-element array.
pub fn normalize_single(value: Value) -> Result<Value, ApiError> {
    match value {
        Value::Array(mut items) if !items.is_empty() => Ok(items.swap_remove(0)),
        Value::Object(mut map) => match map.remove("data") {
            Some(data @ Value::Object(_)) => Ok(data),
            Some(other) => {
                map.insert("data".to_string(), other);
                Ok(Value::Object(map))
            }
            None => Ok(Value::Object(map)),
        },
        other => Err(ApiError::UnrecognizedEnvelope(shape_of(&other))),
    }
}

fn saturate_u32(n: u64) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn shape_of(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(items) => format!("array of {}", items.len()),
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            format!("object with keys [{}]", keys.join(", "))
        }
    }
}
