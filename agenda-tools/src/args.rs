//! Helpers for pulling typed values out of LLM-provided JSON arguments.

use crate::error::{Result, ToolError};
use chrono::{NaiveDate, NaiveTime};

pub fn require_string(args: &serde_json::Value, key: &str) -> Result<String> {
    let Some(v) = args.get(key) else {
        return Err(ToolError::InvalidArguments(format!("missing key: {key}")));
    };
    match v {
        serde_json::Value::String(s) => Ok(s.clone()),
        other => Err(ToolError::InvalidArguments(format!(
            "key {key} must be string, got {other:?}"
        ))),
    }
}

pub fn optional_string(args: &serde_json::Value, key: &str) -> Result<Option<String>> {
    let Some(v) = args.get(key) else {
        return Ok(None);
    };
    match v {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => Ok(Some(s.clone())),
        other => Err(ToolError::InvalidArguments(format!(
            "key {key} must be string, got {other:?}"
        ))),
    }
}

/// Like [`require_string`] but rejects blank values.
pub fn require_non_empty(args: &serde_json::Value, key: &str) -> Result<String> {
    let value = require_string(args, key)?;
    if value.trim().is_empty() {
        return Err(ToolError::InvalidArguments(format!(
            "key {key} must be non-empty"
        )));
    }
    Ok(value)
}

/// Integer in `min..=max`, or `default` when absent. Integral floats and
/// numeric strings are accepted since models emit both.
pub fn optional_u32_in_range(
    args: &serde_json::Value,
    key: &str,
    min: u32,
    max: u32,
    default: u32,
) -> Result<u32> {
    let value = match args.get(key) {
        None | Some(serde_json::Value::Null) => return Ok(default),
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
        Some(serde_json::Value::String(s)) => s.trim().parse::<u64>().ok(),
        Some(other) => {
            return Err(ToolError::InvalidArguments(format!(
                "key {key} must be integer, got {other:?}"
            )));
        }
    };
    let Some(value) = value else {
        return Err(ToolError::InvalidArguments(format!(
            "key {key} must be a non-negative integer"
        )));
    };
    if value < u64::from(min) || value > u64::from(max) {
        return Err(ToolError::InvalidArguments(format!(
            "key {key} must be between {min} and {max}, got {value}"
        )));
    }
    Ok(value as u32)
}

/// Parses a strict `YYYY-MM-DD` date.
pub fn parse_date(key: &str, raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    if raw.len() != 10 {
        return Err(invalid_format(key, raw, "YYYY-MM-DD"));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| invalid_format(key, raw, "YYYY-MM-DD"))
}

/// Parses a strict 24-hour `HH:MM` time.
pub fn parse_time(key: &str, raw: &str) -> Result<NaiveTime> {
    let raw = raw.trim();
    if raw.len() != 5 {
        return Err(invalid_format(key, raw, "HH:MM"));
    }
    NaiveTime::parse_from_str(raw, "%H:%M").map_err(|_| invalid_format(key, raw, "HH:MM"))
}

pub fn optional_date(args: &serde_json::Value, key: &str) -> Result<Option<NaiveDate>> {
    optional_string(args, key)?
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_date(key, &s))
        .transpose()
}

pub fn optional_time(args: &serde_json::Value, key: &str) -> Result<Option<NaiveTime>> {
    optional_string(args, key)?
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_time(key, &s))
        .transpose()
}

fn invalid_format(key: &str, raw: &str, expected: &str) -> ToolError {
    ToolError::InvalidArguments(format!("key {key} must be {expected}, got {raw:?}"))
}
