//! Lenient field decoding for marketplace payloads.
//! Amounts, ids and timestamps arrive as numbers or strings depending on the endpoint,
//! and a malformed value must never fail the surrounding payload.
// region:    --- Imports
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

// endregion: --- Imports

// region:    --- Amounts

/// Parses a user or server supplied amount. Unparsable input yields 0.
///
/// Accepts thousands separators and Arabic-Indic digits (`١٢٥٠٠`).
pub fn parse_amount(raw: &str) -> i64 {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '٬' | ' '))
        .map(|c| match c {
            '٠'..='٩' => char::from(b'0' + (c as u32 - '٠' as u32) as u8),
            '٫' => '.',
            other => other,
        })
        .collect();

    cleaned.parse::<f64>().map(whole_amount).unwrap_or(0)
}

/// Rounds to whole units. Negative, non-finite and out-of-range values yield 0.
fn whole_amount(value: f64) -> i64 {
    if !value.is_finite() || value < 0.0 || value >= MAX_AMOUNT {
        return 0;
    }
    value.round() as i64
}

// 2^63, the first f64 past `i64::MAX`.
const MAX_AMOUNT: f64 = 9_223_372_036_854_775_808.0;

/// Amount from an arbitrary JSON value. Anything that is not a non-negative finite
/// number or numeric string yields 0.
pub fn amount_from_value(value: &Value) -> i64 {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(whole) => whole.max(0),
            None => n.as_f64().map(whole_amount).unwrap_or(0),
        },
        Value::String(s) => parse_amount(s),
        _ => 0,
    }
}

pub fn lenient_amount<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map(amount_from_value).unwrap_or(0))
}

/// Optional amount: missing, null and non-positive values decode to `None`.
pub fn lenient_opt_amount<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .map(amount_from_value)
        .filter(|amount| *amount > 0))
}

// endregion: --- Amounts

// region:    --- Counts

/// Count from a number or numeric string; negative and malformed values yield `None`.
fn parse_count(value: &Value) -> Option<u32> {
    let raw = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    raw.map(|count| u32::try_from(count).unwrap_or(u32::MAX))
}

pub fn count_from_value(value: &Value) -> u32 {
    parse_count(value).unwrap_or(0)
}

pub fn lenient_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map(count_from_value).unwrap_or(0))
}

pub fn lenient_opt_count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_count))
}

// endregion: --- Counts

// region:    --- Identifiers

/// String-normalized id: numbers are stringified, whitespace trimmed.
pub fn id_from_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

pub fn lenient_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map(id_from_value).unwrap_or_default())
}

pub fn lenient_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .map(id_from_value)
        .filter(|id| !id.is_empty()))
}

// endregion: --- Identifiers

// region:    --- Timestamps

/// RFC 3339 strings or unix milliseconds. Invalid input decodes to `None`.
pub fn timestamp_from_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

pub fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(timestamp_from_value))
}

// endregion: --- Timestamps
