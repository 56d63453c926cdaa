use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

/// Converts any stored creation-time shape into an instant.
///
/// Accepted shapes: RFC 3339 strings, epoch milliseconds (number or numeric
/// string), and the document store's `{seconds, nanoseconds}` wrapper (with or
/// without leading underscores). Anything else is epoch zero, which sinks the
/// record to the bottom of any newest-first ordering.
pub fn normalize_timestamp(value: &Value) -> DateTime<Utc> {
    parse_timestamp(value).unwrap_or_default()
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(raw) => {
            let trimmed = raw.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
                return Some(parsed.with_timezone(&Utc));
            }
            trimmed
                .parse::<i64>()
                .ok()
                .and_then(DateTime::from_timestamp_millis)
        }
        Value::Number(number) => {
            let millis = number
                .as_i64()
                .or_else(|| number.as_f64().map(|value| value as i64))?;
            DateTime::from_timestamp_millis(millis)
        }
        Value::Object(obj) => {
            let seconds = obj
                .get("seconds")
                .or_else(|| obj.get("_seconds"))
                .and_then(Value::as_i64)?;
            let nanos = obj
                .get("nanoseconds")
                .or_else(|| obj.get("_nanoseconds"))
                .and_then(Value::as_u64)
                .unwrap_or(0)
                .min(999_999_999) as u32;
            DateTime::from_timestamp(seconds, nanos)
        }
        _ => None,
    }
}

pub fn to_iso(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, false)
}

pub fn now_utc_iso() -> String {
    to_iso(Utc::now())
}
