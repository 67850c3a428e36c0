//! Derived fields for dog records.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};

use crate::error::TransformError;

/// Milliseconds in a year, as used for ages.
pub const YEAR_MS: f64 = 3.156e10;

/// Size bucket for a weight in pounds.
#[must_use]
pub const fn get_size(weight: i64) -> &'static str {
    match weight {
        i64::MIN..=10 => "teacup",
        11..=25 => "small",
        26..=50 => "medium",
        51..=80 => "large",
        81..=125 => "x-large",
        _ => "jumbo",
    }
}

/// Reads a weight as an integer. Numbers are truncated; strings are read up
/// to the first non-digit ("26 lbs" is 26).
#[must_use]
pub fn parse_weight(weight: &Value) -> Option<i64> {
    match weight {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|w| w.is_finite()).map(|w| w.trunc() as i64)),
        Value::String(text) => {
            let text = text.trim_start();
            let (sign, digits) = match text.strip_prefix('-') {
                Some(rest) => (-1, rest),
                None => (1, text.strip_prefix('+').unwrap_or(text)),
            };
            let end = digits
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(digits.len());
            digits[..end].parse::<i64>().ok().map(|w| sign * w)
        }
        _ => None,
    }
}

/// Whole years between `dob` and `now`.
///
/// Accepts RFC 3339 timestamps and plain `YYYY-MM-DD` dates (read as UTC
/// midnight).
pub fn age_at(dob: &str, now: DateTime<Utc>) -> Result<i64, TransformError> {
    let born = DateTime::parse_from_rfc3339(dob)
        .map(|date| date.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDate::parse_from_str(dob, "%Y-%m-%d")
                .map(|date| date.and_time(chrono::NaiveTime::MIN).and_utc())
        })
        .map_err(|err| TransformError::new(format!("invalid date of birth `{dob}`: {err}")))?;
    let elapsed = (now - born).num_milliseconds() as f64;
    Ok((elapsed / YEAR_MS).floor() as i64)
}

/// Adds `size` and `age` to every record of a `getDogs` response.
pub fn transform_dogs(body: Value) -> Result<Value, TransformError> {
    let Value::Object(dogs) = body else {
        return Err(TransformError::new("expected a mapping of dog id to record"));
    };
    let now = Utc::now();

    dogs.into_iter()
        .map(|(id, dog)| {
            let Value::Object(mut record) = dog else {
                return Err(TransformError::new(format!("dog `{id}` is not a record")));
            };
            let weight = record
                .get("weight")
                .and_then(parse_weight)
                .ok_or_else(|| TransformError::new(format!("dog `{id}` has no valid weight")))?;
            let dob = record
                .get("dob")
                .and_then(Value::as_str)
                .ok_or_else(|| TransformError::new(format!("dog `{id}` has no date of birth")))?;
            let age = age_at(dob, now)?;

            record.insert("size".to_string(), Value::from(get_size(weight)));
            record.insert("age".to_string(), Value::from(age));
            Ok((id, Value::Object(record)))
        })
        .collect::<Result<Map<String, Value>, _>>()
        .map(Value::Object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_size_buckets() {
        assert_eq!(get_size(10), "teacup");
        assert_eq!(get_size(11), "small");
        assert_eq!(get_size(25), "small");
        assert_eq!(get_size(26), "medium");
        assert_eq!(get_size(50), "medium");
        assert_eq!(get_size(80), "large");
        assert_eq!(get_size(81), "x-large");
        assert_eq!(get_size(125), "x-large");
        assert_eq!(get_size(130), "jumbo");
        assert_eq!(get_size(-3), "teacup");
    }

    #[test]
    fn test_parse_weight() {
        assert_eq!(parse_weight(&json!(26)), Some(26));
        assert_eq!(parse_weight(&json!(80.9)), Some(80));
        assert_eq!(parse_weight(&json!("130")), Some(130));
        assert_eq!(parse_weight(&json!(" 26 lbs")), Some(26));
        assert_eq!(parse_weight(&json!("heavy")), None);
        assert_eq!(parse_weight(&json!(null)), None);
    }

    #[test]
    fn test_age_at() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).single().expect("valid date");
        assert_eq!(age_at("2020-01-15", now), Ok(4));
        assert_eq!(age_at("2024-05-01T12:00:00Z", now), Ok(0));
        assert!(age_at("last spring", now).is_err());
    }

    #[test]
    fn test_transform_dogs() {
        let body = json!({
            "1": {"name": "Tiny", "weight": 10, "dob": "2020-01-01"},
            "5": {"name": "Rex", "weight": "81", "dob": "2019-03-02"},
        });
        let dogs = transform_dogs(body).expect("valid records");

        assert_eq!(dogs["1"]["size"], json!("teacup"));
        assert_eq!(dogs["1"]["name"], json!("Tiny"));
        assert_eq!(dogs["5"]["size"], json!("x-large"));
        assert!(dogs["5"]["age"].as_i64().is_some_and(|age| age >= 5));
    }

    #[test]
    fn test_transform_rejects_bad_records() {
        assert!(transform_dogs(json!([])).is_err());
        assert!(transform_dogs(json!({"1": "Rex"})).is_err());
        assert!(transform_dogs(json!({"1": {"weight": 10}})).is_err());
        assert!(transform_dogs(json!({"1": {"weight": "?", "dob": "2020-01-01"}})).is_err());
    }
}
