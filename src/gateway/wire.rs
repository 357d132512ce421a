//! Decoding helpers for exchange candle rows, which mix numbers and numeric strings.

use super::GatewayError;
use chrono::{DateTime, Utc};
use serde::Deserializer;
use serde::de::{self, Visitor};
use serde_json::Value;
use std::fmt;

struct LenientF64Visitor;

impl<'de> Visitor<'de> for LenientF64Visitor {
    type Value = Option<f64>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a float, an integer, or a string representing a number")
    }

    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
        Ok(Some(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Some(v as f64))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Some(v as f64))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        if v.trim().is_empty() {
            Ok(None)
        } else {
            v.trim().parse::<f64>().map(Some).map_err(E::custom)
        }
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E> {
        Ok(None)
    }
}

pub(crate) fn deserialize_f64_lenient<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(LenientF64Visitor)
}

/// Reads column `idx` of a candle row as a number.
pub(crate) fn number_at(row: &[Value], idx: usize, column: &str) -> Result<f64, GatewayError> {
    let value = row
        .get(idx)
        .ok_or_else(|| GatewayError::Malformed(format!("candle row is missing `{column}`")))?;
    deserialize_f64_lenient(value)
        .map_err(|e| GatewayError::Malformed(format!("`{column}`: {e}")))?
        .ok_or_else(|| GatewayError::Malformed(format!("`{column}` is empty")))
}

pub(crate) fn millis_to_utc(ms: f64) -> Result<DateTime<Utc>, GatewayError> {
    DateTime::from_timestamp_millis(ms as i64)
        .ok_or_else(|| GatewayError::Malformed(format!("timestamp {ms} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_and_numeric_strings_are_accepted() {
        let row = vec![json!(1_700_000_000_000_i64), json!("42.5"), json!(7), json!(" 0.25 ")];
        assert_eq!(number_at(&row, 0, "t").unwrap(), 1_700_000_000_000.0);
        assert_eq!(number_at(&row, 1, "open").unwrap(), 42.5);
        assert_eq!(number_at(&row, 2, "high").unwrap(), 7.0);
        assert_eq!(number_at(&row, 3, "low").unwrap(), 0.25);
    }

    #[test]
    fn missing_or_garbage_columns_are_malformed() {
        let row = vec![json!("abc"), json!(""), json!(null)];
        assert!(matches!(number_at(&row, 0, "open"), Err(GatewayError::Malformed(_))));
        assert!(matches!(number_at(&row, 1, "close"), Err(GatewayError::Malformed(_))));
        assert!(matches!(number_at(&row, 2, "volume"), Err(GatewayError::Malformed(_))));
        assert!(matches!(number_at(&row, 9, "volume"), Err(GatewayError::Malformed(_))));
    }

    #[test]
    fn millis_convert_to_utc() {
        let ts = millis_to_utc(86_400_000.0).unwrap();
        assert_eq!(ts.to_rfc3339(), "1970-01-02T00:00:00+00:00");
    }
}
