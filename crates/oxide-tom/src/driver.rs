//! Moving [`SqlValue`]s in and out of SQLite.
//!
//! SQLite has no native UUID, decimal or date-time types, so those travel
//! as text: hyphenated UUIDs, sortable fixed-width decimals, fixed-width
//! naive date-times and RFC 3339 offset date-times.

use chrono::{DateTime, NaiveDateTime, SecondsFormat};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Arguments, Row, ValueRef};
use uuid::Uuid;

use crate::error::{Result, TomError};
use crate::mapping::StorageKind;
use crate::value::{SqlValue, DATETIME_FORMAT};

/// Builds the argument list for one execution.
pub(crate) fn arguments<'q>(values: Vec<SqlValue>) -> Result<SqliteArguments<'q>> {
    let mut args = SqliteArguments::default();
    for value in values {
        match value {
            SqlValue::Null => args.add(Option::<String>::None),
            SqlValue::UniqueIdentifier(v) => args.add(v.to_string()),
            SqlValue::Int(v) => args.add(v),
            SqlValue::Decimal(v) => args.add(encode_decimal(v)),
            SqlValue::Float(v) => args.add(v),
            SqlValue::DateTime2(v) => args.add(v.format(DATETIME_FORMAT).to_string()),
            SqlValue::DateTimeOffset(v) => args.add(v.to_rfc3339_opts(SecondsFormat::Nanos, false)),
            SqlValue::Bit(v) => args.add(v),
            SqlValue::NVarChar(v) => args.add(v),
            SqlValue::VarBinary(v) => args.add(v),
        }
        .map_err(TomError::Encode)?;
    }
    Ok(args)
}

/// Reads column `index` as the given storage kind.
pub(crate) fn decode(row: &SqliteRow, index: usize, storage: StorageKind) -> Result<SqlValue> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(SqlValue::Null);
    }

    Ok(match storage {
        StorageKind::UniqueIdentifier => {
            let text: String = row.try_get(index)?;
            SqlValue::UniqueIdentifier(
                Uuid::parse_str(&text).map_err(|_| TomError::conversion("uuid", &text))?,
            )
        }
        StorageKind::Int => {
            let v: i64 = row.try_get(index)?;
            SqlValue::Int(i32::try_from(v).map_err(|_| TomError::conversion("int", v))?)
        }
        StorageKind::Decimal => {
            let text: String = row.try_get(index)?;
            SqlValue::Decimal(
                decode_decimal(&text).ok_or_else(|| TomError::conversion("decimal", &text))?,
            )
        }
        StorageKind::Float => SqlValue::Float(row.try_get(index)?),
        StorageKind::DateTime2 => {
            let text: String = row.try_get(index)?;
            SqlValue::DateTime2(
                parse_datetime(&text).ok_or_else(|| TomError::conversion("datetime", &text))?,
            )
        }
        StorageKind::DateTimeOffset => {
            let text: String = row.try_get(index)?;
            SqlValue::DateTimeOffset(
                DateTime::parse_from_rfc3339(&text)
                    .map_err(|_| TomError::conversion("datetimeoffset", &text))?,
            )
        }
        StorageKind::Bit => SqlValue::Bit(row.try_get(index)?),
        StorageKind::NVarChar => SqlValue::NVarChar(row.try_get(index)?),
        StorageKind::VarBinary => SqlValue::VarBinary(row.try_get(index)?),
    })
}

/// Digits before the point: enough for the largest 96-bit mantissa.
const INTEGER_DIGITS: usize = 29;
/// Digits after the point: the largest decimal scale.
const FRACTION_DIGITS: usize = 28;

/// Renders a decimal as fixed-width text whose byte order is numeric order.
///
/// Non-negative values are `P` followed by the zero-padded digits. Negative
/// values are `N` followed by the nines' complement of their magnitude, so
/// a larger magnitude sorts first. Trailing fraction zeros are not kept.
pub(crate) fn encode_decimal(value: Decimal) -> String {
    let negative = value.is_sign_negative() && !value.is_zero();
    let magnitude = value.abs().to_string();
    let (integer, fraction) = magnitude.split_once('.').unwrap_or((&magnitude, ""));
    let digits = format!("{integer:0>INTEGER_DIGITS$}.{fraction:0<FRACTION_DIGITS$}");
    if negative {
        format!("N{}", complement(&digits))
    } else {
        format!("P{digits}")
    }
}

/// Reads [`encode_decimal`] output, or plain decimal text.
pub(crate) fn decode_decimal(text: &str) -> Option<Decimal> {
    let (sign, digits) = match text.as_bytes().first() {
        Some(b'P') => ("", text[1..].to_string()),
        Some(b'N') => ("-", complement(&text[1..])),
        _ => return text.parse().ok(),
    };
    let (integer, fraction) = digits.split_once('.')?;
    let integer = integer.trim_start_matches('0');
    let fraction = fraction.trim_end_matches('0');
    let integer = if integer.is_empty() { "0" } else { integer };
    let plain = if fraction.is_empty() {
        format!("{sign}{integer}")
    } else {
        format!("{sign}{integer}.{fraction}")
    };
    plain.parse().ok()
}

fn complement(digits: &str) -> String {
    digits
        .bytes()
        .map(|b| {
            if b.is_ascii_digit() {
                char::from(b'0' + (b'9' - b))
            } else {
                char::from(b)
            }
        })
        .collect()
}

/// Accepts both the space and the ISO `T` separator.
pub(crate) fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn test_values_survive_sqlite() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();

        let at = NaiveDate::from_ymd_opt(2001, 2, 3)
            .unwrap()
            .and_hms_nano_opt(4, 5, 6, 7)
            .unwrap();
        let values = vec![
            (SqlValue::UniqueIdentifier(Uuid::new_v4()), StorageKind::UniqueIdentifier),
            (SqlValue::Int(-7), StorageKind::Int),
            (SqlValue::Decimal(Decimal::new(31_415, 4)), StorageKind::Decimal),
            (SqlValue::Float(2.5), StorageKind::Float),
            (SqlValue::DateTime2(at), StorageKind::DateTime2),
            (
                SqlValue::DateTimeOffset(DateTime::parse_from_rfc3339("2001-02-03T04:05:06+09:00").unwrap()),
                StorageKind::DateTimeOffset,
            ),
            (SqlValue::Bit(true), StorageKind::Bit),
            (SqlValue::NVarChar("héllo".into()), StorageKind::NVarChar),
            (SqlValue::VarBinary(vec![1, 2, 3]), StorageKind::VarBinary),
            (SqlValue::Null, StorageKind::Int),
        ];

        for (value, storage) in values {
            let args = arguments(vec![value.clone()]).unwrap();
            let row = sqlx::query_with("SELECT ?1 AS v", args)
                .fetch_one(&pool)
                .await
                .unwrap();
            assert_eq!(decode(&row, 0, storage).unwrap(), value);
        }
    }

    #[test]
    fn test_decimal_encoding_sorts_numerically() {
        let values: Vec<Decimal> = [
            "-100", "-10.5", "-10", "-9.999", "-0.0000000000000000000000000001", "0",
            "0.5", "9", "10", "10.25", "100", "79228162514264337593543950335",
        ]
        .iter()
        .map(|v| v.parse().unwrap())
        .collect();

        let encoded: Vec<String> = values.iter().map(|&v| encode_decimal(v)).collect();
        let mut sorted = encoded.clone();
        sorted.sort();
        assert_eq!(sorted, encoded);

        for (value, text) in values.iter().zip(&encoded) {
            assert_eq!(text.len(), 1 + INTEGER_DIGITS + 1 + FRACTION_DIGITS);
            assert_eq!(decode_decimal(text), Some(*value), "{text}");
        }
        assert_eq!(encode_decimal(Decimal::new(-0, 2)), encode_decimal(Decimal::ZERO));
        assert_eq!(decode_decimal("12.50"), Some(Decimal::new(125, 1)));
        assert_eq!(decode_decimal("P12"), None);
    }

    #[test]
    fn test_datetime_accepts_iso_separator() {
        let epoch = NaiveDateTime::default();
        assert_eq!(parse_datetime("1970-01-01T00:00:00.0000000"), Some(epoch));
        assert_eq!(parse_datetime("1970-01-01 00:00:00.000000000"), Some(epoch));
        assert_eq!(parse_datetime("1970-01-01"), None);
    }

    #[tokio::test]
    async fn test_int_out_of_range() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        let row = sqlx::query("SELECT 5000000000 AS v")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(matches!(
            decode(&row, 0, StorageKind::Int),
            Err(TomError::Conversion { expected: "int", .. })
        ));
    }
}
