//! Column casts with SQL engine semantics.
//!
//! | Target    | Accepts                                                   |
//! |-----------|-----------------------------------------------------------|
//! | `INTEGER` | integral number in i32 range, fractional number (rounded), integer literal string |
//! | `DATE`    | `YYYY-MM-DD`, timestamp string (date part kept)           |
//! | `NUMERIC` | any JSON number, numeric literal string (exact)           |
//! | `VARCHAR` | string, number, boolean                                   |
//!
//! Null casts to null for every target. Anything else is a [`CastError`].

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::str::FromStr;

use crate::error::CastError;

/// Location of the value being cast, for error reporting.
#[derive(Debug, Clone, Copy)]
pub struct CastContext<'a> {
    pub row: usize,
    pub column: &'a str,
}

impl<'a> CastContext<'a> {
    pub fn new(row: usize, column: &'a str) -> Self {
        Self { row, column }
    }

    fn fail(&self, value: &Value, target: &'static str) -> CastError {
        CastError {
            row: self.row,
            column: self.column.to_string(),
            value: value.to_string(),
            target,
        }
    }
}

/// `CAST(value AS INTEGER)`
pub fn cast_integer(value: &Value, ctx: CastContext<'_>) -> Result<Option<i32>, CastError> {
    let fail = || ctx.fail(value, "INTEGER");

    match value {
        Value::Null => Ok(None),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i32::try_from(i).map(Some).map_err(|_| fail())
            } else {
                // Fractional numerics round half away from zero
                let f = n.as_f64().ok_or_else(|| fail())?.round();
                if f >= i32::MIN as f64 && f <= i32::MAX as f64 {
                    Ok(Some(f as i32))
                } else {
                    Err(fail())
                }
            }
        }
        Value::String(s) => s.trim().parse::<i32>().map(Some).map_err(|_| fail()),
        _ => Err(fail()),
    }
}

/// `CAST(value AS DATE)`
pub fn cast_date(value: &Value, ctx: CastContext<'_>) -> Result<Option<NaiveDate>, CastError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => parse_date(s.trim())
            .map(Some)
            .ok_or_else(|| ctx.fail(value, "DATE")),
        _ => Err(ctx.fail(value, "DATE")),
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, format) {
            return Some(ts.date());
        }
    }
    DateTime::parse_from_rfc3339(s).ok().map(|ts| ts.date_naive())
}

/// `CAST(value AS NUMERIC)`
pub fn cast_numeric(value: &Value, ctx: CastContext<'_>) -> Result<Option<BigDecimal>, CastError> {
    let fail = || ctx.fail(value, "NUMERIC");

    match value {
        Value::Null => Ok(None),
        Value::Number(n) => BigDecimal::from_str(&n.to_string())
            .map(Some)
            .map_err(|_| fail()),
        Value::String(s) => BigDecimal::from_str(s.trim())
            .map(Some)
            .map_err(|_| fail()),
        _ => Err(fail()),
    }
}

/// `CAST(value AS VARCHAR)`
pub fn cast_varchar(value: &Value, ctx: CastContext<'_>) -> Result<Option<String>, CastError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        _ => Err(ctx.fail(value, "VARCHAR")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> CastContext<'static> {
        CastContext::new(0, "col")
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_null_casts_to_null() {
        assert_eq!(cast_integer(&Value::Null, ctx()), Ok(None));
        assert_eq!(cast_date(&Value::Null, ctx()), Ok(None));
        assert_eq!(cast_numeric(&Value::Null, ctx()), Ok(None));
        assert_eq!(cast_varchar(&Value::Null, ctx()), Ok(None));
    }

    #[test]
    fn test_integer() {
        assert_eq!(cast_integer(&json!(42), ctx()), Ok(Some(42)));
        assert_eq!(cast_integer(&json!(" -7 "), ctx()), Ok(Some(-7)));
        assert_eq!(cast_integer(&json!(2.5), ctx()), Ok(Some(3)));
        assert_eq!(cast_integer(&json!(-2.5), ctx()), Ok(Some(-3)));
    }

    #[test]
    fn test_integer_failures() {
        assert!(cast_integer(&json!("1.5"), ctx()).is_err());
        assert!(cast_integer(&json!("abc"), ctx()).is_err());
        assert!(cast_integer(&json!(3_000_000_000_i64), ctx()).is_err());
        assert!(cast_integer(&json!(true), ctx()).is_err());

        let err = cast_integer(&json!("abc"), CastContext::new(4, "customer_id")).unwrap_err();
        assert_eq!(err.row, 4);
        assert_eq!(err.column, "customer_id");
        assert_eq!(err.value, "\"abc\"");
        assert_eq!(err.target, "INTEGER");
    }

    #[test]
    fn test_date() {
        assert_eq!(cast_date(&json!("2024-01-15"), ctx()), Ok(Some(date("2024-01-15"))));
        assert_eq!(
            cast_date(&json!("2024-01-15 23:10:00"), ctx()),
            Ok(Some(date("2024-01-15")))
        );
        assert_eq!(
            cast_date(&json!("2024-01-15T08:00:00.250"), ctx()),
            Ok(Some(date("2024-01-15")))
        );
        assert_eq!(
            cast_date(&json!("2024-01-31T23:30:00-05:00"), ctx()),
            Ok(Some(date("2024-01-31")))
        );
    }

    #[test]
    fn test_date_failures() {
        assert!(cast_date(&json!("not-a-date"), ctx()).is_err());
        assert!(cast_date(&json!("2024-02-30"), ctx()).is_err());
        assert!(cast_date(&json!(20240115), ctx()).is_err());
    }

    #[test]
    fn test_numeric_is_exact() {
        let value = cast_numeric(&json!("100.10"), ctx()).unwrap().unwrap();
        assert_eq!(value, BigDecimal::from_str("100.1").unwrap());

        let a = cast_numeric(&json!(0.1), ctx()).unwrap().unwrap();
        let b = cast_numeric(&json!(0.2), ctx()).unwrap().unwrap();
        assert_eq!(a + b, BigDecimal::from_str("0.3").unwrap());
    }

    #[test]
    fn test_numeric_failures() {
        assert!(cast_numeric(&json!("$100"), ctx()).is_err());
        assert!(cast_numeric(&json!(""), ctx()).is_err());
        assert!(cast_numeric(&json!({"amount": 1}), ctx()).is_err());
    }

    #[test]
    fn test_varchar() {
        assert_eq!(cast_varchar(&json!("pro"), ctx()), Ok(Some("pro".to_string())));
        assert_eq!(cast_varchar(&json!(12), ctx()), Ok(Some("12".to_string())));
        assert_eq!(cast_varchar(&json!(false), ctx()), Ok(Some("false".to_string())));
        assert!(cast_varchar(&json!(["a"]), ctx()).is_err());
    }
}
