use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;

use crate::models::run::DATETIME_COLUMN_FORMAT;

pub fn parse_field<T>(value: &str, field: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse::<T>()
        .with_context(|| format!("failed to parse {field} from '{value}'"))
}

/// Empty fields (and pandas-style `NaN`) read back as `None`.
pub fn parse_optional_field<T>(value: &str, field: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if value.is_empty() || value.eq_ignore_ascii_case("nan") {
        Ok(None)
    } else {
        parse_field(value, field).map(Some)
    }
}

/// Integers that pandas may have written as floats, e.g. `-4.0`.
pub fn parse_integral(value: &str, field: &str) -> Result<i64> {
    if let Ok(parsed) = value.parse::<i64>() {
        return Ok(parsed);
    }
    let float: f64 = parse_field(value, field)?;
    if float.fract() != 0.0 || !float.is_finite() {
        return Err(anyhow!("{field} holds non-integral value '{value}'"));
    }
    Ok(float as i64)
}

pub fn parse_optional_integral(value: &str, field: &str) -> Result<Option<i64>> {
    if value.is_empty() || value.eq_ignore_ascii_case("nan") {
        Ok(None)
    } else {
        parse_integral(value, field).map(Some)
    }
}

pub fn parse_datetime(value: &str, field: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, DATETIME_COLUMN_FORMAT)
        .with_context(|| format!("failed to parse {field}"))
}

pub fn format_datetime(value: &NaiveDateTime) -> String {
    value.format(DATETIME_COLUMN_FORMAT).to_string()
}

pub fn format_optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
