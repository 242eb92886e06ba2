//! PostgreSQL type mappings.
//!
//! This module provides utilities for mapping PostgreSQL column values into
//! JSON (for tool results) and SQL literals (for script backups).
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. A decoder extracts a [`PgValue`] for the category, which then renders
//!    to either representation
//!
//! Values may arrive in binary format (prepared statements) or text format
//! (simple queries, used when a statement has no parameters), so every
//! decoder must accept both.

use crate::error::{DbError, DbResult};
use crate::models::{JsonRow, quote_literal};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueFormat, PgValueRef};
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for PostgreSQL column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Timestamp,
    TimestampTz,
    Date,
    Time,
    Array,
    Unknown,
}

/// Classify a PostgreSQL type name (as reported by sqlx) into a logical category.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_lowercase();

    if lower.ends_with("[]") {
        return TypeCategory::Array;
    }

    match lower.as_str() {
        "numeric" | "decimal" => TypeCategory::Decimal,
        "int2" | "int4" | "int8" | "smallint" | "integer" | "bigint" | "oid" => {
            TypeCategory::Integer
        }
        "bool" | "boolean" => TypeCategory::Boolean,
        "float4" | "float8" | "real" | "double precision" => TypeCategory::Float,
        "json" | "jsonb" => TypeCategory::Json,
        "uuid" => TypeCategory::Uuid,
        "bytea" => TypeCategory::Binary,
        "timestamptz" => TypeCategory::TimestampTz,
        "timestamp" => TypeCategory::Timestamp,
        "date" => TypeCategory::Date,
        "time" => TypeCategory::Time,
        "text" | "varchar" | "bpchar" | "char" | "name" | "citext" | "unknown" => {
            TypeCategory::Text
        }
        _ => TypeCategory::Unknown,
    }
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("NUMERIC")
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        match value.format() {
            PgValueFormat::Text => Ok(RawDecimal(value.as_str()?.to_string())),
            PgValueFormat::Binary => Ok(RawDecimal(numeric_binary_to_string(value.as_bytes()?)?)),
        }
    }
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Render the binary NUMERIC wire format (base-10000 digits) as decimal text.
pub fn numeric_binary_to_string(bytes: &[u8]) -> Result<String, sqlx::error::BoxDynError> {
    if bytes.len() < 8 {
        return Err("NUMERIC value too short".into());
    }
    let read_u16 = |at: usize| u16::from_be_bytes([bytes[at], bytes[at + 1]]);
    let ndigits = read_u16(0) as usize;
    let weight = read_u16(2) as i16 as i64;
    let sign = read_u16(4);
    let dscale = read_u16(6) as usize;

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        _ => {}
    }

    if bytes.len() < 8 + ndigits * 2 {
        return Err("NUMERIC value truncated".into());
    }
    let digits: Vec<i64> = (0..ndigits).map(|i| read_u16(8 + i * 2) as i64).collect();
    let digit_at = |index: i64| -> i64 {
        if index >= 0 && (index as usize) < digits.len() {
            digits[index as usize]
        } else {
            0
        }
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG && digits.iter().any(|d| *d != 0) {
        out.push('-');
    }

    if weight < 0 {
        out.push('0');
    } else {
        for index in 0..=weight {
            let digit = digit_at(index);
            if index == 0 {
                out.push_str(&digit.to_string());
            } else {
                out.push_str(&format!("{:04}", digit));
            }
        }
    }

    if dscale > 0 {
        let groups = dscale.div_ceil(4) as i64;
        let mut fraction = String::with_capacity(groups as usize * 4);
        for n in 1..=groups {
            fraction.push_str(&format!("{:04}", digit_at(weight + n)));
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }

    Ok(out)
}

// =============================================================================
// Decoded Values
// =============================================================================

/// A decoded column value, independent of the output representation.
#[derive(Debug, Clone, PartialEq)]
pub enum PgValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    Json(JsonValue),
    /// ISO-8601 rendering of a date/time value.
    Temporal(String),
    Array(Vec<PgValue>),
}

impl PgValue {
    /// JSON representation used in tool results.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(v) => JsonValue::Bool(*v),
            Self::Int(v) => JsonValue::Number((*v).into()),
            Self::Float(v) => serde_json::Number::from_f64(*v)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(v.to_string())),
            Self::Decimal(v) | Self::Text(v) | Self::Temporal(v) => JsonValue::String(v.clone()),
            Self::Bytes(v) => encode_binary_value(v),
            Self::Json(v) => v.clone(),
            Self::Array(items) => JsonValue::Array(items.iter().map(PgValue::to_json).collect()),
        }
    }

    /// SQL literal used in generated INSERT statements.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Bool(true) => "TRUE".to_string(),
            Self::Bool(false) => "FALSE".to_string(),
            Self::Int(v) => v.to_string(),
            Self::Float(v) if v.is_finite() => v.to_string(),
            Self::Float(v) => quote_literal(&float_special(*v)),
            Self::Decimal(v) if is_plain_number(v) => v.clone(),
            Self::Decimal(v) | Self::Text(v) | Self::Temporal(v) => quote_literal(v),
            Self::Bytes(v) => format!("'\\x{}'", hex(v)),
            Self::Json(v) => quote_literal(&v.to_string()),
            Self::Array(items) => quote_literal(&array_text(items)),
        }
    }
}

fn float_special(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_sign_negative() {
        "-Infinity".to_string()
    } else {
        "Infinity".to_string()
    }
}

fn is_plain_number(v: &str) -> bool {
    let digits = v.strip_prefix('-').unwrap_or(v);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// PostgreSQL array input syntax, e.g. `{1,NULL,"a \"b\""}`.
fn array_text(items: &[PgValue]) -> String {
    let rendered: Vec<String> = items
        .iter()
        .map(|item| match item {
            PgValue::Null => "NULL".to_string(),
            PgValue::Bool(v) => if *v { "t" } else { "f" }.to_string(),
            PgValue::Int(v) => v.to_string(),
            PgValue::Float(v) if v.is_finite() => v.to_string(),
            PgValue::Float(v) => float_special(*v),
            PgValue::Array(inner) => array_text(inner),
            PgValue::Json(v) => quote_array_element(&v.to_string()),
            PgValue::Bytes(v) => quote_array_element(&format!("\\x{}", hex(v))),
            PgValue::Decimal(v) | PgValue::Text(v) | PgValue::Temporal(v) => {
                quote_array_element(v)
            }
        })
        .collect();
    format!("{{{}}}", rendered.join(","))
}

fn quote_array_element(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

// =============================================================================
// Binary Encoding
// =============================================================================

/// Encode binary data as a base64 JSON string.
pub fn encode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    JsonValue::String(STANDARD.encode(bytes))
}

// =============================================================================
// Row Conversion
// =============================================================================

/// Decode every column of a row, in column order.
pub fn row_values(row: &PgRow) -> Vec<(String, PgValue)> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let category = categorize_type(col.type_info().name());
            (col.name().to_string(), decode_column(row, idx, category))
        })
        .collect()
}

/// Decode every column of a row, failing on a non-null value no decoder
/// understands instead of reporting it as null.
pub fn row_values_strict(row: &PgRow) -> DbResult<Vec<(String, PgValue)>> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let category = categorize_type(col.type_info().name());
            let value = try_decode_column(row, idx, category).ok_or_else(|| {
                DbError::internal(format!(
                    "Cannot read value of column '{}' (type {})",
                    col.name(),
                    col.type_info().name()
                ))
            })?;
            Ok((col.name().to_string(), value))
        })
        .collect()
}

/// Convert a row into an ordered column → JSON value map.
pub fn row_to_json(row: &PgRow) -> JsonRow {
    row_values(row)
        .into_iter()
        .map(|(name, value)| (name, value.to_json()))
        .collect()
}

pub fn rows_to_json(rows: &[PgRow]) -> Vec<JsonRow> {
    rows.iter().map(row_to_json).collect()
}

fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> PgValue {
    try_decode_column(row, idx, category).unwrap_or_else(|| {
        tracing::debug!(column = idx, "Column value could not be decoded; returning null");
        PgValue::Null
    })
}

/// None when the value is non-null but undecodable.
fn try_decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> Option<PgValue> {
    if let Ok(raw) = row.try_get_raw(idx) {
        if raw.is_null() {
            return Some(PgValue::Null);
        }
    }

    let value = match category {
        TypeCategory::Decimal => decode_decimal(row, idx),
        TypeCategory::Integer => decode_integer(row, idx),
        TypeCategory::Boolean => decode::<bool>(row, idx).map(PgValue::Bool),
        TypeCategory::Float => decode_float(row, idx),
        TypeCategory::Binary => decode::<Vec<u8>>(row, idx).map(PgValue::Bytes),
        TypeCategory::Json => decode::<JsonValue>(row, idx).map(PgValue::Json),
        TypeCategory::Uuid => {
            decode::<sqlx::types::Uuid>(row, idx).map(|v| PgValue::Text(v.to_string()))
        }
        TypeCategory::TimestampTz => decode::<DateTime<Utc>>(row, idx)
            .map(|v| PgValue::Temporal(v.to_rfc3339_opts(SecondsFormat::AutoSi, false))),
        TypeCategory::Timestamp => decode::<NaiveDateTime>(row, idx)
            .map(|v| PgValue::Temporal(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        TypeCategory::Date => {
            decode::<NaiveDate>(row, idx).map(|v| PgValue::Temporal(v.to_string()))
        }
        TypeCategory::Time => {
            decode::<NaiveTime>(row, idx).map(|v| PgValue::Temporal(v.to_string()))
        }
        TypeCategory::Array => decode_array(row, idx),
        TypeCategory::Text => decode_text(row, idx),
        TypeCategory::Unknown => None,
    };

    value.or_else(|| decode_text_fallback(row, idx))
}

fn decode<'r, T>(row: &'r PgRow, idx: usize) -> Option<T>
where
    T: Decode<'r, sqlx::Postgres> + Type<sqlx::Postgres>,
{
    row.try_get::<Option<T>, _>(idx).ok().flatten()
}

fn decode_decimal(row: &PgRow, idx: usize) -> Option<PgValue> {
    match row.try_get::<Option<RawDecimal>, _>(idx) {
        Ok(v) => v.map(|v| PgValue::Decimal(v.0)),
        Err(e) => {
            tracing::error!("Failed to decode NUMERIC: {:?}", e);
            None
        }
    }
}

fn decode_integer(row: &PgRow, idx: usize) -> Option<PgValue> {
    if let Some(v) = decode::<i16>(row, idx) {
        return Some(PgValue::Int(v.into()));
    }
    if let Some(v) = decode::<i32>(row, idx) {
        return Some(PgValue::Int(v.into()));
    }
    if let Some(v) = decode::<i64>(row, idx) {
        return Some(PgValue::Int(v));
    }
    decode::<sqlx::postgres::types::Oid>(row, idx).map(|v| PgValue::Int(v.0.into()))
}

fn decode_float(row: &PgRow, idx: usize) -> Option<PgValue> {
    if let Some(v) = decode::<f64>(row, idx) {
        return Some(PgValue::Float(v));
    }
    decode::<f32>(row, idx).map(|v| PgValue::Float(v as f64))
}

fn decode_array(row: &PgRow, idx: usize) -> Option<PgValue> {
    fn wrap<T>(items: Vec<Option<T>>, f: impl Fn(T) -> PgValue) -> PgValue {
        PgValue::Array(
            items
                .into_iter()
                .map(|item| item.map(&f).unwrap_or(PgValue::Null))
                .collect(),
        )
    }

    if let Some(v) = decode::<Vec<Option<i64>>>(row, idx) {
        return Some(wrap(v, PgValue::Int));
    }
    if let Some(v) = decode::<Vec<Option<i32>>>(row, idx) {
        return Some(wrap(v, |n| PgValue::Int(n.into())));
    }
    if let Some(v) = decode::<Vec<Option<i16>>>(row, idx) {
        return Some(wrap(v, |n| PgValue::Int(n.into())));
    }
    if let Some(v) = decode::<Vec<Option<f64>>>(row, idx) {
        return Some(wrap(v, PgValue::Float));
    }
    if let Some(v) = decode::<Vec<Option<bool>>>(row, idx) {
        return Some(wrap(v, PgValue::Bool));
    }
    decode::<Vec<Option<String>>>(row, idx).map(|v| wrap(v, PgValue::Text))
}

fn decode_text(row: &PgRow, idx: usize) -> Option<PgValue> {
    decode::<String>(row, idx).map(PgValue::Text)
}

/// Last resort for types without a dedicated decoder (enums, intervals,
/// network types, ...). Only text-format values are trusted here; for the
/// single-byte `"char"` type the binary byte is valid text as well.
fn decode_text_fallback(row: &PgRow, idx: usize) -> Option<PgValue> {
    let raw = row.try_get_raw(idx).ok()?;
    match raw.format() {
        PgValueFormat::Text => raw.as_str().ok().map(|s| PgValue::Text(s.to_string())),
        PgValueFormat::Binary => {
            let is_char = raw.type_info().name().eq_ignore_ascii_case("char");
            if is_char {
                let bytes = raw.as_bytes().ok()?;
                std::str::from_utf8(bytes)
                    .ok()
                    .map(|s| PgValue::Text(s.to_string()))
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn numeric(ndigits: u16, weight: i16, sign: u16, dscale: u16, digits: &[u16]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&ndigits.to_be_bytes());
        out.extend_from_slice(&weight.to_be_bytes());
        out.extend_from_slice(&sign.to_be_bytes());
        out.extend_from_slice(&dscale.to_be_bytes());
        for d in digits {
            out.extend_from_slice(&d.to_be_bytes());
        }
        out
    }

    #[test]
    fn test_categorize_type() {
        assert_eq!(categorize_type("INT4"), TypeCategory::Integer);
        assert_eq!(categorize_type("INT8"), TypeCategory::Integer);
        assert_eq!(categorize_type("NUMERIC"), TypeCategory::Decimal);
        assert_eq!(categorize_type("JSONB"), TypeCategory::Json);
        assert_eq!(categorize_type("TIMESTAMPTZ"), TypeCategory::TimestampTz);
        assert_eq!(categorize_type("TEXT[]"), TypeCategory::Array);
        assert_eq!(categorize_type("BPCHAR"), TypeCategory::Text);
        // Not integers despite the substring
        assert_eq!(categorize_type("INTERVAL"), TypeCategory::Unknown);
        assert_eq!(categorize_type("POINT"), TypeCategory::Unknown);
    }

    #[test]
    fn test_numeric_binary_decoding() {
        // 12345.678 => digits [1, 2345, 6780], weight 1, dscale 3
        let bytes = numeric(3, 1, 0, 3, &[1, 2345, 6780]);
        assert_eq!(numeric_binary_to_string(&bytes).unwrap(), "12345.678");

        // -0.05 => digits [500], weight -1, dscale 2
        let bytes = numeric(1, -1, NUMERIC_NEG, 2, &[500]);
        assert_eq!(numeric_binary_to_string(&bytes).unwrap(), "-0.05");

        // 10000 => digits [1], weight 1, dscale 0
        let bytes = numeric(1, 1, 0, 0, &[1]);
        assert_eq!(numeric_binary_to_string(&bytes).unwrap(), "10000");

        // 0.00001 => digits [1000], weight -2, dscale 5
        let bytes = numeric(1, -2, 0, 5, &[1000]);
        assert_eq!(numeric_binary_to_string(&bytes).unwrap(), "0.00001");

        let bytes = numeric(0, 0, NUMERIC_NAN, 0, &[]);
        assert_eq!(numeric_binary_to_string(&bytes).unwrap(), "NaN");

        assert!(numeric_binary_to_string(&[0, 1]).is_err());
    }

    #[test]
    fn test_sql_literals() {
        assert_eq!(PgValue::Null.to_sql_literal(), "NULL");
        assert_eq!(PgValue::Bool(true).to_sql_literal(), "TRUE");
        assert_eq!(PgValue::Int(-42).to_sql_literal(), "-42");
        assert_eq!(PgValue::Float(1.5).to_sql_literal(), "1.5");
        assert_eq!(PgValue::Float(f64::NAN).to_sql_literal(), "'NaN'");
        assert_eq!(PgValue::Decimal("12.50".into()).to_sql_literal(), "12.50");
        assert_eq!(PgValue::Decimal("NaN".into()).to_sql_literal(), "'NaN'");
        assert_eq!(
            PgValue::Text("O'Brien".into()).to_sql_literal(),
            "'O''Brien'"
        );
        assert_eq!(
            PgValue::Temporal("2024-01-02T03:04:05".into()).to_sql_literal(),
            "'2024-01-02T03:04:05'"
        );
        assert_eq!(
            PgValue::Bytes(vec![0xde, 0xad, 0x01]).to_sql_literal(),
            "'\\xdead01'"
        );
        assert_eq!(
            PgValue::Json(json!({"name": "it's"})).to_sql_literal(),
            "'{\"name\":\"it''s\"}'"
        );
    }

    #[test]
    fn test_array_literal() {
        let value = PgValue::Array(vec![
            PgValue::Int(1),
            PgValue::Null,
            PgValue::Int(3),
        ]);
        assert_eq!(value.to_sql_literal(), "'{1,NULL,3}'");

        let value = PgValue::Array(vec![
            PgValue::Text("a \"b\"".into()),
            PgValue::Text("c'd".into()),
        ]);
        assert_eq!(value.to_sql_literal(), "'{\"a \\\"b\\\"\",\"c''d\"}'");
    }

    #[test]
    fn test_json_rendering() {
        assert_eq!(PgValue::Int(7).to_json(), json!(7));
        assert_eq!(PgValue::Decimal("1.10".into()).to_json(), json!("1.10"));
        assert_eq!(PgValue::Float(f64::INFINITY).to_json(), json!("inf"));
        assert_eq!(PgValue::Bytes(b"hello world".to_vec()).to_json(), json!("aGVsbG8gd29ybGQ="));
        assert_eq!(
            PgValue::Array(vec![PgValue::Bool(true), PgValue::Null]).to_json(),
            json!([true, null])
        );
    }

    #[test]
    fn test_encode_binary_value_empty() {
        assert_eq!(encode_binary_value(&[]), JsonValue::String(String::new()));
    }
}
