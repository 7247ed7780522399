//! Building blocks shared by the dialect implementations.

use super::super::token::{Token, TokenStream};
use crate::types::DataType;

// Quoting. Embedded quote characters are doubled in every style.

/// `"name"`: Postgres, DuckDB, Snowflake, Redshift, SQLite.
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `` `name` ``: MySQL, BigQuery, Databricks.
pub fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// `[name]`: T-SQL.
pub fn quote_bracket(ident: &str) -> String {
    format!("[{}]", ident.replace(']', "]]"))
}

pub fn quote_string_single(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// T-SQL national string literal, needed for anything outside ASCII.
pub fn quote_string_unicode(s: &str) -> String {
    format!("N{}", quote_string_single(s))
}

pub fn format_bool_literal(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

/// Dialects without a boolean literal compare against 1/0.
pub fn format_bool_numeric(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

/// Lowercase hex digits of a byte string, for binary literals.
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn count_literal(n: u64) -> Token {
    Token::LitInt(i64::try_from(n).unwrap_or(i64::MAX))
}

/// `LIMIT n [OFFSET m]`
pub fn emit_limit_offset_standard(limit: Option<u64>, offset: Option<u64>) -> TokenStream {
    let mut ts = TokenStream::new();
    if let Some(n) = limit {
        ts.push(Token::Limit).space().push(count_literal(n));
    }
    if let Some(m) = offset {
        if limit.is_some() {
            ts.space();
        }
        ts.push(Token::Offset).space().push(count_literal(m));
    }
    ts
}

/// `OFFSET m ROWS [FETCH NEXT n ROWS ONLY]`; the caller guarantees an
/// ORDER BY precedes it.
pub fn emit_limit_offset_tsql(limit: Option<u64>, offset: Option<u64>) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(Token::Offset)
        .space()
        .push(count_literal(offset.unwrap_or(0)))
        .space()
        .push(Token::Rows);
    if let Some(n) = limit {
        for token in [Token::Fetch, Token::Next, count_literal(n), Token::Rows, Token::Only] {
            ts.space().push(token);
        }
    }
    ts
}

/// Look `name` up in a dialect's rename table, ignoring case.
pub fn rename(name: &str, table: &[(&str, &'static str)]) -> Option<&'static str> {
    table
        .iter()
        .find(|(from, _)| from.eq_ignore_ascii_case(name))
        .map(|(_, to)| *to)
}

// Cast targets. `None` means the dialect cannot spell the type.

fn decimal_args(precision: &Option<u8>, scale: &Option<u8>) -> String {
    match (precision, scale) {
        (Some(p), Some(s)) => format!("({}, {})", p, s),
        (Some(p), None) => format!("({})", p),
        _ => String::new(),
    }
}

/// The default spelling, close to Postgres.
pub fn cast_type_ansi(dt: &DataType) -> Option<String> {
    let name = match dt {
        DataType::Null | DataType::Struct(_) | DataType::Map(_, _) => return None,
        DataType::Boolean => "BOOLEAN".into(),
        DataType::Int { bits: 8 | 16, signed: true } | DataType::Int { bits: 8, signed: false } => {
            "SMALLINT".into()
        }
        DataType::Int { bits: 32, signed: true } | DataType::Int { bits: 16, signed: false } => {
            "INTEGER".into()
        }
        DataType::Int { bits: 32, signed: false } => "BIGINT".into(),
        DataType::Int { signed: false, .. } => "NUMERIC(20)".into(),
        DataType::Int { .. } => "BIGINT".into(),
        DataType::Float { bits: 32 } => "REAL".into(),
        DataType::Float { .. } => "DOUBLE PRECISION".into(),
        DataType::Decimal { precision, scale } => {
            format!("DECIMAL{}", decimal_args(precision, scale))
        }
        DataType::String => "TEXT".into(),
        DataType::Binary => "BYTEA".into(),
        DataType::Date => "DATE".into(),
        DataType::Time => "TIME".into(),
        DataType::Timestamp { timezone: None } => "TIMESTAMP".into(),
        DataType::Timestamp { .. } => "TIMESTAMPTZ".into(),
        DataType::Interval(_) => "INTERVAL".into(),
        DataType::Array(inner) => format!("{}[]", cast_type_ansi(inner)?),
    };
    Some(name)
}

pub fn cast_type_duckdb(dt: &DataType) -> Option<String> {
    let name = match dt {
        DataType::Null => return None,
        DataType::Boolean => "BOOLEAN".into(),
        DataType::Int { bits, signed } => {
            let base = match bits {
                8 => "TINYINT",
                16 => "SMALLINT",
                32 => "INTEGER",
                _ => "BIGINT",
            };
            if *signed {
                base.into()
            } else {
                format!("U{}", base)
            }
        }
        DataType::Float { bits: 32 } => "REAL".into(),
        DataType::Float { .. } => "DOUBLE".into(),
        DataType::Decimal { precision, scale } => {
            format!("DECIMAL{}", decimal_args(precision, scale))
        }
        DataType::String => "VARCHAR".into(),
        DataType::Binary => "BLOB".into(),
        DataType::Date => "DATE".into(),
        DataType::Time => "TIME".into(),
        DataType::Timestamp { timezone: None } => "TIMESTAMP".into(),
        DataType::Timestamp { .. } => "TIMESTAMPTZ".into(),
        DataType::Interval(_) => "INTERVAL".into(),
        DataType::Array(inner) => format!("{}[]", cast_type_duckdb(inner)?),
        DataType::Map(key, value) => {
            format!("MAP({}, {})", cast_type_duckdb(key)?, cast_type_duckdb(value)?)
        }
        DataType::Struct(fields) => {
            let fields = fields
                .iter()
                .map(|(name, t)| Some(format!("{} {}", quote_double(name), cast_type_duckdb(t)?)))
                .collect::<Option<Vec<_>>>()?;
            format!("STRUCT({})", fields.join(", "))
        }
    };
    Some(name)
}

/// MySQL's `CAST` only accepts a handful of target types.
pub fn cast_type_mysql(dt: &DataType) -> Option<String> {
    let name = match dt {
        DataType::Int { signed: true, .. } => "SIGNED".into(),
        DataType::Int { signed: false, .. } => "UNSIGNED".into(),
        DataType::Float { bits: 32 } => "FLOAT".into(),
        DataType::Float { .. } => "DOUBLE".into(),
        DataType::Decimal { precision, scale } => {
            format!("DECIMAL{}", decimal_args(precision, scale))
        }
        DataType::String => "CHAR".into(),
        DataType::Binary => "BINARY".into(),
        DataType::Date => "DATE".into(),
        DataType::Time => "TIME".into(),
        DataType::Timestamp { .. } => "DATETIME".into(),
        _ => return None,
    };
    Some(name)
}

pub fn cast_type_tsql(dt: &DataType) -> Option<String> {
    let name = match dt {
        DataType::Boolean => "BIT".into(),
        DataType::Int { bits: 8, signed: false } => "TINYINT".into(),
        DataType::Int { bits: 16, signed: false } => "INT".into(),
        DataType::Int { bits: 8 | 16, .. } => "SMALLINT".into(),
        DataType::Int { bits: 32, signed: true } => "INT".into(),
        DataType::Int { bits: 32, signed: false } => "BIGINT".into(),
        DataType::Int { signed: false, .. } => "DECIMAL(20, 0)".into(),
        DataType::Int { .. } => "BIGINT".into(),
        DataType::Float { bits: 32 } => "REAL".into(),
        DataType::Float { .. } => "FLOAT".into(),
        DataType::Decimal { precision, scale } => {
            format!("DECIMAL{}", decimal_args(precision, scale))
        }
        DataType::String => "NVARCHAR(MAX)".into(),
        DataType::Binary => "VARBINARY(MAX)".into(),
        DataType::Date => "DATE".into(),
        DataType::Time => "TIME".into(),
        DataType::Timestamp { timezone: None } => "DATETIME2".into(),
        DataType::Timestamp { .. } => "DATETIMEOFFSET".into(),
        _ => return None,
    };
    Some(name)
}

pub fn cast_type_snowflake(dt: &DataType) -> Option<String> {
    let name = match dt {
        DataType::Null | DataType::Interval(_) => return None,
        DataType::Boolean => "BOOLEAN".into(),
        DataType::Int { .. } => "BIGINT".into(),
        DataType::Float { .. } => "DOUBLE".into(),
        DataType::Decimal { precision, scale } => {
            format!("NUMBER{}", decimal_args(precision, scale))
        }
        DataType::String => "VARCHAR".into(),
        DataType::Binary => "BINARY".into(),
        DataType::Date => "DATE".into(),
        DataType::Time => "TIME".into(),
        DataType::Timestamp { timezone: None } => "TIMESTAMP_NTZ".into(),
        DataType::Timestamp { .. } => "TIMESTAMP_TZ".into(),
        DataType::Array(_) => "ARRAY".into(),
        DataType::Struct(_) | DataType::Map(_, _) => "OBJECT".into(),
    };
    Some(name)
}

pub fn cast_type_bigquery(dt: &DataType) -> Option<String> {
    let name = match dt {
        DataType::Null | DataType::Map(_, _) => return None,
        DataType::Boolean => "BOOL".into(),
        DataType::Int { .. } => "INT64".into(),
        DataType::Float { .. } => "FLOAT64".into(),
        DataType::Decimal { precision, scale } => {
            format!("NUMERIC{}", decimal_args(precision, scale))
        }
        DataType::String => "STRING".into(),
        DataType::Binary => "BYTES".into(),
        DataType::Date => "DATE".into(),
        DataType::Time => "TIME".into(),
        DataType::Timestamp { timezone: None } => "DATETIME".into(),
        DataType::Timestamp { .. } => "TIMESTAMP".into(),
        DataType::Interval(_) => "INTERVAL".into(),
        DataType::Array(inner) => format!("ARRAY<{}>", cast_type_bigquery(inner)?),
        DataType::Struct(fields) => {
            let fields = fields
                .iter()
                .map(|(name, t)| Some(format!("{} {}", quote_backtick(name), cast_type_bigquery(t)?)))
                .collect::<Option<Vec<_>>>()?;
            format!("STRUCT<{}>", fields.join(", "))
        }
    };
    Some(name)
}

pub fn cast_type_redshift(dt: &DataType) -> Option<String> {
    let name = match dt {
        DataType::String => "VARCHAR(MAX)".into(),
        DataType::Binary => "VARBYTE".into(),
        DataType::Interval(_) | DataType::Array(_) => return None,
        other => return cast_type_ansi(other),
    };
    Some(name)
}

pub fn cast_type_databricks(dt: &DataType) -> Option<String> {
    let name = match dt {
        DataType::Null | DataType::Time | DataType::Interval(_) => return None,
        DataType::Boolean => "BOOLEAN".into(),
        DataType::Int { bits: 8, signed: true } => "TINYINT".into(),
        DataType::Int { bits: 8, .. } | DataType::Int { bits: 16, signed: true } => {
            "SMALLINT".into()
        }
        DataType::Int { bits: 16, .. } | DataType::Int { bits: 32, signed: true } => "INT".into(),
        DataType::Int { bits: 32, .. } | DataType::Int { bits: 64, signed: true } => {
            "BIGINT".into()
        }
        DataType::Int { .. } => "DECIMAL(20, 0)".into(),
        DataType::Float { bits: 32 } => "FLOAT".into(),
        DataType::Float { .. } => "DOUBLE".into(),
        DataType::Decimal { precision, scale } => {
            format!("DECIMAL{}", decimal_args(precision, scale))
        }
        DataType::String => "STRING".into(),
        DataType::Binary => "BINARY".into(),
        DataType::Date => "DATE".into(),
        DataType::Timestamp { timezone: None } => "TIMESTAMP_NTZ".into(),
        DataType::Timestamp { .. } => "TIMESTAMP".into(),
        DataType::Array(inner) => format!("ARRAY<{}>", cast_type_databricks(inner)?),
        DataType::Map(key, value) => format!(
            "MAP<{}, {}>",
            cast_type_databricks(key)?,
            cast_type_databricks(value)?
        ),
        DataType::Struct(fields) => {
            let fields = fields
                .iter()
                .map(|(name, t)| Some(format!("{}: {}", quote_backtick(name), cast_type_databricks(t)?)))
                .collect::<Option<Vec<_>>>()?;
            format!("STRUCT<{}>", fields.join(", "))
        }
    };
    Some(name)
}

/// SQLite only knows storage classes; temporal values are stored as text.
pub fn cast_type_sqlite(dt: &DataType) -> Option<String> {
    let name = match dt {
        DataType::Boolean | DataType::Int { .. } => "INTEGER",
        DataType::Float { .. } => "REAL",
        DataType::Decimal { .. } => "NUMERIC",
        DataType::String | DataType::Date | DataType::Time | DataType::Timestamp { .. } => "TEXT",
        DataType::Binary => "BLOB",
        _ => return None,
    };
    Some(name.into())
}
