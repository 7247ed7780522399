//! DuckDB SQL dialect.
//!
//! DuckDB is PostgreSQL-compatible with extensions:
//! - ANSI identifier quoting (`"`)
//! - Unsigned integer, STRUCT and MAP cast targets
//! - REGEXP_MATCHES, CONTAINS, STARTS_WITH, ENDS_WITH built in
//! - `EXTRACT(MILLISECOND ...)` includes the seconds

use super::helpers;
use super::SqlDialect;
use crate::compile::rules::Rule;
use crate::ir::{OpTag, StringFunc, TemporalUnit};
use crate::types::DataType;

/// DuckDB SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct DuckDb;

impl SqlDialect for DuckDb {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn format_bytes(&self, bytes: &[u8]) -> String {
        let escaped: String = bytes.iter().map(|b| format!("\\x{:02X}", b)).collect();
        format!("'{}'::BLOB", escaped)
    }

    fn cast_type(&self, dt: &DataType) -> Option<String> {
        helpers::cast_type_duckdb(dt)
    }

    fn rule(&self, tag: OpTag) -> Option<Rule> {
        match tag {
            OpTag::String(StringFunc::RegexSearch) => Some(Rule::Function("REGEXP_MATCHES")),
            OpTag::String(StringFunc::StringContains) => Some(Rule::Function("CONTAINS")),
            OpTag::String(StringFunc::StartsWith) => Some(Rule::Function("STARTS_WITH")),
            OpTag::String(StringFunc::EndsWith) => Some(Rule::Function("ENDS_WITH")),
            OpTag::ExtractField(TemporalUnit::Millisecond) => {
                Some(Rule::Template("EXTRACT(MILLISECOND FROM {0}) % 1000"))
            }
            _ => None,
        }
    }
}
