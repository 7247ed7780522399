//! PostgreSQL SQL dialect.
//!
//! PostgreSQL features:
//! - ANSI identifier quoting (`"`)
//! - Native boolean type (true/false)
//! - POSIX regular expressions with `~`
//! - `EXTRACT` returns fractional seconds, so seconds and milliseconds are floored
//! - `'\x..'::BYTEA` binary literals

use super::helpers;
use super::SqlDialect;
use crate::compile::rules::Rule;
use crate::ir::{OpTag, StringFunc, TemporalUnit};
use crate::types::DataType;

/// PostgreSQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Postgres;

impl SqlDialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn format_bytes(&self, bytes: &[u8]) -> String {
        format!("'\\x{}'::BYTEA", helpers::hex(bytes))
    }

    fn cast_type(&self, dt: &DataType) -> Option<String> {
        helpers::cast_type_ansi(dt)
    }

    fn rule(&self, tag: OpTag) -> Option<Rule> {
        match tag {
            OpTag::String(StringFunc::RegexSearch) => Some(Rule::Template("{0} ~ {1}")),
            OpTag::String(StringFunc::StartsWith) => Some(Rule::Function("STARTS_WITH")),
            OpTag::ExtractField(TemporalUnit::Second) => {
                Some(Rule::Template("FLOOR(EXTRACT(SECOND FROM {0}))"))
            }
            OpTag::ExtractField(TemporalUnit::Millisecond) => Some(Rule::Template(
                "CAST(FLOOR(EXTRACT(MILLISECONDS FROM {0})) AS INTEGER) % 1000",
            )),
            _ => None,
        }
    }
}
