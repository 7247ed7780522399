//! Snowflake SQL dialect.
//!
//! Snowflake features:
//! - ANSI identifier quoting (`"`)
//! - NVL is native
//! - CONTAINS / STARTSWITH / ENDSWITH string predicates
//! - Semi-structured ARRAY and OBJECT cast targets
//! - TIMESTAMP_NTZ / TIMESTAMP_TZ instead of plain TIMESTAMP

use super::helpers;
use super::SqlDialect;
use crate::compile::rules::Rule;
use crate::ir::{OpTag, StringFunc, TemporalUnit};
use crate::types::DataType;

/// Snowflake SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Snowflake;

impl SqlDialect for Snowflake {
    fn name(&self) -> &'static str {
        "snowflake"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn format_bytes(&self, bytes: &[u8]) -> String {
        format!("TO_BINARY('{}', 'HEX')", helpers::hex(bytes))
    }

    fn cast_type(&self, dt: &DataType) -> Option<String> {
        helpers::cast_type_snowflake(dt)
    }

    fn rule(&self, tag: OpTag) -> Option<Rule> {
        match tag {
            OpTag::String(StringFunc::RegexSearch) => {
                Some(Rule::Template("REGEXP_INSTR({0}, {1}) > 0"))
            }
            OpTag::String(StringFunc::StringContains) => Some(Rule::Function("CONTAINS")),
            OpTag::String(StringFunc::StartsWith) => Some(Rule::Function("STARTSWITH")),
            OpTag::String(StringFunc::EndsWith) => Some(Rule::Function("ENDSWITH")),
            OpTag::ExtractField(TemporalUnit::Millisecond) => Some(Rule::Template(
                "FLOOR(EXTRACT(NANOSECOND FROM {0}) / 1000000)",
            )),
            _ => None,
        }
    }
}
