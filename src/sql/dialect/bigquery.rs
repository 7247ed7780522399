//! BigQuery SQL dialect.
//!
//! BigQuery features:
//! - Backtick identifier quoting
//! - Every integer width is INT64
//! - No `%` operator (MOD() instead)
//! - REGEXP_CONTAINS, STARTS_WITH, ENDS_WITH built in
//! - DATETIME for naive timestamps, TIMESTAMP for zoned ones

use super::helpers;
use super::SqlDialect;
use crate::compile::rules::Rule;
use crate::ir::{BinaryOp, OpTag, StringFunc, TemporalUnit};
use crate::types::DataType;

/// BigQuery SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct BigQuery;

impl SqlDialect for BigQuery {
    fn name(&self) -> &'static str {
        "bigquery"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn format_bytes(&self, bytes: &[u8]) -> String {
        format!("FROM_HEX('{}')", helpers::hex(bytes))
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::rename(name, &[("LENGTH", "CHAR_LENGTH")])
    }

    fn cast_type(&self, dt: &DataType) -> Option<String> {
        helpers::cast_type_bigquery(dt)
    }

    fn rule(&self, tag: OpTag) -> Option<Rule> {
        match tag {
            OpTag::Binary(BinaryOp::Modulo) => Some(Rule::Function("MOD")),
            OpTag::String(StringFunc::RegexSearch) => Some(Rule::Function("REGEXP_CONTAINS")),
            OpTag::String(StringFunc::StartsWith) => Some(Rule::Function("STARTS_WITH")),
            OpTag::String(StringFunc::EndsWith) => Some(Rule::Function("ENDS_WITH")),
            OpTag::ExtractField(TemporalUnit::Millisecond) => {
                Some(Rule::Template("EXTRACT(MILLISECOND FROM {0})"))
            }
            _ => None,
        }
    }
}
