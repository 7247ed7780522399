//! Databricks (Spark SQL) dialect.
//!
//! Databricks features:
//! - Backtick identifier quoting
//! - `RLIKE` for regular expressions
//! - STARTSWITH / ENDSWITH string predicates
//! - No TIME or INTERVAL cast targets
//! - `EXTRACT(SECOND ...)` returns a decimal with the fraction

use super::helpers;
use super::SqlDialect;
use crate::compile::rules::Rule;
use crate::ir::{OpTag, StringFunc, TemporalUnit};
use crate::types::DataType;

/// Databricks (Spark SQL) dialect.
#[derive(Debug, Clone, Copy)]
pub struct Databricks;

impl SqlDialect for Databricks {
    fn name(&self) -> &'static str {
        "databricks"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn cast_type(&self, dt: &DataType) -> Option<String> {
        helpers::cast_type_databricks(dt)
    }

    fn rule(&self, tag: OpTag) -> Option<Rule> {
        match tag {
            OpTag::String(StringFunc::RegexSearch) => Some(Rule::Template("{0} RLIKE {1}")),
            OpTag::String(StringFunc::StringContains) => {
                Some(Rule::Template("INSTR({0}, {1}) > 0"))
            }
            OpTag::String(StringFunc::StartsWith) => Some(Rule::Function("STARTSWITH")),
            OpTag::String(StringFunc::EndsWith) => Some(Rule::Function("ENDSWITH")),
            OpTag::ExtractField(TemporalUnit::Second) => {
                Some(Rule::Template("FLOOR(EXTRACT(SECOND FROM {0}))"))
            }
            OpTag::ExtractField(TemporalUnit::Millisecond) => {
                Some(Rule::Template("CAST(DATE_FORMAT({0}, 'SSS') AS INT)"))
            }
            _ => None,
        }
    }
}
