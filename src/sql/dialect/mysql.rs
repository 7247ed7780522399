//! MySQL SQL dialect.
//!
//! MySQL differences from ANSI:
//! - Backtick identifier quoting (`` `name` ``)
//! - Boolean is TINYINT(1), returns 1/0
//! - `||` is logical OR by default (use CONCAT())
//! - LENGTH counts bytes, CHAR_LENGTH counts characters
//! - `REGEXP` operator for regular expressions
//! - CAST only accepts a short list of target types

use super::helpers;
use super::SqlDialect;
use crate::compile::rules::Rule;
use crate::ir::{OpTag, StringFunc, TemporalUnit};
use crate::types::DataType;

/// MySQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct MySql;

impl SqlDialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn supports_concat_operator(&self) -> bool {
        // MySQL || is OR by default, use CONCAT() instead
        false
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::rename(name, &[("LENGTH", "CHAR_LENGTH")])
    }

    fn cast_type(&self, dt: &DataType) -> Option<String> {
        helpers::cast_type_mysql(dt)
    }

    fn rule(&self, tag: OpTag) -> Option<Rule> {
        match tag {
            OpTag::String(StringFunc::RegexSearch) => Some(Rule::Template("{0} REGEXP {1}")),
            OpTag::String(StringFunc::StringContains) => {
                Some(Rule::Template("INSTR({0}, {1}) > 0"))
            }
            OpTag::String(StringFunc::StartsWith) => {
                Some(Rule::Template("LEFT({0}, CHAR_LENGTH({1})) = {1}"))
            }
            OpTag::String(StringFunc::EndsWith) => {
                Some(Rule::Template("RIGHT({0}, CHAR_LENGTH({1})) = {1}"))
            }
            OpTag::ExtractField(TemporalUnit::Millisecond) => {
                Some(Rule::Template("FLOOR(MICROSECOND({0}) / 1000)"))
            }
            _ => None,
        }
    }
}
