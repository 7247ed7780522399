//! SQLite SQL dialect.
//!
//! SQLite differences from ANSI:
//! - ANSI identifier quoting (`"`)
//! - Booleans are integers (1/0)
//! - Only storage-class cast targets (INTEGER, REAL, NUMERIC, TEXT, BLOB)
//! - Temporal values are text; fields are read with STRFTIME
//! - No LEFT/RIGHT/STRPOS; SUBSTR and INSTR instead
//! - `REGEXP` calls a user function the connection must register
//! - FLOOR needs the optional math functions, so it is spelled with CAST
//! - UNION operands cannot be parenthesized

use super::helpers;
use super::SqlDialect;
use crate::compile::rules::Rule;
use crate::ir::{OpTag, StringFunc, TemporalUnit};
use crate::types::DataType;

/// SQLite SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn supports_parenthesized_set_operands(&self) -> bool {
        false
    }

    fn cast_type(&self, dt: &DataType) -> Option<String> {
        helpers::cast_type_sqlite(dt)
    }

    fn rule(&self, tag: OpTag) -> Option<Rule> {
        let rule = match tag {
            OpTag::String(StringFunc::RegexSearch) => Rule::Template("{0} REGEXP {1}"),
            OpTag::String(StringFunc::StrLeft) => Rule::Template("SUBSTR({0}, 1, {1})"),
            OpTag::String(StringFunc::StrRight) => {
                Rule::Template("SUBSTR({0}, MAX(LENGTH({0}) - ({1}) + 1, 1))")
            }
            OpTag::String(StringFunc::StringContains) => Rule::Template("INSTR({0}, {1}) > 0"),
            OpTag::String(StringFunc::StartsWith) => {
                Rule::Template("SUBSTR({0}, 1, LENGTH({1})) = {1}")
            }
            OpTag::String(StringFunc::EndsWith) => {
                Rule::Template("SUBSTR({0}, LENGTH({0}) - LENGTH({1}) + 1) = {1}")
            }
            OpTag::Histogram => Rule::Template(
                "CASE WHEN {0} < CAST({0} AS INTEGER) THEN CAST({0} AS INTEGER) - 1 \
                 ELSE CAST({0} AS INTEGER) END",
            ),
            OpTag::ExtractField(unit) => Rule::Template(match unit {
                TemporalUnit::Year => "CAST(STRFTIME('%Y', {0}) AS INTEGER)",
                TemporalUnit::Month => "CAST(STRFTIME('%m', {0}) AS INTEGER)",
                TemporalUnit::Day => "CAST(STRFTIME('%d', {0}) AS INTEGER)",
                TemporalUnit::Hour => "CAST(STRFTIME('%H', {0}) AS INTEGER)",
                TemporalUnit::Minute => "CAST(STRFTIME('%M', {0}) AS INTEGER)",
                TemporalUnit::Second => "CAST(STRFTIME('%S', {0}) AS INTEGER)",
                TemporalUnit::Millisecond => "CAST(SUBSTR(STRFTIME('%f', {0}), 4) AS INTEGER)",
            }),
            _ => return None,
        };
        Some(rule)
    }
}
