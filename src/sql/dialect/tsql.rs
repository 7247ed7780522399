//! T-SQL (SQL Server / Azure SQL) dialect.
//!
//! T-SQL has significant differences from ANSI:
//! - Square bracket identifier quoting (`[name]`)
//! - No boolean literals (1/0) and no TRUE/FALSE predicates
//! - OFFSET FETCH for pagination (requires ORDER BY)
//! - N'...' prefix for Unicode strings
//! - String concatenation with `+`
//! - DATEPART instead of EXTRACT, CHARINDEX instead of STRPOS
//! - No regular expressions and no nested types

use super::helpers;
use super::SqlDialect;
use crate::compile::rules::Rule;
use crate::ir::{OpTag, StringFunc, TemporalUnit};
use crate::sql::token::TokenStream;
use crate::types::DataType;

/// T-SQL (SQL Server) dialect.
#[derive(Debug, Clone, Copy)]
pub struct TSql;

impl SqlDialect for TSql {
    fn name(&self) -> &'static str {
        "tsql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_bracket(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        // T-SQL uses N'...' for Unicode strings
        if !s.is_ascii() {
            helpers::quote_string_unicode(s)
        } else {
            helpers::quote_string_single(s)
        }
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn format_predicate(&self, value: bool) -> &'static str {
        if value {
            "1 = 1"
        } else {
            "1 = 0"
        }
    }

    fn format_bytes(&self, bytes: &[u8]) -> String {
        format!("0x{}", helpers::hex(bytes))
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_tsql(limit, offset)
    }

    fn requires_order_by_for_offset(&self) -> bool {
        true
    }

    fn concat_operator(&self) -> &'static str {
        "+"
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::rename(name, &[("LENGTH", "LEN")])
    }

    fn cast_type(&self, dt: &DataType) -> Option<String> {
        helpers::cast_type_tsql(dt)
    }

    fn rule(&self, tag: OpTag) -> Option<Rule> {
        let rule = match tag {
            OpTag::String(StringFunc::RegexSearch) => Rule::Unsupported,
            OpTag::String(StringFunc::Substring) => Rule::Template("SUBSTRING({0}, {1} + 1, {2})"),
            OpTag::String(StringFunc::StringContains) => Rule::Template("CHARINDEX({1}, {0}) > 0"),
            OpTag::String(StringFunc::StartsWith) => Rule::Template("LEFT({0}, LEN({1})) = {1}"),
            OpTag::String(StringFunc::EndsWith) => Rule::Template("RIGHT({0}, LEN({1})) = {1}"),
            OpTag::ExtractField(unit) => Rule::Template(match unit {
                TemporalUnit::Year => "DATEPART(year, {0})",
                TemporalUnit::Month => "DATEPART(month, {0})",
                TemporalUnit::Day => "DATEPART(day, {0})",
                TemporalUnit::Hour => "DATEPART(hour, {0})",
                TemporalUnit::Minute => "DATEPART(minute, {0})",
                TemporalUnit::Second => "DATEPART(second, {0})",
                TemporalUnit::Millisecond => "DATEPART(millisecond, {0})",
            }),
            _ => return None,
        };
        Some(rule)
    }
}
