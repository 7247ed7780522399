//! Amazon Redshift SQL dialect.
//!
//! Redshift features:
//! - PostgreSQL-based syntax
//! - ANSI identifier quoting (`"`)
//! - POSIX regular expressions with `~`
//! - No STARTS_WITH, no array casts
//! - VARCHAR(MAX) / VARBYTE instead of TEXT / BYTEA

use super::helpers;
use super::SqlDialect;
use crate::compile::rules::Rule;
use crate::ir::{OpTag, StringFunc, TemporalUnit};
use crate::types::DataType;

/// Amazon Redshift SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Redshift;

impl SqlDialect for Redshift {
    fn name(&self) -> &'static str {
        "redshift"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn cast_type(&self, dt: &DataType) -> Option<String> {
        helpers::cast_type_redshift(dt)
    }

    fn rule(&self, tag: OpTag) -> Option<Rule> {
        match tag {
            OpTag::String(StringFunc::RegexSearch) => Some(Rule::Template("{0} ~ {1}")),
            OpTag::ExtractField(TemporalUnit::Second) => {
                Some(Rule::Template("FLOOR(EXTRACT(SECOND FROM {0}))"))
            }
            OpTag::ExtractField(TemporalUnit::Millisecond) => {
                Some(Rule::Template("EXTRACT(MILLISECOND FROM {0}) % 1000"))
            }
            _ => None,
        }
    }
}
