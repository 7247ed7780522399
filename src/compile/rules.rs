//! Emission rules for scalar operations.
//!
//! A [`Rule`] says how one operation is spelled in SQL. Dialects override
//! individual rules through [`SqlDialect::rule`](crate::sql::SqlDialect::rule);
//! everything else falls back to [`default_rule`].
//!
//! Operations with native SQL syntax (arithmetic, comparisons, CASE, CAST,
//! IN, IS NULL, literals and column references) are lowered directly and
//! never consult a rule. Every other operation needs one, and an operation
//! without a rule cannot be compiled for that dialect.

use crate::ir::{OpTag, ReductionFunc, StringFunc, TemporalUnit};

/// How to emit an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// A function call over the lowered operands: `NAME(a, b, ...)`.
    Function(&'static str),
    /// A template with `{n}` placeholders for the lowered operands.
    Template(&'static str),
    /// The dialect cannot express the operation.
    Unsupported,
}

/// Rule used when the dialect has no override.
///
/// `None` means the operation has no portable spelling; for operations
/// without native syntax that makes it unsupported.
pub fn default_rule(tag: OpTag) -> Option<Rule> {
    let rule = match tag {
        OpTag::String(func) => match func {
            StringFunc::Lowercase => Rule::Function("LOWER"),
            StringFunc::Uppercase => Rule::Function("UPPER"),
            StringFunc::StringLength => Rule::Function("LENGTH"),
            StringFunc::Strip => Rule::Function("TRIM"),
            StringFunc::Substring => Rule::Template("SUBSTR({0}, {1} + 1, {2})"),
            StringFunc::StrLeft => Rule::Function("LEFT"),
            StringFunc::StrRight => Rule::Function("RIGHT"),
            StringFunc::Like => Rule::Template("{0} LIKE {1}"),
            StringFunc::StringContains => Rule::Template("STRPOS({0}, {1}) > 0"),
            StringFunc::StartsWith => Rule::Template("LEFT({0}, LENGTH({1})) = {1}"),
            StringFunc::EndsWith => Rule::Template("RIGHT({0}, LENGTH({1})) = {1}"),
            // native `||`, or CONCAT() where the dialect lacks the operator
            StringFunc::StringConcat => return None,
            StringFunc::RegexSearch => return None,
        },
        OpTag::ExtractField(unit) => match unit {
            TemporalUnit::Year => Rule::Template("EXTRACT(YEAR FROM {0})"),
            TemporalUnit::Month => Rule::Template("EXTRACT(MONTH FROM {0})"),
            TemporalUnit::Day => Rule::Template("EXTRACT(DAY FROM {0})"),
            TemporalUnit::Hour => Rule::Template("EXTRACT(HOUR FROM {0})"),
            TemporalUnit::Minute => Rule::Template("EXTRACT(MINUTE FROM {0})"),
            TemporalUnit::Second => Rule::Template("EXTRACT(SECOND FROM {0})"),
            TemporalUnit::Millisecond => return None,
        },
        OpTag::Reduction(func) => match func {
            ReductionFunc::Count | ReductionFunc::CountDistinct => Rule::Function("COUNT"),
            ReductionFunc::Sum => Rule::Function("SUM"),
            ReductionFunc::Mean => Rule::Function("AVG"),
            ReductionFunc::Min => Rule::Function("MIN"),
            ReductionFunc::Max => Rule::Function("MAX"),
        },
        OpTag::Coalesce => Rule::Function("COALESCE"),
        // rounding down of the scaled value; the bin arithmetic is native
        OpTag::Histogram => Rule::Function("FLOOR"),
        _ => return None,
    };
    Some(rule)
}
