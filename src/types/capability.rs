//! Which builder methods each type family exposes.
//!
//! Builder methods such as `year()` or `lower()` consult this table before
//! constructing a node, so calling a method that makes no sense for the
//! receiver fails with a `TypeMismatch` naming both.

use std::collections::HashSet;
use std::fmt;

use once_cell::sync::Lazy;

use super::DataType;
use crate::error::{ExprError, ExprResult};

/// Coarse grouping of types for capability lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeFamily {
    Null,
    Boolean,
    Numeric,
    String,
    Binary,
    Date,
    Time,
    Timestamp,
    Interval,
    Array,
    Struct,
    Map,
}

impl TypeFamily {
    pub fn of(dtype: &DataType) -> TypeFamily {
        match dtype {
            DataType::Null => TypeFamily::Null,
            DataType::Boolean => TypeFamily::Boolean,
            DataType::Int { .. } | DataType::Float { .. } | DataType::Decimal { .. } => {
                TypeFamily::Numeric
            }
            DataType::String => TypeFamily::String,
            DataType::Binary => TypeFamily::Binary,
            DataType::Date => TypeFamily::Date,
            DataType::Time => TypeFamily::Time,
            DataType::Timestamp { .. } => TypeFamily::Timestamp,
            DataType::Interval(_) => TypeFamily::Interval,
            DataType::Array(_) => TypeFamily::Array,
            DataType::Struct(_) => TypeFamily::Struct,
            DataType::Map(_, _) => TypeFamily::Map,
        }
    }
}

/// A builder method subject to capability checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    // string
    Lower,
    Upper,
    Length,
    Strip,
    Left,
    Right,
    Substr,
    Like,
    RLike,
    Contains,
    StartsWith,
    EndsWith,
    Concat,
    // temporal
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
    // numeric
    Sum,
    Mean,
    Bucket,
    Histogram,
    Negate,
    // ordering
    Min,
    Max,
    SortKey,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Lower => "lower",
            Method::Upper => "upper",
            Method::Length => "length",
            Method::Strip => "strip",
            Method::Left => "left",
            Method::Right => "right",
            Method::Substr => "substr",
            Method::Like => "like",
            Method::RLike => "rlike",
            Method::Contains => "contains",
            Method::StartsWith => "startswith",
            Method::EndsWith => "endswith",
            Method::Concat => "concat",
            Method::Year => "year",
            Method::Month => "month",
            Method::Day => "day",
            Method::Hour => "hour",
            Method::Minute => "minute",
            Method::Second => "second",
            Method::Millisecond => "millisecond",
            Method::Sum => "sum",
            Method::Mean => "mean",
            Method::Bucket => "bucket",
            Method::Histogram => "histogram",
            Method::Negate => "negate",
            Method::Min => "min",
            Method::Max => "max",
            Method::SortKey => "sort_by",
        };
        f.write_str(name)
    }
}

const STRING_METHODS: &[Method] = &[
    Method::Lower,
    Method::Upper,
    Method::Length,
    Method::Strip,
    Method::Left,
    Method::Right,
    Method::Substr,
    Method::Like,
    Method::RLike,
    Method::Contains,
    Method::StartsWith,
    Method::EndsWith,
    Method::Concat,
];

const ORDERING_METHODS: &[Method] = &[Method::Min, Method::Max, Method::SortKey];

static CAPABILITIES: Lazy<HashSet<(TypeFamily, Method)>> = Lazy::new(|| {
    let mut table = HashSet::new();
    let mut grant = |family: TypeFamily, methods: &[Method]| {
        for method in methods {
            table.insert((family, *method));
        }
    };

    grant(TypeFamily::String, STRING_METHODS);
    grant(
        TypeFamily::Timestamp,
        &[
            Method::Year,
            Method::Month,
            Method::Day,
            Method::Hour,
            Method::Minute,
            Method::Second,
            Method::Millisecond,
        ],
    );
    grant(TypeFamily::Date, &[Method::Year, Method::Month, Method::Day]);
    grant(
        TypeFamily::Time,
        &[
            Method::Hour,
            Method::Minute,
            Method::Second,
            Method::Millisecond,
        ],
    );
    grant(
        TypeFamily::Numeric,
        &[
            Method::Sum,
            Method::Mean,
            Method::Bucket,
            Method::Histogram,
            Method::Negate,
        ],
    );
    grant(TypeFamily::Interval, &[Method::Negate]);

    for family in [
        TypeFamily::Boolean,
        TypeFamily::Numeric,
        TypeFamily::String,
        TypeFamily::Binary,
        TypeFamily::Date,
        TypeFamily::Time,
        TypeFamily::Timestamp,
        TypeFamily::Interval,
    ] {
        grant(family, ORDERING_METHODS);
    }

    table
});

/// Whether `dtype` exposes `method`. The null type exposes everything.
pub fn supports(dtype: &DataType, method: Method) -> bool {
    let family = TypeFamily::of(dtype);
    family == TypeFamily::Null || CAPABILITIES.contains(&(family, method))
}

/// Fail with `TypeMismatch` unless `dtype` exposes `method`.
pub fn require(dtype: &DataType, method: Method) -> ExprResult<()> {
    if supports(dtype, method) {
        Ok(())
    } else {
        Err(ExprError::mismatch(
            method.to_string(),
            format!("a type supporting `{}`", method),
            dtype,
        ))
    }
}
