//! Operations and their constructors.
//!
//! [`Op`] is the closed set of operations a [`Node`] can hold. The free
//! functions at the bottom of this module are the only way to build nodes:
//! each validates arity, scope and shape before handing the operation to
//! [`Node::new`], which runs type inference and computes the content id.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Datum, Node, NodeId, NodeRef, Shape};
use crate::error::{ExprError, ExprResult};
use crate::lineage;
use crate::schema::Schema;
use crate::types::capability::Method;
use crate::types::DataType;

// =============================================================================
// Parameter enums
// =============================================================================

/// Binary operators over values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equals,
    NotEquals,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
}

impl BinaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "Add",
            BinaryOp::Subtract => "Subtract",
            BinaryOp::Multiply => "Multiply",
            BinaryOp::Divide => "Divide",
            BinaryOp::Modulo => "Modulo",
            BinaryOp::Equals => "Equals",
            BinaryOp::NotEquals => "NotEquals",
            BinaryOp::Less => "Less",
            BinaryOp::LessEqual => "LessEqual",
            BinaryOp::Greater => "Greater",
            BinaryOp::GreaterEqual => "GreaterEqual",
            BinaryOp::And => "And",
            BinaryOp::Or => "Or",
        }
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add
                | BinaryOp::Subtract
                | BinaryOp::Multiply
                | BinaryOp::Divide
                | BinaryOp::Modulo
        )
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Equals
                | BinaryOp::NotEquals
                | BinaryOp::Less
                | BinaryOp::LessEqual
                | BinaryOp::Greater
                | BinaryOp::GreaterEqual
        )
    }

    /// Comparisons that need an ordering, not just equality.
    pub fn is_ordering(&self) -> bool {
        self.is_comparison() && !matches!(self, BinaryOp::Equals | BinaryOp::NotEquals)
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

/// String functions. Every function takes the string as its first argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StringFunc {
    Lowercase,
    Uppercase,
    StringLength,
    Strip,
    /// `[s, start, length]`, start is 0-based.
    Substring,
    StrLeft,
    StrRight,
    StringConcat,
    Like,
    RegexSearch,
    StringContains,
    StartsWith,
    EndsWith,
}

impl StringFunc {
    pub fn name(&self) -> &'static str {
        match self {
            StringFunc::Lowercase => "Lowercase",
            StringFunc::Uppercase => "Uppercase",
            StringFunc::StringLength => "StringLength",
            StringFunc::Strip => "Strip",
            StringFunc::Substring => "Substring",
            StringFunc::StrLeft => "StrLeft",
            StringFunc::StrRight => "StrRight",
            StringFunc::StringConcat => "StringConcat",
            StringFunc::Like => "Like",
            StringFunc::RegexSearch => "RegexSearch",
            StringFunc::StringContains => "StringContains",
            StringFunc::StartsWith => "StartsWith",
            StringFunc::EndsWith => "EndsWith",
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            StringFunc::Lowercase
            | StringFunc::Uppercase
            | StringFunc::StringLength
            | StringFunc::Strip => 1,
            StringFunc::Substring => 3,
            _ => 2,
        }
    }

    /// Capability the receiver must expose.
    pub fn method(&self) -> Method {
        match self {
            StringFunc::Lowercase => Method::Lower,
            StringFunc::Uppercase => Method::Upper,
            StringFunc::StringLength => Method::Length,
            StringFunc::Strip => Method::Strip,
            StringFunc::Substring => Method::Substr,
            StringFunc::StrLeft => Method::Left,
            StringFunc::StrRight => Method::Right,
            StringFunc::StringConcat => Method::Concat,
            StringFunc::Like => Method::Like,
            StringFunc::RegexSearch => Method::RLike,
            StringFunc::StringContains => Method::Contains,
            StringFunc::StartsWith => Method::StartsWith,
            StringFunc::EndsWith => Method::EndsWith,
        }
    }

    pub fn is_predicate(&self) -> bool {
        matches!(
            self,
            StringFunc::Like
                | StringFunc::RegexSearch
                | StringFunc::StringContains
                | StringFunc::StartsWith
                | StringFunc::EndsWith
        )
    }
}

/// Field of a date, time or timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemporalUnit {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
}

impl TemporalUnit {
    pub fn name(&self) -> &'static str {
        match self {
            TemporalUnit::Year => "ExtractYear",
            TemporalUnit::Month => "ExtractMonth",
            TemporalUnit::Day => "ExtractDay",
            TemporalUnit::Hour => "ExtractHour",
            TemporalUnit::Minute => "ExtractMinute",
            TemporalUnit::Second => "ExtractSecond",
            TemporalUnit::Millisecond => "ExtractMillisecond",
        }
    }

    pub fn method(&self) -> Method {
        match self {
            TemporalUnit::Year => Method::Year,
            TemporalUnit::Month => Method::Month,
            TemporalUnit::Day => Method::Day,
            TemporalUnit::Hour => Method::Hour,
            TemporalUnit::Minute => Method::Minute,
            TemporalUnit::Second => Method::Second,
            TemporalUnit::Millisecond => Method::Millisecond,
        }
    }
}

/// Reductions producing one value per group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReductionFunc {
    Count,
    CountDistinct,
    Sum,
    Mean,
    Min,
    Max,
}

impl ReductionFunc {
    pub fn name(&self) -> &'static str {
        match self {
            ReductionFunc::Count => "Count",
            ReductionFunc::CountDistinct => "CountDistinct",
            ReductionFunc::Sum => "Sum",
            ReductionFunc::Mean => "Mean",
            ReductionFunc::Min => "Min",
            ReductionFunc::Max => "Max",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Outer,
    Cross,
}

/// A sort key: a value of the sorted relation and its direction.
#[derive(Debug, Clone, Serialize)]
pub struct SortKey {
    pub expr: NodeRef,
    pub ascending: bool,
}

/// Which side of a bucket interval is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Closed {
    #[default]
    Left,
    Right,
}

impl FromStr for Closed {
    type Err = ExprError;

    fn from_str(s: &str) -> ExprResult<Self> {
        match s {
            "left" => Ok(Closed::Left),
            "right" => Ok(Closed::Right),
            other => Err(ExprError::InvalidArgument(format!(
                "closed must be `left` or `right`, got `{}`",
                other
            ))),
        }
    }
}

/// Options of [`BucketSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketOptions {
    pub closed: Closed,
    /// Also close the outermost interior interval on its open side.
    pub close_extreme: bool,
    /// Add a bucket for values below the first edge.
    pub include_under: bool,
    /// Add a bucket for values above the last edge.
    pub include_over: bool,
}

impl Default for BucketOptions {
    fn default() -> Self {
        Self {
            closed: Closed::Left,
            close_extreme: true,
            include_under: false,
            include_over: false,
        }
    }
}

/// Validated bucket edges plus options.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketSpec {
    edges: Vec<Datum>,
    options: BucketOptions,
}

/// One end of a bucket interval: `(edge, inclusive)`.
pub type BucketEdge = (Datum, bool);

/// Interval covered by one bucket. `None` means unbounded on that side.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketBounds {
    pub lower: Option<BucketEdge>,
    pub upper: Option<BucketEdge>,
}

impl BucketSpec {
    pub fn new(edges: Vec<Datum>, options: BucketOptions) -> ExprResult<Self> {
        if edges.is_empty() {
            return Err(ExprError::InvalidArgument(
                "bucket requires at least one edge".into(),
            ));
        }
        let mut previous: Option<f64> = None;
        for edge in &edges {
            let value = edge.as_f64().ok_or_else(|| {
                ExprError::InvalidArgument(format!(
                    "bucket edges must be numbers, found {}",
                    edge.kind()
                ))
            })?;
            if !value.is_finite() {
                return Err(ExprError::InvalidArgument(
                    "bucket edges must be finite".into(),
                ));
            }
            if previous.is_some_and(|p| p >= value) {
                return Err(ExprError::InvalidArgument(
                    "bucket edges must be strictly increasing".into(),
                ));
            }
            previous = Some(value);
        }
        if edges.len() == 1 && !(options.include_under && options.include_over) {
            return Err(ExprError::InvalidArgument(
                "a single bucket edge requires include_under and include_over".into(),
            ));
        }
        let spec = Self { edges, options };
        if spec.bucket_count() > i8::MAX as usize {
            return Err(ExprError::InvalidArgument(format!(
                "too many buckets ({}), at most {} fit in int8",
                spec.bucket_count(),
                i8::MAX
            )));
        }
        Ok(spec)
    }

    pub fn edges(&self) -> &[Datum] {
        &self.edges
    }

    pub fn options(&self) -> BucketOptions {
        self.options
    }

    pub fn bucket_count(&self) -> usize {
        self.edges.len() - 1
            + usize::from(self.options.include_under)
            + usize::from(self.options.include_over)
    }

    /// Intervals in bucket order; position is the bucket number.
    pub fn bounds(&self) -> Vec<BucketBounds> {
        let n = self.edges.len();
        let left = self.options.closed == Closed::Left;
        let extreme = self.options.close_extreme;
        let first = &self.edges[0];
        let last = &self.edges[n - 1];
        let mut out = Vec::with_capacity(self.bucket_count());

        if self.options.include_under {
            let inclusive = if n == 1 { !left } else { !left && !extreme };
            out.push(BucketBounds {
                lower: None,
                upper: Some((first.clone(), inclusive)),
            });
        }

        for j in 0..n - 1 {
            let (lower_inclusive, upper_inclusive) = if left {
                (true, extreme && j == n - 2)
            } else {
                (extreme && j == 0, true)
            };
            out.push(BucketBounds {
                lower: Some((self.edges[j].clone(), lower_inclusive)),
                upper: Some((self.edges[j + 1].clone(), upper_inclusive)),
            });
        }

        if self.options.include_over {
            let inclusive = if n == 1 { left } else { left && !extreme };
            out.push(BucketBounds {
                lower: Some((last.clone(), inclusive)),
                upper: None,
            });
        }

        out
    }
}

/// Options of [`HistogramSpec`]. Exactly one of `nbins` and `binwidth`
/// must be set.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HistogramOptions {
    pub nbins: Option<u64>,
    pub binwidth: Option<f64>,
    /// Left edge of bin 0; the minimum of the column when unset.
    pub base: Option<f64>,
    pub closed: Closed,
}

/// Validated equal-width binning.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramSpec {
    options: HistogramOptions,
}

impl HistogramSpec {
    pub fn new(options: HistogramOptions) -> ExprResult<Self> {
        match (options.nbins, options.binwidth) {
            (Some(_), Some(_)) => {
                return Err(ExprError::InvalidArgument(
                    "histogram takes nbins or binwidth, not both".into(),
                ))
            }
            (None, None) => {
                return Err(ExprError::InvalidArgument(
                    "histogram requires nbins or binwidth".into(),
                ))
            }
            (Some(0), None) => {
                return Err(ExprError::InvalidArgument(
                    "nbins must be at least 1".into(),
                ))
            }
            (None, Some(width)) if !(width.is_finite() && width > 0.0) => {
                return Err(ExprError::InvalidArgument(format!(
                    "binwidth must be a positive number, got {}",
                    width
                )))
            }
            _ => {}
        }
        if options.base.is_some_and(|b| !b.is_finite()) {
            return Err(ExprError::InvalidArgument("base must be finite".into()));
        }
        Ok(Self { options })
    }

    pub fn options(&self) -> HistogramOptions {
        self.options
    }

    /// Whether the column minimum is needed: no explicit base.
    pub fn needs_min(&self) -> bool {
        self.options.base.is_none()
    }

    /// Whether the column maximum is needed: the width comes from `nbins`.
    pub fn needs_max(&self) -> bool {
        self.options.nbins.is_some()
    }
}

// =============================================================================
// Operations
// =============================================================================

/// An operation together with its parameters and children.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "op")]
pub enum Op {
    // Relations
    TableScan {
        name: String,
        schema: Schema,
    },
    /// A second, independent reference to a table, for self joins.
    /// References to the same table with different tags are distinct.
    SelfReference {
        table: NodeRef,
        tag: String,
    },
    Projection {
        input: NodeRef,
        columns: Vec<(String, NodeRef)>,
    },
    Filter {
        input: NodeRef,
        predicates: Vec<NodeRef>,
    },
    Aggregation {
        input: NodeRef,
        by: Vec<(String, NodeRef)>,
        metrics: Vec<(String, NodeRef)>,
    },
    SortBy {
        input: NodeRef,
        keys: Vec<SortKey>,
    },
    Limit {
        input: NodeRef,
        n: u64,
        offset: u64,
    },
    Distinct {
        input: NodeRef,
    },
    Join {
        kind: JoinKind,
        left: NodeRef,
        right: NodeRef,
        predicates: Vec<NodeRef>,
    },
    Union {
        left: NodeRef,
        right: NodeRef,
        distinct: bool,
    },

    // Values
    Field {
        table: NodeRef,
        name: String,
    },
    Literal {
        value: Datum,
        dtype: DataType,
    },
    Binary {
        #[serde(rename = "binary_op")]
        op: BinaryOp,
        left: NodeRef,
        right: NodeRef,
    },
    Not {
        arg: NodeRef,
    },
    Negate {
        arg: NodeRef,
    },
    Cast {
        arg: NodeRef,
        to: DataType,
    },
    IsNull {
        arg: NodeRef,
    },
    NotNull {
        arg: NodeRef,
    },
    SimpleCase {
        base: NodeRef,
        cases: Vec<(NodeRef, NodeRef)>,
        default: Option<NodeRef>,
    },
    SearchedCase {
        cases: Vec<(NodeRef, NodeRef)>,
        default: Option<NodeRef>,
    },
    InValues {
        arg: NodeRef,
        options: Vec<NodeRef>,
        negated: bool,
    },
    /// Membership in the values of a column of another relation.
    InColumn {
        arg: NodeRef,
        column: NodeRef,
        negated: bool,
    },
    Coalesce {
        args: Vec<NodeRef>,
    },
    String {
        func: StringFunc,
        args: Vec<NodeRef>,
    },
    ExtractField {
        arg: NodeRef,
        unit: TemporalUnit,
    },
    Reduction {
        func: ReductionFunc,
        arg: NodeRef,
    },
    CountStar {
        table: NodeRef,
    },
    Bucket {
        arg: NodeRef,
        spec: BucketSpec,
    },
    /// Equal-width bin number. `min` and `max` are one-row relations
    /// holding the bounds of `arg` over its table, present when the options
    /// need them.
    Histogram {
        arg: NodeRef,
        spec: HistogramSpec,
        min: Option<NodeRef>,
        max: Option<NodeRef>,
    },
}

/// Flat operation tag, used for naming and for dialect rule lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpTag {
    TableScan,
    SelfReference,
    Projection,
    Filter,
    Aggregation,
    SortBy,
    Limit,
    Distinct,
    Join,
    Union,
    Field,
    Literal,
    Binary(BinaryOp),
    Not,
    Negate,
    Cast,
    IsNull,
    NotNull,
    SimpleCase,
    SearchedCase,
    InValues,
    InColumn,
    Coalesce,
    String(StringFunc),
    ExtractField(TemporalUnit),
    Reduction(ReductionFunc),
    CountStar,
    Bucket,
    Histogram,
}

impl fmt::Display for OpTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpTag::TableScan => "TableScan",
            OpTag::SelfReference => "SelfReference",
            OpTag::Projection => "Projection",
            OpTag::Filter => "Filter",
            OpTag::Aggregation => "Aggregation",
            OpTag::SortBy => "SortBy",
            OpTag::Limit => "Limit",
            OpTag::Distinct => "Distinct",
            OpTag::Join => "Join",
            OpTag::Union => "Union",
            OpTag::Field => "Field",
            OpTag::Literal => "Literal",
            OpTag::Binary(op) => op.name(),
            OpTag::Not => "Not",
            OpTag::Negate => "Negate",
            OpTag::Cast => "Cast",
            OpTag::IsNull => "IsNull",
            OpTag::NotNull => "NotNull",
            OpTag::SimpleCase => "SimpleCase",
            OpTag::SearchedCase => "SearchedCase",
            OpTag::InValues => "InValues",
            OpTag::InColumn => "InColumn",
            OpTag::Coalesce => "Coalesce",
            OpTag::String(func) => func.name(),
            OpTag::ExtractField(unit) => unit.name(),
            OpTag::Reduction(func) => func.name(),
            OpTag::CountStar => "CountStar",
            OpTag::Bucket => "Bucket",
            OpTag::Histogram => "Histogram",
        };
        f.write_str(name)
    }
}

impl Op {
    pub fn tag(&self) -> OpTag {
        match self {
            Op::TableScan { .. } => OpTag::TableScan,
            Op::SelfReference { .. } => OpTag::SelfReference,
            Op::Projection { .. } => OpTag::Projection,
            Op::Filter { .. } => OpTag::Filter,
            Op::Aggregation { .. } => OpTag::Aggregation,
            Op::SortBy { .. } => OpTag::SortBy,
            Op::Limit { .. } => OpTag::Limit,
            Op::Distinct { .. } => OpTag::Distinct,
            Op::Join { .. } => OpTag::Join,
            Op::Union { .. } => OpTag::Union,
            Op::Field { .. } => OpTag::Field,
            Op::Literal { .. } => OpTag::Literal,
            Op::Binary { op, .. } => OpTag::Binary(*op),
            Op::Not { .. } => OpTag::Not,
            Op::Negate { .. } => OpTag::Negate,
            Op::Cast { .. } => OpTag::Cast,
            Op::IsNull { .. } => OpTag::IsNull,
            Op::NotNull { .. } => OpTag::NotNull,
            Op::SimpleCase { .. } => OpTag::SimpleCase,
            Op::SearchedCase { .. } => OpTag::SearchedCase,
            Op::InValues { .. } => OpTag::InValues,
            Op::InColumn { .. } => OpTag::InColumn,
            Op::Coalesce { .. } => OpTag::Coalesce,
            Op::String { func, .. } => OpTag::String(*func),
            Op::ExtractField { unit, .. } => OpTag::ExtractField(*unit),
            Op::Reduction { func, .. } => OpTag::Reduction(*func),
            Op::CountStar { .. } => OpTag::CountStar,
            Op::Bucket { .. } => OpTag::Bucket,
            Op::Histogram { .. } => OpTag::Histogram,
        }
    }

    pub fn is_relation(&self) -> bool {
        matches!(
            self,
            Op::TableScan { .. }
                | Op::SelfReference { .. }
                | Op::Projection { .. }
                | Op::Filter { .. }
                | Op::Aggregation { .. }
                | Op::SortBy { .. }
                | Op::Limit { .. }
                | Op::Distinct { .. }
                | Op::Join { .. }
                | Op::Union { .. }
        )
    }

    /// Every child, tables and values alike.
    pub fn inputs(&self) -> Vec<&NodeRef> {
        let mut out: Vec<&NodeRef> = Vec::new();
        match self {
            Op::TableScan { .. } | Op::Literal { .. } => {}
            Op::SelfReference { table, .. } => out.push(table),
            Op::Projection { input, columns } => {
                out.push(input);
                out.extend(columns.iter().map(|(_, v)| v));
            }
            Op::Filter { input, predicates } => {
                out.push(input);
                out.extend(predicates);
            }
            Op::Aggregation { input, by, metrics } => {
                out.push(input);
                out.extend(by.iter().chain(metrics).map(|(_, v)| v));
            }
            Op::SortBy { input, keys } => {
                out.push(input);
                out.extend(keys.iter().map(|k| &k.expr));
            }
            Op::Limit { input, .. } | Op::Distinct { input } => out.push(input),
            Op::Join {
                left,
                right,
                predicates,
                ..
            } => {
                out.push(left);
                out.push(right);
                out.extend(predicates);
            }
            Op::Union { left, right, .. } => {
                out.push(left);
                out.push(right);
            }
            Op::Field { table, .. } | Op::CountStar { table } => out.push(table),
            Op::InColumn { arg, column, .. } => {
                out.push(arg);
                out.push(column);
            }
            Op::Histogram { arg, min, max, .. } => {
                out.push(arg);
                out.extend(min);
                out.extend(max);
            }
            _ => out = self.args(),
        }
        out
    }

    /// Value operands of a value operation, excluding table references, the
    /// column side of a membership test and histogram bounds.
    pub fn args(&self) -> Vec<&NodeRef> {
        match self {
            Op::Binary { left, right, .. } => vec![left, right],
            Op::Not { arg }
            | Op::Negate { arg }
            | Op::Cast { arg, .. }
            | Op::IsNull { arg }
            | Op::NotNull { arg }
            | Op::InColumn { arg, .. }
            | Op::ExtractField { arg, .. }
            | Op::Reduction { arg, .. }
            | Op::Bucket { arg, .. }
            | Op::Histogram { arg, .. } => vec![arg],
            Op::SimpleCase {
                base,
                cases,
                default,
            } => {
                let mut out = vec![base];
                for (when, then) in cases {
                    out.push(when);
                    out.push(then);
                }
                out.extend(default);
                out
            }
            Op::SearchedCase { cases, default } => {
                let mut out = Vec::new();
                for (when, then) in cases {
                    out.push(when);
                    out.push(then);
                }
                out.extend(default);
                out
            }
            Op::InValues { arg, options, .. } => {
                let mut out = vec![arg];
                out.extend(options);
                out
            }
            Op::Coalesce { args } | Op::String { args, .. } => args.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Rebuild a value operation with each operand from [`Op::args`] passed
    /// through `f`, in the same order.
    pub(crate) fn map_args<F>(&self, mut f: F) -> ExprResult<Op>
    where
        F: FnMut(&NodeRef) -> ExprResult<NodeRef>,
    {
        let op = match self {
            Op::Binary { op, left, right } => {
                let left = f(left)?;
                Op::Binary {
                    op: *op,
                    left,
                    right: f(right)?,
                }
            }
            Op::Not { arg } => Op::Not { arg: f(arg)? },
            Op::Negate { arg } => Op::Negate { arg: f(arg)? },
            Op::Cast { arg, to } => Op::Cast {
                arg: f(arg)?,
                to: to.clone(),
            },
            Op::IsNull { arg } => Op::IsNull { arg: f(arg)? },
            Op::NotNull { arg } => Op::NotNull { arg: f(arg)? },
            Op::SimpleCase {
                base,
                cases,
                default,
            } => {
                let base = f(base)?;
                let cases = map_cases(cases, &mut f)?;
                let default = default.as_ref().map(&mut f).transpose()?;
                Op::SimpleCase {
                    base,
                    cases,
                    default,
                }
            }
            Op::SearchedCase { cases, default } => {
                let cases = map_cases(cases, &mut f)?;
                let default = default.as_ref().map(&mut f).transpose()?;
                Op::SearchedCase { cases, default }
            }
            Op::InValues {
                arg,
                options,
                negated,
            } => {
                let arg = f(arg)?;
                Op::InValues {
                    arg,
                    options: options.iter().map(&mut f).collect::<ExprResult<_>>()?,
                    negated: *negated,
                }
            }
            Op::InColumn {
                arg,
                column,
                negated,
            } => Op::InColumn {
                arg: f(arg)?,
                column: column.clone(),
                negated: *negated,
            },
            Op::Coalesce { args } => Op::Coalesce {
                args: args.iter().map(&mut f).collect::<ExprResult<_>>()?,
            },
            Op::String { func, args } => Op::String {
                func: *func,
                args: args.iter().map(&mut f).collect::<ExprResult<_>>()?,
            },
            Op::ExtractField { arg, unit } => Op::ExtractField {
                arg: f(arg)?,
                unit: *unit,
            },
            Op::Reduction { func, arg } => Op::Reduction {
                func: *func,
                arg: f(arg)?,
            },
            Op::Bucket { arg, spec } => Op::Bucket {
                arg: f(arg)?,
                spec: spec.clone(),
            },
            Op::Histogram {
                arg,
                spec,
                min,
                max,
            } => Op::Histogram {
                arg: f(arg)?,
                spec: spec.clone(),
                min: min.clone(),
                max: max.clone(),
            },
            other => other.clone(),
        };
        Ok(op)
    }
}

fn map_cases<F>(cases: &[(NodeRef, NodeRef)], f: &mut F) -> ExprResult<Vec<(NodeRef, NodeRef)>>
where
    F: FnMut(&NodeRef) -> ExprResult<NodeRef>,
{
    cases
        .iter()
        .map(|(when, then)| Ok((f(when)?, f(then)?)))
        .collect()
}

// =============================================================================
// Graph queries
// =============================================================================

/// Relations a value reads columns from, in first-seen order.
///
/// The column side of a membership test is not counted: it is evaluated as
/// an independent subquery.
pub fn referenced_tables(value: &NodeRef) -> Vec<NodeRef> {
    let mut visited = HashSet::new();
    let mut found = HashSet::new();
    let mut out = Vec::new();
    collect_tables(value, &mut visited, &mut found, &mut out);
    out
}

fn collect_tables(
    node: &NodeRef,
    visited: &mut HashSet<NodeId>,
    found: &mut HashSet<NodeId>,
    out: &mut Vec<NodeRef>,
) {
    if !visited.insert(node.id()) {
        return;
    }
    match node.op() {
        Op::Field { table, .. } | Op::CountStar { table } => {
            if found.insert(table.id()) {
                out.push(table.clone());
            }
        }
        op if op.is_relation() => {}
        op => {
            for arg in op.args() {
                collect_tables(arg, visited, found, out);
            }
        }
    }
}

/// A scalar that still reads from a table: a reduction or an expression
/// over reductions.
pub fn is_aggregate(value: &NodeRef) -> bool {
    value.shape() == Some(Shape::Scalar) && !referenced_tables(value).is_empty()
}

/// Relations whose columns may be used directly on top of `rel`: the
/// relation itself and, for a join, the relations it joins.
pub fn direct_scope(rel: &NodeRef) -> Vec<NodeRef> {
    let mut out = vec![rel.clone()];
    if let Op::Join { left, right, .. } = rel.op() {
        out.extend(direct_scope(left));
        out.extend(direct_scope(right));
    }
    out
}

/// Name used in error messages for a value.
pub(crate) fn describe(value: &NodeRef) -> String {
    match value.op() {
        Op::Field { name, .. } => name.clone(),
        _ => value.tag().to_string(),
    }
}

fn check_scope(values: &[&NodeRef], scope: &[NodeRef], relation: &NodeRef) -> ExprResult<()> {
    let ids: HashSet<NodeId> = scope.iter().map(|r| r.id()).collect();
    for value in values {
        value.value_type()?;
        if referenced_tables(value).iter().any(|t| !ids.contains(&t.id())) {
            return Err(ExprError::UnboundColumn {
                column: describe(value),
                relation: relation.label(),
            });
        }
    }
    Ok(())
}

fn reject_aggregates(values: &[&NodeRef], context: &str) -> ExprResult<()> {
    match values.iter().find(|v| is_aggregate(v)) {
        Some(value) => Err(ExprError::ShapeMismatch {
            context: context.into(),
            message: format!("`{}` is a reduction; use aggregate instead", describe(value)),
        }),
        None => Ok(()),
    }
}

// =============================================================================
// Relation constructors
// =============================================================================

pub fn table_scan(name: &str, schema: Schema) -> ExprResult<NodeRef> {
    if name.is_empty() {
        return Err(ExprError::InvalidArgument("table name must not be empty".into()));
    }
    Node::new(Op::TableScan {
        name: name.to_string(),
        schema,
    })
}

/// A reference to `table` that is distinct from the table itself and from
/// references with other tags. The id depends only on `table` and `tag`.
pub fn self_reference(table: &NodeRef, tag: &str) -> ExprResult<NodeRef> {
    table.relation_schema()?;
    if tag.is_empty() {
        return Err(ExprError::InvalidArgument("view tag must not be empty".into()));
    }
    Node::new(Op::SelfReference {
        table: table.clone(),
        tag: tag.to_string(),
    })
}

pub fn projection(input: &NodeRef, columns: Vec<(String, NodeRef)>) -> ExprResult<NodeRef> {
    input.relation_schema()?;
    if columns.is_empty() {
        return Err(ExprError::InvalidArgument(
            "projection requires at least one column".into(),
        ));
    }
    let values: Vec<&NodeRef> = columns.iter().map(|(_, v)| v).collect();
    check_scope(&values, &direct_scope(input), input)?;
    reject_aggregates(&values, "projection")?;
    Node::new(Op::Projection {
        input: input.clone(),
        columns,
    })
}

pub fn filter(input: &NodeRef, predicates: Vec<NodeRef>) -> ExprResult<NodeRef> {
    input.relation_schema()?;
    if predicates.is_empty() {
        return Err(ExprError::InvalidArgument(
            "filter requires at least one predicate".into(),
        ));
    }
    let values: Vec<&NodeRef> = predicates.iter().collect();
    check_scope(&values, &direct_scope(input), input)?;
    reject_aggregates(&values, "filter")?;
    Node::new(Op::Filter {
        input: input.clone(),
        predicates,
    })
}

pub fn aggregation(
    input: &NodeRef,
    by: Vec<(String, NodeRef)>,
    metrics: Vec<(String, NodeRef)>,
) -> ExprResult<NodeRef> {
    input.relation_schema()?;
    if by.is_empty() && metrics.is_empty() {
        return Err(ExprError::InvalidArgument(
            "aggregation requires group keys or metrics".into(),
        ));
    }
    let scope = direct_scope(input);
    let keys: Vec<&NodeRef> = by.iter().map(|(_, v)| v).collect();
    check_scope(&keys, &scope, input)?;
    reject_aggregates(&keys, "group key")?;

    let values: Vec<&NodeRef> = metrics.iter().map(|(_, v)| v).collect();
    check_scope(&values, &scope, input)?;
    if let Some(metric) = values.iter().find(|v| v.shape() != Some(Shape::Scalar)) {
        return Err(ExprError::ShapeMismatch {
            context: "aggregation".into(),
            message: format!("metric `{}` is not a reduction", describe(metric)),
        });
    }

    Node::new(Op::Aggregation {
        input: input.clone(),
        by,
        metrics,
    })
}

pub fn sort_by(input: &NodeRef, keys: Vec<SortKey>) -> ExprResult<NodeRef> {
    input.relation_schema()?;
    if keys.is_empty() {
        return Err(ExprError::InvalidArgument(
            "sort_by requires at least one key".into(),
        ));
    }
    let values: Vec<&NodeRef> = keys.iter().map(|k| &k.expr).collect();
    check_scope(&values, &direct_scope(input), input)?;
    reject_aggregates(&values, "sort key")?;
    for value in &values {
        crate::types::capability::require(value.value_type()?, Method::SortKey)?;
    }
    Node::new(Op::SortBy {
        input: input.clone(),
        keys,
    })
}

pub fn limit(input: &NodeRef, n: u64, offset: u64) -> ExprResult<NodeRef> {
    input.relation_schema()?;
    Node::new(Op::Limit {
        input: input.clone(),
        n,
        offset,
    })
}

pub fn distinct(input: &NodeRef) -> ExprResult<NodeRef> {
    input.relation_schema()?;
    Node::new(Op::Distinct {
        input: input.clone(),
    })
}

pub fn join(
    kind: JoinKind,
    left: &NodeRef,
    right: &NodeRef,
    predicates: Vec<NodeRef>,
) -> ExprResult<NodeRef> {
    left.relation_schema()?;
    right.relation_schema()?;

    let left_scope = direct_scope(left);
    let right_scope = direct_scope(right);
    let left_ids: HashSet<NodeId> = left_scope.iter().map(|r| r.id()).collect();
    if let Some(shared) = right_scope.iter().find(|r| left_ids.contains(&r.id())) {
        return Err(ExprError::InvalidArgument(format!(
            "cannot join `{}` with itself; use view() for a self join",
            shared.label()
        )));
    }
    if kind == JoinKind::Cross && !predicates.is_empty() {
        return Err(ExprError::InvalidArgument(
            "cross join takes no predicates".into(),
        ));
    }

    let scope: Vec<NodeRef> = left_scope.into_iter().chain(right_scope).collect();
    let values: Vec<&NodeRef> = predicates.iter().collect();
    check_scope(&values, &scope, left)?;
    reject_aggregates(&values, "join predicate")?;

    Node::new(Op::Join {
        kind,
        left: left.clone(),
        right: right.clone(),
        predicates,
    })
}

pub fn union(left: &NodeRef, right: &NodeRef, distinct: bool) -> ExprResult<NodeRef> {
    left.relation_schema()?;
    right.relation_schema()?;
    Node::new(Op::Union {
        left: left.clone(),
        right: right.clone(),
        distinct,
    })
}

// =============================================================================
// Value constructors
// =============================================================================

pub fn field(table: &NodeRef, name: &str) -> ExprResult<NodeRef> {
    table.relation_schema()?.lookup(name)?;
    Node::new(Op::Field {
        table: table.clone(),
        name: name.to_string(),
    })
}

/// A literal. Without an explicit type the narrowest natural type is used.
pub fn literal(value: Datum, dtype: Option<DataType>) -> ExprResult<NodeRef> {
    let dtype = super::typing::literal_type(&value, dtype)?;
    Node::new(Op::Literal { value, dtype })
}

pub fn binary(op: BinaryOp, left: &NodeRef, right: &NodeRef) -> ExprResult<NodeRef> {
    Node::new(Op::Binary {
        op,
        left: left.clone(),
        right: right.clone(),
    })
}

pub fn not(arg: &NodeRef) -> ExprResult<NodeRef> {
    Node::new(Op::Not { arg: arg.clone() })
}

pub fn negate(arg: &NodeRef) -> ExprResult<NodeRef> {
    Node::new(Op::Negate { arg: arg.clone() })
}

pub fn cast(arg: &NodeRef, to: DataType) -> ExprResult<NodeRef> {
    Node::new(Op::Cast {
        arg: arg.clone(),
        to,
    })
}

pub fn is_null(arg: &NodeRef) -> ExprResult<NodeRef> {
    Node::new(Op::IsNull { arg: arg.clone() })
}

pub fn not_null(arg: &NodeRef) -> ExprResult<NodeRef> {
    Node::new(Op::NotNull { arg: arg.clone() })
}

pub fn simple_case(
    base: &NodeRef,
    cases: Vec<(NodeRef, NodeRef)>,
    default: Option<NodeRef>,
) -> ExprResult<NodeRef> {
    Node::new(Op::SimpleCase {
        base: base.clone(),
        cases,
        default,
    })
}

pub fn searched_case(
    cases: Vec<(NodeRef, NodeRef)>,
    default: Option<NodeRef>,
) -> ExprResult<NodeRef> {
    Node::new(Op::SearchedCase { cases, default })
}

pub fn in_values(arg: &NodeRef, options: Vec<NodeRef>, negated: bool) -> ExprResult<NodeRef> {
    Node::new(Op::InValues {
        arg: arg.clone(),
        options,
        negated,
    })
}

/// Membership of `arg` in the values of `column`.
///
/// `column` must come from exactly one relation, and that relation must not
/// be a plain row-wise derivation of the receiver's relation (or the other
/// way round): such a test compares a row with its own table and is
/// rejected. Relations separated by an aggregation, join or union are
/// independent and allowed.
pub fn in_column(arg: &NodeRef, column: &NodeRef, negated: bool) -> ExprResult<NodeRef> {
    column.value_type()?;
    if column.shape() != Some(Shape::Columnar) || is_aggregate(column) {
        return Err(ExprError::InvalidMembership(format!(
            "`{}` is not a column",
            describe(column)
        )));
    }
    let sources = referenced_tables(column);
    let source = match sources.as_slice() {
        [single] => single,
        [] => {
            return Err(ExprError::InvalidMembership(format!(
                "`{}` does not belong to any table",
                describe(column)
            )))
        }
        _ => {
            return Err(ExprError::InvalidMembership(format!(
                "`{}` reads from more than one table",
                describe(column)
            )))
        }
    };
    for table in referenced_tables(arg) {
        if lineage::passes_through(source, &table) || lineage::passes_through(&table, source) {
            return Err(ExprError::InvalidMembership(format!(
                "`{}` comes from the same relation `{}` as the tested value",
                describe(column),
                source.label()
            )));
        }
    }
    Node::new(Op::InColumn {
        arg: arg.clone(),
        column: column.clone(),
        negated,
    })
}

pub fn coalesce(args: Vec<NodeRef>) -> ExprResult<NodeRef> {
    Node::new(Op::Coalesce { args })
}

pub fn string(func: StringFunc, args: Vec<NodeRef>) -> ExprResult<NodeRef> {
    Node::new(Op::String { func, args })
}

pub fn extract(arg: &NodeRef, unit: TemporalUnit) -> ExprResult<NodeRef> {
    Node::new(Op::ExtractField {
        arg: arg.clone(),
        unit,
    })
}

pub fn reduction(func: ReductionFunc, arg: &NodeRef) -> ExprResult<NodeRef> {
    Node::new(Op::Reduction {
        func,
        arg: arg.clone(),
    })
}

pub fn count_star(table: &NodeRef) -> ExprResult<NodeRef> {
    table.relation_schema()?;
    Node::new(Op::CountStar {
        table: table.clone(),
    })
}

pub fn bucket(arg: &NodeRef, spec: BucketSpec) -> ExprResult<NodeRef> {
    Node::new(Op::Bucket {
        arg: arg.clone(),
        spec,
    })
}

/// Equal-width bins of `arg`, which must read from exactly one table. The
/// bounds the options need are built as aggregations over that table.
pub fn histogram(arg: &NodeRef, spec: HistogramSpec) -> ExprResult<NodeRef> {
    let table = match referenced_tables(arg).as_slice() {
        [table] => table.clone(),
        _ => {
            return Err(ExprError::InvalidArgument(format!(
                "histogram requires a value of exactly one table, got `{}`",
                describe(arg)
            )))
        }
    };
    if is_aggregate(arg) {
        return Err(ExprError::ShapeMismatch {
            context: "histogram".into(),
            message: format!("`{}` is a reduction", describe(arg)),
        });
    }
    let bound = |func: ReductionFunc| -> ExprResult<NodeRef> {
        let value = reduction(func, arg)?;
        aggregation(&table, vec![], vec![(func.name().to_lowercase(), value)])
    };
    let min = if spec.needs_min() {
        Some(bound(ReductionFunc::Min)?)
    } else {
        None
    };
    let max = if spec.needs_max() {
        Some(bound(ReductionFunc::Max)?)
    } else {
        None
    };
    Node::new(Op::Histogram {
        arg: arg.clone(),
        spec,
        min,
        max,
    })
}
