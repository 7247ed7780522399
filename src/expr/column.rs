//! Value expressions.

use crate::backend::{BackendResult, Connection, ResultSet};
use crate::compile::{CompileOptions, CompileResult, CompiledQuery, Compiler};
use crate::error::{ExprError, ExprResult};
use crate::ir::{
    ops, BinaryOp, BucketOptions, BucketSpec, Datum, HistogramOptions, HistogramSpec, NodeRef, Op,
    ReductionFunc, Shape, StringFunc, TemporalUnit,
};
use crate::sql::Dialect;
use crate::types::{DataType, IntoDataType};

use super::case::SimpleCaseBuilder;
use super::table::Table;

static UNTYPED: DataType = DataType::Null;

/// A value expression: a column, a literal, or anything computed from them.
///
/// The optional display name only affects the output column name when the
/// value is selected; two columns with the same node but different names
/// are still [`equal`](Column::equals).
#[derive(Debug, Clone)]
pub struct Column {
    node: NodeRef,
    name: Option<String>,
}

impl Column {
    pub(crate) fn from_node(node: NodeRef) -> Self {
        Self { node, name: None }
    }

    /// Wrap a value node built elsewhere.
    pub fn from_value(node: NodeRef) -> ExprResult<Self> {
        node.value_type()?;
        Ok(Self::from_node(node))
    }

    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    pub fn dtype(&self) -> &DataType {
        self.node.dtype().unwrap_or(&UNTYPED)
    }

    pub fn shape(&self) -> Shape {
        self.node.shape().unwrap_or(Shape::Scalar)
    }

    /// Whether this value is a reduction over some table.
    pub fn is_reduction(&self) -> bool {
        ops::is_aggregate(&self.node)
    }

    /// Same value under a new output name.
    pub fn name(mut self, alias: impl Into<String>) -> Self {
        self.name = Some(alias.into());
        self
    }

    /// Output name: the alias if one was given, otherwise derived from the
    /// expression (`a`, `Add(a, 1)`, `'AF'`).
    pub fn get_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => derived_name(&self.node),
        }
    }

    /// Structural equality of the underlying expressions.
    pub fn equals(&self, other: &Column) -> bool {
        self.node.id() == other.node.id()
    }

    fn derive(&self, node: NodeRef) -> Column {
        Column::from_node(node)
    }

    fn binary(&self, op: BinaryOp, other: impl IntoColumn) -> ExprResult<Column> {
        let other = other.into_column()?;
        Ok(self.derive(ops::binary(op, &self.node, &other.node)?))
    }

    fn string(&self, func: StringFunc, rest: Vec<Column>) -> ExprResult<Column> {
        let mut args = vec![self.node.clone()];
        args.extend(rest.into_iter().map(|c| c.node));
        Ok(self.derive(ops::string(func, args)?))
    }

    fn extract(&self, unit: TemporalUnit) -> ExprResult<Column> {
        Ok(self.derive(ops::extract(&self.node, unit)?))
    }

    fn reduce(&self, func: ReductionFunc) -> ExprResult<Column> {
        Ok(self.derive(ops::reduction(func, &self.node)?))
    }

    // ------------------------------------------------------------------
    // Arithmetic, comparison, logic
    // ------------------------------------------------------------------

    pub fn add(&self, other: impl IntoColumn) -> ExprResult<Column> {
        self.binary(BinaryOp::Add, other)
    }

    pub fn sub(&self, other: impl IntoColumn) -> ExprResult<Column> {
        self.binary(BinaryOp::Subtract, other)
    }

    pub fn mul(&self, other: impl IntoColumn) -> ExprResult<Column> {
        self.binary(BinaryOp::Multiply, other)
    }

    /// True division; the result is floating point even for integers.
    pub fn div(&self, other: impl IntoColumn) -> ExprResult<Column> {
        self.binary(BinaryOp::Divide, other)
    }

    pub fn modulo(&self, other: impl IntoColumn) -> ExprResult<Column> {
        self.binary(BinaryOp::Modulo, other)
    }

    pub fn eq(&self, other: impl IntoColumn) -> ExprResult<Column> {
        self.binary(BinaryOp::Equals, other)
    }

    pub fn ne(&self, other: impl IntoColumn) -> ExprResult<Column> {
        self.binary(BinaryOp::NotEquals, other)
    }

    pub fn lt(&self, other: impl IntoColumn) -> ExprResult<Column> {
        self.binary(BinaryOp::Less, other)
    }

    pub fn le(&self, other: impl IntoColumn) -> ExprResult<Column> {
        self.binary(BinaryOp::LessEqual, other)
    }

    pub fn gt(&self, other: impl IntoColumn) -> ExprResult<Column> {
        self.binary(BinaryOp::Greater, other)
    }

    pub fn ge(&self, other: impl IntoColumn) -> ExprResult<Column> {
        self.binary(BinaryOp::GreaterEqual, other)
    }

    pub fn and(&self, other: impl IntoColumn) -> ExprResult<Column> {
        self.binary(BinaryOp::And, other)
    }

    pub fn or(&self, other: impl IntoColumn) -> ExprResult<Column> {
        self.binary(BinaryOp::Or, other)
    }

    pub fn not(&self) -> ExprResult<Column> {
        Ok(self.derive(ops::not(&self.node)?))
    }

    pub fn negate(&self) -> ExprResult<Column> {
        Ok(self.derive(ops::negate(&self.node)?))
    }

    // ------------------------------------------------------------------
    // Types and nulls
    // ------------------------------------------------------------------

    /// Explicit conversion. Fails with `InvalidCast` when the conversion
    /// is never valid, e.g. a struct to an integer.
    pub fn cast(&self, to: impl IntoDataType) -> ExprResult<Column> {
        Ok(self.derive(ops::cast(&self.node, to.into_data_type()?)?))
    }

    pub fn isnull(&self) -> ExprResult<Column> {
        Ok(self.derive(ops::is_null(&self.node)?))
    }

    pub fn notnull(&self) -> ExprResult<Column> {
        Ok(self.derive(ops::not_null(&self.node)?))
    }

    /// First non-null of this value and `others`.
    pub fn coalesce<I, T>(&self, others: I) -> ExprResult<Column>
    where
        I: IntoIterator<Item = T>,
        T: IntoColumn,
    {
        let mut args = vec![self.node.clone()];
        for other in others {
            args.push(other.into_column()?.node);
        }
        Ok(self.derive(ops::coalesce(args)?))
    }

    /// Replace NULL with `value`.
    pub fn fillna(&self, value: impl IntoColumn) -> ExprResult<Column> {
        self.coalesce([value])
    }

    // ------------------------------------------------------------------
    // Conditionals and membership
    // ------------------------------------------------------------------

    /// Start a simple CASE over this value.
    pub fn case(&self) -> SimpleCaseBuilder {
        SimpleCaseBuilder::new(self.clone())
    }

    /// `a` where this condition holds, `b` where it is false, NULL where it
    /// is NULL.
    pub fn ifelse(&self, a: impl IntoColumn, b: impl IntoColumn) -> ExprResult<Column> {
        let cond = &self.node;
        if !self.dtype().is_boolean() && !self.dtype().is_null() {
            return Err(ExprError::mismatch("ifelse", DataType::BOOLEAN, self.dtype()));
        }
        let negated = ops::not(cond)?;
        let cases = vec![
            (cond.clone(), a.into_column()?.node),
            (negated, b.into_column()?.node),
        ];
        Ok(self.derive(ops::searched_case(cases, None)?))
    }

    pub fn isin(&self, collection: impl IntoCollection) -> ExprResult<Column> {
        self.membership(collection.into_collection()?, false)
    }

    pub fn notin(&self, collection: impl IntoCollection) -> ExprResult<Column> {
        self.membership(collection.into_collection()?, true)
    }

    fn membership(&self, collection: Collection, negated: bool) -> ExprResult<Column> {
        let node = match collection {
            Collection::Values(values) => {
                let options = values.into_iter().map(|v| v.node).collect();
                ops::in_values(&self.node, options, negated)?
            }
            Collection::Column(column) => ops::in_column(&self.node, &column.node, negated)?,
        };
        Ok(self.derive(node))
    }

    // ------------------------------------------------------------------
    // Strings
    // ------------------------------------------------------------------

    pub fn lower(&self) -> ExprResult<Column> {
        self.string(StringFunc::Lowercase, vec![])
    }

    pub fn upper(&self) -> ExprResult<Column> {
        self.string(StringFunc::Uppercase, vec![])
    }

    pub fn length(&self) -> ExprResult<Column> {
        self.string(StringFunc::StringLength, vec![])
    }

    pub fn strip(&self) -> ExprResult<Column> {
        self.string(StringFunc::Strip, vec![])
    }

    pub fn left(&self, n: impl IntoColumn) -> ExprResult<Column> {
        self.string(StringFunc::StrLeft, vec![n.into_column()?])
    }

    pub fn right(&self, n: impl IntoColumn) -> ExprResult<Column> {
        self.string(StringFunc::StrRight, vec![n.into_column()?])
    }

    /// Substring from the 0-based `start`; without a length, to the end of
    /// the string.
    pub fn substr(&self, start: impl IntoColumn, length: Option<i64>) -> ExprResult<Column> {
        let start = start.into_column()?;
        let length = match length {
            Some(n) => n.into_column()?,
            None => self.length()?,
        };
        self.string(StringFunc::Substring, vec![start, length])
    }

    /// SQL `LIKE` with `%` and `_` wildcards.
    pub fn like(&self, pattern: impl IntoColumn) -> ExprResult<Column> {
        self.string(StringFunc::Like, vec![pattern.into_column()?])
    }

    /// Regular-expression search anywhere in the string.
    pub fn rlike(&self, pattern: impl IntoColumn) -> ExprResult<Column> {
        self.string(StringFunc::RegexSearch, vec![pattern.into_column()?])
    }

    pub fn contains(&self, needle: impl IntoColumn) -> ExprResult<Column> {
        self.string(StringFunc::StringContains, vec![needle.into_column()?])
    }

    pub fn startswith(&self, prefix: impl IntoColumn) -> ExprResult<Column> {
        self.string(StringFunc::StartsWith, vec![prefix.into_column()?])
    }

    pub fn endswith(&self, suffix: impl IntoColumn) -> ExprResult<Column> {
        self.string(StringFunc::EndsWith, vec![suffix.into_column()?])
    }

    pub fn concat(&self, other: impl IntoColumn) -> ExprResult<Column> {
        self.string(StringFunc::StringConcat, vec![other.into_column()?])
    }

    // ------------------------------------------------------------------
    // Temporal accessors
    // ------------------------------------------------------------------

    pub fn year(&self) -> ExprResult<Column> {
        self.extract(TemporalUnit::Year)
    }

    pub fn month(&self) -> ExprResult<Column> {
        self.extract(TemporalUnit::Month)
    }

    pub fn day(&self) -> ExprResult<Column> {
        self.extract(TemporalUnit::Day)
    }

    pub fn hour(&self) -> ExprResult<Column> {
        self.extract(TemporalUnit::Hour)
    }

    pub fn minute(&self) -> ExprResult<Column> {
        self.extract(TemporalUnit::Minute)
    }

    pub fn second(&self) -> ExprResult<Column> {
        self.extract(TemporalUnit::Second)
    }

    pub fn millisecond(&self) -> ExprResult<Column> {
        self.extract(TemporalUnit::Millisecond)
    }

    // ------------------------------------------------------------------
    // Reductions
    // ------------------------------------------------------------------

    /// Number of non-null values.
    pub fn count(&self) -> ExprResult<Column> {
        self.reduce(ReductionFunc::Count)
    }

    pub fn sum(&self) -> ExprResult<Column> {
        self.reduce(ReductionFunc::Sum)
    }

    pub fn mean(&self) -> ExprResult<Column> {
        self.reduce(ReductionFunc::Mean)
    }

    pub fn min(&self) -> ExprResult<Column> {
        self.reduce(ReductionFunc::Min)
    }

    pub fn max(&self) -> ExprResult<Column> {
        self.reduce(ReductionFunc::Max)
    }

    /// Number of distinct non-null values.
    pub fn nunique(&self) -> ExprResult<Column> {
        self.reduce(ReductionFunc::CountDistinct)
    }

    // ------------------------------------------------------------------
    // Table-valued helpers
    // ------------------------------------------------------------------

    /// The single table this value reads from.
    fn source(&self, context: &str) -> ExprResult<Table> {
        let tables = ops::referenced_tables(&self.node);
        match tables.as_slice() {
            [table] => Table::from_relation(table.clone()),
            [] => Err(ExprError::InvalidArgument(format!(
                "{} requires a value that reads from a table, got `{}`",
                context,
                self.get_name()
            ))),
            _ => Err(ExprError::InvalidArgument(format!(
                "{} requires a value that reads from one table, `{}` reads from {}",
                context,
                self.get_name(),
                tables.len()
            ))),
        }
    }

    /// Occurrences of each value, as a table of `(<name>, count)`. A value
    /// itself named `count` gets its counts in `count_count`.
    pub fn value_counts(&self) -> ExprResult<Table> {
        let table = self.source("value_counts")?;
        table
            .group_by([self.clone()])?
            .aggregate([table.count()?.name(self.count_name())])
    }

    /// The `n` most frequent values with their counts.
    pub fn topk(&self, n: u64) -> ExprResult<Table> {
        let count = self.count_name();
        self.value_counts()?
            .sort_by([(count.as_str(), false)])?
            .limit(n)
    }

    fn count_name(&self) -> String {
        match self.get_name() {
            name if name == "count" => format!("{}_count", name),
            _ => "count".to_string(),
        }
    }

    /// The `n` values with the largest `metric`.
    pub fn topk_by(&self, n: u64, metric: Column) -> ExprResult<Table> {
        let table = self.source("topk_by")?;
        let metric_name = metric.get_name();
        table
            .group_by([self.clone()])?
            .aggregate([metric])?
            .sort_by([(metric_name.as_str(), false)])?
            .limit(n)
    }

    /// Distinct values, as a one-column table.
    pub fn distinct(&self) -> ExprResult<Table> {
        let table = self.source("distinct")?;
        table.select([self.clone()])?.distinct()
    }

    /// Discretize into numbered intervals delimited by `edges`.
    pub fn bucket<I, T>(&self, edges: I, options: BucketOptions) -> ExprResult<Column>
    where
        I: IntoIterator<Item = T>,
        T: Into<Datum>,
    {
        let spec = BucketSpec::new(edges.into_iter().map(Into::into).collect(), options)?;
        Ok(self.derive(ops::bucket(&self.node, spec)?))
    }

    /// Equal-width bin number of each value, starting at 0 for the bin whose
    /// left edge is `base` (the column minimum when unset).
    ///
    /// With `nbins` the width is `(max - base) / nbins` and the extreme value
    /// on the open side falls in the outermost bin.
    pub fn histogram(&self, options: HistogramOptions) -> ExprResult<Column> {
        let spec = HistogramSpec::new(options)?;
        Ok(self.derive(ops::histogram(&self.node, spec)?))
    }

    /// Number of buckets when this value is a [`bucket`](Column::bucket).
    pub fn bucket_count(&self) -> Option<usize> {
        match self.node.op() {
            Op::Bucket { spec, .. } => Some(spec.bucket_count()),
            _ => None,
        }
    }

    /// One-column table holding this value: a projection over its table, an
    /// aggregation when the value is a reduction.
    pub fn to_table(&self) -> ExprResult<Table> {
        self.source("to_table")?.select([self.clone()])
    }

    // ------------------------------------------------------------------
    // Compilation and execution
    // ------------------------------------------------------------------

    pub fn compile(&self, dialect: Dialect) -> CompileResult<CompiledQuery> {
        self.compile_with(&CompileOptions::default().with_dialect(dialect))
    }

    /// Compile as a one-column query. A value that reads from no table
    /// compiles to a `SELECT` without `FROM`.
    pub fn compile_with(&self, options: &CompileOptions) -> CompileResult<CompiledQuery> {
        let compiler = Compiler::new(options.clone());
        if ops::referenced_tables(&self.node).is_empty() {
            return compiler.compile_constant(&self.node, &self.get_name());
        }
        let table = self.to_table()?;
        compiler.compile(table.node())
    }

    pub async fn execute(&self, conn: &Connection) -> BackendResult<ResultSet> {
        let compiled = self.compile(conn.dialect())?;
        conn.run(&compiled).await
    }
}

/// Name derived from the shape of an expression.
fn derived_name(node: &NodeRef) -> String {
    match node.op() {
        Op::Field { name, .. } => name.clone(),
        Op::Literal { value, .. } => value.to_string(),
        Op::CountStar { table } => format!("CountStar({})", table.label()),
        op => {
            let args: Vec<String> = op.args().into_iter().map(derived_name).collect();
            format!("{}({})", op.tag(), args.join(", "))
        }
    }
}

// ============================================================================
// Conversions
// ============================================================================

/// Anything usable where a value is expected. Plain Rust values become
/// literals.
pub trait IntoColumn {
    fn into_column(self) -> ExprResult<Column>;
}

impl IntoColumn for Column {
    fn into_column(self) -> ExprResult<Column> {
        Ok(self)
    }
}

impl IntoColumn for &Column {
    fn into_column(self) -> ExprResult<Column> {
        Ok(self.clone())
    }
}

impl IntoColumn for Datum {
    fn into_column(self) -> ExprResult<Column> {
        super::lit(self)
    }
}

macro_rules! literal_into_column {
    ($($ty:ty),*) => {
        $(
            impl IntoColumn for $ty {
                fn into_column(self) -> ExprResult<Column> {
                    super::lit(self)
                }
            }
        )*
    };
}

literal_into_column!(i64, i32, f64, bool, &str, String);

/// Right-hand side of a membership test.
#[derive(Debug, Clone)]
pub enum Collection {
    /// Literals or scalar expressions: `IN (a, b, ...)`.
    Values(Vec<Column>),
    /// A column of another relation: `IN (SELECT col FROM ...)`.
    Column(Column),
}

pub trait IntoCollection {
    fn into_collection(self) -> ExprResult<Collection>;
}

impl IntoCollection for Collection {
    fn into_collection(self) -> ExprResult<Collection> {
        Ok(self)
    }
}

impl IntoCollection for Column {
    fn into_collection(self) -> ExprResult<Collection> {
        Ok(Collection::Column(self))
    }
}

impl IntoCollection for &Column {
    fn into_collection(self) -> ExprResult<Collection> {
        Ok(Collection::Column(self.clone()))
    }
}

impl<T: IntoColumn> IntoCollection for Vec<T> {
    fn into_collection(self) -> ExprResult<Collection> {
        let values = self
            .into_iter()
            .map(IntoColumn::into_column)
            .collect::<ExprResult<Vec<_>>>()?;
        Ok(Collection::Values(values))
    }
}

impl<T: IntoColumn, const N: usize> IntoCollection for [T; N] {
    fn into_collection(self) -> ExprResult<Collection> {
        Vec::from(self).into_collection()
    }
}
