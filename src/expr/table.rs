//! Table expressions.

use crate::backend::{BackendResult, Connection, ResultSet};
use crate::compile::{CompileOptions, CompileResult, CompiledQuery, Compiler};
use crate::error::{ExprError, ExprResult};
use crate::ir::{ops, JoinKind, NodeRef, SortKey};
use crate::lineage::Dereference;
use crate::schema::Schema;
use crate::sql::Dialect;
use crate::types::IntoDataType;

use super::column::Column;

static EMPTY_SCHEMA: Schema = Schema::empty();

/// A table-valued expression.
#[derive(Debug, Clone)]
pub struct Table {
    node: NodeRef,
}

/// Declare an unbound table with the given fields.
///
/// ```ignore
/// let t = tabula::table("events", [("id", "int64"), ("at", "timestamp")])?;
/// ```
pub fn table<I, N, T>(name: &str, fields: I) -> ExprResult<Table>
where
    I: IntoIterator<Item = (N, T)>,
    N: Into<String>,
    T: IntoDataType,
{
    let schema = Schema::from_pairs(fields)?;
    Table::from_relation(ops::table_scan(name, schema)?)
}

impl Table {
    /// Wrap a table-valued node built elsewhere.
    pub fn from_relation(node: NodeRef) -> ExprResult<Self> {
        node.relation_schema()?;
        Ok(Self { node })
    }

    /// A table over a known schema, e.g. one introspected from a backend.
    pub fn from_schema(name: &str, schema: Schema) -> ExprResult<Self> {
        Self::from_relation(ops::table_scan(name, schema)?)
    }

    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    pub fn schema(&self) -> &Schema {
        self.node.schema().unwrap_or(&EMPTY_SCHEMA)
    }

    pub fn columns(&self) -> Vec<String> {
        self.schema().names().into_iter().map(String::from).collect()
    }

    /// Column by name. Fails with `UnknownColumn`, or `AmbiguousColumn`
    /// for a name that both sides of a join carry.
    pub fn col(&self, name: &str) -> ExprResult<Column> {
        Ok(Column::from_node(ops::field(&self.node, name)?))
    }

    /// Number of rows, as a reduction.
    pub fn count(&self) -> ExprResult<Column> {
        Ok(Column::from_node(ops::count_star(&self.node)?).name("count"))
    }

    pub fn equals(&self, other: &Table) -> bool {
        self.node.id() == other.node.id()
    }

    fn wrap(&self, node: NodeRef) -> ExprResult<Table> {
        Table::from_relation(node)
    }

    /// Rewrite values taken from ancestors of this table onto its columns.
    fn bind(&self, values: Vec<Column>) -> ExprResult<Vec<(String, NodeRef)>> {
        let deref = Dereference::of(&self.node)?;
        values
            .into_iter()
            .map(|c| Ok((c.get_name(), deref.apply(c.node())?)))
            .collect()
    }

    fn resolve<S: IntoSelection>(
        &self,
        items: impl IntoIterator<Item = S>,
    ) -> ExprResult<Vec<Column>> {
        items.into_iter().map(|item| item.into_selection(self)).collect()
    }

    // ------------------------------------------------------------------
    // Relational operations
    // ------------------------------------------------------------------

    /// Project onto `items`. When every item is a reduction the result is
    /// a one-row aggregation instead.
    pub fn select<S: IntoSelection>(&self, items: impl IntoIterator<Item = S>) -> ExprResult<Table> {
        let columns = self.resolve(items)?;
        if columns.is_empty() {
            return Err(ExprError::InvalidArgument(
                "select requires at least one column".into(),
            ));
        }
        if columns.iter().all(Column::is_reduction) {
            return self.aggregate(columns, []);
        }
        let columns = self.bind(columns)?;
        self.wrap(ops::projection(&self.node, columns)?)
    }

    /// Add columns, replacing existing ones of the same name in place.
    pub fn mutate(&self, items: impl IntoIterator<Item = Column>) -> ExprResult<Table> {
        let mut columns: Vec<(String, NodeRef)> = self
            .schema()
            .names()
            .into_iter()
            .map(|name| Ok((name.to_string(), ops::field(&self.node, name)?)))
            .collect::<ExprResult<_>>()?;

        for (name, value) in self.bind(items.into_iter().collect())? {
            match columns.iter_mut().find(|(n, _)| *n == name) {
                Some(slot) => slot.1 = value,
                None => columns.push((name, value)),
            }
        }
        self.wrap(ops::projection(&self.node, columns)?)
    }

    /// Keep rows where every predicate is true.
    pub fn filter(&self, predicates: impl IntoIterator<Item = Column>) -> ExprResult<Table> {
        let predicates = self
            .bind(predicates.into_iter().collect())?
            .into_iter()
            .map(|(_, p)| p)
            .collect();
        self.wrap(ops::filter(&self.node, predicates)?)
    }

    /// Reduce with `metrics`, grouped by `by`.
    pub fn aggregate(
        &self,
        metrics: impl IntoIterator<Item = Column>,
        by: impl IntoIterator<Item = Column>,
    ) -> ExprResult<Table> {
        let by = self.bind(by.into_iter().collect())?;
        let metrics = self.bind(metrics.into_iter().collect())?;
        self.wrap(ops::aggregation(&self.node, by, metrics)?)
    }

    pub fn group_by<S: IntoSelection>(
        &self,
        keys: impl IntoIterator<Item = S>,
    ) -> ExprResult<GroupedTable> {
        let by = self.resolve(keys)?;
        if by.is_empty() {
            return Err(ExprError::InvalidArgument(
                "group_by requires at least one key".into(),
            ));
        }
        Ok(GroupedTable {
            table: self.clone(),
            by,
        })
    }

    pub fn sort_by<K: IntoSortKey>(&self, keys: impl IntoIterator<Item = K>) -> ExprResult<Table> {
        let deref = Dereference::of(&self.node)?;
        let keys = keys
            .into_iter()
            .map(|key| {
                let (column, ascending) = key.into_sort_key(self)?;
                Ok(SortKey {
                    expr: deref.apply(column.node())?,
                    ascending,
                })
            })
            .collect::<ExprResult<Vec<_>>>()?;
        self.wrap(ops::sort_by(&self.node, keys)?)
    }

    pub fn limit(&self, n: u64) -> ExprResult<Table> {
        self.limit_offset(n, 0)
    }

    pub fn limit_offset(&self, n: u64, offset: u64) -> ExprResult<Table> {
        self.wrap(ops::limit(&self.node, n, offset)?)
    }

    /// First `n` rows.
    pub fn head(&self, n: u64) -> ExprResult<Table> {
        self.limit(n)
    }

    pub fn distinct(&self) -> ExprResult<Table> {
        self.wrap(ops::distinct(&self.node)?)
    }

    // ------------------------------------------------------------------
    // Joins and set operations
    // ------------------------------------------------------------------

    pub fn join(
        &self,
        other: &Table,
        predicates: impl IntoIterator<Item = Column>,
        kind: JoinKind,
    ) -> ExprResult<Table> {
        let left = Dereference::of(&self.node)?;
        let right = Dereference::of(&other.node)?;
        let predicates = predicates
            .into_iter()
            .map(|p| right.apply(&left.apply(p.node())?))
            .collect::<ExprResult<Vec<_>>>()?;
        self.wrap(ops::join(kind, &self.node, &other.node, predicates)?)
    }

    pub fn inner_join(
        &self,
        other: &Table,
        predicates: impl IntoIterator<Item = Column>,
    ) -> ExprResult<Table> {
        self.join(other, predicates, JoinKind::Inner)
    }

    pub fn left_join(
        &self,
        other: &Table,
        predicates: impl IntoIterator<Item = Column>,
    ) -> ExprResult<Table> {
        self.join(other, predicates, JoinKind::Left)
    }

    pub fn right_join(
        &self,
        other: &Table,
        predicates: impl IntoIterator<Item = Column>,
    ) -> ExprResult<Table> {
        self.join(other, predicates, JoinKind::Right)
    }

    pub fn outer_join(
        &self,
        other: &Table,
        predicates: impl IntoIterator<Item = Column>,
    ) -> ExprResult<Table> {
        self.join(other, predicates, JoinKind::Outer)
    }

    pub fn cross_join(&self, other: &Table) -> ExprResult<Table> {
        self.join(other, [], JoinKind::Cross)
    }

    /// Rows of both tables; `distinct` removes duplicates.
    pub fn union(&self, other: &Table, distinct: bool) -> ExprResult<Table> {
        self.wrap(ops::union(&self.node, &other.node, distinct)?)
    }

    /// An independent reference to this table, for self joins.
    ///
    /// The result depends only on this table, so two calls give equal
    /// tables. Use [`view_as`](Table::view_as) for several independent
    /// references, or take a view of a view.
    pub fn view(&self) -> ExprResult<Table> {
        self.view_as("view")
    }

    /// An independent reference to this table, distinct from references
    /// with other tags.
    pub fn view_as(&self, tag: &str) -> ExprResult<Table> {
        self.wrap(ops::self_reference(&self.node, tag)?)
    }

    // ------------------------------------------------------------------
    // Compilation and execution
    // ------------------------------------------------------------------

    pub fn compile(&self, dialect: Dialect) -> CompileResult<CompiledQuery> {
        self.compile_with(&CompileOptions::default().with_dialect(dialect))
    }

    pub fn compile_with(&self, options: &CompileOptions) -> CompileResult<CompiledQuery> {
        Compiler::new(options.clone()).compile(&self.node)
    }

    pub async fn execute(&self, conn: &Connection) -> BackendResult<ResultSet> {
        conn.execute(self).await
    }
}

/// A table with pending group keys.
#[derive(Debug, Clone)]
pub struct GroupedTable {
    table: Table,
    by: Vec<Column>,
}

impl GroupedTable {
    pub fn aggregate(&self, metrics: impl IntoIterator<Item = Column>) -> ExprResult<Table> {
        self.table.aggregate(metrics, self.by.clone())
    }

    /// Row count per group, in a column named `count`.
    pub fn count(&self) -> ExprResult<Table> {
        self.aggregate([self.table.count()?])
    }
}

// ============================================================================
// Conversions
// ============================================================================

/// An item of `select` or `group_by`: a column name or a value.
pub trait IntoSelection {
    fn into_selection(self, table: &Table) -> ExprResult<Column>;
}

impl IntoSelection for &str {
    fn into_selection(self, table: &Table) -> ExprResult<Column> {
        table.col(self)
    }
}

impl IntoSelection for String {
    fn into_selection(self, table: &Table) -> ExprResult<Column> {
        table.col(&self)
    }
}

impl IntoSelection for Column {
    fn into_selection(self, _table: &Table) -> ExprResult<Column> {
        Ok(self)
    }
}

impl IntoSelection for &Column {
    fn into_selection(self, _table: &Table) -> ExprResult<Column> {
        Ok(self.clone())
    }
}

/// A sort key: a column name or value, ascending unless paired with
/// `false`.
pub trait IntoSortKey {
    fn into_sort_key(self, table: &Table) -> ExprResult<(Column, bool)>;
}

impl IntoSortKey for &str {
    fn into_sort_key(self, table: &Table) -> ExprResult<(Column, bool)> {
        Ok((table.col(self)?, true))
    }
}

impl IntoSortKey for Column {
    fn into_sort_key(self, _table: &Table) -> ExprResult<(Column, bool)> {
        Ok((self, true))
    }
}

impl IntoSortKey for (&str, bool) {
    fn into_sort_key(self, table: &Table) -> ExprResult<(Column, bool)> {
        Ok((table.col(self.0)?, self.1))
    }
}

impl IntoSortKey for (Column, bool) {
    fn into_sort_key(self, _table: &Table) -> ExprResult<(Column, bool)> {
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    fn countries() -> Table {
        table(
            "countries",
            [
                ("name", "string"),
                ("continent", "string"),
                ("population", "int64"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_select_by_name_and_value() {
        let t = countries();
        let doubled = t.col("population").unwrap().mul(2).unwrap().name("pop2");
        let p = t.select([t.col("name").unwrap(), doubled]).unwrap();
        assert_eq!(p.columns(), vec!["name", "pop2"]);
        assert_eq!(p.schema().lookup("pop2").unwrap().1, &DataType::INT64);
    }

    #[test]
    fn test_select_of_reductions_aggregates() {
        let t = countries();
        let total = t.col("population").unwrap().sum().unwrap().name("total");
        let agg = t.select([total]).unwrap();
        assert!(matches!(agg.node().op(), crate::ir::Op::Aggregation { .. }));
    }

    #[test]
    fn test_select_mixed_shapes_rejected() {
        let t = countries();
        let total = t.col("population").unwrap().sum().unwrap();
        let err = t.select([t.col("name").unwrap(), total]).unwrap_err();
        assert!(matches!(err, ExprError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_unknown_column() {
        let err = countries().col("nope").unwrap_err();
        assert!(matches!(err, ExprError::UnknownColumn { .. }));
    }

    #[test]
    fn test_filter_then_select_dereferences() {
        let t = countries();
        let big = t.filter([t.col("population").unwrap().gt(1000).unwrap()]).unwrap();
        let p = big.select([t.col("name").unwrap()]).unwrap();
        let crate::ir::Op::Projection { columns, .. } = p.node().op() else {
            panic!("expected a projection");
        };
        let tables = ops::referenced_tables(&columns[0].1);
        assert_eq!(tables[0].id(), big.node().id());
        assert_eq!(p.columns(), vec!["name"]);
    }

    #[test]
    fn test_unrelated_column_unbound() {
        let t = countries();
        let other = table("other", [("x", "int64")]).unwrap();
        let err = t.select([other.col("x").unwrap()]).unwrap_err();
        assert!(matches!(err, ExprError::UnboundColumn { .. }));
    }

    #[test]
    fn test_mutate_replaces_in_place() {
        let t = countries();
        let upper = t.col("name").unwrap().upper().unwrap().name("name");
        let m = t.mutate([upper]).unwrap();
        assert_eq!(m.columns(), vec!["name", "continent", "population"]);
    }

    #[test]
    fn test_group_by_count() {
        let t = countries();
        let counts = t.group_by(["continent"]).unwrap().count().unwrap();
        assert_eq!(counts.columns(), vec!["continent", "count"]);
    }

    #[test]
    fn test_join_schema_and_ambiguity() {
        let t = countries();
        let u = table("capitals", [("name", "string"), ("capital", "string")]).unwrap();
        let pred = t.col("name").unwrap().eq(u.col("name").unwrap()).unwrap();
        let j = t.inner_join(&u, [pred]).unwrap();
        assert_eq!(j.schema().len(), 5);
        assert!(matches!(
            j.col("name").unwrap_err(),
            ExprError::AmbiguousColumn(_)
        ));
        assert!(j.col("capital").is_ok());
    }

    #[test]
    fn test_view_is_distinct_relation() {
        let t = countries();
        let v = t.view().unwrap();
        assert!(!v.equals(&t));
        assert_eq!(v.columns(), t.columns());
    }

    #[test]
    fn test_union_requires_same_names() {
        let t = countries();
        let u = table("u", [("x", "int64")]).unwrap();
        assert!(t.union(&u, false).is_err());
        assert_eq!(t.union(&t, true).unwrap().columns(), t.columns());
    }

    #[test]
    fn test_structural_equality() {
        let a = countries().limit(5).unwrap();
        let b = countries().limit(5).unwrap();
        assert!(a.equals(&b));
        assert!(!a.equals(&countries().limit(6).unwrap()));
    }
}
