//! SELECT / UNION statements assembled by the lowering pass.
//!
//! Layout is fixed: one clause per line, select items indented by two
//! spaces, derived tables and CTE bodies opened on their own line.

use super::dialect::{Dialect, SqlDialect};
use super::expr::Expr;
use super::token::{Token, TokenStream};

/// One SELECT list item.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct SelectExpr {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl SelectExpr {
    pub fn new(expr: Expr) -> Self {
        Self { expr, alias: None }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.into());
        self
    }

    fn write_tokens(&self, ts: &mut TokenStream, dialect: Dialect) {
        self.expr.write_tokens(ts, dialect);
        if let Some(alias) = &self.alias {
            write_alias(ts, alias);
        }
    }
}

impl From<Expr> for SelectExpr {
    fn from(expr: Expr) -> Self {
        SelectExpr::new(expr)
    }
}

/// What a FROM or JOIN item reads: a base table, a CTE, or a derived table.
#[derive(Debug, Clone, PartialEq)]
pub enum TableSource {
    Named(String),
    Subquery(Box<Query>),
}

#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct TableRef {
    pub source: TableSource,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn new(table: &str) -> Self {
        Self {
            source: TableSource::Named(table.into()),
            alias: None,
        }
    }

    pub fn subquery(query: Query) -> Self {
        Self {
            source: TableSource::Subquery(Box::new(query)),
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.into());
        self
    }

    fn write_tokens(&self, ts: &mut TokenStream, dialect: Dialect) {
        match &self.source {
            TableSource::Named(table) => {
                ts.push(Token::Ident(table.clone()));
            }
            TableSource::Subquery(query) => write_block(ts, query, dialect),
        }
        if let Some(alias) = &self.alias {
            write_alias(ts, alias);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub table: TableRef,
    pub on: Option<Expr>,
}

impl Join {
    fn write_tokens(&self, ts: &mut TokenStream, dialect: Dialect) {
        match self.join_type {
            JoinType::Inner => ts.push(Token::Inner),
            JoinType::Left => ts.push(Token::Left),
            JoinType::Right => ts.push(Token::Right),
            JoinType::Full => ts.push(Token::Full).space().push(Token::Outer),
            JoinType::Cross => ts.push(Token::Cross),
        };
        ts.space().push(Token::Join).space();
        self.table.write_tokens(ts, dialect);

        if let Some(on) = &self.on {
            ts.space().push(Token::On).space();
            on.write_tokens(ts, dialect);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct OrderByExpr {
    pub expr: Expr,
    pub descending: bool,
}

impl OrderByExpr {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            descending: false,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            descending: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LimitOffset {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// `left UNION [ALL] right`.
#[derive(Debug, Clone, PartialEq)]
pub struct SetOperation {
    pub left: Box<Query>,
    pub all: bool,
    pub right: Box<Query>,
}

impl SetOperation {
    pub fn union(left: Query, right: Query) -> Self {
        Self {
            left: Box::new(left),
            all: false,
            right: Box::new(right),
        }
    }

    pub fn union_all(left: Query, right: Query) -> Self {
        Self {
            all: true,
            ..Self::union(left, right)
        }
    }

    fn write_tokens(&self, ts: &mut TokenStream, dialect: Dialect) {
        let parens = dialect.supports_parenthesized_set_operands();
        write_set_operand(ts, &self.left, parens, dialect);
        ts.newline().push(Token::Union);
        if self.all {
            ts.space().push(Token::All);
        }
        ts.newline();
        write_set_operand(ts, &self.right, parens, dialect);
    }
}

fn write_set_operand(ts: &mut TokenStream, query: &Query, parens: bool, dialect: Dialect) {
    let wrap = parens && query.set_op.is_none();
    if wrap {
        ts.lparen();
    }
    query.write_tokens(ts, dialect);
    if wrap {
        ts.rparen();
    }
}

/// A named subquery in the WITH clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub name: String,
    pub query: Box<Query>,
}

impl Cte {
    pub fn new(name: &str, query: Query) -> Self {
        Self {
            name: name.into(),
            query: Box::new(query),
        }
    }
}

/// A SELECT statement, or a set operation when `set_op` is present.
///
/// CTEs only ever sit on the outermost query.
#[derive(Debug, Clone, Default, PartialEq)]
#[must_use = "Query has no effect until rendered with to_sql()"]
pub struct Query {
    pub with: Vec<Cte>,
    pub select: Vec<SelectExpr>,
    pub distinct: bool,
    pub from: Option<TableRef>,
    pub joins: Vec<Join>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub order_by: Vec<OrderByExpr>,
    pub limit_offset: Option<LimitOffset>,
    pub set_op: Option<Box<SetOperation>>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_operation(op: SetOperation) -> Self {
        Self {
            set_op: Some(Box::new(op)),
            ..Default::default()
        }
    }

    pub fn with_cte(mut self, cte: Cte) -> Self {
        self.with.push(cte);
        self
    }

    pub fn select(mut self, items: Vec<SelectExpr>) -> Self {
        self.select = items;
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn from(mut self, table: TableRef) -> Self {
        self.from = Some(table);
        self
    }

    pub fn join(mut self, join_type: JoinType, table: TableRef, on: Option<Expr>) -> Self {
        self.joins.push(Join {
            join_type,
            table,
            on,
        });
        self
    }

    /// AND a condition onto the WHERE clause.
    pub fn filter(mut self, condition: Expr) -> Self {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit_offset.get_or_insert_with(LimitOffset::default).limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.limit_offset.get_or_insert_with(LimitOffset::default).offset = Some(offset);
        self
    }

    pub fn to_sql(&self, dialect: Dialect) -> String {
        let mut ts = TokenStream::new();
        self.write_tokens(&mut ts, dialect);
        ts.serialize(dialect)
    }

    pub(crate) fn write_tokens(&self, ts: &mut TokenStream, dialect: Dialect) {
        if !self.with.is_empty() {
            ts.push(Token::With).space();
            for (i, cte) in self.with.iter().enumerate() {
                if i > 0 {
                    ts.comma().newline();
                }
                ts.push(Token::Ident(cte.name.clone()))
                    .space()
                    .push(Token::As)
                    .space();
                write_block(ts, &cte.query, dialect);
            }
            ts.newline();
        }

        if let Some(set_op) = &self.set_op {
            set_op.write_tokens(ts, dialect);
            return;
        }

        ts.push(Token::Select);
        if self.distinct {
            ts.space().push(Token::Distinct);
        }
        for (i, item) in self.select.iter().enumerate() {
            if i > 0 {
                ts.comma();
            }
            ts.newline().indent(1);
            item.write_tokens(ts, dialect);
        }

        if let Some(from) = &self.from {
            ts.newline().push(Token::From).space();
            from.write_tokens(ts, dialect);
        }
        for join in &self.joins {
            ts.newline();
            join.write_tokens(ts, dialect);
        }

        if let Some(condition) = &self.where_clause {
            ts.newline().push(Token::Where).space();
            condition.write_tokens(ts, dialect);
        }

        if !self.group_by.is_empty() {
            ts.newline().push(Token::GroupBy).space();
            for (i, key) in self.group_by.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                key.write_tokens(ts, dialect);
            }
        }

        if !self.order_by.is_empty() {
            ts.newline().push(Token::OrderBy).space();
            for (i, key) in self.order_by.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                key.expr.write_tokens(ts, dialect);
                ts.space()
                    .push(if key.descending { Token::Desc } else { Token::Asc });
            }
        } else if self.limit_offset.is_some() && dialect.requires_order_by_for_offset() {
            // OFFSET/FETCH needs some ORDER BY; row order stays unspecified.
            ts.newline()
                .push(Token::OrderBy)
                .space()
                .lparen()
                .push(Token::Select)
                .space()
                .push(Token::Null)
                .rparen();
        }

        if let Some(page) = &self.limit_offset {
            ts.newline()
                .append(&dialect.emit_limit_offset(page.limit, page.offset));
        }
    }
}

fn write_alias(ts: &mut TokenStream, alias: &str) {
    ts.space()
        .push(Token::As)
        .space()
        .push(Token::Ident(alias.into()));
}

/// `(\n<query>\n)`
fn write_block(ts: &mut TokenStream, query: &Query, dialect: Dialect) {
    ts.lparen().newline();
    query.write_tokens(ts, dialect);
    ts.newline().rparen();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::expr::{count_star, lit_int, table_col, BinaryOperator};

    fn scan(table: &str, alias: &str) -> Query {
        Query::new().from(TableRef::new(table).with_alias(alias))
    }

    #[test]
    fn test_select_layout() {
        let query = scan("countries", "t0").select(vec![
            table_col("t0", "name").into(),
            SelectExpr::new(table_col("t0", "population")).with_alias("pop"),
        ]);
        assert_eq!(
            query.to_sql(Dialect::TSql),
            "SELECT\n  [t0].[name],\n  [t0].[population] AS [pop]\nFROM [countries] AS [t0]"
        );
    }

    #[test]
    fn test_filters_are_anded() {
        let pop = || table_col("t0", "population");
        let query = scan("countries", "t0")
            .select(vec![pop().into()])
            .filter(pop().binary(BinaryOperator::Gt, lit_int(0)))
            .filter(pop().binary(BinaryOperator::Lt, lit_int(100)));
        let sql = query.to_sql(Dialect::DuckDb);
        assert!(
            sql.ends_with("WHERE (\"t0\".\"population\" > 0) AND (\"t0\".\"population\" < 100)"),
            "{sql}"
        );
    }

    #[test]
    fn test_join_clause() {
        let on = table_col("t0", "name").binary(BinaryOperator::Eq, table_col("t1", "country"));
        let query = scan("countries", "t0")
            .select(vec![table_col("t1", "city").into()])
            .join(JoinType::Full, TableRef::new("cities").with_alias("t1"), Some(on));
        let sql = query.to_sql(Dialect::MySql);
        assert!(
            sql.contains("\nFULL OUTER JOIN `cities` AS `t1` ON `t0`.`name` = `t1`.`country`"),
            "{sql}"
        );
    }

    #[test]
    fn test_derived_table() {
        let inner = scan("countries", "t0")
            .select(vec![table_col("t0", "continent").into()])
            .distinct();
        let query = Query::new()
            .select(vec![table_col("t1", "continent").into()])
            .from(TableRef::subquery(inner).with_alias("t1"));
        assert_eq!(
            query.to_sql(Dialect::Postgres),
            "SELECT\n  \"t1\".\"continent\"\nFROM (\nSELECT DISTINCT\n  \"t0\".\"continent\"\nFROM \"countries\" AS \"t0\"\n) AS \"t1\""
        );
    }

    #[test]
    fn test_group_and_order() {
        let continent = || table_col("t0", "continent");
        let mut query = scan("countries", "t0")
            .select(vec![
                continent().into(),
                SelectExpr::new(count_star()).with_alias("count"),
            ])
            .limit(3)
            .offset(1);
        query.group_by = vec![continent()];
        query.order_by = vec![OrderByExpr::desc(table_col("t0", "count"))];
        let sql = query.to_sql(Dialect::Postgres);
        assert!(sql.contains("COUNT(*) AS \"count\""), "{sql}");
        assert!(sql.contains("\nGROUP BY \"t0\".\"continent\""), "{sql}");
        assert!(
            sql.ends_with("ORDER BY \"t0\".\"count\" DESC\nLIMIT 3 OFFSET 1"),
            "{sql}"
        );
    }

    #[test]
    fn test_tsql_limit_without_order() {
        let query = scan("countries", "t0")
            .select(vec![table_col("t0", "name").into()])
            .limit(10);
        let sql = query.to_sql(Dialect::TSql);
        assert!(
            sql.ends_with("ORDER BY (SELECT NULL)\nOFFSET 0 ROWS FETCH NEXT 10 ROWS ONLY"),
            "{sql}"
        );
    }

    #[test]
    fn test_cte_precedes_union() {
        let shared = scan("countries", "t0").select(vec![table_col("t0", "name").into()]);
        let operand = || scan("t0", "t1").select(vec![table_col("t1", "name").into()]);
        let query = Query::set_operation(SetOperation::union_all(operand(), operand()))
            .with_cte(Cte::new("t0", shared));
        let sql = query.to_sql(Dialect::Postgres);
        assert!(sql.starts_with("WITH \"t0\" AS (\nSELECT"), "{sql}");
        assert!(sql.contains("\n)\n(SELECT"), "{sql}");
        assert!(sql.contains(")\nUNION ALL\n("), "{sql}");
    }

    #[test]
    fn test_union_operands_per_dialect() {
        let operand = |table: &str| scan(table, "t0").select(vec![table_col("t0", "name").into()]);
        let query = Query::set_operation(SetOperation::union(
            operand("countries"),
            operand("territories"),
        ));

        let postgres = query.to_sql(Dialect::Postgres);
        assert!(postgres.starts_with("(SELECT"), "{postgres}");
        assert!(!postgres.contains("ALL"), "{postgres}");

        let sqlite = query.to_sql(Dialect::Sqlite);
        assert!(sqlite.starts_with("SELECT"), "{sqlite}");
        assert!(sqlite.contains("\nUNION\n"), "{sqlite}");
    }
}
