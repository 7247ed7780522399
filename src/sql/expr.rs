//! Scalar SQL expressions produced by lowering.
//!
//! The tree is already fully decided when it gets here: operand
//! parenthesization, casts and dialect templates are chosen by the compiler,
//! so writing tokens is a plain walk.

use super::dialect::{Dialect, SqlDialect};
use super::query::Query;
use super::token::{Token, TokenStream};

/// A SQL scalar expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `alias.column`, or a bare column when no alias is given.
    Column {
        table: Option<String>,
        column: String,
    },

    Literal(Literal),

    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },

    UnaryOp { op: UnaryOperator, expr: Box<Expr> },

    /// `name(args...)`, or `name(DISTINCT arg)` for distinct aggregates.
    Function {
        name: String,
        args: Vec<Expr>,
        distinct: bool,
    },

    /// `CASE [operand] WHEN .. THEN .. [ELSE ..] END`
    Case {
        operand: Option<Box<Expr>>,
        when_clauses: Vec<(Expr, Expr)>,
        else_clause: Option<Box<Expr>>,
    },

    /// `CAST(expr AS type)`; the type is already spelled for the dialect.
    Cast { expr: Box<Expr>, type_name: String },

    In {
        expr: Box<Expr>,
        values: Vec<Expr>,
        negated: bool,
    },

    InSubquery {
        expr: Box<Expr>,
        subquery: Box<Query>,
        negated: bool,
    },

    IsNull { expr: Box<Expr>, negated: bool },

    /// `(SELECT ...)` yielding one value.
    Subquery(Box<Query>),

    /// `*`, only ever seen inside `COUNT(*)`.
    Star,

    Paren(Box<Expr>),

    /// A dialect rule such as `REGEXP_LIKE({0}, {1})`.
    ///
    /// `{n}` is replaced with the n-th argument and all other text is
    /// written verbatim. Templates only come from static rule tables.
    Template { template: String, args: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Bytes(Vec<u8>),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    And,
    Or,
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Minus,
}

impl BinaryOperator {
    fn token(self) -> Token {
        match self {
            BinaryOperator::Eq => Token::Eq,
            BinaryOperator::Ne => Token::Ne,
            BinaryOperator::Lt => Token::Lt,
            BinaryOperator::Gt => Token::Gt,
            BinaryOperator::Lte => Token::Lte,
            BinaryOperator::Gte => Token::Gte,
            BinaryOperator::And => Token::And,
            BinaryOperator::Or => Token::Or,
            BinaryOperator::Plus => Token::Plus,
            BinaryOperator::Minus => Token::Minus,
            BinaryOperator::Mul => Token::Mul,
            BinaryOperator::Div => Token::Div,
            BinaryOperator::Mod => Token::Mod,
            BinaryOperator::Concat => Token::Concat,
        }
    }
}

impl Expr {
    /// `self op other`, parenthesizing compound operands so the output never
    /// leans on operator precedence.
    pub fn binary(self, op: BinaryOperator, other: Expr) -> Expr {
        Expr::BinaryOp {
            left: Box::new(self.operand()),
            op,
            right: Box::new(other.operand()),
        }
    }

    pub fn and(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::And, other)
    }

    pub fn not(self) -> Expr {
        Expr::UnaryOp {
            op: UnaryOperator::Not,
            expr: Box::new(self.operand()),
        }
    }

    pub fn is_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self.operand()),
            negated: false,
        }
    }

    /// Whether this expression needs parentheses when used as an operand.
    pub fn is_compound(&self) -> bool {
        matches!(
            self,
            Expr::BinaryOp { .. }
                | Expr::UnaryOp { .. }
                | Expr::In { .. }
                | Expr::InSubquery { .. }
                | Expr::IsNull { .. }
                | Expr::Template { .. }
        )
    }

    pub fn operand(self) -> Expr {
        if self.is_compound() {
            Expr::Paren(Box::new(self))
        } else {
            self
        }
    }

    /// Render on its own, mostly useful in tests.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        let mut ts = TokenStream::new();
        self.write_tokens(&mut ts, dialect);
        ts.serialize(dialect)
    }

    pub fn write_tokens(&self, ts: &mut TokenStream, dialect: Dialect) {
        match self {
            Expr::Column { table, column } => {
                if let Some(alias) = table {
                    ts.push(Token::Ident(alias.clone())).push(Token::Dot);
                }
                ts.push(Token::Ident(column.clone()));
            }

            Expr::Literal(value) => {
                ts.push(match value {
                    Literal::Int(n) => Token::LitInt(*n),
                    Literal::Float(f) => Token::LitFloat(*f),
                    Literal::String(s) => Token::LitString(s.clone()),
                    Literal::Bool(b) => Token::LitBool(*b),
                    Literal::Bytes(b) => Token::LitBytes(b.clone()),
                    Literal::Null => Token::LitNull,
                });
            }

            Expr::BinaryOp { left, op, right }
                if *op == BinaryOperator::Concat && !dialect.supports_concat_operator() =>
            {
                ts.push(Token::FunctionName("CONCAT".into())).lparen();
                left.write_tokens(ts, dialect);
                ts.comma().space();
                right.write_tokens(ts, dialect);
                ts.rparen();
            }

            Expr::BinaryOp { left, op, right } => {
                left.write_tokens(ts, dialect);
                ts.space().push(op.token()).space();
                right.write_tokens(ts, dialect);
            }

            Expr::UnaryOp { op, expr } => {
                match op {
                    UnaryOperator::Not => ts.push(Token::Not).space(),
                    UnaryOperator::Minus => ts.push(Token::Minus),
                };
                expr.write_tokens(ts, dialect);
            }

            Expr::Function {
                name,
                args,
                distinct,
            } => {
                ts.push(Token::FunctionName(name.clone())).lparen();
                if *distinct {
                    ts.push(Token::Distinct).space();
                }
                write_list(ts, args, dialect);
                ts.rparen();
            }

            Expr::Case {
                operand,
                when_clauses,
                else_clause,
            } => {
                ts.push(Token::Case);
                if let Some(operand) = operand {
                    ts.space();
                    operand.write_tokens(ts, dialect);
                }
                for (when, then) in when_clauses {
                    ts.space().push(Token::When).space();
                    when.write_tokens(ts, dialect);
                    ts.space().push(Token::Then).space();
                    then.write_tokens(ts, dialect);
                }
                if let Some(otherwise) = else_clause {
                    ts.space().push(Token::Else).space();
                    otherwise.write_tokens(ts, dialect);
                }
                ts.space().push(Token::End);
            }

            Expr::Cast { expr, type_name } => {
                ts.push(Token::Cast).lparen();
                expr.write_tokens(ts, dialect);
                ts.space()
                    .push(Token::As)
                    .space()
                    .push(Token::TypeName(type_name.clone()))
                    .rparen();
            }

            // An empty IN list is not valid SQL anywhere.
            Expr::In { values, negated, .. } if values.is_empty() => {
                ts.push(Token::Raw(dialect.format_predicate(*negated).into()));
            }

            Expr::In {
                expr,
                values,
                negated,
            } => {
                expr.write_tokens(ts, dialect);
                write_in_keyword(ts, *negated);
                write_list(ts, values, dialect);
                ts.rparen();
            }

            Expr::InSubquery {
                expr,
                subquery,
                negated,
            } => {
                expr.write_tokens(ts, dialect);
                write_in_keyword(ts, *negated);
                subquery.write_tokens(ts, dialect);
                ts.rparen();
            }

            Expr::IsNull { expr, negated } => {
                expr.write_tokens(ts, dialect);
                ts.space().push(if *negated {
                    Token::IsNotNull
                } else {
                    Token::IsNull
                });
            }

            Expr::Star => {
                ts.push(Token::Star);
            }

            Expr::Paren(inner) => {
                ts.lparen();
                inner.write_tokens(ts, dialect);
                ts.rparen();
            }

            Expr::Subquery(query) => {
                ts.lparen();
                query.write_tokens(ts, dialect);
                ts.rparen();
            }

            Expr::Template { template, args } => expand_template(ts, template, args, dialect),
        }
    }
}

fn write_list(ts: &mut TokenStream, items: &[Expr], dialect: Dialect) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            ts.comma().space();
        }
        item.write_tokens(ts, dialect);
    }
}

fn write_in_keyword(ts: &mut TokenStream, negated: bool) {
    if negated {
        ts.space().push(Token::Not);
    }
    ts.space().push(Token::In).space().lparen();
}

fn expand_template(ts: &mut TokenStream, template: &str, args: &[Expr], dialect: Dialect) {
    let mut pending = String::new();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let slot = after
            .find('}')
            .and_then(|close| after[..close].parse::<usize>().ok().map(|i| (i, close)))
            .filter(|(i, _)| *i < args.len());

        match slot {
            Some((index, close)) => {
                pending.push_str(&rest[..open]);
                if !pending.is_empty() {
                    ts.push(Token::Raw(std::mem::take(&mut pending)));
                }
                args[index].write_tokens(ts, dialect);
                rest = &after[close + 1..];
            }
            None => {
                pending.push_str(&rest[..=open]);
                rest = after;
            }
        }
    }

    pending.push_str(rest);
    if !pending.is_empty() {
        ts.push(Token::Raw(pending));
    }
}

// Shorthands used by the lowering.

pub fn table_col(alias: &str, column: &str) -> Expr {
    Expr::Column {
        table: Some(alias.into()),
        column: column.into(),
    }
}

pub fn lit_int(n: i64) -> Expr {
    Expr::Literal(Literal::Int(n))
}

pub fn lit_float(f: f64) -> Expr {
    Expr::Literal(Literal::Float(f))
}

pub fn lit_str(s: &str) -> Expr {
    Expr::Literal(Literal::String(s.into()))
}

pub fn lit_bool(b: bool) -> Expr {
    Expr::Literal(Literal::Bool(b))
}

pub fn lit_null() -> Expr {
    Expr::Literal(Literal::Null)
}

pub fn count_star() -> Expr {
    Expr::Function {
        name: "COUNT".into(),
        args: vec![Expr::Star],
        distinct: false,
    }
}

pub fn template(template: &str, args: Vec<Expr>) -> Expr {
    Expr::Template {
        template: template.into(),
        args,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::query::TableRef;

    fn population() -> Expr {
        table_col("t0", "population")
    }

    #[test]
    fn test_qualified_column_quoting() {
        assert_eq!(population().to_sql(Dialect::Postgres), "\"t0\".\"population\"");
        assert_eq!(population().to_sql(Dialect::TSql), "[t0].[population]");
    }

    #[test]
    fn test_compound_operands_are_parenthesized() {
        let expr = population()
            .binary(BinaryOperator::Plus, lit_int(1))
            .binary(BinaryOperator::Mul, lit_int(2));
        assert_eq!(
            expr.to_sql(Dialect::Postgres),
            "(\"t0\".\"population\" + 1) * 2"
        );
    }

    #[test]
    fn test_not_uses_dialect_booleans() {
        let expr = table_col("t0", "free")
            .binary(BinaryOperator::Eq, lit_bool(true))
            .not();
        assert_eq!(expr.to_sql(Dialect::MySql), "NOT (`t0`.`free` = 1)");
        assert_eq!(expr.to_sql(Dialect::DuckDb), "NOT (\"t0\".\"free\" = true)");
    }

    #[test]
    fn test_count_distinct() {
        let expr = Expr::Function {
            name: "count".into(),
            args: vec![table_col("t0", "continent")],
            distinct: true,
        };
        assert_eq!(
            expr.to_sql(Dialect::Postgres),
            "COUNT(DISTINCT \"t0\".\"continent\")"
        );
        assert_eq!(count_star().to_sql(Dialect::Sqlite), "COUNT(*)");
    }

    #[test]
    fn test_template_expansion() {
        let expr = template("{0} ~ {1}", vec![table_col("t0", "name"), lit_str("^A")]);
        assert_eq!(expr.to_sql(Dialect::Postgres), "\"t0\".\"name\" ~ '^A'");

        let expr = template("DATEPART(year, {0})", vec![table_col("t0", "at")]);
        assert_eq!(expr.to_sql(Dialect::TSql), "DATEPART(year, [t0].[at])");
    }

    #[test]
    fn test_template_leaves_other_braces_alone() {
        let expr = template("STRFTIME('{x}', {0}) || '{3}'", vec![table_col("t0", "at")]);
        assert_eq!(
            expr.to_sql(Dialect::Sqlite),
            "STRFTIME('{x}', \"t0\".\"at\") || '{3}'"
        );
    }

    #[test]
    fn test_in_list() {
        let expr = Expr::In {
            expr: Box::new(table_col("t0", "continent")),
            values: vec![lit_str("AF"), lit_str("EU")],
            negated: true,
        };
        assert_eq!(
            expr.to_sql(Dialect::Postgres),
            "\"t0\".\"continent\" NOT IN ('AF', 'EU')"
        );
    }

    #[test]
    fn test_empty_in_list_is_constant() {
        let empty = |negated| Expr::In {
            expr: Box::new(table_col("t0", "continent")),
            values: vec![],
            negated,
        };
        assert_eq!(empty(false).to_sql(Dialect::Postgres), "FALSE");
        assert_eq!(empty(true).to_sql(Dialect::Postgres), "TRUE");
        assert_eq!(empty(false).to_sql(Dialect::TSql), "1 = 0");
    }

    #[test]
    fn test_in_subquery() {
        let subquery = Query::new()
            .select(vec![table_col("t1", "code").into()])
            .from(TableRef::new("allowed").with_alias("t1"));
        let expr = Expr::InSubquery {
            expr: Box::new(table_col("t0", "continent")),
            subquery: Box::new(subquery),
            negated: false,
        };
        let sql = expr.to_sql(Dialect::Postgres);
        assert!(sql.starts_with("\"t0\".\"continent\" IN (SELECT"), "{sql}");
        assert!(sql.ends_with("FROM \"allowed\" AS \"t1\")"), "{sql}");
    }

    #[test]
    fn test_scalar_subquery_is_parenthesized() {
        let subquery = Query::new()
            .select(vec![table_col("t1", "min").into()])
            .from(TableRef::new("bounds").with_alias("t1"));
        let expr = table_col("t0", "a").binary(
            BinaryOperator::Minus,
            Expr::Subquery(Box::new(subquery)),
        );
        let sql = expr.to_sql(Dialect::Postgres);
        assert!(sql.starts_with("\"t0\".\"a\" - (SELECT"), "{sql}");
        assert!(sql.ends_with("FROM \"bounds\" AS \"t1\")"), "{sql}");
    }

    #[test]
    fn test_case_with_else_null() {
        let expr = Expr::Case {
            operand: Some(Box::new(table_col("t0", "continent"))),
            when_clauses: vec![(lit_str("AF"), lit_str("Africa"))],
            else_clause: Some(Box::new(lit_null())),
        };
        assert_eq!(
            expr.to_sql(Dialect::Postgres),
            "CASE \"t0\".\"continent\" WHEN 'AF' THEN 'Africa' ELSE NULL END"
        );
    }

    #[test]
    fn test_concat_falls_back_to_function() {
        let expr = table_col("t0", "a").binary(BinaryOperator::Concat, table_col("t0", "b"));
        assert_eq!(expr.to_sql(Dialect::Postgres), "\"t0\".\"a\" || \"t0\".\"b\"");
        assert_eq!(expr.to_sql(Dialect::MySql), "CONCAT(`t0`.`a`, `t0`.`b`)");
    }

    #[test]
    fn test_cast_and_null_check() {
        let expr = Expr::Cast {
            expr: Box::new(population()),
            type_name: "DOUBLE PRECISION".into(),
        };
        assert_eq!(
            expr.to_sql(Dialect::Postgres),
            "CAST(\"t0\".\"population\" AS DOUBLE PRECISION)"
        );
        assert_eq!(
            population().is_null().to_sql(Dialect::Postgres),
            "\"t0\".\"population\" IS NULL"
        );
    }
}
