//! SQL text generation.
//!
//! Lowering builds a [`Query`] tree; [`Query::to_sql`] writes it through a
//! [`TokenStream`] so quoting, literals and function names follow the
//! target [`Dialect`].

pub mod dialect;
pub mod expr;
pub mod query;
pub mod test_utils;
pub mod token;

pub use dialect::{Dialect, SqlDialect};
pub use expr::{
    count_star, lit_bool, lit_float, lit_int, lit_null, lit_str, table_col, template,
    BinaryOperator, Expr, Literal, UnaryOperator,
};
pub use query::{
    Cte, Join, JoinType, LimitOffset, OrderByExpr, Query, SelectExpr, SetOperation, TableRef,
    TableSource,
};
pub use token::{Token, TokenStream};
