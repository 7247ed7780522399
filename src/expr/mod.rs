//! Fluent expression builder.
//!
//! [`Table`] and [`Column`] are thin, cloneable handles over graph nodes.
//! Every method builds a new node through the validating constructors in
//! [`crate::ir::ops`], so a malformed expression fails at the call that
//! introduced the problem.
//!
//! ```ignore
//! use tabula::{case, table};
//!
//! let t = table("countries", [("name", "string"), ("continent", "string")])?;
//! let continent = t.col("continent")?;
//! let label = continent
//!     .case()
//!     .when("AF", "Africa")?
//!     .when("EU", "Europe")?
//!     .else_("Other")?
//!     .end()?
//!     .name("region");
//! let expr = t.select([t.col("name")?, label])?;
//! ```

mod case;
mod column;
mod table;

pub use case::{case, SearchedCaseBuilder, SimpleCaseBuilder};
pub use column::{Collection, Column, IntoCollection, IntoColumn};
pub use table::{table, GroupedTable, IntoSelection, IntoSortKey, Table};

use crate::error::ExprResult;
use crate::ir::{ops, Datum};
use crate::types::IntoDataType;

/// A literal with its type inferred from the value.
pub fn lit(value: impl Into<Datum>) -> ExprResult<Column> {
    Ok(Column::from_node(ops::literal(value.into(), None)?))
}

/// A literal with an explicit type, e.g. `literal("2024-01-01", "date")`.
pub fn literal(value: impl Into<Datum>, dtype: impl IntoDataType) -> ExprResult<Column> {
    let dtype = dtype.into_data_type()?;
    Ok(Column::from_node(ops::literal(value.into(), Some(dtype))?))
}

/// The untyped NULL literal.
pub fn null() -> ExprResult<Column> {
    lit(Datum::Null)
}
