//! # tabula
//!
//! Deferred relational expressions that compile to multi-dialect SQL.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              Builder (Table / Column / case)             │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [ops constructors + typing]
//! ┌─────────────────────────────────────────────────────────┐
//! │        Expression graph (content-addressed nodes)        │
//! │        + schema resolver + column lineage                │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [compiler]
//! ┌─────────────────────────────────────────────────────────┐
//! │    Query AST (CTEs, SELECT layers) → dialect SQL text    │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [backend]
//! ┌─────────────────────────────────────────────────────────┐
//! │                  ResultSet (SQLite)                      │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use tabula::prelude::*;
//!
//! let t = table("countries", [("name", "string"), ("continent", "string")])?;
//! let top = t.col("continent")?.topk(3)?;
//! println!("{}", top.compile(Dialect::Postgres)?);
//! ```

pub mod backend;
pub mod compile;
pub mod config;
pub mod error;
pub mod expr;
pub mod ir;
pub mod lineage;
pub mod schema;
pub mod sql;
pub mod types;

pub use sql::dialect;

pub use backend::{connect, BackendError, Cancel, Connection, ResultSet};
pub use compile::{CompileError, CompileOptions, CompiledQuery, Compiler};
pub use error::{ExprError, ExprResult};
pub use expr::{case, lit, literal, null, table, Column, Table};
pub use ir::{BucketOptions, Closed, Datum, HistogramOptions, JoinKind};
pub use schema::Schema;
pub use sql::Dialect;
pub use types::DataType;

/// Everything needed to build, compile and run expressions.
pub mod prelude {
    pub use crate::backend::{connect, Connection, ResultSet};
    pub use crate::compile::{CompileOptions, CompiledQuery};
    pub use crate::config::{ConnectionSettings, Settings};
    pub use crate::error::{ExprError, ExprResult};
    pub use crate::expr::{
        case, lit, literal, null, table, Column, GroupedTable, IntoColumn, Table,
    };
    pub use crate::ir::{BucketOptions, Closed, Datum, HistogramOptions, JoinKind};
    pub use crate::schema::Schema;
    pub use crate::sql::Dialect;
    pub use crate::types::DataType;
}
