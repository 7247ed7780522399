//! Target databases.
//!
//! Every database is a zero-sized type implementing [`SqlDialect`], and
//! [`Dialect`] names one of them. The differences live here as data:
//! identifier quoting, literal spelling, pagination, cast targets and the
//! per-operation emission [`Rule`]s. An operation a dialect cannot express
//! maps to `Rule::Unsupported` and surfaces as
//! `CompileError::UnsupportedOperation`.

mod bigquery;
mod databricks;
mod duckdb;
pub mod helpers;
mod mysql;
mod postgres;
mod redshift;
mod snowflake;
mod sqlite;
mod tsql;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use bigquery::BigQuery;
pub use databricks::Databricks;
pub use duckdb::DuckDb;
pub use mysql::MySql;
pub use postgres::Postgres;
pub use redshift::Redshift;
pub use snowflake::Snowflake;
pub use sqlite::Sqlite;
pub use tsql::TSql;

use super::token::TokenStream;
use crate::compile::rules::Rule;
use crate::ir::OpTag;
use crate::types::DataType;

/// How one database spells the pieces of a query.
///
/// Defaults follow ANSI SQL; implementations override what differs.
pub trait SqlDialect: std::fmt::Debug + Send + Sync {
    /// Lowercase name, used in errors and logs.
    fn name(&self) -> &'static str;

    fn quote_identifier(&self, ident: &str) -> String;

    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_single(s)
    }

    fn format_bool(&self, b: bool) -> &'static str;

    fn format_null(&self) -> &'static str {
        "NULL"
    }

    /// A predicate that is constantly true or false. Needed where a
    /// condition is decided up front, such as `x IN ()`.
    fn format_predicate(&self, value: bool) -> &'static str {
        if value {
            "TRUE"
        } else {
            "FALSE"
        }
    }

    fn format_bytes(&self, bytes: &[u8]) -> String {
        format!("X'{}'", helpers::hex(bytes))
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_standard(limit, offset)
    }

    /// Pagination is only legal after an ORDER BY (T-SQL).
    fn requires_order_by_for_offset(&self) -> bool {
        false
    }

    fn concat_operator(&self) -> &'static str {
        "||"
    }

    /// False where `||` means something else (MySQL reads it as OR); string
    /// concatenation then becomes `CONCAT(..)`.
    fn supports_concat_operator(&self) -> bool {
        true
    }

    /// SQLite rejects `(SELECT ..) UNION (SELECT ..)`.
    fn supports_parenthesized_set_operands(&self) -> bool {
        true
    }

    /// Rename a function emitted by a [`Rule::Function`]. Matching ignores
    /// case; `None` keeps the name.
    fn remap_function(&self, name: &str) -> Option<&'static str> {
        let _ = name;
        None
    }

    /// Target type of `CAST(.. AS <type>)`. `None` makes the cast
    /// unsupported for this dialect.
    fn cast_type(&self, dt: &DataType) -> Option<String> {
        helpers::cast_type_ansi(dt)
    }

    /// Override for how an operation is emitted; `None` falls back to
    /// [`default_rule`](crate::compile::rules::default_rule).
    fn rule(&self, tag: OpTag) -> Option<Rule> {
        let _ = tag;
        None
    }
}

/// A compilation target. Defaults to DuckDB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    DuckDb,
    TSql,
    MySql,
    Postgres,
    Snowflake,
    BigQuery,
    Redshift,
    Databricks,
    Sqlite,
}

impl Dialect {
    /// Every dialect, in declaration order.
    pub const ALL: [Dialect; 9] = [
        Dialect::DuckDb,
        Dialect::TSql,
        Dialect::MySql,
        Dialect::Postgres,
        Dialect::Snowflake,
        Dialect::BigQuery,
        Dialect::Redshift,
        Dialect::Databricks,
        Dialect::Sqlite,
    ];

    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::DuckDb => &DuckDb,
            Dialect::Postgres => &Postgres,
            Dialect::TSql => &TSql,
            Dialect::MySql => &MySql,
            Dialect::Snowflake => &Snowflake,
            Dialect::BigQuery => &BigQuery,
            Dialect::Redshift => &Redshift,
            Dialect::Databricks => &Databricks,
            Dialect::Sqlite => &Sqlite,
        }
    }
}

impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        self.dialect().quote_string(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        self.dialect().format_bool(b)
    }

    fn format_null(&self) -> &'static str {
        self.dialect().format_null()
    }

    fn format_predicate(&self, value: bool) -> &'static str {
        self.dialect().format_predicate(value)
    }

    fn format_bytes(&self, bytes: &[u8]) -> String {
        self.dialect().format_bytes(bytes)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        self.dialect().emit_limit_offset(limit, offset)
    }

    fn requires_order_by_for_offset(&self) -> bool {
        self.dialect().requires_order_by_for_offset()
    }

    fn concat_operator(&self) -> &'static str {
        self.dialect().concat_operator()
    }

    fn supports_concat_operator(&self) -> bool {
        self.dialect().supports_concat_operator()
    }

    fn supports_parenthesized_set_operands(&self) -> bool {
        self.dialect().supports_parenthesized_set_operands()
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        self.dialect().remap_function(name)
    }

    fn cast_type(&self, dt: &DataType) -> Option<String> {
        self.dialect().cast_type(dt)
    }

    fn rule(&self, tag: OpTag) -> Option<Rule> {
        self.dialect().rule(tag)
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dialect().name())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "duckdb" => Ok(Dialect::DuckDb),
            "tsql" | "mssql" | "sqlserver" => Ok(Dialect::TSql),
            "mysql" => Ok(Dialect::MySql),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "snowflake" => Ok(Dialect::Snowflake),
            "bigquery" => Ok(Dialect::BigQuery),
            "redshift" => Ok(Dialect::Redshift),
            "databricks" | "spark" => Ok(Dialect::Databricks),
            "sqlite" => Ok(Dialect::Sqlite),
            other => Err(format!("unknown dialect `{}`", other)),
        }
    }
}
