//! Compilation from expression graphs to SQL.
//!
//! ```text
//! Node graph → relation DAG → CTE selection → layered lowering → Query → SQL
//! ```
//!
//! The compiler never talks to a backend. Compiling the same node with the
//! same options always produces byte-identical SQL.
//!
//! # Example
//!
//! ```ignore
//! use tabula::compile::{CompileOptions, Compiler};
//! use tabula::sql::Dialect;
//!
//! let t = tabula::table("t", [("a", "int64"), ("b", "string")])?;
//! let expr = t.filter(t.col("a")?.gt(0)?)?;
//!
//! let compiled = Compiler::new(CompileOptions::default().with_dialect(Dialect::Postgres))
//!     .compile(expr.node())?;
//! println!("{}", compiled.sql);
//! ```

mod lower;
pub mod rules;

use crate::error::ExprError;
use crate::ir::NodeRef;
use crate::schema::Schema;
use crate::sql::Dialect;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during compilation.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Expr(#[from] ExprError),

    #[error("operation `{op}` is not supported by the {dialect} dialect")]
    UnsupportedOperation { op: String, dialect: String },
}

pub type CompileResult<T> = Result<T, CompileError>;

// ============================================================================
// Options
// ============================================================================

/// Options for compilation.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Target SQL dialect.
    pub dialect: Dialect,
    /// Prefix of generated table aliases and CTE names.
    pub cte_prefix: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            cte_prefix: "t".to_string(),
        }
    }
}

impl CompileOptions {
    /// Set the target dialect.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Set the prefix of generated names.
    pub fn with_cte_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.cte_prefix = prefix.into();
        self
    }
}

// ============================================================================
// Output
// ============================================================================

/// SQL text plus the schema of the rows it returns.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub schema: Schema,
    pub dialect: Dialect,
}

impl std::fmt::Display for CompiledQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.sql)
    }
}

// ============================================================================
// Compiler
// ============================================================================

/// Compiles table expressions to SQL for one dialect.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: CompileOptions,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compile a table-valued node.
    pub fn compile(&self, root: &NodeRef) -> CompileResult<CompiledQuery> {
        let schema = root.relation_schema()?.clone();
        if let Some(name) = schema.first_duplicate() {
            return Err(ExprError::DuplicateColumn(name.to_string()).into());
        }

        let query = lower::Lowering::new(&self.options).relation(root)?;
        Ok(CompiledQuery {
            sql: query.to_sql(self.options.dialect),
            schema,
            dialect: self.options.dialect,
        })
    }

    /// Compile a value that reads from no table as a one-row `SELECT`.
    pub fn compile_constant(&self, value: &NodeRef, name: &str) -> CompileResult<CompiledQuery> {
        let dtype = value.value_type()?.clone();
        if !crate::ir::ops::referenced_tables(value).is_empty() {
            return Err(ExprError::InvalidArgument(format!(
                "`{}` reads from a table; compile it through that table",
                name
            ))
            .into());
        }

        let query = lower::Lowering::new(&self.options).constant(value, name)?;
        Ok(CompiledQuery {
            sql: query.to_sql(self.options.dialect),
            schema: Schema::new(vec![(name.to_string(), dtype)])?,
            dialect: self.options.dialect,
        })
    }
}

/// Compile a table-valued node for `dialect` with default options.
pub fn compile(root: &NodeRef, dialect: Dialect) -> CompileResult<CompiledQuery> {
    Compiler::new(CompileOptions::default().with_dialect(dialect)).compile(root)
}
