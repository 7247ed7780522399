//! Execution façade.
//!
//! A [`Backend`] runs compiled queries and describes tables. [`Connection`]
//! pairs a backend with the execution policy from configuration and is what
//! builder code talks to:
//!
//! ```ignore
//! let conn = tabula::backend::connect(&ConnectionSettings::sqlite_memory()).await?;
//! let countries = conn.table("countries").await?;
//! let result = countries.limit(5)?.execute(&conn).await?;
//! ```
//!
//! Building and compiling expressions never touches a backend; the only I/O
//! during building is [`Connection::table`], which introspects the schema.

mod sqlite;

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::compile::{CompileError, CompiledQuery};
use crate::config::{ConnectionSettings, Driver, SettingsError};
use crate::error::ExprError;
use crate::expr::Table;
use crate::ir::Datum;
use crate::schema::Schema;
use crate::sql::Dialect;

pub use sqlite::SqliteBackend;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while talking to a database.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("failed to introspect table `{table}`: {source}")]
    SchemaIntrospectionFailure {
        table: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("query failed: {0}")]
    Execution(String),

    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    #[error("query cancelled")]
    Cancelled,

    #[error("unsupported driver: {0}")]
    UnsupportedDriver(String),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("backend task failed: {0}")]
    Join(String),
}

impl From<ExprError> for BackendError {
    fn from(err: ExprError) -> Self {
        BackendError::Compile(CompileError::Expr(err))
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

// ============================================================================
// Results
// ============================================================================

/// Rows returned by a query, typed by the compiled schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    pub schema: Schema,
    pub rows: Vec<Vec<Datum>>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<&Datum>> {
        let (index, _) = self.schema.lookup(name).ok()?;
        Some(self.rows.iter().map(|row| &row[index]).collect())
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Cancellation flag for one call, shared between the caller and the
/// statement it started.
#[derive(Debug, Clone, Default)]
pub struct Cancel {
    cancelled: Arc<AtomicBool>,
}

impl Cancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Backend
// ============================================================================

/// A database that can run compiled queries.
#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
    /// Driver name, for logs and errors.
    fn name(&self) -> &str;

    /// Dialect queries must be compiled for.
    fn dialect(&self) -> Dialect;

    /// Schema of a stored table.
    async fn table_schema(&self, table: &str) -> BackendResult<Schema>;

    /// Run a compiled query and collect its rows. Once `cancel` is set the
    /// call must stop: before starting if it has not started, otherwise by
    /// aborting its own statement. Other calls are unaffected.
    async fn run(&self, query: &CompiledQuery, cancel: Cancel) -> BackendResult<ResultSet>;

    /// Run statements that return no rows, such as DDL or inserts.
    async fn execute_batch(&self, sql: &str, cancel: Cancel) -> BackendResult<()>;
}

// ============================================================================
// Connection
// ============================================================================

/// A backend plus execution policy.
#[derive(Debug, Clone)]
pub struct Connection {
    backend: Arc<dyn Backend>,
    timeout: Option<Duration>,
}

/// Open a connection described by configuration.
pub async fn connect(settings: &ConnectionSettings) -> BackendResult<Connection> {
    let driver = settings.driver_type().map_err(|err| match err {
        SettingsError::UnsupportedDriver(name) => BackendError::UnsupportedDriver(name),
        other => BackendError::Settings(other),
    })?;
    let timeout = settings.timeout_duration()?;

    let backend: Arc<dyn Backend> = match driver {
        Driver::Sqlite => Arc::new(SqliteBackend::open(&settings.resolved_path()?).await?),
    };
    debug!(driver = %driver, timeout = ?timeout, "connected");
    Ok(Connection { backend, timeout })
}

impl Connection {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn dialect(&self) -> Dialect {
        self.backend.dialect()
    }

    /// A table expression over a stored table, with its schema read from
    /// the database now.
    pub async fn table(&self, name: &str) -> BackendResult<Table> {
        let schema = self.backend.table_schema(name).await?;
        debug!(table = name, columns = schema.len(), "introspected table");
        Ok(Table::from_schema(name, schema)?)
    }

    /// Compile `table` for this backend's dialect and run it.
    pub async fn execute(&self, table: &Table) -> BackendResult<ResultSet> {
        let compiled = table.compile(self.dialect())?;
        self.run(&compiled).await
    }

    /// Run an already compiled query, enforcing the configured timeout.
    pub async fn run(&self, query: &CompiledQuery) -> BackendResult<ResultSet> {
        debug!(backend = self.backend.name(), sql = %query.sql, "executing query");
        let cancel = Cancel::new();
        let result = self
            .limited(&cancel, self.backend.run(query, cancel.clone()))
            .await?;
        debug!(rows = result.len(), "query finished");
        Ok(result)
    }

    /// Run statements that return no rows, enforcing the configured timeout.
    pub async fn execute_batch(&self, sql: &str) -> BackendResult<()> {
        let cancel = Cancel::new();
        self.limited(&cancel, self.backend.execute_batch(sql, cancel.clone()))
            .await
    }

    /// Await `call`; past the timeout, cancel it and report `Timeout`.
    async fn limited<T>(
        &self,
        cancel: &Cancel,
        call: impl Future<Output = BackendResult<T>>,
    ) -> BackendResult<T> {
        let Some(limit) = self.timeout else {
            return call.await;
        };
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(backend = self.backend.name(), timeout = ?limit, "query timed out");
                cancel.cancel();
                Err(BackendError::Timeout(limit))
            }
        }
    }
}
