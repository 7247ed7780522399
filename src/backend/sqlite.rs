//! SQLite backend over `rusqlite`.
//!
//! rusqlite is blocking, so every call moves onto the blocking thread pool
//! with the connection behind a mutex. A call cancelled while it waits for
//! the mutex never starts; a call cancelled while running is stopped by a
//! progress handler installed for that call only. Values come back as SQLite storage
//! classes and are converted to [`Datum`]s using the compiled schema:
//! booleans are stored as integers and temporal values as text.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::{Backend, BackendError, BackendResult, Cancel, ResultSet};
use crate::compile::CompiledQuery;
use crate::ir::Datum;
use crate::schema::Schema;
use crate::sql::Dialect;
use crate::types::{parse_type, DataType};

/// Virtual machine steps between two cancellation checks.
const CANCEL_CHECK_OPS: i32 = 1000;

/// A SQLite database, file-backed or in memory.
#[derive(Clone)]
pub struct SqliteBackend {
    path: String,
    conn: Arc<Mutex<rusqlite::Connection>>,
}

impl fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteBackend {
    /// Open `path`, where `:memory:` opens a private in-memory database.
    pub async fn open(path: &str) -> BackendResult<Self> {
        let owned = path.to_string();
        let conn = tokio::task::spawn_blocking(move || -> BackendResult<rusqlite::Connection> {
            let conn = if owned == ":memory:" {
                rusqlite::Connection::open_in_memory()?
            } else {
                rusqlite::Connection::open(&owned)?
            };
            register_regexp(&conn)?;
            Ok(conn)
        })
        .await
        .map_err(|e| BackendError::Join(e.to_string()))??;

        debug!(path, "opened sqlite database");
        Ok(Self {
            path: path.to_string(),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// A fresh in-memory database.
    pub async fn memory() -> BackendResult<Self> {
        Self::open(":memory:").await
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Run `f` against the connection on the blocking pool, unless `cancel`
    /// is set by the time the connection is free.
    async fn with_conn<T, F>(&self, cancel: Cancel, f: F) -> BackendResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> BackendResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.blocking_lock();
            if cancel.is_cancelled() {
                trace!("skipping cancelled sqlite call");
                return Err(BackendError::Cancelled);
            }

            let flag = cancel.clone();
            guard.progress_handler(CANCEL_CHECK_OPS, Some(move || flag.is_cancelled()));
            let result = f(&guard);
            guard.progress_handler(0, None::<fn() -> bool>);

            result.map_err(|err| {
                if cancel.is_cancelled() {
                    BackendError::Cancelled
                } else {
                    err
                }
            })
        })
        .await
        .map_err(|e| BackendError::Join(e.to_string()))?
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn table_schema(&self, table: &str) -> BackendResult<Schema> {
        let name = table.to_string();
        let columns = self
            .with_conn(Cancel::new(), move |conn| {
                let mut stmt = conn.prepare("SELECT name, type FROM pragma_table_info(?1)")?;
                let rows = stmt
                    .query_map([&name], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(|e| introspection_failure(table, e))?;

        if columns.is_empty() {
            return Err(introspection_failure(table, "no such table"));
        }

        let fields = columns
            .into_iter()
            .map(|(name, decl)| {
                let dtype = declared_type(&decl).ok_or_else(|| {
                    introspection_failure(
                        table,
                        format!("column `{}` has unsupported type `{}`", name, decl),
                    )
                })?;
                Ok((name, dtype))
            })
            .collect::<BackendResult<Vec<_>>>()?;

        Schema::new(fields).map_err(|e| introspection_failure(table, e))
    }

    async fn run(&self, query: &CompiledQuery, cancel: Cancel) -> BackendResult<ResultSet> {
        let sql = query.sql.clone();
        let schema = query.schema.clone();
        let types: Vec<DataType> = schema.types().into_iter().cloned().collect();

        let rows = self
            .with_conn(cancel, move |conn| {
                let mut stmt = conn
                    .prepare(&sql)
                    .map_err(|e| BackendError::Execution(format!("{}\n{}", e, sql)))?;
                let width = stmt.column_count();
                if width != types.len() {
                    return Err(BackendError::Execution(format!(
                        "query returned {} columns, expected {}",
                        width,
                        types.len()
                    )));
                }

                let mut rows = stmt.query([])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    let values = types
                        .iter()
                        .enumerate()
                        .map(|(i, dtype)| Ok(to_datum(row.get_ref(i)?, dtype)))
                        .collect::<BackendResult<Vec<_>>>()?;
                    out.push(values);
                }
                Ok(out)
            })
            .await?;

        trace!(rows = rows.len(), "sqlite rows fetched");
        Ok(ResultSet { schema, rows })
    }

    async fn execute_batch(&self, sql: &str, cancel: Cancel) -> BackendResult<()> {
        let sql = sql.to_string();
        self.with_conn(cancel, move |conn| Ok(conn.execute_batch(&sql)?))
            .await
    }
}

fn introspection_failure(
    table: &str,
    source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> BackendError {
    BackendError::SchemaIntrospectionFailure {
        table: table.to_string(),
        source: source.into(),
    }
}

/// `X REGEXP Y` calls `regexp(Y, X)`: pattern first. The compiled pattern
/// is kept as auxiliary data of the argument, so a constant pattern is
/// compiled once per statement.
fn register_regexp(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            if !matches!(ctx.get_raw(0), ValueRef::Text(_)) {
                return Ok(None);
            }
            let re: Arc<Regex> = ctx.get_or_create_aux(0, |pattern| -> Result<Regex, BoxError> {
                Ok(Regex::new(pattern.as_str()?)?)
            })?;
            let text = match ctx.get_raw(1) {
                ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
                _ => return Ok(None),
            };
            Ok(Some(re.is_match(&text)))
        },
    )
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Map a declared column type to a [`DataType`], following SQLite's type
/// affinity rules for names it does not know exactly.
fn declared_type(decl: &str) -> Option<DataType> {
    let lower = decl.trim().to_lowercase();
    if let Ok(dtype) = parse_type(&lower) {
        return Some(dtype);
    }
    let dtype = match lower.as_str() {
        "datetime" => DataType::TIMESTAMP,
        "" | "blob" => DataType::BINARY,
        s if s.contains("int") => DataType::INT64,
        s if s.contains("char") || s.contains("clob") || s.contains("text") => DataType::STRING,
        s if s.contains("real") || s.contains("floa") || s.contains("doub") => DataType::FLOAT64,
        s if s.starts_with("numeric") || s.starts_with("decimal") => DataType::FLOAT64,
        _ => return None,
    };
    Some(dtype)
}

/// Convert one SQLite value to the compiled column type.
fn to_datum(value: ValueRef<'_>, dtype: &DataType) -> Datum {
    match value {
        ValueRef::Null => Datum::Null,
        ValueRef::Integer(i) => match dtype {
            DataType::Boolean => Datum::Bool(i != 0),
            DataType::Float { .. } | DataType::Decimal { .. } => Datum::Float(i as f64),
            _ => Datum::Int(i),
        },
        ValueRef::Real(f) => match dtype {
            DataType::Int { .. } if f.fract() == 0.0 => Datum::Int(f as i64),
            _ => Datum::Float(f),
        },
        ValueRef::Text(t) => Datum::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Datum::Bytes(b.to_vec()),
    }
}
