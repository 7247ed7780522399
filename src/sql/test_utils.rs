//! Parse compiled SQL back with sqlparser to catch malformed output.

use sqlparser::dialect::{
    BigQueryDialect, DuckDbDialect, GenericDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect,
    SQLiteDialect, SnowflakeDialect,
};
use sqlparser::parser::Parser;

use super::dialect::Dialect;

/// The sqlparser grammar closest to each target.
fn grammar(dialect: Dialect) -> Box<dyn sqlparser::dialect::Dialect> {
    match dialect {
        Dialect::Postgres | Dialect::Redshift => Box::new(PostgreSqlDialect {}),
        Dialect::DuckDb => Box::new(DuckDbDialect {}),
        Dialect::MySql => Box::new(MySqlDialect {}),
        Dialect::TSql => Box::new(MsSqlDialect {}),
        Dialect::Snowflake => Box::new(SnowflakeDialect {}),
        Dialect::BigQuery => Box::new(BigQueryDialect {}),
        Dialect::Databricks => Box::new(GenericDialect {}),
        Dialect::Sqlite => Box::new(SQLiteDialect {}),
    }
}

/// Err carries the parser message together with the offending SQL.
pub fn validate_sql(sql: &str, dialect: Dialect) -> Result<(), String> {
    let grammar = grammar(dialect);
    Parser::parse_sql(grammar.as_ref(), sql)
        .map(drop)
        .map_err(|e| format!("{dialect} rejected the query: {e}\n{sql}"))
}
