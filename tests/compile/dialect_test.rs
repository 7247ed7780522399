//! Dialect-specific emission, checked by parsing the output back with
//! sqlparser.

use tabula::prelude::*;
use tabula::sql::test_utils::validate_sql;

fn countries() -> Table {
    table(
        "countries",
        [
            ("name", "string"),
            ("continent", "string"),
            ("population", "int64"),
        ],
    )
    .unwrap()
}

/// A handful of query shapes covering each lowering path.
fn shapes() -> Vec<(&'static str, Table)> {
    let c = countries();
    let continent = c.col("continent").unwrap();
    let pop = c.col("population").unwrap();

    let filtered = c
        .filter([pop.gt(1_000).unwrap(), continent.notnull().unwrap()])
        .unwrap()
        .sort_by([("population", false)])
        .unwrap()
        .limit_offset(10, 5)
        .unwrap();

    let totals = c
        .group_by(["continent"])
        .unwrap()
        .aggregate([
            pop.sum().unwrap().name("total"),
            c.col("name").unwrap().nunique().unwrap().name("names"),
        ])
        .unwrap();

    let limited = c.limit(3).unwrap();
    let rewrapped = limited
        .filter([limited.col("population").unwrap().gt(0).unwrap()])
        .unwrap();

    let cities = table("cities", [("city", "string"), ("country", "string")]).unwrap();
    let joined = c
        .left_join(
            &cities,
            [c.col("name").unwrap().eq(cities.col("country").unwrap()).unwrap()],
        )
        .unwrap()
        .select(["city", "continent"])
        .unwrap();

    vec![
        ("scan", c.clone()),
        ("filter_sort_limit", filtered),
        ("aggregate", totals),
        ("topk", continent.topk(3).unwrap()),
        ("derived", rewrapped),
        ("join", joined),
        ("distinct", c.select(["continent"]).unwrap().distinct().unwrap()),
    ]
}

fn assert_parses(dialect: Dialect) {
    for (label, expr) in shapes() {
        let compiled = expr
            .compile(dialect)
            .unwrap_or_else(|e| panic!("{label} failed to compile for {dialect}: {e}"));
        if let Err(message) = validate_sql(&compiled.sql, dialect) {
            panic!("{label}: {message}");
        }
    }
}

#[test]
fn test_postgres_output_parses() {
    assert_parses(Dialect::Postgres);
}

#[test]
fn test_duckdb_output_parses() {
    assert_parses(Dialect::DuckDb);
}

#[test]
fn test_mysql_output_parses() {
    assert_parses(Dialect::MySql);
}

#[test]
fn test_sqlite_output_parses() {
    assert_parses(Dialect::Sqlite);
}

#[test]
fn test_snowflake_output_parses() {
    assert_parses(Dialect::Snowflake);
}

#[test]
fn test_every_dialect_compiles_every_shape() {
    for dialect in Dialect::ALL {
        for (label, expr) in shapes() {
            assert!(
                expr.compile(dialect).is_ok(),
                "{label} failed to compile for {dialect}"
            );
        }
    }
}

// ============================================================================
// Dialect details
// ============================================================================

#[test]
fn test_identifier_quoting() {
    let c = countries();
    let sql = |d| c.compile(d).unwrap().sql;

    assert!(sql(Dialect::Postgres).contains("\"t0\".\"name\""));
    assert!(sql(Dialect::MySql).contains("`t0`.`name`"));
    assert!(sql(Dialect::BigQuery).contains("`t0`.`name`"));
    assert!(sql(Dialect::TSql).contains("[t0].[name]"));
}

#[test]
fn test_tsql_limit_uses_offset_fetch() {
    let sql = countries().limit(5).unwrap().compile(Dialect::TSql).unwrap().sql;
    assert!(sql.contains("ORDER BY (SELECT NULL)"), "{sql}");
    assert!(sql.ends_with("OFFSET 0 ROWS FETCH NEXT 5 ROWS ONLY"), "{sql}");
    validate_sql(&sql, Dialect::TSql).unwrap();
}

#[test]
fn test_limit_offset_standard() {
    let sql = countries()
        .limit_offset(10, 20)
        .unwrap()
        .compile(Dialect::Postgres)
        .unwrap()
        .sql;
    assert!(sql.ends_with("LIMIT 10 OFFSET 20"), "{sql}");
}

#[test]
fn test_concat_operator_or_function() {
    let c = countries();
    let label = c
        .col("name")
        .unwrap()
        .concat(c.col("continent").unwrap())
        .unwrap()
        .name("label");
    let projected = c.select([label]).unwrap();

    let pg = projected.compile(Dialect::Postgres).unwrap().sql;
    assert!(pg.contains("\"t0\".\"name\" || \"t0\".\"continent\""), "{pg}");

    let mysql = projected.compile(Dialect::MySql).unwrap().sql;
    assert!(mysql.contains("CONCAT(`t0`.`name`, `t0`.`continent`)"), "{mysql}");
}

#[test]
fn test_temporal_extraction_per_dialect() {
    let events = table("events", [("at", "timestamp")]).unwrap();
    let year = events.col("at").unwrap().year().unwrap().name("y");
    let projected = events.select([year]).unwrap();

    let pg = projected.compile(Dialect::Postgres).unwrap().sql;
    assert!(pg.contains("EXTRACT(YEAR FROM \"t0\".\"at\")"), "{pg}");

    let sqlite = projected.compile(Dialect::Sqlite).unwrap().sql;
    assert!(sqlite.contains("STRFTIME('%Y', \"t0\".\"at\")"), "{sqlite}");

    let tsql = projected.compile(Dialect::TSql).unwrap().sql;
    assert!(tsql.contains("DATEPART(year, [t0].[at])"), "{tsql}");
}

#[test]
fn test_count_distinct() {
    let c = countries();
    let names = c.col("name").unwrap().nunique().unwrap().name("n");
    let sql = c.select([names]).unwrap().compile(Dialect::Postgres).unwrap().sql;
    assert!(sql.contains("COUNT(DISTINCT \"t0\".\"name\") AS \"n\""), "{sql}");
}
