//! Integration tests for expression → SQL compilation.

use tabula::compile::CompileError;
use tabula::prelude::*;
use tabula::sql::test_utils::validate_sql;

fn t() -> Table {
    table("t", [("a", "int64"), ("b", "string")]).unwrap()
}

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

// ============================================================================
// Layout
// ============================================================================

#[test]
fn test_scan_lists_columns() {
    let sql = t().compile(Dialect::Postgres).unwrap().sql;
    insta::assert_snapshot!(sql, @r#"
    SELECT
      "t0"."a",
      "t0"."b"
    FROM "t" AS "t0"
    "#);
}

#[test]
fn test_filter_fuses_into_where() {
    let t = t();
    let filtered = t.filter([t.col("a").unwrap().gt(0).unwrap()]).unwrap();
    let sql = filtered.compile(Dialect::Postgres).unwrap().sql;
    insta::assert_snapshot!(sql, @r#"
    SELECT
      "t0"."a",
      "t0"."b"
    FROM "t" AS "t0"
    WHERE "t0"."a" > 0
    "#);
}

#[test]
fn test_filter_limit_single_layer() {
    let t = t();
    let out = t
        .filter([t.col("a").unwrap().gt(0).unwrap()])
        .unwrap()
        .limit(5)
        .unwrap();
    let sql = out.compile(Dialect::Postgres).unwrap().sql;
    assert!(sql.ends_with("WHERE \"t0\".\"a\" > 0\nLIMIT 5"), "{sql}");
    assert_eq!(sql.matches("SELECT").count(), 1, "{sql}");
}

#[test]
fn test_filter_after_limit_wraps() {
    let t = t();
    let limited = t.limit(5).unwrap();
    let out = limited
        .filter([limited.col("a").unwrap().gt(0).unwrap()])
        .unwrap();
    let sql = out.compile(Dialect::Postgres).unwrap().sql;
    assert!(sql.contains("FROM (\n"), "{sql}");
    assert_eq!(sql.matches("SELECT").count(), 2, "{sql}");
    assert!(sql.find("LIMIT 5").unwrap() < sql.find("WHERE").unwrap(), "{sql}");
}

#[test]
fn test_constant_without_table() {
    let sum = lit(1).unwrap().add(2).unwrap().name("x");
    let sql = sum.compile(Dialect::Postgres).unwrap().sql;
    assert_eq!(sql, "SELECT\n  1 + 2 AS \"x\"");
}

#[test]
fn test_cte_prefix_option() {
    let options = CompileOptions::default()
        .with_dialect(Dialect::Postgres)
        .with_cte_prefix("q");
    let sql = t().compile_with(&options).unwrap().sql;
    assert!(sql.contains("AS \"q0\""), "{sql}");
    assert!(!sql.contains("\"t0\""), "{sql}");
}

#[test]
fn test_compiled_schema_matches_expression() {
    let c = countries();
    let counts = c.col("continent").unwrap().value_counts().unwrap();
    let compiled = counts.compile(Dialect::DuckDb).unwrap();
    assert_eq!(compiled.schema, *counts.schema());
    assert_eq!(compiled.dialect, Dialect::DuckDb);
}

// ============================================================================
// Determinism and sharing
// ============================================================================

#[test]
fn test_compilation_is_deterministic() {
    let c = countries();
    let expr = c.col("continent").unwrap().topk(3).unwrap();
    for dialect in Dialect::ALL {
        let first = expr.compile(dialect).unwrap();
        let second = expr.compile(dialect).unwrap();
        assert_eq!(first.sql, second.sql, "{dialect}");
    }
}

#[test]
fn test_topk_matches_manual_composition() {
    let c = countries();
    let topk = c.col("continent").unwrap().topk(2).unwrap();
    let manual = c
        .group_by(["continent"])
        .unwrap()
        .count()
        .unwrap()
        .sort_by([("count", false)])
        .unwrap()
        .limit(2)
        .unwrap();

    assert!(topk.equals(&manual));
    assert_eq!(
        topk.compile(Dialect::Postgres).unwrap().sql,
        manual.compile(Dialect::Postgres).unwrap().sql
    );
}

#[test]
fn test_topk_sql_shape() {
    let c = countries();
    let sql = c
        .col("continent")
        .unwrap()
        .topk(2)
        .unwrap()
        .compile(Dialect::Postgres)
        .unwrap()
        .sql;
    assert!(sql.contains("COUNT(*) AS \"count\""), "{sql}");
    assert!(sql.contains("GROUP BY \"t0\".\"continent\""), "{sql}");
    assert!(sql.contains("ORDER BY"), "{sql}");
    assert!(sql.contains("DESC"), "{sql}");
    assert!(sql.ends_with("LIMIT 2"), "{sql}");
}

#[test]
fn test_shared_subexpression_lowered_once() {
    let t = t();
    let positive = t.filter([t.col("a").unwrap().gt(0).unwrap()]).unwrap();
    let plain = positive.select(["a"]).unwrap();
    let doubled = positive
        .select([positive.col("a").unwrap().mul(2).unwrap().name("a")])
        .unwrap();
    let both = plain.union(&doubled, false).unwrap();

    let sql = both.compile(Dialect::Postgres).unwrap().sql;
    assert!(sql.starts_with("WITH \"t0\" AS ("), "{sql}");
    assert_eq!(sql.matches("> 0").count(), 1, "{sql}");
    assert_eq!(sql.matches("FROM \"t\"").count(), 1, "{sql}");
    assert!(sql.contains("UNION"), "{sql}");
    assert!(!sql.contains("UNION ALL"), "{sql}");
}

#[test]
fn test_relation_read_twice_by_one_parent_is_a_cte() {
    let t = t();
    let positive = t.filter([t.col("a").unwrap().gt(0).unwrap()]).unwrap();
    let twice = positive.union(&positive, false).unwrap();

    let sql = twice.compile(Dialect::Postgres).unwrap().sql;
    assert!(sql.starts_with("WITH \"t0\" AS ("), "{sql}");
    assert_eq!(sql.matches("> 0").count(), 1, "{sql}");
    assert_eq!(sql.matches("FROM \"t\"").count(), 1, "{sql}");
    assert_eq!(sql.matches("FROM \"t0\"").count(), 2, "{sql}");
}

#[test]
fn test_single_parent_not_a_cte() {
    let t = t();
    let out = t
        .filter([t.col("a").unwrap().gt(0).unwrap()])
        .unwrap()
        .limit(5)
        .unwrap();
    let sql = out.compile(Dialect::Postgres).unwrap().sql;
    assert!(!sql.contains("WITH"), "{sql}");
}

// ============================================================================
// Values
// ============================================================================

fn doubled(times: usize) -> String {
    let t = t();
    let mut x = t.col("a").unwrap();
    for _ in 0..times {
        x = x.add(&x).unwrap();
    }
    t.select([x.name("x")])
        .unwrap()
        .compile(Dialect::Postgres)
        .unwrap()
        .sql
}

#[test]
fn test_shared_scalar_emitted_once() {
    let sql = doubled(16);
    assert!(sql.len() < 5_000, "{} bytes", sql.len());
    assert!(sql.matches("\"a\"").count() < 40, "{sql}");
    validate_sql(&sql, Dialect::Postgres).unwrap();

    // Output grows with the graph, not with its unfolding.
    let deeper = doubled(32);
    assert!(deeper.len() < 4 * sql.len(), "{} vs {}", deeper.len(), sql.len());
}

#[test]
fn test_small_shared_scalar_stays_inline() {
    let t = t();
    let a = t.col("a").unwrap();
    let twice = a.add(1).unwrap();
    let out = t.select([twice.mul(&twice).unwrap().name("sq")]).unwrap();
    let sql = out.compile(Dialect::Postgres).unwrap().sql;
    assert_eq!(sql.matches("FROM").count(), 1, "{sql}");
}

#[test]
fn test_hoisted_scalar_in_filter() {
    let t = t();
    let mut x = t.col("a").unwrap();
    for _ in 0..4 {
        x = x.add(&x).unwrap();
    }
    let out = t.filter([x.gt(10).unwrap()]).unwrap();
    let compiled = out.compile(Dialect::Postgres).unwrap();
    assert_eq!(compiled.schema.names(), vec!["a", "b"]);
    assert!(compiled.sql.contains("WHERE"), "{}", compiled.sql);
    validate_sql(&compiled.sql, Dialect::Postgres).unwrap();
}

#[test]
fn test_case_without_default_emits_else_null() {
    let c = countries();
    let label = c
        .col("continent")
        .unwrap()
        .case()
        .when("AF", "Africa")
        .unwrap()
        .end()
        .unwrap()
        .name("label");
    let sql = c.select([label]).unwrap().compile(Dialect::Postgres).unwrap().sql;
    assert!(
        sql.contains("CASE \"t0\".\"continent\" WHEN 'AF' THEN 'Africa' ELSE NULL END AS \"label\""),
        "{sql}"
    );
}

#[test]
fn test_ifelse_is_searched_case() {
    let c = countries();
    let big = c.col("population").unwrap().gt(100).unwrap();
    let label = big.ifelse("big", "small").unwrap().name("size");
    let sql = c.select([label]).unwrap().compile(Dialect::Postgres).unwrap().sql;
    assert!(sql.contains("CASE WHEN \"t0\".\"population\" > 100 THEN 'big'"), "{sql}");
    assert!(sql.contains("THEN 'small' ELSE NULL END AS \"size\""), "{sql}");
}

#[test]
fn test_isin_values() {
    let c = countries();
    let test = c.col("continent").unwrap().isin(["AF", "EU"]).unwrap();
    let sql = c.filter([test]).unwrap().compile(Dialect::Postgres).unwrap().sql;
    assert!(sql.contains("WHERE \"t0\".\"continent\" IN ('AF', 'EU')"), "{sql}");

    let test = c.col("continent").unwrap().notin(["AF"]).unwrap();
    let sql = c.filter([test]).unwrap().compile(Dialect::Postgres).unwrap().sql;
    assert!(sql.contains("NOT IN ('AF')"), "{sql}");
}

#[test]
fn test_isin_column_is_subquery() {
    let c = countries();
    let continent = c.col("continent").unwrap();
    let top = continent.topk(2).unwrap();
    let test = continent.isin(top.col("continent").unwrap()).unwrap();
    let sql = c.filter([test]).unwrap().compile(Dialect::Postgres).unwrap().sql;

    assert!(sql.contains(" IN ("), "{sql}");
    assert!(sql.matches("SELECT").count() >= 2, "{sql}");
    assert!(sql.contains("LIMIT 2"), "{sql}");
    assert_eq!(sql.matches("FROM \"countries\"").count(), 2, "{sql}");
}

#[test]
fn test_integer_division_casts() {
    let t = t();
    let half = t.col("a").unwrap().div(2).unwrap().name("half");
    let sql = t.select([half]).unwrap().compile(Dialect::Postgres).unwrap().sql;
    assert!(sql.contains("CAST(\"t0\".\"a\" AS "), "{sql}");
}

#[test]
fn test_string_functions_follow_dialect() {
    let c = countries();
    let has = c.col("name").unwrap().contains("land").unwrap();
    let filtered = c.filter([has]).unwrap();

    let duck = filtered.compile(Dialect::DuckDb).unwrap().sql;
    assert!(duck.contains("CONTAINS("), "{duck}");

    let pg = filtered.compile(Dialect::Postgres).unwrap().sql;
    assert!(pg.contains("STRPOS("), "{pg}");

    let sqlite = filtered.compile(Dialect::Sqlite).unwrap().sql;
    assert!(sqlite.contains("INSTR("), "{sqlite}");
}

#[test]
fn test_join_and_select() {
    let c = countries();
    let cities = table("cities", [("city", "string"), ("country", "string")]).unwrap();
    let joined = c
        .inner_join(
            &cities,
            [c.col("name").unwrap().eq(cities.col("country").unwrap()).unwrap()],
        )
        .unwrap();
    let out = joined.select(["city", "continent"]).unwrap();
    let sql = out.compile(Dialect::Postgres).unwrap().sql;
    assert!(sql.contains("INNER JOIN \"cities\" AS \"t1\" ON"), "{sql}");
    assert!(sql.contains("\"t0\".\"name\" = \"t1\".\"country\""), "{sql}");
}

#[test]
fn test_histogram_reads_bounds_from_subqueries() {
    let t = t();
    let bins = t
        .col("a")
        .unwrap()
        .histogram(HistogramOptions {
            nbins: Some(4),
            ..HistogramOptions::default()
        })
        .unwrap()
        .name("bin");
    let counts = t.group_by([bins]).unwrap().count().unwrap();
    assert_eq!(counts.columns(), vec!["bin", "count"]);

    let sql = counts.compile(Dialect::Postgres).unwrap().sql;
    assert!(sql.contains("FLOOR("), "{sql}");
    assert!(sql.contains("(SELECT"), "{sql}");
    assert!(sql.contains("MIN(") && sql.contains("MAX("), "{sql}");
    assert!(sql.contains("THEN 3"), "{sql}");
    validate_sql(&sql, Dialect::Postgres).unwrap();

    let sqlite = counts.compile(Dialect::Sqlite).unwrap().sql;
    assert!(!sqlite.contains("FLOOR("), "{sqlite}");
    validate_sql(&sqlite, Dialect::Sqlite).unwrap();
}

#[test]
fn test_histogram_with_base_and_width_needs_no_subquery() {
    let t = t();
    let bins = t
        .col("a")
        .unwrap()
        .histogram(HistogramOptions {
            binwidth: Some(2.5),
            base: Some(0.0),
            closed: "right".parse().unwrap(),
            ..HistogramOptions::default()
        })
        .unwrap()
        .name("bin");
    let sql = t.mutate([bins]).unwrap().compile(Dialect::DuckDb).unwrap().sql;
    assert!(!sql.contains("SELECT MIN"), "{sql}");
    assert!(!sql.contains("CASE"), "{sql}");
    assert!(sql.contains("2.5"), "{sql}");
    validate_sql(&sql, Dialect::DuckDb).unwrap();
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_unsupported_operation_names_op_and_dialect() {
    let c = countries();
    let matches = c.col("name").unwrap().rlike("^A").unwrap();
    let filtered = c.filter([matches]).unwrap();

    assert!(filtered.compile(Dialect::Postgres).is_ok());
    let err = filtered.compile(Dialect::TSql).unwrap_err();
    match &err {
        CompileError::UnsupportedOperation { op, dialect } => {
            assert!(op.contains("RegexSearch"), "{op}");
            assert_eq!(dialect, "tsql");
        }
        other => panic!("unexpected error: {other}"),
    }
    let message = err.to_string();
    assert!(message.contains("RegexSearch") && message.contains("tsql"), "{message}");
}

#[test]
fn test_duplicate_output_columns_rejected() {
    let t = t();
    let joined = t.cross_join(&t.view().unwrap()).unwrap();
    let err = joined.compile(Dialect::DuckDb).unwrap_err();
    assert!(
        matches!(err, CompileError::Expr(ExprError::DuplicateColumn(_))),
        "{err}"
    );
}
