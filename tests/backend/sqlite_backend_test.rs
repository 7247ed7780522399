//! End-to-end tests against an in-memory SQLite database.

use std::time::Duration;

use tabula::backend::BackendError;
use tabula::prelude::*;

async fn countries_db() -> Connection {
    let conn = connect(&ConnectionSettings::sqlite_memory()).await.unwrap();
    conn.execute_batch(
        "CREATE TABLE countries (continent TEXT, population INTEGER);
         INSERT INTO countries VALUES ('AF', 100), ('EU', 50), ('XX', 10);
         CREATE TABLE allowed (code TEXT);
         INSERT INTO allowed VALUES ('EU'), ('ZZ');
         CREATE TABLE visits (continent TEXT, free BOOLEAN, seen DATE);
         INSERT INTO visits VALUES
             ('AF', 1, '2024-03-01'),
             ('AF', 0, '2023-07-15'),
             ('EU', NULL, '2024-12-31');",
    )
    .await
    .unwrap();
    conn
}

fn strings(values: Vec<&Datum>) -> Vec<Option<String>> {
    values
        .into_iter()
        .map(|d| d.as_str().map(str::to_string))
        .collect()
}

// ============================================================================
// Introspection
// ============================================================================

#[tokio::test]
async fn test_table_introspection() {
    let conn = countries_db().await;
    let countries = conn.table("countries").await.unwrap();
    assert_eq!(countries.columns(), vec!["continent", "population"]);
    assert_eq!(
        countries.schema().types(),
        vec![&DataType::STRING, &DataType::INT64]
    );

    let visits = conn.table("visits").await.unwrap();
    assert_eq!(
        visits.schema().types(),
        vec![&DataType::STRING, &DataType::BOOLEAN, &DataType::DATE]
    );
}

#[tokio::test]
async fn test_missing_table() {
    let conn = countries_db().await;
    let err = conn.table("nowhere").await.unwrap_err();
    assert!(
        matches!(err, BackendError::SchemaIntrospectionFailure { ref table, .. } if table == "nowhere"),
        "{err}"
    );
}

// ============================================================================
// CASE semantics
// ============================================================================

#[tokio::test]
async fn test_case_with_default() {
    let conn = countries_db().await;
    let t = conn.table("countries").await.unwrap();
    let continent = t.col("continent").unwrap();
    let label = continent
        .case()
        .when("AF", "Africa")
        .unwrap()
        .when("EU", "Europe")
        .unwrap()
        .else_(&continent)
        .unwrap()
        .end()
        .unwrap()
        .name("label");

    let expr = t
        .select([label, t.col("population").unwrap()])
        .unwrap()
        .sort_by([("population", false)])
        .unwrap();
    let result = expr.execute(&conn).await.unwrap();
    assert_eq!(
        strings(result.column("label").unwrap()),
        vec![
            Some("Africa".to_string()),
            Some("Europe".to_string()),
            Some("XX".to_string())
        ]
    );
}

#[tokio::test]
async fn test_case_without_default_is_null() {
    let conn = countries_db().await;
    let t = conn.table("countries").await.unwrap();
    let label = t
        .col("continent")
        .unwrap()
        .case()
        .when("AF", "Africa")
        .unwrap()
        .when("EU", "Europe")
        .unwrap()
        .end()
        .unwrap()
        .name("label");

    let expr = t
        .select([label, t.col("population").unwrap()])
        .unwrap()
        .sort_by([("population", false)])
        .unwrap();
    let result = expr.execute(&conn).await.unwrap();
    assert_eq!(
        strings(result.column("label").unwrap()),
        vec![Some("Africa".to_string()), Some("Europe".to_string()), None]
    );
    assert!(result.rows[2][0].is_null());
}

#[tokio::test]
async fn test_ifelse_three_valued() {
    let conn = countries_db().await;
    let visits = conn.table("visits").await.unwrap();
    let label = visits
        .col("free")
        .unwrap()
        .ifelse("yes", "no")
        .unwrap()
        .name("label");

    let expr = visits
        .select([visits.col("seen").unwrap(), label])
        .unwrap()
        .sort_by(["seen"])
        .unwrap();
    let result = expr.execute(&conn).await.unwrap();
    assert_eq!(
        strings(result.column("label").unwrap()),
        vec![Some("no".to_string()), Some("yes".to_string()), None]
    );
}

#[tokio::test]
async fn test_boolean_columns_decode_as_bool() {
    let conn = countries_db().await;
    let visits = conn.table("visits").await.unwrap();
    let expr = visits
        .select(["seen", "free"])
        .unwrap()
        .sort_by(["seen"])
        .unwrap();
    let result = expr.execute(&conn).await.unwrap();
    assert_eq!(
        result.column("free").unwrap(),
        vec![&Datum::Bool(false), &Datum::Bool(true), &Datum::Null]
    );
}

// ============================================================================
// Membership
// ============================================================================

#[tokio::test]
async fn test_isin_list_matches_equality_chain() {
    let conn = countries_db().await;
    let t = conn.table("countries").await.unwrap();
    let continent = t.col("continent").unwrap();

    let by_list = t
        .filter([continent.isin(["AF", "EU"]).unwrap()])
        .unwrap()
        .sort_by(["population"])
        .unwrap();
    let by_chain = t
        .filter([continent
            .eq("AF")
            .unwrap()
            .or(continent.eq("EU").unwrap())
            .unwrap()])
        .unwrap()
        .sort_by(["population"])
        .unwrap();

    let a = by_list.execute(&conn).await.unwrap();
    let b = by_chain.execute(&conn).await.unwrap();
    assert_eq!(a.len(), 2);
    assert_eq!(a.rows, b.rows);
}

#[tokio::test]
async fn test_notin_list() {
    let conn = countries_db().await;
    let t = conn.table("countries").await.unwrap();
    let expr = t
        .filter([t.col("continent").unwrap().notin(["AF", "EU"]).unwrap()])
        .unwrap();
    let result = expr.execute(&conn).await.unwrap();
    assert_eq!(result.rows, vec![vec![Datum::from("XX"), Datum::Int(10)]]);
}

#[tokio::test]
async fn test_isin_other_table() {
    let conn = countries_db().await;
    let t = conn.table("countries").await.unwrap();
    let allowed = conn.table("allowed").await.unwrap();
    let expr = t
        .filter([t
            .col("continent")
            .unwrap()
            .isin(allowed.col("code").unwrap())
            .unwrap()])
        .unwrap();
    let result = expr.execute(&conn).await.unwrap();
    assert_eq!(result.rows, vec![vec![Datum::from("EU"), Datum::Int(50)]]);
}

#[tokio::test]
async fn test_isin_topk_of_same_table() {
    let conn = countries_db().await;
    let visits = conn.table("visits").await.unwrap();
    let continent = visits.col("continent").unwrap();
    let top = continent.topk(1).unwrap();
    let expr = visits
        .filter([continent.isin(top.col("continent").unwrap()).unwrap()])
        .unwrap()
        .select(["continent"])
        .unwrap();
    let result = expr.execute(&conn).await.unwrap();
    assert_eq!(
        strings(result.column("continent").unwrap()),
        vec![Some("AF".to_string()), Some("AF".to_string())]
    );
}

// ============================================================================
// topk
// ============================================================================

#[tokio::test]
async fn test_topk() {
    let conn = countries_db().await;
    let visits = conn.table("visits").await.unwrap();
    let top = visits.col("continent").unwrap().topk(1).unwrap();
    let result = top.execute(&conn).await.unwrap();
    assert_eq!(result.rows, vec![vec![Datum::from("AF"), Datum::Int(2)]]);
}

#[tokio::test]
async fn test_topk_zero_is_empty_with_same_schema() {
    let conn = countries_db().await;
    let visits = conn.table("visits").await.unwrap();
    let continent = visits.col("continent").unwrap();

    let none = continent.topk(0).unwrap().execute(&conn).await.unwrap();
    let some = continent.topk(2).unwrap().execute(&conn).await.unwrap();
    assert!(none.is_empty());
    assert_eq!(some.len(), 2);
    assert_eq!(none.schema, some.schema);
}

// ============================================================================
// histogram
// ============================================================================

async fn population_bins(options: HistogramOptions) -> Vec<Datum> {
    let conn = countries_db().await;
    let t = conn.table("countries").await.unwrap();
    let population = t.col("population").unwrap();
    let bins = population.histogram(options).unwrap().name("bin");
    let result = t
        .select([population, bins])
        .unwrap()
        .sort_by([("population", true)])
        .unwrap()
        .execute(&conn)
        .await
        .unwrap();
    result.column("bin").unwrap().into_iter().cloned().collect()
}

#[tokio::test]
async fn test_histogram_nbins_puts_maximum_in_last_bin() {
    let bins = population_bins(HistogramOptions {
        nbins: Some(3),
        ..HistogramOptions::default()
    })
    .await;
    assert_eq!(bins, vec![Datum::Int(0), Datum::Int(1), Datum::Int(2)]);
}

#[tokio::test]
async fn test_histogram_right_closed_puts_minimum_in_first_bin() {
    let bins = population_bins(HistogramOptions {
        nbins: Some(3),
        closed: Closed::Right,
        ..HistogramOptions::default()
    })
    .await;
    assert_eq!(bins, vec![Datum::Int(0), Datum::Int(1), Datum::Int(2)]);
}

#[tokio::test]
async fn test_histogram_binwidth_from_base() {
    let bins = population_bins(HistogramOptions {
        binwidth: Some(25.0),
        base: Some(0.0),
        ..HistogramOptions::default()
    })
    .await;
    assert_eq!(bins, vec![Datum::Int(0), Datum::Int(2), Datum::Int(4)]);
}

#[tokio::test]
async fn test_histogram_group_counts() {
    let conn = countries_db().await;
    let t = conn.table("countries").await.unwrap();
    let bins = t
        .col("population")
        .unwrap()
        .histogram(HistogramOptions {
            binwidth: Some(60.0),
            ..HistogramOptions::default()
        })
        .unwrap()
        .name("bin");
    let result = t
        .group_by([bins])
        .unwrap()
        .count()
        .unwrap()
        .sort_by([("bin", true)])
        .unwrap()
        .execute(&conn)
        .await
        .unwrap();
    assert_eq!(
        result.rows,
        vec![
            vec![Datum::Int(0), Datum::Int(2)],
            vec![Datum::Int(1), Datum::Int(1)],
        ]
    );
}

// ============================================================================
// Other operations
// ============================================================================

#[tokio::test]
async fn test_aggregate_and_strings() {
    let conn = countries_db().await;
    let t = conn.table("countries").await.unwrap();
    let expr = t
        .aggregate(
            [
                t.col("population").unwrap().sum().unwrap().name("total"),
                t.col("population").unwrap().mean().unwrap().name("avg"),
            ],
            [],
        )
        .unwrap();
    let result = expr.execute(&conn).await.unwrap();
    assert_eq!(result.rows[0][0], Datum::Int(160));
    let avg = result.rows[0][1].as_f64().unwrap();
    assert!((avg - 160.0 / 3.0).abs() < 1e-9, "{avg}");

    let lowered = t
        .filter([t.col("continent").unwrap().startswith("E").unwrap()])
        .unwrap()
        .select([t.col("continent").unwrap().lower().unwrap().name("c")])
        .unwrap();
    let result = lowered.execute(&conn).await.unwrap();
    assert_eq!(result.rows, vec![vec![Datum::from("eu")]]);
}

#[tokio::test]
async fn test_regex_and_dates() {
    let conn = countries_db().await;
    let visits = conn.table("visits").await.unwrap();
    let seen = visits.col("seen").unwrap();
    let expr = visits
        .filter([visits.col("continent").unwrap().rlike("^A").unwrap()])
        .unwrap()
        .select([seen.year().unwrap().name("y"), seen.month().unwrap().name("m")])
        .unwrap()
        .sort_by(["y"])
        .unwrap();
    let result = expr.execute(&conn).await.unwrap();
    assert_eq!(
        result.rows,
        vec![
            vec![Datum::Int(2023), Datum::Int(7)],
            vec![Datum::Int(2024), Datum::Int(3)]
        ]
    );
}

#[tokio::test]
async fn test_constant_column() {
    let conn = countries_db().await;
    let value = lit(7).unwrap().mul(6).unwrap().name("answer");
    let result = value.execute(&conn).await.unwrap();
    assert_eq!(result.rows, vec![vec![Datum::Int(42)]]);
}

// ============================================================================
// Timeouts
// ============================================================================

#[tokio::test]
async fn test_timeout_from_settings() {
    let settings = ConnectionSettings::sqlite_memory().with_timeout("1ms");
    let conn = connect(&settings).await.unwrap();

    let slow = CompiledQuery {
        sql: "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 2000000) \
              SELECT COUNT(*) FROM c"
            .to_string(),
        schema: Schema::from_pairs([("n", "int64")]).unwrap(),
        dialect: Dialect::Sqlite,
    };
    let err = conn.run(&slow).await.unwrap_err();
    assert!(
        matches!(err, BackendError::Timeout(d) if d == Duration::from_millis(1)),
        "{err}"
    );
}

fn counting_query(n: i64) -> CompiledQuery {
    CompiledQuery {
        sql: format!(
            "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < {n}) \
             SELECT COUNT(*) FROM c"
        ),
        schema: Schema::from_pairs([("n", "int64")]).unwrap(),
        dialect: Dialect::Sqlite,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timeout_only_cancels_its_own_call() {
    let patient = connect(&ConnectionSettings::sqlite_memory()).await.unwrap();
    let hasty = patient.clone().with_timeout(Duration::from_millis(50));

    let long = {
        let patient = patient.clone();
        tokio::spawn(async move { patient.run(&counting_query(3_000_000)).await })
    };
    // Let the long query take the connection first.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = hasty
        .execute_batch("CREATE TABLE marker (x INTEGER)")
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Timeout(_)), "{err}");

    let counted = long.await.unwrap().unwrap();
    assert_eq!(counted.rows, vec![vec![Datum::Int(3_000_000)]]);

    // The timed-out statement was still queued; it must not run later.
    let err = patient.table("marker").await.unwrap_err();
    assert!(
        matches!(err, BackendError::SchemaIntrospectionFailure { .. }),
        "{err}"
    );
}

#[tokio::test]
async fn test_invalid_timeout_rejected() {
    let settings = ConnectionSettings::sqlite_memory().with_timeout("soon");
    assert!(connect(&settings).await.is_err());
}
