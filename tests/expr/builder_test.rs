//! Integration tests for the fluent builder: schemas, naming, identity and
//! construction-time validation.

use tabula::ir::{Op, Shape};
use tabula::prelude::*;

fn countries() -> Table {
    table(
        "countries",
        [
            ("name", "string"),
            ("continent", "string"),
            ("population", "int64"),
            ("area_km2", "float64"),
            ("independence", "date"),
        ],
    )
    .unwrap()
}

// ============================================================================
// Schemas
// ============================================================================

#[test]
fn test_select_distinct_keeps_requested_order() {
    let t = countries();
    let picked = t.select(["population", "name"]).unwrap().distinct().unwrap();
    assert_eq!(picked.columns(), vec!["population", "name"]);
    assert_eq!(
        picked.schema().types(),
        vec![&DataType::INT64, &DataType::STRING]
    );
}

#[test]
fn test_mutate_appends_and_replaces() {
    let t = countries();
    let density = t
        .col("population")
        .unwrap()
        .div(t.col("area_km2").unwrap())
        .unwrap()
        .name("density");
    let upper = t.col("name").unwrap().upper().unwrap().name("name");

    let out = t.mutate([density, upper]).unwrap();
    assert_eq!(
        out.columns(),
        vec!["name", "continent", "population", "area_km2", "independence", "density"]
    );
    assert_eq!(out.schema().lookup("density").unwrap().1, &DataType::FLOAT64);
}

#[test]
fn test_aggregate_schema() {
    let t = countries();
    let stats = t
        .group_by(["continent"])
        .unwrap()
        .aggregate([
            t.col("population").unwrap().sum().unwrap().name("total"),
            t.col("area_km2").unwrap().mean().unwrap().name("avg_area"),
        ])
        .unwrap();
    assert_eq!(stats.columns(), vec!["continent", "total", "avg_area"]);
    assert_eq!(stats.schema().lookup("total").unwrap().1, &DataType::INT64);
}

#[test]
fn test_value_counts_schema() {
    let t = countries();
    let counts = t.col("continent").unwrap().value_counts().unwrap();
    assert_eq!(counts.columns(), vec!["continent", "count"]);
    assert_eq!(counts.schema().lookup("count").unwrap().1, &DataType::INT64);
}

#[test]
fn test_topk_zero_has_same_schema() {
    let c = countries().col("continent").unwrap();
    let none = c.topk(0).unwrap();
    let some = c.topk(3).unwrap();
    assert_eq!(none.schema(), some.schema());
}

// ============================================================================
// Naming
// ============================================================================

#[test]
fn test_name_does_not_change_identity() {
    let t = countries();
    let pop = t.col("population").unwrap();
    let renamed = pop.clone().name("people");
    assert!(pop.equals(&renamed));
    assert_eq!(renamed.get_name(), "people");
    assert_eq!(pop.get_name(), "population");
}

#[test]
fn test_derived_names() {
    let t = countries();
    let pop = t.col("population").unwrap();
    assert_eq!(pop.max().unwrap().get_name(), "Max(population)");
    assert_eq!(pop.isnull().unwrap().get_name(), "IsNull(population)");
}

// ============================================================================
// Identity and sharing
// ============================================================================

#[test]
fn test_structurally_equal_builds_share_identity() {
    let a = countries().filter([countries().col("population").unwrap().gt(10).unwrap()]);
    let b = countries().filter([countries().col("population").unwrap().gt(10).unwrap()]);
    assert!(a.unwrap().equals(&b.unwrap()));
}

#[test]
fn test_views_are_distinct_relations() {
    let t = countries();
    let v1 = t.view_as("v1").unwrap();
    let v2 = t.view_as("v2").unwrap();
    assert!(!v1.equals(&v2));
    assert!(!v1.equals(&t));
    assert!(!t.view().unwrap().view().unwrap().equals(&t.view().unwrap()));
    assert_eq!(v1.schema(), t.schema());
}

#[test]
fn test_view_identity_does_not_depend_on_call_order() {
    let first = countries().view().unwrap();
    let _unrelated = countries().view_as("other").unwrap();
    let _more = countries().view().unwrap().view().unwrap();
    let second = countries().view().unwrap();
    assert!(first.equals(&second));
    assert_eq!(first.node().id(), second.node().id());
}

#[test]
fn test_three_way_self_join_with_tagged_views() {
    let t = countries();
    let a = t.view_as("a").unwrap();
    let b = t.view_as("b").unwrap();
    assert!(t.cross_join(&a).unwrap().cross_join(&b).is_ok());
    let err = a.cross_join(&t.view_as("a").unwrap()).unwrap_err();
    assert!(err.to_string().contains("view()"), "{err}");
}

#[test]
fn test_builder_calls_do_not_mutate_receiver() {
    let t = countries();
    let before = t.node().id();
    let _ = t.filter([t.col("population").unwrap().gt(0).unwrap()]).unwrap();
    let _ = t.limit(3).unwrap();
    assert_eq!(t.node().id(), before);
}

// ============================================================================
// Dereferencing through derived tables
// ============================================================================

#[test]
fn test_column_of_base_table_usable_after_filter() {
    let t = countries();
    let big = t.filter([t.col("population").unwrap().gt(1_000_000).unwrap()]).unwrap();
    let names = big.select([t.col("name").unwrap()]).unwrap();

    match names.node().op() {
        Op::Projection { input, columns } => {
            assert_eq!(input.id(), big.node().id());
            match columns[0].1.op() {
                Op::Field { table, .. } => assert_eq!(table.id(), big.node().id()),
                other => panic!("expected a field, got {:?}", other.tag()),
            }
        }
        other => panic!("expected a projection, got {:?}", other.tag()),
    }
}

#[test]
fn test_foreign_column_rejected() {
    let t = countries();
    let other = table("cities", [("name", "string")]).unwrap();
    let err = t.select([other.col("name").unwrap()]).unwrap_err();
    assert!(matches!(err, ExprError::UnboundColumn { .. }), "{err}");
}

#[test]
fn test_reduction_in_filter_rejected() {
    let t = countries();
    let total = t.col("population").unwrap().sum().unwrap();
    let err = t.filter([total.gt(100).unwrap()]).unwrap_err();
    assert!(matches!(err, ExprError::ShapeMismatch { .. }), "{err}");
}

#[test]
fn test_unknown_column_lists_alternatives() {
    let err = countries().col("capital").unwrap_err();
    match err {
        ExprError::UnknownColumn { column, available } => {
            assert_eq!(column, "capital");
            assert!(available.contains("continent"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ============================================================================
// Membership
// ============================================================================

#[test]
fn test_isin_literal_list() {
    let c = countries().col("continent").unwrap();
    let test = c.isin(["AF", "EU"]).unwrap();
    assert_eq!(test.dtype(), &DataType::BOOLEAN);
    assert!(matches!(test.node().op(), Op::InValues { negated: false, .. }));

    let negated = c.notin(vec!["AS"]).unwrap();
    assert!(matches!(negated.node().op(), Op::InValues { negated: true, .. }));
}

#[test]
fn test_isin_incomparable_values() {
    let c = countries().col("continent").unwrap();
    let err = c.isin([1, 2]).unwrap_err();
    assert!(matches!(err, ExprError::TypeMismatch { .. }), "{err}");
}

#[test]
fn test_isin_other_table_column() {
    let t = countries();
    let allowed = table("allowed", [("code", "string")]).unwrap();
    let test = t
        .col("continent")
        .unwrap()
        .isin(allowed.col("code").unwrap())
        .unwrap();
    assert!(matches!(test.node().op(), Op::InColumn { .. }));
    assert!(t.filter([test]).is_ok());
}

#[test]
fn test_isin_topk_of_same_table() {
    let t = countries();
    let continent = t.col("continent").unwrap();
    let top = continent.topk(2).unwrap();
    let test = continent.isin(top.col("continent").unwrap()).unwrap();
    let filtered = t.filter([test]).unwrap();
    assert_eq!(filtered.schema(), t.schema());
}

#[test]
fn test_isin_same_table_column_rejected() {
    let t = countries();
    let err = t
        .col("name")
        .unwrap()
        .isin(t.col("continent").unwrap())
        .unwrap_err();
    assert!(matches!(err, ExprError::InvalidMembership(_)), "{err}");
}

// ============================================================================
// Shapes
// ============================================================================

#[test]
fn test_shapes() {
    let t = countries();
    let pop = t.col("population").unwrap();
    assert_eq!(pop.shape(), Shape::Columnar);
    assert_eq!(pop.sum().unwrap().shape(), Shape::Scalar);
    assert!(pop.sum().unwrap().is_reduction());
    assert_eq!(lit(1).unwrap().shape(), Shape::Scalar);
    assert!(!lit(1).unwrap().is_reduction());
}

#[test]
fn test_bucket() {
    let pop = countries().col("population").unwrap();
    let opts = BucketOptions {
        include_over: true,
        ..BucketOptions::default()
    };
    let b = pop.bucket([0, 1_000, 1_000_000], opts).unwrap();
    assert_eq!(b.bucket_count(), Some(3));
    assert!(pop.bucket([10, 1], BucketOptions::default()).is_err());

    let name = countries().col("name").unwrap();
    assert!(name.bucket([0, 1], BucketOptions::default()).is_err());
}
