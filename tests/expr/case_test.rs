//! Integration tests for CASE builders and `ifelse`.

use tabula::ir::Op;
use tabula::prelude::*;

fn t() -> Table {
    table(
        "countries",
        [("continent", "string"), ("population", "int64"), ("free", "boolean")],
    )
    .unwrap()
}

#[test]
fn test_simple_case_with_column_default() {
    let continent = t().col("continent").unwrap();
    let label = continent
        .case()
        .when("AF", "Africa")
        .unwrap()
        .when("EU", "Europe")
        .unwrap()
        .else_(&continent)
        .unwrap()
        .end()
        .unwrap();

    assert_eq!(label.dtype(), &DataType::STRING);
    match label.node().op() {
        Op::SimpleCase { cases, default, .. } => {
            assert_eq!(cases.len(), 2);
            assert!(default.is_some());
        }
        other => panic!("expected a simple case, got {:?}", other.tag()),
    }
}

#[test]
fn test_case_without_default_records_none() {
    let continent = t().col("continent").unwrap();
    let label = continent.case().when("AF", "Africa").unwrap().end().unwrap();
    assert!(matches!(label.node().op(), Op::SimpleCase { default: None, .. }));
}

#[test]
fn test_searched_case_numeric_results_promote() {
    let pop = t().col("population").unwrap();
    let size = case()
        .when(pop.gt(1_000_000).unwrap(), 2)
        .unwrap()
        .when(pop.gt(1_000).unwrap(), 1)
        .unwrap()
        .else_(0.5)
        .unwrap()
        .end()
        .unwrap();
    assert_eq!(size.dtype(), &DataType::FLOAT64);
}

#[test]
fn test_searched_case_rejects_non_boolean_condition() {
    let continent = t().col("continent").unwrap();
    let err = case().when(&continent, "x").unwrap_err();
    assert!(matches!(err, ExprError::TypeMismatch { .. }), "{err}");
}

#[test]
fn test_end_without_branches() {
    let continent = t().col("continent").unwrap();
    let err = continent.case().else_("x").unwrap().end().unwrap_err();
    assert!(matches!(err, ExprError::EmptyCase));
}

#[test]
fn test_builders_are_persistent() {
    let continent = t().col("continent").unwrap();
    let base = continent.case().when("AF", "Africa").unwrap();
    let a = base.clone().end().unwrap();
    let b = base.when("EU", "Europe").unwrap().end().unwrap();
    assert!(!a.equals(&b));
    assert!(matches!(a.node().op(), Op::SimpleCase { cases, .. } if cases.len() == 1));
}

#[test]
fn test_ifelse() {
    let free = t().col("free").unwrap();
    let label = free.ifelse("free", "not free").unwrap();
    assert_eq!(label.dtype(), &DataType::STRING);

    let err = free.ifelse("free", 0).unwrap_err();
    assert!(matches!(err, ExprError::TypeMismatch { .. }), "{err}");

    let pop = t().col("population").unwrap();
    let err = pop.ifelse(1, 2).unwrap_err();
    assert!(matches!(err, ExprError::TypeMismatch { .. }), "{err}");
}

#[test]
fn test_case_usable_in_select() {
    let table = t();
    let label = table
        .col("continent")
        .unwrap()
        .case()
        .when("AF", "Africa")
        .unwrap()
        .end()
        .unwrap()
        .name("label");
    let out = table.select([label]).unwrap();
    assert_eq!(out.columns(), vec!["label"]);
}
