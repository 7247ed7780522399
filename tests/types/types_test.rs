//! Integration tests for the type system as seen through the builder.

use tabula::types::{common_supertype, parse_type};
use tabula::{lit, table, DataType, ExprError};

// ============================================================================
// Parsing
// ============================================================================

#[test]
fn test_parse_type_names_used_in_declarations() {
    let t = table(
        "events",
        [
            ("id", "int64"),
            ("score", "float"),
            ("label", "string"),
            ("at", "timestamp('UTC')"),
            ("tags", "array<string>"),
        ],
    )
    .unwrap();

    let types: Vec<String> = t.schema().types().iter().map(|t| t.to_string()).collect();
    assert_eq!(types[0], "int64");
    assert_eq!(types[1], "float64");
    assert_eq!(types[2], "string");
    assert_eq!(t.schema().types()[4], &DataType::array(DataType::STRING));
}

#[test]
fn test_unknown_type_name_fails_declaration() {
    let err = table("t", [("a", "integer64")]).unwrap_err();
    assert!(matches!(err, ExprError::InvalidType { .. }), "{err}");
}

#[test]
fn test_parse_nested_struct() {
    let dtype = parse_type("struct<x: int32, y: map<string, float64>>").unwrap();
    assert!(dtype.is_nested());
    assert!(!dtype.is_numeric());
}

// ============================================================================
// Promotion
// ============================================================================

#[test]
fn test_arithmetic_promotes_to_common_supertype() {
    let t = table("t", [("small", "int8"), ("wide", "int32"), ("f", "float32")]).unwrap();
    let small = t.col("small").unwrap();

    let sum = small.add(t.col("wide").unwrap()).unwrap();
    assert_eq!(sum.dtype(), &DataType::INT32);

    let mixed = small.mul(t.col("f").unwrap()).unwrap();
    assert!(mixed.dtype().is_floating());
}

#[test]
fn test_integer_division_is_floating() {
    let t = table("t", [("a", "int64"), ("b", "int64")]).unwrap();
    let q = t.col("a").unwrap().div(t.col("b").unwrap()).unwrap();
    assert_eq!(q.dtype(), &DataType::FLOAT64);
}

#[test]
fn test_null_literal_takes_other_side() {
    assert_eq!(
        common_supertype(&DataType::NULL, &DataType::DATE).unwrap(),
        DataType::DATE
    );
    let t = table("t", [("d", "date")]).unwrap();
    let filled = t.col("d").unwrap().coalesce([tabula::null().unwrap()]).unwrap();
    assert_eq!(filled.dtype(), &DataType::DATE);
}

// ============================================================================
// Construction-time failures
// ============================================================================

#[test]
fn test_cast_then_add_struct_fails_at_construction() {
    let t = table("t", [("a", "int32"), ("b", "struct<x: int64>")]).unwrap();
    let as_float = t.col("a").unwrap().cast("float").unwrap();
    let err = as_float.add(t.col("b").unwrap()).unwrap_err();
    assert!(matches!(err, ExprError::TypeMismatch { .. }), "{err}");
}

#[test]
fn test_comparing_string_with_number_fails() {
    let t = table("t", [("s", "string")]).unwrap();
    let err = t.col("s").unwrap().gt(1).unwrap_err();
    assert!(matches!(err, ExprError::TypeMismatch { .. }), "{err}");
}

#[test]
fn test_invalid_cast_is_rejected() {
    let t = table("t", [("flag", "boolean")]).unwrap();
    let err = t.col("flag").unwrap().cast("date").unwrap_err();
    assert!(matches!(err, ExprError::InvalidCast { .. }), "{err}");
}

#[test]
fn test_capabilities_follow_the_type() {
    let t = table(
        "t",
        [("d", "date"), ("ts", "timestamp"), ("n", "int64"), ("s", "string")],
    )
    .unwrap();
    let d = t.col("d").unwrap();
    let ts = t.col("ts").unwrap();
    let n = t.col("n").unwrap();

    assert!(d.year().is_ok());
    assert!(ts.millisecond().is_ok());
    assert!(matches!(d.hour(), Err(ExprError::TypeMismatch { .. })));
    assert!(matches!(n.upper(), Err(ExprError::TypeMismatch { .. })));
    assert!(matches!(
        t.col("s").unwrap().sum(),
        Err(ExprError::TypeMismatch { .. })
    ));
}

#[test]
fn test_reducing_a_constant_is_a_shape_error() {
    let err = lit(3).unwrap().sum().unwrap_err();
    assert!(matches!(err, ExprError::ShapeMismatch { .. }), "{err}");
}
