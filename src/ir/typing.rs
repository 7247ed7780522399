//! Signature table: output type and shape of every operation.
//!
//! [`infer`] is called exactly once per node, from [`Node::new`]. Relation
//! operations are delegated to [`schema::resolve`]; value operations are
//! checked here.
//!
//! [`Node::new`]: super::Node::new

use super::ops::{is_aggregate, Op};
use super::{BinaryOp, Datum, NodeRef, Output, ReductionFunc, Shape, StringFunc};
use crate::error::{ExprError, ExprResult};
use crate::schema;
use crate::types::capability::{require, Method};
use crate::types::{common_supertype, common_supertype_all, DataType, IntervalUnit};

/// Compute the output of an operation, validating its operands.
pub fn infer(op: &Op) -> ExprResult<Output> {
    if op.is_relation() {
        return Ok(Output::Relation(schema::resolve(op)?));
    }
    let dtype = value_type(op)?;
    let shape = value_shape(op)?;
    Ok(Output::Value { dtype, shape })
}

/// Type of a literal, validating an explicit type against the value.
pub fn literal_type(value: &Datum, dtype: Option<DataType>) -> ExprResult<DataType> {
    if let Datum::Float(x) = value {
        if !x.is_finite() {
            return Err(ExprError::InvalidArgument(format!(
                "literal {} is not a finite number",
                x
            )));
        }
    }

    let Some(dtype) = dtype else {
        return Ok(natural_type(value));
    };

    let fits = match (value, &dtype) {
        (Datum::Null, _) => true,
        (Datum::Bool(_), DataType::Boolean) => true,
        (Datum::Int(n), DataType::Int { bits, signed }) => int_fits(*n, *bits, *signed),
        (Datum::Int(_), DataType::Float { .. } | DataType::Decimal { .. }) => true,
        (Datum::Int(_), DataType::Interval(_)) => true,
        (Datum::Float(_), DataType::Float { .. } | DataType::Decimal { .. }) => true,
        (Datum::String(_), DataType::String) => true,
        (Datum::String(_), t) if t.is_temporal() || t.is_decimal() => true,
        (Datum::Bytes(_), DataType::Binary) => true,
        _ => false,
    };
    if fits {
        Ok(dtype)
    } else {
        Err(ExprError::mismatch("literal", &dtype, value.kind()))
    }
}

fn natural_type(value: &Datum) -> DataType {
    match value {
        Datum::Null => DataType::NULL,
        Datum::Bool(_) => DataType::BOOLEAN,
        Datum::Int(n) => {
            if i8::try_from(*n).is_ok() {
                DataType::INT8
            } else if i16::try_from(*n).is_ok() {
                DataType::INT16
            } else if i32::try_from(*n).is_ok() {
                DataType::INT32
            } else {
                DataType::INT64
            }
        }
        Datum::Float(_) => DataType::FLOAT64,
        Datum::String(_) => DataType::STRING,
        Datum::Bytes(_) => DataType::BINARY,
    }
}

fn int_fits(n: i64, bits: u8, signed: bool) -> bool {
    if signed {
        match bits {
            8 => i8::try_from(n).is_ok(),
            16 => i16::try_from(n).is_ok(),
            32 => i32::try_from(n).is_ok(),
            _ => true,
        }
    } else {
        match bits {
            8 => u8::try_from(n).is_ok(),
            16 => u16::try_from(n).is_ok(),
            32 => u32::try_from(n).is_ok(),
            _ => n >= 0,
        }
    }
}

/// Whether two values can be compared with `=`.
///
/// Temporal values also compare against strings, which the backend parses.
pub fn comparable(a: &DataType, b: &DataType) -> bool {
    common_supertype(a, b).is_ok()
        || (a.is_temporal() && b.is_string())
        || (a.is_string() && b.is_temporal())
}

fn dtype(node: &NodeRef) -> ExprResult<&DataType> {
    node.value_type()
}

fn is_boolean_like(t: &DataType) -> bool {
    t.is_boolean() || t.is_null()
}

fn value_type(op: &Op) -> ExprResult<DataType> {
    match op {
        Op::Field { table, name } => Ok(table.relation_schema()?.lookup(name)?.1.clone()),
        Op::Literal { dtype, .. } => Ok(dtype.clone()),
        Op::Binary { op, left, right } => binary_type(*op, dtype(left)?, dtype(right)?),
        Op::Not { arg } => {
            let t = dtype(arg)?;
            if !is_boolean_like(t) {
                return Err(ExprError::mismatch("Not", DataType::BOOLEAN, t));
            }
            Ok(DataType::BOOLEAN)
        }
        Op::Negate { arg } => {
            let t = dtype(arg)?;
            require(t, Method::Negate)?;
            Ok(t.clone())
        }
        Op::Cast { arg, to } => {
            let from = dtype(arg)?;
            if !from.can_cast_explicitly(to) {
                return Err(ExprError::InvalidCast {
                    from: from.clone(),
                    to: to.clone(),
                });
            }
            Ok(to.clone())
        }
        Op::IsNull { arg } | Op::NotNull { arg } => {
            dtype(arg)?;
            Ok(DataType::BOOLEAN)
        }
        Op::SimpleCase {
            base,
            cases,
            default,
        } => {
            if cases.is_empty() {
                return Err(ExprError::EmptyCase);
            }
            let base_type = dtype(base)?;
            for (when, _) in cases {
                let when_type = dtype(when)?;
                if !comparable(base_type, when_type) {
                    return Err(ExprError::mismatch("case when", base_type, when_type));
                }
            }
            case_result_type(cases, default)
        }
        Op::SearchedCase { cases, default } => {
            if cases.is_empty() {
                return Err(ExprError::EmptyCase);
            }
            for (when, _) in cases {
                let t = dtype(when)?;
                if !is_boolean_like(t) {
                    return Err(ExprError::mismatch("case when", DataType::BOOLEAN, t));
                }
            }
            case_result_type(cases, default)
        }
        Op::InValues { arg, options, .. } => {
            let t = dtype(arg)?;
            for option in options {
                let o = dtype(option)?;
                if !comparable(t, o) {
                    return Err(ExprError::mismatch("isin", t, o));
                }
            }
            Ok(DataType::BOOLEAN)
        }
        Op::InColumn { arg, column, .. } => {
            let t = dtype(arg)?;
            let c = dtype(column)?;
            if !comparable(t, c) {
                return Err(ExprError::mismatch("isin", t, c));
            }
            Ok(DataType::BOOLEAN)
        }
        Op::Coalesce { args } => {
            if args.is_empty() {
                return Err(ExprError::InvalidArgument(
                    "coalesce requires at least one argument".into(),
                ));
            }
            let types = args.iter().map(dtype).collect::<ExprResult<Vec<_>>>()?;
            common_supertype_all(types)
        }
        Op::String { func, args } => string_type(*func, args),
        Op::ExtractField { arg, unit } => {
            require(dtype(arg)?, unit.method())?;
            Ok(DataType::INT32)
        }
        Op::Reduction { func, arg } => reduction_type(*func, arg),
        Op::CountStar { table } => {
            table.relation_schema()?;
            Ok(DataType::INT64)
        }
        Op::Bucket { arg, .. } => {
            require(dtype(arg)?, Method::Bucket)?;
            Ok(DataType::INT8)
        }
        Op::Histogram { arg, .. } => {
            require(dtype(arg)?, Method::Histogram)?;
            Ok(DataType::INT64)
        }
        _ => Err(ExprError::InvalidArgument(format!(
            "`{}` is not a value operation",
            op.tag()
        ))),
    }
}

fn case_result_type(
    cases: &[(NodeRef, NodeRef)],
    default: &Option<NodeRef>,
) -> ExprResult<DataType> {
    let mut types = Vec::with_capacity(cases.len() + 1);
    for (_, then) in cases {
        types.push(dtype(then)?);
    }
    if let Some(default) = default {
        types.push(dtype(default)?);
    }
    common_supertype_all(types).map_err(|_| {
        ExprError::mismatch(
            "case results",
            "results with a common type",
            types_list(cases, default),
        )
    })
}

fn types_list(cases: &[(NodeRef, NodeRef)], default: &Option<NodeRef>) -> String {
    cases
        .iter()
        .map(|(_, then)| then)
        .chain(default)
        .filter_map(|n| n.dtype())
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn binary_type(op: BinaryOp, l: &DataType, r: &DataType) -> ExprResult<DataType> {
    let context = op.name();

    if op.is_logical() {
        if !is_boolean_like(l) {
            return Err(ExprError::mismatch(context, DataType::BOOLEAN, l));
        }
        if !is_boolean_like(r) {
            return Err(ExprError::mismatch(context, DataType::BOOLEAN, r));
        }
        return Ok(DataType::BOOLEAN);
    }

    if op.is_comparison() {
        if !comparable(l, r) {
            return Err(ExprError::mismatch(context, l, r));
        }
        if op.is_ordering() && !(l.is_orderable() && r.is_orderable()) {
            return Err(ExprError::mismatch(context, "orderable operands", format!("{} and {}", l, r)));
        }
        return Ok(DataType::BOOLEAN);
    }

    if let Some(t) = temporal_arithmetic(op, l, r) {
        return Ok(t);
    }

    let numeric = |t: &DataType| t.is_numeric() || t.is_null();
    if !numeric(l) || !numeric(r) {
        return Err(ExprError::mismatch(
            context,
            "numeric operands",
            format!("{} and {}", l, r),
        ));
    }
    if op == BinaryOp::Divide {
        if l.is_decimal() && r.is_decimal() {
            return common_supertype(l, r);
        }
        return Ok(DataType::FLOAT64);
    }
    common_supertype(l, r)
}

fn temporal_arithmetic(op: BinaryOp, l: &DataType, r: &DataType) -> Option<DataType> {
    use DataType::*;
    match (op, l, r) {
        (BinaryOp::Subtract, Timestamp { .. }, Timestamp { .. }) => {
            Some(Interval(IntervalUnit::Second))
        }
        (BinaryOp::Subtract, Date, Date) => Some(Interval(IntervalUnit::Day)),
        (BinaryOp::Add | BinaryOp::Subtract, Timestamp { .. } | Date, Interval(_)) => {
            Some(l.clone())
        }
        (BinaryOp::Add, Interval(_), Timestamp { .. } | Date) => Some(r.clone()),
        (BinaryOp::Add | BinaryOp::Subtract, Interval(a), Interval(b)) if a == b => {
            Some(l.clone())
        }
        _ => None,
    }
}

fn string_type(func: StringFunc, args: &[NodeRef]) -> ExprResult<DataType> {
    if args.len() != func.arity() {
        return Err(ExprError::InvalidArgument(format!(
            "{} takes {} arguments, got {}",
            func.name(),
            func.arity(),
            args.len()
        )));
    }
    require(dtype(&args[0])?, func.method())?;

    for arg in &args[1..] {
        let t = dtype(arg)?;
        let ok = match func {
            StringFunc::Substring | StringFunc::StrLeft | StringFunc::StrRight => {
                t.is_integer() || t.is_null()
            }
            _ => t.is_string() || t.is_null(),
        };
        if !ok {
            let expected = if t.is_string() { "integer" } else { "string" };
            return Err(ExprError::mismatch(func.name(), expected, t));
        }
    }

    Ok(match func {
        StringFunc::StringLength => DataType::INT32,
        f if f.is_predicate() => DataType::BOOLEAN,
        _ => DataType::STRING,
    })
}

fn reduction_type(func: ReductionFunc, arg: &NodeRef) -> ExprResult<DataType> {
    let t = dtype(arg)?;
    if arg.shape() != Some(Shape::Columnar) || is_aggregate(arg) {
        return Err(ExprError::ShapeMismatch {
            context: func.name().into(),
            message: "argument must be a column".into(),
        });
    }
    match func {
        ReductionFunc::Count | ReductionFunc::CountDistinct => Ok(DataType::INT64),
        ReductionFunc::Sum => {
            require(t, Method::Sum)?;
            Ok(match t {
                DataType::Decimal { .. } => t.clone(),
                DataType::Float { .. } => DataType::FLOAT64,
                _ => DataType::INT64,
            })
        }
        ReductionFunc::Mean => {
            require(t, Method::Mean)?;
            Ok(if t.is_decimal() {
                t.clone()
            } else {
                DataType::FLOAT64
            })
        }
        ReductionFunc::Min => {
            require(t, Method::Min)?;
            Ok(t.clone())
        }
        ReductionFunc::Max => {
            require(t, Method::Max)?;
            Ok(t.clone())
        }
    }
}

fn value_shape(op: &Op) -> ExprResult<Shape> {
    match op {
        Op::Field { .. } => return Ok(Shape::Columnar),
        Op::Literal { .. } | Op::Reduction { .. } | Op::CountStar { .. } => {
            return Ok(Shape::Scalar)
        }
        _ => {}
    }

    let args = op.args();
    let columnar = args.iter().find(|a| a.shape() == Some(Shape::Columnar));
    let aggregate = args.iter().find(|a| is_aggregate(a));
    match (columnar, aggregate) {
        (Some(c), Some(a)) => Err(ExprError::ShapeMismatch {
            context: op.tag().to_string(),
            message: format!(
                "cannot combine the reduction `{}` with the column `{}`",
                super::ops::describe(a),
                super::ops::describe(c)
            ),
        }),
        (Some(_), None) => Ok(Shape::Columnar),
        _ => Ok(Shape::Scalar),
    }
}
