//! Parser for the textual type form, built with chumsky.
//!
//! Grammar (whitespace-insensitive):
//!
//! ```text
//! type      := primitive | decimal | timestamp | interval | array | map | struct
//! decimal   := "decimal" [ "(" int [ "," int ] ")" ]
//! timestamp := "timestamp" [ "(" quoted ")" ]
//! interval  := "interval" "(" quoted ")"
//! array     := "array" "<" type ">"
//! map       := "map" "<" type "," type ">"
//! struct    := "struct" "<" ident ":" type { "," ident ":" type } ">"
//! ```

use chumsky::prelude::*;

use super::{DataType, IntervalUnit};
use crate::error::{ExprError, ExprResult};

fn primitive(name: &str) -> Option<DataType> {
    let dtype = match name {
        "null" => DataType::NULL,
        "bool" | "boolean" => DataType::BOOLEAN,
        "int8" => DataType::INT8,
        "int16" => DataType::INT16,
        "int32" => DataType::INT32,
        "int" | "int64" => DataType::INT64,
        "uint8" => DataType::UINT8,
        "uint16" => DataType::UINT16,
        "uint32" => DataType::UINT32,
        "uint64" => DataType::UINT64,
        "float32" => DataType::FLOAT32,
        "float" | "float64" | "double" => DataType::FLOAT64,
        "string" | "str" => DataType::STRING,
        "binary" | "bytes" => DataType::BINARY,
        "date" => DataType::DATE,
        "time" => DataType::TIME,
        _ => return None,
    };
    Some(dtype)
}

fn parser<'src>() -> impl Parser<'src, &'src str, DataType, extra::Err<Rich<'src, char>>> {
    recursive(|ty| {
        let lt = just('<').padded();
        let gt = just('>').padded();
        let lparen = just('(').padded();
        let rparen = just(')').padded();
        let comma = just(',').padded();

        let quoted = just('\'')
            .ignore_then(none_of('\'').repeated().to_slice())
            .then_ignore(just('\''))
            .padded();

        let number = text::digits(10)
            .to_slice()
            .try_map(|digits: &str, span| {
                digits
                    .parse::<u8>()
                    .map_err(|e| Rich::custom(span, format!("invalid type parameter: {}", e)))
            })
            .padded();

        let decimal = text::keyword("decimal")
            .ignore_then(
                number
                    .clone()
                    .then(comma.clone().ignore_then(number).or_not())
                    .delimited_by(lparen.clone(), rparen.clone())
                    .or_not(),
            )
            .map(|params| match params {
                Some((precision, scale)) => DataType::Decimal {
                    precision: Some(precision),
                    scale,
                },
                None => DataType::Decimal {
                    precision: None,
                    scale: None,
                },
            });

        let timestamp = text::keyword("timestamp")
            .ignore_then(
                quoted
                    .clone()
                    .delimited_by(lparen.clone(), rparen.clone())
                    .or_not(),
            )
            .map(|tz: Option<&str>| DataType::Timestamp {
                timezone: tz.map(str::to_string),
            });

        let interval = text::keyword("interval")
            .ignore_then(quoted.delimited_by(lparen, rparen))
            .try_map(|unit: &str, span| {
                unit.parse::<IntervalUnit>()
                    .map(DataType::Interval)
                    .map_err(|e| Rich::custom(span, e))
            });

        let array = text::keyword("array")
            .ignore_then(ty.clone().delimited_by(lt.clone(), gt.clone()))
            .map(DataType::array);

        let map = text::keyword("map")
            .ignore_then(
                ty.clone()
                    .then_ignore(comma.clone())
                    .then(ty.clone())
                    .delimited_by(lt.clone(), gt.clone()),
            )
            .map(|(key, value)| DataType::map(key, value));

        let field = text::ident()
            .padded()
            .then_ignore(just(':').padded())
            .then(ty)
            .map(|(name, dtype): (&str, DataType)| (name.to_string(), dtype));

        let strukt = text::keyword("struct")
            .ignore_then(
                field
                    .separated_by(comma)
                    .at_least(1)
                    .collect::<Vec<_>>()
                    .delimited_by(lt, gt),
            )
            .map(DataType::Struct);

        let simple = text::ident().try_map(|name: &str, span| {
            primitive(name).ok_or_else(|| Rich::custom(span, format!("unknown type `{}`", name)))
        });

        choice((decimal, timestamp, interval, array, map, strukt, simple)).padded()
    })
}

/// Parse a type from its textual form.
///
/// ```ignore
/// let t = parse_type("array<struct<a: array<string>, b: map<string, array<int64>>>>")?;
/// ```
pub fn parse_type(input: &str) -> ExprResult<DataType> {
    parser()
        .then_ignore(end())
        .parse(input)
        .into_result()
        .map_err(|errs| ExprError::InvalidType {
            input: input.to_string(),
            message: errs
                .into_iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; "),
        })
}
