//! Logical data types.
//!
//! [`DataType`] is the type every value expression carries. Types are
//! structurally compared and render to (and parse from) a compact textual
//! form such as `array<struct<a: string, b: map<string, int64>>>`.
//!
//! Three relations are defined over types:
//!
//! - [`DataType::castable`]: the implicit widening order used when operands meet
//! - [`common_supertype`]: the least upper bound of two types under that order
//! - [`DataType::can_cast_explicitly`]: whether a user-requested `cast` is possible at all

pub mod capability;
mod parse;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ExprError, ExprResult};

pub use parse::parse_type;

/// Unit of an interval type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalUnit {
    Year,
    Quarter,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
    Microsecond,
}

impl IntervalUnit {
    /// Short code used in the textual type form, e.g. `interval('s')`.
    pub fn code(&self) -> &'static str {
        match self {
            IntervalUnit::Year => "Y",
            IntervalUnit::Quarter => "Q",
            IntervalUnit::Month => "M",
            IntervalUnit::Week => "W",
            IntervalUnit::Day => "D",
            IntervalUnit::Hour => "h",
            IntervalUnit::Minute => "m",
            IntervalUnit::Second => "s",
            IntervalUnit::Millisecond => "ms",
            IntervalUnit::Microsecond => "us",
        }
    }
}

impl FromStr for IntervalUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Single-letter codes are case sensitive (M is month, m is minute).
        let unit = match s {
            "Y" => IntervalUnit::Year,
            "Q" => IntervalUnit::Quarter,
            "M" => IntervalUnit::Month,
            "W" => IntervalUnit::Week,
            "D" => IntervalUnit::Day,
            "h" => IntervalUnit::Hour,
            "m" => IntervalUnit::Minute,
            "s" => IntervalUnit::Second,
            "ms" => IntervalUnit::Millisecond,
            "us" => IntervalUnit::Microsecond,
            other => match other.to_lowercase().as_str() {
                "year" | "years" => IntervalUnit::Year,
                "quarter" | "quarters" => IntervalUnit::Quarter,
                "month" | "months" => IntervalUnit::Month,
                "week" | "weeks" => IntervalUnit::Week,
                "day" | "days" => IntervalUnit::Day,
                "hour" | "hours" => IntervalUnit::Hour,
                "minute" | "minutes" => IntervalUnit::Minute,
                "second" | "seconds" => IntervalUnit::Second,
                "millisecond" | "milliseconds" => IntervalUnit::Millisecond,
                "microsecond" | "microseconds" => IntervalUnit::Microsecond,
                _ => return Err(format!("unknown interval unit `{}`", s)),
            },
        };
        Ok(unit)
    }
}

/// A logical data type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Type of the untyped NULL literal; implicitly castable to everything.
    Null,
    Boolean,
    Int {
        bits: u8,
        signed: bool,
    },
    Float {
        bits: u8,
    },
    /// Fixed-point decimal. `None` precision/scale means unconstrained.
    Decimal {
        precision: Option<u8>,
        scale: Option<u8>,
    },
    String,
    Binary,
    Date,
    Time,
    Timestamp {
        timezone: Option<String>,
    },
    Interval(IntervalUnit),
    Array(Box<DataType>),
    Struct(Vec<(String, DataType)>),
    Map(Box<DataType>, Box<DataType>),
}

impl DataType {
    pub const NULL: DataType = DataType::Null;
    pub const BOOLEAN: DataType = DataType::Boolean;
    pub const INT8: DataType = DataType::Int {
        bits: 8,
        signed: true,
    };
    pub const INT16: DataType = DataType::Int {
        bits: 16,
        signed: true,
    };
    pub const INT32: DataType = DataType::Int {
        bits: 32,
        signed: true,
    };
    pub const INT64: DataType = DataType::Int {
        bits: 64,
        signed: true,
    };
    pub const UINT8: DataType = DataType::Int {
        bits: 8,
        signed: false,
    };
    pub const UINT16: DataType = DataType::Int {
        bits: 16,
        signed: false,
    };
    pub const UINT32: DataType = DataType::Int {
        bits: 32,
        signed: false,
    };
    pub const UINT64: DataType = DataType::Int {
        bits: 64,
        signed: false,
    };
    pub const FLOAT32: DataType = DataType::Float { bits: 32 };
    pub const FLOAT64: DataType = DataType::Float { bits: 64 };
    pub const STRING: DataType = DataType::String;
    pub const BINARY: DataType = DataType::Binary;
    pub const DATE: DataType = DataType::Date;
    pub const TIME: DataType = DataType::Time;
    pub const TIMESTAMP: DataType = DataType::Timestamp { timezone: None };

    /// Parse the textual type form. Equivalent to `s.parse::<DataType>()`.
    pub fn parse(s: &str) -> ExprResult<DataType> {
        parse_type(s)
    }

    pub fn decimal(precision: u8, scale: u8) -> DataType {
        DataType::Decimal {
            precision: Some(precision),
            scale: Some(scale),
        }
    }

    pub fn array(value: DataType) -> DataType {
        DataType::Array(Box::new(value))
    }

    pub fn map(key: DataType, value: DataType) -> DataType {
        DataType::Map(Box::new(key), Box::new(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DataType::Null)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, DataType::Boolean)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, DataType::Int { .. })
    }

    pub fn is_floating(&self) -> bool {
        matches!(self, DataType::Float { .. })
    }

    pub fn is_decimal(&self) -> bool {
        matches!(self, DataType::Decimal { .. })
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_floating() || self.is_decimal()
    }

    pub fn is_string(&self) -> bool {
        matches!(self, DataType::String)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            DataType::Date | DataType::Time | DataType::Timestamp { .. }
        )
    }

    pub fn is_interval(&self) -> bool {
        matches!(self, DataType::Interval(_))
    }

    pub fn is_nested(&self) -> bool {
        matches!(
            self,
            DataType::Array(_) | DataType::Struct(_) | DataType::Map(_, _)
        )
    }

    /// Whether values of this type can appear in ORDER BY / MIN / MAX.
    pub fn is_orderable(&self) -> bool {
        !self.is_nested()
    }

    /// Implicit castability: can a value of `self` be used where `to` is expected
    /// without an explicit cast?
    pub fn castable(&self, to: &DataType) -> bool {
        use DataType::*;

        if self == to {
            return true;
        }

        match (self, to) {
            (Null, _) => true,
            (
                Int {
                    bits: a,
                    signed: sa,
                },
                Int {
                    bits: b,
                    signed: sb,
                },
            ) => {
                if sa == sb {
                    b >= a
                } else {
                    // unsigned widens into a strictly wider signed type
                    !sa && *sb && b > a
                }
            }
            (Int { .. }, Float { bits: 64 }) => true,
            (Int { bits, .. }, Float { bits: 32 }) => *bits <= 16,
            (Int { .. }, Decimal { .. }) => true,
            (Float { bits: 32 }, Float { bits: 64 }) => true,
            (Decimal { .. }, Float { bits: 64 }) => true,
            (
                Decimal {
                    precision: p1,
                    scale: s1,
                },
                Decimal {
                    precision: p2,
                    scale: s2,
                },
            ) => widens(p1, p2) && widens(s1, s2),
            (Date, Timestamp { .. }) => true,
            (Array(a), Array(b)) => a.castable(b),
            (Map(k1, v1), Map(k2, v2)) => k1.castable(k2) && v1.castable(v2),
            (Struct(a), Struct(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .zip(b.iter())
                        .all(|((n1, t1), (n2, t2))| n1 == n2 && t1.castable(t2))
            }
            _ => false,
        }
    }

    /// Whether an explicit `cast(self -> to)` is structurally possible.
    ///
    /// Primitive-to-primitive casts are accepted (the backend decides at run
    /// time whether a particular value converts). Nested types only cast
    /// element-wise into nested types of the same shape.
    pub fn can_cast_explicitly(&self, to: &DataType) -> bool {
        use DataType::*;

        if self.castable(to) {
            return true;
        }

        match (self, to) {
            (Array(a), Array(b)) => a.can_cast_explicitly(b),
            (Map(k1, v1), Map(k2, v2)) => k1.can_cast_explicitly(k2) && v1.can_cast_explicitly(v2),
            (Struct(a), Struct(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .zip(b.iter())
                        .all(|((_, t1), (_, t2))| t1.can_cast_explicitly(t2))
            }
            (a, b) if a.is_nested() || b.is_nested() => false,

            (Boolean, t) | (t, Boolean) if t.is_temporal() || t.is_interval() => false,

            (Binary, String) | (String, Binary) => true,
            (Binary, _) | (_, Binary) => false,

            (Interval(_), Interval(_)) => true,
            (Interval(_), t) | (t, Interval(_)) => t.is_integer() || t.is_string(),

            (Time, Date) | (Date, Time) => false,

            _ => true,
        }
    }
}

fn widens(from: &Option<u8>, to: &Option<u8>) -> bool {
    match (from, to) {
        (_, None) => true,
        (None, Some(_)) => false,
        (Some(a), Some(b)) => b >= a,
    }
}

fn max_param(a: &Option<u8>, b: &Option<u8>) -> Option<u8> {
    match (a, b) {
        (Some(a), Some(b)) => Some(*a.max(b)),
        _ => None,
    }
}

/// Least upper bound of two types under implicit castability.
///
/// Beyond plain widening this joins mixed-sign integers into the next signed
/// width, integers wider than 16 bits with `float32` into `float64`, and two
/// decimals into one with the larger precision and scale.
pub fn common_supertype(a: &DataType, b: &DataType) -> ExprResult<DataType> {
    use DataType::*;

    if a.castable(b) {
        return Ok(b.clone());
    }
    if b.castable(a) {
        return Ok(a.clone());
    }

    let joined = match (a, b) {
        (
            Int {
                bits: ba,
                signed: sa,
            },
            Int {
                bits: bb,
                signed: sb,
            },
        ) if sa != sb => {
            let unsigned_bits = if *sa { *bb } else { *ba };
            let signed_bits = if *sa { *ba } else { *bb };
            let bits = signed_bits.max(unsigned_bits.saturating_mul(2)).min(64);
            Some(Int { bits, signed: true })
        }
        (Int { .. }, Float { .. }) | (Float { .. }, Int { .. }) => Some(DataType::FLOAT64),
        (Decimal { .. }, Float { .. }) | (Float { .. }, Decimal { .. }) => {
            Some(DataType::FLOAT64)
        }
        (
            Decimal {
                precision: p1,
                scale: s1,
            },
            Decimal {
                precision: p2,
                scale: s2,
            },
        ) => Some(Decimal {
            precision: max_param(p1, p2),
            scale: max_param(s1, s2),
        }),
        (Array(x), Array(y)) => Some(DataType::array(common_supertype(x, y)?)),
        (Map(k1, v1), Map(k2, v2)) => Some(DataType::map(
            common_supertype(k1, k2)?,
            common_supertype(v1, v2)?,
        )),
        (Struct(x), Struct(y))
            if x.len() == y.len() && x.iter().zip(y.iter()).all(|(f, g)| f.0 == g.0) =>
        {
            let fields = x
                .iter()
                .zip(y.iter())
                .map(|((name, t1), (_, t2))| Ok((name.clone(), common_supertype(t1, t2)?)))
                .collect::<ExprResult<Vec<_>>>()?;
            Some(Struct(fields))
        }
        _ => None,
    };

    joined.ok_or_else(|| ExprError::mismatch("common supertype", a, b))
}

/// Fold [`common_supertype`] over a sequence. An empty sequence yields `null`.
pub fn common_supertype_all<'a>(types: impl IntoIterator<Item = &'a DataType>) -> ExprResult<DataType> {
    let mut acc = DataType::Null;
    for t in types {
        acc = common_supertype(&acc, t)?;
    }
    Ok(acc)
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Null => write!(f, "null"),
            DataType::Boolean => write!(f, "boolean"),
            DataType::Int { bits, signed: true } => write!(f, "int{}", bits),
            DataType::Int {
                bits,
                signed: false,
            } => write!(f, "uint{}", bits),
            DataType::Float { bits } => write!(f, "float{}", bits),
            DataType::Decimal {
                precision: None, ..
            } => write!(f, "decimal"),
            DataType::Decimal {
                precision: Some(p),
                scale: None,
            } => write!(f, "decimal({})", p),
            DataType::Decimal {
                precision: Some(p),
                scale: Some(s),
            } => write!(f, "decimal({}, {})", p, s),
            DataType::String => write!(f, "string"),
            DataType::Binary => write!(f, "binary"),
            DataType::Date => write!(f, "date"),
            DataType::Time => write!(f, "time"),
            DataType::Timestamp { timezone: None } => write!(f, "timestamp"),
            DataType::Timestamp {
                timezone: Some(tz),
            } => write!(f, "timestamp('{}')", tz),
            DataType::Interval(unit) => write!(f, "interval('{}')", unit.code()),
            DataType::Array(value) => write!(f, "array<{}>", value),
            DataType::Map(key, value) => write!(f, "map<{}, {}>", key, value),
            DataType::Struct(fields) => {
                write!(f, "struct<")?;
                for (i, (name, dtype)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, dtype)?;
                }
                write!(f, ">")
            }
        }
    }
}

impl FromStr for DataType {
    type Err = ExprError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_type(s)
    }
}

/// Anything that can name a type: a [`DataType`] or its textual form.
pub trait IntoDataType {
    fn into_data_type(self) -> ExprResult<DataType>;
}

impl IntoDataType for DataType {
    fn into_data_type(self) -> ExprResult<DataType> {
        Ok(self)
    }
}

impl IntoDataType for &DataType {
    fn into_data_type(self) -> ExprResult<DataType> {
        Ok(self.clone())
    }
}

impl IntoDataType for &str {
    fn into_data_type(self) -> ExprResult<DataType> {
        parse_type(self)
    }
}

impl IntoDataType for String {
    fn into_data_type(self) -> ExprResult<DataType> {
        parse_type(&self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_widening() {
        assert!(DataType::INT8.castable(&DataType::INT64));
        assert!(!DataType::INT64.castable(&DataType::INT32));
        assert!(DataType::UINT8.castable(&DataType::INT16));
        assert!(!DataType::UINT16.castable(&DataType::INT16));
        assert!(!DataType::INT8.castable(&DataType::UINT64));
    }

    #[test]
    fn test_numeric_widening() {
        assert!(DataType::INT16.castable(&DataType::FLOAT32));
        assert!(!DataType::INT32.castable(&DataType::FLOAT32));
        assert!(DataType::INT64.castable(&DataType::FLOAT64));
        assert!(DataType::FLOAT32.castable(&DataType::FLOAT64));
        assert!(!DataType::FLOAT64.castable(&DataType::FLOAT32));
        assert!(DataType::INT32.castable(&DataType::decimal(10, 2)));
        assert!(DataType::decimal(10, 2).castable(&DataType::decimal(12, 4)));
        assert!(!DataType::decimal(12, 4).castable(&DataType::decimal(10, 2)));
    }

    #[test]
    fn test_null_and_temporal() {
        assert!(DataType::NULL.castable(&DataType::STRING));
        assert!(DataType::DATE.castable(&DataType::TIMESTAMP));
        assert!(!DataType::TIMESTAMP.castable(&DataType::DATE));
        assert!(!DataType::STRING.castable(&DataType::DATE));
    }

    #[test]
    fn test_supertype() {
        assert_eq!(
            common_supertype(&DataType::INT8, &DataType::INT32).unwrap(),
            DataType::INT32
        );
        assert_eq!(
            common_supertype(&DataType::UINT32, &DataType::INT32).unwrap(),
            DataType::INT64
        );
        assert_eq!(
            common_supertype(&DataType::INT64, &DataType::FLOAT32).unwrap(),
            DataType::FLOAT64
        );
        assert_eq!(
            common_supertype(&DataType::decimal(10, 2), &DataType::decimal(8, 4)).unwrap(),
            DataType::decimal(10, 4)
        );
        assert_eq!(
            common_supertype(&DataType::NULL, &DataType::STRING).unwrap(),
            DataType::STRING
        );
    }

    #[test]
    fn test_supertype_mismatch() {
        let err = common_supertype(&DataType::STRING, &DataType::INT64).unwrap_err();
        assert!(matches!(err, ExprError::TypeMismatch { .. }));

        let st = DataType::Struct(vec![("a".into(), DataType::INT64)]);
        assert!(common_supertype(&st, &DataType::FLOAT64).is_err());
    }

    #[test]
    fn test_supertype_all() {
        let types = [DataType::INT8, DataType::NULL, DataType::INT32];
        assert_eq!(common_supertype_all(types.iter()).unwrap(), DataType::INT32);
        assert_eq!(
            common_supertype_all(std::iter::empty()).unwrap(),
            DataType::NULL
        );
    }

    #[test]
    fn test_explicit_cast() {
        assert!(DataType::STRING.can_cast_explicitly(&DataType::INT64));
        assert!(DataType::FLOAT64.can_cast_explicitly(&DataType::INT8));
        assert!(DataType::STRING.can_cast_explicitly(&DataType::DATE));
        assert!(!DataType::BOOLEAN.can_cast_explicitly(&DataType::DATE));
        assert!(!DataType::BINARY.can_cast_explicitly(&DataType::INT64));
        assert!(!DataType::array(DataType::INT64).can_cast_explicitly(&DataType::STRING));
        assert!(!DataType::STRING.can_cast_explicitly(&DataType::array(DataType::STRING)));
        assert!(DataType::array(DataType::INT64)
            .can_cast_explicitly(&DataType::array(DataType::STRING)));
    }

    #[test]
    fn test_display() {
        assert_eq!(DataType::UINT16.to_string(), "uint16");
        assert_eq!(DataType::decimal(15, 3).to_string(), "decimal(15, 3)");
        assert_eq!(
            DataType::map(DataType::STRING, DataType::array(DataType::INT64)).to_string(),
            "map<string, array<int64>>"
        );
        assert_eq!(
            DataType::Interval(IntervalUnit::Second).to_string(),
            "interval('s')"
        );
    }

    #[test]
    fn test_interval_unit_codes() {
        assert_eq!("M".parse::<IntervalUnit>().unwrap(), IntervalUnit::Month);
        assert_eq!("m".parse::<IntervalUnit>().unwrap(), IntervalUnit::Minute);
        assert_eq!("days".parse::<IntervalUnit>().unwrap(), IntervalUnit::Day);
        assert!("fortnight".parse::<IntervalUnit>().is_err());
    }
}
