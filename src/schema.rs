//! Schemas and the schema resolver.
//!
//! A [`Schema`] is an ordered list of named, typed fields. Every table-valued
//! node carries one, computed by [`resolve`] when the node is built.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ExprError, ExprResult};
use crate::ir::{Op, Shape};
use crate::types::{common_supertype, DataType, IntoDataType};

/// Ordered `(name, type)` fields of a relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<(String, DataType)>,
}

impl Schema {
    /// Build a schema, rejecting duplicate names.
    pub fn new(fields: Vec<(String, DataType)>) -> ExprResult<Self> {
        let schema = Self { fields };
        if let Some(name) = schema.first_duplicate() {
            return Err(ExprError::DuplicateColumn(name.to_string()));
        }
        Ok(schema)
    }

    /// Build a schema from `(name, type)` pairs, where types may be given
    /// in their textual form.
    ///
    /// ```ignore
    /// let schema = Schema::from_pairs([("id", "int64"), ("tags", "array<string>")])?;
    /// ```
    pub fn from_pairs<I, N, T>(pairs: I) -> ExprResult<Self>
    where
        I: IntoIterator<Item = (N, T)>,
        N: Into<String>,
        T: IntoDataType,
    {
        let fields = pairs
            .into_iter()
            .map(|(name, dtype)| Ok((name.into(), dtype.into_data_type()?)))
            .collect::<ExprResult<Vec<_>>>()?;
        Self::new(fields)
    }

    /// Join schema: left fields then right fields, duplicates allowed.
    pub(crate) fn concat(left: &Schema, right: &Schema) -> Self {
        let mut fields = left.fields.clone();
        fields.extend(right.fields.iter().cloned());
        Self { fields }
    }

    /// A schema with no fields.
    pub const fn empty() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[(String, DataType)] {
        &self.fields
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn types(&self) -> Vec<&DataType> {
        self.fields.iter().map(|(_, t)| t).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataType)> {
        self.fields.iter().map(|(n, t)| (n.as_str(), t))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    /// Resolve a bare column name to its position and type.
    pub fn lookup(&self, name: &str) -> ExprResult<(usize, &DataType)> {
        let mut matches = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, (n, _))| n == name);
        match (matches.next(), matches.next()) {
            (Some((index, (_, dtype))), None) => Ok((index, dtype)),
            (Some(_), Some(_)) => Err(ExprError::AmbiguousColumn(name.to_string())),
            (None, _) => Err(ExprError::UnknownColumn {
                column: name.to_string(),
                available: self.names().join(", "),
            }),
        }
    }

    /// First name that occurs more than once.
    pub fn first_duplicate(&self) -> Option<&str> {
        let mut seen = std::collections::HashSet::new();
        self.fields
            .iter()
            .map(|(n, _)| n.as_str())
            .find(|n| !seen.insert(*n))
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, dtype)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, dtype)?;
        }
        write!(f, "}}")
    }
}

fn named(columns: &[(String, crate::ir::NodeRef)]) -> ExprResult<Vec<(String, DataType)>> {
    columns
        .iter()
        .map(|(name, value)| Ok((name.clone(), value.value_type()?.clone())))
        .collect()
}

/// Output schema of a relation operation.
pub fn resolve(op: &Op) -> ExprResult<Schema> {
    match op {
        Op::TableScan { schema, .. } => Schema::new(schema.fields.clone()),
        Op::SelfReference { table, .. } => Ok(table.relation_schema()?.clone()),
        Op::Filter { input, predicates } => {
            for predicate in predicates {
                let t = predicate.value_type()?;
                if !(t.is_boolean() || t.is_null()) {
                    return Err(ExprError::mismatch("filter predicate", DataType::BOOLEAN, t));
                }
            }
            Ok(input.relation_schema()?.clone())
        }
        Op::SortBy { input, .. } | Op::Limit { input, .. } | Op::Distinct { input } => {
            Ok(input.relation_schema()?.clone())
        }
        Op::Projection { columns, .. } => Schema::new(named(columns)?),
        Op::Aggregation { by, metrics, .. } => {
            let mut fields = named(by)?;
            fields.extend(named(metrics)?);
            Schema::new(fields)
        }
        Op::Join {
            left,
            right,
            predicates,
            ..
        } => {
            for predicate in predicates {
                let t = predicate.value_type()?;
                if !(t.is_boolean() || t.is_null()) {
                    return Err(ExprError::mismatch("join predicate", DataType::BOOLEAN, t));
                }
                if predicate.shape() != Some(Shape::Columnar) {
                    return Err(ExprError::ShapeMismatch {
                        context: "join predicate".into(),
                        message: "predicate must reference the joined tables".into(),
                    });
                }
            }
            Ok(Schema::concat(
                left.relation_schema()?,
                right.relation_schema()?,
            ))
        }
        Op::Union { left, right, .. } => {
            let l = left.relation_schema()?;
            let r = right.relation_schema()?;
            if l.names() != r.names() {
                return Err(ExprError::mismatch(
                    "union",
                    format!("columns [{}]", l.names().join(", ")),
                    format!("columns [{}]", r.names().join(", ")),
                ));
            }
            let fields = l
                .iter()
                .zip(r.iter())
                .map(|((name, a), (_, b))| Ok((name.to_string(), common_supertype(a, b)?)))
                .collect::<ExprResult<Vec<_>>>()?;
            Schema::new(fields)
        }
        other => Err(ExprError::InvalidArgument(format!(
            "`{}` is not a table operation",
            other.tag()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ops, JoinKind};

    fn scan(name: &str, pairs: &[(&str, &str)]) -> crate::ir::NodeRef {
        ops::table_scan(name, Schema::from_pairs(pairs.iter().copied()).unwrap()).unwrap()
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = Schema::from_pairs([("a", "int64"), ("a", "string")]).unwrap_err();
        assert!(matches!(err, ExprError::DuplicateColumn(ref n) if n == "a"));
    }

    #[test]
    fn test_lookup_unknown_lists_available() {
        let schema = Schema::from_pairs([("a", "int64"), ("b", "string")]).unwrap();
        let err = schema.lookup("c").unwrap_err();
        assert_eq!(err.to_string(), "column `c` not found (available: a, b)");
        assert_eq!(schema.lookup("b").unwrap().0, 1);
    }

    #[test]
    fn test_join_schema_defers_ambiguity() {
        let t = scan("t", &[("id", "int64"), ("x", "string")]);
        let u = scan("u", &[("id", "int64"), ("y", "float64")]);
        let join = ops::join(JoinKind::Inner, &t, &u, vec![]).unwrap();
        let schema = join.schema().unwrap();
        assert_eq!(schema.names(), vec!["id", "x", "id", "y"]);
        assert!(matches!(
            schema.lookup("id").unwrap_err(),
            ExprError::AmbiguousColumn(_)
        ));
        assert!(schema.lookup("y").is_ok());
    }

    #[test]
    fn test_union_uses_supertypes() {
        let t = scan("t", &[("a", "int32"), ("b", "string")]);
        let u = scan("u", &[("a", "int64"), ("b", "string")]);
        let union = ops::union(&t, &u, true).unwrap();
        assert_eq!(union.schema().unwrap().to_string(), "{a: int64, b: string}");
    }

    #[test]
    fn test_union_requires_same_names() {
        let t = scan("t", &[("a", "int32")]);
        let u = scan("u", &[("b", "int32")]);
        let err = ops::union(&t, &u, false).unwrap_err();
        assert!(matches!(err, ExprError::TypeMismatch { .. }), "{err}");
    }

    #[test]
    fn test_aggregation_orders_keys_before_metrics() {
        let t = scan("t", &[("a", "int64"), ("g", "string")]);
        let a = ops::field(&t, "a").unwrap();
        let g = ops::field(&t, "g").unwrap();
        let total = ops::reduction(crate::ir::ReductionFunc::Sum, &a).unwrap();
        let agg = ops::aggregation(&t, vec![("g".into(), g)], vec![("total".into(), total)])
            .unwrap();
        assert_eq!(agg.schema().unwrap().names(), vec!["g", "total"]);
    }
}
