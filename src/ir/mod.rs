//! Expression graph.
//!
//! Every expression, table-valued or scalar-valued, is a [`Node`]: an
//! immutable operation whose children are shared [`NodeRef`] handles. Nodes
//! are created through the constructor functions in [`ops`], which validate
//! their operands and compute the output type or schema once.
//!
//! Identity is structural. A node's [`NodeId`] is a SHA-256 digest of its
//! operation, where children contribute their own ids, so two independently
//! built but identical sub-expressions compare equal and the compiler can
//! share work between them.
//!
//! ```text
//!   Filter ──────────► TableScan("t")
//!     │                    ▲
//!     └─► Binary(Greater)  │
//!           ├─► Field ─────┘
//!           └─► Literal(0)
//! ```

pub mod hash;
pub mod ops;
pub mod typing;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::{ExprError, ExprResult};
use crate::schema::Schema;
use crate::types::DataType;

pub use ops::{
    BinaryOp, BucketBounds, BucketOptions, BucketSpec, Closed, HistogramOptions, HistogramSpec,
    JoinKind, Op, OpTag, ReductionFunc, SortKey, StringFunc, TemporalUnit,
};

/// Shared handle to an expression node.
pub type NodeRef = Arc<Node>;

/// Content address of a node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) [u8; 32]);

impl NodeId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First 8 hex digits, for logs.
    pub fn short(&self) -> String {
        self.0[..4].iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.short())
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Whether a value node produces one value or one value per row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shape {
    Scalar,
    Columnar,
}

/// What a node produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Output {
    Value { dtype: DataType, shape: Shape },
    Relation(Schema),
}

/// A literal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Datum {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Numeric value, for integers and floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Int(n) => Some(*n as f64),
            Datum::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Datum::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::String(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Datum::Null => "null",
            Datum::Bool(_) => "boolean",
            Datum::Int(_) => "integer",
            Datum::Float(_) => "float",
            Datum::String(_) => "string",
            Datum::Bytes(_) => "binary",
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => write!(f, "NULL"),
            Datum::Bool(b) => write!(f, "{}", b),
            Datum::Int(n) => write!(f, "{}", n),
            Datum::Float(x) => write!(f, "{}", x),
            Datum::String(s) => write!(f, "'{}'", s),
            Datum::Bytes(b) => {
                write!(f, "X'")?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                write!(f, "'")
            }
        }
    }
}

impl From<i64> for Datum {
    fn from(n: i64) -> Self {
        Datum::Int(n)
    }
}

impl From<i32> for Datum {
    fn from(n: i32) -> Self {
        Datum::Int(n as i64)
    }
}

impl From<f64> for Datum {
    fn from(x: f64) -> Self {
        Datum::Float(x)
    }
}

impl From<bool> for Datum {
    fn from(b: bool) -> Self {
        Datum::Bool(b)
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Self {
        Datum::String(s.to_string())
    }
}

impl From<String> for Datum {
    fn from(s: String) -> Self {
        Datum::String(s)
    }
}

impl From<Vec<u8>> for Datum {
    fn from(b: Vec<u8>) -> Self {
        Datum::Bytes(b)
    }
}

impl<T: Into<Datum>> From<Option<T>> for Datum {
    fn from(value: Option<T>) -> Self {
        value.map_or(Datum::Null, Into::into)
    }
}

/// An immutable expression node.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    op: Op,
    output: Output,
}

impl Node {
    /// Type the operation and seal it into a node.
    ///
    /// Only checks that depend on the operation alone happen here; scope
    /// checks that need the surrounding relation live in the [`ops`]
    /// constructors.
    pub(crate) fn new(op: Op) -> ExprResult<NodeRef> {
        let output = typing::infer(&op)?;
        let id = hash::content_id(&op)?;
        Ok(Arc::new(Node { id, op, output }))
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn op(&self) -> &Op {
        &self.op
    }

    pub fn tag(&self) -> OpTag {
        self.op.tag()
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    pub fn is_relation(&self) -> bool {
        matches!(self.output, Output::Relation(_))
    }

    pub fn schema(&self) -> Option<&Schema> {
        match &self.output {
            Output::Relation(schema) => Some(schema),
            Output::Value { .. } => None,
        }
    }

    pub fn dtype(&self) -> Option<&DataType> {
        match &self.output {
            Output::Value { dtype, .. } => Some(dtype),
            Output::Relation(_) => None,
        }
    }

    pub fn shape(&self) -> Option<Shape> {
        match &self.output {
            Output::Value { shape, .. } => Some(*shape),
            Output::Relation(_) => None,
        }
    }

    /// Schema of a table-valued node, or an error naming what was expected.
    pub fn relation_schema(&self) -> ExprResult<&Schema> {
        self.schema().ok_or_else(|| {
            ExprError::InvalidArgument(format!(
                "expected a table expression, found value `{}`",
                self.tag()
            ))
        })
    }

    /// Type of a value node, or an error naming what was expected.
    pub fn value_type(&self) -> ExprResult<&DataType> {
        self.dtype().ok_or_else(|| {
            ExprError::InvalidArgument(format!(
                "expected a value expression, found table `{}`",
                self.tag()
            ))
        })
    }

    /// Short human-readable label for a relation, used in error messages.
    pub fn label(&self) -> String {
        match &self.op {
            Op::TableScan { name, .. } => name.clone(),
            Op::SelfReference { table, .. } => table.label(),
            _ => self.tag().to_string(),
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Children serialize as their content address.
impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.id.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display_is_hex() {
        let id = NodeId([0xab; 32]);
        assert_eq!(id.to_string(), "ab".repeat(32));
        assert_eq!(id.short(), "abababab");
    }

    #[test]
    fn test_datum_display() {
        assert_eq!(Datum::Int(3).to_string(), "3");
        assert_eq!(Datum::from("x").to_string(), "'x'");
        assert_eq!(Datum::from(None::<i64>).to_string(), "NULL");
        assert_eq!(Datum::Bytes(vec![1, 255]).to_string(), "X'01ff'");
    }
}
