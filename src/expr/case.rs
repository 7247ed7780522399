//! CASE expression builders.
//!
//! Branches are validated as they are added: each `when` builds the case
//! so far, so an incomparable value or a result with no common type fails
//! at the offending call. `end` without any branch fails with `EmptyCase`;
//! a case without `else_` yields NULL where no branch matches.

use crate::error::{ExprError, ExprResult};
use crate::ir::{ops, NodeRef};
use crate::types::DataType;

use super::column::{Column, IntoColumn};

/// `CASE base WHEN value THEN result ... END`, from [`Column::case`].
#[derive(Debug, Clone)]
#[must_use = "a case builder does nothing until `end` is called"]
pub struct SimpleCaseBuilder {
    base: Column,
    cases: Vec<(NodeRef, NodeRef)>,
    default: Option<NodeRef>,
}

impl SimpleCaseBuilder {
    pub(crate) fn new(base: Column) -> Self {
        Self {
            base,
            cases: Vec::new(),
            default: None,
        }
    }

    pub fn when(mut self, value: impl IntoColumn, result: impl IntoColumn) -> ExprResult<Self> {
        self.cases
            .push((value.into_column()?.node().clone(), result.into_column()?.node().clone()));
        self.check()?;
        Ok(self)
    }

    pub fn else_(mut self, default: impl IntoColumn) -> ExprResult<Self> {
        self.default = Some(default.into_column()?.node().clone());
        if !self.cases.is_empty() {
            self.check()?;
        }
        Ok(self)
    }

    pub fn end(self) -> ExprResult<Column> {
        if self.cases.is_empty() {
            return Err(ExprError::EmptyCase);
        }
        self.build().map(Column::from_node)
    }

    fn build(&self) -> ExprResult<NodeRef> {
        ops::simple_case(self.base.node(), self.cases.clone(), self.default.clone())
    }

    fn check(&self) -> ExprResult<()> {
        self.build().map(|_| ())
    }
}

/// `CASE WHEN cond THEN result ... END`, from [`case`].
#[derive(Debug, Clone, Default)]
#[must_use = "a case builder does nothing until `end` is called"]
pub struct SearchedCaseBuilder {
    cases: Vec<(NodeRef, NodeRef)>,
    default: Option<NodeRef>,
}

/// Start a searched CASE.
pub fn case() -> SearchedCaseBuilder {
    SearchedCaseBuilder::default()
}

impl SearchedCaseBuilder {
    /// Add a branch; `cond` must be boolean.
    pub fn when(mut self, cond: impl IntoColumn, result: impl IntoColumn) -> ExprResult<Self> {
        let cond = cond.into_column()?;
        if !cond.dtype().is_boolean() && !cond.dtype().is_null() {
            return Err(ExprError::mismatch("case when", DataType::BOOLEAN, cond.dtype()));
        }
        self.cases
            .push((cond.node().clone(), result.into_column()?.node().clone()));
        self.check()?;
        Ok(self)
    }

    pub fn else_(mut self, default: impl IntoColumn) -> ExprResult<Self> {
        self.default = Some(default.into_column()?.node().clone());
        if !self.cases.is_empty() {
            self.check()?;
        }
        Ok(self)
    }

    pub fn end(self) -> ExprResult<Column> {
        if self.cases.is_empty() {
            return Err(ExprError::EmptyCase);
        }
        self.build().map(Column::from_node)
    }

    fn build(&self) -> ExprResult<NodeRef> {
        ops::searched_case(self.cases.clone(), self.default.clone())
    }

    fn check(&self) -> ExprResult<()> {
        self.build().map(|_| ())
    }
}
