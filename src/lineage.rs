//! Column lineage through derived tables.
//!
//! Three questions are answered here:
//!
//! - [`Dereference`]: which columns of ancestor relations are available,
//!   unchanged, as columns of a derived relation? The builder uses this to
//!   let `t.filter(..).select(t.a)` mean the filtered `a`.
//! - [`trace`]: which base-table column does a field ultimately read?
//! - [`passes_through`]: is one relation a row-wise derivation of another?

use std::collections::{HashMap, HashSet};

use crate::error::ExprResult;
use crate::ir::{ops, Node, NodeId, NodeRef, Op, Shape};

/// Rewrite map from ancestor values to fields of one relation.
#[derive(Debug, Default)]
pub struct Dereference {
    values: HashMap<NodeId, NodeRef>,
    relations: HashMap<NodeId, NodeRef>,
}

impl Dereference {
    /// Collect the rewrites available on top of `rel`.
    pub fn of(rel: &NodeRef) -> ExprResult<Self> {
        let mut deref = Dereference::default();
        deref.collect(rel, rel)?;
        Ok(deref)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.relations.is_empty()
    }

    /// Fields of `source` that reappear in `target` under the given names.
    fn map_fields(
        &mut self,
        source: &NodeRef,
        target: &NodeRef,
        names: &[(String, String)],
    ) -> ExprResult<()> {
        for (from, to) in names {
            let key = ops::field(source, from)?;
            let value = ops::field(target, to)?;
            self.values.entry(key.id()).or_insert(value);
        }
        Ok(())
    }

    /// Walk from `rel` towards its inputs, mapping everything onto `target`.
    fn collect(&mut self, rel: &NodeRef, target: &NodeRef) -> ExprResult<()> {
        match rel.op() {
            Op::Filter { input, .. }
            | Op::SortBy { input, .. }
            | Op::Limit { input, .. }
            | Op::Distinct { input } => {
                let schema = input.relation_schema()?;
                let names: Vec<(String, String)> = schema
                    .names()
                    .into_iter()
                    .filter(|n| schema.lookup(n).is_ok())
                    .map(|n| (n.to_string(), n.to_string()))
                    .collect();
                self.map_fields(input, target, &names)?;
                self.relations.entry(input.id()).or_insert_with(|| target.clone());
                self.collect_renamed(input, target, &names)
            }
            Op::Projection { input, columns } => self.collect_values(input, target, columns),
            Op::Aggregation { input, by, .. } => self.collect_values(input, target, by),
            Op::Join { left, right, .. } => {
                let schema = rel.relation_schema()?;
                for side in [left, right] {
                    let side_schema = side.relation_schema()?;
                    let names: Vec<(String, String)> = side_schema
                        .names()
                        .into_iter()
                        .filter(|n| schema.lookup(n).is_ok() && side_schema.lookup(n).is_ok())
                        .map(|n| (n.to_string(), n.to_string()))
                        .collect();
                    self.map_fields(side, target, &names)?;
                    self.collect_renamed(side, target, &names)?;
                }
                Ok(())
            }
            // scans, self references and unions start a new lineage
            _ => Ok(()),
        }
    }

    /// Projected or grouped values of `input` that are plain row-wise
    /// expressions become fields of `target`.
    fn collect_values(
        &mut self,
        input: &NodeRef,
        target: &NodeRef,
        columns: &[(String, NodeRef)],
    ) -> ExprResult<()> {
        let mut parent = Dereference::default();
        parent.collect(input, input)?;

        for (name, value) in columns {
            if value.shape() != Some(Shape::Columnar) || ops::referenced_tables(value).is_empty() {
                continue;
            }
            let field = ops::field(target, name)?;
            self.values.entry(value.id()).or_insert_with(|| field.clone());
            for (key, mapped) in &parent.values {
                if mapped.id() == value.id() {
                    self.values.entry(*key).or_insert_with(|| field.clone());
                }
            }
        }
        Ok(())
    }

    /// Recurse below `input`, then re-point every rewrite that lands on a
    /// renamed field of `input` to the matching field of `target`.
    fn collect_renamed(
        &mut self,
        input: &NodeRef,
        target: &NodeRef,
        names: &[(String, String)],
    ) -> ExprResult<()> {
        let mut parent = Dereference::default();
        parent.collect(input, input)?;
        if parent.is_empty() {
            return Ok(());
        }

        let renames: HashMap<NodeId, &str> = names
            .iter()
            .map(|(from, to)| Ok((ops::field(input, from)?.id(), to.as_str())))
            .collect::<ExprResult<_>>()?;

        for (key, mapped) in parent.values {
            if let Some(to) = renames.get(&mapped.id()) {
                let field = ops::field(target, to)?;
                self.values.entry(key).or_insert(field);
            }
        }
        for (key, mapped) in parent.relations {
            if mapped.id() == input.id() && self.relations.contains_key(&input.id()) {
                self.relations.entry(key).or_insert_with(|| target.clone());
            }
        }
        Ok(())
    }

    /// Rewrite `value` so that it reads from the relation this map was
    /// built for wherever possible. Unrelated references are left alone;
    /// scope checks in the relation constructors reject them.
    pub fn apply(&self, value: &NodeRef) -> ExprResult<NodeRef> {
        if self.is_empty() {
            return Ok(value.clone());
        }
        let mut memo = HashMap::new();
        self.rewrite(value, &mut memo)
    }

    fn rewrite(
        &self,
        node: &NodeRef,
        memo: &mut HashMap<NodeId, NodeRef>,
    ) -> ExprResult<NodeRef> {
        if let Some(done) = memo.get(&node.id()) {
            return Ok(done.clone());
        }
        let out = if let Some(mapped) = self.values.get(&node.id()) {
            mapped.clone()
        } else {
            match node.op() {
                Op::Field { table, name } => match self.relations.get(&table.id()) {
                    Some(rel) => ops::field(rel, name)?,
                    None => node.clone(),
                },
                Op::CountStar { table } => match self.relations.get(&table.id()) {
                    Some(rel) => ops::count_star(rel)?,
                    None => node.clone(),
                },
                op if op.is_relation() => node.clone(),
                op => {
                    let mut changed = false;
                    let rebuilt = op.map_args(|arg| {
                        let new = self.rewrite(arg, memo)?;
                        changed |= new.id() != arg.id();
                        Ok(new)
                    })?;
                    if changed {
                        Node::new(rebuilt)?
                    } else {
                        node.clone()
                    }
                }
            }
        };
        memo.insert(node.id(), out.clone());
        Ok(out)
    }
}

/// Base-table origin of a column.
#[derive(Debug, Clone, PartialEq)]
pub struct Origin {
    pub table: NodeRef,
    pub column: String,
}

/// Follow a field back through derived tables to the `TableScan` column it
/// reads. Computed columns and aggregates have no origin.
pub fn trace(value: &NodeRef) -> Option<Origin> {
    match value.op() {
        Op::Field { table, name } => trace_column(table, name),
        _ => None,
    }
}

fn trace_column(rel: &NodeRef, name: &str) -> Option<Origin> {
    match rel.op() {
        Op::TableScan { .. } => Some(Origin {
            table: rel.clone(),
            column: name.to_string(),
        }),
        Op::SelfReference { table, .. }
        | Op::Filter { input: table, .. }
        | Op::SortBy { input: table, .. }
        | Op::Limit { input: table, .. }
        | Op::Distinct { input: table } => trace_column(table, name),
        Op::Projection { columns, .. } => columns
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, value)| trace(value)),
        Op::Aggregation { by, .. } => by
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, value)| trace(value)),
        Op::Join { left, right, .. } => {
            let schema = rel.schema()?;
            let (index, _) = schema.lookup(name).ok()?;
            let left_len = left.schema()?.len();
            if index < left_len {
                trace_column(left, name)
            } else {
                trace_column(right, name)
            }
        }
        _ => None,
    }
}

/// Whether `to` is reached from `from` through row-wise operations only
/// (filter, sort, limit, distinct, projection). A relation passes through
/// to itself.
pub fn passes_through(from: &NodeRef, to: &NodeRef) -> bool {
    let mut seen = HashSet::new();
    let mut current = from.clone();
    loop {
        if current.id() == to.id() {
            return true;
        }
        if !seen.insert(current.id()) {
            return false;
        }
        current = match current.op() {
            Op::Filter { input, .. }
            | Op::SortBy { input, .. }
            | Op::Limit { input, .. }
            | Op::Distinct { input }
            | Op::Projection { input, .. } => input.clone(),
            _ => return false,
        };
    }
}
