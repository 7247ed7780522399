//! Lowering of the expression graph into [`Query`] values.
//!
//! Relations are lowered into *layers*: a SELECT under construction plus
//! bindings that say how each visible relation's columns are spelled in it.
//! An operation is fused into the layer of its input when SQL evaluation
//! order allows it (filter into WHERE, projection into the select list, and
//! so on); otherwise the input layer is closed off as a derived table and a
//! fresh layer reads from it.
//!
//! Relations with more than one parent are lowered once, up front, as
//! common table expressions and referenced by name afterwards. Large
//! scalar subexpressions used more than once within a layer are likewise
//! computed once, as columns of a derived table beneath it.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::DfsPostOrder;
use petgraph::Direction;
use tracing::{debug, trace};

use super::rules::{default_rule, Rule};
use super::{CompileError, CompileOptions, CompileResult};
use crate::error::ExprError;
use crate::ir::{
    ops, BinaryOp, Closed, Datum, HistogramSpec, JoinKind, NodeId, NodeRef, Op, OpTag,
    ReductionFunc, StringFunc,
};
use crate::sql::{
    self, BinaryOperator, Cte, Dialect, Expr, JoinType, Literal, OrderByExpr, Query,
    SelectExpr, SetOperation, SqlDialect, TableRef, UnaryOperator,
};
use crate::types::DataType;

/// How the columns of one relation are spelled inside a layer.
#[derive(Debug, Clone)]
enum Binding {
    /// One SQL expression per schema position.
    Columns(Vec<Expr>),
    /// Columns of a join resolve through its two sides.
    Join { left: NodeRef, right: NodeRef },
    /// A scalar already computed as a column of the layer's source.
    Value(Expr),
}

/// Shared subexpressions at least this many nodes large, counted as a
/// tree, are hoisted rather than repeated.
const HOIST_MIN_SIZE: usize = 8;

/// Which shared scalars to hoist beneath a layer, and in what order.
#[derive(Debug, Default)]
struct Hoisting {
    /// Hoisted nodes by level. A level only reads earlier levels.
    levels: Vec<Vec<NodeRef>>,
    /// Highest level reading each hoisted node; `usize::MAX` when the
    /// layer's own values read it.
    last_use: HashMap<NodeId, usize>,
}

impl Hoisting {
    fn plan(values: &[&NodeRef]) -> Self {
        let mut uses: HashMap<NodeId, usize> = HashMap::new();
        let mut order: Vec<NodeRef> = Vec::new();
        for value in values {
            count_uses(value, &mut uses, &mut order);
        }

        // `order` lists children before parents.
        let mut size: HashMap<NodeId, usize> = HashMap::new();
        let mut row_wise: HashMap<NodeId, bool> = HashMap::new();
        let mut hoisted: HashSet<NodeId> = HashSet::new();
        for node in &order {
            let args = node.op().args();
            let tree = args
                .iter()
                .fold(1usize, |acc, arg| acc.saturating_add(size[&arg.id()]));
            let plain = !matches!(node.op(), Op::Reduction { .. } | Op::CountStar { .. })
                && args.iter().all(|arg| row_wise[&arg.id()]);
            size.insert(node.id(), tree);
            row_wise.insert(node.id(), plain);
            if plain && tree >= HOIST_MIN_SIZE && uses[&node.id()] > 1 {
                hoisted.insert(node.id());
            }
        }
        if hoisted.is_empty() {
            return Self::default();
        }

        // Hoisted nodes each node reads without another hoisted node in
        // between.
        let mut reach: HashMap<NodeId, HashSet<NodeId>> = HashMap::new();
        let mut level: HashMap<NodeId, usize> = HashMap::new();
        let mut plan = Self::default();
        for node in &order {
            let mut direct = HashSet::new();
            for arg in node.op().args() {
                if hoisted.contains(&arg.id()) {
                    direct.insert(arg.id());
                } else if let Some(below) = reach.get(&arg.id()) {
                    direct.extend(below.iter().copied());
                }
            }
            if hoisted.contains(&node.id()) {
                let depth = direct.iter().map(|id| level[id] + 1).max().unwrap_or(0);
                for id in &direct {
                    let last = plan.last_use.entry(*id).or_insert(0);
                    *last = (*last).max(depth);
                }
                level.insert(node.id(), depth);
                if plan.levels.len() <= depth {
                    plan.levels.resize_with(depth + 1, Vec::new);
                }
                plan.levels[depth].push(node.clone());
            }
            reach.insert(node.id(), direct);
        }

        for value in values {
            let read: Vec<NodeId> = if hoisted.contains(&value.id()) {
                vec![value.id()]
            } else {
                reach[&value.id()].iter().copied().collect()
            };
            for id in read {
                plan.last_use.insert(id, usize::MAX);
            }
        }
        plan
    }

    fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Whether `id` is still read above `level`.
    fn outlives(&self, id: &NodeId, level: usize) -> bool {
        self.last_use.get(id).is_some_and(|last| *last > level)
    }
}

/// Count references to every scalar under `node`, recording each node
/// once, after its operands.
fn count_uses(node: &NodeRef, uses: &mut HashMap<NodeId, usize>, order: &mut Vec<NodeRef>) {
    let count = uses.entry(node.id()).or_insert(0);
    *count += 1;
    if *count > 1 {
        return;
    }
    for arg in node.op().args() {
        count_uses(arg, uses, order);
    }
    order.push(node.clone());
}

/// A SELECT under construction.
#[derive(Debug, Default)]
struct Layer {
    query: Query,
    bindings: HashMap<NodeId, Binding>,
}

impl Layer {
    fn is_set_op(&self) -> bool {
        self.query.set_op.is_some()
    }

    /// Only FROM and JOIN clauses so far.
    fn is_bare(&self) -> bool {
        self.is_plain_source() && self.query.where_clause.is_none()
    }

    /// FROM, JOIN and WHERE clauses only.
    fn is_plain_source(&self) -> bool {
        !self.is_set_op()
            && self.query.select.is_empty()
            && self.query.group_by.is_empty()
            && self.query.order_by.is_empty()
            && self.query.limit_offset.is_none()
            && !self.query.distinct
    }

    fn accepts_filter(&self) -> bool {
        !self.is_set_op()
            && self.query.select.is_empty()
            && self.query.limit_offset.is_none()
            && !self.query.distinct
    }

    fn accepts_projection(&self) -> bool {
        self.accepts_filter()
    }

    fn accepts_sort(&self) -> bool {
        !self.is_set_op()
            && self.query.order_by.is_empty()
            && self.query.limit_offset.is_none()
            && !self.query.distinct
    }

    fn accepts_limit(&self) -> bool {
        !self.is_set_op() && self.query.limit_offset.is_none()
    }

    fn accepts_distinct(&self) -> bool {
        self.accepts_sort()
    }

    /// Reuse the binding of `from` for `to`, which has the same columns.
    fn alias_binding(&mut self, from: &NodeRef, to: &NodeRef) {
        if let Some(binding) = self.bindings.get(&from.id()).cloned() {
            self.bindings.insert(to.id(), binding);
        }
    }
}

/// One compilation: CTE table, name counter and dialect.
pub(super) struct Lowering<'a> {
    options: &'a CompileOptions,
    dialect: Dialect,
    ctes: HashMap<NodeId, String>,
    counter: Cell<usize>,
}

impl<'a> Lowering<'a> {
    pub(super) fn new(options: &'a CompileOptions) -> Self {
        Self {
            options,
            dialect: options.dialect,
            ctes: HashMap::new(),
            counter: Cell::new(0),
        }
    }

    /// Next CTE name or table alias. Both share one sequence.
    fn fresh_name(&self) -> String {
        let n = self.counter.get();
        self.counter.set(n + 1);
        format!("{}{}", self.options.cte_prefix, n)
    }

    /// Next name from the same sequence that is not in `taken`.
    fn fresh_column(&self, taken: &mut HashSet<String>) -> String {
        loop {
            let name = self.fresh_name();
            if taken.insert(name.clone()) {
                return name;
            }
        }
    }

    fn unsupported(&self, op: impl ToString) -> CompileError {
        CompileError::UnsupportedOperation {
            op: op.to_string(),
            dialect: self.dialect.name().to_string(),
        }
    }

    // =========================================================================
    // Entry points
    // =========================================================================

    pub(super) fn relation(mut self, root: &NodeRef) -> CompileResult<Query> {
        let shared = self.plan(root);
        let names: Vec<String> = shared.iter().map(|_| self.fresh_name()).collect();
        for (node, name) in shared.iter().zip(&names) {
            self.ctes.insert(node.id(), name.clone());
        }

        // Children come first, so a definition only names earlier CTEs.
        let mut with = Vec::with_capacity(shared.len());
        for (node, name) in shared.iter().zip(&names) {
            trace!(cte = %name, op = %node.tag(), id = %node.id().short(), "defining CTE");
            let layer = self.lower_op(node)?;
            let query = self.finish(layer, node)?;
            with.push(Cte::new(name, query));
        }

        let layer = self.lower(root)?;
        let mut query = self.finish(layer, root)?;
        query.with = with;
        Ok(query)
    }

    pub(super) fn constant(self, value: &NodeRef, name: &str) -> CompileResult<Query> {
        let expr = self.value(value, &HashMap::new())?;
        Ok(Query::new().select(vec![SelectExpr::new(expr).with_alias(name)]))
    }

    // =========================================================================
    // Planning
    // =========================================================================

    /// Relations that must become CTEs, children first.
    fn plan(&self, root: &NodeRef) -> Vec<NodeRef> {
        let mut graph: DiGraph<NodeRef, ()> = DiGraph::new();
        let mut index: HashMap<NodeId, NodeIndex> = HashMap::new();
        let root_ix = graph.add_node(root.clone());
        index.insert(root.id(), root_ix);

        let mut stack = vec![root.clone()];
        while let Some(node) = stack.pop() {
            let parent = index[&node.id()];
            for child in relation_children(&node) {
                let child_ix = match index.get(&child.id()).copied() {
                    Some(ix) => ix,
                    None => {
                        let ix = graph.add_node(child.clone());
                        index.insert(child.id(), ix);
                        stack.push(child);
                        ix
                    }
                };
                // One edge per use, so a relation read twice by the same
                // parent counts as shared.
                graph.add_edge(parent, child_ix, ());
            }
        }

        let mut shared = Vec::new();
        let mut dfs = DfsPostOrder::new(&graph, root_ix);
        while let Some(ix) = dfs.next(&graph) {
            let node = &graph[ix];
            let parents = graph.neighbors_directed(ix, Direction::Incoming).count();
            if parents > 1 && !matches!(node.op(), Op::TableScan { .. }) {
                shared.push(node.clone());
            }
        }

        debug!(
            dialect = %self.dialect,
            relations = graph.node_count(),
            ctes = shared.len(),
            "planned compilation"
        );
        shared
    }

    // =========================================================================
    // Relations
    // =========================================================================

    /// Table or CTE name `rel` can be read from directly.
    fn source_name(&self, rel: &NodeRef) -> Option<String> {
        match (self.ctes.get(&rel.id()), rel.op()) {
            (Some(cte), _) => Some(cte.clone()),
            (None, Op::TableScan { name, .. }) => Some(name.clone()),
            _ => None,
        }
    }

    /// A layer reading the named table or CTE under a fresh alias, with
    /// its columns bound to `rel`.
    fn named(&self, name: &str, rel: &NodeRef) -> CompileResult<Layer> {
        let alias = self.fresh_name();
        let mut layer = Layer {
            query: Query::new().from(TableRef::new(name).with_alias(&alias)),
            ..Layer::default()
        };
        bind_alias(&mut layer, rel, &alias)?;
        Ok(layer)
    }

    /// Lower a relation, referencing it by name when it is a CTE.
    fn lower(&self, rel: &NodeRef) -> CompileResult<Layer> {
        match self.ctes.get(&rel.id()) {
            Some(name) => self.named(name, rel),
            None => self.lower_op(rel),
        }
    }

    fn lower_op(&self, rel: &NodeRef) -> CompileResult<Layer> {
        trace!(op = %rel.tag(), id = %rel.id().short(), "lowering relation");
        match rel.op() {
            Op::TableScan { name, .. } => self.named(name, rel),

            Op::SelfReference { table, .. } => match self.source_name(table) {
                Some(name) => self.named(&name, rel),
                None => {
                    let inner = self.lower(table)?;
                    let query = self.finish(inner, table)?;
                    self.derived(query, rel)
                }
            },

            Op::Filter { input, predicates } => {
                let mut layer = self.lower(input)?;
                if !layer.accepts_filter() {
                    layer = self.wrap(layer, input)?;
                }
                let layer_values: Vec<&NodeRef> = predicates.iter().collect();
                let mut layer = self.hoist(layer, input, &layer_values)?;
                for predicate in predicates {
                    let expr = self.value(predicate, &layer.bindings)?;
                    layer.query = layer.query.filter(expr);
                }
                layer.alias_binding(input, rel);
                Ok(layer)
            }

            Op::Projection { input, columns } => {
                let mut layer = self.lower(input)?;
                if !layer.accepts_projection() {
                    layer = self.wrap(layer, input)?;
                }
                let layer_values: Vec<&NodeRef> = columns.iter().map(|(_, v)| v).collect();
                let mut layer = self.hoist(layer, input, &layer_values)?;
                let exprs = columns
                    .iter()
                    .map(|(_, value)| self.value(value, &layer.bindings))
                    .collect::<CompileResult<Vec<_>>>()?;
                layer.query.select = select_list(columns, &exprs);
                layer.bindings.insert(rel.id(), Binding::Columns(exprs));
                Ok(layer)
            }

            Op::Aggregation { input, by, metrics } => {
                let mut layer = self.lower(input)?;
                if !layer.is_plain_source() {
                    layer = self.wrap(layer, input)?;
                }
                let layer_values: Vec<&NodeRef> = by.iter().chain(metrics).map(|(_, v)| v).collect();
                let mut layer = self.hoist(layer, input, &layer_values)?;
                let keys = by
                    .iter()
                    .map(|(_, value)| self.value(value, &layer.bindings))
                    .collect::<CompileResult<Vec<_>>>()?;
                let values = metrics
                    .iter()
                    .map(|(_, value)| self.value(value, &layer.bindings))
                    .collect::<CompileResult<Vec<_>>>()?;

                let named: Vec<(String, NodeRef)> = by.iter().chain(metrics).cloned().collect();
                let exprs: Vec<Expr> = keys.iter().chain(&values).cloned().collect();
                layer.query.select = select_list(&named, &exprs);
                layer.query.group_by = keys;
                layer.bindings.insert(rel.id(), Binding::Columns(exprs));
                Ok(layer)
            }

            Op::SortBy { input, keys } => {
                let mut layer = self.lower(input)?;
                if !layer.accepts_sort() {
                    layer = self.wrap(layer, input)?;
                }
                let layer_values: Vec<&NodeRef> = keys.iter().map(|k| &k.expr).collect();
                let mut layer = self.hoist(layer, input, &layer_values)?;
                let order = keys
                    .iter()
                    .map(|key| {
                        let expr = self.value(&key.expr, &layer.bindings)?;
                        Ok(if key.ascending {
                            OrderByExpr::asc(expr)
                        } else {
                            OrderByExpr::desc(expr)
                        })
                    })
                    .collect::<CompileResult<Vec<_>>>()?;
                layer.query.order_by = order;
                layer.alias_binding(input, rel);
                Ok(layer)
            }

            Op::Limit { input, n, offset } => {
                let mut layer = self.lower(input)?;
                if !layer.accepts_limit() {
                    layer = self.wrap(layer, input)?;
                }
                layer.query = layer.query.limit(*n);
                if *offset > 0 {
                    layer.query = layer.query.offset(*offset);
                }
                layer.alias_binding(input, rel);
                Ok(layer)
            }

            Op::Distinct { input } => {
                let mut layer = self.lower(input)?;
                if !layer.accepts_distinct() {
                    layer = self.wrap(layer, input)?;
                }
                layer.query = layer.query.distinct();
                layer.alias_binding(input, rel);
                Ok(layer)
            }

            Op::Join {
                kind,
                left,
                right,
                predicates,
            } => {
                let mut layer = self.lower(left)?;
                if !layer.is_bare() {
                    layer = self.wrap(layer, left)?;
                }

                let mut right_layer = self.lower(right)?;
                if !(right_layer.is_bare() && right_layer.query.joins.is_empty()) {
                    right_layer = self.wrap(right_layer, right)?;
                }
                let source = match right_layer.query.from {
                    Some(from) => from,
                    None => {
                        return Err(ExprError::InvalidArgument(
                            "join side without a source".into(),
                        )
                        .into())
                    }
                };
                layer.bindings.extend(right_layer.bindings);

                let on = if *kind == JoinKind::Cross {
                    None
                } else {
                    let mut condition: Option<Expr> = None;
                    for predicate in predicates {
                        let expr = self.value(predicate, &layer.bindings)?;
                        condition = Some(match condition {
                            Some(existing) => existing.and(expr),
                            None => expr,
                        });
                    }
                    Some(condition.unwrap_or_else(|| self.predicate(true)))
                };

                layer.query = layer.query.join(join_type(*kind), source, on);
                layer.bindings.insert(
                    rel.id(),
                    Binding::Join {
                        left: left.clone(),
                        right: right.clone(),
                    },
                );
                Ok(layer)
            }

            Op::Union {
                left,
                right,
                distinct,
            } => {
                let left_q = self.set_operand(left, false)?;
                let right_q = self.set_operand(right, true)?;
                let op = if *distinct {
                    SetOperation::union(left_q, right_q)
                } else {
                    SetOperation::union_all(left_q, right_q)
                };
                Ok(Layer {
                    query: Query::set_operation(op),
                    ..Layer::default()
                })
            }

            other => Err(ExprError::InvalidArgument(format!(
                "expected a table expression, found value `{}`",
                other.tag()
            ))
            .into()),
        }
    }

    /// One side of a UNION as a complete query.
    fn set_operand(&self, rel: &NodeRef, right: bool) -> CompileResult<Query> {
        let layer = self.lower(rel)?;
        let query = self.finish(layer, rel)?;

        let nested_set = right && query.set_op.is_some();
        let needs_own_select = !self.dialect.supports_parenthesized_set_operands()
            && (!query.order_by.is_empty() || query.limit_offset.is_some());
        if nested_set || needs_own_select {
            let layer = self.derived(query, rel)?;
            return self.finish(layer, rel);
        }
        Ok(query)
    }

    /// Close `layer` off as a derived table and start a new layer on it.
    fn wrap(&self, layer: Layer, rel: &NodeRef) -> CompileResult<Layer> {
        let query = self.finish(layer, rel)?;
        self.derived(query, rel)
    }

    fn derived(&self, query: Query, rel: &NodeRef) -> CompileResult<Layer> {
        Ok(self.derived_as(query, rel)?.0)
    }

    /// [`Self::derived`], also returning the alias of the derived table.
    fn derived_as(&self, query: Query, rel: &NodeRef) -> CompileResult<(Layer, String)> {
        let alias = self.fresh_name();
        let mut layer = Layer {
            query: Query::new().from(TableRef::subquery(query).with_alias(&alias)),
            ..Layer::default()
        };
        bind_alias(&mut layer, rel, &alias)?;
        Ok((layer, alias))
    }

    /// Compute the large shared subexpressions of `values` beneath `layer`,
    /// one derived table per level, and bind them so lowering `values`
    /// reads each as a column.
    fn hoist(&self, mut layer: Layer, input: &NodeRef, values: &[&NodeRef]) -> CompileResult<Layer> {
        let plan = Hoisting::plan(values);
        if plan.is_empty() {
            return Ok(layer);
        }
        trace!(levels = plan.levels.len(), "hoisting shared subexpressions");

        let mut taken: HashSet<String> = input
            .relation_schema()?
            .names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut carried: Vec<(String, NodeId)> = Vec::new();
        for (level, nodes) in plan.levels.iter().enumerate() {
            carried.retain(|(_, id)| plan.outlives(id, level));
            let mut extra = Vec::new();
            for (name, id) in &carried {
                if let Some(Binding::Value(expr)) = layer.bindings.get(id) {
                    extra.push(select_item(name, expr.clone()));
                }
            }
            for node in nodes {
                let expr = self.value(node, &layer.bindings)?;
                let name = self.fresh_column(&mut taken);
                extra.push(select_item(&name, expr));
                carried.push((name, node.id()));
            }

            let mut query = self.finish(layer, input)?;
            query.select.extend(extra);
            let (next, alias) = self.derived_as(query, input)?;
            layer = next;
            for (name, id) in &carried {
                layer
                    .bindings
                    .insert(*id, Binding::Value(sql::table_col(&alias, name)));
            }
        }
        Ok(layer)
    }

    /// Complete a layer: an empty select list becomes the explicit columns
    /// of `rel`.
    fn finish(&self, layer: Layer, rel: &NodeRef) -> CompileResult<Query> {
        let Layer {
            mut query,
            bindings,
        } = layer;
        if query.set_op.is_some() || !query.select.is_empty() {
            return Ok(query);
        }

        let schema = rel.relation_schema()?;
        if let Some(name) = schema.first_duplicate() {
            return Err(ExprError::DuplicateColumn(name.to_string()).into());
        }
        query.select = schema
            .names()
            .into_iter()
            .enumerate()
            .map(|(index, name)| {
                let expr = resolve(rel, index, &bindings)?;
                Ok(select_item(name, expr))
            })
            .collect::<CompileResult<Vec<_>>>()?;
        Ok(query)
    }

    // =========================================================================
    // Values
    // =========================================================================

    fn predicate(&self, value: bool) -> Expr {
        sql::template(self.dialect.format_predicate(value), vec![])
    }

    fn rule(&self, tag: OpTag) -> Option<Rule> {
        self.dialect.rule(tag).or_else(|| default_rule(tag))
    }

    /// Emit a rule-driven operation over already lowered operands.
    fn apply_rule(&self, tag: OpTag, args: Vec<Expr>) -> CompileResult<Expr> {
        match self.rule(tag) {
            Some(Rule::Function(name)) => {
                let distinct = tag == OpTag::Reduction(ReductionFunc::CountDistinct);
                Ok(Expr::Function {
                    name: name.to_string(),
                    args,
                    distinct,
                })
            }
            Some(Rule::Template(text)) => Ok(sql::template(
                text,
                args.into_iter().map(Expr::operand).collect(),
            )),
            Some(Rule::Unsupported) | None => Err(self.unsupported(tag)),
        }
    }

    fn cast_type(&self, dtype: &DataType) -> CompileResult<String> {
        self.dialect
            .cast_type(dtype)
            .ok_or_else(|| self.unsupported(format!("Cast({})", dtype)))
    }

    fn value(&self, node: &NodeRef, bindings: &HashMap<NodeId, Binding>) -> CompileResult<Expr> {
        if let Some(Binding::Value(expr)) = bindings.get(&node.id()) {
            return Ok(expr.clone());
        }
        let lower = |arg: &NodeRef| self.value(arg, bindings);

        match node.op() {
            Op::Field { table, name } => {
                let (index, _) = table.relation_schema()?.lookup(name)?;
                resolve(table, index, bindings)
            }

            Op::Literal { value, dtype } => self.literal(value, dtype),

            Op::Binary { op, left, right } => {
                let tag = node.tag();
                let mut l = lower(left)?;
                let r = lower(right)?;
                if let Some(rule) = self.dialect.rule(tag) {
                    return match rule {
                        Rule::Unsupported => Err(self.unsupported(tag)),
                        _ => self.apply_rule(tag, vec![l, r]),
                    };
                }
                if *op == BinaryOp::Divide && both_integers(left, right) {
                    l = Expr::Cast {
                        expr: Box::new(l),
                        type_name: self.cast_type(&DataType::FLOAT64)?,
                    };
                }
                Ok(l.binary(binary_operator(*op), r))
            }

            Op::Not { arg } => Ok(lower(arg)?.not()),

            Op::Negate { arg } => {
                let inner = match lower(arg)? {
                    negative @ Expr::Literal(Literal::Int(_) | Literal::Float(_)) => {
                        Expr::Paren(Box::new(negative))
                    }
                    other => other.operand(),
                };
                Ok(Expr::UnaryOp {
                    op: UnaryOperator::Minus,
                    expr: Box::new(inner),
                })
            }

            Op::Cast { arg, to } => Ok(Expr::Cast {
                expr: Box::new(lower(arg)?),
                type_name: self.cast_type(to)?,
            }),

            Op::IsNull { arg } => Ok(lower(arg)?.is_null()),

            Op::NotNull { arg } => Ok(Expr::IsNull {
                expr: Box::new(lower(arg)?.operand()),
                negated: true,
            }),

            Op::SimpleCase {
                base,
                cases,
                default,
            } => Ok(Expr::Case {
                operand: Some(Box::new(lower(base)?)),
                when_clauses: self.when_clauses(cases, bindings)?,
                else_clause: Some(Box::new(self.default_branch(default, bindings)?)),
            }),

            Op::SearchedCase { cases, default } => Ok(Expr::Case {
                operand: None,
                when_clauses: self.when_clauses(cases, bindings)?,
                else_clause: Some(Box::new(self.default_branch(default, bindings)?)),
            }),

            Op::InValues {
                arg,
                options,
                negated,
            } => Ok(Expr::In {
                expr: Box::new(lower(arg)?.operand()),
                values: options.iter().map(lower).collect::<CompileResult<_>>()?,
                negated: *negated,
            }),

            Op::InColumn {
                arg,
                column,
                negated,
            } => Ok(Expr::InSubquery {
                expr: Box::new(lower(arg)?.operand()),
                subquery: Box::new(self.column_subquery(column)?),
                negated: *negated,
            }),

            Op::Coalesce { args } => {
                let args = args.iter().map(lower).collect::<CompileResult<_>>()?;
                self.apply_rule(node.tag(), args)
            }

            Op::String { func, args } => {
                let args: Vec<Expr> = args.iter().map(lower).collect::<CompileResult<_>>()?;
                match (func, self.dialect.rule(node.tag())) {
                    (StringFunc::StringConcat, None) => Ok(args
                        .into_iter()
                        .reduce(|acc, next| acc.binary(BinaryOperator::Concat, next))
                        .unwrap_or_else(|| Expr::Literal(Literal::String(String::new())))),
                    _ => self.apply_rule(node.tag(), args),
                }
            }

            Op::ExtractField { arg, .. } => self.apply_rule(node.tag(), vec![lower(arg)?]),

            Op::Reduction { arg, .. } => self.apply_rule(node.tag(), vec![lower(arg)?]),

            Op::CountStar { .. } => Ok(sql::count_star()),

            Op::Bucket { arg, spec } => {
                let arg = lower(arg)?.operand();
                let mut when_clauses = Vec::new();
                for (number, bounds) in spec.bounds().into_iter().enumerate() {
                    let mut condition: Option<Expr> = None;
                    if let Some((edge, inclusive)) = &bounds.lower {
                        let op = if *inclusive {
                            BinaryOperator::Gte
                        } else {
                            BinaryOperator::Gt
                        };
                        condition = Some(arg.clone().binary(op, datum_expr(edge)));
                    }
                    if let Some((edge, inclusive)) = &bounds.upper {
                        let op = if *inclusive {
                            BinaryOperator::Lte
                        } else {
                            BinaryOperator::Lt
                        };
                        let check = arg.clone().binary(op, datum_expr(edge));
                        condition = Some(match condition {
                            Some(lower) => lower.and(check),
                            None => check,
                        });
                    }
                    if let Some(condition) = condition {
                        when_clauses.push((condition, sql::lit_int(number as i64)));
                    }
                }
                Ok(Expr::Case {
                    operand: None,
                    when_clauses,
                    else_clause: Some(Box::new(sql::lit_null())),
                })
            }

            Op::Histogram { arg, spec, min, max } => {
                let arg = lower(arg)?.operand();
                let min = min.as_ref().map(|rel| self.scalar_subquery(rel)).transpose()?;
                let max = max.as_ref().map(|rel| self.scalar_subquery(rel)).transpose()?;
                self.histogram(arg, spec, min, max)
            }

            op => Err(ExprError::InvalidArgument(format!(
                "expected a value expression, found table `{}`",
                op.tag()
            ))
            .into()),
        }
    }

    fn when_clauses(
        &self,
        cases: &[(NodeRef, NodeRef)],
        bindings: &HashMap<NodeId, Binding>,
    ) -> CompileResult<Vec<(Expr, Expr)>> {
        cases
            .iter()
            .map(|(when, then)| Ok((self.value(when, bindings)?, self.value(then, bindings)?)))
            .collect()
    }

    /// Missing defaults are spelled out so unmatched rows read as NULL on
    /// every dialect.
    fn default_branch(
        &self,
        default: &Option<NodeRef>,
        bindings: &HashMap<NodeId, Binding>,
    ) -> CompileResult<Expr> {
        match default {
            Some(value) => self.value(value, bindings),
            None => Ok(sql::lit_null()),
        }
    }

    fn literal(&self, value: &Datum, dtype: &DataType) -> CompileResult<Expr> {
        let expr = match value {
            Datum::Null => sql::lit_null(),
            Datum::Bool(b) => sql::lit_bool(*b),
            Datum::Int(n) => sql::lit_int(*n),
            Datum::Float(x) => sql::lit_float(*x),
            Datum::Bytes(b) => Expr::Literal(Literal::Bytes(b.clone())),
            Datum::String(s) if dtype.is_temporal() => Expr::Cast {
                expr: Box::new(sql::lit_str(s)),
                type_name: self.cast_type(dtype)?,
            },
            Datum::String(s) => sql::lit_str(s),
        };
        Ok(expr)
    }

    /// `(SELECT ...)` over a one-row, one-column relation.
    fn scalar_subquery(&self, rel: &NodeRef) -> CompileResult<Expr> {
        let layer = self.lower(rel)?;
        Ok(Expr::Subquery(Box::new(self.finish(layer, rel)?)))
    }

    /// Bin number of `arg`: floor of `(arg - base) / width`, or ceiling
    /// minus one when bins are closed on the right. With `nbins` the value
    /// at the open extreme is clamped into the outermost bin.
    fn histogram(
        &self,
        arg: Expr,
        spec: &HistogramSpec,
        min: Option<Expr>,
        max: Option<Expr>,
    ) -> CompileResult<Expr> {
        let options = spec.options();
        let missing = |bound: &str| -> CompileError {
            ExprError::InvalidArgument(format!("histogram is missing its {} bound", bound)).into()
        };

        let base = match (options.base, &min) {
            (Some(base), _) => sql::lit_float(base),
            (None, Some(min)) => min.clone(),
            (None, None) => return Err(missing("lower")),
        };
        let width = match (options.binwidth, options.nbins, &max) {
            (Some(width), _, _) => sql::lit_float(width),
            (None, Some(nbins), Some(max)) => max
                .clone()
                .binary(BinaryOperator::Minus, base.clone())
                .binary(BinaryOperator::Div, sql::lit_float(nbins as f64)),
            _ => return Err(missing("upper")),
        };
        let scaled = arg
            .clone()
            .binary(BinaryOperator::Minus, base)
            .binary(BinaryOperator::Div, width);

        let bin = match options.closed {
            Closed::Left => self.apply_rule(OpTag::Histogram, vec![scaled])?,
            Closed::Right => {
                let negated = Expr::UnaryOp {
                    op: UnaryOperator::Minus,
                    expr: Box::new(scaled.operand()),
                };
                let floor = self.apply_rule(OpTag::Histogram, vec![negated])?;
                sql::lit_int(-1).binary(BinaryOperator::Minus, floor)
            }
        };
        let bin = Expr::Cast {
            expr: Box::new(bin),
            type_name: self.cast_type(&DataType::INT64)?,
        };

        let clamp = match (options.nbins, options.closed, max, min) {
            (Some(nbins), Closed::Left, Some(max), _) => Some((
                arg.binary(BinaryOperator::Gte, max),
                sql::lit_int(nbins.saturating_sub(1) as i64),
            )),
            (Some(_), Closed::Right, _, Some(min)) => Some((
                arg.binary(BinaryOperator::Lte, min),
                sql::lit_int(0),
            )),
            _ => None,
        };
        Ok(match clamp {
            Some(extreme) => Expr::Case {
                operand: None,
                when_clauses: vec![extreme],
                else_clause: Some(Box::new(bin)),
            },
            None => bin,
        })
    }

    /// `SELECT <column> FROM <its relation>` for a membership test.
    fn column_subquery(&self, column: &NodeRef) -> CompileResult<Query> {
        let source = match ops::referenced_tables(column).into_iter().next() {
            Some(source) => source,
            None => {
                return Err(ExprError::InvalidMembership(format!(
                    "`{}` does not belong to any table",
                    ops::describe(column)
                ))
                .into())
            }
        };

        let mut layer = self.lower(&source)?;
        if !layer.accepts_projection() {
            layer = self.wrap(layer, &source)?;
        }
        let expr = self.value(column, &layer.bindings)?;
        layer.query.select = vec![SelectExpr::new(expr)];
        Ok(layer.query)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Relations a relation reads from, once per use: its inputs plus the
/// relations of membership and histogram subqueries in its expressions.
fn relation_children(rel: &NodeRef) -> Vec<NodeRef> {
    let mut out: Vec<NodeRef> = Vec::new();
    let mut visited = HashSet::new();
    for input in rel.op().inputs() {
        if input.is_relation() {
            out.push(input.clone());
        } else {
            collect_subquery_relations(input, &mut visited, &mut out);
        }
    }
    out
}

fn collect_subquery_relations(
    value: &NodeRef,
    visited: &mut HashSet<NodeId>,
    out: &mut Vec<NodeRef>,
) {
    if !visited.insert(value.id()) {
        return;
    }
    match value.op() {
        Op::InColumn { column, .. } => out.extend(ops::referenced_tables(column)),
        Op::Histogram { min, max, .. } => {
            out.extend(min.iter().chain(max).cloned());
        }
        _ => {}
    }
    for arg in value.op().args() {
        collect_subquery_relations(arg, visited, out);
    }
}

/// Bind every relation directly visible on top of `rel` to columns of
/// `alias`.
fn bind_alias(layer: &mut Layer, rel: &NodeRef, alias: &str) -> CompileResult<()> {
    for scope in ops::direct_scope(rel) {
        let binding = match scope.op() {
            Op::Join { left, right, .. } => Binding::Join {
                left: left.clone(),
                right: right.clone(),
            },
            _ => Binding::Columns(
                scope
                    .relation_schema()?
                    .names()
                    .into_iter()
                    .map(|name| sql::table_col(alias, name))
                    .collect(),
            ),
        };
        layer.bindings.insert(scope.id(), binding);
    }
    Ok(())
}

/// SQL for the column at `index` of `rel`.
fn resolve(rel: &NodeRef, index: usize, bindings: &HashMap<NodeId, Binding>) -> CompileResult<Expr> {
    match bindings.get(&rel.id()) {
        Some(Binding::Columns(columns)) => columns.get(index).cloned().ok_or_else(|| {
            ExprError::InvalidArgument(format!(
                "column {} out of range for `{}`",
                index,
                rel.label()
            ))
            .into()
        }),
        Some(Binding::Join { left, right }) => {
            let left_len = left.relation_schema()?.len();
            if index < left_len {
                resolve(left, index, bindings)
            } else {
                resolve(right, index - left_len, bindings)
            }
        }
        Some(Binding::Value(_)) | None => {
            let column = rel
                .schema()
                .and_then(|s| s.names().get(index).map(|n| n.to_string()))
                .unwrap_or_default();
            Err(ExprError::UnboundColumn {
                column,
                relation: rel.label(),
            }
            .into())
        }
    }
}

fn select_item(name: &str, expr: Expr) -> SelectExpr {
    let same_name = matches!(&expr, Expr::Column { column, .. } if column == name);
    if same_name {
        SelectExpr::new(expr)
    } else {
        SelectExpr::new(expr).with_alias(name)
    }
}

fn select_list(named: &[(String, NodeRef)], exprs: &[Expr]) -> Vec<SelectExpr> {
    named
        .iter()
        .zip(exprs)
        .map(|((name, _), expr)| select_item(name, expr.clone()))
        .collect()
}

fn both_integers(left: &NodeRef, right: &NodeRef) -> bool {
    let is_int = |n: &NodeRef| n.dtype().is_some_and(|t| t.is_integer());
    is_int(left) && is_int(right)
}

fn datum_expr(value: &Datum) -> Expr {
    match value {
        Datum::Int(n) => sql::lit_int(*n),
        Datum::Float(x) => sql::lit_float(*x),
        _ => sql::lit_null(),
    }
}

fn binary_operator(op: BinaryOp) -> BinaryOperator {
    match op {
        BinaryOp::Add => BinaryOperator::Plus,
        BinaryOp::Subtract => BinaryOperator::Minus,
        BinaryOp::Multiply => BinaryOperator::Mul,
        BinaryOp::Divide => BinaryOperator::Div,
        BinaryOp::Modulo => BinaryOperator::Mod,
        BinaryOp::Equals => BinaryOperator::Eq,
        BinaryOp::NotEquals => BinaryOperator::Ne,
        BinaryOp::Less => BinaryOperator::Lt,
        BinaryOp::LessEqual => BinaryOperator::Lte,
        BinaryOp::Greater => BinaryOperator::Gt,
        BinaryOp::GreaterEqual => BinaryOperator::Gte,
        BinaryOp::And => BinaryOperator::And,
        BinaryOp::Or => BinaryOperator::Or,
    }
}

fn join_type(kind: JoinKind) -> JoinType {
    match kind {
        JoinKind::Inner => JoinType::Inner,
        JoinKind::Left => JoinType::Left,
        JoinKind::Right => JoinType::Right,
        JoinKind::Outer => JoinType::Full,
        JoinKind::Cross => JoinType::Cross,
    }
}
