//! Compiles requests and their association chains into SQL.
//!
//! To-one associations, and every `joining` association, become JOINs of a
//! single statement. A to-many `including` association becomes a separate
//! prefetch statement over the associated table, filtered on the keys of the
//! rows its parent statement returned, and paired back by hidden key columns.

use crate::alias::{AliasAllocator, SlotId, TableAlias};
use crate::association::{AssociationAggregate, AssociationSpec, Cardinality, TableMeta};
use crate::chain::{ChainNode, InclusionKind, Request, Requirement};
use crate::clause::OrderBy;
use crate::config::CompilerConfig;
use crate::decoder::DecodedRow;
use crate::expr::{Dialect, Expr};
use crate::join::{Condition, Join, JoinType, SubQuery};
use crate::layout::ColumnLayout;
use crate::statement::{KeyFilter, SelectItem, Statement};
use sqlassoc_core::{AssociationError, Result, Value, ValueKey};
use std::collections::HashSet;
use std::sync::Arc;

/// SQL text, bound parameters, and the layout of the rows it returns.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub sql: String,
    pub params: Vec<Value>,
    pub layout: Arc<ColumnLayout>,
}

/// The output of compiling a [`Request`].
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    /// The base statement
    pub root: CompiledStatement,
    /// Statements run after `root`, one per to-many include
    pub prefetches: Vec<PrefetchPlan>,
}

impl CompiledQuery {
    pub fn sql(&self) -> &str {
        &self.root.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.root.params
    }

    pub fn layout(&self) -> &Arc<ColumnLayout> {
        &self.root.layout
    }

    /// Total number of statements, counting nested prefetches.
    pub fn statement_count(&self) -> usize {
        fn count(plans: &[PrefetchPlan]) -> usize {
            plans.iter().map(|p| 1 + count(&p.children)).sum()
        }
        1 + count(&self.prefetches)
    }
}

/// A to-many include, rendered once its parent rows are known.
#[derive(Debug, Clone)]
pub struct PrefetchPlan {
    name: String,
    parent_scope: usize,
    parent_key_columns: Vec<usize>,
    dialect: Dialect,
    statement: Statement,
    layout: Arc<ColumnLayout>,
    children: Vec<PrefetchPlan>,
}

impl PrefetchPlan {
    /// Name under which the rows are paired onto their parent scope.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scope of the parent statement's layout the rows pair onto.
    pub fn parent_scope(&self) -> usize {
        self.parent_scope
    }

    /// Positions of the parent key in the parent statement's rows.
    pub fn parent_key_columns(&self) -> &[usize] {
        &self.parent_key_columns
    }

    pub fn layout(&self) -> &Arc<ColumnLayout> {
        &self.layout
    }

    /// Prefetches keyed on this statement's rows.
    pub fn children(&self) -> &[PrefetchPlan] {
        &self.children
    }

    /// Distinct non-NULL parent keys, in row order.
    pub fn parent_keys(&self, parents: &[DecodedRow]) -> Vec<Vec<Value>> {
        let mut seen: HashSet<Vec<ValueKey>> = HashSet::new();
        let mut keys = Vec::new();
        for parent in parents {
            let values: Vec<Value> = self
                .parent_key_columns
                .iter()
                .map(|&i| parent.row().get(i).cloned().unwrap_or(Value::Null))
                .collect();
            let Some(key) = values.iter().map(Value::key).collect::<Option<Vec<_>>>() else {
                continue;
            };
            if seen.insert(key) {
                keys.push(values);
            }
        }
        keys
    }

    /// Render the statement for a set of parent keys.
    pub fn render(&self, keys: &[Vec<Value>]) -> Result<CompiledStatement> {
        let (sql, params) = self.statement.render(self.dialect, keys)?;
        tracing::trace!(name = %self.name, %sql, "Rendered prefetch statement");
        Ok(CompiledStatement {
            sql,
            params,
            layout: Arc::clone(&self.layout),
        })
    }
}

/// Turns [`Request`]s into [`CompiledQuery`]s.
#[derive(Debug, Clone, Default)]
pub struct QueryCompiler {
    config: CompilerConfig,
}

impl QueryCompiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile a request. Identical requests compile to identical SQL.
    #[tracing::instrument(level = "debug", skip(self, request), fields(table = %request.table().name))]
    pub fn compile(&self, request: &Request) -> Result<CompiledQuery> {
        self.config.validate()?;

        let (statement, layout, pending) = self.plan_root(request)?;
        let (sql, params) = statement.render(self.config.dialect, &[])?;
        tracing::trace!(%sql, "Compiled root statement");

        let prefetches = pending
            .into_iter()
            .map(|p| self.plan_prefetch(p))
            .collect::<Result<Vec<_>>>()?;

        let compiled = CompiledQuery {
            root: CompiledStatement {
                sql,
                params,
                layout: Arc::new(layout),
            },
            prefetches,
        };
        tracing::debug!(
            statements = compiled.statement_count(),
            "Compiled association request"
        );
        Ok(compiled)
    }

    fn plan_root<'r>(
        &'r self,
        request: &'r Request,
    ) -> Result<(Statement, ColumnLayout, Vec<Pending<'r>>)> {
        let table = Arc::clone(request.table());
        let mut b = Builder::new(&self.config, table.width() + request.annotations().len());
        let root = b.allocator.add_slot(&table.name);

        b.plan_children(
            &Parent {
                slot: root,
                table: Arc::clone(&table),
                left: false,
                scope: 0,
                joining: false,
            },
            request.chain(),
        )?;
        let aggregates = b.plan_aggregates(request, root)?;
        b.register(root, request.aliases());

        let mut filters = Vec::new();
        let mut having = Vec::new();
        for filter in request.filters() {
            if filter.contains_aggregate() {
                having.push(Condition::expr(filter, root));
            } else {
                filters.push(Condition::expr(filter, root));
            }
        }
        filters.append(&mut b.filters);
        having.extend(request.having_terms().iter().map(|h| Condition::expr(h, root)));

        let group_by = if aggregates.is_empty() && having.is_empty() {
            Vec::new()
        } else if table.primary_key.is_empty() {
            table.columns.clone()
        } else {
            table.primary_key.clone()
        };

        let mut order: Vec<(OrderBy, SlotId)> =
            request.order().iter().map(|o| (o.clone(), root)).collect();
        order.append(&mut b.order);

        let mut select = vec![SelectItem::Star(root)];
        select.extend(
            request
                .annotations()
                .iter()
                .map(|(expr, name)| SelectItem::Expr {
                    expr: expr.clone(),
                    current: root,
                    name: name.clone(),
                }),
        );
        select.extend(b.stars.iter().map(|&slot| SelectItem::Star(slot)));

        let statement = Statement {
            aliases: b.allocator.allocate()?,
            aggregates,
            hidden: b.hidden,
            distinct: request.is_distinct(),
            select,
            table: table.name.clone(),
            root,
            joins: b.joins,
            key_filter: None,
            filters,
            group_by,
            having,
            order,
            limit: request.limit_value(),
            offset: request.offset_value(),
        };
        Ok((statement, b.layout, b.pending))
    }

    fn plan_prefetch(&self, pending: Pending<'_>) -> Result<PrefetchPlan> {
        let node = pending.node;
        let hops = node.spec().hops(node.requirement())?;
        let (Some(first), Some(last)) = (hops.first(), hops.last()) else {
            return Err(AssociationError::invalid(format!(
                "association `{}` has no hops",
                node.spec().name()
            ))
            .into());
        };

        let parent_key_columns = first
            .mapping()
            .iter()
            .map(|(origin, _)| {
                pending
                    .parent_table
                    .column_index(origin)
                    .map(|i| pending.parent_offset + i)
                    .ok_or_else(|| {
                        AssociationError::invalid(format!(
                            "association `{}`: column {origin} not found in table {}",
                            node.spec().name(),
                            pending.parent_table.name
                        ))
                        .into()
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let table = Arc::clone(last.destination());
        let mut b = Builder::new(&self.config, table.width());
        let root = b.allocator.add_slot(&table.name);

        b.plan_children(
            &Parent {
                slot: root,
                table: Arc::clone(&table),
                left: false,
                scope: 0,
                joining: false,
            },
            node.children(),
        )?;

        // Walk back through the pivots to the table holding the parent key.
        let mut key_slot = root;
        for i in (0..hops.len() - 1).rev() {
            let hop = &hops[i];
            let slot = b.allocator.add_slot(&hop.destination().name);
            let mut on = vec![Condition::Keys {
                left: slot,
                right: key_slot,
                columns: hops[i + 1].mapping().to_vec(),
            }];
            on.extend(hop.filters.iter().map(|f| Condition::expr(f, slot)));
            b.joins.push(Join {
                kind: JoinType::Inner,
                slot,
                table: hop.destination().name.clone(),
                on,
            });
            key_slot = slot;
        }
        b.register(root, node.aliases());

        let mut filters: Vec<Condition> = last
            .filters
            .iter()
            .chain(node.filters())
            .map(|f| Condition::expr(f, root))
            .collect();
        filters.append(&mut b.filters);

        let mut order: Vec<(OrderBy, SlotId)> = last
            .order
            .iter()
            .chain(node.order())
            .map(|o| (o.clone(), root))
            .collect();
        order.append(&mut b.order);

        let key_columns: Vec<String> = first.mapping().iter().map(|(_, d)| d.clone()).collect();
        let mut select = vec![SelectItem::Star(root)];
        select.extend(b.stars.iter().map(|&slot| SelectItem::Star(slot)));
        select.extend(
            key_columns
                .iter()
                .enumerate()
                .map(|(i, column)| SelectItem::Column {
                    slot: key_slot,
                    column: column.clone(),
                    name: format!("{}_{i}", self.config.pairing_prefix),
                }),
        );
        b.layout.push_pairing(key_columns.len());

        let statement = Statement {
            aliases: b.allocator.allocate()?,
            aggregates: Vec::new(),
            hidden: b.hidden,
            distinct: false,
            select,
            table: table.name.clone(),
            root,
            joins: b.joins,
            key_filter: Some(KeyFilter {
                slot: key_slot,
                columns: key_columns,
            }),
            filters,
            group_by: Vec::new(),
            having: Vec::new(),
            order,
            limit: None,
            offset: None,
        };
        // Surface alias errors now rather than at execution time.
        statement.render(self.config.dialect, &[])?;

        let children = b
            .pending
            .into_iter()
            .map(|p| self.plan_prefetch(p))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            association = %node.spec().name(),
            hops = hops.len(),
            "Planned prefetch statement"
        );

        Ok(PrefetchPlan {
            name: node.key().to_string(),
            parent_scope: pending.parent_scope,
            parent_key_columns,
            dialect: self.config.dialect,
            statement,
            layout: Arc::new(b.layout),
            children,
        })
    }
}

/// A to-many include waiting for its own statement.
struct Pending<'r> {
    node: &'r ChainNode,
    parent_scope: usize,
    /// First column of the parent scope in the parent statement
    parent_offset: usize,
    parent_table: Arc<TableMeta>,
}

/// The table a chain node is attached to.
struct Parent {
    slot: SlotId,
    table: Arc<TableMeta>,
    /// Reached through a LEFT JOIN
    left: bool,
    /// Nearest including scope
    scope: usize,
    /// Attached with `joining`
    joining: bool,
}

/// Working state of one statement.
struct Builder<'r> {
    allocator: AliasAllocator,
    joins: Vec<Join>,
    filters: Vec<Condition>,
    order: Vec<(OrderBy, SlotId)>,
    stars: Vec<SlotId>,
    /// Slots inside EXISTS subqueries
    hidden: Vec<SlotId>,
    layout: ColumnLayout,
    pending: Vec<Pending<'r>>,
}

fn reject_aggregates<'e>(
    name: &str,
    exprs: impl IntoIterator<Item = &'e Expr>,
) -> Result<()> {
    if exprs.into_iter().any(Expr::contains_aggregate) {
        return Err(AssociationError::unsupported(format!(
            "association `{name}`: aggregates are only supported on the base request"
        ))
        .into());
    }
    Ok(())
}

impl<'r> Builder<'r> {
    fn new(config: &CompilerConfig, root_width: usize) -> Self {
        Self {
            allocator: AliasAllocator::new(config.alias_numbering),
            joins: Vec::new(),
            filters: Vec::new(),
            order: Vec::new(),
            stars: Vec::new(),
            hidden: Vec::new(),
            layout: ColumnLayout::new(root_width),
            pending: Vec::new(),
        }
    }

    fn register(&mut self, slot: SlotId, aliases: &[TableAlias]) {
        for alias in aliases {
            self.allocator.attach(slot, alias);
        }
    }

    fn plan_children(&mut self, parent: &Parent, nodes: &'r [ChainNode]) -> Result<()> {
        for node in nodes {
            self.plan_node(parent, node)?;
        }
        Ok(())
    }

    fn check_node(parent: &Parent, node: &ChainNode) -> Result<()> {
        let spec = node.spec();
        if !spec.origin().name.eq_ignore_ascii_case(&parent.table.name) {
            return Err(AssociationError::invalid(format!(
                "association `{}` starts at {} but is attached to {}",
                spec.name(),
                spec.origin().name,
                parent.table.name
            ))
            .into());
        }
        reject_aggregates(
            spec.name(),
            node.filters()
                .iter()
                .chain(node.order().iter().map(|o| &o.expr)),
        )
    }

    fn claim_scope(&self, scope: usize, key: &str) -> Result<()> {
        let taken = self.layout.child(scope, key).is_some()
            || self
                .layout
                .scope(scope)
                .is_some_and(|s| s.prefetched.iter().any(|p| p == key));
        if taken {
            return Err(AssociationError::invalid(format!("duplicate scope `{key}`")).into());
        }
        Ok(())
    }

    /// Attach a condition to the parent's join, or to WHERE at the root.
    fn add_condition(&mut self, parent: &Parent, condition: Condition) {
        match self.joins.iter_mut().find(|j| j.slot == parent.slot) {
            Some(join) => join.on.push(condition),
            None => self.filters.push(condition),
        }
    }

    fn plan_node(&mut self, parent: &Parent, node: &'r ChainNode) -> Result<()> {
        Self::check_node(parent, node)?;
        let spec = node.spec();

        if node.inclusion() == InclusionKind::Including
            && spec.cardinality() == Cardinality::ToMany
        {
            if parent.joining {
                return Err(AssociationError::unsupported(format!(
                    "to-many association `{}` cannot be included below a joined association",
                    spec.name()
                ))
                .into());
            }
            self.claim_scope(parent.scope, node.key())?;
            tracing::debug!(
                association = %spec.name(),
                required = node.requirement() == Requirement::Required,
                "Prefetching to-many association"
            );
            if node.requirement() == Requirement::Required {
                let exists = self.exists(parent.slot, node)?;
                self.add_condition(parent, Condition::Exists(Box::new(exists)));
            }
            let parent_offset = self
                .layout
                .scope(parent.scope)
                .map_or(0, |s| s.range.start);
            self.layout.push_prefetched(parent.scope, node.key());
            self.pending.push(Pending {
                node,
                parent_scope: parent.scope,
                parent_offset,
                parent_table: Arc::clone(&parent.table),
            });
            return Ok(());
        }

        let hops = spec.hops(node.requirement())?;
        reject_aggregates(spec.name(), hops.iter().flat_map(|h| &h.filters))?;
        let mut prev = parent.slot;
        let mut left = parent.left;
        for (i, hop) in hops.iter().enumerate() {
            let slot = self.allocator.add_slot(&hop.destination().name);
            left = left || hop.requirement == Requirement::Optional;
            let mut on = vec![Condition::Keys {
                left: slot,
                right: prev,
                columns: hop
                    .mapping()
                    .iter()
                    .map(|(origin, dest)| (dest.clone(), origin.clone()))
                    .collect(),
            }];
            on.extend(hop.filters.iter().map(|f| Condition::expr(f, slot)));
            self.order.extend(hop.order.iter().map(|o| (o.clone(), slot)));
            if i + 1 == hops.len() {
                on.extend(node.filters().iter().map(|f| Condition::expr(f, slot)));
                self.order.extend(node.order().iter().map(|o| (o.clone(), slot)));
            }
            self.joins.push(Join {
                kind: if left { JoinType::Left } else { JoinType::Inner },
                slot,
                table: hop.destination().name.clone(),
                on,
            });
            prev = slot;
        }

        let table = Arc::clone(spec.destination_arc());
        let scope = match node.inclusion() {
            InclusionKind::Including => {
                self.claim_scope(parent.scope, node.key())?;
                self.stars.push(prev);
                self.layout
                    .push_scope(parent.scope, node.key(), table.width(), left)
            }
            InclusionKind::Joining => parent.scope,
        };
        if left && node.requirement() == Requirement::Required && !parent.left {
            tracing::debug!(association = %spec.name(), "Required association joined with LEFT JOIN");
        }

        self.plan_children(
            &Parent {
                slot: prev,
                table,
                left,
                scope,
                joining: node.inclusion() == InclusionKind::Joining,
            },
            node.children(),
        )?;
        self.register(prev, node.aliases());
        Ok(())
    }

    /// `EXISTS` subquery requiring at least one associated row.
    ///
    /// Required children nest as further subqueries; optional ones cannot
    /// exclude rows and are skipped.
    fn exists(&mut self, outer: SlotId, node: &ChainNode) -> Result<SubQuery> {
        let spec = node.spec();
        let hops = spec.hops(Requirement::Required)?;
        reject_aggregates(spec.name(), hops.iter().flat_map(|h| &h.filters))?;

        let mut joins = Vec::new();
        let mut conditions = Vec::new();
        let mut slots = Vec::with_capacity(hops.len());
        let mut head: Option<(SlotId, String)> = None;
        let mut prev = outer;
        for hop in &hops {
            let slot = self.allocator.add_slot(&hop.destination().name);
            self.hidden.push(slot);
            slots.push(slot);
            let keys = Condition::Keys {
                left: slot,
                right: prev,
                columns: hop
                    .mapping()
                    .iter()
                    .map(|(origin, dest)| (dest.clone(), origin.clone()))
                    .collect(),
            };
            let filters = hop.filters.iter().map(|f| Condition::expr(f, slot));
            if head.is_none() {
                head = Some((slot, hop.destination().name.clone()));
                conditions.push(keys);
                conditions.extend(filters);
            } else {
                let mut on = vec![keys];
                on.extend(filters);
                joins.push(Join {
                    kind: JoinType::Inner,
                    slot,
                    table: hop.destination().name.clone(),
                    on,
                });
            }
            prev = slot;
        }
        let Some((slot, table)) = head else {
            return Err(
                AssociationError::invalid(format!("association `{}` has no hops", spec.name()))
                    .into(),
            );
        };

        conditions.extend(node.filters().iter().map(|f| Condition::expr(f, prev)));
        let destination = Arc::clone(spec.destination_arc());
        for child in node.children() {
            if child.requirement() != Requirement::Required {
                continue;
            }
            let parent = Parent {
                slot: prev,
                table: Arc::clone(&destination),
                left: false,
                scope: 0,
                joining: true,
            };
            Self::check_node(&parent, child)?;
            conditions.push(Condition::Exists(Box::new(self.exists(prev, child)?)));
        }
        self.register(prev, node.aliases());

        Ok(SubQuery {
            slot,
            slots,
            table,
            joins,
            conditions,
        })
    }

    /// LEFT JOIN every association the request aggregates over.
    fn plan_aggregates(
        &mut self,
        request: &Request,
        root: SlotId,
    ) -> Result<Vec<(AssociationSpec, SlotId)>> {
        let mut found: Vec<&AssociationAggregate> = Vec::new();
        for expr in request
            .filters()
            .iter()
            .chain(request.having_terms())
            .chain(request.order().iter().map(|o| &o.expr))
            .chain(request.annotations().iter().map(|(e, _)| e))
        {
            expr.visit_aggregates(&mut found);
        }

        let mut planned: Vec<(AssociationSpec, SlotId)> = Vec::new();
        for aggregate in found {
            let spec = aggregate.association();
            if planned.iter().any(|(s, _)| s == spec) {
                continue;
            }
            if !spec
                .origin()
                .name
                .eq_ignore_ascii_case(&request.table().name)
            {
                return Err(AssociationError::invalid(format!(
                    "aggregate over `{}` starts at {} but the request selects from {}",
                    spec.name(),
                    spec.origin().name,
                    request.table().name
                ))
                .into());
            }
            let hops = spec.hops(Requirement::Optional)?;
            let mut prev = root;
            for hop in &hops {
                let slot = self.allocator.add_slot(&hop.destination().name);
                let mut on = vec![Condition::Keys {
                    left: slot,
                    right: prev,
                    columns: hop
                        .mapping()
                        .iter()
                        .map(|(origin, dest)| (dest.clone(), origin.clone()))
                        .collect(),
                }];
                on.extend(hop.filters.iter().map(|f| Condition::expr(f, slot)));
                self.joins.push(Join {
                    kind: JoinType::Left,
                    slot,
                    table: hop.destination().name.clone(),
                    on,
                });
                prev = slot;
            }
            tracing::debug!(association = %spec.name(), "Joined association for aggregate");
            planned.push((spec.clone(), prev));
        }
        Ok(planned)
    }
}
