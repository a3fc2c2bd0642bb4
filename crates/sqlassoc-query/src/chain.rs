//! Association chains and the requests they hang from.
//!
//! A [`Request`] selects from a base table; attaching associations to it (and
//! to the attached [`ChainNode`]s) builds a finite tree. Nothing is rendered
//! until [`Request::compile`], so filters, orderings and aliases can be added
//! in any order and compile to the same SQL.

use crate::alias::TableAlias;
use crate::association::{AssociationSpec, TableMeta};
use crate::clause::OrderBy;
use crate::compiler::{CompiledQuery, QueryCompiler};
use crate::expr::Expr;
use serde::{Deserialize, Serialize};
use sqlassoc_core::{Result, SchemaIntrospector};
use std::sync::Arc;

/// Whether an attached association exposes a scope of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InclusionKind {
    /// Select the associated columns and expose them as a named scope
    Including,
    /// Use the association for filtering, ordering or existence only
    Joining,
}

/// Inner-join versus left-join semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Requirement {
    /// Base rows without an associated row are excluded
    Required,
    /// Base rows without an associated row are kept
    Optional,
}

/// One association attached to a request or to another node.
#[derive(Debug, Clone)]
pub struct ChainNode {
    spec: AssociationSpec,
    key: String,
    inclusion: InclusionKind,
    requirement: Requirement,
    filters: Vec<Expr>,
    order: Vec<OrderBy>,
    aliases: Vec<TableAlias>,
    children: Vec<ChainNode>,
}

impl From<AssociationSpec> for ChainNode {
    fn from(spec: AssociationSpec) -> Self {
        let key = spec.name().to_string();
        let (spec, filters, order) = spec.split_refinements();
        Self {
            spec,
            key,
            inclusion: InclusionKind::Including,
            requirement: Requirement::Required,
            filters,
            order,
            aliases: Vec::new(),
            children: Vec::new(),
        }
    }
}

impl From<&AssociationSpec> for ChainNode {
    fn from(spec: &AssociationSpec) -> Self {
        Self::from(spec.clone())
    }
}

/// Attach `node` to `siblings`, merging it into an equal sibling.
fn attach(siblings: &mut Vec<ChainNode>, node: ChainNode) {
    match siblings
        .iter_mut()
        .find(|s| s.key == node.key && s.spec == node.spec)
    {
        Some(existing) => existing.merge(node),
        None => siblings.push(node),
    }
}

impl ChainNode {
    fn with(
        mut self,
        child: impl Into<ChainNode>,
        inclusion: InclusionKind,
        requirement: Requirement,
    ) -> Self {
        let mut child = child.into();
        child.inclusion = inclusion;
        child.requirement = requirement;
        attach(&mut self.children, child);
        self
    }

    fn merge(&mut self, other: ChainNode) {
        if other.inclusion == InclusionKind::Including {
            self.inclusion = InclusionKind::Including;
        }
        if other.requirement == Requirement::Required {
            self.requirement = Requirement::Required;
        }
        self.filters.extend(other.filters);
        self.order.extend(other.order);
        for alias in other.aliases {
            if !self.aliases.contains(&alias) {
                self.aliases.push(alias);
            }
        }
        for child in other.children {
            attach(&mut self.children, child);
        }
    }

    /// Add a filter on the associated table. Unqualified columns refer to it.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filters.push(expr);
        self
    }

    /// Add an ordering on the associated table.
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order.push(order);
        self
    }

    /// Bind a table alias to the associated table.
    pub fn aliased(mut self, alias: &TableAlias) -> Self {
        if !self.aliases.contains(alias) {
            self.aliases.push(alias.clone());
        }
        self
    }

    /// Rename the scope this node exposes.
    pub fn named(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn including_required(self, child: impl Into<ChainNode>) -> Self {
        self.with(child, InclusionKind::Including, Requirement::Required)
    }

    pub fn including_optional(self, child: impl Into<ChainNode>) -> Self {
        self.with(child, InclusionKind::Including, Requirement::Optional)
    }

    pub fn joining_required(self, child: impl Into<ChainNode>) -> Self {
        self.with(child, InclusionKind::Joining, Requirement::Required)
    }

    pub fn joining_optional(self, child: impl Into<ChainNode>) -> Self {
        self.with(child, InclusionKind::Joining, Requirement::Optional)
    }

    pub fn spec(&self) -> &AssociationSpec {
        &self.spec
    }

    /// Scope name; the association name unless renamed.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn inclusion(&self) -> InclusionKind {
        self.inclusion
    }

    pub fn requirement(&self) -> Requirement {
        self.requirement
    }

    pub fn filters(&self) -> &[Expr] {
        &self.filters
    }

    pub fn order(&self) -> &[OrderBy] {
        &self.order
    }

    pub fn aliases(&self) -> &[TableAlias] {
        &self.aliases
    }

    pub fn children(&self) -> &[ChainNode] {
        &self.children
    }
}

/// A query over a base table with an attached association chain.
#[derive(Debug, Clone)]
pub struct Request {
    table: Arc<TableMeta>,
    aliases: Vec<TableAlias>,
    filters: Vec<Expr>,
    having: Vec<Expr>,
    order: Vec<OrderBy>,
    annotations: Vec<(Expr, String)>,
    chain: Vec<ChainNode>,
    limit: Option<u64>,
    offset: Option<u64>,
    distinct: bool,
}

impl Request {
    /// Select every row of `table`.
    pub fn new(table: impl Into<Arc<TableMeta>>) -> Self {
        Self {
            table: table.into(),
            aliases: Vec::new(),
            filters: Vec::new(),
            having: Vec::new(),
            order: Vec::new(),
            annotations: Vec::new(),
            chain: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
        }
    }

    /// Select from a table described by a schema.
    pub fn introspect(schema: &dyn SchemaIntrospector, table: &str) -> Result<Self> {
        Ok(Self::new(TableMeta::introspect(schema, table)?))
    }

    /// Select from the origin table of an association.
    pub fn origin_of(spec: &AssociationSpec) -> Self {
        Self::new(spec.origin().clone())
    }

    fn with(
        mut self,
        child: impl Into<ChainNode>,
        inclusion: InclusionKind,
        requirement: Requirement,
    ) -> Self {
        let mut child = child.into();
        child.inclusion = inclusion;
        child.requirement = requirement;
        attach(&mut self.chain, child);
        self
    }

    /// Add a WHERE term. Unqualified columns refer to the base table.
    ///
    /// Terms containing an association aggregate move to HAVING.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filters.push(expr);
        self
    }

    /// Add a HAVING term.
    pub fn having(mut self, expr: Expr) -> Self {
        self.having.push(expr);
        self
    }

    /// Add an ORDER BY term. Base terms sort before associated ones.
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order.push(order);
        self
    }

    /// Bind a table alias to the base table.
    pub fn aliased(mut self, alias: &TableAlias) -> Self {
        if !self.aliases.contains(alias) {
            self.aliases.push(alias.clone());
        }
        self
    }

    /// Select an extra expression, exposed in the base scope as `name`.
    pub fn annotated(mut self, expr: Expr, name: impl Into<String>) -> Self {
        self.annotations.push((expr, name.into()));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn including_required(self, child: impl Into<ChainNode>) -> Self {
        self.with(child, InclusionKind::Including, Requirement::Required)
    }

    pub fn including_optional(self, child: impl Into<ChainNode>) -> Self {
        self.with(child, InclusionKind::Including, Requirement::Optional)
    }

    pub fn joining_required(self, child: impl Into<ChainNode>) -> Self {
        self.with(child, InclusionKind::Joining, Requirement::Required)
    }

    pub fn joining_optional(self, child: impl Into<ChainNode>) -> Self {
        self.with(child, InclusionKind::Joining, Requirement::Optional)
    }

    /// Compile with the default configuration.
    pub fn compile(&self) -> Result<CompiledQuery> {
        QueryCompiler::default().compile(self)
    }

    pub fn table(&self) -> &Arc<TableMeta> {
        &self.table
    }

    pub fn aliases(&self) -> &[TableAlias] {
        &self.aliases
    }

    pub fn filters(&self) -> &[Expr] {
        &self.filters
    }

    pub fn having_terms(&self) -> &[Expr] {
        &self.having
    }

    pub fn order(&self) -> &[OrderBy] {
        &self.order
    }

    pub fn annotations(&self) -> &[(Expr, String)] {
        &self.annotations
    }

    pub fn chain(&self) -> &[ChainNode] {
        &self.chain
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }
}
