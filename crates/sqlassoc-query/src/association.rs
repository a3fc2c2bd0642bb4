//! Association definitions.
//!
//! An [`AssociationSpec`] describes one relationship between two tables: its
//! kind, the key columns joining them, and any definition-level filter or
//! ordering. Key columns are resolved once, when the association is built,
//! from the foreign keys a [`SchemaIntrospector`] reports. Specs are immutable; every
//! refinement returns a new spec.

use crate::alias::TableAlias;
use crate::chain::{ChainNode, Requirement};
use crate::clause::OrderBy;
use crate::expr::{Expr, SqlWriter};
use serde::{Deserialize, Serialize};
use sqlassoc_core::{AssociationError, AssociationErrorKind, Result, SchemaIntrospector};
use std::sync::Arc;

/// The kind of an association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssociationKind {
    /// The origin table holds the foreign key (`books.authorId → authors.id`)
    BelongsTo,
    /// The destination table holds the foreign key; at most one match
    HasOne,
    /// The destination table holds the foreign key; any number of matches
    HasMany,
    /// Two or more to-one hops through a pivot
    HasOneThrough,
    /// Hops through a pivot, at least one of them to-many
    HasManyThrough,
}

/// How many destination rows one origin row can match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    ToOne,
    ToMany,
}

/// Table identity: name, ordered columns and primary key.
///
/// The column list must match what `SELECT table.*` returns, since it
/// determines how result rows are sliced into scopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    pub name: String,
    pub columns: Vec<String>,
    pub primary_key: Vec<String>,
}

impl TableMeta {
    /// Declare a table explicitly.
    pub fn new<C, P>(name: impl Into<String>, columns: C, primary_key: P) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            primary_key: primary_key.into_iter().map(Into::into).collect(),
        }
    }

    /// Load a table's metadata from a schema.
    pub fn introspect(schema: &dyn SchemaIntrospector, name: &str) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            columns: schema.columns(name)?,
            primary_key: schema.primary_key(name)?,
        })
    }

    /// Position of a column, matched case-insensitively.
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .or_else(|| {
                self.columns
                    .iter()
                    .position(|c| c.eq_ignore_ascii_case(column))
            })
    }

    /// Number of columns `table.*` yields.
    pub fn width(&self) -> usize {
        self.columns.len()
    }
}

/// The foreign key of an association, in any of the accepted input forms.
///
/// Every form is normalized to ordered `(origin, destination)` column pairs
/// when the association is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForeignKey {
    /// Referencing columns only. Selects the declared foreign key with these
    /// columns, or pairs them with the referenced table's primary key.
    Columns(Vec<String>),
    /// Referencing and referenced columns, paired in order.
    Explicit {
        columns: Vec<String>,
        destination: Vec<String>,
    },
}

impl ForeignKey {
    /// A fully specified key.
    pub fn new<C, D>(columns: C, destination: D) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        ForeignKey::Explicit {
            columns: columns.into_iter().map(Into::into).collect(),
            destination: destination.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<&str> for ForeignKey {
    fn from(column: &str) -> Self {
        ForeignKey::Columns(vec![column.to_string()])
    }
}

impl From<String> for ForeignKey {
    fn from(column: String) -> Self {
        ForeignKey::Columns(vec![column])
    }
}

impl From<Vec<&str>> for ForeignKey {
    fn from(columns: Vec<&str>) -> Self {
        ForeignKey::Columns(columns.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for ForeignKey {
    fn from(columns: Vec<String>) -> Self {
        ForeignKey::Columns(columns)
    }
}

impl<const N: usize> From<[&str; N]> for ForeignKey {
    fn from(columns: [&str; N]) -> Self {
        ForeignKey::Columns(columns.iter().map(|c| (*c).to_string()).collect())
    }
}

/// An immutable association between two tables.
///
/// Clones are cheap and share the definition.
#[derive(Clone)]
pub struct AssociationSpec {
    inner: Arc<SpecInner>,
}

#[derive(Debug, Clone, PartialEq)]
struct SpecInner {
    kind: AssociationKind,
    name: String,
    origin: Arc<TableMeta>,
    destination: Arc<TableMeta>,
    mapping: Vec<(String, String)>,
    through: Option<Through>,
    filters: Vec<Expr>,
    order: Vec<OrderBy>,
    optionality: Option<Requirement>,
}

#[derive(Debug, Clone, PartialEq)]
struct Through {
    pivot: AssociationSpec,
    target: AssociationSpec,
}

/// One join of a flattened association.
#[derive(Debug, Clone)]
pub(crate) struct Hop {
    /// A direct (non-through) association
    pub(crate) spec: AssociationSpec,
    pub(crate) requirement: Requirement,
    pub(crate) filters: Vec<Expr>,
    pub(crate) order: Vec<OrderBy>,
}

impl Hop {
    pub(crate) fn destination(&self) -> &Arc<TableMeta> {
        &self.spec.inner.destination
    }

    pub(crate) fn mapping(&self) -> &[(String, String)] {
        &self.spec.inner.mapping
    }
}

/// Builds a direct association, resolving its key columns from a schema.
#[derive(Debug, Clone)]
pub struct AssociationBuilder {
    kind: AssociationKind,
    name: String,
    origin: String,
    destination: String,
    foreign_key: Option<ForeignKey>,
}

impl AssociationBuilder {
    /// Use this foreign key instead of inferring the only declared one.
    pub fn foreign_key(mut self, foreign_key: impl Into<ForeignKey>) -> Self {
        self.foreign_key = Some(foreign_key.into());
        self
    }

    /// Resolve table metadata and key columns.
    #[tracing::instrument(level = "trace", skip(self, schema), fields(name = %self.name))]
    pub fn build(self, schema: &dyn SchemaIntrospector) -> Result<AssociationSpec> {
        let origin = TableMeta::introspect(schema, &self.origin)?;
        let destination = TableMeta::introspect(schema, &self.destination)?;
        let mapping = resolve_mapping(
            self.kind,
            &self.name,
            &origin,
            &destination,
            self.foreign_key,
            schema,
        )?;
        tracing::trace!(?mapping, "Resolved association keys");
        Ok(AssociationSpec::from_inner(SpecInner {
            kind: self.kind,
            name: self.name,
            origin: Arc::new(origin),
            destination: Arc::new(destination),
            mapping,
            through: None,
            filters: Vec::new(),
            order: Vec::new(),
            optionality: None,
        }))
    }
}

fn ambiguous(message: String) -> sqlassoc_core::Error {
    AssociationError::new(AssociationErrorKind::AmbiguousForeignKey, message).into()
}

/// Normalize any foreign key input into `(origin, destination)` pairs.
fn resolve_mapping(
    kind: AssociationKind,
    name: &str,
    origin: &TableMeta,
    destination: &TableMeta,
    foreign_key: Option<ForeignKey>,
    schema: &dyn SchemaIntrospector,
) -> Result<Vec<(String, String)>> {
    // The table holding the foreign key, and the table it references.
    let (holder, referenced) = match kind {
        AssociationKind::BelongsTo => (origin, destination),
        _ => (destination, origin),
    };

    // (referencing column, referenced column)
    let pairs: Vec<(String, String)> = match foreign_key {
        Some(ForeignKey::Explicit {
            columns,
            destination: referenced_columns,
        }) => {
            if columns.is_empty() || columns.len() != referenced_columns.len() {
                return Err(AssociationError::invalid(format!(
                    "association `{name}`: foreign key has {} columns but references {}",
                    columns.len(),
                    referenced_columns.len()
                ))
                .into());
            }
            columns.into_iter().zip(referenced_columns).collect()
        }
        Some(ForeignKey::Columns(columns)) => {
            let declared = schema.foreign_keys(&holder.name, &referenced.name)?;
            if let Some(fk) = declared.iter().find(|fk| fk.has_columns(&columns)) {
                fk.columns
                    .iter()
                    .cloned()
                    .zip(fk.foreign_columns.iter().cloned())
                    .collect()
            } else if !columns.is_empty() && columns.len() == referenced.primary_key.len() {
                columns
                    .into_iter()
                    .zip(referenced.primary_key.iter().cloned())
                    .collect()
            } else {
                return Err(ambiguous(format!(
                    "association `{name}`: columns ({}) of {} do not match a foreign key or the primary key of {}",
                    columns.join(", "),
                    holder.name,
                    referenced.name
                )));
            }
        }
        None => {
            let declared = schema.foreign_keys(&holder.name, &referenced.name)?;
            match declared.as_slice() {
                [fk] => fk
                    .columns
                    .iter()
                    .cloned()
                    .zip(fk.foreign_columns.iter().cloned())
                    .collect(),
                [] => {
                    return Err(ambiguous(format!(
                        "association `{name}`: no foreign key from {} to {}",
                        holder.name, referenced.name
                    )));
                }
                several => {
                    return Err(ambiguous(format!(
                        "association `{name}`: {} foreign keys from {} to {}; specify one explicitly",
                        several.len(),
                        holder.name,
                        referenced.name
                    )));
                }
            }
        }
    };

    if pairs.is_empty() || pairs.iter().any(|(a, b)| a.is_empty() || b.is_empty()) {
        return Err(ambiguous(format!(
            "association `{name}`: incomplete foreign key from {} to {}",
            holder.name, referenced.name
        )));
    }
    for (column, table) in pairs
        .iter()
        .map(|(c, _)| (c, holder))
        .chain(pairs.iter().map(|(_, c)| (c, referenced)))
    {
        if !table.columns.is_empty() && table.column_index(column).is_none() {
            return Err(AssociationError::invalid(format!(
                "association `{name}`: column {column} not found in table {}",
                table.name
            ))
            .into());
        }
    }

    Ok(match kind {
        AssociationKind::BelongsTo => pairs,
        _ => pairs.into_iter().map(|(fk, pk)| (pk, fk)).collect(),
    })
}

impl AssociationSpec {
    fn from_inner(inner: SpecInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    fn builder(
        kind: AssociationKind,
        name: impl Into<String>,
        origin: impl Into<String>,
        destination: impl Into<String>,
    ) -> AssociationBuilder {
        AssociationBuilder {
            kind,
            name: name.into(),
            origin: origin.into(),
            destination: destination.into(),
            foreign_key: None,
        }
    }

    /// The origin table holds a foreign key to the destination.
    pub fn belongs_to(
        name: impl Into<String>,
        origin: impl Into<String>,
        destination: impl Into<String>,
    ) -> AssociationBuilder {
        Self::builder(AssociationKind::BelongsTo, name, origin, destination)
    }

    /// The destination holds a foreign key to the origin; at most one row matches.
    pub fn has_one(
        name: impl Into<String>,
        origin: impl Into<String>,
        destination: impl Into<String>,
    ) -> AssociationBuilder {
        Self::builder(AssociationKind::HasOne, name, origin, destination)
    }

    /// The destination holds a foreign key to the origin.
    pub fn has_many(
        name: impl Into<String>,
        origin: impl Into<String>,
        destination: impl Into<String>,
    ) -> AssociationBuilder {
        Self::builder(AssociationKind::HasMany, name, origin, destination)
    }

    /// A to-one association through a to-one pivot.
    pub fn has_one_through(
        name: impl Into<String>,
        pivot: &AssociationSpec,
        target: &AssociationSpec,
    ) -> Result<AssociationSpec> {
        let name = name.into();
        if pivot.cardinality() == Cardinality::ToMany || target.cardinality() == Cardinality::ToMany
        {
            return Err(AssociationError::invalid(format!(
                "has-one-through association `{name}` requires to-one hops, `{}` and `{}`",
                pivot.name(),
                target.name()
            ))
            .into());
        }
        Self::through(AssociationKind::HasOneThrough, name, pivot, target)
    }

    /// A to-many association through a pivot. At least one hop must be to-many.
    pub fn has_many_through(
        name: impl Into<String>,
        pivot: &AssociationSpec,
        target: &AssociationSpec,
    ) -> Result<AssociationSpec> {
        let name = name.into();
        if pivot.cardinality() == Cardinality::ToOne && target.cardinality() == Cardinality::ToOne
        {
            return Err(AssociationError::invalid(format!(
                "has-many-through association `{name}` has only to-one hops, `{}` and `{}`; use has_one_through",
                pivot.name(),
                target.name()
            ))
            .into());
        }
        Self::through(AssociationKind::HasManyThrough, name, pivot, target)
    }

    fn through(
        kind: AssociationKind,
        name: String,
        pivot: &AssociationSpec,
        target: &AssociationSpec,
    ) -> Result<AssociationSpec> {
        if !pivot
            .destination()
            .name
            .eq_ignore_ascii_case(&target.origin().name)
        {
            return Err(AssociationError::invalid(format!(
                "through association `{name}`: pivot `{}` ends at {} but target `{}` starts at {}",
                pivot.name(),
                pivot.destination().name,
                target.name(),
                target.origin().name
            ))
            .into());
        }
        Ok(Self::from_inner(SpecInner {
            kind,
            name,
            origin: Arc::clone(&pivot.inner.origin),
            destination: Arc::clone(&target.inner.destination),
            mapping: Vec::new(),
            through: Some(Through {
                pivot: pivot.clone(),
                target: target.clone(),
            }),
            filters: Vec::new(),
            order: Vec::new(),
            optionality: None,
        }))
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn kind(&self) -> AssociationKind {
        self.inner.kind
    }

    /// To-many when any hop is to-many.
    pub fn cardinality(&self) -> Cardinality {
        match (&self.inner.kind, &self.inner.through) {
            (AssociationKind::BelongsTo | AssociationKind::HasOne, _) => Cardinality::ToOne,
            (AssociationKind::HasMany, _) => Cardinality::ToMany,
            (_, Some(t)) => {
                if t.pivot.cardinality() == Cardinality::ToMany
                    || t.target.cardinality() == Cardinality::ToMany
                {
                    Cardinality::ToMany
                } else {
                    Cardinality::ToOne
                }
            }
            (_, None) => Cardinality::ToOne,
        }
    }

    pub fn origin(&self) -> &TableMeta {
        &self.inner.origin
    }

    pub fn destination(&self) -> &TableMeta {
        &self.inner.destination
    }

    pub(crate) fn destination_arc(&self) -> &Arc<TableMeta> {
        &self.inner.destination
    }

    /// `(origin column, destination column)` pairs. Empty for through associations.
    pub fn mapping(&self) -> &[(String, String)] {
        &self.inner.mapping
    }

    /// The pivot and target of a through association.
    pub fn through_parts(&self) -> Option<(&AssociationSpec, &AssociationSpec)> {
        self.inner.through.as_ref().map(|t| (&t.pivot, &t.target))
    }

    pub fn filters(&self) -> &[Expr] {
        &self.inner.filters
    }

    pub fn order(&self) -> &[OrderBy] {
        &self.inner.order
    }

    /// Requirement applied when this spec is the pivot of a through association.
    pub fn optionality(&self) -> Option<Requirement> {
        self.inner.optionality
    }

    fn map(&self, f: impl FnOnce(&mut SpecInner)) -> Self {
        let mut inner = (*self.inner).clone();
        f(&mut inner);
        Self::from_inner(inner)
    }

    /// Add a definition-level filter on the destination table.
    pub fn filter(&self, expr: Expr) -> Self {
        self.map(|inner| inner.filters.push(expr))
    }

    /// Add a definition-level ordering on the destination table.
    pub fn order_by(&self, order: OrderBy) -> Self {
        self.map(|inner| inner.order.push(order))
    }

    /// Rename the association. The name is the default scope key.
    pub fn named(&self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.map(|inner| inner.name = name)
    }

    /// Traverse this spec with a LEFT JOIN when it is the pivot of a through association.
    pub fn optional(&self) -> Self {
        self.map(|inner| inner.optionality = Some(Requirement::Optional))
    }

    /// Traverse this spec with an inner JOIN when it is the pivot of a through association.
    pub fn required(&self) -> Self {
        self.map(|inner| inner.optionality = Some(Requirement::Required))
    }

    /// A chain node for this association bound to `alias`.
    pub fn aliased(&self, alias: &TableAlias) -> ChainNode {
        ChainNode::from(self.clone()).aliased(alias)
    }

    /// The spec without its top-level filters and ordering.
    pub(crate) fn split_refinements(&self) -> (AssociationSpec, Vec<Expr>, Vec<OrderBy>) {
        if self.inner.filters.is_empty() && self.inner.order.is_empty() {
            return (self.clone(), Vec::new(), Vec::new());
        }
        let filters = self.inner.filters.clone();
        let order = self.inner.order.clone();
        let base = self.map(|inner| {
            inner.filters.clear();
            inner.order.clear();
        });
        (base, filters, order)
    }

    /// Flatten into one hop per join.
    ///
    /// The last hop is traversed with `requirement`; pivot hops use their own
    /// optionality when set. Ordering of pivot hops is dropped.
    pub(crate) fn hops(&self, requirement: Requirement) -> Result<Vec<Hop>> {
        let mut hops = Vec::new();
        self.push_hops(requirement, &mut hops)?;
        let last = hops.len().saturating_sub(1);
        for hop in &mut hops[..last] {
            if !hop.order.is_empty() {
                tracing::debug!(
                    association = %self.name(),
                    pivot = %hop.spec.name(),
                    dropped = hop.order.len(),
                    "Ignoring ordering of a through pivot"
                );
                hop.order.clear();
            }
        }
        Ok(hops)
    }

    fn push_hops(&self, requirement: Requirement, out: &mut Vec<Hop>) -> Result<()> {
        match &self.inner.through {
            None => out.push(Hop {
                spec: self.clone(),
                requirement,
                filters: self.inner.filters.clone(),
                order: self.inner.order.clone(),
            }),
            Some(through) => {
                let pivot_requirement = match (through.pivot.optionality(), requirement) {
                    (Some(Requirement::Optional), Requirement::Required) => {
                        return Err(AssociationError::unsupported(format!(
                            "through association `{}`: optional pivot `{}` under a required association",
                            self.name(),
                            through.pivot.name()
                        ))
                        .into());
                    }
                    (Some(Requirement::Optional), Requirement::Optional) => Requirement::Optional,
                    (_, outer) => outer,
                };
                through.pivot.push_hops(pivot_requirement, out)?;
                through.target.push_hops(requirement, out)?;
                if let Some(last) = out.last_mut() {
                    last.filters.extend(self.inner.filters.iter().cloned());
                    last.order.extend(self.inner.order.iter().cloned());
                }
            }
        }
        Ok(())
    }

    fn aggregate(&self, function: AggregateFunction, column: Option<String>) -> Expr {
        Expr::Aggregate(Box::new(AssociationAggregate {
            association: self.clone(),
            function,
            column,
        }))
    }

    /// Number of distinct associated rows.
    pub fn count(&self) -> Expr {
        self.aggregate(AggregateFunction::Count, None)
    }

    /// True when no row is associated.
    pub fn is_empty(&self) -> Expr {
        self.aggregate(AggregateFunction::IsEmpty, None)
    }

    /// SUM of a destination column.
    pub fn sum(&self, column: impl Into<String>) -> Expr {
        self.aggregate(AggregateFunction::Sum, Some(column.into()))
    }

    /// AVG of a destination column.
    pub fn average(&self, column: impl Into<String>) -> Expr {
        self.aggregate(AggregateFunction::Average, Some(column.into()))
    }

    /// MIN of a destination column.
    pub fn min(&self, column: impl Into<String>) -> Expr {
        self.aggregate(AggregateFunction::Min, Some(column.into()))
    }

    /// MAX of a destination column.
    pub fn max(&self, column: impl Into<String>) -> Expr {
        self.aggregate(AggregateFunction::Max, Some(column.into()))
    }
}

impl PartialEq for AssociationSpec {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || *self.inner == *other.inner
    }
}

impl std::fmt::Debug for AssociationSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssociationSpec")
            .field("name", &self.inner.name)
            .field("kind", &self.inner.kind)
            .field("origin", &self.inner.origin.name)
            .field("destination", &self.inner.destination.name)
            .field("mapping", &self.inner.mapping)
            .finish_non_exhaustive()
    }
}

/// Aggregate functions over an association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    IsEmpty,
    Sum,
    Average,
    Min,
    Max,
}

/// An aggregate over the rows an association reaches from the base table.
#[derive(Debug, Clone, PartialEq)]
pub struct AssociationAggregate {
    association: AssociationSpec,
    function: AggregateFunction,
    column: Option<String>,
}

impl AssociationAggregate {
    pub fn association(&self) -> &AssociationSpec {
        &self.association
    }

    pub fn function(&self) -> AggregateFunction {
        self.function
    }

    pub(crate) fn render(&self, w: &SqlWriter, alias: &str) -> String {
        let destination = self.association.destination();
        let counted = || {
            let key = destination
                .primary_key
                .first()
                .or_else(|| destination.columns.first())
                .map_or("rowid", String::as_str);
            w.column(alias, key)
        };
        let column = || w.column(alias, self.column.as_deref().unwrap_or_default());
        match self.function {
            AggregateFunction::Count => format!("COUNT(DISTINCT {})", counted()),
            AggregateFunction::IsEmpty => format!("(COUNT(DISTINCT {}) = 0)", counted()),
            AggregateFunction::Sum => format!("SUM({})", column()),
            AggregateFunction::Average => format!("AVG({})", column()),
            AggregateFunction::Min => format!("MIN({})", column()),
            AggregateFunction::Max => format!("MAX({})", column()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlassoc_core::{AssociationErrorKind, Error};
    use sqlassoc_schema::{DatabaseSchema, TableInfo};

    fn library() -> DatabaseSchema {
        DatabaseSchema::new()
            .with_table(TableInfo::new("authors", ["id", "name", "birthYear"]).primary_key(["id"]))
            .with_table(
                TableInfo::new("books", ["id", "authorId", "editorId", "title", "year"])
                    .primary_key(["id"])
                    .foreign_key("authorId", "authors", "id")
                    .foreign_key("editorId", "authors", "id"),
            )
            .with_table(
                TableInfo::new("persons", ["id", "parentId"])
                    .primary_key(["id"])
                    .foreign_key("parentId", "persons", "id"),
            )
    }

    #[test]
    fn test_belongs_to_with_column_selects_declared_key() {
        let schema = library();
        let author = AssociationSpec::belongs_to("author", "books", "authors")
            .foreign_key("authorId")
            .build(&schema)
            .unwrap();
        assert_eq!(author.mapping(), &[("authorId".to_string(), "id".to_string())]);
        assert_eq!(author.cardinality(), Cardinality::ToOne);
    }

    #[test]
    fn test_has_many_reverses_mapping() {
        let schema = library();
        let books = AssociationSpec::has_many("books", "authors", "books")
            .foreign_key("editorId")
            .build(&schema)
            .unwrap();
        assert_eq!(books.mapping(), &[("id".to_string(), "editorId".to_string())]);
        assert_eq!(books.cardinality(), Cardinality::ToMany);
    }

    #[test]
    fn test_two_candidates_without_mapping_is_ambiguous() {
        let schema = library();
        let err = AssociationSpec::belongs_to("author", "books", "authors")
            .build(&schema)
            .unwrap_err();
        assert_eq!(
            err.association_kind(),
            Some(AssociationErrorKind::AmbiguousForeignKey)
        );
    }

    #[test]
    fn test_no_candidate_is_ambiguous() {
        let schema = library();
        let err = AssociationSpec::has_many("children", "authors", "persons")
            .build(&schema)
            .unwrap_err();
        assert_eq!(
            err.association_kind(),
            Some(AssociationErrorKind::AmbiguousForeignKey)
        );
    }

    #[test]
    fn test_undeclared_columns_default_to_primary_key() {
        let schema = DatabaseSchema::new()
            .with_table(TableInfo::new("authors", ["id"]).primary_key(["id"]))
            .with_table(TableInfo::new("books", ["id", "writer"]).primary_key(["id"]));
        let author = AssociationSpec::belongs_to("author", "books", "authors")
            .foreign_key("writer")
            .build(&schema)
            .unwrap();
        assert_eq!(author.mapping(), &[("writer".to_string(), "id".to_string())]);
    }

    #[test]
    fn test_explicit_key_checks_columns() {
        let schema = library();
        let err = AssociationSpec::belongs_to("author", "books", "authors")
            .foreign_key(ForeignKey::new(["missing"], ["id"]))
            .build(&schema)
            .unwrap_err();
        assert_eq!(
            err.association_kind(),
            Some(AssociationErrorKind::InvalidAssociation)
        );
    }

    #[test]
    fn test_self_reference_resolves_single_key() {
        let schema = library();
        let parent = AssociationSpec::belongs_to("parent", "persons", "persons")
            .build(&schema)
            .unwrap();
        let children = AssociationSpec::has_many("children", "persons", "persons")
            .build(&schema)
            .unwrap();
        assert_eq!(parent.mapping(), &[("parentId".to_string(), "id".to_string())]);
        assert_eq!(children.mapping(), &[("id".to_string(), "parentId".to_string())]);
    }

    #[test]
    fn test_missing_table_is_schema_error() {
        let err = AssociationSpec::belongs_to("x", "books", "nowhere")
            .build(&library())
            .unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_through_requires_matching_tables() {
        let schema = library();
        let author = AssociationSpec::belongs_to("author", "books", "authors")
            .foreign_key("authorId")
            .build(&schema)
            .unwrap();
        let parent = AssociationSpec::belongs_to("parent", "persons", "persons")
            .build(&schema)
            .unwrap();
        let err = AssociationSpec::has_one_through("x", &author, &parent).unwrap_err();
        assert_eq!(
            err.association_kind(),
            Some(AssociationErrorKind::InvalidAssociation)
        );
    }

    #[test]
    fn test_has_one_through_rejects_to_many_hop() {
        let schema = library();
        let author = AssociationSpec::belongs_to("author", "books", "authors")
            .foreign_key("authorId")
            .build(&schema)
            .unwrap();
        let books = AssociationSpec::has_many("books", "authors", "books")
            .foreign_key("authorId")
            .build(&schema)
            .unwrap();
        assert!(AssociationSpec::has_one_through("x", &author, &books).is_err());
        let siblings = AssociationSpec::has_many_through("siblings", &author, &books).unwrap();
        assert_eq!(siblings.cardinality(), Cardinality::ToMany);
        assert_eq!(siblings.origin().name, "books");
        assert_eq!(siblings.destination().name, "books");
    }

    #[test]
    fn test_has_many_through_rejects_to_one_hops() {
        let parent = AssociationSpec::belongs_to("parent", "persons", "persons")
            .build(&library())
            .unwrap();
        let err = AssociationSpec::has_many_through("grandparents", &parent, &parent).unwrap_err();
        assert_eq!(
            err.association_kind(),
            Some(AssociationErrorKind::InvalidAssociation)
        );
        let grandparent = AssociationSpec::has_one_through("grandparent", &parent, &parent).unwrap();
        assert_eq!(grandparent.kind(), AssociationKind::HasOneThrough);
        assert_eq!(grandparent.cardinality(), Cardinality::ToOne);
    }

    #[test]
    fn test_optional_pivot_under_required_is_unsupported() {
        let schema = library();
        let author = AssociationSpec::belongs_to("author", "books", "authors")
            .foreign_key("authorId")
            .build(&schema)
            .unwrap();
        let books = AssociationSpec::has_many("books", "authors", "books")
            .foreign_key("authorId")
            .build(&schema)
            .unwrap();
        let through = AssociationSpec::has_many_through("siblings", &author.optional(), &books).unwrap();
        let err = through.hops(Requirement::Required).unwrap_err();
        assert_eq!(
            err.association_kind(),
            Some(AssociationErrorKind::UnsupportedChainShape)
        );
        let hops = through.hops(Requirement::Optional).unwrap();
        assert_eq!(hops.len(), 2);
        assert!(hops.iter().all(|h| h.requirement == Requirement::Optional));
    }

    #[test]
    fn test_pivot_order_is_dropped() {
        let schema = library();
        let author = AssociationSpec::belongs_to("author", "books", "authors")
            .foreign_key("authorId")
            .build(&schema)
            .unwrap()
            .order_by(OrderBy::asc("name"));
        let books = AssociationSpec::has_many("books", "authors", "books")
            .foreign_key("authorId")
            .build(&schema)
            .unwrap()
            .order_by(OrderBy::asc("year"));
        let through = AssociationSpec::has_many_through("siblings", &author, &books)
            .unwrap()
            .filter(Expr::col("year").gt(2000));
        let hops = through.hops(Requirement::Required).unwrap();
        assert!(hops[0].order.is_empty());
        assert_eq!(hops[1].order.len(), 1);
        assert_eq!(hops[1].filters.len(), 1);
    }

    #[test]
    fn test_refinements_do_not_leak_into_clones() {
        let schema = library();
        let author = AssociationSpec::belongs_to("author", "books", "authors")
            .foreign_key("authorId")
            .build(&schema)
            .unwrap();
        let filtered = author.filter(Expr::col("name").eq("Herbert"));
        assert!(author.filters().is_empty());
        assert_eq!(filtered.filters().len(), 1);
        let (base, filters, _) = filtered.split_refinements();
        assert_eq!(base, author);
        assert_eq!(filters.len(), 1);
    }
}
