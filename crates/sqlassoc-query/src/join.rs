//! JOIN clauses and join conditions of planned statements.

use crate::alias::{AliasMap, SlotId, TableAlias};
use crate::association::{AssociationAggregate, AssociationSpec};
use crate::expr::{Expr, Resolver, SqlWriter};
use sqlassoc_core::{AssociationError, AssociationErrorKind, Result};

/// Types of SQL joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

impl JoinType {
    /// Get the SQL keyword for this join type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "JOIN",
            JoinType::Left => "LEFT JOIN",
        }
    }
}

/// Resolved names of one statement's table instances.
pub(crate) struct RenderContext<'a> {
    pub(crate) aliases: &'a AliasMap,
    pub(crate) aggregates: &'a [(AssociationSpec, SlotId)],
    /// Slots of EXISTS subqueries not enclosing the text being rendered
    pub(crate) hidden: Vec<SlotId>,
}

/// A [`RenderContext`] positioned on the table an expression is attached to.
pub(crate) struct At<'a> {
    ctx: &'a RenderContext<'a>,
    current: Option<SlotId>,
}

impl<'a> RenderContext<'a> {
    pub(crate) fn name(&self, slot: SlotId) -> &'a str {
        self.aliases.name(slot)
    }

    pub(crate) fn at(&'a self, slot: SlotId) -> At<'a> {
        At {
            ctx: self,
            current: Some(slot),
        }
    }

    /// `"table"` or `"table" AS "alias"`.
    pub(crate) fn table_ref(&self, w: &SqlWriter, table: &str, slot: SlotId) -> String {
        let alias = self.name(slot);
        if alias == table {
            w.quote(table)
        } else {
            format!("{} AS {}", w.quote(table), w.quote(alias))
        }
    }
}

impl Resolver for At<'_> {
    fn current(&self) -> Option<&str> {
        self.current.map(|slot| self.ctx.name(slot))
    }

    fn alias<'b>(&'b self, alias: &'b TableAlias) -> Result<&'b str> {
        let shown = alias.locked_name().unwrap_or("<unnamed>");
        let Some(slot) = self.ctx.aliases.slot_of(alias) else {
            return Err(AssociationError::new(
                AssociationErrorKind::UndefinedAlias,
                format!("undefined alias: {shown}"),
            )
            .into());
        };
        if self.ctx.hidden.contains(&slot) {
            return Err(AssociationError::unsupported(format!(
                "alias {shown} names a required to-many association and is only visible inside its EXISTS subquery"
            ))
            .into());
        }
        Ok(self.ctx.name(slot))
    }

    fn aggregate<'b>(&'b self, aggregate: &'b AssociationAggregate) -> Result<&'b str> {
        self.ctx
            .aggregates
            .iter()
            .find(|(spec, _)| spec == aggregate.association())
            .map(|(_, slot)| self.ctx.name(*slot))
            .ok_or_else(|| {
                AssociationError::unsupported(format!(
                    "aggregate over `{}` is only supported on the base request",
                    aggregate.association().name()
                ))
                .into()
            })
    }
}

/// One term of an ON or WHERE conjunction.
#[derive(Debug, Clone)]
pub(crate) enum Condition {
    /// `left.a = right.b` for each `(a, b)` pair
    Keys {
        left: SlotId,
        right: SlotId,
        columns: Vec<(String, String)>,
    },
    /// A caller expression; unqualified columns resolve to `current`
    Expr { expr: Expr, current: SlotId },
    /// `EXISTS (...)`
    Exists(Box<SubQuery>),
}

impl Condition {
    pub(crate) fn expr(expr: &Expr, current: SlotId) -> Self {
        Condition::Expr {
            expr: expr.clone(),
            current,
        }
    }

    pub(crate) fn render(&self, w: &mut SqlWriter, ctx: &RenderContext<'_>) -> Result<String> {
        Ok(match self {
            Condition::Keys {
                left,
                right,
                columns,
            } => columns
                .iter()
                .map(|(l, r)| {
                    format!(
                        "{} = {}",
                        w.column(ctx.name(*left), l),
                        w.column(ctx.name(*right), r)
                    )
                })
                .collect::<Vec<_>>()
                .join(" AND "),
            Condition::Expr { expr, current } => expr.render_conjunct(w, &ctx.at(*current))?,
            Condition::Exists(sub) => format!("EXISTS ({})", sub.render(w, ctx)?),
        })
    }
}

/// Render conditions joined with AND.
pub(crate) fn render_all(
    conditions: &[Condition],
    w: &mut SqlWriter,
    ctx: &RenderContext<'_>,
) -> Result<String> {
    let parts = conditions
        .iter()
        .map(|c| c.render(w, ctx))
        .collect::<Result<Vec<_>>>()?;
    Ok(parts.join(" AND "))
}

/// A JOIN clause.
#[derive(Debug, Clone)]
pub(crate) struct Join {
    pub(crate) kind: JoinType,
    pub(crate) slot: SlotId,
    pub(crate) table: String,
    pub(crate) on: Vec<Condition>,
}

impl Join {
    pub(crate) fn render(&self, w: &mut SqlWriter, ctx: &RenderContext<'_>) -> Result<String> {
        let table = ctx.table_ref(w, &self.table, self.slot);
        let on = render_all(&self.on, w, ctx)?;
        Ok(format!("{} {table} ON {on}", self.kind.as_str()))
    }
}

/// A correlated existence subquery.
#[derive(Debug, Clone)]
pub(crate) struct SubQuery {
    pub(crate) slot: SlotId,
    /// Table instances owned by this subquery, nested subqueries excluded
    pub(crate) slots: Vec<SlotId>,
    pub(crate) table: String,
    pub(crate) joins: Vec<Join>,
    pub(crate) conditions: Vec<Condition>,
}

impl SubQuery {
    fn render(&self, w: &mut SqlWriter, outer: &RenderContext<'_>) -> Result<String> {
        let ctx = &RenderContext {
            aliases: outer.aliases,
            aggregates: outer.aggregates,
            hidden: outer
                .hidden
                .iter()
                .copied()
                .filter(|slot| !self.slots.contains(slot))
                .collect(),
        };
        let mut sql = format!("SELECT 1 FROM {}", ctx.table_ref(w, &self.table, self.slot));
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.render(w, ctx)?);
        }
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&render_all(&self.conditions, w, ctx)?);
        }
        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::{AliasAllocator, AliasNumbering};
    use crate::expr::Dialect;

    fn context() -> (AliasMap, SlotId, SlotId) {
        let mut allocator = AliasAllocator::new(AliasNumbering::KeepFirst);
        let root = allocator.add_slot("persons");
        let child = allocator.add_slot("persons");
        (allocator.allocate().unwrap(), root, child)
    }

    #[test]
    fn test_join_renders_alias_only_when_needed() {
        let (aliases, root, child) = context();
        let ctx = RenderContext {
            aliases: &aliases,
            aggregates: &[],
            hidden: Vec::new(),
        };
        let join = Join {
            kind: JoinType::Left,
            slot: child,
            table: "persons".to_string(),
            on: vec![
                Condition::Keys {
                    left: child,
                    right: root,
                    columns: vec![("id".to_string(), "parentId".to_string())],
                },
                Condition::expr(&Expr::col("name").eq("Ann"), child),
            ],
        };
        let mut w = SqlWriter::new(Dialect::Sqlite);
        assert_eq!(
            join.render(&mut w, &ctx).unwrap(),
            "LEFT JOIN \"persons\" AS \"persons1\" ON \"persons1\".\"id\" = \"persons\".\"parentId\" AND \"persons1\".\"name\" = ?1"
        );
        assert_eq!(ctx.table_ref(&w, "persons", root), "\"persons\"");
    }

    #[test]
    fn test_unattached_alias_is_undefined() {
        let (aliases, root, _) = context();
        let ctx = RenderContext {
            aliases: &aliases,
            aggregates: &[],
            hidden: Vec::new(),
        };
        let stray = TableAlias::named("elsewhere");
        let cond = Condition::expr(&stray.col("id").eq(1), root);
        let mut w = SqlWriter::new(Dialect::Postgres);
        let err = cond.render(&mut w, &ctx).unwrap_err();
        assert_eq!(
            err.association_kind(),
            Some(AssociationErrorKind::UndefinedAlias)
        );
        assert_eq!(err.to_string(), "undefined alias: elsewhere");
    }
}
