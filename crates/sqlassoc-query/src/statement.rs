//! Planned SELECT statements and their rendering.

use crate::alias::{AliasMap, SlotId};
use crate::association::AssociationSpec;
use crate::clause::OrderBy;
use crate::expr::{Dialect, Expr, SqlWriter};
use crate::join::{Condition, Join, RenderContext, render_all};
use sqlassoc_core::{Result, Value};

/// One item of the SELECT list.
#[derive(Debug, Clone)]
pub(crate) enum SelectItem {
    /// `"alias".*`
    Star(SlotId),
    /// `expr AS "name"`
    Expr {
        expr: Expr,
        current: SlotId,
        name: String,
    },
    /// `"alias"."column" AS "name"`
    Column {
        slot: SlotId,
        column: String,
        name: String,
    },
}

/// `key IN (...)` over parent keys known only at execution time.
#[derive(Debug, Clone)]
pub(crate) struct KeyFilter {
    pub(crate) slot: SlotId,
    pub(crate) columns: Vec<String>,
}

impl KeyFilter {
    fn render(&self, w: &mut SqlWriter, ctx: &RenderContext<'_>, keys: &[Vec<Value>]) -> String {
        if keys.is_empty() {
            return "1 = 0".to_string();
        }
        let alias = ctx.name(self.slot);
        let columns: Vec<String> = self.columns.iter().map(|c| w.column(alias, c)).collect();
        let tuples: Vec<String> = keys
            .iter()
            .map(|key| {
                let placeholders: Vec<String> = key.iter().map(|v| w.bind(v.clone())).collect();
                if placeholders.len() == 1 {
                    placeholders.join("")
                } else {
                    format!("({})", placeholders.join(", "))
                }
            })
            .collect();
        if columns.len() == 1 {
            format!("{} IN ({})", columns.join(""), tuples.join(", "))
        } else {
            format!("({}) IN ({})", columns.join(", "), tuples.join(", "))
        }
    }
}

/// A fully planned statement with allocated aliases.
#[derive(Debug, Clone)]
pub(crate) struct Statement {
    pub(crate) aliases: AliasMap,
    pub(crate) aggregates: Vec<(AssociationSpec, SlotId)>,
    /// Slots only visible inside EXISTS subqueries
    pub(crate) hidden: Vec<SlotId>,
    pub(crate) distinct: bool,
    pub(crate) select: Vec<SelectItem>,
    pub(crate) table: String,
    pub(crate) root: SlotId,
    pub(crate) joins: Vec<Join>,
    pub(crate) key_filter: Option<KeyFilter>,
    pub(crate) filters: Vec<Condition>,
    pub(crate) group_by: Vec<String>,
    pub(crate) having: Vec<Condition>,
    pub(crate) order: Vec<(OrderBy, SlotId)>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
}

impl Statement {
    /// Render SQL text and parameters. Parameters are numbered in text order.
    pub(crate) fn render(&self, dialect: Dialect, keys: &[Vec<Value>]) -> Result<(String, Vec<Value>)> {
        let mut w = SqlWriter::new(dialect);
        let ctx = RenderContext {
            aliases: &self.aliases,
            aggregates: &self.aggregates,
            hidden: self.hidden.clone(),
        };

        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        let mut columns = Vec::with_capacity(self.select.len());
        for item in &self.select {
            columns.push(match item {
                SelectItem::Star(slot) => format!("{}.*", w.quote(ctx.name(*slot))),
                SelectItem::Expr {
                    expr,
                    current,
                    name,
                } => {
                    let expr_sql = expr.render(&mut w, &ctx.at(*current))?;
                    format!("{expr_sql} AS {}", w.quote(name))
                }
                SelectItem::Column { slot, column, name } => {
                    format!("{} AS {}", w.column(ctx.name(*slot), column), w.quote(name))
                }
            });
        }
        sql.push_str(&columns.join(", "));

        sql.push_str(" FROM ");
        sql.push_str(&ctx.table_ref(&w, &self.table, self.root));
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.render(&mut w, &ctx)?);
        }

        let mut terms = Vec::new();
        if let Some(key_filter) = &self.key_filter {
            terms.push(key_filter.render(&mut w, &ctx, keys));
        }
        if !self.filters.is_empty() {
            terms.push(render_all(&self.filters, &mut w, &ctx)?);
        }
        if !terms.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&terms.join(" AND "));
        }

        if !self.group_by.is_empty() {
            let root = ctx.name(self.root);
            let columns: Vec<String> = self.group_by.iter().map(|c| w.column(root, c)).collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&columns.join(", "));
        }

        if !self.having.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&render_all(&self.having, &mut w, &ctx)?);
        }

        if !self.order.is_empty() {
            let terms = self
                .order
                .iter()
                .map(|(order, slot)| order.render(&mut w, &ctx.at(*slot)))
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => match dialect {
                Dialect::Postgres => sql.push_str(&format!(" OFFSET {offset}")),
                // OFFSET requires LIMIT
                Dialect::Sqlite => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
                Dialect::Mysql => {
                    sql.push_str(&format!(" LIMIT {} OFFSET {offset}", u64::MAX));
                }
            },
            (None, None) => {}
        }

        Ok((sql, w.params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::{AliasAllocator, AliasNumbering};

    fn statement() -> Statement {
        let mut allocator = AliasAllocator::new(AliasNumbering::KeepFirst);
        let root = allocator.add_slot("books");
        Statement {
            aliases: allocator.allocate().unwrap(),
            aggregates: Vec::new(),
            hidden: Vec::new(),
            distinct: false,
            select: vec![
                SelectItem::Star(root),
                SelectItem::Column {
                    slot: root,
                    column: "authorId".to_string(),
                    name: "__k_0".to_string(),
                },
            ],
            table: "books".to_string(),
            root,
            joins: Vec::new(),
            key_filter: Some(KeyFilter {
                slot: root,
                columns: vec!["authorId".to_string()],
            }),
            filters: vec![Condition::expr(&Expr::col("year").gt(2000), root)],
            group_by: Vec::new(),
            having: Vec::new(),
            order: vec![(OrderBy::asc("title"), root)],
            limit: None,
            offset: None,
        }
    }

    #[test]
    fn test_key_filter_binds_before_filters() {
        let keys = vec![vec![Value::Int(1)], vec![Value::Int(2)]];
        let (sql, params) = statement().render(Dialect::Postgres, &keys).unwrap();
        assert_eq!(
            sql,
            "SELECT \"books\".*, \"books\".\"authorId\" AS \"__k_0\" FROM \"books\" WHERE \"books\".\"authorId\" IN ($1, $2) AND \"books\".\"year\" > $3 ORDER BY \"books\".\"title\" ASC"
        );
        assert_eq!(params, vec![Value::Int(1), Value::Int(2), Value::Int(2000)]);
    }

    #[test]
    fn test_composite_key_filter_uses_row_values() {
        let mut stmt = statement();
        stmt.key_filter = Some(KeyFilter {
            slot: stmt.root,
            columns: vec!["a".to_string(), "b".to_string()],
        });
        stmt.filters.clear();
        stmt.order.clear();
        let keys = vec![vec![Value::Int(1), Value::Int(2)]];
        let (sql, _) = stmt.render(Dialect::Sqlite, &keys).unwrap();
        assert!(sql.ends_with("WHERE (\"books\".\"a\", \"books\".\"b\") IN ((?1, ?2))"));
    }

    #[test]
    fn test_empty_keys_match_nothing() {
        let (sql, params) = statement().render(Dialect::Postgres, &[]).unwrap();
        assert!(sql.contains("WHERE 1 = 0 AND"));
        assert_eq!(params, vec![Value::Int(2000)]);
    }

    #[test]
    fn test_offset_without_limit() {
        let mut stmt = statement();
        stmt.key_filter = None;
        stmt.offset = Some(5);
        let (sql, _) = stmt.render(Dialect::Sqlite, &[]).unwrap();
        assert!(sql.ends_with(" LIMIT -1 OFFSET 5"));
        let (sql, _) = stmt.render(Dialect::Postgres, &[]).unwrap();
        assert!(sql.ends_with(" ASC OFFSET 5"));
    }
}
