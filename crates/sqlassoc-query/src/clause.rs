//! ORDER BY terms.

use crate::alias::TableAlias;
use crate::expr::{Dialect, Expr, Resolver, SqlWriter};
use sqlassoc_core::Result;

/// One ORDER BY term.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: Expr,
    pub direction: OrderDirection,
    pub nulls: Option<NullsOrder>,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

/// NULLS FIRST/LAST ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

impl OrderBy {
    /// Create an order term.
    pub fn new(expr: Expr, direction: OrderDirection) -> Self {
        Self {
            expr,
            direction,
            nulls: None,
        }
    }

    /// Create an ascending order on an unqualified column.
    pub fn asc(column: impl Into<String>) -> Self {
        Self::new(Expr::col(column), OrderDirection::Asc)
    }

    /// Create a descending order on an unqualified column.
    pub fn desc(column: impl Into<String>) -> Self {
        Self::new(Expr::col(column), OrderDirection::Desc)
    }

    /// Set NULLS FIRST.
    pub fn nulls_first(mut self) -> Self {
        self.nulls = Some(NullsOrder::First);
        self
    }

    /// Set NULLS LAST.
    pub fn nulls_last(mut self) -> Self {
        self.nulls = Some(NullsOrder::Last);
        self
    }

    /// Rewrite unqualified columns to reference `alias`.
    pub fn rerooted(&self, alias: &TableAlias) -> OrderBy {
        OrderBy {
            expr: self.expr.rerooted(alias),
            direction: self.direction,
            nulls: self.nulls,
        }
    }

    pub(crate) fn render(&self, w: &mut SqlWriter, r: &dyn Resolver) -> Result<String> {
        let expr_sql = self.expr.render(w, r)?;
        let dir = match self.direction {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        };
        Ok(match (self.nulls, w.dialect) {
            (None, _) => format!("{expr_sql} {dir}"),
            // MySQL has no NULLS FIRST/LAST; sort on the null test first.
            (Some(nulls), Dialect::Mysql) => {
                let null_dir = match nulls {
                    NullsOrder::First => "DESC",
                    NullsOrder::Last => "ASC",
                };
                format!("{expr_sql} IS NULL {null_dir}, {expr_sql} {dir}")
            }
            (Some(NullsOrder::First), _) => format!("{expr_sql} {dir} NULLS FIRST"),
            (Some(NullsOrder::Last), _) => format!("{expr_sql} {dir} NULLS LAST"),
        })
    }
}
