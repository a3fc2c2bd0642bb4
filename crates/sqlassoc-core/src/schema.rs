//! The schema-introspection boundary used to resolve association keys.

use crate::Result;
use serde::{Deserialize, Serialize};

/// A declared foreign key, possibly spanning several columns.
///
/// `columns[i]` on `table` references `foreign_columns[i]` on `foreign_table`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    /// Constraint name, when the database reports one
    pub name: Option<String>,
    /// Table declaring the constraint
    pub table: String,
    /// Referencing columns, in declaration order
    pub columns: Vec<String>,
    /// Referenced table
    pub foreign_table: String,
    /// Referenced columns, paired with `columns`
    pub foreign_columns: Vec<String>,
}

impl ForeignKeyInfo {
    /// Single-column foreign key.
    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        foreign_table: impl Into<String>,
        foreign_column: impl Into<String>,
    ) -> Self {
        Self {
            name: None,
            table: table.into(),
            columns: vec![column.into()],
            foreign_table: foreign_table.into(),
            foreign_columns: vec![foreign_column.into()],
        }
    }

    /// Multi-column foreign key.
    pub fn composite<C, F>(
        table: impl Into<String>,
        columns: C,
        foreign_table: impl Into<String>,
        foreign_columns: F,
    ) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        F: IntoIterator,
        F::Item: Into<String>,
    {
        Self {
            name: None,
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            foreign_table: foreign_table.into(),
            foreign_columns: foreign_columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Set the constraint name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Does this key consist of exactly these referencing columns (in order)?
    pub fn has_columns(&self, columns: &[String]) -> bool {
        self.columns.len() == columns.len()
            && self
                .columns
                .iter()
                .zip(columns)
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

/// Schema metadata needed to build associations.
///
/// Implemented by `sqlassoc_schema::DatabaseSchema`; tests and embedders can
/// supply their own.
pub trait SchemaIntrospector {
    /// Ordered column names of `table`.
    fn columns(&self, table: &str) -> Result<Vec<String>>;

    /// Primary key columns of `table`, in key order. May be empty.
    fn primary_key(&self, table: &str) -> Result<Vec<String>>;

    /// Foreign keys declared on `from` that reference `to`.
    fn foreign_keys(&self, from: &str, to: &str) -> Result<Vec<ForeignKeyInfo>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_columns_is_ordered_and_case_insensitive() {
        let fk = ForeignKeyInfo::composite("a", ["x", "y"], "b", ["id1", "id2"]);
        assert!(fk.has_columns(&["X".to_string(), "y".to_string()]));
        assert!(!fk.has_columns(&["y".to_string(), "x".to_string()]));
        assert!(!fk.has_columns(&["x".to_string()]));
    }
}
