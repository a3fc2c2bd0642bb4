//! Schema metadata for sqlassoc.
//!
//! This crate provides:
//! - [`DatabaseSchema`], an in-memory catalogue of tables that implements
//!   [`SchemaIntrospector`] so associations can resolve their keys
//! - [`Introspector`], which loads a `DatabaseSchema` from a live connection

pub mod introspect;

pub use introspect::{Dialect, Introspector};

use serde::{Deserialize, Serialize};
use sqlassoc_core::{
    Error, ForeignKeyInfo, Result, SchemaError, SchemaErrorKind, SchemaIntrospector,
};
use std::collections::BTreeMap;

/// Complete representation of a database schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseSchema {
    /// All tables in the schema, keyed by table name
    pub tables: BTreeMap<String, TableInfo>,
}

/// Information about a database table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Table name
    pub name: String,
    /// Columns in declaration order
    pub columns: Vec<TableColumn>,
    /// Primary key column names
    pub primary_key: Vec<String>,
    /// Foreign key constraints declared on this table
    pub foreign_keys: Vec<ForeignKeyInfo>,
}

/// Information about a table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableColumn {
    /// Column name
    pub name: String,
    /// SQL type as raw string
    pub sql_type: String,
    /// Whether the column is nullable
    pub nullable: bool,
}

impl TableInfo {
    /// Start a table declaration with untyped, nullable columns.
    pub fn new<I>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns
                .into_iter()
                .map(|c| TableColumn {
                    name: c.into(),
                    sql_type: String::new(),
                    nullable: true,
                })
                .collect(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Set the primary key.
    pub fn primary_key<I>(mut self, columns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        for column in &mut self.columns {
            if self.primary_key.contains(&column.name) {
                column.nullable = false;
            }
        }
        self
    }

    /// Declare a single-column foreign key on this table.
    pub fn foreign_key(
        mut self,
        column: impl Into<String>,
        foreign_table: impl Into<String>,
        foreign_column: impl Into<String>,
    ) -> Self {
        let fk = ForeignKeyInfo::new(self.name.clone(), column, foreign_table, foreign_column);
        self.foreign_keys.push(fk);
        self
    }

    /// Declare a multi-column foreign key on this table.
    pub fn composite_foreign_key<C, F>(
        mut self,
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
        let fk = ForeignKeyInfo::composite(
            self.name.clone(),
            columns,
            foreign_table,
            foreign_columns,
        );
        self.foreign_keys.push(fk);
        self
    }

    /// Get a column by name.
    pub fn column(&self, name: &str) -> Option<&TableColumn> {
        self.columns.iter().find(|c| c.name == name)
    }
}

impl DatabaseSchema {
    /// Create a new empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table, replacing any table with the same name.
    pub fn add_table(&mut self, table: TableInfo) {
        self.tables.insert(table.name.clone(), table);
    }

    /// Builder form of [`add_table`](Self::add_table).
    pub fn with_table(mut self, table: TableInfo) -> Self {
        self.add_table(table);
        self
    }

    /// Get a table by name, falling back to a case-insensitive match.
    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.get(name).or_else(|| {
            self.tables
                .values()
                .find(|t| t.name.eq_ignore_ascii_case(name))
        })
    }

    /// Get all table names, sorted.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    fn require(&self, name: &str) -> Result<&TableInfo> {
        self.table(name).ok_or_else(|| {
            Error::Schema(SchemaError {
                kind: SchemaErrorKind::TableNotFound,
                message: format!("table not found: {name}"),
            })
        })
    }
}

impl SchemaIntrospector for DatabaseSchema {
    fn columns(&self, table: &str) -> Result<Vec<String>> {
        Ok(self
            .require(table)?
            .columns
            .iter()
            .map(|c| c.name.clone())
            .collect())
    }

    fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        Ok(self.require(table)?.primary_key.clone())
    }

    fn foreign_keys(&self, from: &str, to: &str) -> Result<Vec<ForeignKeyInfo>> {
        let origin = self.require(from)?;
        let mut fks: Vec<ForeignKeyInfo> = origin
            .foreign_keys
            .iter()
            .filter(|fk| fk.foreign_table.eq_ignore_ascii_case(to))
            .cloned()
            .collect();

        // Unspecified referenced columns mean the referenced primary key.
        if fks
            .iter()
            .any(|fk| fk.foreign_columns.iter().any(String::is_empty))
        {
            let pk = &self.require(to)?.primary_key;
            for fk in &mut fks {
                if fk.foreign_columns.iter().all(String::is_empty) && pk.len() == fk.columns.len() {
                    fk.foreign_columns.clone_from(pk);
                }
            }
        }

        Ok(fks)
    }
}
