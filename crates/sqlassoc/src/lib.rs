//! sqlassoc - compile association graphs into SQL.
//!
//! sqlassoc takes a declarative graph of table relationships and turns it
//! into executable SQL statements, plus the layouts needed to read the flat
//! result rows back as a tree of named scopes:
//!
//! - Associations: belongs-to, has-one, has-many and their through variants
//! - `including` (fetch and expose a scope) and `joining` (filter only)
//! - `required` (inner join) and `optional` (left join) semantics
//! - Deterministic alias allocation, self-joins included
//! - Separate prefetch statements for to-many includes, paired by key
//!
//! # Quick Start
//!
//! ```ignore
//! use sqlassoc::prelude::*;
//!
//! async fn books_with_authors(cx: &Cx, conn: &impl Connection, schema: &DatabaseSchema) {
//!     let author = AssociationSpec::belongs_to("author", "books", "authors")
//!         .foreign_key("authorId")
//!         .build(schema)
//!         .unwrap();
//!
//!     let query = Request::introspect(schema, "books")
//!         .unwrap()
//!         .including_optional(author)
//!         .order_by(OrderBy::asc("title"))
//!         .compile()
//!         .unwrap();
//!
//!     let Outcome::Ok(fetched) = fetch_all(cx, conn, &query).await else {
//!         return;
//!     };
//!     for row in &fetched.rows {
//!         let title: String = row.get_named("title").unwrap();
//!         match row.scoped("author") {
//!             Some(author) => println!("{title} by {}", author.get_named::<String>("name").unwrap()),
//!             None => println!("{title} (anonymous)"),
//!         }
//!     }
//! }
//! ```
//!
//! # Features
//!
//! - **Pure compilation**: the same request always compiles to the same SQL
//! - **Structured concurrency**: statements run through asupersync's `Cx`
//! - **Dialects**: Postgres, SQLite and MySQL placeholders and quoting

// Re-export all public types from sub-crates
pub use sqlassoc_core::{
    AssociationError, AssociationErrorKind, ColumnInfo, ConfigError, Connection, ConnectionError,
    ConnectionErrorKind, Cx, Error, ForeignKeyInfo, FromValue, Outcome, QueryError,
    QueryErrorKind, Result, Row, SchemaError, SchemaErrorKind, SchemaIntrospector, TypeError,
    Value, ValueKey,
};

pub use sqlassoc_query::{
    AggregateFunction, AliasNumbering, AssociationAggregate, AssociationBuilder, AssociationKind,
    AssociationSpec, Cardinality, ChainNode, ColumnLayout, CompiledQuery, CompiledStatement,
    CompilerConfig, DecodedRow, Dialect, Expr, Fetched, ForeignKey, InclusionKind, JoinType,
    NullsOrder, OrderBy, OrderDirection, PrefetchPlan, QueryCompiler, Request, Requirement,
    RowScopeTree, ScopeLayout, ScopedRow, TableAlias, TableMeta, fetch_all,
};

pub use sqlassoc_schema::{
    DatabaseSchema, Dialect as SchemaDialect, Introspector, TableColumn, TableInfo,
};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use sqlassoc::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        AssociationSpec,
        ChainNode,
        // Compilation
        CompiledQuery,
        CompilerConfig,
        // Core traits and types
        Connection,
        Cx,
        DatabaseSchema,
        DecodedRow,
        Dialect,
        Error,
        // Expressions
        Expr,
        ForeignKey,
        OrderBy,
        Outcome,
        QueryCompiler,
        Request,
        Result,
        Row,
        TableAlias,
        TableInfo,
        TableMeta,
        Value,
        fetch_all,
    };
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_compiles_a_request() {
        let schema = DatabaseSchema::new()
            .with_table(TableInfo::new("authors", ["id", "name"]).primary_key(["id"]))
            .with_table(
                TableInfo::new("books", ["id", "authorId"])
                    .primary_key(["id"])
                    .foreign_key("authorId", "authors", "id"),
            );
        let author = AssociationSpec::belongs_to("author", "books", "authors")
            .build(&schema)
            .unwrap();
        let query = Request::origin_of(&author)
            .including_required(author)
            .compile()
            .unwrap();
        assert_eq!(
            query.sql(),
            "SELECT \"books\".*, \"authors\".* FROM \"books\" JOIN \"authors\" ON \"authors\".\"id\" = \"books\".\"authorId\""
        );
    }
}
