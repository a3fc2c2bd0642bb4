//! Association chain compiler for sqlassoc.
//!
//! `sqlassoc-query` is the **compilation layer**. It turns a declarative graph
//! of table relationships into SQL statements plus the column layouts needed
//! to slice their result rows back into nested scopes.
//!
//! # Role In The Architecture
//!
//! - **Associations**: `AssociationSpec` describes belongs-to, has-one,
//!   has-many and their through variants, with keys resolved from a schema.
//! - **Chains**: `Request` and `ChainNode` attach associations with
//!   `including`/`joining` and `required`/`optional` semantics.
//! - **Compilation**: `QueryCompiler` allocates aliases, plans joins and
//!   prefetch statements, and renders SQL for Postgres, MySQL, and SQLite.
//! - **Decoding**: `RowScopeTree` exposes each row as named scopes, and
//!   `fetch_all` runs a compiled query through the `Connection` trait from
//!   `sqlassoc-core`, pairing prefetched rows onto their parents.
//!
//! Most users access these types via the `sqlassoc` facade crate.

pub mod alias;
pub mod association;
pub mod chain;
pub mod clause;
pub mod compiler;
pub mod config;
pub mod decoder;
pub mod expr;
pub mod fetch;
pub mod join;
pub mod layout;
mod statement;

pub use alias::{AliasAllocator, AliasMap, AliasNumbering, SlotId, TableAlias};
pub use association::{
    AggregateFunction, AssociationAggregate, AssociationBuilder, AssociationKind, AssociationSpec,
    Cardinality, ForeignKey, TableMeta,
};
pub use chain::{ChainNode, InclusionKind, Request, Requirement};
pub use clause::{NullsOrder, OrderBy, OrderDirection};
pub use compiler::{CompiledQuery, CompiledStatement, PrefetchPlan, QueryCompiler};
pub use config::CompilerConfig;
pub use decoder::{DecodedRow, RowScopeTree, ScopedRow};
pub use expr::{BinaryOp, Dialect, Expr, TableRef, UnaryOp};
pub use fetch::{Fetched, fetch_all};
pub use join::JoinType;
pub use layout::{ColumnLayout, ScopeLayout};
