//! Core types and traits for sqlassoc.
//!
//! This crate provides the foundational pieces shared by the compiler and
//! the schema loader:
//!
//! - `Value` and `Row` for bound parameters and fetched results
//! - the `Error` taxonomy and `Result` alias
//! - the `Connection` trait at the statement-execution boundary
//! - the `SchemaIntrospector` trait used to resolve foreign keys
//! - `Outcome` and `Cx` re-exported from asupersync

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod connection;
pub mod error;
pub mod identifiers;
pub mod row;
pub mod schema;
pub mod value;

pub use connection::Connection;
pub use error::{
    AssociationError, AssociationErrorKind, ConfigError, ConnectionError, ConnectionErrorKind,
    Error, QueryError, QueryErrorKind, Result, SchemaError, SchemaErrorKind, TypeError,
};
pub use identifiers::{quote_ident, quote_ident_mysql, sanitize_identifier};
pub use row::{ColumnInfo, FromValue, Row};
pub use schema::{ForeignKeyInfo, SchemaIntrospector};
pub use value::{Value, ValueKey};
