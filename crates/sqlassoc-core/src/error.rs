//! Error types for association compilation and execution.

use std::fmt;

/// The primary error type for all sqlassoc operations.
#[derive(Debug)]
pub enum Error {
    /// Association graph errors (alias conflicts, key resolution, chain shape)
    Association(AssociationError),
    /// Connection-related errors reported by the executor
    Connection(ConnectionError),
    /// Query execution errors reported by the executor
    Query(QueryError),
    /// Type conversion errors while decoding rows
    Type(TypeError),
    /// Schema introspection errors
    Schema(SchemaError),
    /// Configuration errors
    Config(ConfigError),
    /// Operation was cancelled via asupersync
    Cancelled,
    /// Custom error with message
    Custom(String),
}

/// An error raised while building or compiling an association chain.
///
/// These are programmer errors detected before any SQL executes. The
/// `message` is stable and suitable for assertions, e.g. `ambiguous alias: A`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationError {
    pub kind: AssociationErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationErrorKind {
    /// Two table instances resolve to the same locked alias
    AliasConflict,
    /// Zero or several foreign keys match and no explicit mapping was given
    AmbiguousForeignKey,
    /// The chain has a shape the compiler refuses to guess about
    UnsupportedChainShape,
    /// An expression references an alias that is not part of the statement
    UndefinedAlias,
    /// The association definition itself is inconsistent
    InvalidAssociation,
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish connection
    Connect,
    /// Connection lost during operation
    Disconnected,
    /// Connection pool exhausted
    PoolExhausted,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub sqlstate: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Deadlock detected
    Deadlock,
    /// Serialization failure (retry may succeed)
    Serialization,
    /// Statement timeout
    Timeout,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// Table not found
    TableNotFound,
    /// Column not found
    ColumnNotFound,
    /// Introspection query returned something unexpected
    Invalid,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AssociationError {
    /// Create a new association error.
    pub fn new(kind: AssociationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// `ambiguous alias: <NAME>`
    pub fn alias_conflict(name: &str) -> Self {
        Self::new(
            AssociationErrorKind::AliasConflict,
            format!("ambiguous alias: {name}"),
        )
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(AssociationErrorKind::UnsupportedChainShape, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(AssociationErrorKind::InvalidAssociation, message)
    }
}

impl Error {
    /// Is this a retryable error (deadlock, serialization, pool exhausted, timeouts)?
    ///
    /// Association errors never are: they describe the request, not the database.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Query(q) => matches!(
                q.kind,
                QueryErrorKind::Deadlock | QueryErrorKind::Serialization | QueryErrorKind::Timeout
            ),
            Error::Connection(c) => matches!(c.kind, ConnectionErrorKind::PoolExhausted),
            _ => false,
        }
    }

    /// The association error kind, if this is an association error.
    pub fn association_kind(&self) -> Option<AssociationErrorKind> {
        match self {
            Error::Association(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Association(e) => write!(f, "{}", e),
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => {
                if let Some(sqlstate) = &e.sqlstate {
                    write!(f, "Query error (SQLSTATE {}): {}", sqlstate, e.message)
                } else {
                    write!(f, "Query error: {}", e.message)
                }
            }
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Schema(e) => write!(f, "Schema error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Cancelled => write!(f, "Operation cancelled"),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Association(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for AssociationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AssociationError {}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl From<AssociationError> for Error {
    fn from(err: AssociationError) -> Self {
        Error::Association(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        Error::Schema(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Result type alias for sqlassoc operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_conflict_message_is_stable() {
        let err = Error::from(AssociationError::alias_conflict("A"));
        assert_eq!(err.to_string(), "ambiguous alias: A");
        assert_eq!(
            err.association_kind(),
            Some(AssociationErrorKind::AliasConflict)
        );
    }

    #[test]
    fn association_errors_are_not_retryable() {
        let err = Error::from(AssociationError::unsupported("optional middle"));
        assert!(!err.is_retryable());

        let deadlock = Error::Query(QueryError {
            kind: QueryErrorKind::Deadlock,
            sql: Some("SELECT 1".to_string()),
            sqlstate: None,
            message: "deadlock detected".to_string(),
            source: None,
        });
        assert!(deadlock.is_retryable());
        assert_eq!(deadlock.sql(), Some("SELECT 1"));
    }

    #[test]
    fn query_errors_pass_through_display() {
        let err = Error::Query(QueryError {
            kind: QueryErrorKind::Syntax,
            sql: None,
            sqlstate: Some("42601".to_string()),
            message: "syntax error at or near \"FORM\"".to_string(),
            source: None,
        });
        assert_eq!(
            err.to_string(),
            "Query error (SQLSTATE 42601): syntax error at or near \"FORM\""
        );
        assert_eq!(err.association_kind(), None);
    }
}
