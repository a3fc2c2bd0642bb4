//! Compiler configuration.

use crate::alias::AliasNumbering;
use crate::expr::Dialect;
use serde::{Deserialize, Serialize};
use sqlassoc_core::{ConfigError, Error, Result};

/// Options that change the SQL a [`QueryCompiler`](crate::QueryCompiler) emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// SQL dialect for placeholders and identifier quoting
    pub dialect: Dialect,
    /// Naming policy for repeated, unaliased tables
    pub alias_numbering: AliasNumbering,
    /// Column-name prefix of the hidden pairing-key columns in prefetch statements
    pub pairing_prefix: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            alias_numbering: AliasNumbering::default(),
            pairing_prefix: "__sqlassoc_key".to_string(),
        }
    }
}

impl CompilerConfig {
    /// Default configuration for a dialect.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }

    /// Set the SQL dialect.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Set the alias numbering policy.
    pub fn alias_numbering(mut self, numbering: AliasNumbering) -> Self {
        self.alias_numbering = numbering;
        self
    }

    /// Set the pairing-key column prefix.
    pub fn pairing_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.pairing_prefix = prefix.into();
        self
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            Error::Config(ConfigError {
                message: format!("invalid compiler configuration: {e}"),
                source: Some(Box::new(e)),
            })
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration can produce valid SQL.
    pub fn validate(&self) -> Result<()> {
        let valid = !self.pairing_prefix.is_empty()
            && self
                .pairing_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if valid {
            Ok(())
        } else {
            Err(Error::Config(ConfigError {
                message: format!(
                    "pairing prefix must be a non-empty identifier, got {:?}",
                    self.pairing_prefix
                ),
                source: None,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = CompilerConfig::new(Dialect::Sqlite)
            .alias_numbering(AliasNumbering::NumberAll)
            .pairing_prefix("__k");
        assert_eq!(config.dialect, Dialect::Sqlite);
        assert_eq!(config.alias_numbering, AliasNumbering::NumberAll);
        assert_eq!(config.pairing_prefix, "__k");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = CompilerConfig::from_json(r#"{"dialect":"Mysql"}"#).unwrap();
        assert_eq!(config.dialect, Dialect::Mysql);
        assert_eq!(config.alias_numbering, AliasNumbering::KeepFirst);
        assert_eq!(config.pairing_prefix, "__sqlassoc_key");
    }

    #[test]
    fn test_invalid_prefix_is_config_error() {
        let err = CompilerConfig::from_json(r#"{"pairing_prefix":"a b"}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let err = CompilerConfig::from_json("{not json").unwrap_err();
        assert!(err.to_string().starts_with("Configuration error: invalid compiler configuration"));
    }
}
