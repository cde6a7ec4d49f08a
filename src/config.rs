//! Service configuration.
//!
//! Loading the file or environment is the host's job; this module only
//! describes the shape and parses TOML text.
//!
//! ```toml
//! dialect = "postgres"
//! service_root = "/odata"
//! expand_strategy = "auto"
//! statement_timeout_ms = 5000
//!
//! [parser]
//! max_top = 500
//! strict = false
//! ```

use odataql_core::ParserConfig;
use serde::Deserialize;

use crate::error::DbResult;
use crate::sql::DialectKind;

/// How navigation properties are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpandStrategy {
    /// LEFT JOIN for simple to-one navigations, batching for everything else
    #[default]
    Auto,
    /// Same eligibility as `Auto`; ineligible items still fall back to batching
    Join,
    /// Always issue one extra query per navigation
    Batch,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub dialect: DialectKind,
    /// Prefix stripped from batch operation URLs (default: `/`)
    pub service_root: String,
    pub expand_strategy: ExpandStrategy,
    /// Per-request statement budget in milliseconds
    pub statement_timeout_ms: Option<u64>,
    pub parser: ParserConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            dialect: DialectKind::Sqlite,
            service_root: "/".to_string(),
            expand_strategy: ExpandStrategy::Auto,
            statement_timeout_ms: None,
            parser: ParserConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn from_toml_str(text: &str) -> DbResult<Self> {
        Ok(toml::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::from_toml_str("").unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.parser.default_top, 100);
    }

    #[test]
    fn test_full_config() {
        let config = ServiceConfig::from_toml_str(
            r#"
            dialect = "mssql"
            service_root = "/odata"
            expand_strategy = "batch"
            statement_timeout_ms = 2500

            [parser]
            max_top = 500
            strict = false
            "#,
        )
        .unwrap();
        assert_eq!(config.dialect, DialectKind::SqlServer);
        assert_eq!(config.expand_strategy, ExpandStrategy::Batch);
        assert_eq!(config.statement_timeout_ms, Some(2500));
        assert_eq!(config.parser.max_top, 500);
        assert!(!config.parser.strict);
        assert_eq!(config.parser.default_top, 100);
    }

    #[test]
    fn test_dialect_aliases() {
        let config = ServiceConfig::from_toml_str("dialect = \"postgresql\"").unwrap();
        assert_eq!(config.dialect, DialectKind::Postgres);
        assert!(ServiceConfig::from_toml_str("dialect = \"oracle\"").is_err());
    }
}
