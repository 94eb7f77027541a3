//! Configuration for event stores.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strata_sql::{Dialect, DialectKind, SqlResult, TableId};

/// Configuration for an event store and the repositories over it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Name of the event log table.
    #[serde(default = "default_events_table")]
    pub events_table: String,

    /// Schema owning the event log table.
    #[serde(default)]
    pub schema: Option<String>,

    /// SQL dialect statements are compiled for.
    #[serde(default)]
    pub dialect: DialectKind,

    /// Whether loads return soft-deleted aggregates by default.
    #[serde(default)]
    pub include_deleted: bool,
}

fn default_events_table() -> String {
    "Events".to_string()
}

impl StoreConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self {
            events_table: default_events_table(),
            schema: None,
            dialect: DialectKind::default(),
            include_deleted: false,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Uses the following environment variables:
    /// - `STRATA_EVENTS_TABLE`: event log table name
    /// - `STRATA_EVENTS_SCHEMA`: schema of the event log table
    /// - `STRATA_SQL_DIALECT`: `generic`, `sqlserver` or `postgres`
    /// - `STRATA_INCLUDE_DELETED`: `true` or `false`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new();

        if let Ok(table) = std::env::var("STRATA_EVENTS_TABLE") {
            config.events_table = table;
        }

        if let Ok(schema) = std::env::var("STRATA_EVENTS_SCHEMA") {
            config.schema = Some(schema);
        }

        if let Ok(dialect) = std::env::var("STRATA_SQL_DIALECT") {
            config.dialect = dialect.parse().map_err(|_| ConfigError::Invalid {
                key: "STRATA_SQL_DIALECT",
                value: dialect.clone(),
            })?;
        }

        if let Ok(flag) = std::env::var("STRATA_INCLUDE_DELETED") {
            config.include_deleted = flag.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "STRATA_INCLUDE_DELETED",
                value: flag.clone(),
            })?;
        }

        Ok(config)
    }

    pub fn events_table(mut self, table: impl Into<String>) -> Self {
        self.events_table = table.into();
        self
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn dialect(mut self, dialect: DialectKind) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn include_deleted(mut self, include: bool) -> Self {
        self.include_deleted = include;
        self
    }

    /// The event log table, schema-qualified when a schema is set.
    pub fn events_table_id(&self) -> SqlResult<TableId> {
        let table = TableId::new(self.events_table.as_str())?;
        match &self.schema {
            Some(schema) => table.with_schema(schema.as_str()),
            None => Ok(table),
        }
    }

    /// The configured dialect.
    pub fn sql_dialect(&self) -> Arc<dyn Dialect> {
        self.dialect.dialect()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}
