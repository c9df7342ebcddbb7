//! Mapper settings and configuration loading.
//!
//! [`Settings`] is built once and shared through an `Arc` by the database,
//! its tables and their commands. [`Config`] is the on-disk form that
//! produces it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::dialect::{Dialect, SqlServerDialect, SqliteDialect};
use crate::encryption::Encryptor;
use crate::error::Result;
use crate::mapping::TypeRegistry;
use crate::query::Paging;

/// Environment variable holding the connection string.
pub const CONNECTION_STRING_VAR: &str = "TOM_CONNECTION_STRING";
/// Environment variable holding the encryption key text.
pub const ENCRYPTION_KEY_VAR: &str = "TOM_ENCRYPTION_KEY";

/// Everything commands need besides a connection.
#[derive(Debug, Clone)]
pub struct Settings {
    registry: TypeRegistry,
    encryptor: Option<Encryptor>,
    dialect: Arc<dyn Dialect>,
    paging: Paging,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

impl Settings {
    /// Loose registry, SQLite dialect, no encryption, all rows per list.
    pub fn new() -> Self {
        Self {
            registry: TypeRegistry::new(),
            encryptor: None,
            dialect: Arc::new(SqliteDialect::new()),
            paging: Paging::default(),
        }
    }

    #[must_use]
    pub fn with_registry(mut self, registry: TypeRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn with_encryptor(mut self, encryptor: Encryptor) -> Self {
        self.encryptor = Some(encryptor);
        self
    }

    #[must_use]
    pub fn with_dialect(mut self, dialect: impl Dialect + 'static) -> Self {
        self.dialect = Arc::new(dialect);
        self
    }

    /// Sets the paging used when a list call does not choose one.
    #[must_use]
    pub const fn with_paging(mut self, paging: Paging) -> Self {
        self.paging = paging;
        self
    }

    pub const fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub const fn encryptor(&self) -> Option<&Encryptor> {
        self.encryptor.as_ref()
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub const fn paging(&self) -> Paging {
        self.paging
    }
}

/// Dialect selection in a config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectName {
    #[default]
    Sqlite,
    SqlServer,
}

/// Configuration document.
///
/// ```json
/// {
///     "connection_strings": { "Tom": "sqlite://tom.db?mode=rwc" },
///     "encryption_key": "12 250 3 ...",
///     "dialect": "sqlite"
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connection_strings: HashMap<String, String>,
    #[serde(default)]
    pub encryption_key: Option<String>,
    #[serde(default)]
    pub dialect: DialectName,
}

impl Config {
    /// Loads a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading configuration");
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Reads the connection string and key from the environment.
    ///
    /// The connection string is registered under the name `default`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var(CONNECTION_STRING_VAR) {
            config.connection_strings.insert("default".to_string(), url);
        }
        config.encryption_key = std::env::var(ENCRYPTION_KEY_VAR).ok();
        config
    }

    /// Resolves a named connection string, or returns the argument itself
    /// when no entry has that name.
    pub fn connection_string<'a>(&'a self, name_or_literal: &'a str) -> &'a str {
        self.connection_strings
            .get(name_or_literal)
            .map_or(name_or_literal, String::as_str)
    }

    /// Builds settings from this configuration.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings = match self.dialect {
            DialectName::Sqlite => Settings::new(),
            DialectName::SqlServer => Settings::new().with_dialect(SqlServerDialect::new()),
        };
        if let Some(key) = &self.encryption_key {
            settings = settings.with_encryptor(Encryptor::from_key_text(key)?);
        }
        Ok(settings)
    }
}
