//! Error types for the mapper.

use thiserror::Error;

use crate::mapping::SemanticType;

/// Errors raised while configuring tables or running commands.
#[derive(Debug, Error)]
pub enum TomError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The driver rejected a paged query because it has no ordering.
    #[error("paging requires an ORDER BY clause (PossiblyMissingOrderBy): {0}")]
    MissingOrderBy(#[source] sqlx::Error),

    /// No registry entry exists for the semantic type.
    #[error("no type mapping registered for {semantic:?} (nullable: {nullable})")]
    UnmappedType {
        /// The semantic type that was looked up.
        semantic: SemanticType,
        /// Whether the nullable variant was requested.
        nullable: bool,
    },

    /// The encryption key has an unsupported length or text form.
    #[error("invalid encryption key: {0}")]
    InvalidKey(String),

    /// A field or column name does not exist on the model.
    #[error("field not found: {0}")]
    FieldNotFound(String),

    /// Invalid mapper configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// `commit` was called while no unit of work was open.
    #[error("no open connection; must request work before committing")]
    NoOpenWork,

    /// A query expected to return at most one row returned more.
    #[error("expected at most one {table} row, found several")]
    MultipleRows {
        /// Table queried.
        table: &'static str,
    },

    /// A placeholder in the query has no value to bind.
    #[error("no value supplied for parameter @{0}")]
    MissingParameter(String),

    /// A field value cannot be moved between memory and storage.
    #[error("cannot transform field `{field}`: {message}")]
    Transform {
        /// Field name.
        field: String,
        /// What went wrong.
        message: String,
    },

    /// Ciphertext is malformed or the cipher rejected it.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// A value has the wrong shape for its destination.
    #[error("expected {expected} value, found {found}")]
    Conversion {
        /// Expected kind.
        expected: &'static str,
        /// Kind actually seen.
        found: String,
    },

    /// The driver refused a bound argument.
    #[error("failed to encode parameter: {0}")]
    Encode(#[source] sqlx::error::BoxDynError),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TomError {
    pub(crate) fn transform(field: &str, message: impl Into<String>) -> Self {
        Self::Transform {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn conversion(expected: &'static str, found: impl std::fmt::Debug) -> Self {
        Self::Conversion {
            expected,
            found: format!("{found:?}"),
        }
    }

    /// Returns true for setup mistakes that retrying cannot fix.
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnmappedType { .. }
                | Self::InvalidKey(_)
                | Self::FieldNotFound(_)
                | Self::Configuration(_)
                | Self::NoOpenWork
                | Self::MissingParameter(_)
        )
    }

    /// Returns true when the failure came from the database driver.
    pub const fn is_driver(&self) -> bool {
        matches!(self, Self::Database(_) | Self::MissingOrderBy(_))
    }
}

/// Result type alias for mapper operations.
pub type Result<T> = std::result::Result<T, TomError>;
