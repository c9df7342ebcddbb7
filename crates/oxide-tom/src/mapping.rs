//! The type registry: how each semantic type is stored.
//!
//! Every field resolves its storage kind, DDL argument clause, default
//! literal and empty value from a [`TypeMapping`]. The registry holds one
//! entry per semantic type and nullability. In loose mode (the default) a
//! lookup without a direct entry falls back to the serialized object entry.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{Result, TomError};
use crate::value::Value;

/// The in-memory type of a model field, independent of storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticType {
    /// 128-bit identifier.
    Uuid,
    /// 32-bit signed integer.
    Int,
    /// Fixed-point decimal.
    Decimal,
    /// 64-bit float.
    Float,
    /// Date and time without offset.
    DateTime,
    /// Date and time with a fixed UTC offset.
    DateTimeOffset,
    /// Boolean.
    Bool,
    /// Unicode text.
    Text,
    /// Raw byte sequence.
    Bytes,
    /// Anything else, stored through a serialization format.
    Object,
}

/// The database column type a semantic type is stored as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    UniqueIdentifier,
    Int,
    Decimal,
    Float,
    DateTime2,
    DateTimeOffset,
    Bit,
    NVarChar,
    VarBinary,
}

impl StorageKind {
    /// SQL Server type name, lower case as the DDL writer emits it.
    pub const fn sql_name(self) -> &'static str {
        match self {
            Self::UniqueIdentifier => "uniqueidentifier",
            Self::Int => "int",
            Self::Decimal => "decimal",
            Self::Float => "float",
            Self::DateTime2 => "datetime2",
            Self::DateTimeOffset => "datetimeoffset",
            Self::Bit => "bit",
            Self::NVarChar => "nvarchar",
            Self::VarBinary => "varbinary",
        }
    }
}

/// One registry entry.
#[derive(Debug, Clone)]
pub struct TypeMapping {
    pub semantic: SemanticType,
    pub nullable: bool,
    pub storage: StorageKind,
    /// DDL argument clause such as `(100)`.
    pub arguments: Option<&'static str>,
    /// DDL default literal such as `(0)`.
    pub default: Option<&'static str>,
    /// Values must round-trip through a serialization format.
    pub serialized: bool,
    pub mapped: bool,
    /// Produces the value written when a field holds null.
    pub empty: fn() -> Value,
}

impl TypeMapping {
    const fn new(
        semantic: SemanticType,
        storage: StorageKind,
        arguments: Option<&'static str>,
        default: Option<&'static str>,
        empty: fn() -> Value,
    ) -> Self {
        Self {
            semantic,
            nullable: false,
            storage,
            arguments,
            default,
            serialized: false,
            mapped: true,
            empty,
        }
    }

    /// The nullable variant: same storage, no default, null as empty value.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self.default = None;
        self.empty = null;
        self
    }
}

fn null() -> Value {
    Value::Null
}

fn default_entries() -> Vec<TypeMapping> {
    use SemanticType as S;
    use StorageKind as K;

    let non_null = [
        TypeMapping::new(
            S::Uuid,
            K::UniqueIdentifier,
            None,
            Some("('00000000-0000-0000-0000-000000000000')"),
            || Value::Uuid(Uuid::nil()),
        ),
        TypeMapping::new(S::Int, K::Int, None, Some("(0)"), || Value::Int(0)),
        TypeMapping::new(S::Decimal, K::Decimal, Some("(18, 0)"), Some("(0)"), || {
            Value::Decimal(Decimal::ZERO)
        }),
        TypeMapping::new(S::Float, K::Float, None, Some("(0)"), || Value::Float(0.0)),
        TypeMapping::new(
            S::DateTime,
            K::DateTime2,
            Some("(7)"),
            Some("('1970-01-01T00:00:00.0000000')"),
            || Value::DateTime(NaiveDateTime::default()),
        ),
        TypeMapping::new(
            S::DateTimeOffset,
            K::DateTimeOffset,
            Some("(7)"),
            Some("('1970-01-01T00:00:00.0000000+00:00')"),
            || Value::DateTimeOffset(DateTime::<Utc>::default().fixed_offset()),
        ),
        TypeMapping::new(S::Bool, K::Bit, None, Some("(0)"), || Value::Bool(false)),
        TypeMapping::new(S::Text, K::NVarChar, Some("(100)"), Some("('')"), || {
            Value::Text(String::new())
        }),
        TypeMapping::new(S::Bytes, K::VarBinary, Some("(max)"), None, || {
            Value::Bytes(Vec::new())
        }),
    ];

    let mut entries: Vec<TypeMapping> = non_null
        .iter()
        .cloned()
        .chain(non_null.iter().cloned().map(TypeMapping::nullable))
        .collect();

    let mut object = TypeMapping::new(S::Object, K::NVarChar, Some("(max)"), None, null);
    object.nullable = true;
    object.serialized = true;
    entries.push(object);
    entries
}

/// Registry of [`TypeMapping`] entries.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    entries: Vec<TypeMapping>,
    strict: bool,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Creates a loose registry with the built-in entries.
    pub fn new() -> Self {
        Self {
            entries: default_entries(),
            strict: false,
        }
    }

    /// Turns unmapped and catch-all lookups into configuration errors.
    #[must_use]
    pub const fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub const fn is_strict(&self) -> bool {
        self.strict
    }

    /// Adds an entry, replacing any entry with the same key.
    pub fn register(&mut self, mapping: TypeMapping) {
        self.entries
            .retain(|e| !(e.semantic == mapping.semantic && e.nullable == mapping.nullable));
        self.entries.push(mapping);
    }

    /// Removes the entry for a key, if present.
    pub fn unregister(&mut self, semantic: SemanticType, nullable: bool) {
        self.entries
            .retain(|e| !(e.semantic == semantic && e.nullable == nullable));
    }

    /// Resolves the mapping for a semantic type.
    pub fn lookup(&self, semantic: SemanticType, nullable: bool) -> Result<&TypeMapping> {
        let unmapped = || TomError::UnmappedType { semantic, nullable };

        if self.strict && semantic == SemanticType::Object {
            return Err(unmapped());
        }
        if let Some(entry) = self
            .entries
            .iter()
            .find(|e| e.semantic == semantic && e.nullable == nullable)
        {
            return Ok(entry);
        }
        if self.strict {
            return Err(unmapped());
        }
        self.entries
            .iter()
            .find(|e| e.semantic == SemanticType::Object)
            .ok_or_else(unmapped)
    }

    /// The raw bytes entry that secure columns adopt for their DDL.
    pub fn bytes(&self, nullable: bool) -> Result<&TypeMapping> {
        self.lookup(SemanticType::Bytes, nullable)
    }
}
