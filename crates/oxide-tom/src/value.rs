//! In-memory and storage values.
//!
//! [`Value`] is what a model field holds, [`SqlValue`] is what gets bound
//! to or read from a column. [`FieldType`] connects Rust field types to
//! their semantic type.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Result, TomError};
use crate::mapping::{SemanticType, StorageKind};

/// Text layout for naive date-times, fixed width so text order is time order.
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";
const DATETIME_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A model field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Uuid(Uuid),
    Int(i32),
    Decimal(Decimal),
    Float(f64),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
    /// A serialized catch-all value.
    Object(serde_json::Value),
}

impl Value {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Canonical text form used before encryption.
    ///
    /// Returns `None` for values without a scalar text form.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Uuid(v) => Some(v.to_string()),
            Self::Int(v) => Some(v.to_string()),
            Self::Decimal(v) => Some(v.to_string()),
            Self::Float(v) => Some(v.to_string()),
            Self::DateTime(v) => Some(v.format(DATETIME_FORMAT).to_string()),
            Self::DateTimeOffset(v) => Some(v.to_rfc3339_opts(SecondsFormat::Nanos, false)),
            Self::Bool(v) => Some(v.to_string()),
            Self::Text(v) => Some(v.clone()),
            Self::Null | Self::Bytes(_) | Self::Object(_) => None,
        }
    }

    /// Parses the canonical text form of a semantic type.
    pub fn parse(semantic: SemanticType, text: &str) -> Result<Self> {
        let bad = || TomError::conversion(semantic_name(semantic), text);
        Ok(match semantic {
            SemanticType::Uuid => Self::Uuid(Uuid::parse_str(text).map_err(|_| bad())?),
            SemanticType::Int => Self::Int(text.parse().map_err(|_| bad())?),
            SemanticType::Decimal => Self::Decimal(text.parse().map_err(|_| bad())?),
            SemanticType::Float => Self::Float(text.parse().map_err(|_| bad())?),
            SemanticType::DateTime => Self::DateTime(
                NaiveDateTime::parse_from_str(text, DATETIME_PARSE_FORMAT).map_err(|_| bad())?,
            ),
            SemanticType::DateTimeOffset => {
                Self::DateTimeOffset(DateTime::parse_from_rfc3339(text).map_err(|_| bad())?)
            }
            SemanticType::Bool => Self::Bool(text.parse().map_err(|_| bad())?),
            SemanticType::Text => Self::Text(text.to_string()),
            SemanticType::Bytes => Self::Bytes(text.as_bytes().to_vec()),
            SemanticType::Object => Self::Object(serde_json::from_str(text)?),
        })
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Uuid(_) => "uuid",
            Self::Int(_) => "int",
            Self::Decimal(_) => "decimal",
            Self::Float(_) => "float",
            Self::DateTime(_) => "datetime",
            Self::DateTimeOffset(_) => "datetimeoffset",
            Self::Bool(_) => "bool",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Object(_) => "object",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::Object(v) => write!(f, "{v}"),
            other => f.write_str(&other.to_text().unwrap_or_default()),
        }
    }
}

const fn semantic_name(semantic: SemanticType) -> &'static str {
    match semantic {
        SemanticType::Uuid => "uuid",
        SemanticType::Int => "int",
        SemanticType::Decimal => "decimal",
        SemanticType::Float => "float",
        SemanticType::DateTime => "datetime",
        SemanticType::DateTimeOffset => "datetimeoffset",
        SemanticType::Bool => "bool",
        SemanticType::Text => "text",
        SemanticType::Bytes => "bytes",
        SemanticType::Object => "object",
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    Uuid => Uuid,
    i32 => Int,
    Decimal => Decimal,
    f64 => Float,
    NaiveDateTime => DateTime,
    DateTime<FixedOffset> => DateTimeOffset,
    bool => Bool,
    String => Text,
    Vec<u8> => Bytes,
    serde_json::Value => Object,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// A value bound to, or read from, a column.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    UniqueIdentifier(Uuid),
    Int(i32),
    Decimal(Decimal),
    Float(f64),
    DateTime2(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
    Bit(bool),
    NVarChar(String),
    VarBinary(Vec<u8>),
}

impl SqlValue {
    /// Storage kind of the value, `None` for null.
    pub const fn kind(&self) -> Option<StorageKind> {
        Some(match self {
            Self::Null => return None,
            Self::UniqueIdentifier(_) => StorageKind::UniqueIdentifier,
            Self::Int(_) => StorageKind::Int,
            Self::Decimal(_) => StorageKind::Decimal,
            Self::Float(_) => StorageKind::Float,
            Self::DateTime2(_) => StorageKind::DateTime2,
            Self::DateTimeOffset(_) => StorageKind::DateTimeOffset,
            Self::Bit(_) => StorageKind::Bit,
            Self::NVarChar(_) => StorageKind::NVarChar,
            Self::VarBinary(_) => StorageKind::VarBinary,
        })
    }
}

impl From<Value> for SqlValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Uuid(v) => Self::UniqueIdentifier(v),
            Value::Int(v) => Self::Int(v),
            Value::Decimal(v) => Self::Decimal(v),
            Value::Float(v) => Self::Float(v),
            Value::DateTime(v) => Self::DateTime2(v),
            Value::DateTimeOffset(v) => Self::DateTimeOffset(v),
            Value::Bool(v) => Self::Bit(v),
            Value::Text(v) => Self::NVarChar(v),
            Value::Bytes(v) => Self::VarBinary(v),
            Value::Object(v) => Self::NVarChar(v.to_string()),
        }
    }
}

impl From<SqlValue> for Value {
    fn from(value: SqlValue) -> Self {
        match value {
            SqlValue::Null => Self::Null,
            SqlValue::UniqueIdentifier(v) => Self::Uuid(v),
            SqlValue::Int(v) => Self::Int(v),
            SqlValue::Decimal(v) => Self::Decimal(v),
            SqlValue::Float(v) => Self::Float(v),
            SqlValue::DateTime2(v) => Self::DateTime(v),
            SqlValue::DateTimeOffset(v) => Self::DateTimeOffset(v),
            SqlValue::Bit(v) => Self::Bool(v),
            SqlValue::NVarChar(v) => Self::Text(v),
            SqlValue::VarBinary(v) => Self::Bytes(v),
        }
    }
}

/// A Rust type usable as a directly mapped model field.
///
/// Reading null into a non-nullable type yields its empty value.
pub trait FieldType: Sized {
    /// Semantic type used for the registry lookup.
    const SEMANTIC: SemanticType;
    /// Whether the nullable registry variant applies.
    const NULLABLE: bool = false;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> Result<Self>;
}

macro_rules! field_type {
    ($ty:ty, $semantic:ident, $variant:ident) => {
        impl FieldType for $ty {
            const SEMANTIC: SemanticType = SemanticType::$semantic;

            fn to_value(&self) -> Value {
                Value::$variant(self.clone())
            }

            fn from_value(value: Value) -> Result<Self> {
                match value {
                    Value::$variant(v) => Ok(v),
                    Value::Null => Ok(Self::default()),
                    other => Err(TomError::conversion(
                        semantic_name(SemanticType::$semantic),
                        other.kind_name(),
                    )),
                }
            }
        }
    };
}

field_type!(Uuid, Uuid, Uuid);
field_type!(i32, Int, Int);
field_type!(Decimal, Decimal, Decimal);
field_type!(f64, Float, Float);
field_type!(NaiveDateTime, DateTime, DateTime);
field_type!(DateTime<FixedOffset>, DateTimeOffset, DateTimeOffset);
field_type!(bool, Bool, Bool);
field_type!(String, Text, Text);
field_type!(Vec<u8>, Bytes, Bytes);

impl FieldType for DateTime<Utc> {
    const SEMANTIC: SemanticType = SemanticType::DateTimeOffset;

    fn to_value(&self) -> Value {
        Value::DateTimeOffset(self.fixed_offset())
    }

    fn from_value(value: Value) -> Result<Self> {
        DateTime::<FixedOffset>::from_value(value).map(|v| v.with_timezone(&Utc))
    }
}

impl<T: FieldType> FieldType for Option<T> {
    const SEMANTIC: SemanticType = T::SEMANTIC;
    const NULLABLE: bool = true;

    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, FieldType::to_value)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Converts a catch-all field to an object value.
///
/// A value that serializes to JSON null becomes [`Value::Null`].
pub fn to_object<T: Serialize>(value: &T) -> Result<Value> {
    Ok(match serde_json::to_value(value)? {
        serde_json::Value::Null => Value::Null,
        json => Value::Object(json),
    })
}

/// Converts an object value back into a catch-all field.
pub fn from_object<T: DeserializeOwned>(value: Value) -> Result<T> {
    let json = match value {
        Value::Null => serde_json::Value::Null,
        Value::Object(json) => json,
        Value::Text(text) => serde_json::from_str(&text)?,
        other => return Err(TomError::conversion("object", other.kind_name())),
    };
    Ok(serde_json::from_value(json)?)
}
