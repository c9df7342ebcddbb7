//! Field descriptors and the value transform pipeline.
//!
//! A [`Field`] describes one model property: its name, semantic type, how it
//! is stored and whether it is mapped, secure or serialized. Moving a value
//! between the model and the database goes through [`Field::to_storage`] and
//! [`Field::from_storage`], which dispatch on a single [`Transform`].

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::encryption::Encryptor;
use crate::error::{Result, TomError};
use crate::mapping::{SemanticType, StorageKind, TypeRegistry};
use crate::model::Model;
use crate::value::{SqlValue, Value};

/// Static description of a model property, as emitted by `#[derive(Model)]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    /// Column and parameter name.
    pub name: &'static str,
    pub semantic: SemanticType,
    pub nullable: bool,
    /// Innermost type name, used to recognise references to other models.
    pub type_name: &'static str,
    pub primary_key: bool,
}

/// How a field value is moved to and from storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Stored as is.
    Plain,
    /// JSON text.
    SerializedText,
    /// BSON document bytes.
    SerializedBinary,
    /// Canonical text, encrypted.
    SecureScalar,
    /// Fixed-width epoch encoding, encrypted.
    SecureDateTime,
    /// Raw bytes, encrypted.
    SecureBytes,
    /// BSON document bytes, encrypted.
    SecureSerialized,
}

/// BSON needs a document at the top level.
#[derive(Serialize, Deserialize)]
struct Envelope {
    v: serde_json::Value,
}

/// Metadata for one model property.
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    semantic: SemanticType,
    nullable: bool,
    type_name: &'static str,
    mapped: bool,
    secure: bool,
    serialized: bool,
    storage: StorageKind,
    empty: fn() -> Value,
}

impl Field {
    /// Resolves a field definition against the registry.
    ///
    /// A type without an entry of its own takes the catch-all mapping but
    /// keeps its semantic type, so its values serialize as their canonical
    /// form and read back as the same type.
    pub fn from_def(def: &FieldDef, registry: &TypeRegistry) -> Result<Self> {
        let mapping = registry.lookup(def.semantic, def.nullable)?;
        Ok(Self {
            name: def.name.to_string(),
            semantic: def.semantic,
            nullable: mapping.nullable,
            type_name: def.type_name,
            mapped: mapping.mapped,
            secure: false,
            serialized: mapping.serialized,
            storage: mapping.storage,
            empty: mapping.empty,
        })
    }

    /// Derives the ordered field list of a model.
    pub fn create_fields_from_type<M: Model>(registry: &TypeRegistry) -> Result<Vec<Self>> {
        M::FIELDS
            .iter()
            .map(|def| Self::from_def(def, registry))
            .collect()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn semantic(&self) -> SemanticType {
        self.semantic
    }

    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub const fn is_mapped(&self) -> bool {
        self.mapped
    }

    pub const fn is_secure(&self) -> bool {
        self.secure
    }

    pub const fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub const fn is_serialized(&self) -> bool {
        self.serialized
    }

    pub const fn storage(&self) -> StorageKind {
        self.storage
    }

    /// The value written in place of null.
    pub fn empty_value(&self) -> Value {
        (self.empty)()
    }

    pub fn set_mapped(&mut self, mapped: bool) {
        self.mapped = mapped;
    }

    /// Encrypts this field at rest. Calling it again changes nothing.
    pub fn secure(&mut self) {
        self.secure = true;
        self.storage = StorageKind::VarBinary;
    }

    /// Changes the storage kind of a field that is not secure.
    pub fn set_storage(&mut self, storage: StorageKind) -> Result<()> {
        if self.secure {
            return Err(TomError::Configuration(format!(
                "field `{}` is secure and must stay {:?}",
                self.name,
                StorageKind::VarBinary
            )));
        }
        self.storage = storage;
        Ok(())
    }

    /// Selects the transform for the current configuration.
    pub fn transform(&self) -> Result<Transform> {
        if self.serialized {
            return match (self.secure, self.storage) {
                (true, _) => Ok(Transform::SecureSerialized),
                (false, StorageKind::NVarChar) => Ok(Transform::SerializedText),
                (false, StorageKind::VarBinary) => Ok(Transform::SerializedBinary),
                (false, other) => Err(TomError::transform(
                    &self.name,
                    format!("cannot serialize an object as {other:?}"),
                )),
            };
        }
        if !self.secure {
            return Ok(Transform::Plain);
        }
        Ok(match self.semantic {
            SemanticType::Bytes => Transform::SecureBytes,
            SemanticType::DateTime | SemanticType::DateTimeOffset => Transform::SecureDateTime,
            _ => Transform::SecureScalar,
        })
    }

    /// Converts a model value into its stored form.
    ///
    /// Null is first replaced by the empty value. A value that is still null
    /// is stored as NULL and never encrypted.
    pub fn to_storage(&self, value: Value, encryptor: Option<&Encryptor>) -> Result<SqlValue> {
        let value = if value.is_null() { self.empty_value() } else { value };
        if value.is_null() {
            return Ok(SqlValue::Null);
        }

        match self.transform()? {
            Transform::Plain => {
                let stored = SqlValue::from(value);
                if stored.kind() == Some(self.storage) {
                    Ok(stored)
                } else {
                    Err(TomError::transform(
                        &self.name,
                        format!("cannot store {:?} as {:?}", stored.kind(), self.storage),
                    ))
                }
            }
            Transform::SerializedText => {
                Ok(SqlValue::NVarChar(serde_json::to_string(&self.json(value)?)?))
            }
            Transform::SerializedBinary => Ok(SqlValue::VarBinary(self.bson(value)?)),
            Transform::SecureScalar => {
                let text = value.to_text().ok_or_else(|| {
                    TomError::transform(&self.name, "value has no text form")
                })?;
                self.encrypt(encryptor, text.as_bytes())
            }
            Transform::SecureDateTime => {
                let bytes = self.encode_datetime(&value)?;
                self.encrypt(encryptor, &bytes)
            }
            Transform::SecureBytes => match value {
                Value::Bytes(bytes) => self.encrypt(encryptor, &bytes),
                other => Err(TomError::transform(
                    &self.name,
                    format!("expected bytes, found {other:?}"),
                )),
            },
            Transform::SecureSerialized => {
                let bytes = self.bson(value)?;
                self.encrypt(encryptor, &bytes)
            }
        }
    }

    /// Converts a stored value back into a model value.
    pub fn from_storage(&self, stored: SqlValue, encryptor: Option<&Encryptor>) -> Result<Value> {
        if stored == SqlValue::Null {
            return Ok(Value::Null);
        }

        match self.transform()? {
            Transform::Plain => Ok(Value::from(stored)),
            Transform::SerializedText => match stored {
                SqlValue::NVarChar(text) => self.from_json(serde_json::from_str(&text)?),
                other => Err(self.unexpected(&other)),
            },
            Transform::SerializedBinary => {
                let bytes = self.stored_bytes(stored)?;
                self.from_bson(&bytes)
            }
            Transform::SecureScalar => {
                let plain = self.decrypt(encryptor, stored)?;
                let text = String::from_utf8(plain)
                    .map_err(|e| TomError::transform(&self.name, e.to_string()))?;
                Value::parse(self.semantic, &text)
            }
            Transform::SecureDateTime => {
                let plain = self.decrypt(encryptor, stored)?;
                self.decode_datetime(&plain)
            }
            Transform::SecureBytes => self.decrypt(encryptor, stored).map(Value::Bytes),
            Transform::SecureSerialized => {
                let plain = self.decrypt(encryptor, stored)?;
                self.from_bson(&plain)
            }
        }
    }

    fn json(&self, value: Value) -> Result<serde_json::Value> {
        Ok(match value {
            Value::Object(json) => json,
            Value::Int(v) => v.into(),
            Value::Bool(v) => v.into(),
            Value::Text(v) => v.into(),
            Value::Bytes(v) => v.into(),
            Value::Float(v) => serde_json::Number::from_f64(v)
                .map_or_else(|| v.to_string().into(), serde_json::Value::Number),
            other => other.to_text().map(serde_json::Value::String).ok_or_else(|| {
                TomError::transform(&self.name, format!("cannot serialize {other:?}"))
            })?,
        })
    }

    /// Reads serialized JSON back as this field's semantic type.
    fn from_json(&self, json: serde_json::Value) -> Result<Value> {
        match (self.semantic, json) {
            (_, serde_json::Value::Null) => Ok(Value::Null),
            (SemanticType::Object, json) => Ok(Value::Object(json)),
            (SemanticType::Bytes, json) => Ok(Value::Bytes(serde_json::from_value(json)?)),
            (semantic, serde_json::Value::String(text)) => Value::parse(semantic, &text),
            (semantic, json) => Value::parse(semantic, &json.to_string()),
        }
    }

    fn bson(&self, value: Value) -> Result<Vec<u8>> {
        let envelope = Envelope { v: self.json(value)? };
        bson::to_vec(&envelope).map_err(|e| TomError::transform(&self.name, e.to_string()))
    }

    fn from_bson(&self, bytes: &[u8]) -> Result<Value> {
        let envelope: Envelope = bson::from_slice(bytes)
            .map_err(|e| TomError::transform(&self.name, e.to_string()))?;
        self.from_json(envelope.v)
    }

    fn encrypt(&self, encryptor: Option<&Encryptor>, plain: &[u8]) -> Result<SqlValue> {
        let encryptor = self.encryptor(encryptor)?;
        Ok(SqlValue::VarBinary(encryptor.encrypt(plain)?))
    }

    fn decrypt(&self, encryptor: Option<&Encryptor>, stored: SqlValue) -> Result<Vec<u8>> {
        let encryptor = self.encryptor(encryptor)?;
        let bytes = self.stored_bytes(stored)?;
        encryptor.decrypt(&bytes)
    }

    fn encryptor<'a>(&self, encryptor: Option<&'a Encryptor>) -> Result<&'a Encryptor> {
        encryptor.ok_or_else(|| {
            TomError::Configuration(format!(
                "field `{}` is secure but no encryption key is configured",
                self.name
            ))
        })
    }

    fn stored_bytes(&self, stored: SqlValue) -> Result<Vec<u8>> {
        match stored {
            SqlValue::VarBinary(bytes) => Ok(bytes),
            other => Err(self.unexpected(&other)),
        }
    }

    fn unexpected(&self, stored: &SqlValue) -> TomError {
        TomError::transform(
            &self.name,
            format!("unexpected stored {:?} for {:?}", stored.kind(), self.storage),
        )
    }

    /// Seconds and nanoseconds since the epoch, little endian, followed by
    /// the UTC offset in seconds for offset date-times.
    fn encode_datetime(&self, value: &Value) -> Result<Vec<u8>> {
        let (utc, offset) = match value {
            Value::DateTime(v) => (v.and_utc(), None),
            Value::DateTimeOffset(v) => (v.with_timezone(&Utc), Some(v.offset().local_minus_utc())),
            other => {
                return Err(TomError::transform(
                    &self.name,
                    format!("expected a date-time, found {other:?}"),
                ))
            }
        };
        let mut bytes = Vec::with_capacity(16);
        bytes.extend_from_slice(&utc.timestamp().to_le_bytes());
        bytes.extend_from_slice(&utc.timestamp_subsec_nanos().to_le_bytes());
        if let Some(offset) = offset {
            bytes.extend_from_slice(&offset.to_le_bytes());
        }
        Ok(bytes)
    }

    fn decode_datetime(&self, bytes: &[u8]) -> Result<Value> {
        let invalid = || TomError::transform(&self.name, "malformed date-time bytes");
        let expected = if self.semantic == SemanticType::DateTimeOffset { 16 } else { 12 };
        if bytes.len() != expected {
            return Err(invalid());
        }
        let secs = i64::from_le_bytes(bytes[..8].try_into().map_err(|_| invalid())?);
        let nanos = u32::from_le_bytes(bytes[8..12].try_into().map_err(|_| invalid())?);
        let utc = DateTime::from_timestamp(secs, nanos).ok_or_else(invalid)?;

        if expected == 12 {
            return Ok(Value::DateTime(utc.naive_utc()));
        }
        let offset = i32::from_le_bytes(bytes[12..16].try_into().map_err(|_| invalid())?);
        let offset = FixedOffset::east_opt(offset).ok_or_else(invalid)?;
        Ok(Value::DateTimeOffset(utc.with_timezone(&offset)))
    }
}
