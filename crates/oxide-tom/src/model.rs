//! The model trait.

use crate::error::Result;
use crate::field::FieldDef;
use crate::params::ParameterSource;
use crate::value::Value;

/// A type that maps to the rows of one table.
///
/// Usually derived with `#[derive(Model)]`:
///
/// ```ignore
/// use oxide_tom::Model;
/// use uuid::Uuid;
///
/// #[derive(Debug, Default, Model)]
/// struct Foo {
///     #[field(name = "Id")]
///     id: Uuid,
///     #[field(name = "Name")]
///     name: String,
/// }
/// ```
///
/// `Default` supplies the instance each result row is written into.
pub trait Model: Default + ParameterSource + Send + Sync + 'static {
    /// The type name.
    const NAME: &'static str;

    /// The table name, the type name unless overridden.
    const TABLE: &'static str;

    /// Properties in declaration order.
    const FIELDS: &'static [FieldDef];

    /// Reads the property stored under `name`.
    fn get(&self, name: &str) -> Result<Value>;

    /// Writes the property stored under `name`.
    fn set(&mut self, name: &str, value: Value) -> Result<()>;
}
