//! # oxide-tom
//!
//! A micro-ORM that maps plain Rust structs onto SQL tables.
//!
//! This crate provides:
//! - `Model` trait describing a struct's fields, usually derived with
//!   `oxide_tom_derive::Model`
//! - `Table` for listing, adding, updating and removing rows
//! - `Database` holding the pool and the unit of work writes accumulate in
//! - `Command` for running any statement once per model instance
//! - Encrypted columns (AES-CBC with a random IV per value)
//! - `SchemaGenie` for `CREATE TABLE` scripts
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use oxide_tom::{Database, Paging, Settings, Table};
//! use oxide_tom_derive::Model;
//! use uuid::Uuid;
//!
//! #[derive(Debug, Default, Model)]
//! struct Foo {
//!     #[field(name = "Id")]
//!     id: Uuid,
//!     #[field(name = "Text")]
//!     text: String,
//! }
//!
//! async fn example() -> oxide_tom::Result<()> {
//!     let database = Arc::new(
//!         Database::connect(Settings::new(), "sqlite://tom.db?mode=rwc").await?,
//!     );
//!     let foos = Table::<Foo>::new(&database)?;
//!
//!     foos.add(&Foo { id: Uuid::new_v4(), text: "Created".into() }).await?;
//!     database.commit().await?;
//!
//!     let all = foos.list(None, Paging::all()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Units of work
//!
//! Writes issued through a [`Table`] are not committed on their own. The
//! first write opens a [`Work`] on the [`Database`]; later writes join it
//! until [`Database::commit`]. [`Database::dispose`], or dropping the
//! database, rolls everything back.
//!
//! ## Encrypted columns
//!
//! ```ignore
//! let key = Encryptor::generate_key(KeyLength::Aes256);
//! let settings = Settings::new().with_encryptor(Encryptor::new(key)?);
//! // ...
//! foos.configure_all_columns(
//!     |c| {
//!         c.secure();
//!         Ok(())
//!     },
//!     |c| !c.is_primary_key(),
//! )?;
//! ```

pub mod command;
pub mod database;
pub mod dialect;
mod driver;
pub mod encryption;
mod error;
pub mod field;
pub mod mapping;
mod model;
pub mod params;
pub mod query;
pub mod schema;
pub mod settings;
pub mod table;
pub mod value;
pub mod work;

pub use command::{Command, ExecutionParameter};
pub use database::Database;
pub use dialect::{Dialect, SqlServerDialect, SqliteDialect};
pub use encryption::{Encryptor, KeyLength};
pub use error::{Result, TomError};
pub use field::{Field, FieldDef, Transform};
pub use mapping::{SemanticType, StorageKind, TypeMapping, TypeRegistry};
pub use model::Model;
pub use params::{ParameterSource, Statement};
pub use query::{Paging, Scalar};
pub use schema::SchemaGenie;
pub use settings::{Config, Settings};
pub use table::{bind_tables, Column, Select, Table, TableMeta};
pub use value::{FieldType, SqlValue, Value};
pub use work::Work;
