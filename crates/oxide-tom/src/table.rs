//! Table façade: the CRUD surface over one model type.
//!
//! A [`Table`] derives its [`Column`]s from the model's fields, generates
//! the SELECT, INSERT, UPDATE and DELETE text for them and runs it. Writes
//! go through the database's open unit of work; reads take a pooled
//! connection of their own.
//!
//! # Example
//!
//! ```ignore
//! let database = Arc::new(Database::connect(settings, "sqlite://tom.db?mode=rwc").await?);
//! let mut foos = Table::<Foo>::new(&database)?;
//! foos.configure_column("Name", |c| {
//!     c.secure();
//!     Ok(())
//! })?;
//!
//! foos.add(&foo).await?;
//! database.commit().await?;
//!
//! let named = foos
//!     .select()
//!     .filter("[Int] > @min", Some(&[("min", Value::Int(3))]))
//!     .page(1, 20)
//!     .list()
//!     .await?;
//! ```

use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use crate::command::{assignments_text, execute_owned, field_names_text, parameter_names_text};
use crate::database::Database;
use crate::dialect::ColumnDef;
use crate::error::{Result, TomError};
use crate::field::{Field, FieldDef};
use crate::mapping::{StorageKind, TypeRegistry};
use crate::model::Model;
use crate::params::ParameterSource;
use crate::query::{self, Paging, Scalar};
use crate::settings::Settings;

/// A field together with its DDL and key metadata.
#[derive(Debug, Clone)]
pub struct Column {
    field: Field,
    arguments: Option<String>,
    default: Option<String>,
    primary_key: bool,
    secure_ddl: (Option<&'static str>, Option<&'static str>),
}

impl Column {
    fn new(def: &FieldDef, registry: &TypeRegistry, primary_key: bool) -> Result<Self> {
        let mapping = registry.lookup(def.semantic, def.nullable)?;
        let field = Field::from_def(def, registry)?;
        let secure_ddl = registry
            .bytes(field.is_nullable())
            .map_or((None, None), |bytes| (bytes.arguments, bytes.default));
        Ok(Self {
            field,
            arguments: mapping.arguments.map(String::from),
            default: mapping.default.map(String::from),
            primary_key,
            secure_ddl,
        })
    }

    pub const fn field(&self) -> &Field {
        &self.field
    }

    pub fn field_mut(&mut self) -> &mut Field {
        &mut self.field
    }

    pub fn name(&self) -> &str {
        self.field.name()
    }

    pub const fn storage(&self) -> StorageKind {
        self.field.storage()
    }

    pub fn arguments(&self) -> Option<&str> {
        self.arguments.as_deref()
    }

    pub fn default_value(&self) -> Option<&str> {
        self.default.as_deref()
    }

    pub const fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub const fn is_mapped(&self) -> bool {
        self.field.is_mapped()
    }

    pub const fn is_secure(&self) -> bool {
        self.field.is_secure()
    }

    pub fn set_mapped(&mut self, mapped: bool) {
        self.field.set_mapped(mapped);
    }

    /// Encrypts the column at rest and adopts the raw bytes DDL.
    pub fn secure(&mut self) {
        self.field.secure();
        let (arguments, default) = self.secure_ddl;
        self.arguments = arguments.map(String::from);
        self.default = default.map(String::from);
    }

    /// See [`Field::set_storage`].
    pub fn set_storage(&mut self, storage: StorageKind) -> Result<()> {
        self.field.set_storage(storage)
    }

    pub fn set_arguments(&mut self, arguments: Option<&str>) {
        self.arguments = arguments.map(String::from);
    }

    pub fn set_default(&mut self, default: Option<&str>) {
        self.default = default.map(String::from);
    }

    /// What the DDL writer needs for this column.
    pub fn definition(&self) -> ColumnDef<'_> {
        ColumnDef {
            name: self.name(),
            storage: self.storage(),
            arguments: self.arguments(),
            nullable: self.field.is_nullable(),
            default: self.default_value(),
        }
    }
}

/// Type-erased view of a table, for schema generation and binding.
pub trait TableMeta {
    /// The model type name.
    fn model_name(&self) -> &'static str;

    fn table_name(&self) -> &'static str;

    /// Every column, mapped or not, in declaration order.
    fn all_columns(&self) -> &[Column];

    fn all_columns_mut(&mut self) -> &mut [Column];
}

/// Unmaps every column whose element type is the model of one of `tables`.
///
/// Such columns hold references to other tables' rows and are not stored.
pub fn bind_tables(tables: &mut [&mut dyn TableMeta]) {
    let models: HashSet<&'static str> = tables.iter().map(|t| t.model_name()).collect();
    for table in tables.iter_mut() {
        let table_name = table.table_name();
        for column in table.all_columns_mut() {
            if column.is_mapped() && models.contains(column.field().type_name()) {
                debug!(
                    table = table_name,
                    column = column.name(),
                    "Unmapping reference column"
                );
                column.set_mapped(false);
            }
        }
    }
}

/// CRUD access to the table of model `M`.
#[derive(Debug)]
pub struct Table<M: Model> {
    database: Arc<Database>,
    columns: Vec<Column>,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Model> Table<M> {
    /// Maps `M` against the database's registry.
    ///
    /// Fields marked as primary key form the key; without any, the first
    /// field does.
    pub fn new(database: &Arc<Database>) -> Result<Self> {
        let registry = database.settings().registry();
        let keyed = M::FIELDS.iter().any(|def| def.primary_key);
        let columns = M::FIELDS
            .iter()
            .enumerate()
            .map(|(index, def)| {
                let primary_key = if keyed { def.primary_key } else { index == 0 };
                Column::new(def, registry, primary_key)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut table = Self {
            database: Arc::clone(database),
            columns,
            _marker: PhantomData,
        };
        table.apply_key_defaults()?;
        debug!(table = M::TABLE, columns = table.columns.len(), "Mapped table");
        Ok(table)
    }

    pub const fn database(&self) -> &Arc<Database> {
        &self.database
    }

    pub fn settings(&self) -> &Settings {
        self.database.settings()
    }

    /// Mapped columns in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.is_mapped())
    }

    pub fn unmapped_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| !c.is_mapped())
    }

    /// Mapped key columns.
    pub fn primary_key(&self) -> impl Iterator<Item = &Column> {
        self.columns().filter(|c| c.is_primary_key())
    }

    fn position(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name() == name)
            .or_else(|| {
                self.columns
                    .iter()
                    .position(|c| c.name().eq_ignore_ascii_case(name))
            })
            .ok_or_else(|| TomError::FieldNotFound(format!("{}.{name}", M::NAME)))
    }

    /// Makes the named columns the key.
    pub fn set_primary_key(&mut self, names: &[&str]) -> Result<&mut Self> {
        if names.is_empty() {
            return Err(TomError::Configuration(format!(
                "table {} needs at least one key column",
                M::TABLE
            )));
        }
        let keys = names
            .iter()
            .map(|name| self.position(name))
            .collect::<Result<Vec<_>>>()?;
        for (index, column) in self.columns.iter_mut().enumerate() {
            column.primary_key = keys.contains(&index);
        }
        self.apply_key_defaults()?;
        Ok(self)
    }

    /// UUID keys default to a generated value; other UUID columns keep the
    /// registry default.
    fn apply_key_defaults(&mut self) -> Result<()> {
        let settings = self.database.settings();
        let generated = settings.dialect().uuid_default();
        for column in self
            .columns
            .iter_mut()
            .filter(|c| c.storage() == StorageKind::UniqueIdentifier)
        {
            column.default = if column.primary_key {
                generated.map(String::from)
            } else {
                let field = column.field();
                settings
                    .registry()
                    .lookup(field.semantic(), field.is_nullable())?
                    .default
                    .map(String::from)
            };
        }
        Ok(())
    }

    /// Applies `action` to the named column.
    ///
    /// The exact name is preferred; otherwise the first case-insensitive match.
    pub fn configure_column(
        &mut self,
        name: &str,
        action: impl FnOnce(&mut Column) -> Result<()>,
    ) -> Result<&mut Self> {
        let index = self.position(name)?;
        action(&mut self.columns[index])?;
        Ok(self)
    }

    /// Applies `action` to every column accepted by `filter`.
    pub fn configure_all_columns(
        &mut self,
        mut action: impl FnMut(&mut Column) -> Result<()>,
        filter: impl Fn(&Column) -> bool,
    ) -> Result<&mut Self> {
        for column in self.columns.iter_mut().filter(|c| filter(c)) {
            action(column)?;
        }
        Ok(self)
    }

    fn mapped_fields(&self) -> Vec<&Field> {
        self.columns().map(Column::field).collect()
    }

    fn table_reference(&self) -> String {
        self.settings().dialect().table_reference(M::TABLE)
    }

    /// `[A], [B], [C]`
    pub fn field_names_text(&self) -> String {
        field_names_text(self.settings().dialect(), self.columns().map(Column::field))
    }

    /// `@A, @B, @C`
    pub fn parameter_names_text(&self) -> String {
        parameter_names_text(self.columns().map(Column::field))
    }

    fn key_condition(&self) -> Result<String> {
        if self.primary_key().next().is_none() {
            return Err(TomError::Configuration(format!(
                "table {} has no mapped key column",
                M::TABLE
            )));
        }
        Ok(assignments_text(
            self.settings().dialect(),
            self.primary_key().map(Column::field),
            " AND ",
        ))
    }

    /// `SELECT ... FROM t [WHERE ...] ORDER BY ...`, ordered by the key
    /// unless `order_by` is given.
    pub fn select_text(&self, condition: Option<&str>, order_by: Option<&str>) -> String {
        let mut sql = format!(
            "SELECT {} FROM {}",
            self.field_names_text(),
            self.table_reference()
        );
        if let Some(condition) = condition {
            sql.push_str(" WHERE ");
            sql.push_str(condition);
        }
        let order_by = order_by.map_or_else(
            || field_names_text(self.settings().dialect(), self.primary_key().map(Column::field)),
            String::from,
        );
        if !order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_by);
        }
        sql
    }

    pub fn insert_text(&self) -> String {
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table_reference(),
            self.field_names_text(),
            self.parameter_names_text()
        )
    }

    /// Assigns every mapped non-key column, matching on the key.
    pub fn update_text(&self) -> Result<String> {
        let condition = self.key_condition()?;
        let mut values = self.columns().filter(|c| !c.is_primary_key()).peekable();
        if values.peek().is_none() {
            return Err(TomError::Configuration(format!(
                "table {} has no columns to update",
                M::TABLE
            )));
        }
        let assignments = assignments_text(
            self.settings().dialect(),
            values.map(Column::field),
            ", ",
        );
        Ok(format!(
            "UPDATE {} SET {assignments} WHERE {condition}",
            self.table_reference()
        ))
    }

    pub fn delete_text(&self) -> Result<String> {
        Ok(format!(
            "DELETE FROM {} WHERE {}",
            self.table_reference(),
            self.key_condition()?
        ))
    }

    /// Runs `sql` for every model inside the open unit of work, as one
    /// batch that either applies fully or not at all.
    async fn write(&self, sql: &str, models: &[M]) -> Result<u64> {
        if models.is_empty() {
            return Ok(0);
        }
        let fields = self.mapped_fields();
        let mut work = self.database.work().await?;
        execute_owned(work.connection(), self.settings(), &fields, sql, models).await
    }

    pub async fn add(&self, model: &M) -> Result<u64> {
        self.add_range(std::slice::from_ref(model)).await
    }

    pub async fn add_range(&self, models: &[M]) -> Result<u64> {
        self.write(&self.insert_text(), models).await
    }

    pub async fn update(&self, model: &M) -> Result<u64> {
        self.update_range(std::slice::from_ref(model)).await
    }

    pub async fn update_range(&self, models: &[M]) -> Result<u64> {
        self.write(&self.update_text()?, models).await
    }

    pub async fn remove(&self, model: &M) -> Result<u64> {
        self.remove_range(std::slice::from_ref(model)).await
    }

    pub async fn remove_range(&self, models: &[M]) -> Result<u64> {
        self.write(&self.delete_text()?, models).await
    }

    /// Starts a query over this table.
    pub fn select(&self) -> Select<'_, M> {
        Select::new(self)
    }

    /// Lists rows ordered by `order_by`, or by the key.
    pub async fn list(&self, order_by: Option<&str>, paging: Paging) -> Result<Vec<M>> {
        let mut select = self.select().paging(paging);
        if let Some(order_by) = order_by {
            select = select.order_by(order_by);
        }
        select.list().await
    }

    /// Lists rows matching `condition`, binding its placeholders from
    /// `params`.
    pub async fn list_where(
        &self,
        condition: &str,
        params: Option<&dyn ParameterSource>,
        order_by: Option<&str>,
        paging: Paging,
    ) -> Result<Vec<M>> {
        let mut select = self.select().filter(condition, params).paging(paging);
        if let Some(order_by) = order_by {
            select = select.order_by(order_by);
        }
        select.list().await
    }

    pub async fn single_or_default(
        &self,
        condition: &str,
        params: Option<&dyn ParameterSource>,
    ) -> Result<Option<M>> {
        self.select().filter(condition, params).single_or_default().await
    }

    pub async fn count(&self) -> Result<i64> {
        self.select().count().await
    }

    pub async fn any(&self) -> Result<bool> {
        self.select().any().await
    }

    /// Evaluates `expression` over the whole table, e.g. `MAX([Int])`.
    pub async fn scalar<T: Scalar>(&self, expression: &str) -> Result<T> {
        self.select().scalar(expression).await
    }
}

impl<M: Model> TableMeta for Table<M> {
    fn model_name(&self) -> &'static str {
        M::NAME
    }

    fn table_name(&self) -> &'static str {
        M::TABLE
    }

    fn all_columns(&self) -> &[Column] {
        &self.columns
    }

    fn all_columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }
}

/// A lazy, chainable query over one table.
///
/// Nothing runs until a terminal method is awaited.
pub struct Select<'t, M: Model> {
    table: &'t Table<M>,
    condition: Option<String>,
    params: Option<&'t dyn ParameterSource>,
    order_by: Option<String>,
    paging: Paging,
}

impl<M: Model> Clone for Select<'_, M> {
    fn clone(&self) -> Self {
        Self {
            table: self.table,
            condition: self.condition.clone(),
            params: self.params,
            order_by: self.order_by.clone(),
            paging: self.paging,
        }
    }
}

impl<'t, M: Model> Select<'t, M> {
    fn new(table: &'t Table<M>) -> Self {
        Self {
            table,
            condition: None,
            params: None,
            order_by: None,
            paging: table.settings().paging(),
        }
    }

    /// Adds a WHERE condition.
    ///
    /// Several conditions are combined with AND. `params` replaces any
    /// source given earlier.
    #[must_use]
    pub fn filter(mut self, condition: &str, params: Option<&'t dyn ParameterSource>) -> Self {
        self.condition = Some(match self.condition.take() {
            Some(existing) => format!("({existing}) AND ({condition})"),
            None => condition.to_string(),
        });
        if params.is_some() {
            self.params = params;
        }
        self
    }

    /// Replaces the key ordering.
    #[must_use]
    pub fn order_by(mut self, order_by: &str) -> Self {
        self.order_by = Some(order_by.to_string());
        self
    }

    /// Selects page `page` (from 1) of `page_size` rows.
    #[must_use]
    pub const fn page(mut self, page: u32, page_size: u32) -> Self {
        self.paging = Paging::page(page, page_size);
        self
    }

    #[must_use]
    pub const fn paging(mut self, paging: Paging) -> Self {
        self.paging = paging;
        self
    }

    /// The SELECT text, without paging.
    pub fn text(&self) -> String {
        self.table
            .select_text(self.condition.as_deref(), self.order_by.as_deref())
    }

    fn from_where(&self, projection: &str) -> String {
        let mut sql = format!("SELECT {projection} FROM {}", self.table.table_reference());
        if let Some(condition) = &self.condition {
            sql.push_str(" WHERE ");
            sql.push_str(condition);
        }
        sql
    }

    /// Materializes the selected rows.
    pub async fn list(&self) -> Result<Vec<M>> {
        let fields = self.table.mapped_fields();
        let mut conn = self.table.database.pool().acquire().await?;
        query::list_models(
            &mut conn,
            self.table.settings(),
            &fields,
            &self.text(),
            self.params,
            self.paging,
        )
        .await
    }

    /// The only selected row, `None` when there is none.
    pub async fn single_or_default(&self) -> Result<Option<M>> {
        let mut rows = self.clone().page(1, 2).list().await?;
        match rows.len() {
            0 | 1 => Ok(rows.pop()),
            _ => Err(TomError::MultipleRows { table: M::TABLE }),
        }
    }

    /// Counts the selected rows, ignoring paging.
    pub async fn count(&self) -> Result<i64> {
        self.scalar("COUNT(*)").await
    }

    pub async fn any(&self) -> Result<bool> {
        Ok(self.count().await? > 0)
    }

    /// Evaluates `expression` over the selected rows, ignoring paging.
    pub async fn scalar<T: Scalar>(&self, expression: &str) -> Result<T> {
        let mut conn = self.table.database.pool().acquire().await?;
        query::scalar(
            &mut conn,
            self.table.settings(),
            &self.from_where(expression),
            self.params,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::SqlServerDialect;
    use crate::mapping::SemanticType;
    use crate::value::Value;
    use sqlx::sqlite::SqlitePoolOptions;

    #[derive(Debug, Default, Clone)]
    struct Entry {
        id: uuid::Uuid,
        title: String,
        owner: Option<String>,
    }

    impl ParameterSource for Entry {
        fn parameter(&self, name: &str) -> Result<Option<Value>> {
            <Self as Model>::FIELDS
                .iter()
                .find(|f| f.name.eq_ignore_ascii_case(name))
                .map(|f| self.get(f.name))
                .transpose()
        }
    }

    impl Model for Entry {
        const NAME: &'static str = "Entry";
        const TABLE: &'static str = "Entry";
        const FIELDS: &'static [FieldDef] = &[
            FieldDef {
                name: "Id",
                semantic: SemanticType::Uuid,
                nullable: false,
                type_name: "Uuid",
                primary_key: false,
            },
            FieldDef {
                name: "Title",
                semantic: SemanticType::Text,
                nullable: false,
                type_name: "String",
                primary_key: false,
            },
            FieldDef {
                name: "Owner",
                semantic: SemanticType::Object,
                nullable: true,
                type_name: "Entry",
                primary_key: false,
            },
        ];

        fn get(&self, name: &str) -> Result<Value> {
            match name {
                "Id" => Ok(Value::Uuid(self.id)),
                "Title" => Ok(Value::Text(self.title.clone())),
                "Owner" => Ok(self.owner.clone().into()),
                _ => Err(TomError::FieldNotFound(name.to_string())),
            }
        }

        fn set(&mut self, name: &str, value: Value) -> Result<()> {
            match (name, value) {
                ("Id", Value::Uuid(v)) => self.id = v,
                ("Title", Value::Text(v)) => self.title = v,
                ("Owner", Value::Null) => self.owner = None,
                ("Owner", Value::Object(serde_json::Value::String(v))) => self.owner = Some(v),
                (other, _) => return Err(TomError::FieldNotFound(other.to_string())),
            }
            Ok(())
        }
    }

    async fn create_test_database(settings: Settings) -> Arc<Database> {
        let pool = SqlitePoolOptions::new()
            .connect(":memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");
        Arc::new(Database::new(pool, settings))
    }

    #[tokio::test]
    async fn test_first_field_is_key() {
        let database = create_test_database(Settings::new()).await;
        let table = Table::<Entry>::new(&database).unwrap();

        let keys: Vec<&str> = table.primary_key().map(Column::name).collect();
        assert_eq!(keys, ["Id"]);
        let id = table.columns().next().unwrap();
        assert_eq!(
            id.default_value(),
            database.settings().dialect().uuid_default()
        );
    }

    #[tokio::test]
    async fn test_generated_text() {
        let settings = Settings::new().with_dialect(SqlServerDialect::new());
        let database = create_test_database(settings).await;
        let mut table = Table::<Entry>::new(&database).unwrap();
        bind_tables(&mut [&mut table]);

        assert_eq!(table.unmapped_columns().count(), 1);
        assert_eq!(
            table.select_text(None, None),
            "SELECT [Id], [Title] FROM dbo.[Entry] ORDER BY [Id]"
        );
        assert_eq!(
            table.select_text(Some("[Title] = @Title"), Some("[Title] DESC")),
            "SELECT [Id], [Title] FROM dbo.[Entry] WHERE [Title] = @Title ORDER BY [Title] DESC"
        );
        assert_eq!(
            table.insert_text(),
            "INSERT INTO dbo.[Entry] ([Id], [Title]) VALUES (@Id, @Title)"
        );
        assert_eq!(
            table.update_text().unwrap(),
            "UPDATE dbo.[Entry] SET [Title] = @Title WHERE [Id] = @Id"
        );
        assert_eq!(
            table.delete_text().unwrap(),
            "DELETE FROM dbo.[Entry] WHERE [Id] = @Id"
        );
        assert_eq!(
            table.columns().next().unwrap().default_value(),
            Some("(newid())")
        );
    }

    #[tokio::test]
    async fn test_set_primary_key() {
        let database = create_test_database(Settings::new()).await;
        let mut table = Table::<Entry>::new(&database).unwrap();
        table.set_primary_key(&["title"]).unwrap();

        assert_eq!(
            table.update_text().unwrap(),
            "UPDATE [Entry] SET [Id] = @Id, [Owner] = @Owner WHERE [Title] = @Title"
        );
        let id = table.columns().next().unwrap();
        assert_eq!(
            id.default_value(),
            Some("('00000000-0000-0000-0000-000000000000')")
        );

        assert!(table.set_primary_key(&[]).unwrap_err().is_configuration());
        assert!(matches!(
            table.set_primary_key(&["Nope"]),
            Err(TomError::FieldNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_configure_columns() {
        let database = create_test_database(Settings::new()).await;
        let mut table = Table::<Entry>::new(&database).unwrap();
        table
            .configure_all_columns(
                |c| {
                    c.secure();
                    Ok(())
                },
                |c| !c.is_primary_key(),
            )
            .unwrap();

        let title = &table.all_columns()[1];
        assert!(title.is_secure());
        assert_eq!(title.storage(), StorageKind::VarBinary);
        assert_eq!(title.arguments(), Some("(max)"));
        assert_eq!(title.default_value(), None);
        assert!(!table.all_columns()[0].is_secure());

        let err = table.configure_column("Missing", |_| Ok(())).unwrap_err();
        assert!(matches!(err, TomError::FieldNotFound(ref n) if n == "Entry.Missing"));
    }

    #[tokio::test]
    async fn test_empty_range_needs_no_work() {
        let database = create_test_database(Settings::new()).await;
        let table = Table::<Entry>::new(&database).unwrap();
        assert_eq!(table.add_range(&[]).await.unwrap(), 0);
        assert!(!database.has_work().await);
    }
}
