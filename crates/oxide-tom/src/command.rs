//! Batched command execution.
//!
//! A [`Command`] runs one SQL statement once per model instance, binding
//! the instance's field values to the statement's `@Name` placeholders. The
//! whole batch shares one transaction: either the caller's, or one the
//! command opens, commits once at the end and rolls back on any error.

use std::marker::PhantomData;
use std::sync::Arc;

use sqlx::{Connection, Sqlite, SqliteConnection, Transaction};
use tracing::{debug, warn};

use crate::driver;
use crate::error::{Result, TomError};
use crate::field::Field;
use crate::model::Model;
use crate::params::{ParameterSource, Statement};
use crate::query::{self, Paging, Scalar};
use crate::settings::Settings;
use crate::value::SqlValue;

/// One field bound to one parameter slot, refilled for every instance.
#[derive(Debug)]
pub struct ExecutionParameter<'f> {
    field: &'f Field,
    value: SqlValue,
}

impl<'f> ExecutionParameter<'f> {
    /// Creates one slot per mapped field.
    pub fn create(fields: &[&'f Field]) -> Vec<Self> {
        fields
            .iter()
            .filter(|f| f.is_mapped())
            .map(|&field| Self {
                field,
                value: SqlValue::Null,
            })
            .collect()
    }

    /// Refills every slot from `model`.
    pub fn update_values<M: Model>(
        parameters: &mut [Self],
        model: &M,
        settings: &Settings,
    ) -> Result<()> {
        for parameter in parameters {
            parameter.refill(model, settings)?;
        }
        Ok(())
    }

    /// Refills only the slots at `slots`.
    pub fn update_slots<M: Model>(
        parameters: &mut [Self],
        slots: &[usize],
        model: &M,
        settings: &Settings,
    ) -> Result<()> {
        for &slot in slots {
            if let Some(parameter) = parameters.get_mut(slot) {
                parameter.refill(model, settings)?;
            }
        }
        Ok(())
    }

    fn refill<M: Model>(&mut self, model: &M, settings: &Settings) -> Result<()> {
        let value = model.get(self.field.name())?;
        self.value = self.field.to_storage(value, settings.encryptor())?;
        Ok(())
    }

    pub const fn field(&self) -> &'f Field {
        self.field
    }

    pub const fn value(&self) -> &SqlValue {
        &self.value
    }
}

/// Runs `sql` for each model inside `tx`; never commits.
pub(crate) async fn execute_batch<M: Model>(
    tx: &mut SqliteConnection,
    settings: &Settings,
    fields: &[&Field],
    sql: &str,
    models: &[M],
) -> Result<u64> {
    let statement = Statement::parse(sql, settings.dialect());

    if models.is_empty() {
        debug!(sql = %statement.text(), "Executing command");
        let args = driver::arguments(statement.resolve(None, &[])?)?;
        let result = sqlx::query_with(statement.text(), args).execute(&mut *tx).await?;
        return Ok(result.rows_affected());
    }

    let mut parameters = ExecutionParameter::create(fields);
    let slots = statement
        .parameters()
        .iter()
        .map(|name| {
            parameters
                .iter()
                .position(|p| p.field.name().eq_ignore_ascii_case(name))
                .ok_or_else(|| TomError::MissingParameter(name.clone()))
        })
        .collect::<Result<Vec<usize>>>()?;

    debug!(sql = %statement.text(), rows = models.len(), "Executing batch");
    let mut affected = 0;
    for model in models {
        ExecutionParameter::update_slots(&mut parameters, &slots, model, settings)?;
        let values = slots.iter().map(|&i| parameters[i].value.clone()).collect();
        let args = driver::arguments(values)?;
        let result = sqlx::query_with(statement.text(), args).execute(&mut *tx).await?;
        affected += result.rows_affected();
    }
    Ok(affected)
}

/// Runs `sql` for each model in a transaction of its own.
pub(crate) async fn execute_owned<M: Model>(
    conn: &mut SqliteConnection,
    settings: &Settings,
    fields: &[&Field],
    sql: &str,
    models: &[M],
) -> Result<u64> {
    let mut tx = conn.begin().await?;
    match execute_batch(&mut tx, settings, fields, sql, models).await {
        Ok(affected) => {
            tx.commit().await?;
            Ok(affected)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "Rollback failed");
            }
            Err(e)
        }
    }
}

/// Field list of a model bound to settings, with SQL text helpers and
/// batch execution.
#[derive(Debug)]
pub struct Command<M: Model> {
    fields: Vec<Field>,
    settings: Arc<Settings>,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Model> Clone for Command<M> {
    fn clone(&self) -> Self {
        Self {
            fields: self.fields.clone(),
            settings: Arc::clone(&self.settings),
            _marker: PhantomData,
        }
    }
}

impl<M: Model> Command<M> {
    /// Derives the fields of `M` from the settings' registry.
    pub fn new(settings: Arc<Settings>) -> Result<Self> {
        let fields = Field::create_fields_from_type::<M>(settings.registry())?;
        Ok(Self::with_fields(settings, fields))
    }

    pub const fn with_fields(settings: Arc<Settings>, fields: Vec<Field>) -> Self {
        Self {
            fields,
            settings,
            _marker: PhantomData,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Mapped fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_mapped())
    }

    pub fn unmapped_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| !f.is_mapped())
    }

    pub fn all_fields(&self) -> &[Field] {
        &self.fields
    }

    /// Applies `action` to the named field.
    ///
    /// The exact name is preferred; otherwise the first case-insensitive match.
    pub fn configure_field(
        &mut self,
        name: &str,
        action: impl FnOnce(&mut Field) -> Result<()>,
    ) -> Result<&mut Self> {
        let index = self
            .fields
            .iter()
            .position(|f| f.name() == name)
            .or_else(|| {
                self.fields
                    .iter()
                    .position(|f| f.name().eq_ignore_ascii_case(name))
            })
            .ok_or_else(|| TomError::FieldNotFound(format!("{}.{name}", M::NAME)))?;
        action(&mut self.fields[index])?;
        Ok(self)
    }

    /// Applies `action` to every field accepted by `filter`.
    pub fn configure_all_fields(
        &mut self,
        mut action: impl FnMut(&mut Field) -> Result<()>,
        filter: impl Fn(&Field) -> bool,
    ) -> Result<&mut Self> {
        for field in self.fields.iter_mut().filter(|f| filter(f)) {
            action(field)?;
        }
        Ok(self)
    }

    /// `[A], [B], [C]`
    pub fn field_names_text(&self) -> String {
        field_names_text(self.settings.dialect(), self.fields())
    }

    /// `@A, @B, @C`
    pub fn parameter_names_text(&self) -> String {
        parameter_names_text(self.fields())
    }

    /// `[A] = @A, [B] = @B`
    pub fn update_fields_text(&self) -> String {
        assignments_text(self.settings.dialect(), self.fields(), ", ")
    }

    fn mapped(&self) -> Vec<&Field> {
        self.fields().collect()
    }

    /// Runs `sql` for each of `models` in a transaction the command owns.
    ///
    /// With no models, `sql` runs once without parameters.
    pub async fn execute(&self, conn: &mut SqliteConnection, sql: &str, models: &[M]) -> Result<u64> {
        execute_owned(conn, &self.settings, &self.mapped(), sql, models).await
    }

    /// Runs `sql` for each of `models` in the caller's transaction.
    pub async fn execute_in(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        sql: &str,
        models: &[M],
    ) -> Result<u64> {
        execute_batch(&mut **tx, &self.settings, &self.mapped(), sql, models).await
    }

    /// Runs a query and materializes its rows.
    pub async fn list(
        &self,
        conn: &mut SqliteConnection,
        query: &str,
        params: Option<&dyn ParameterSource>,
        paging: Paging,
    ) -> Result<Vec<M>> {
        query::list_models(conn, &self.settings, &self.mapped(), query, params, paging).await
    }

    /// Runs a query returning one value.
    pub async fn scalar<T: Scalar>(
        &self,
        conn: &mut SqliteConnection,
        query: &str,
        params: Option<&dyn ParameterSource>,
    ) -> Result<T> {
        query::scalar(conn, &self.settings, query, params).await
    }
}

pub(crate) fn field_names_text<'a>(
    dialect: &dyn crate::dialect::Dialect,
    fields: impl Iterator<Item = &'a Field>,
) -> String {
    fields
        .map(|f| dialect.quote_identifier(f.name()))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn parameter_names_text<'a>(fields: impl Iterator<Item = &'a Field>) -> String {
    fields
        .map(|f| format!("@{}", f.name()))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn assignments_text<'a>(
    dialect: &dyn crate::dialect::Dialect,
    fields: impl Iterator<Item = &'a Field>,
    separator: &str,
) -> String {
    fields
        .map(|f| format!("{} = @{}", dialect.quote_identifier(f.name()), f.name()))
        .collect::<Vec<_>>()
        .join(separator)
}
