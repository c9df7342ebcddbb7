//! The database root that tables share.
//!
//! A [`Database`] owns the connection pool, the settings and at most one
//! open [`Work`]. Table writes request the work lazily and accumulate in
//! it until [`Database::commit`]; reads take their own pooled connection
//! and release it on return.

use std::sync::Arc;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::command::{execute_owned, Command};
use crate::driver;
use crate::error::{Result, TomError};
use crate::field::Field;
use crate::model::Model;
use crate::params::{ParameterSource, Statement};
use crate::query::{self, Paging, Scalar};
use crate::settings::{Config, Settings};
use crate::work::Work;

/// Owner of the pool, the settings and the current unit of work.
#[derive(Debug)]
pub struct Database {
    pool: SqlitePool,
    settings: Arc<Settings>,
    work: Mutex<Option<Work>>,
}

impl Database {
    /// Wraps an existing pool.
    pub fn new(pool: SqlitePool, settings: Settings) -> Self {
        Self {
            pool,
            settings: Arc::new(settings),
            work: Mutex::new(None),
        }
    }

    /// Connects to a database URL such as `sqlite://tom.db?mode=rwc`.
    ///
    /// Fails with a configuration error when the settings select a dialect
    /// the SQLite executor cannot run.
    pub async fn connect(settings: Settings, url: &str) -> Result<Self> {
        ensure_executable(&settings)?;
        debug!(dialect = settings.dialect().name(), "Connecting");
        let pool = SqlitePoolOptions::new().connect(url).await?;
        Ok(Self::new(pool, settings))
    }

    /// Connects with explicit SQLite options.
    pub async fn connect_with(settings: Settings, options: SqliteConnectOptions) -> Result<Self> {
        ensure_executable(&settings)?;
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Ok(Self::new(pool, settings))
    }

    /// Connects using a config document; `name_or_literal` is looked up in
    /// its connection strings and used verbatim when absent.
    pub async fn from_config(config: &Config, name_or_literal: &str) -> Result<Self> {
        let settings = config.settings()?;
        Self::connect(settings, config.connection_string(name_or_literal)).await
    }

    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub(crate) fn shared_settings(&self) -> Arc<Settings> {
        Arc::clone(&self.settings)
    }

    /// Returns the open unit of work, beginning one if none is open.
    pub async fn work(&self) -> Result<MappedMutexGuard<'_, Work>> {
        let mut slot = self.work.lock().await;
        if slot.is_none() {
            *slot = Some(Work::begin(&self.pool).await?);
        }
        MutexGuard::try_map(slot, Option::as_mut).map_err(|_| TomError::NoOpenWork)
    }

    /// Whether a unit of work is open.
    pub async fn has_work(&self) -> bool {
        self.work.lock().await.is_some()
    }

    /// Commits the open unit of work.
    pub async fn commit(&self) -> Result<()> {
        let work = self.work.lock().await.take().ok_or(TomError::NoOpenWork)?;
        work.commit().await
    }

    /// Rolls back the open unit of work, if any.
    pub async fn dispose(&self) -> Result<()> {
        let work = self.work.lock().await.take();
        match work {
            Some(work) => work.dispose().await,
            None => Ok(()),
        }
    }

    /// Runs a statement once, outside any unit of work.
    pub async fn execute(&self, sql: &str) -> Result<u64> {
        let statement = Statement::parse(sql, self.settings.dialect());
        let args = driver::arguments(statement.resolve(None, &[])?)?;
        debug!(sql = %statement.text(), "Executing statement");
        let result = sqlx::query_with(statement.text(), args)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Runs a statement once per model in its own transaction.
    pub async fn execute_with<M: Model>(&self, sql: &str, models: &[M]) -> Result<u64> {
        let fields = Field::create_fields_from_type::<M>(self.settings.registry())?;
        let fields: Vec<&Field> = fields.iter().filter(|f| f.is_mapped()).collect();
        let mut conn = self.pool.acquire().await?;
        execute_owned(&mut conn, &self.settings, &fields, sql, models).await
    }

    /// Materializes any model from an arbitrary query.
    pub async fn list<M: Model>(
        &self,
        sql: &str,
        params: Option<&dyn ParameterSource>,
        paging: Paging,
    ) -> Result<Vec<M>> {
        let command = Command::<M>::new(self.shared_settings())?;
        let mut conn = self.pool.acquire().await?;
        command.list(&mut conn, sql, params, paging).await
    }

    /// Runs a query returning one value.
    pub async fn scalar<T: Scalar>(
        &self,
        sql: &str,
        params: Option<&dyn ParameterSource>,
    ) -> Result<T> {
        let mut conn = self.pool.acquire().await?;
        query::scalar(&mut conn, &self.settings, sql, params).await
    }

    /// Runs a counting query.
    pub async fn scalar_int(&self, sql: &str, params: Option<&dyn ParameterSource>) -> Result<i64> {
        self.scalar(sql, params).await
    }

    /// Closes the pool after rolling back any open work.
    pub async fn close(&self) -> Result<()> {
        self.dispose().await?;
        self.pool.close().await;
        info!("Closed database");
        Ok(())
    }
}

fn ensure_executable(settings: &Settings) -> Result<()> {
    let dialect = settings.dialect();
    if dialect.executable() {
        Ok(())
    } else {
        Err(TomError::Configuration(format!(
            "the {} dialect only renders SQL text and cannot be connected",
            dialect.name()
        )))
    }
}
