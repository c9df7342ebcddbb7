//! Query execution: parameter binding, paging and row materialization.

use futures::TryStreamExt;
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{Column, Row, SqliteConnection};
use tracing::debug;

use crate::dialect::{Dialect, PAGE_PARAMETER, PAGE_SIZE_PARAMETER};
use crate::driver;
use crate::error::{Result, TomError};
use crate::field::Field;
use crate::model::Model;
use crate::params::{ParameterSource, Statement};
use crate::settings::Settings;
use crate::value::Value;

/// Page size used when none is given.
pub const DEFAULT_PAGE_SIZE: u32 = 25;

/// Which window of a result set to return.
///
/// Page numbers start at 1. Page 0 returns every row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub page: u32,
    pub page_size: u32,
}

impl Default for Paging {
    fn default() -> Self {
        Self::all()
    }
}

impl Paging {
    /// Every row, no windowing.
    pub const fn all() -> Self {
        Self {
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Rows `(page - 1) * page_size + 1 ..= page * page_size`.
    pub const fn page(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    pub const fn is_paged(&self) -> bool {
        self.page > 0
    }

    fn parameters(self) -> [(&'static str, Value); 2] {
        let clamp = |n: u32| Value::Int(i32::try_from(n).unwrap_or(i32::MAX));
        [
            (PAGE_PARAMETER, clamp(self.page)),
            (PAGE_SIZE_PARAMETER, clamp(self.page_size)),
        ]
    }
}

/// A type a scalar query can return.
pub trait Scalar: for<'r> sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite> + Send + Unpin {}

impl<T> Scalar for T where T: for<'r> sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite> + Send + Unpin {}

/// Appends the dialect's paging clause when `paging` selects a page.
pub fn paged(query: &str, paging: Paging, dialect: &dyn Dialect) -> String {
    if paging.is_paged() {
        format!("{query} {}", dialect.paging_clause())
    } else {
        query.to_string()
    }
}

/// Runs a query and materializes each row into a new `M`.
///
/// Columns are matched to mapped fields by exact name; columns without a
/// matching field are ignored.
pub async fn list_models<M: Model>(
    conn: &mut SqliteConnection,
    settings: &Settings,
    fields: &[&Field],
    query: &str,
    params: Option<&dyn ParameterSource>,
    paging: Paging,
) -> Result<Vec<M>> {
    let dialect = settings.dialect();
    let statement = Statement::parse(&paged(query, paging, dialect), dialect);
    let page_parameters = paging.parameters();
    let extra: &[(&str, Value)] = if paging.is_paged() {
        &page_parameters
    } else {
        &[]
    };
    let values = statement.resolve(params, extra)?;
    debug!(sql = %statement.text(), parameters = values.len(), "Executing query");

    let args = driver::arguments(values)?;
    let mut rows = sqlx::query_with(statement.text(), args).fetch(&mut *conn);
    let mut plan: Option<Vec<(usize, &Field)>> = None;
    let mut models = Vec::new();

    while let Some(row) = rows
        .try_next()
        .await
        .map_err(|e| classify(e, paging, dialect))?
    {
        let plan = plan.get_or_insert_with(|| match_columns(&row, fields));
        let mut model = M::default();
        for &(index, field) in plan.iter() {
            let stored = driver::decode(&row, index, field.storage())?;
            let value = field.from_storage(stored, settings.encryptor())?;
            model.set(field.name(), value)?;
        }
        models.push(model);
    }

    debug!(table = M::TABLE, rows = models.len(), "Materialized rows");
    Ok(models)
}

/// Runs a query returning a single value.
pub async fn scalar<T: Scalar>(
    conn: &mut SqliteConnection,
    settings: &Settings,
    query: &str,
    params: Option<&dyn ParameterSource>,
) -> Result<T> {
    let statement = Statement::parse(query, settings.dialect());
    let values = statement.resolve(params, &[])?;
    debug!(sql = %statement.text(), parameters = values.len(), "Executing scalar");

    let args = driver::arguments(values)?;
    Ok(sqlx::query_scalar_with::<_, T, _>(statement.text(), args)
        .fetch_one(&mut *conn)
        .await?)
}

fn match_columns<'f>(row: &SqliteRow, fields: &[&'f Field]) -> Vec<(usize, &'f Field)> {
    row.columns()
        .iter()
        .enumerate()
        .filter_map(|(index, column)| {
            fields
                .iter()
                .find(|f| f.is_mapped() && f.name() == column.name())
                .map(|f| (index, *f))
        })
        .collect()
}

fn classify(error: sqlx::Error, paging: Paging, dialect: &dyn Dialect) -> TomError {
    if paging.is_paged() && dialect.is_missing_order_by(&error) {
        TomError::MissingOrderBy(error)
    } else {
        TomError::Database(error)
    }
}
