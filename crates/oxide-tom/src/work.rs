//! The unit of work: one connection and one open transaction.

use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::info;

use crate::error::Result;

/// An open transaction that table writes accumulate in.
///
/// Finished by [`Work::commit`] or [`Work::dispose`]. Dropping it without
/// either rolls the transaction back.
#[derive(Debug)]
pub struct Work {
    transaction: Transaction<'static, Sqlite>,
}

impl Work {
    /// Takes a pooled connection and begins a transaction on it.
    pub async fn begin(pool: &SqlitePool) -> Result<Self> {
        let transaction = pool.begin().await?;
        info!("Opened unit of work");
        Ok(Self { transaction })
    }

    /// The connection writes go through.
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.transaction
    }

    pub fn transaction(&mut self) -> &mut Transaction<'static, Sqlite> {
        &mut self.transaction
    }

    /// Commits everything written and releases the connection.
    pub async fn commit(self) -> Result<()> {
        self.transaction.commit().await?;
        info!("Committed unit of work");
        Ok(())
    }

    /// Discards everything written and releases the connection.
    pub async fn dispose(self) -> Result<()> {
        self.transaction.rollback().await?;
        info!("Rolled back unit of work");
        Ok(())
    }
}
