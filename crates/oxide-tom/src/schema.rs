//! DDL generation from mapped tables.

use tracing::debug;

use crate::dialect::{ColumnDef, Dialect};
use crate::table::{Column, TableMeta};

/// Writes `CREATE TABLE` scripts for mapped tables.
#[derive(Debug, Clone, Copy)]
pub struct SchemaGenie<'d> {
    dialect: &'d dyn Dialect,
}

impl<'d> SchemaGenie<'d> {
    pub const fn new(dialect: &'d dyn Dialect) -> Self {
        Self { dialect }
    }

    /// The dialect preamble followed by every table.
    pub fn create_schema(&self, tables: &[&dyn TableMeta]) -> String {
        let mut sql = self.dialect.schema_preamble();
        for table in tables {
            if !sql.is_empty() {
                sql.push('\n');
            }
            sql.push_str(&self.create_table(*table));
            sql.push_str(self.dialect.statement_terminator());
        }
        debug!(tables = tables.len(), "Generated schema");
        sql
    }

    /// One `CREATE TABLE` statement over the mapped columns.
    pub fn create_table(&self, table: &dyn TableMeta) -> String {
        let columns: Vec<&Column> = table
            .all_columns()
            .iter()
            .filter(|c| c.is_mapped())
            .collect();
        let definitions: Vec<ColumnDef<'_>> = columns.iter().map(|c| c.definition()).collect();
        let key: Vec<&str> = columns
            .iter()
            .filter(|c| c.is_primary_key())
            .map(|c| c.name())
            .collect();
        self.dialect
            .create_table(table.table_name(), &definitions, &key)
    }

    /// One column definition.
    pub fn create_field(&self, table: &dyn TableMeta, column: &Column) -> String {
        self.dialect
            .column_definition(table.table_name(), &column.definition())
    }
}
