//! SQL dialect support.
//!
//! Every piece of generated SQL text goes through a [`Dialect`]: identifier
//! quoting, table references, the placeholder handed to the driver, paging,
//! column types and `CREATE TABLE` statements. [`SqliteDialect`] produces SQL
//! the bundled SQLite executor runs; [`SqlServerDialect`] produces T-SQL.

mod sqlite;
mod sqlserver;

use std::fmt;

pub use sqlite::SqliteDialect;
pub use sqlserver::SqlServerDialect;

use crate::mapping::StorageKind;

/// Name of the bound parameter carrying the 1-based page number.
pub const PAGE_PARAMETER: &str = "ListCurrentPage";
/// Name of the bound parameter carrying the page size.
pub const PAGE_SIZE_PARAMETER: &str = "ListPageSize";

/// What the DDL writer needs to know about one column.
#[derive(Debug, Clone, Copy)]
pub struct ColumnDef<'a> {
    pub name: &'a str,
    pub storage: StorageKind,
    pub arguments: Option<&'a str>,
    pub nullable: bool,
    pub default: Option<&'a str>,
}

/// Trait for SQL dialect-specific behavior.
pub trait Dialect: Send + Sync + fmt::Debug {
    /// Returns the name of the dialect.
    fn name(&self) -> &'static str;

    /// Quotes an identifier in brackets.
    fn quote_identifier(&self, name: &str) -> String {
        format!("[{name}]")
    }

    /// Returns the reference used for a table in DML.
    fn table_reference(&self, table: &str) -> String {
        self.quote_identifier(table)
    }

    /// Returns the driver-side placeholder for the `index`th (1-based)
    /// distinct parameter, named `name`.
    fn placeholder(&self, index: usize, name: &str) -> String;

    /// Returns the windowing clause appended to paged queries, written
    /// with `@` parameters.
    fn paging_clause(&self) -> String;

    /// Returns the column type for a storage kind.
    fn column_type(&self, storage: StorageKind, arguments: Option<&str>) -> String;

    /// Whether the bundled SQLite executor runs this dialect's SQL.
    fn executable(&self) -> bool {
        false
    }

    /// Returns a server-side UUID generation expression, if the dialect has one.
    fn uuid_default(&self) -> Option<&'static str> {
        None
    }

    /// Returns whether a driver error means a paged query lacks ORDER BY.
    fn is_missing_order_by(&self, _error: &sqlx::Error) -> bool {
        false
    }

    /// Renders a registry default literal the way values are stored.
    fn default_literal(&self, _storage: StorageKind, literal: &str) -> String {
        literal.to_string()
    }

    /// Statements emitted once before the tables of a schema.
    fn schema_preamble(&self) -> String {
        String::new()
    }

    /// Text placed after each generated statement in a schema script.
    fn statement_terminator(&self) -> &'static str {
        ";\n"
    }

    /// Generates one column definition.
    fn column_definition(&self, _table: &str, column: &ColumnDef<'_>) -> String {
        let mut sql = format!(
            "{} {} {}",
            self.quote_identifier(column.name),
            self.column_type(column.storage, column.arguments),
            if column.nullable { "NULL" } else { "NOT NULL" }
        );
        if let Some(default) = column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.default_literal(column.storage, default));
        }
        sql
    }

    /// Generates SQL for CREATE TABLE.
    fn create_table(&self, table: &str, columns: &[ColumnDef<'_>], primary_key: &[&str]) -> String {
        let mut sql = String::from("CREATE TABLE ");
        sql.push_str(&self.table_reference(table));
        sql.push_str(" (\n");

        let column_defs: Vec<String> = columns
            .iter()
            .map(|c| format!("    {}", self.column_definition(table, c)))
            .collect();
        sql.push_str(&column_defs.join(",\n"));

        if !primary_key.is_empty() {
            let key: Vec<String> = primary_key
                .iter()
                .map(|name| self.quote_identifier(name))
                .collect();
            sql.push_str(",\n    CONSTRAINT ");
            sql.push_str(&self.quote_identifier(&format!("PK_{table}")));
            sql.push_str(" PRIMARY KEY (");
            sql.push_str(&key.join(", "));
            sql.push(')');
        }

        sql.push_str("\n)");
        sql
    }
}
