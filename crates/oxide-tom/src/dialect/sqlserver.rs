//! SQL Server dialect: `dbo.[Table]`, `@Name` parameters, OFFSET/FETCH paging.

use super::{ColumnDef, Dialect, PAGE_PARAMETER, PAGE_SIZE_PARAMETER};
use crate::mapping::StorageKind;

const MISSING_ORDER_BY: &str = "Invalid usage of the option NEXT in the FETCH statement";

/// SQL Server dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

impl SqlServerDialect {
    /// Creates a new SQL Server dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn table_reference(&self, table: &str) -> String {
        format!("dbo.{}", self.quote_identifier(table))
    }

    fn placeholder(&self, _index: usize, name: &str) -> String {
        format!("@{name}")
    }

    fn paging_clause(&self) -> String {
        format!(
            "OFFSET ((@{PAGE_PARAMETER} - 1) * @{PAGE_SIZE_PARAMETER}) ROWS \
             FETCH NEXT @{PAGE_SIZE_PARAMETER} ROWS ONLY"
        )
    }

    fn column_type(&self, storage: StorageKind, arguments: Option<&str>) -> String {
        format!("[{}]{}", storage.sql_name(), arguments.unwrap_or_default())
    }

    fn uuid_default(&self) -> Option<&'static str> {
        Some("(newid())")
    }

    fn is_missing_order_by(&self, error: &sqlx::Error) -> bool {
        error.to_string().contains(MISSING_ORDER_BY)
    }

    fn schema_preamble(&self) -> String {
        format!(
            "-- Generated {}\n\nSET ANSI_NULLS ON\nSET QUOTED_IDENTIFIER ON\nSET ANSI_PADDING ON\nGO\n",
            chrono::Utc::now().to_rfc3339()
        )
    }

    fn statement_terminator(&self) -> &'static str {
        "\n"
    }

    fn column_definition(&self, table: &str, column: &ColumnDef<'_>) -> String {
        let mut sql = format!(
            "[{}] {} {}",
            column.name,
            self.column_type(column.storage, column.arguments),
            if column.nullable { "NULL" } else { "NOT NULL" }
        );
        if let Some(default) = column.default {
            sql.push_str(&format!(
                " CONSTRAINT [DF_{table}_{}] DEFAULT {default}",
                column.name
            ));
        }
        sql
    }

    fn create_table(&self, table: &str, columns: &[ColumnDef<'_>], primary_key: &[&str]) -> String {
        let fields: Vec<String> = columns
            .iter()
            .map(|c| self.column_definition(table, c))
            .collect();
        format!(
            "CREATE TABLE [dbo].[{table}] (\n    {},\n    \
             CONSTRAINT [PK_{table}] PRIMARY KEY CLUSTERED (\n        {}\n    )\n    \
             WITH (\n        PAD_INDEX = OFF,\n        STATISTICS_NORECOMPUTE = OFF,\n        \
             IGNORE_DUP_KEY = OFF,\n        ALLOW_ROW_LOCKS = ON,\n        \
             ALLOW_PAGE_LOCKS = ON\n    ) ON [PRIMARY]\n) ON [PRIMARY]\nGO",
            fields.join(",\n    "),
            primary_key.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_references() {
        let dialect = SqlServerDialect::new();
        assert_eq!(dialect.table_reference("Foo"), "dbo.[Foo]");
        assert_eq!(dialect.quote_identifier("Name"), "[Name]");
        assert_eq!(dialect.placeholder(1, "Name"), "@Name");
    }

    #[test]
    fn test_paging_clause() {
        assert_eq!(
            SqlServerDialect::new().paging_clause(),
            "OFFSET ((@ListCurrentPage - 1) * @ListPageSize) ROWS FETCH NEXT @ListPageSize ROWS ONLY"
        );
    }

    #[test]
    fn test_column_definition() {
        let dialect = SqlServerDialect::new();
        let column = ColumnDef {
            name: "Id",
            storage: StorageKind::UniqueIdentifier,
            arguments: None,
            nullable: false,
            default: Some("(newid())"),
        };
        assert_eq!(
            dialect.column_definition("Foo", &column),
            "[Id] [uniqueidentifier] NOT NULL CONSTRAINT [DF_Foo_Id] DEFAULT (newid())"
        );

        let column = ColumnDef {
            name: "Name",
            storage: StorageKind::NVarChar,
            arguments: Some("(100)"),
            nullable: true,
            default: None,
        };
        assert_eq!(
            dialect.column_definition("Foo", &column),
            "[Name] [nvarchar](100) NULL"
        );
    }

    #[test]
    fn test_create_table() {
        let dialect = SqlServerDialect::new();
        let columns = [ColumnDef {
            name: "Id",
            storage: StorageKind::Int,
            arguments: None,
            nullable: false,
            default: Some("(0)"),
        }];
        let sql = dialect.create_table("Foo", &columns, &["Id"]);
        assert!(sql.starts_with("CREATE TABLE [dbo].[Foo] (\n    [Id] [int] NOT NULL"));
        assert!(sql.contains("CONSTRAINT [PK_Foo] PRIMARY KEY CLUSTERED (\n        Id\n    )"));
        assert!(sql.ends_with(") ON [PRIMARY]\nGO"));
    }

    #[test]
    fn test_missing_order_by() {
        let dialect = SqlServerDialect::new();
        let error = sqlx::Error::Protocol(
            "Invalid usage of the option NEXT in the FETCH statement.".into(),
        );
        assert!(dialect.is_missing_order_by(&error));
        assert!(!dialect.is_missing_order_by(&sqlx::Error::RowNotFound));
    }
}
