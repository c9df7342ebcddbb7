//! SQLite dialect, the one the bundled executor runs.

use super::{Dialect, PAGE_PARAMETER, PAGE_SIZE_PARAMETER};
use crate::driver;
use crate::mapping::StorageKind;
use crate::value::DATETIME_FORMAT;

/// Random version 4 UUID in canonical lower-case text form.
const UUID_DEFAULT: &str = "(lower(hex(randomblob(4))) || '-' || lower(hex(randomblob(2))) \
     || '-4' || substr(lower(hex(randomblob(2))), 2) || '-' \
     || substr('89ab', 1 + (abs(random()) % 4), 1) || substr(lower(hex(randomblob(2))), 2) \
     || '-' || lower(hex(randomblob(6))))";

/// SQLite dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn placeholder(&self, index: usize, _name: &str) -> String {
        format!("?{index}")
    }

    fn paging_clause(&self) -> String {
        format!(
            "LIMIT @{PAGE_SIZE_PARAMETER} OFFSET ((@{PAGE_PARAMETER} - 1) * @{PAGE_SIZE_PARAMETER})"
        )
    }

    fn column_type(&self, storage: StorageKind, _arguments: Option<&str>) -> String {
        // Affinity names only: a DECIMAL column would turn decimal text into REAL.
        match storage {
            StorageKind::Int | StorageKind::Bit => "INTEGER",
            StorageKind::Float => "REAL",
            StorageKind::VarBinary => "BLOB",
            StorageKind::UniqueIdentifier
            | StorageKind::Decimal
            | StorageKind::DateTime2
            | StorageKind::DateTimeOffset
            | StorageKind::NVarChar => "TEXT",
        }
        .to_string()
    }

    fn uuid_default(&self) -> Option<&'static str> {
        Some(UUID_DEFAULT)
    }

    fn default_literal(&self, storage: StorageKind, literal: &str) -> String {
        let text = literal
            .trim_start_matches('(')
            .trim_end_matches(')')
            .trim_matches('\'');
        let stored = match storage {
            StorageKind::Decimal => driver::decode_decimal(text).map(driver::encode_decimal),
            StorageKind::DateTime2 => {
                driver::parse_datetime(text).map(|v| v.format(DATETIME_FORMAT).to_string())
            }
            _ => None,
        };
        stored.map_or_else(|| literal.to_string(), |v| format!("('{v}')"))
    }

    fn executable(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::ColumnDef;

    #[test]
    fn test_quoting() {
        let dialect = SqliteDialect::new();
        assert_eq!(dialect.name(), "sqlite");
        assert_eq!(dialect.table_reference("Foo"), "[Foo]");
        assert_eq!(dialect.placeholder(3, "Name"), "?3");
    }

    #[test]
    fn test_create_table() {
        let dialect = SqliteDialect::new();
        let columns = [
            ColumnDef {
                name: "Id",
                storage: StorageKind::UniqueIdentifier,
                arguments: None,
                nullable: false,
                default: Some("('x')"),
            },
            ColumnDef {
                name: "Amount",
                storage: StorageKind::Decimal,
                arguments: Some("(18, 0)"),
                nullable: true,
                default: None,
            },
        ];
        let sql = dialect.create_table("Foo", &columns, &["Id"]);
        assert_eq!(
            sql,
            "CREATE TABLE [Foo] (\n    [Id] TEXT NOT NULL DEFAULT ('x'),\n    \
             [Amount] TEXT NULL,\n    CONSTRAINT [PK_Foo] PRIMARY KEY ([Id])\n)"
        );
    }

    #[test]
    fn test_defaults_match_stored_text() {
        let dialect = SqliteDialect::new();
        assert_eq!(
            dialect.default_literal(StorageKind::DateTime2, "('1970-01-01T00:00:00.0000000')"),
            "('1970-01-01 00:00:00.000000000')"
        );
        assert_eq!(
            dialect.default_literal(StorageKind::Decimal, "(0)"),
            format!("('{}')", driver::encode_decimal(rust_decimal::Decimal::ZERO))
        );
        assert_eq!(dialect.default_literal(StorageKind::Int, "(0)"), "(0)");
        assert_eq!(
            dialect.default_literal(StorageKind::DateTime2, "(getdate())"),
            "(getdate())"
        );
    }

    #[tokio::test]
    async fn test_uuid_default_generates_uuids() {
        use sqlx::sqlite::SqlitePoolOptions;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        let text: String = sqlx::query_scalar(&format!("SELECT {UUID_DEFAULT}"))
            .fetch_one(&pool)
            .await
            .unwrap();
        let id = uuid::Uuid::parse_str(&text).unwrap();
        assert_eq!(id.get_version_num(), 4);
        assert_eq!(id.to_string(), text);
    }
}
