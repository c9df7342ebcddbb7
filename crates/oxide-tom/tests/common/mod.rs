#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use oxide_tom::{
    bind_tables, Database, Encryptor, KeyLength, SchemaGenie, Settings, Table, TableMeta,
};
use oxide_tom_derive::Model;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteConnectOptions;
use tempfile::TempDir;
use uuid::Uuid;

#[derive(Debug, Default, Clone, PartialEq, Model)]
pub struct Foo {
    pub id: Uuid,
    pub int: i32,
    pub nullable_int: Option<i32>,
    pub decimal: Decimal,
    pub nullable_decimal: Option<Decimal>,
    pub float: f64,
    pub nullable_float: Option<f64>,
    pub date_time: NaiveDateTime,
    pub nullable_date_time: Option<NaiveDateTime>,
    pub offset: DateTime<FixedOffset>,
    pub nullable_offset: Option<DateTime<FixedOffset>>,
    pub flag: bool,
    pub nullable_flag: Option<bool>,
    pub text: String,
    pub nullable_text: Option<String>,
    pub bytes: Vec<u8>,
    pub nullable_bytes: Option<Vec<u8>>,
    pub ids: Vec<Uuid>,
    pub bar: Option<Bar>,
    #[field(skip)]
    pub cached: String,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize, Model)]
#[model(table = "Bars")]
pub struct Bar {
    #[field(name = "BarId", primary_key)]
    pub id: Uuid,
    pub foo_id: Uuid,
    pub name: String,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A file-backed database with the `Foo` and `Bar` tables created.
pub struct TestDb {
    pub database: Arc<Database>,
    pub foos: Table<Foo>,
    pub bars: Table<Bar>,
    _dir: TempDir,
}

impl TestDb {
    pub async fn open() -> Self {
        Self::open_with(false).await
    }

    /// Every mapped non-key column of both tables is encrypted.
    pub async fn open_secure() -> Self {
        Self::open_with(true).await
    }

    async fn open_with(secure: bool) -> Self {
        init_tracing();
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let options = SqliteConnectOptions::new()
            .filename(dir.path().join("tom.db"))
            .create_if_missing(true);
        let key = Encryptor::generate_key(KeyLength::Aes256);
        let settings = Settings::new().with_encryptor(Encryptor::new(key).unwrap());
        let database = Arc::new(Database::connect_with(settings, options).await.unwrap());

        let mut foos = Table::<Foo>::new(&database).unwrap();
        let mut bars = Table::<Bar>::new(&database).unwrap();
        bind_tables(&mut [&mut foos, &mut bars]);
        if secure {
            for table in [&mut foos as &mut dyn TableMeta, &mut bars] {
                for column in table.all_columns_mut() {
                    if column.is_mapped() && !column.is_primary_key() {
                        column.secure();
                    }
                }
            }
        }

        let genie = SchemaGenie::new(database.settings().dialect());
        database
            .execute(&genie.create_schema(&[&foos, &bars]))
            .await
            .unwrap();

        Self {
            database,
            foos,
            bars,
            _dir: dir,
        }
    }
}

pub fn at(year: i32, month: u32, day: u32, nanos: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_nano_opt(12, 34, 56, nanos)
        .unwrap()
}

/// A `Foo` with every field set.
pub fn full_foo(int: i32) -> Foo {
    Foo {
        id: Uuid::new_v4(),
        int,
        nullable_int: Some(-int),
        decimal: Decimal::new(1_234_567, 3),
        nullable_decimal: Some(Decimal::new(-5, 1)),
        float: 1.0 / 3.0,
        nullable_float: Some(2.5e-10),
        date_time: at(2023, 12, 31, 123_456_789),
        nullable_date_time: Some(at(1999, 1, 1, 0)),
        offset: DateTime::parse_from_rfc3339("2024-06-01T08:30:00.1234567-05:30").unwrap(),
        nullable_offset: Some(DateTime::parse_from_rfc3339("2001-02-03T04:05:06+09:00").unwrap()),
        flag: true,
        nullable_flag: Some(false),
        text: format!("foo {int}"),
        nullable_text: Some(String::from("Ünïcödé ✓")),
        bytes: vec![0, 1, 2, 254, 255],
        nullable_bytes: Some(Vec::new()),
        ids: vec![Uuid::new_v4(), Uuid::nil()],
        bar: None,
        cached: String::new(),
    }
}

/// A `Foo` with only the key and text set.
pub fn foo(text: &str) -> Foo {
    Foo {
        id: Uuid::new_v4(),
        text: text.to_string(),
        ..Foo::default()
    }
}
