//! Raw statements, configuration and the unit of work on `Database`.

mod common;

use std::io::Write;

use common::{foo, Foo, TestDb};
use oxide_tom::settings::{Config, DialectName};
use oxide_tom::{Command, Database, Encryptor, KeyLength, Paging, TomError, Value};

#[tokio::test]
async fn test_execute_with_models() {
    let db = TestDb::open().await;
    let rows = [foo("a"), foo("b"), foo("c")];
    let affected = db
        .database
        .execute_with(
            "INSERT INTO [Foo] ([Id], [Text], [Int]) VALUES (@Id, @Text, 5)",
            &rows,
        )
        .await
        .unwrap();
    assert_eq!(affected, 3);
    assert!(!db.database.has_work().await);

    let count = db
        .database
        .scalar_int("SELECT COUNT(*) FROM [Foo] WHERE [Int] = @Int", Some(&[("int", Value::Int(5))]))
        .await
        .unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
async fn test_raw_list() {
    let db = TestDb::open().await;
    db.foos.add_range(&[foo("x"), foo("y")]).await.unwrap();
    db.database.commit().await.unwrap();

    // Columns the model does not know are ignored.
    let rows: Vec<Foo> = db
        .database
        .list(
            "SELECT [Text], 42 AS [Unknown] FROM [Foo] ORDER BY [Text] DESC",
            None,
            Paging::all(),
        )
        .await
        .unwrap();
    let texts: Vec<&str> = rows.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, ["y", "x"]);
}

#[tokio::test]
async fn test_command_shares_settings() {
    let db = TestDb::open().await;
    let settings = std::sync::Arc::new(db.database.settings().clone());
    let mut command = Command::<Foo>::new(settings).unwrap();
    command
        .configure_field("Bar", |f| {
            f.set_mapped(false);
            Ok(())
        })
        .unwrap();

    let sql = format!(
        "INSERT INTO [Foo] ({}) VALUES ({})",
        command.field_names_text(),
        command.parameter_names_text()
    );
    let mut conn = db.database.pool().acquire().await.unwrap();
    command.execute(&mut conn, &sql, &[foo("direct")]).await.unwrap();
    drop(conn);

    let rows = db.foos.list(None, Paging::all()).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].text, "direct");
}

#[tokio::test]
async fn test_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("configured.db");
    let key = Encryptor::key_text(&Encryptor::generate_key(KeyLength::Aes192));

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"connection_strings": {{"Tom": "sqlite://{}?mode=rwc"}}, "encryption_key": "{key}"}}"#,
        path.display()
    )
    .unwrap();

    let config = Config::from_file(file.path()).unwrap();
    let database = Database::from_config(&config, "Tom").await.unwrap();
    assert_eq!(
        database.settings().encryptor().unwrap().key_length(),
        KeyLength::Aes192
    );
    database.execute("CREATE TABLE [T] ([X] INTEGER)").await.unwrap();
    assert_eq!(
        database.scalar_int("SELECT COUNT(*) FROM [T]", None).await.unwrap(),
        0
    );
    database.close().await.unwrap();
    assert!(path.exists());
}

#[tokio::test]
async fn test_from_config_rejects_text_only_dialect() {
    let config = Config {
        dialect: DialectName::SqlServer,
        ..Config::default()
    };
    let err = Database::from_config(&config, "sqlite::memory:")
        .await
        .unwrap_err();
    assert!(err.is_configuration(), "{err}");
}

#[tokio::test]
async fn test_missing_key_for_secure_column() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("plain.db").display());
    let database = std::sync::Arc::new(
        Database::connect(oxide_tom::Settings::new(), &url)
            .await
            .unwrap(),
    );
    let mut foos = oxide_tom::Table::<Foo>::new(&database).unwrap();
    foos.configure_column("Text", |c| {
        c.secure();
        Ok(())
    })
    .unwrap();

    let err = foos.add(&foo("secret")).await.unwrap_err();
    assert!(err.is_configuration(), "{err}");
    assert!(matches!(err, TomError::Configuration(_)));
}
