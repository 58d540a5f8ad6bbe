use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use sqlstitch::command::{CommandOptions, compile_and_prepare};
use sqlstitch::config::Settings;
use sqlstitch::dialect::Dialect;
use sqlstitch::engine::SqlxConnection;
use sqlstitch::error::Result;
use sqlstitch::fragment::Statement;
use sqlstitch::native::{NativeConnection, NativeRow};
use sqlstitch::sql;

async fn query(connection: &SqlxConnection, statement: &Statement) -> Result<Vec<NativeRow>> {
    let mut command = compile_and_prepare(
        statement,
        Dialect::Sqlite,
        connection,
        CommandOptions::new(),
        &Settings::default(),
    )
    .await?;
    let rows = command.query().await?;
    command.dispose().await?;
    Ok(rows)
}

async fn temp_tables(connection: &SqlxConnection) -> i64 {
    let rows = query(
        connection,
        &sql!("SELECT COUNT(*) AS N FROM sqlite_temp_master WHERE type = 'table'"),
    )
    .await
    .unwrap();
    rows[0].get("N").unwrap()
}

async fn seeded() -> SqlxConnection {
    let connection = SqlxConnection::connect("sqlite::memory:").await.unwrap();
    assert_eq!(connection.dialect(), Dialect::Sqlite);
    query(&connection, &sql!("CREATE TABLE Items (Id INTEGER, Name TEXT, Added TEXT)"))
        .await
        .unwrap();
    let added = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    for (id, name) in [(1_i64, "bolt"), (2, "nut"), (3, "washer")] {
        query(
            &connection,
            &sql!("INSERT INTO Items VALUES (", param(id), ", ", param(name), ", ", param(added), ")"),
        )
        .await
        .unwrap();
    }
    connection
}

#[tokio::test]
async fn test_query_joins_a_staged_table() {
    let connection = seeded().await;
    let ids = vec![3_i64, 1];

    let rows = query(
        &connection,
        &sql!(
            "SELECT Name, Added FROM Items WHERE Id IN (SELECT Value FROM ",
            temp_table(&ids),
            ") ORDER BY Id"
        ),
    )
    .await
    .unwrap();

    let names: Vec<String> = rows.iter().map(|row| row.get("name").unwrap()).collect();
    assert_eq!(names, vec!["bolt", "washer"]);
    let added: NaiveDate = rows[0].get("Added").unwrap();
    assert_eq!(added, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());

    assert_eq!(temp_tables(&connection).await, 0);
    connection.close().await.unwrap();
}

#[tokio::test]
async fn test_many_rows_span_batches() {
    let connection = seeded().await;
    let ids: Vec<i64> = (0..2500).collect();

    let rows = query(
        &connection,
        &sql!("SELECT COUNT(*) AS N FROM ", temp_table(&ids)),
    )
    .await
    .unwrap();
    let count: i64 = rows[0].get("N").unwrap();
    assert_eq!(count, 2500);
}

#[tokio::test]
async fn test_dropped_command_is_cleaned_up_by_the_next_one() {
    let connection = seeded().await;
    let ids = vec![2_i64];

    {
        let mut command = compile_and_prepare(
            &sql!("SELECT Name FROM Items WHERE Id IN (SELECT Value FROM ", temp_table(&ids), ")"),
            Dialect::Sqlite,
            &connection,
            CommandOptions::new(),
            &Settings::default(),
        )
        .await
        .unwrap();
        let rows = command.query().await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    assert_eq!(connection.pending_cleanup(), 1);
    assert_eq!(temp_tables(&connection).await, 0);
    assert_eq!(connection.pending_cleanup(), 0);
}

#[tokio::test]
async fn test_rolled_back_transaction() {
    let connection = seeded().await;
    let transaction = connection.begin().await.unwrap();

    let mut command = compile_and_prepare(
        &sql!("DELETE FROM Items WHERE Id = ", param(1_i64)),
        Dialect::Sqlite,
        &connection,
        CommandOptions::new().transaction(&transaction),
        &Settings::default(),
    )
    .await
    .unwrap();
    assert_eq!(command.execute().await.unwrap(), 1);
    command.dispose().await.unwrap();
    connection.rollback(transaction).await.unwrap();

    let rows = query(&connection, &sql!("SELECT COUNT(*) AS N FROM Items")).await.unwrap();
    let count: i64 = rows[0].get("N").unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
async fn test_null_parameter_round_trips() {
    let connection = seeded().await;
    let missing: Option<String> = None;

    query(
        &connection,
        &sql!("UPDATE Items SET Name = ", param(missing), " WHERE Id = 2"),
    )
    .await
    .unwrap();
    let rows = query(&connection, &sql!("SELECT Name FROM Items WHERE Id = 2"))
        .await
        .unwrap();
    let name: Option<String> = rows[0].get(0).unwrap();
    assert_eq!(name, None);
}
