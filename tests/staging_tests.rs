mod support;

use pretty_assertions::assert_eq;
use sqlstitch::cancel::CancellationSignal;
use sqlstitch::compiler::{TemporaryTablePlan, compile};
use sqlstitch::config::{EnumSerialization, Settings};
use sqlstitch::dialect::{Dialect, NativeType, SessionProfile};
use sqlstitch::error::{DriverError, Error};
use sqlstitch::fragment::{Statement, TemporaryTableRequest};
use sqlstitch::staging::{StagingContext, TableState, stage_tables};
use sqlstitch::value::Scalar;
use support::MockConnection;

sqlstitch::sql_enum! {
    pub enum Shelf { Top = 1, Bottom = 2 }
}

struct Line {
    sku: String,
    qty: i32,
    shelf: Shelf,
}

sqlstitch::table_record!(Line {
    sku: String => "Sku",
    qty: i32 => "Quantity",
    shelf: Shelf => "Shelf",
});

fn plans(dialect: Dialect, tables: Vec<TemporaryTableRequest>, settings: &Settings) -> Vec<TemporaryTablePlan> {
    let mut statement = Statement::new().sql("SELECT 1");
    for table in tables {
        statement = statement.sql(" FROM ").temp_table(table);
    }
    compile(
        &statement,
        dialect.adapter(),
        &SessionProfile::offline(dialect),
        settings,
    )
    .unwrap()
    .temporary_tables
}

fn context<'a>(
    connection: &'a MockConnection,
    dialect: Dialect,
    settings: &'a Settings,
    signal: Option<&'a CancellationSignal>,
) -> StagingContext<'a> {
    StagingContext {
        connection,
        adapter: dialect.adapter(),
        settings,
        transaction: None,
        timeout: None,
        signal,
    }
}

#[tokio::test]
async fn test_record_table_ddl_and_row_inserts() {
    let lines = vec![
        Line { sku: "A-1".into(), qty: 2, shelf: Shelf::Top },
        Line { sku: "B-7".into(), qty: 5, shelf: Shelf::Bottom },
    ];
    let request = TemporaryTableRequest::of_records("Lines", &lines);
    let name = request.name().to_string();
    let settings = Settings::default();
    let plans = plans(Dialect::Postgres, vec![request], &settings);
    let connection = MockConnection::new(Dialect::Postgres);

    let staged = stage_tables(&plans, &context(&connection, Dialect::Postgres, &settings, None))
        .await
        .unwrap();

    assert_eq!(staged.len(), 1);
    assert_eq!(staged[0].state(), TableState::Populated);
    assert_eq!(
        connection.log(),
        vec![
            format!(
                "CREATE TEMP TABLE \"{}\" (\"Sku\" TEXT, \"Quantity\" INTEGER, \"Shelf\" BIGINT)",
                name
            ),
            format!("INSERT INTO \"{}\" (\"Sku\", \"Quantity\", \"Shelf\") VALUES ($1, $2, $3)", name),
            format!("INSERT INTO \"{}\" (\"Sku\", \"Quantity\", \"Shelf\") VALUES ($1, $2, $3)", name),
        ]
    );

    let second = &connection.commands()[2];
    let values: Vec<_> = second.parameters.iter().map(|p| p.value.clone()).collect();
    assert_eq!(
        values,
        vec![
            Some(Scalar::Text("B-7".into())),
            Some(Scalar::Int32(5)),
            Some(Scalar::Int64(2)),
        ]
    );
}

#[tokio::test]
async fn test_bulk_path_serializes_enums_as_text() {
    let lines = vec![Line { sku: "A-1".into(), qty: 1, shelf: Shelf::Bottom }];
    let settings = Settings::default().with_enum_serialization(EnumSerialization::AsText);
    let plans = plans(
        Dialect::SqlServer,
        vec![TemporaryTableRequest::of_records("Lines", &lines)],
        &settings,
    );
    let connection = MockConnection::new(Dialect::SqlServer).with_bulk_load();

    stage_tables(&plans, &context(&connection, Dialect::SqlServer, &settings, None))
        .await
        .unwrap();

    let loads = connection.bulk_loads();
    assert_eq!(loads.len(), 1);
    let columns: Vec<_> = loads[0].columns.iter().map(|c| (c.name.as_str(), c.native_type)).collect();
    assert_eq!(
        columns,
        vec![
            ("[Sku]", NativeType::Text),
            ("[Quantity]", NativeType::Integer),
            ("[Shelf]", NativeType::Text),
        ]
    );
    assert_eq!(loads[0].rows[0][2], Some(Scalar::Text("Bottom".into())));
    assert!(connection.ddl()[0].ends_with("([Sku] NVARCHAR(MAX), [Quantity] INT, [Shelf] NVARCHAR(200))"));
    assert!(!connection.log().iter().any(|sql| sql.starts_with("INSERT")));
}

#[tokio::test]
async fn test_empty_table_is_created_but_not_loaded() {
    let settings = Settings::default();
    let plans = plans(
        Dialect::Sqlite,
        vec![TemporaryTableRequest::of_values("Ids", Vec::<i64>::new())],
        &settings,
    );
    let connection = MockConnection::new(Dialect::Sqlite).with_bulk_load();

    let staged = stage_tables(&plans, &context(&connection, Dialect::Sqlite, &settings, None))
        .await
        .unwrap();

    assert_eq!(staged[0].state(), TableState::Populated);
    assert_eq!(connection.log().len(), 1);
    assert!(connection.bulk_loads().is_empty());
}

#[tokio::test]
async fn test_failure_unwinds_newest_first() {
    let settings = Settings::default();
    let first = TemporaryTableRequest::of_values("First", vec![1_i64]);
    let second = TemporaryTableRequest::of_values("Second", vec![2_i64]);
    let third = TemporaryTableRequest::of_values("Third", vec![3_i64]);
    let (first_name, second_name, third_name) = (
        first.name().to_string(),
        second.name().to_string(),
        third.name().to_string(),
    );
    let plans = plans(Dialect::SqlServer, vec![first, second, third], &settings);
    let connection = MockConnection::new(Dialect::SqlServer).fail_on(
        &format!("INSERT INTO [#{}]", third_name),
        DriverError::new("disk full").with_number(1105),
    );

    let err = stage_tables(&plans, &context(&connection, Dialect::SqlServer, &settings, None))
        .await
        .unwrap_err();

    match err {
        Error::Driver { context, source } => {
            assert!(context.contains(&third_name));
            assert_eq!(source.number, Some(1105));
        }
        other => panic!("unexpected error {:?}", other),
    }
    let ddl = connection.ddl();
    assert_eq!(
        &ddl[ddl.len() - 3..],
        &[
            format!("DROP TABLE [#{}]", third_name),
            format!("DROP TABLE [#{}]", second_name),
            format!("DROP TABLE [#{}]", first_name),
        ]
    );
    assert!(connection.live_tables().is_empty());
}

#[tokio::test]
async fn test_cancel_mid_staging_leaves_no_tables() {
    let settings = Settings::default();
    let tables: Vec<_> = ["A", "B", "C"]
        .into_iter()
        .map(|base| TemporaryTableRequest::of_values(base, vec![1_i64, 2]))
        .collect();
    let last = tables[2].name().to_string();
    let plans = plans(Dialect::Postgres, tables, &settings);
    let signal = CancellationSignal::new();
    let connection = MockConnection::new(Dialect::Postgres).cancel_on(
        &format!("CREATE TEMP TABLE \"{}\"", last),
        &signal,
        DriverError::new("canceling statement due to user request").with_code("57014"),
    );

    let err = stage_tables(
        &plans,
        &context(&connection, Dialect::Postgres, &settings, Some(&signal)),
    )
    .await
    .unwrap_err();

    assert!(err.is_cancellation(), "{:?}", err);
    assert_eq!(connection.created_tables(), 2);
    assert!(connection.live_tables().is_empty());
}

#[tokio::test]
async fn test_cancellation_shape_without_cancel_is_a_driver_error() {
    let settings = Settings::default();
    let plans = plans(
        Dialect::Postgres,
        vec![TemporaryTableRequest::of_values("Ids", vec![1_i64])],
        &settings,
    );
    let signal = CancellationSignal::new();
    let connection = MockConnection::new(Dialect::Postgres).fail_on(
        "CREATE",
        DriverError::new("canceling statement due to statement timeout").with_code("57014"),
    );

    let err = stage_tables(
        &plans,
        &context(&connection, Dialect::Postgres, &settings, Some(&signal)),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::Driver { .. }));
}

#[tokio::test]
async fn test_already_cancelled_signal_runs_nothing() {
    let settings = Settings::default();
    let plans = plans(
        Dialect::MySql,
        vec![TemporaryTableRequest::of_values("Ids", vec![1_i64])],
        &settings,
    );
    let signal = CancellationSignal::new();
    signal.cancel();
    let connection = MockConnection::new(Dialect::MySql);

    let err = stage_tables(
        &plans,
        &context(&connection, Dialect::MySql, &settings, Some(&signal)),
    )
    .await
    .unwrap_err();

    assert!(err.is_cancellation());
    assert!(connection.log().is_empty());
}

#[tokio::test]
async fn test_dispose_runs_once() {
    let settings = Settings::default();
    let plans = plans(
        Dialect::MySql,
        vec![TemporaryTableRequest::of_values("Ids", vec![1_i64])],
        &settings,
    );
    let connection = MockConnection::new(Dialect::MySql).with_bulk_load();
    let mut staged = stage_tables(&plans, &context(&connection, Dialect::MySql, &settings, None))
        .await
        .unwrap();

    staged[0].dispose(&connection).await.unwrap();
    staged[0].dispose(&connection).await.unwrap();

    let drops: Vec<_> = connection
        .log()
        .into_iter()
        .filter(|sql| sql.starts_with("DROP TEMPORARY TABLE"))
        .collect();
    assert_eq!(drops.len(), 1);
    assert_eq!(staged[0].state(), TableState::Disposed);
}

#[tokio::test]
async fn test_cancel_while_create_is_in_flight_drops_that_table() {
    let settings = Settings::default();
    let tables: Vec<_> = ["A", "B", "C"]
        .into_iter()
        .map(|base| TemporaryTableRequest::of_values(base, vec![1_i64]))
        .collect();
    let names: Vec<String> = tables.iter().map(|t| t.name().to_string()).collect();
    let plans = plans(Dialect::Postgres, tables, &settings);
    let signal = CancellationSignal::new();
    let connection = MockConnection::new(Dialect::Postgres)
        .stall_on(&format!("CREATE TEMP TABLE \"{}\"", names[2]), &signal);

    let err = stage_tables(
        &plans,
        &context(&connection, Dialect::Postgres, &settings, Some(&signal)),
    )
    .await
    .unwrap_err();

    assert!(err.is_cancellation(), "{:?}", err);
    assert_eq!(connection.created_tables(), 3);
    assert!(connection.live_tables().is_empty());
    let ddl = connection.ddl();
    assert_eq!(
        &ddl[ddl.len() - 3..],
        &[
            format!("DROP TABLE \"{}\"", names[2]),
            format!("DROP TABLE \"{}\"", names[1]),
            format!("DROP TABLE \"{}\"", names[0]),
        ]
    );
}

#[tokio::test]
async fn test_cancel_during_bulk_load_leaves_no_tables() {
    let settings = Settings::default();
    let plans = plans(
        Dialect::MySql,
        vec![
            TemporaryTableRequest::of_values("Ids", vec![1_i64, 2, 3]),
            TemporaryTableRequest::of_values("Codes", vec!["x", "y"]),
        ],
        &settings,
    );
    let signal = CancellationSignal::new();
    let connection = MockConnection::new(Dialect::MySql)
        .with_bulk_load()
        .stall_on("BULK", &signal);

    let err = stage_tables(
        &plans,
        &context(&connection, Dialect::MySql, &settings, Some(&signal)),
    )
    .await
    .unwrap_err();

    assert!(err.is_cancellation(), "{:?}", err);
    assert_eq!(connection.created_tables(), 1);
    assert_eq!(connection.bulk_loads().len(), 1);
    assert!(connection.live_tables().is_empty());
}

#[tokio::test]
async fn test_cancel_during_row_insert_leaves_no_tables() {
    let settings = Settings::default();
    let plans = plans(
        Dialect::Postgres,
        vec![TemporaryTableRequest::of_values("Ids", vec![1_i64, 2, 3])],
        &settings,
    );
    let signal = CancellationSignal::new();
    let connection = MockConnection::new(Dialect::Postgres).stall_on("INSERT INTO", &signal);

    let err = stage_tables(
        &plans,
        &context(&connection, Dialect::Postgres, &settings, Some(&signal)),
    )
    .await
    .unwrap_err();

    assert!(err.is_cancellation(), "{:?}", err);
    let inserts = connection
        .log()
        .into_iter()
        .filter(|sql| sql.starts_with("INSERT INTO"))
        .count();
    assert_eq!(inserts, 1);
    assert!(connection.live_tables().is_empty());
}
