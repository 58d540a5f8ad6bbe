//! An in-memory `NativeConnection` that records what it is asked to do.

#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use sqlstitch::cancel::CancellationSignal;
use sqlstitch::dialect::Dialect;
use sqlstitch::error::DriverError;
use sqlstitch::native::{
    BulkLoad, NativeCommand, NativeConnection, NativeRow, NativeTransaction, SessionCache,
    TransactionId,
};
use sqlstitch::value::Scalar;

#[derive(Default)]
struct State {
    log: Vec<String>,
    commands: Vec<NativeCommand>,
    live_tables: Vec<String>,
    created_tables: usize,
    bulk_loads: Vec<BulkLoad>,
    deferred: Vec<NativeCommand>,
    scalar_queries: usize,
    fail_on: Option<(String, DriverError)>,
    cancel_on: Option<(String, CancellationSignal, DriverError)>,
    stall_on: Option<(String, CancellationSignal)>,
    scalars: Vec<(String, Scalar)>,
    rows: Vec<NativeRow>,
}

pub struct MockConnection {
    dialect: Dialect,
    cache: SessionCache,
    bulk: bool,
    state: Mutex<State>,
}

/// The table name in a `CREATE ... TABLE x (...)` or `DROP ... TABLE x`.
fn table_name(sql: &str) -> String {
    let rest = match sql.find("TABLE ") {
        Some(i) => &sql[i + "TABLE ".len()..],
        None => sql,
    };
    rest.split(" (").next().unwrap_or(rest).trim().to_string()
}

impl MockConnection {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            cache: SessionCache::default(),
            bulk: false,
            state: Mutex::new(State::default()),
        }
    }

    /// Accept rows through `bulk_load` instead of declining.
    pub fn with_bulk_load(mut self) -> Self {
        self.bulk = true;
        self
    }

    /// Fail any statement containing `pattern`.
    pub fn fail_on(self, pattern: &str, error: DriverError) -> Self {
        self.state.lock().unwrap().fail_on = Some((pattern.to_string(), error));
        self
    }

    /// Cancel `signal` when a statement containing `pattern` runs, then fail
    /// that statement with `error`, the way a driver reports an abort.
    pub fn cancel_on(self, pattern: &str, signal: &CancellationSignal, error: DriverError) -> Self {
        self.state.lock().unwrap().cancel_on = Some((pattern.to_string(), signal.clone(), error));
        self
    }

    /// Run a statement containing `pattern` (or a bulk load, logged as
    /// `BULK <table>`), cancel `signal`, then never complete. Models a
    /// server that finished the work before the caller stopped waiting.
    pub fn stall_on(self, pattern: &str, signal: &CancellationSignal) -> Self {
        self.state.lock().unwrap().stall_on = Some((pattern.to_string(), signal.clone()));
        self
    }

    /// Answer scalar queries containing `pattern` with `value`.
    pub fn answer(self, pattern: &str, value: Scalar) -> Self {
        self.state
            .lock()
            .unwrap()
            .scalars
            .push((pattern.to_string(), value));
        self
    }

    pub fn with_rows(self, rows: Vec<NativeRow>) -> Self {
        self.state.lock().unwrap().rows = rows;
        self
    }

    /// Every statement text run, in order.
    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn commands(&self) -> Vec<NativeCommand> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn ddl(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter(|sql| sql.starts_with("CREATE") || sql.starts_with("DROP"))
            .collect()
    }

    pub fn live_tables(&self) -> Vec<String> {
        self.state.lock().unwrap().live_tables.clone()
    }

    pub fn created_tables(&self) -> usize {
        self.state.lock().unwrap().created_tables
    }

    pub fn bulk_loads(&self) -> Vec<BulkLoad> {
        self.state.lock().unwrap().bulk_loads.clone()
    }

    pub fn deferred(&self) -> Vec<NativeCommand> {
        self.state.lock().unwrap().deferred.clone()
    }

    pub fn scalar_queries(&self) -> usize {
        self.state.lock().unwrap().scalar_queries
    }

    fn run(&self, command: &NativeCommand) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        let sql = command.text.clone();
        state.log.push(sql.clone());
        state.commands.push(command.clone());

        if let Some((pattern, signal, error)) = &state.cancel_on {
            if sql.contains(pattern.as_str()) {
                let (signal, error) = (signal.clone(), error.clone());
                state.cancel_on = None;
                drop(state);
                signal.cancel();
                return Err(error);
            }
        }
        if let Some((pattern, error)) = &state.fail_on {
            if sql.contains(pattern.as_str()) {
                return Err(error.clone());
            }
        }

        if sql.starts_with("CREATE") {
            state.live_tables.push(table_name(&sql));
            state.created_tables += 1;
        } else if sql.starts_with("DROP") {
            let name = table_name(&sql);
            state.live_tables.retain(|t| *t != name);
        }
        Ok(())
    }

    async fn stall(&self, text: &str) {
        let signal = {
            let mut state = self.state.lock().unwrap();
            let stalls = matches!(
                &state.stall_on,
                Some((pattern, _)) if text.contains(pattern.as_str())
            );
            if stalls {
                state.stall_on.take().map(|(_, signal)| signal)
            } else {
                None
            }
        };
        if let Some(signal) = signal {
            signal.cancel();
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl NativeConnection for MockConnection {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn session_cache(&self) -> &SessionCache {
        &self.cache
    }

    async fn execute(&self, command: &NativeCommand) -> Result<u64, DriverError> {
        self.run(command)?;
        self.stall(&command.text).await;
        Ok(1)
    }

    async fn query(&self, command: &NativeCommand) -> Result<Vec<NativeRow>, DriverError> {
        self.run(command)?;
        self.stall(&command.text).await;
        Ok(self.state.lock().unwrap().rows.clone())
    }

    async fn query_scalar(&self, command: &NativeCommand) -> Result<Option<Scalar>, DriverError> {
        self.run(command)?;
        self.stall(&command.text).await;
        let mut state = self.state.lock().unwrap();
        state.scalar_queries += 1;
        Ok(state
            .scalars
            .iter()
            .find(|(pattern, _)| command.text.contains(pattern.as_str()))
            .map(|(_, value)| value.clone()))
    }

    async fn bulk_load(&self, load: &BulkLoad) -> Result<bool, DriverError> {
        if !self.bulk {
            return Ok(false);
        }
        let entry = format!("BULK {}", load.table);
        {
            let mut state = self.state.lock().unwrap();
            state.log.push(entry.clone());
            state.bulk_loads.push(load.clone());
        }
        self.stall(&entry).await;
        Ok(true)
    }

    fn defer_cleanup(&self, command: NativeCommand) {
        self.state.lock().unwrap().deferred.push(command);
    }
}

pub struct MockTransaction {
    pub dialect: Dialect,
    pub id: TransactionId,
}

impl NativeTransaction for MockTransaction {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn id(&self) -> TransactionId {
        self.id
    }
}
