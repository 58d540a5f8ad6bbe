//! Ready-to-run commands with their staged temporary tables.
//!
//! [`compile_and_prepare`] compiles a statement for a connection, stages its
//! temporary tables and returns a [`PreparedCommand`]. The prepared command
//! owns everything that needs cleaning up afterwards: the cancellation
//! registration, the native command and the staged tables.

use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::cancel::{CancellationRegistration, CancellationSignal, guard, race, settle};
use crate::compiler::{check_dialect, compile};
use crate::config::{Interceptor, Settings};
use crate::dialect::{Dialect, DialectAdapter};
use crate::error::{DriverError, Error, Result};
use crate::fragment::{Statement, TemporaryTableRequest};
use crate::native::{CommandKind, NativeCommand, NativeConnection, NativeRow, NativeTransaction};
use crate::staging::{StagedTable, StagingContext, stage_tables};
use crate::value::Scalar;

/// Per-call options for [`compile_and_prepare`].
#[derive(Default, Clone)]
pub struct CommandOptions<'a> {
    pub transaction: Option<&'a dyn NativeTransaction>,
    /// Falls back to the settings' command timeout.
    pub timeout: Option<Duration>,
    pub kind: CommandKind,
    pub cancellation: Option<CancellationSignal>,
}

impl<'a> CommandOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transaction(mut self, transaction: &'a dyn NativeTransaction) -> Self {
        self.transaction = Some(transaction);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn kind(mut self, kind: CommandKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn cancellation(mut self, signal: CancellationSignal) -> Self {
        self.cancellation = Some(signal);
        self
    }
}

/// A compiled, staged command bound to one connection.
///
/// Call [`dispose`](PreparedCommand::dispose) when done. If it is dropped
/// undisposed, outstanding drop statements go to the connection's
/// [`defer_cleanup`](NativeConnection::defer_cleanup).
pub struct PreparedCommand<'c> {
    connection: &'c dyn NativeConnection,
    adapter: &'static dyn DialectAdapter,
    command: Option<NativeCommand>,
    tables: Vec<StagedTable>,
    requests: Vec<TemporaryTableRequest>,
    registration: Option<CancellationRegistration>,
    signal: Option<CancellationSignal>,
    interceptor: Option<Interceptor>,
}

impl std::fmt::Debug for PreparedCommand<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedCommand")
            .field("command", &self.command)
            .field("tables", &self.tables)
            .finish_non_exhaustive()
    }
}

/// Compile `statement`, stage its temporary tables and prepare the command.
pub async fn compile_and_prepare<'c>(
    statement: &Statement,
    dialect: Dialect,
    connection: &'c dyn NativeConnection,
    options: CommandOptions<'_>,
    settings: &Settings,
) -> Result<PreparedCommand<'c>> {
    check_dialect("connection", dialect, connection.dialect())?;
    if let Some(transaction) = options.transaction {
        check_dialect("transaction", dialect, transaction.dialect())?;
    }

    let signal = options.cancellation.clone();
    let cancelled = || signal.as_ref().is_some_and(CancellationSignal::is_cancelled);
    if cancelled() {
        return Err(Error::cancelled("preparing command"));
    }

    let adapter = dialect.adapter();
    let profile = guard(
        signal.as_ref(),
        "preparing command",
        adapter.session_profile(connection),
    )
    .await?;

    let compiled = compile(statement, adapter, &profile, settings)?;
    let transaction = options.transaction.map(|t| t.id());
    let timeout = options.timeout.or_else(|| settings.command_timeout());

    let context = StagingContext {
        connection,
        adapter,
        settings,
        transaction,
        timeout,
        signal: signal.as_ref(),
    };
    let tables = stage_tables(&compiled.temporary_tables, &context).await?;

    let mut command = NativeCommand::new(compiled.text)
        .with_parameters(compiled.parameters)
        .with_timeout(timeout)
        .with_transaction(transaction);
    command.kind = options.kind;

    let registration = signal.as_ref().map(|signal| {
        let flag = command.cancel_handle();
        signal.register(move || flag.store(true, Ordering::SeqCst))
    });

    Ok(PreparedCommand {
        connection,
        adapter,
        command: Some(command),
        tables,
        requests: compiled
            .temporary_tables
            .into_iter()
            .map(|plan| plan.request)
            .collect(),
        registration,
        signal,
        interceptor: settings.interceptor.clone(),
    })
}

/// Blocking form of [`compile_and_prepare`].
pub fn compile_and_prepare_blocking<'c>(
    statement: &Statement,
    dialect: Dialect,
    connection: &'c dyn NativeConnection,
    options: CommandOptions<'_>,
    settings: &Settings,
) -> Result<PreparedCommand<'c>> {
    futures::executor::block_on(compile_and_prepare(
        statement, dialect, connection, options, settings,
    ))
}

impl<'c> PreparedCommand<'c> {
    /// The native command, until disposal.
    pub fn command(&self) -> Option<&NativeCommand> {
        self.command.as_ref()
    }

    pub fn staged_tables(&self) -> &[StagedTable] {
        &self.tables
    }

    pub fn connection(&self) -> &'c dyn NativeConnection {
        self.connection
    }

    /// A copy of the command for one execution, after the interceptor has
    /// seen it.
    fn ready(&self) -> Result<NativeCommand> {
        let mut command = self.command.clone().ok_or_else(|| {
            Error::driver("executing command", DriverError::new("command already disposed"))
        })?;
        if let Some(interceptor) = &self.interceptor {
            interceptor(&mut command, &self.requests);
        }
        Ok(command)
    }

    fn fail(&self, interruption: crate::cancel::Interruption) -> Error {
        settle(
            self.adapter,
            self.signal.as_ref(),
            "executing command".to_string(),
            interruption,
        )
    }

    /// Run the command, returning the affected row count.
    pub async fn execute(&mut self) -> Result<u64> {
        let connection = self.connection;
        let command = self.ready()?;
        tracing::debug!(sql = %command.text, "executing command");
        race(self.signal.as_ref(), connection.execute(&command))
            .await
            .map_err(|i| self.fail(i))
    }

    pub async fn query(&mut self) -> Result<Vec<NativeRow>> {
        let connection = self.connection;
        let command = self.ready()?;
        tracing::debug!(sql = %command.text, "querying");
        race(self.signal.as_ref(), connection.query(&command))
            .await
            .map_err(|i| self.fail(i))
    }

    pub async fn query_scalar(&mut self) -> Result<Option<Scalar>> {
        let connection = self.connection;
        let command = self.ready()?;
        race(self.signal.as_ref(), connection.query_scalar(&command))
            .await
            .map_err(|i| self.fail(i))
    }

    pub fn execute_blocking(&mut self) -> Result<u64> {
        futures::executor::block_on(self.execute())
    }

    pub fn query_blocking(&mut self) -> Result<Vec<NativeRow>> {
        futures::executor::block_on(self.query())
    }

    /// Release the registration, the command, then every staged table in
    /// creation order. Every table is attempted; the first failure is
    /// returned. Later calls do nothing.
    pub async fn dispose(&mut self) -> Result<()> {
        if let Some(mut registration) = self.registration.take() {
            registration.dispose();
        }
        self.command = None;

        let mut first_error = None;
        for table in &mut self.tables {
            if let Err(e) = table.dispose(self.connection).await {
                tracing::warn!(table = %table.quoted_name(), error = %e, "failed to drop temporary table");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn dispose_blocking(&mut self) -> Result<()> {
        futures::executor::block_on(self.dispose())
    }
}

impl Drop for PreparedCommand<'_> {
    fn drop(&mut self) {
        self.registration.take();
        for table in &mut self.tables {
            if let Some(command) = table.take_drop() {
                tracing::warn!(table = %table.quoted_name(), "prepared command dropped undisposed; deferring cleanup");
                self.connection.defer_cleanup(command);
            }
        }
    }
}
