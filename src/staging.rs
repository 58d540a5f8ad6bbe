//! Temporary table lifecycle: create, populate, drop.
//!
//! Each table moves `Requested → Created → Populated → Disposed`. A failure
//! or cancellation while staging drops every table created so far, newest
//! first, before the error is returned.

use std::time::Duration;

use crate::cancel::{CancellationSignal, Interruption, race, settle};
use crate::compiler::TemporaryTablePlan;
use crate::config::Settings;
use crate::dialect::{ColumnDefinition, DialectAdapter};
use crate::error::{Error, Result};
use crate::native::{
    BoundParameter, BulkColumn, BulkLoad, NativeCommand, NativeConnection, TransactionId,
};
use crate::value::{Scalar, ScalarKind, convert};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    Requested,
    Created,
    Populated,
    Disposed,
}

/// A temporary table owned by one prepared command.
#[derive(Debug)]
pub struct StagedTable {
    name: String,
    quoted_name: String,
    state: TableState,
    drop_sql: String,
    transaction: Option<TransactionId>,
    timeout: Option<Duration>,
}

impl StagedTable {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn quoted_name(&self) -> &str {
        &self.quoted_name
    }

    pub fn state(&self) -> TableState {
        self.state
    }

    fn drop_command(&self) -> NativeCommand {
        NativeCommand::new(self.drop_sql.clone())
            .with_transaction(self.transaction)
            .with_timeout(self.timeout)
    }

    /// Drop the table. Only the first call does anything.
    pub async fn dispose(&mut self, connection: &dyn NativeConnection) -> Result<()> {
        let Some(command) = self.take_drop() else {
            return Ok(());
        };
        tracing::debug!(table = %self.quoted_name, "dropping temporary table");
        connection
            .execute(&command)
            .await
            .map(|_| ())
            .map_err(|e| Error::driver(format!("dropping temporary table {}", self.quoted_name), e))
    }

    pub fn dispose_blocking(&mut self, connection: &dyn NativeConnection) -> Result<()> {
        futures::executor::block_on(self.dispose(connection))
    }

    /// Mark disposed and hand back the drop statement if one is still owed.
    pub(crate) fn take_drop(&mut self) -> Option<NativeCommand> {
        let owed = matches!(self.state, TableState::Created | TableState::Populated);
        self.state = TableState::Disposed;
        owed.then(|| self.drop_command())
    }
}

/// What staging needs besides the tables themselves.
pub struct StagingContext<'a> {
    pub connection: &'a dyn NativeConnection,
    pub adapter: &'a dyn DialectAdapter,
    pub settings: &'a Settings,
    pub transaction: Option<TransactionId>,
    pub timeout: Option<Duration>,
    pub signal: Option<&'a CancellationSignal>,
}

impl StagingContext<'_> {
    fn command(&self, text: String) -> NativeCommand {
        NativeCommand::new(text)
            .with_transaction(self.transaction)
            .with_timeout(self.timeout)
    }

    fn cancelled(&self) -> bool {
        self.signal.is_some_and(CancellationSignal::is_cancelled)
    }
}

/// Create and populate every planned table, in order.
pub async fn stage_tables(
    plans: &[TemporaryTablePlan],
    context: &StagingContext<'_>,
) -> Result<Vec<StagedTable>> {
    let mut staged: Vec<StagedTable> = Vec::with_capacity(plans.len());

    for plan in plans {
        if let Err(e) = stage_one(plan, context, &mut staged).await {
            unwind(&mut staged, context.connection).await;
            return Err(e);
        }
    }
    Ok(staged)
}

async fn stage_one(
    plan: &TemporaryTablePlan,
    context: &StagingContext<'_>,
    staged: &mut Vec<StagedTable>,
) -> Result<()> {
    let adapter = context.adapter;
    let enums = context.settings.enum_serialization;
    let table = &plan.quoted_name;
    let columns = plan.request.columns();

    if context.cancelled() {
        return Err(Error::cancelled(format!("staging temporary table {}", table)));
    }

    let definitions = columns
        .iter()
        .map(|(name, kind)| -> Result<ColumnDefinition> {
            Ok(ColumnDefinition {
                name: adapter.quote_identifier(name),
                type_name: adapter.native_type_name(*kind, enums)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let create = context.command(adapter.create_temporary_table_sql(table, &definitions));
    tracing::debug!(table = %table, sql = %create.text, "creating temporary table");
    let created = race(context.signal, context.connection.execute(&create)).await;
    let record = StagedTable {
        name: plan.request.name().to_string(),
        quoted_name: table.clone(),
        state: TableState::Created,
        drop_sql: adapter.drop_temporary_table_sql(table),
        transaction: context.transaction,
        timeout: context.timeout,
    };
    match created {
        Ok(_) => staged.push(record),
        Err(interruption) => {
            // the server may have finished the CREATE before it was abandoned
            if matches!(interruption, Interruption::Cancelled) {
                staged.push(record);
            }
            return Err(settle(
                adapter,
                context.signal,
                format!("creating temporary table {}", table),
                interruption,
            ));
        }
    }

    populate(plan, context, &definitions, &columns).await?;

    if let Some(last) = staged.last_mut() {
        last.state = TableState::Populated;
    }
    Ok(())
}

async fn populate(
    plan: &TemporaryTablePlan,
    context: &StagingContext<'_>,
    definitions: &[ColumnDefinition],
    columns: &[(&'static str, ScalarKind)],
) -> Result<()> {
    let adapter = context.adapter;
    let enums = context.settings.enum_serialization;
    let table = &plan.quoted_name;

    if plan.request.is_empty() {
        return Ok(());
    }

    let mut rows: Vec<Vec<Option<Scalar>>> = Vec::with_capacity(plan.request.len());
    for row in plan.request.rows() {
        let mut values = Vec::with_capacity(columns.len());
        for ((_, kind), value) in columns.iter().zip(row) {
            let value = convert(value.clone(), kind.nullable())?
                .map(|v| adapter.transform_value(v, enums))
                .transpose()?;
            values.push(value);
        }
        rows.push(values);
    }

    let load = BulkLoad {
        table: table.clone(),
        columns: definitions
            .iter()
            .zip(columns)
            .map(|(definition, (_, kind))| -> Result<BulkColumn> {
                Ok(BulkColumn {
                    name: definition.name.clone(),
                    native_type: adapter.native_type(*kind, enums)?,
                })
            })
            .collect::<Result<Vec<_>>>()?,
        rows,
        transaction: context.transaction,
        timeout: context.timeout,
    };

    let context_text = || format!("loading temporary table {}", table);
    let loaded = race(context.signal, context.connection.bulk_load(&load))
        .await
        .map_err(|i| settle(adapter, context.signal, context_text(), i))?;
    if loaded {
        tracing::debug!(table = %table, rows = load.rows.len(), "bulk loaded temporary table");
        return Ok(());
    }

    let column_list = definitions
        .iter()
        .map(|d| d.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let references = columns
        .iter()
        .enumerate()
        .map(|(i, (name, _))| adapter.parameter_reference(name, i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let insert_sql = format!("INSERT INTO {} ({}) VALUES ({})", table, column_list, references);

    tracing::debug!(table = %table, rows = load.rows.len(), "inserting temporary table rows one by one");
    for row in &load.rows {
        let parameters = columns
            .iter()
            .zip(&load.columns)
            .zip(row)
            .map(|(((name, kind), column), value)| BoundParameter {
                name: (*name).to_string(),
                placeholder: adapter.format_parameter_name(name),
                native_type: column.native_type,
                kind: *kind,
                value: value.clone(),
            })
            .collect();
        let insert = context.command(insert_sql.clone()).with_parameters(parameters);
        race(context.signal, context.connection.execute(&insert))
            .await
            .map_err(|i| {
                settle(
                    adapter,
                    context.signal,
                    format!("inserting into temporary table {}", table),
                    i,
                )
            })?;
    }
    Ok(())
}

/// Drop staged tables newest first, logging failures.
pub(crate) async fn unwind(staged: &mut [StagedTable], connection: &dyn NativeConnection) {
    for table in staged.iter_mut().rev() {
        if let Err(e) = table.dispose(connection).await {
            tracing::warn!(table = %table.quoted_name, error = %e, "failed to drop temporary table while unwinding");
        }
    }
}
