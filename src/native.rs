//! The driver boundary: what sqlstitch needs from a database driver.
//!
//! A driver implements [`NativeConnection`] (and hands out
//! [`NativeTransaction`]s if it supports them). Everything else in this module
//! is plain data passed across that boundary.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::dialect::{Dialect, NativeType};
use crate::error::{ConversionError, DriverError};
use crate::value::{FromScalar, Scalar, ScalarKind};

/// Opaque identity of a driver transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(pub u64);

/// A transaction handle created by the driver.
pub trait NativeTransaction: Send + Sync {
    fn dialect(&self) -> Dialect;
    fn id(&self) -> TransactionId;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommandKind {
    #[default]
    Text,
    StoredProcedure,
    TableDirect,
}

/// A parameter ready for the driver: final name, placeholder, native type
/// and the backend-transformed value.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParameter {
    pub name: String,
    /// The prefixed name, e.g. `@Name` or `:Name`.
    pub placeholder: String,
    pub native_type: NativeType,
    /// The declared kind before backend transforms.
    pub kind: ScalarKind,
    pub value: Option<Scalar>,
}

/// A command as handed to the driver.
#[derive(Debug, Clone)]
pub struct NativeCommand {
    pub text: String,
    pub kind: CommandKind,
    pub parameters: Vec<BoundParameter>,
    pub timeout: Option<Duration>,
    pub transaction: Option<TransactionId>,
    cancel_requested: Arc<AtomicBool>,
}

impl NativeCommand {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: CommandKind::Text,
            parameters: Vec::new(),
            timeout: None,
            transaction: None,
            cancel_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_parameters(mut self, parameters: Vec<BoundParameter>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_transaction(mut self, transaction: Option<TransactionId>) -> Self {
        self.transaction = transaction;
        self
    }

    /// Ask the driver to abandon this command. Drivers poll
    /// [`NativeCommand::is_cancel_requested`] where they can.
    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    pub(crate) fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel_requested.clone()
    }

    pub fn parameter(&self, name: &str) -> Option<&BoundParameter> {
        self.parameters
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }
}

/// One result row.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeRow {
    pub columns: Arc<[String]>,
    pub values: Vec<Option<Scalar>>,
}

/// Row column lookup, by position or by case-insensitive name.
pub trait ColumnIndex {
    fn position(&self, row: &NativeRow) -> Option<usize>;
}

impl ColumnIndex for usize {
    fn position(&self, row: &NativeRow) -> Option<usize> {
        (*self < row.values.len()).then_some(*self)
    }
}

impl ColumnIndex for &str {
    fn position(&self, row: &NativeRow) -> Option<usize> {
        row.columns
            .iter()
            .position(|c| c == self)
            .or_else(|| row.columns.iter().position(|c| c.eq_ignore_ascii_case(self)))
    }
}

impl NativeRow {
    pub fn new(columns: Arc<[String]>, values: Vec<Option<Scalar>>) -> Self {
        Self { columns, values }
    }

    pub fn value(&self, index: impl ColumnIndex) -> Option<&Scalar> {
        index
            .position(self)
            .and_then(|i| self.values.get(i))
            .and_then(Option::as_ref)
    }

    /// Read a column through the value converter.
    pub fn get<T: FromScalar>(&self, index: impl ColumnIndex) -> Result<T, ConversionError> {
        let value = index
            .position(self)
            .and_then(|i| self.values.get(i).cloned())
            .flatten();
        T::from_value(value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Per-connection memo of facts probed from the server.
#[derive(Debug, Default)]
pub struct SessionCache {
    entries: Mutex<HashMap<&'static str, String>>,
}

impl SessionCache {
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn insert(&self, key: &'static str, value: impl Into<String>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value.into());
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// A column of a bulk load.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkColumn {
    /// Quoted column name.
    pub name: String,
    pub native_type: NativeType,
}

/// Rows destined for a freshly created staging table.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkLoad {
    /// Quoted table name.
    pub table: String,
    pub columns: Vec<BulkColumn>,
    /// Backend-transformed values, one vector per row in column order.
    pub rows: Vec<Vec<Option<Scalar>>>,
    pub transaction: Option<TransactionId>,
    pub timeout: Option<Duration>,
}

/// A live connection to one database session.
#[async_trait]
pub trait NativeConnection: Send + Sync {
    fn dialect(&self) -> Dialect;

    fn session_cache(&self) -> &SessionCache;

    /// Run a command, returning the number of affected rows.
    async fn execute(&self, command: &NativeCommand) -> Result<u64, DriverError>;

    async fn query(&self, command: &NativeCommand) -> Result<Vec<NativeRow>, DriverError>;

    /// First column of the first row.
    async fn query_scalar(&self, command: &NativeCommand) -> Result<Option<Scalar>, DriverError> {
        let rows = self.query(command).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.values.into_iter().next())
            .flatten())
    }

    /// Load rows through the driver's bulk path. `Ok(false)` means the driver
    /// has no bulk path and the caller should insert row by row.
    async fn bulk_load(&self, _load: &BulkLoad) -> Result<bool, DriverError> {
        Ok(false)
    }

    /// Accept a cleanup statement that could not run synchronously, e.g. a
    /// staging table drop from a `Drop` impl. Must not block.
    fn defer_cleanup(&self, command: NativeCommand) {
        tracing::warn!(sql = %command.text, "connection cannot defer cleanup; statement dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> NativeRow {
        NativeRow::new(
            Arc::from(vec!["Id".to_string(), "Name".to_string()]),
            vec![Some(Scalar::Int64(7)), None],
        )
    }

    #[test]
    fn test_row_get_by_name_and_index() {
        let row = row();
        assert_eq!(row.get::<i32>("id").unwrap(), 7);
        assert_eq!(row.get::<i64>(0).unwrap(), 7);
        assert_eq!(row.get::<Option<String>>("Name").unwrap(), None);
        assert!(row.get::<String>("Name").is_err());
        assert_eq!(row.value("missing"), None);
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let command = NativeCommand::new("SELECT 1");
        let copy = command.clone();
        command.cancel_handle().store(true, Ordering::SeqCst);
        assert!(copy.is_cancel_requested());
    }

    #[test]
    fn test_session_cache() {
        let cache = SessionCache::default();
        assert_eq!(cache.get("prefix"), None);
        cache.insert("prefix", "ORA$PTT_");
        assert_eq!(cache.get("prefix").as_deref(), Some("ORA$PTT_"));
    }
}
