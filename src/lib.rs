//! # sqlstitch
//!
//! > **Write SQL as text. Bind values as values.**
//!
//! sqlstitch turns interpolated SQL fragments into native commands: literal
//! text stays text, interpolated values become bound parameters, and
//! collections become temporary tables staged just before the command runs.
//!
//! ## Quick Example
//!
//! ```rust
//! use sqlstitch::prelude::*;
//!
//! let customer = 42;
//! let ids = vec![1_i64, 2, 3];
//! let statement = sql!(
//!     "SELECT * FROM Orders WHERE CustomerId = ", param(customer),
//!     " AND Id IN (SELECT Value FROM ", temp_table(&ids), ")"
//! );
//!
//! let compiled = compile(
//!     &statement,
//!     Dialect::SqlServer.adapter(),
//!     &SessionProfile::offline(Dialect::SqlServer),
//!     &Settings::default(),
//! )
//! .unwrap();
//! assert!(compiled.text.starts_with("SELECT * FROM Orders WHERE CustomerId = @Customer AND Id IN (SELECT Value FROM [#Ids_"));
//! ```
//!
//! ## Dialects
//!
//! | Dialect    | Parameter | Temporary table            |
//! |------------|-----------|----------------------------|
//! | SQL Server | `@Name`   | `[#Name]`                  |
//! | PostgreSQL | `$1`      | `"Name"` (`CREATE TEMP`)   |
//! | MySQL      | `?`       | `` `Name` ``               |
//! | SQLite     | `?1`      | `temp."Name"`              |
//! | Oracle     | `:Name`   | `"ORA$PTT_Name"` (18c+)    |

pub mod cancel;
pub mod command;
pub mod compiler;
pub mod config;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod fragment;
pub mod native;
pub mod staging;
pub mod value;

pub mod prelude {
    pub use crate::cancel::{CancellationRegistration, CancellationSignal};
    pub use crate::command::{
        CommandOptions, PreparedCommand, compile_and_prepare, compile_and_prepare_blocking,
    };
    pub use crate::compiler::{CompiledStatement, compile, compile_blocking, compile_for};
    pub use crate::config::{EnumSerialization, Settings};
    pub use crate::dialect::{Dialect, DialectAdapter, NativeType, SessionProfile};
    pub use crate::engine::{SqlxConnection, SqlxTransaction};
    pub use crate::error::*;
    pub use crate::fragment::{
        Fragment, ParameterValue, Statement, TableRecord, TemplateArgs, TemporaryTableRequest,
    };
    pub use crate::native::{NativeCommand, NativeConnection, NativeRow, NativeTransaction};
    pub use crate::value::{FromScalar, Scalar, ScalarKind, ScalarType, SqlEnum, ToScalar};
    pub use crate::{sql, sql_enum, table_record};
}

pub use compiler::compile;
pub use error::{Error, Result};
pub use fragment::Statement;

/// Parse a `{@Param}` / `{#Table}` template into a statement.
///
/// # Example
///
/// ```
/// use sqlstitch::fragment::TemplateArgs;
///
/// let args = TemplateArgs::new().param("Id", &7);
/// let statement = sqlstitch::parse("SELECT * FROM T WHERE Id = {@Id}", &args).unwrap();
/// assert_eq!(statement.fragments().len(), 2);
/// ```
pub fn parse(template: &str, args: &fragment::TemplateArgs) -> Result<Statement> {
    fragment::template::parse(template, args)
}
