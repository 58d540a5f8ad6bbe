//! Per-backend rules: quoting, parameter syntax, type mapping, staging DDL
//! and cancellation detection.

pub mod mysql;
pub mod oracle;
pub mod postgres;
pub mod sqlite;
pub mod sqlserver;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cancel::CancellationSignal;
use crate::config::EnumSerialization;
use crate::error::{ConversionError, DriverError, Error, Result};
use crate::native::{BoundParameter, NativeConnection};
use crate::value::{Scalar, ScalarKind, convert};

use mysql::MySqlAdapter;
use oracle::OracleAdapter;
use postgres::PostgresAdapter;
use sqlite::SqliteAdapter;
use sqlserver::SqlServerAdapter;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    MySql,
    Postgres,
    SqlServer,
    Sqlite,
    Oracle,
}

impl Dialect {
    pub const ALL: [Dialect; 5] = [
        Dialect::MySql,
        Dialect::Postgres,
        Dialect::SqlServer,
        Dialect::Sqlite,
        Dialect::Oracle,
    ];

    /// The shared adapter for this backend.
    pub fn adapter(self) -> &'static dyn DialectAdapter {
        match self {
            Dialect::MySql => &MySqlAdapter,
            Dialect::Postgres => &PostgresAdapter,
            Dialect::SqlServer => &SqlServerAdapter,
            Dialect::Sqlite => &SqliteAdapter,
            Dialect::Oracle => &OracleAdapter,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::MySql => "MySQL",
            Dialect::Postgres => "PostgreSQL",
            Dialect::SqlServer => "SQL Server",
            Dialect::Sqlite => "SQLite",
            Dialect::Oracle => "Oracle",
        };
        f.write_str(name)
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "sqlserver" | "mssql" | "sql-server" => Ok(Dialect::SqlServer),
            "sqlite" => Ok(Dialect::Sqlite),
            "oracle" => Ok(Dialect::Oracle),
            other => Err(Error::Config(format!("Unknown dialect: {}", other))),
        }
    }
}

/// Backend-neutral tag for how a parameter or column is typed natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Decimal,
    Text,
    Char,
    Binary,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Interval,
    Uuid,
}

/// What the adapter knows about the session it compiles for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProfile {
    pub dialect: Dialect,
    pub temporary_tables: bool,
    /// Name prefix the server requires for temporary tables.
    pub temporary_table_prefix: Option<String>,
}

impl SessionProfile {
    /// A profile for compiling without a connection.
    pub fn offline(dialect: Dialect) -> Self {
        Self {
            dialect,
            temporary_tables: true,
            temporary_table_prefix: (dialect == Dialect::Oracle)
                .then(|| oracle::DEFAULT_PRIVATE_TEMP_TABLE_PREFIX.to_string()),
        }
    }

    /// Probe the connection through its dialect's adapter.
    pub async fn resolve(connection: &dyn NativeConnection) -> Result<Self> {
        connection
            .dialect()
            .adapter()
            .session_profile(connection)
            .await
    }

    pub fn without_temporary_tables(mut self) -> Self {
        self.temporary_tables = false;
        self
    }
}

/// A staging table column: quoted name and DDL type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    pub type_name: String,
}

#[async_trait]
pub trait DialectAdapter: Send + Sync {
    fn dialect(&self) -> Dialect;

    fn format_parameter_name(&self, name: &str) -> String {
        format!("@{}", name)
    }

    /// The text emitted into the command for the `ordinal`th (1-based) parameter.
    fn parameter_reference(&self, name: &str, ordinal: usize) -> String;

    fn quote_identifier(&self, name: &str) -> String {
        quote_with(name, '"', '"')
    }

    fn quote_temporary_table_name(&self, name: &str, profile: &SessionProfile) -> String;

    fn native_type(&self, kind: ScalarKind, enums: EnumSerialization) -> Result<NativeType> {
        base_native_type(kind, enums, self.dialect())
    }

    /// The DDL column type for a kind.
    fn native_type_name(&self, kind: ScalarKind, enums: EnumSerialization) -> Result<String>;

    /// Reshape an already converted value into what the backend binds.
    fn transform_value(
        &self,
        value: Scalar,
        enums: EnumSerialization,
    ) -> std::result::Result<Scalar, ConversionError> {
        Ok(serialize_enum(value, enums))
    }

    fn bind_parameter(
        &self,
        name: &str,
        kind: ScalarKind,
        value: Option<Scalar>,
        enums: EnumSerialization,
    ) -> Result<BoundParameter> {
        // Type-erased parameters bind as whatever they hold.
        let declared = match (kind, &value) {
            (ScalarKind::Any, Some(v)) => v.kind(),
            (ScalarKind::Any, None) => ScalarKind::Text,
            (kind, _) => kind,
        };
        let native_type = self.native_type(declared, enums)?;
        let value = convert(value, declared.nullable())?
            .map(|v| self.transform_value(v, enums))
            .transpose()?;
        Ok(BoundParameter {
            name: name.to_string(),
            placeholder: self.format_parameter_name(name),
            native_type,
            kind: declared,
            value,
        })
    }

    async fn supports_temporary_tables(&self, _connection: &dyn NativeConnection) -> Result<bool> {
        Ok(true)
    }

    async fn session_profile(&self, connection: &dyn NativeConnection) -> Result<SessionProfile> {
        Ok(SessionProfile {
            dialect: self.dialect(),
            temporary_tables: self.supports_temporary_tables(connection).await?,
            temporary_table_prefix: None,
        })
    }

    /// Whether the driver error has this backend's "cancelled" shape.
    fn is_cancellation_error(&self, error: &DriverError) -> bool;

    /// True only when the caller actually cancelled and the error looks like
    /// a cancellation.
    fn classify_cancellation(&self, error: &DriverError, signal: &CancellationSignal) -> bool {
        signal.is_cancelled() && self.is_cancellation_error(error)
    }

    fn create_temporary_table_sql(
        &self,
        quoted_name: &str,
        columns: &[ColumnDefinition],
    ) -> String;

    fn drop_temporary_table_sql(&self, quoted_name: &str) -> String {
        format!("DROP TABLE {}", quoted_name)
    }
}

/// Wrap `name` in quotes, doubling embedded closing quotes.
pub fn quote_with(name: &str, open: char, close: char) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push(open);
    for c in name.chars() {
        if c == close {
            out.push(close);
        }
        out.push(c);
    }
    out.push(close);
    out
}

pub(crate) fn column_list(columns: &[ColumnDefinition]) -> String {
    columns
        .iter()
        .map(|c| format!("{} {}", c.name, c.type_name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Enums become their discriminant or their symbol. Other values pass.
pub fn serialize_enum(value: Scalar, enums: EnumSerialization) -> Scalar {
    match value {
        Scalar::Enum(v) => match enums {
            EnumSerialization::AsIntegers => Scalar::Int64(v.discriminant),
            EnumSerialization::AsText => Scalar::Text(v.symbol.to_string()),
        },
        other => other,
    }
}

pub(crate) fn base_native_type(
    kind: ScalarKind,
    enums: EnumSerialization,
    dialect: Dialect,
) -> Result<NativeType> {
    Ok(match kind {
        ScalarKind::Boolean => NativeType::Boolean,
        ScalarKind::Int8 => NativeType::TinyInt,
        ScalarKind::Int16 => NativeType::SmallInt,
        ScalarKind::Int32 => NativeType::Integer,
        ScalarKind::Int64 => NativeType::BigInt,
        ScalarKind::Float32 => NativeType::Real,
        ScalarKind::Float64 => NativeType::Double,
        ScalarKind::Decimal => NativeType::Decimal,
        ScalarKind::Text => NativeType::Text,
        ScalarKind::Char => NativeType::Char,
        ScalarKind::Binary => NativeType::Binary,
        ScalarKind::Date => NativeType::Date,
        ScalarKind::Time => NativeType::Time,
        ScalarKind::DateTime => NativeType::Timestamp,
        ScalarKind::DateTimeOffset => NativeType::TimestampTz,
        ScalarKind::Duration => NativeType::Interval,
        ScalarKind::Guid => NativeType::Uuid,
        ScalarKind::Enum(_) => match enums {
            EnumSerialization::AsIntegers => NativeType::BigInt,
            EnumSerialization::AsText => NativeType::Text,
        },
        ScalarKind::Any => return Err(Error::UnsupportedType { kind, dialect }),
    })
}

pub(crate) fn unsupported(kind: ScalarKind, dialect: Dialect) -> Error {
    Error::UnsupportedType { kind, dialect }
}
