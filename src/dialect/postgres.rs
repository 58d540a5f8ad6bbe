use super::{
    ColumnDefinition, Dialect, DialectAdapter, SessionProfile, column_list, unsupported,
};
use crate::config::EnumSerialization;
use crate::error::{DriverError, Result};
use crate::value::ScalarKind;

/// SQLSTATE `query_canceled`.
const QUERY_CANCELED: &str = "57014";

pub struct PostgresAdapter;

impl DialectAdapter for PostgresAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn parameter_reference(&self, _name: &str, ordinal: usize) -> String {
        format!("${}", ordinal)
    }

    fn quote_temporary_table_name(&self, name: &str, _profile: &SessionProfile) -> String {
        self.quote_identifier(name)
    }

    fn native_type_name(&self, kind: ScalarKind, enums: EnumSerialization) -> Result<String> {
        let name = match kind {
            ScalarKind::Boolean => "BOOLEAN",
            ScalarKind::Int8 | ScalarKind::Int16 => "SMALLINT",
            ScalarKind::Int32 => "INTEGER",
            ScalarKind::Int64 => "BIGINT",
            ScalarKind::Float32 => "REAL",
            ScalarKind::Float64 => "DOUBLE PRECISION",
            ScalarKind::Decimal => "NUMERIC",
            ScalarKind::Text => "TEXT",
            ScalarKind::Char => "CHAR(1)",
            ScalarKind::Binary => "BYTEA",
            ScalarKind::Date => "DATE",
            ScalarKind::Time => "TIME",
            ScalarKind::DateTime => "TIMESTAMP",
            ScalarKind::DateTimeOffset => "TIMESTAMPTZ",
            ScalarKind::Duration => "INTERVAL",
            ScalarKind::Guid => "UUID",
            ScalarKind::Enum(_) => match enums {
                EnumSerialization::AsIntegers => "BIGINT",
                EnumSerialization::AsText => "VARCHAR(200)",
            },
            ScalarKind::Any => return Err(unsupported(kind, Dialect::Postgres)),
        };
        Ok(name.to_string())
    }

    fn is_cancellation_error(&self, error: &DriverError) -> bool {
        error.code.as_deref() == Some(QUERY_CANCELED)
    }

    fn create_temporary_table_sql(&self, quoted_name: &str, columns: &[ColumnDefinition]) -> String {
        format!("CREATE TEMP TABLE {} ({})", quoted_name, column_list(columns))
    }
}
