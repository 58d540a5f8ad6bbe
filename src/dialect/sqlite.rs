use super::{
    ColumnDefinition, Dialect, DialectAdapter, NativeType, SessionProfile, base_native_type,
    column_list, serialize_enum, unsupported,
};
use crate::config::EnumSerialization;
use crate::error::{ConversionError, DriverError, Result};
use crate::value::{Scalar, ScalarKind};

/// SQLITE_INTERRUPT
const INTERRUPT: i64 = 9;

pub struct SqliteAdapter;

/// Kinds SQLite has no storage class for; they travel as canonical text.
fn stored_as_text(kind: ScalarKind) -> bool {
    matches!(
        kind,
        ScalarKind::Decimal
            | ScalarKind::Date
            | ScalarKind::Time
            | ScalarKind::DateTime
            | ScalarKind::DateTimeOffset
            | ScalarKind::Duration
            | ScalarKind::Guid
    )
}

impl DialectAdapter for SqliteAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn parameter_reference(&self, _name: &str, ordinal: usize) -> String {
        format!("?{}", ordinal)
    }

    fn quote_temporary_table_name(&self, name: &str, _profile: &SessionProfile) -> String {
        format!("temp.{}", self.quote_identifier(name))
    }

    fn native_type(&self, kind: ScalarKind, enums: EnumSerialization) -> Result<NativeType> {
        if stored_as_text(kind) {
            return Ok(NativeType::Text);
        }
        base_native_type(kind, enums, Dialect::Sqlite)
    }

    fn native_type_name(&self, kind: ScalarKind, enums: EnumSerialization) -> Result<String> {
        let name = match kind {
            ScalarKind::Any => return Err(unsupported(kind, Dialect::Sqlite)),
            kind if stored_as_text(kind) => "TEXT",
            ScalarKind::Boolean
            | ScalarKind::Int8
            | ScalarKind::Int16
            | ScalarKind::Int32
            | ScalarKind::Int64 => "INTEGER",
            ScalarKind::Float32 | ScalarKind::Float64 => "REAL",
            ScalarKind::Binary => "BLOB",
            ScalarKind::Enum(_) => match enums {
                EnumSerialization::AsIntegers => "INTEGER",
                EnumSerialization::AsText => "TEXT",
            },
            _ => "TEXT",
        };
        Ok(name.to_string())
    }

    fn transform_value(
        &self,
        value: Scalar,
        enums: EnumSerialization,
    ) -> std::result::Result<Scalar, ConversionError> {
        if stored_as_text(value.kind()) {
            return value.convert_to(ScalarKind::Text);
        }
        Ok(serialize_enum(value, enums))
    }

    fn is_cancellation_error(&self, error: &DriverError) -> bool {
        error.number == Some(INTERRUPT)
            || error.code.as_deref() == Some("9")
            || error.message.contains("SQLITE_INTERRUPT")
            || error.message.eq_ignore_ascii_case("interrupted")
    }

    fn create_temporary_table_sql(&self, quoted_name: &str, columns: &[ColumnDefinition]) -> String {
        format!("CREATE TEMP TABLE {} ({})", quoted_name, column_list(columns))
    }
}
