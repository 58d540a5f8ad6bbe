use super::{
    ColumnDefinition, Dialect, DialectAdapter, NativeType, SessionProfile, base_native_type,
    column_list, quote_with, serialize_enum, unsupported,
};
use crate::config::EnumSerialization;
use crate::error::{ConversionError, DriverError, Result};
use crate::value::{Scalar, ScalarKind};

/// ER_QUERY_INTERRUPTED
const QUERY_INTERRUPTED: i64 = 1317;
const QUERY_INTERRUPTED_STATE: &str = "70100";

pub struct MySqlAdapter;

impl DialectAdapter for MySqlAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    fn parameter_reference(&self, _name: &str, _ordinal: usize) -> String {
        "?".to_string()
    }

    fn quote_identifier(&self, name: &str) -> String {
        quote_with(name, '`', '`')
    }

    fn quote_temporary_table_name(&self, name: &str, _profile: &SessionProfile) -> String {
        self.quote_identifier(name)
    }

    fn native_type(&self, kind: ScalarKind, enums: EnumSerialization) -> Result<NativeType> {
        match kind {
            ScalarKind::DateTimeOffset => Ok(NativeType::Timestamp),
            ScalarKind::Guid => Ok(NativeType::Text),
            _ => base_native_type(kind, enums, Dialect::MySql),
        }
    }

    fn native_type_name(&self, kind: ScalarKind, enums: EnumSerialization) -> Result<String> {
        let name = match kind {
            ScalarKind::Boolean => "BOOLEAN",
            ScalarKind::Int8 => "TINYINT",
            ScalarKind::Int16 => "SMALLINT",
            ScalarKind::Int32 => "INT",
            ScalarKind::Int64 => "BIGINT",
            ScalarKind::Float32 => "FLOAT",
            ScalarKind::Float64 => "DOUBLE",
            ScalarKind::Decimal => "DECIMAL(65, 30)",
            ScalarKind::Text => "LONGTEXT",
            ScalarKind::Char => "CHAR(1)",
            ScalarKind::Binary => "LONGBLOB",
            ScalarKind::Date => "DATE",
            ScalarKind::Time | ScalarKind::Duration => "TIME(6)",
            ScalarKind::DateTime | ScalarKind::DateTimeOffset => "DATETIME(6)",
            ScalarKind::Guid => "CHAR(36)",
            ScalarKind::Enum(_) => match enums {
                EnumSerialization::AsIntegers => "BIGINT",
                EnumSerialization::AsText => "VARCHAR(200)",
            },
            ScalarKind::Any => return Err(unsupported(kind, Dialect::MySql)),
        };
        Ok(name.to_string())
    }

    fn transform_value(
        &self,
        value: Scalar,
        enums: EnumSerialization,
    ) -> std::result::Result<Scalar, ConversionError> {
        match value {
            Scalar::DateTimeOffset(v) => Ok(Scalar::DateTime(v.naive_utc())),
            Scalar::Guid(v) => Ok(Scalar::Text(v.hyphenated().to_string())),
            other => Ok(serialize_enum(other, enums)),
        }
    }

    fn is_cancellation_error(&self, error: &DriverError) -> bool {
        error.number == Some(QUERY_INTERRUPTED)
            || error.code.as_deref() == Some(QUERY_INTERRUPTED_STATE)
    }

    fn create_temporary_table_sql(&self, quoted_name: &str, columns: &[ColumnDefinition]) -> String {
        format!("CREATE TEMPORARY TABLE {} ({})", quoted_name, column_list(columns))
    }

    fn drop_temporary_table_sql(&self, quoted_name: &str) -> String {
        format!("DROP TEMPORARY TABLE {}", quoted_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    #[test]
    fn test_offset_binds_as_utc() {
        let local = FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .unwrap();
        let p = MySqlAdapter
            .bind_parameter(
                "At",
                ScalarKind::DateTimeOffset,
                Some(Scalar::DateTimeOffset(local)),
                EnumSerialization::AsIntegers,
            )
            .unwrap();
        assert_eq!(p.native_type, NativeType::Timestamp);
        assert_eq!(p.value.unwrap().to_string(), "2024-05-01T10:00:00");
    }

    #[test]
    fn test_quoting() {
        let adapter = MySqlAdapter;
        assert_eq!(adapter.quote_identifier("a`b"), "`a``b`");
        assert_eq!(adapter.parameter_reference("X", 4), "?");
        assert_eq!(adapter.drop_temporary_table_sql("`t`"), "DROP TEMPORARY TABLE `t`");
    }

    #[test]
    fn test_cancellation_shape() {
        assert!(MySqlAdapter.is_cancellation_error(
            &DriverError::new("Query execution was interrupted").with_number(1317)
        ));
        assert!(!MySqlAdapter.is_cancellation_error(&DriverError::new("x").with_number(1062)));
    }
}
