use super::{
    ColumnDefinition, Dialect, DialectAdapter, NativeType, SessionProfile, base_native_type,
    column_list, quote_with, serialize_enum, unsupported,
};
use crate::config::EnumSerialization;
use crate::error::{ConversionError, DriverError, Result};
use crate::value::{Scalar, ScalarKind};

pub struct SqlServerAdapter;

impl DialectAdapter for SqlServerAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::SqlServer
    }

    fn parameter_reference(&self, name: &str, _ordinal: usize) -> String {
        self.format_parameter_name(name)
    }

    fn quote_identifier(&self, name: &str) -> String {
        quote_with(name, '[', ']')
    }

    fn quote_temporary_table_name(&self, name: &str, _profile: &SessionProfile) -> String {
        self.quote_identifier(&format!("#{}", name))
    }

    fn native_type(&self, kind: ScalarKind, enums: EnumSerialization) -> Result<NativeType> {
        match kind {
            ScalarKind::Duration => Ok(NativeType::Time),
            _ => base_native_type(kind, enums, Dialect::SqlServer),
        }
    }

    fn native_type_name(&self, kind: ScalarKind, enums: EnumSerialization) -> Result<String> {
        let name = match kind {
            ScalarKind::Boolean => "BIT",
            // TINYINT is unsigned here
            ScalarKind::Int8 | ScalarKind::Int16 => "SMALLINT",
            ScalarKind::Int32 => "INT",
            ScalarKind::Int64 => "BIGINT",
            ScalarKind::Float32 => "REAL",
            ScalarKind::Float64 => "FLOAT",
            ScalarKind::Decimal => "DECIMAL(38, 18)",
            ScalarKind::Text => "NVARCHAR(MAX)",
            ScalarKind::Char => "NCHAR(1)",
            ScalarKind::Binary => "VARBINARY(MAX)",
            ScalarKind::Date => "DATE",
            ScalarKind::Time | ScalarKind::Duration => "TIME",
            ScalarKind::DateTime => "DATETIME2",
            ScalarKind::DateTimeOffset => "DATETIMEOFFSET",
            ScalarKind::Guid => "UNIQUEIDENTIFIER",
            ScalarKind::Enum(_) => match enums {
                EnumSerialization::AsIntegers => "BIGINT",
                EnumSerialization::AsText => "NVARCHAR(200)",
            },
            ScalarKind::Any => return Err(unsupported(kind, Dialect::SqlServer)),
        };
        Ok(name.to_string())
    }

    fn transform_value(
        &self,
        value: Scalar,
        enums: EnumSerialization,
    ) -> std::result::Result<Scalar, ConversionError> {
        match value {
            Scalar::Duration(_) => value.convert_to(ScalarKind::Time),
            other => Ok(serialize_enum(other, enums)),
        }
    }

    fn is_cancellation_error(&self, error: &DriverError) -> bool {
        error.number == Some(0)
            || error
                .message
                .to_ascii_lowercase()
                .contains("operation cancelled by user")
    }

    fn create_temporary_table_sql(&self, quoted_name: &str, columns: &[ColumnDefinition]) -> String {
        format!("CREATE TABLE {} ({})", quoted_name, column_list(columns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_naming() {
        let adapter = SqlServerAdapter;
        let profile = SessionProfile::offline(Dialect::SqlServer);
        assert_eq!(adapter.parameter_reference("Answer", 1), "@Answer");
        assert_eq!(adapter.quote_identifier("Order"), "[Order]");
        assert_eq!(adapter.quote_temporary_table_name("Ids_3", &profile), "[#Ids_3]");
        assert_eq!(adapter.drop_temporary_table_sql("[#Ids_3]"), "DROP TABLE [#Ids_3]");
    }

    #[test]
    fn test_duration_binds_as_time() {
        let p = SqlServerAdapter
            .bind_parameter(
                "Span",
                ScalarKind::Duration,
                Some(Scalar::Duration(chrono::Duration::minutes(90))),
                EnumSerialization::AsIntegers,
            )
            .unwrap();
        assert_eq!(p.native_type, NativeType::Time);
        assert_eq!(p.value.unwrap().to_string(), "01:30:00");
    }

    #[test]
    fn test_cancellation_shape() {
        let adapter = SqlServerAdapter;
        assert!(adapter.is_cancellation_error(&DriverError::new("x").with_number(0)));
        assert!(adapter.is_cancellation_error(&DriverError::new(
            "A severe error occurred. Operation cancelled by user."
        )));
        assert!(!adapter.is_cancellation_error(&DriverError::new("deadlock").with_number(1205)));
    }
}
