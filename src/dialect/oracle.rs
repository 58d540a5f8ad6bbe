//! Oracle: named `:Name` parameters and private temporary tables.
//!
//! Private temporary tables exist from Oracle 18 on and must carry the
//! session's `private_temp_table_prefix`. Both facts are probed once per
//! connection and kept in its [`SessionCache`](crate::native::SessionCache).

use async_trait::async_trait;

use super::{
    ColumnDefinition, Dialect, DialectAdapter, NativeType, SessionProfile, base_native_type,
    column_list, serialize_enum, unsupported,
};
use crate::config::EnumSerialization;
use crate::error::{ConversionError, DriverError, Error, Result};
use crate::native::{NativeCommand, NativeConnection};
use crate::value::{Scalar, ScalarKind};

pub const DEFAULT_PRIVATE_TEMP_TABLE_PREFIX: &str = "ORA$PTT_";

const PRIVATE_TEMP_TABLES_SINCE: u32 = 18;

const VERSION_QUERY: &str =
    "SELECT version FROM product_component_version WHERE product LIKE 'Oracle Database%'";
const PREFIX_QUERY: &str =
    "SELECT value FROM v$parameter WHERE name = 'private_temp_table_prefix'";

const CACHE_TEMPORARY_TABLES: &str = "oracle.temporary_tables";
const CACHE_PREFIX: &str = "oracle.private_temp_table_prefix";

/// ORA-01013: user requested cancel of current operation
const USER_CANCEL: &str = "ORA-01013";

pub struct OracleAdapter;

/// Major version from a string like `19.0.0.0.0`.
fn major_version(version: &str) -> Option<u32> {
    version.trim().split('.').next()?.parse().ok()
}

#[async_trait]
impl DialectAdapter for OracleAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Oracle
    }

    fn format_parameter_name(&self, name: &str) -> String {
        format!(":{}", name)
    }

    fn parameter_reference(&self, name: &str, _ordinal: usize) -> String {
        self.format_parameter_name(name)
    }

    fn quote_temporary_table_name(&self, name: &str, profile: &SessionProfile) -> String {
        let prefix = profile
            .temporary_table_prefix
            .as_deref()
            .unwrap_or(DEFAULT_PRIVATE_TEMP_TABLE_PREFIX);
        self.quote_identifier(&format!("{}{}", prefix, name))
    }

    fn native_type(&self, kind: ScalarKind, enums: EnumSerialization) -> Result<NativeType> {
        match kind {
            ScalarKind::Boolean => Ok(NativeType::SmallInt),
            ScalarKind::Guid => Ok(NativeType::Binary),
            ScalarKind::Time => Ok(NativeType::Interval),
            _ => base_native_type(kind, enums, Dialect::Oracle),
        }
    }

    fn native_type_name(&self, kind: ScalarKind, enums: EnumSerialization) -> Result<String> {
        let name = match kind {
            ScalarKind::Boolean => "NUMBER(1)",
            ScalarKind::Int8 => "NUMBER(3)",
            ScalarKind::Int16 => "NUMBER(5)",
            ScalarKind::Int32 => "NUMBER(10)",
            ScalarKind::Int64 => "NUMBER(19)",
            ScalarKind::Float32 => "BINARY_FLOAT",
            ScalarKind::Float64 => "BINARY_DOUBLE",
            ScalarKind::Decimal => "NUMBER",
            ScalarKind::Text => "NVARCHAR2(2000)",
            ScalarKind::Char => "NCHAR(1)",
            ScalarKind::Binary => "BLOB",
            ScalarKind::Date => "DATE",
            ScalarKind::Time | ScalarKind::Duration => "INTERVAL DAY TO SECOND",
            ScalarKind::DateTime => "TIMESTAMP",
            ScalarKind::DateTimeOffset => "TIMESTAMP WITH TIME ZONE",
            ScalarKind::Guid => "RAW(16)",
            ScalarKind::Enum(_) => match enums {
                EnumSerialization::AsIntegers => "NUMBER(19)",
                EnumSerialization::AsText => "NVARCHAR2(200)",
            },
            ScalarKind::Any => return Err(unsupported(kind, Dialect::Oracle)),
        };
        Ok(name.to_string())
    }

    fn transform_value(
        &self,
        value: Scalar,
        enums: EnumSerialization,
    ) -> std::result::Result<Scalar, ConversionError> {
        match value {
            Scalar::Bool(v) => Ok(Scalar::Int16(i16::from(v))),
            Scalar::Guid(v) => Ok(Scalar::Binary(v.as_bytes().to_vec())),
            Scalar::Time(_) => value.convert_to(ScalarKind::Duration),
            other => Ok(serialize_enum(other, enums)),
        }
    }

    async fn supports_temporary_tables(&self, connection: &dyn NativeConnection) -> Result<bool> {
        let cache = connection.session_cache();
        if let Some(cached) = cache.get(CACHE_TEMPORARY_TABLES) {
            return Ok(cached == "true");
        }

        let version = connection
            .query_scalar(&NativeCommand::new(VERSION_QUERY))
            .await
            .map_err(|e| Error::driver("probing the Oracle server version", e))?;
        let supported = version
            .map(|v| v.to_string())
            .and_then(|v| major_version(&v))
            .is_some_and(|major| major >= PRIVATE_TEMP_TABLES_SINCE);

        tracing::debug!(supported, "probed Oracle private temporary table support");
        cache.insert(CACHE_TEMPORARY_TABLES, supported.to_string());
        Ok(supported)
    }

    async fn session_profile(&self, connection: &dyn NativeConnection) -> Result<SessionProfile> {
        let temporary_tables = self.supports_temporary_tables(connection).await?;
        if !temporary_tables {
            return Ok(SessionProfile {
                dialect: Dialect::Oracle,
                temporary_tables,
                temporary_table_prefix: None,
            });
        }

        let cache = connection.session_cache();
        let prefix = match cache.get(CACHE_PREFIX) {
            Some(prefix) => prefix,
            None => {
                let fetched = connection
                    .query_scalar(&NativeCommand::new(PREFIX_QUERY))
                    .await
                    .map_err(|e| Error::driver("reading private_temp_table_prefix", e))?
                    .map(|v| v.to_string())
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| DEFAULT_PRIVATE_TEMP_TABLE_PREFIX.to_string());
                cache.insert(CACHE_PREFIX, fetched.clone());
                fetched
            }
        };

        Ok(SessionProfile {
            dialect: Dialect::Oracle,
            temporary_tables,
            temporary_table_prefix: Some(prefix),
        })
    }

    fn is_cancellation_error(&self, error: &DriverError) -> bool {
        error.code.as_deref() == Some(USER_CANCEL)
            || error.number == Some(1013)
            || error.message.contains(USER_CANCEL)
    }

    fn create_temporary_table_sql(&self, quoted_name: &str, columns: &[ColumnDefinition]) -> String {
        format!(
            "CREATE PRIVATE TEMPORARY TABLE {} ({}) ON COMMIT PRESERVE DEFINITION",
            quoted_name,
            column_list(columns)
        )
    }
}
