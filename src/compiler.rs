//! Statement compilation: fragments to native command text, bound parameters
//! and the temporary tables to stage.

use crate::config::Settings;
use crate::dialect::{Dialect, DialectAdapter, SessionProfile};
use crate::error::{Error, Result};
use crate::fragment::{Fragment, ParameterValue, Statement, TemporaryTableRequest};
use crate::native::{BoundParameter, NativeConnection};

/// A temporary table the statement refers to, with its quoted name.
#[derive(Debug, Clone)]
pub struct TemporaryTablePlan {
    pub request: TemporaryTableRequest,
    pub quoted_name: String,
}

#[derive(Debug, Clone)]
pub struct CompiledStatement {
    pub text: String,
    pub parameters: Vec<BoundParameter>,
    /// In order of first appearance.
    pub temporary_tables: Vec<TemporaryTablePlan>,
}

/// Case-insensitive name de-duplication: `Name`, `Name2`, `Name3`, ...
#[derive(Debug, Default)]
struct NameRegistry {
    taken: Vec<String>,
}

impl NameRegistry {
    fn is_taken(&self, name: &str) -> bool {
        self.taken.iter().any(|t| t.eq_ignore_ascii_case(name))
    }

    fn claim(&mut self, base: &str) -> String {
        let mut name = base.to_string();
        let mut suffix = 2;
        while self.is_taken(&name) {
            name = format!("{}{}", base, suffix);
            suffix += 1;
        }
        self.taken.push(name.clone());
        name
    }
}

struct Binder<'a> {
    adapter: &'a dyn DialectAdapter,
    settings: &'a Settings,
    names: NameRegistry,
    parameters: Vec<BoundParameter>,
}

impl Binder<'_> {
    /// Bind under a unique name derived from `requested`; returns the text
    /// reference for the command.
    fn bind(&mut self, requested: &str, value: &ParameterValue) -> Result<String> {
        let ordinal = self.parameters.len() + 1;
        let base = if requested.is_empty() {
            format!("Parameter_{}", ordinal)
        } else {
            requested.to_string()
        };
        let name = self.names.claim(&base);
        let bound = self.adapter.bind_parameter(
            &name,
            value.kind,
            value.value.clone(),
            self.settings.enum_serialization,
        )?;
        let reference = self.adapter.parameter_reference(&name, ordinal);
        self.parameters.push(bound);
        Ok(reference)
    }
}

/// Compile a statement for a known session profile.
pub fn compile(
    statement: &Statement,
    adapter: &dyn DialectAdapter,
    profile: &SessionProfile,
    settings: &Settings,
) -> Result<CompiledStatement> {
    let mut text = String::new();
    let mut tables: Vec<TemporaryTablePlan> = Vec::new();
    let mut binder = Binder {
        adapter,
        settings,
        names: NameRegistry::default(),
        parameters: Vec::new(),
    };

    for fragment in statement.fragments() {
        match fragment {
            Fragment::Literal(literal) => text.push_str(literal),
            Fragment::Parameter { name, value } => text.push_str(&binder.bind(name, value)?),
            Fragment::InferredParameter {
                inferred_name,
                value,
            } => text.push_str(&binder.bind(inferred_name, value)?),
            Fragment::TemporaryTable(request) => {
                let quoted_name = adapter.quote_temporary_table_name(request.name(), profile);
                text.push_str(&quoted_name);
                if !tables.iter().any(|t| t.request.name() == request.name()) {
                    tables.push(TemporaryTablePlan {
                        request: request.clone(),
                        quoted_name,
                    });
                }
            }
        }
    }

    if !tables.is_empty() && !profile.temporary_tables {
        return Err(Error::TemporaryTablesUnsupported {
            dialect: adapter.dialect(),
            tables: tables.iter().map(|t| t.request.name().to_string()).collect(),
        });
    }

    for (name, value) in statement.detached_parameters() {
        binder.bind(name, value)?;
    }

    tracing::debug!(
        dialect = %adapter.dialect(),
        sql = %text,
        parameters = binder.parameters.len(),
        temporary_tables = tables.len(),
        "compiled statement"
    );

    Ok(CompiledStatement {
        text,
        parameters: binder.parameters,
        temporary_tables: tables,
    })
}

pub(crate) fn check_dialect(role: &'static str, expected: Dialect, found: Dialect) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(Error::WrongConnectionOrTransactionType {
            role,
            expected,
            found,
        })
    }
}

/// Compile against a live connection, probing its session profile.
pub async fn compile_for(
    statement: &Statement,
    dialect: Dialect,
    connection: &dyn NativeConnection,
    settings: &Settings,
) -> Result<CompiledStatement> {
    check_dialect("connection", dialect, connection.dialect())?;
    let adapter = dialect.adapter();
    let profile = adapter.session_profile(connection).await?;
    compile(statement, adapter, &profile, settings)
}

/// Blocking form of [`compile_for`].
pub fn compile_blocking(
    statement: &Statement,
    dialect: Dialect,
    connection: &dyn NativeConnection,
    settings: &Settings,
) -> Result<CompiledStatement> {
    futures::executor::block_on(compile_for(statement, dialect, connection, settings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Scalar;
    use pretty_assertions::assert_eq;

    fn offline(dialect: Dialect, statement: &Statement) -> Result<CompiledStatement> {
        compile(
            statement,
            dialect.adapter(),
            &SessionProfile::offline(dialect),
            &Settings::default(),
        )
    }

    #[test]
    fn test_name_registry_suffixes() {
        let mut names = NameRegistry::default();
        let claimed: Vec<String> = ["X", "X", "x", "X2"]
            .iter()
            .map(|n| names.claim(n))
            .collect();
        assert_eq!(claimed, vec!["X", "X2", "x3", "X22"]);
    }

    #[test]
    fn test_positional_fallback() {
        let statement = Statement::new()
            .sql("SELECT ")
            .value(&1)
            .sql(", ")
            .value(&2);
        let compiled = offline(Dialect::SqlServer, &statement).unwrap();
        assert_eq!(compiled.text, "SELECT @Parameter_1, @Parameter_2");
    }

    #[test]
    fn test_detached_parameters_emit_no_text() {
        let statement = Statement::with_parameters(
            "SELECT * FROM T WHERE Id = @Id",
            [("Id", ParameterValue::new(&5_i64))],
        )
        .unwrap();
        let compiled = offline(Dialect::SqlServer, &statement).unwrap();
        assert_eq!(compiled.text, "SELECT * FROM T WHERE Id = @Id");
        assert_eq!(compiled.parameters.len(), 1);
        assert_eq!(compiled.parameters[0].name, "Id");
        assert_eq!(compiled.parameters[0].value, Some(Scalar::Int64(5)));
    }

    #[test]
    fn test_conversion_failure_surfaces() {
        let mut statement = Statement::new();
        statement.push(Fragment::Parameter {
            name: "Big".into(),
            value: ParameterValue {
                kind: crate::value::ScalarKind::Int8,
                value: Some(Scalar::Int64(1000)),
            },
        });
        let err = offline(Dialect::Postgres, &statement).unwrap_err();
        assert!(matches!(err, Error::Conversion(_)));
    }
}
