//! Error types for sqlstitch.

use thiserror::Error;

use crate::dialect::Dialect;
use crate::value::ScalarKind;

/// A value could not be coerced into the requested kind.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    /// The pair of kinds is not in the compatibility table.
    #[error("Cannot convert {from} to {to}")]
    UnsupportedConversion { from: ScalarKind, to: ScalarKind },

    /// An absent value was converted to a required target.
    #[error("Cannot convert NULL to non-nullable {to}")]
    NullToNonNullable { to: ScalarKind },

    /// The source text (or number) does not describe a value of the target kind.
    #[error("Malformed {to} value '{value}': {reason}")]
    MalformedValue {
        value: String,
        to: ScalarKind,
        reason: String,
    },

    /// Text converted to a character must hold exactly one character.
    #[error("'{value}' is not a single character")]
    NotSingleCharacter { value: String },

    /// The value does not fit into the target kind.
    #[error("Value '{value}' is out of range for {to}")]
    OutOfRange { value: String, to: ScalarKind },
}

impl ConversionError {
    pub(crate) fn malformed(
        value: impl Into<String>,
        to: ScalarKind,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::MalformedValue {
            value: value.into(),
            to,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn out_of_range(value: impl std::fmt::Display, to: ScalarKind) -> Self {
        Self::OutOfRange {
            value: value.to_string(),
            to,
        }
    }
}

/// A failure reported by a database driver.
///
/// Drivers fill in whatever identification their backend provides: a SQLSTATE
/// style `code`, a vendor error `number`, or both.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", self.describe())]
pub struct DriverError {
    pub code: Option<String>,
    pub number: Option<i64>,
    pub message: String,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            number: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_number(mut self, number: i64) -> Self {
        self.number = Some(number);
        self
    }

    fn describe(&self) -> String {
        match (&self.code, self.number) {
            (Some(code), _) => format!("[{}] {}", code, self.message),
            (None, Some(number)) => format!("[{}] {}", number, self.message),
            (None, None) => self.message.clone(),
        }
    }
}

/// The main error type for sqlstitch operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A value could not be converted.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// The dialect has no column type for this kind.
    #[error("{dialect} has no native type for {kind}")]
    UnsupportedType { kind: ScalarKind, dialect: Dialect },

    /// The statement needs temporary tables the session cannot provide.
    #[error("{dialect} session does not support temporary tables (requested: {})", tables.join(", "))]
    TemporaryTablesUnsupported {
        dialect: Dialect,
        tables: Vec<String>,
    },

    /// The connection or transaction belongs to another backend.
    #[error("Expected a {expected} {role}, got a {found} one")]
    WrongConnectionOrTransactionType {
        role: &'static str,
        expected: Dialect,
        found: Dialect,
    },

    /// The caller's cancellation signal interrupted the operation.
    #[error("Operation cancelled by caller while {stage}")]
    CancelledByCaller { stage: String },

    /// The same parameter name was supplied twice.
    #[error("Duplicate parameter name: '{0}'")]
    DuplicateParameterName(String),

    /// The driver failed.
    #[error("Database error while {context}: {source}")]
    Driver {
        context: String,
        #[source]
        source: DriverError,
    },

    /// A statement template could not be parsed or resolved.
    #[error("Template error at position {position}: {message}")]
    Template { position: usize, message: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a template error at the given position.
    pub fn template(position: usize, message: impl Into<String>) -> Self {
        Self::Template {
            position,
            message: message.into(),
        }
    }

    pub(crate) fn driver(context: impl Into<String>, source: DriverError) -> Self {
        Self::Driver {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn cancelled(stage: impl Into<String>) -> Self {
        Self::CancelledByCaller {
            stage: stage.into(),
        }
    }

    /// Whether this error is the uniform cancellation error.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::CancelledByCaller { .. })
    }
}

/// Result type alias for sqlstitch operations.
pub type Result<T> = std::result::Result<T, Error>;
