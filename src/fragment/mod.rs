//! Statements as sequences of fragments.
//!
//! A [`Statement`] records literal SQL text, parameters and temporary-table
//! requests in source order. Nothing is evaluated or quoted here: the
//! [compiler](crate::compiler) turns fragments into dialect-specific text.
//!
//! ```
//! use sqlstitch::sql;
//!
//! let min_age = 21;
//! let statement = sql!("SELECT * FROM Users WHERE Age >= ", param(min_age));
//! assert_eq!(statement.fragments().len(), 2);
//! ```

pub mod naming;
pub mod template;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::value::{Scalar, ScalarKind, ScalarType, ToScalar};

pub use template::TemplateArgs;

static NEXT_TABLE_DISCRIMINATOR: AtomicU64 = AtomicU64::new(1);

/// A parameter's declared kind and its (possibly absent) value.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterValue {
    pub kind: ScalarKind,
    pub value: Option<Scalar>,
}

impl ParameterValue {
    pub fn new<T: ToScalar + ?Sized>(value: &T) -> Self {
        Self {
            kind: value.value_kind(),
            value: value.to_scalar(),
        }
    }

    pub fn null(kind: ScalarKind) -> Self {
        Self { kind, value: None }
    }
}

/// One column of a record type written to a staging table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub column_name: &'static str,
    pub kind: ScalarKind,
    /// Only readable fields become staging table columns.
    pub readable: bool,
}

/// Record types that can be staged as multi-column temporary tables.
///
/// Usually implemented with [`table_record!`](crate::table_record).
pub trait TableRecord {
    /// Fields in declaration order. Resolved once per type.
    fn fields() -> &'static [FieldDescriptor];

    /// One value per entry of [`fields`](TableRecord::fields).
    fn values(&self) -> Vec<Option<Scalar>>;
}

/// The element type of a staged sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    /// A single `Value` column.
    Scalar(ScalarKind),
    Record(&'static [FieldDescriptor]),
}

/// A request to pass a sequence to the server as a temporary table.
#[derive(Debug, Clone)]
pub struct TemporaryTableRequest {
    name: String,
    element: ElementType,
    rows: Arc<[Vec<Option<Scalar>>]>,
}

pub const VALUE_COLUMN: &str = "Value";

impl TemporaryTableRequest {
    /// `<base>_<n>`, with `n` unique for the life of the process.
    fn unique_name(base: &str) -> String {
        let n = NEXT_TABLE_DISCRIMINATOR.fetch_add(1, Ordering::Relaxed);
        format!("{}_{}", base, n)
    }

    /// A single-column table of scalar values.
    pub fn of_values<T, I>(base: &str, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToScalar + ScalarType,
    {
        let rows: Vec<Vec<Option<Scalar>>> =
            values.into_iter().map(|v| vec![v.to_scalar()]).collect();
        Self {
            name: Self::unique_name(base),
            element: ElementType::Scalar(T::scalar_kind()),
            rows: rows.into(),
        }
    }

    /// A single-column table whose kind is only known at run time.
    pub fn of_scalars(base: &str, kind: ScalarKind, values: Vec<Option<Scalar>>) -> Self {
        let rows: Vec<Vec<Option<Scalar>>> = values.into_iter().map(|v| vec![v]).collect();
        Self {
            name: Self::unique_name(base),
            element: ElementType::Scalar(kind),
            rows: rows.into(),
        }
    }

    /// A multi-column table with one column per readable field of `R`.
    pub fn of_records<'a, R, I>(base: &str, records: I) -> Self
    where
        R: TableRecord + 'a,
        I: IntoIterator<Item = &'a R>,
    {
        let fields = R::fields();
        let rows: Vec<Vec<Option<Scalar>>> = records
            .into_iter()
            .map(|record| {
                record
                    .values()
                    .into_iter()
                    .zip(fields)
                    .filter(|(_, field)| field.readable)
                    .map(|(value, _)| value)
                    .collect()
            })
            .collect();
        Self {
            name: Self::unique_name(base),
            element: ElementType::Record(fields),
            rows: rows.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn element(&self) -> ElementType {
        self.element
    }

    /// `(column name, kind)` pairs, in table order.
    pub fn columns(&self) -> Vec<(&'static str, ScalarKind)> {
        match self.element {
            ElementType::Scalar(kind) => vec![(VALUE_COLUMN, kind)],
            ElementType::Record(fields) => fields
                .iter()
                .filter(|f| f.readable)
                .map(|f| (f.column_name, f.kind))
                .collect(),
        }
    }

    pub fn rows(&self) -> &[Vec<Option<Scalar>>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Values that can stand in for a temporary table in [`sql!`](crate::sql).
pub trait IntoTemporaryTable {
    fn into_temporary_table(self, base: &str) -> TemporaryTableRequest;
}

impl IntoTemporaryTable for TemporaryTableRequest {
    fn into_temporary_table(self, _base: &str) -> TemporaryTableRequest {
        self
    }
}

impl IntoTemporaryTable for &TemporaryTableRequest {
    fn into_temporary_table(self, _base: &str) -> TemporaryTableRequest {
        self.clone()
    }
}

impl<T: ToScalar + ScalarType> IntoTemporaryTable for Vec<T> {
    fn into_temporary_table(self, base: &str) -> TemporaryTableRequest {
        TemporaryTableRequest::of_values(base, self)
    }
}

impl<T: ToScalar + ScalarType> IntoTemporaryTable for &Vec<T> {
    fn into_temporary_table(self, base: &str) -> TemporaryTableRequest {
        TemporaryTableRequest::of_values(base, self.iter())
    }
}

impl<T: ToScalar + ScalarType> IntoTemporaryTable for &[T] {
    fn into_temporary_table(self, base: &str) -> TemporaryTableRequest {
        TemporaryTableRequest::of_values(base, self.iter())
    }
}

/// One piece of a statement.
#[derive(Debug, Clone)]
pub enum Fragment {
    Literal(String),
    Parameter {
        name: String,
        value: ParameterValue,
    },
    /// A parameter named after its source expression. An empty name means
    /// "use the positional name".
    InferredParameter {
        inferred_name: String,
        value: ParameterValue,
    },
    TemporaryTable(TemporaryTableRequest),
}

/// Alignment and precision for values formatted into the text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatSpec {
    /// Positive pads on the left, negative on the right.
    pub align: Option<isize>,
    pub precision: Option<usize>,
}

impl FormatSpec {
    pub fn align(mut self, align: isize) -> Self {
        self.align = Some(align);
        self
    }

    pub fn precision(mut self, precision: usize) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn apply(&self, value: &dyn fmt::Display) -> String {
        let body = match self.precision {
            Some(precision) => format!("{:.*}", precision, value),
            None => value.to_string(),
        };
        match self.align {
            Some(width) if width > 0 => format!("{:>1$}", body, width.unsigned_abs()),
            Some(width) if width < 0 => format!("{:<1$}", body, width.unsigned_abs()),
            _ => body,
        }
    }
}

/// An ordered list of fragments plus parameters bound without text.
#[derive(Debug, Clone, Default)]
pub struct Statement {
    fragments: Vec<Fragment>,
    detached: Vec<(String, ParameterValue)>,
}

impl Statement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Literal text plus explicitly named parameters that the text refers
    /// to itself (e.g. `@Id` on SQL Server).
    ///
    /// Fails on duplicate names, compared case-insensitively.
    pub fn with_parameters<S, I>(text: impl Into<String>, parameters: I) -> Result<Self>
    where
        S: Into<String>,
        I: IntoIterator<Item = (S, ParameterValue)>,
    {
        let mut detached: Vec<(String, ParameterValue)> = Vec::new();
        for (name, value) in parameters {
            let name = name.into();
            if detached
                .iter()
                .any(|(existing, _)| existing.eq_ignore_ascii_case(&name))
            {
                return Err(Error::DuplicateParameterName(name));
            }
            detached.push((name, value));
        }
        Ok(Self {
            fragments: vec![Fragment::Literal(text.into())],
            detached,
        })
    }

    /// Parse `{@Name}` / `{#Name}` placeholders, resolving them from `args`.
    pub fn from_template(template: &str, args: &TemplateArgs) -> Result<Self> {
        template::parse(template, args)
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn detached_parameters(&self) -> &[(String, ParameterValue)] {
        &self.detached
    }

    pub fn temporary_tables(&self) -> impl Iterator<Item = &TemporaryTableRequest> {
        self.fragments.iter().filter_map(|f| match f {
            Fragment::TemporaryTable(request) => Some(request),
            _ => None,
        })
    }

    pub fn push(&mut self, fragment: Fragment) {
        match (self.fragments.last_mut(), fragment) {
            (Some(Fragment::Literal(text)), Fragment::Literal(more)) => text.push_str(&more),
            (_, Fragment::Literal(more)) if more.is_empty() => {}
            (_, fragment) => self.fragments.push(fragment),
        }
    }

    pub fn append_sql(&mut self, text: impl Into<String>) {
        self.push(Fragment::Literal(text.into()));
    }

    pub fn append_param<T: ToScalar + ?Sized>(&mut self, name: impl Into<String>, value: &T) {
        self.push(Fragment::Parameter {
            name: name.into(),
            value: ParameterValue::new(value),
        });
    }

    /// A parameter named after `expression`, the value's source text.
    pub fn append_inferred_param<T: ToScalar + ?Sized>(&mut self, expression: &str, value: &T) {
        self.push(Fragment::InferredParameter {
            inferred_name: naming::infer_name(expression),
            value: ParameterValue::new(value),
        });
    }

    pub fn append_temp_table(&mut self, request: TemporaryTableRequest) {
        self.push(Fragment::TemporaryTable(request));
    }

    pub fn append_formatted(&mut self, value: &dyn fmt::Display, spec: FormatSpec) {
        self.push(Fragment::Literal(spec.apply(value)));
    }

    pub fn append_statement(&mut self, other: Statement) {
        for fragment in other.fragments {
            self.push(fragment);
        }
        self.detached.extend(other.detached);
    }

    pub fn sql(mut self, text: impl Into<String>) -> Self {
        self.append_sql(text);
        self
    }

    pub fn param<T: ToScalar + ?Sized>(mut self, name: impl Into<String>, value: &T) -> Self {
        self.append_param(name, value);
        self
    }

    /// An unnamed parameter; compiles to `Parameter_<n>`.
    pub fn value<T: ToScalar + ?Sized>(mut self, value: &T) -> Self {
        self.append_inferred_param("", value);
        self
    }

    pub fn temp_table(mut self, request: TemporaryTableRequest) -> Self {
        self.append_temp_table(request);
        self
    }

    pub fn fmt(mut self, value: &dyn fmt::Display, spec: FormatSpec) -> Self {
        self.append_formatted(value, spec);
        self
    }
}

/// Build a [`Statement`] from comma-separated items.
///
/// - a literal is appended as SQL text
/// - `param(expr)` binds a parameter named after `expr`
/// - `param(expr, name = "Name")` binds an explicitly named parameter
/// - `temp_table(expr)` stages `expr` as a temporary table
/// - `fmt(expr, align = n, precision = p)` formats `expr` into the text
/// - any other expression is formatted into the text
#[macro_export]
macro_rules! sql {
    ($($items:tt)*) => {{
        #[allow(unused_mut)]
        let mut statement = $crate::fragment::Statement::new();
        $crate::__sql_items!(statement; $($items)*);
        statement
    }};
}

#[doc(hidden)]
#[macro_export]
macro_rules! __sql_items {
    ($s:ident;) => {};
    ($s:ident; param($e:expr, name = $n:expr) $(, $($rest:tt)*)?) => {
        $s.append_param($n, &$e);
        $crate::__sql_items!($s; $($($rest)*)?);
    };
    ($s:ident; param($e:expr) $(, $($rest:tt)*)?) => {
        $s.append_inferred_param(stringify!($e), &$e);
        $crate::__sql_items!($s; $($($rest)*)?);
    };
    ($s:ident; temp_table($e:expr) $(, $($rest:tt)*)?) => {
        $s.append_temp_table($crate::fragment::IntoTemporaryTable::into_temporary_table(
            $e,
            &$crate::fragment::naming::temporary_table_base(stringify!($e)),
        ));
        $crate::__sql_items!($s; $($($rest)*)?);
    };
    ($s:ident; fmt($e:expr, align = $a:expr, precision = $p:expr) $(, $($rest:tt)*)?) => {
        $s.append_formatted(&$e, $crate::fragment::FormatSpec::default().align($a).precision($p));
        $crate::__sql_items!($s; $($($rest)*)?);
    };
    ($s:ident; fmt($e:expr, align = $a:expr) $(, $($rest:tt)*)?) => {
        $s.append_formatted(&$e, $crate::fragment::FormatSpec::default().align($a));
        $crate::__sql_items!($s; $($($rest)*)?);
    };
    ($s:ident; fmt($e:expr, precision = $p:expr) $(, $($rest:tt)*)?) => {
        $s.append_formatted(&$e, $crate::fragment::FormatSpec::default().precision($p));
        $crate::__sql_items!($s; $($($rest)*)?);
    };
    ($s:ident; $lit:literal $(, $($rest:tt)*)?) => {
        $s.append_sql(::std::format!("{}", $lit));
        $crate::__sql_items!($s; $($($rest)*)?);
    };
    ($s:ident; $e:expr $(, $($rest:tt)*)?) => {
        $s.append_formatted(&$e, $crate::fragment::FormatSpec::default());
        $crate::__sql_items!($s; $($($rest)*)?);
    };
}

/// Implement [`TableRecord`] for a struct.
///
/// ```
/// use sqlstitch::fragment::TableRecord;
///
/// struct Line { sku: String, qty: i32 }
///
/// sqlstitch::table_record!(Line { sku: String => "Sku", qty: i32 => "Quantity" });
///
/// assert_eq!(Line::fields()[1].column_name, "Quantity");
/// ```
#[macro_export]
macro_rules! table_record {
    ($ty:ty { $($field:ident : $fty:ty => $column:literal),+ $(,)? }) => {
        impl $crate::fragment::TableRecord for $ty {
            fn fields() -> &'static [$crate::fragment::FieldDescriptor] {
                static FIELDS: ::std::sync::OnceLock<::std::vec::Vec<$crate::fragment::FieldDescriptor>> =
                    ::std::sync::OnceLock::new();
                FIELDS.get_or_init(|| {
                    ::std::vec![$($crate::fragment::FieldDescriptor {
                        column_name: $column,
                        kind: <$fty as $crate::value::ScalarType>::scalar_kind(),
                        readable: true,
                    }),+]
                })
            }

            fn values(&self) -> ::std::vec::Vec<::std::option::Option<$crate::value::Scalar>> {
                ::std::vec![$($crate::value::ToScalar::to_scalar(&self.$field)),+]
            }
        }
    };
}
