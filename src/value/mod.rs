//! Scalar values exchanged with database drivers.
//!
//! A [`Scalar`] is the loosely-typed currency of the driver boundary. The
//! [`ToScalar`] and [`FromScalar`] traits move strongly-typed application
//! values in and out of it, going through the conversion matrix in
//! [`convert`] whenever the kinds differ.

pub mod convert;
pub mod text;

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::ConversionError;

pub use convert::{can_convert, convert};

/// The closed set of scalar kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal,
    Text,
    Char,
    Binary,
    Date,
    Time,
    DateTime,
    DateTimeOffset,
    Duration,
    Guid,
    Enum(&'static EnumDef),
    /// The type-erased target: accepts any value unchanged.
    Any,
}

impl ScalarKind {
    /// Every kind except `Enum` (which needs a definition) and `Any`.
    pub const PRIMITIVES: [ScalarKind; 17] = [
        ScalarKind::Boolean,
        ScalarKind::Int8,
        ScalarKind::Int16,
        ScalarKind::Int32,
        ScalarKind::Int64,
        ScalarKind::Float32,
        ScalarKind::Float64,
        ScalarKind::Decimal,
        ScalarKind::Text,
        ScalarKind::Char,
        ScalarKind::Binary,
        ScalarKind::Date,
        ScalarKind::Time,
        ScalarKind::DateTime,
        ScalarKind::DateTimeOffset,
        ScalarKind::Duration,
        ScalarKind::Guid,
    ];

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            ScalarKind::Int8 | ScalarKind::Int16 | ScalarKind::Int32 | ScalarKind::Int64
        )
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer()
            || matches!(
                self,
                ScalarKind::Float32 | ScalarKind::Float64 | ScalarKind::Decimal
            )
    }

    pub fn is_temporal(self) -> bool {
        matches!(
            self,
            ScalarKind::Date | ScalarKind::DateTime | ScalarKind::DateTimeOffset
        )
    }

    /// Mark this kind as accepting absent values.
    pub fn nullable(self) -> TargetType {
        TargetType {
            kind: self,
            nullable: true,
        }
    }

    /// Look up a primitive kind by name, case-insensitively.
    pub fn from_name(name: &str) -> Option<ScalarKind> {
        if name.eq_ignore_ascii_case("any") {
            return Some(ScalarKind::Any);
        }
        Self::PRIMITIVES
            .into_iter()
            .find(|kind| kind.to_string().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarKind::Boolean => write!(f, "Boolean"),
            ScalarKind::Int8 => write!(f, "Int8"),
            ScalarKind::Int16 => write!(f, "Int16"),
            ScalarKind::Int32 => write!(f, "Int32"),
            ScalarKind::Int64 => write!(f, "Int64"),
            ScalarKind::Float32 => write!(f, "Float32"),
            ScalarKind::Float64 => write!(f, "Float64"),
            ScalarKind::Decimal => write!(f, "Decimal"),
            ScalarKind::Text => write!(f, "Text"),
            ScalarKind::Char => write!(f, "Char"),
            ScalarKind::Binary => write!(f, "Binary"),
            ScalarKind::Date => write!(f, "Date"),
            ScalarKind::Time => write!(f, "Time"),
            ScalarKind::DateTime => write!(f, "DateTime"),
            ScalarKind::DateTimeOffset => write!(f, "DateTimeOffset"),
            ScalarKind::Duration => write!(f, "Duration"),
            ScalarKind::Guid => write!(f, "Guid"),
            ScalarKind::Enum(def) => write!(f, "enum {}", def.name),
            ScalarKind::Any => write!(f, "Any"),
        }
    }
}

/// A conversion target: a kind plus whether absent values are acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetType {
    pub kind: ScalarKind,
    pub nullable: bool,
}

impl From<ScalarKind> for TargetType {
    fn from(kind: ScalarKind) -> Self {
        Self {
            kind,
            nullable: false,
        }
    }
}

/// The static description of an enumerated type: its name and its
/// `(symbol, discriminant)` pairs in declaration order.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct EnumDef {
    pub name: &'static str,
    pub variants: &'static [(&'static str, i64)],
}

impl EnumDef {
    pub fn by_discriminant(&'static self, discriminant: i64) -> Option<EnumValue> {
        self.variants
            .iter()
            .find(|(_, value)| *value == discriminant)
            .map(|(symbol, value)| EnumValue {
                def: self,
                symbol,
                discriminant: *value,
            })
    }

    /// Exact symbol match first, then a case-insensitive one.
    pub fn by_symbol(&'static self, symbol: &str) -> Option<EnumValue> {
        let found = self
            .variants
            .iter()
            .find(|(name, _)| *name == symbol)
            .or_else(|| {
                self.variants
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(symbol))
            });
        found.map(|(symbol, value)| EnumValue {
            def: self,
            symbol,
            discriminant: *value,
        })
    }
}

/// One variant of an enumerated type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumValue {
    pub def: &'static EnumDef,
    pub symbol: &'static str,
    pub discriminant: i64,
}

/// A loosely-typed value as drivers read and write it.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Decimal(Decimal),
    Text(String),
    Char(char),
    Binary(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
    Duration(chrono::Duration),
    Guid(Uuid),
    Enum(EnumValue),
}

impl Scalar {
    pub fn kind(&self) -> ScalarKind {
        match self {
            Scalar::Bool(_) => ScalarKind::Boolean,
            Scalar::Int8(_) => ScalarKind::Int8,
            Scalar::Int16(_) => ScalarKind::Int16,
            Scalar::Int32(_) => ScalarKind::Int32,
            Scalar::Int64(_) => ScalarKind::Int64,
            Scalar::Float32(_) => ScalarKind::Float32,
            Scalar::Float64(_) => ScalarKind::Float64,
            Scalar::Decimal(_) => ScalarKind::Decimal,
            Scalar::Text(_) => ScalarKind::Text,
            Scalar::Char(_) => ScalarKind::Char,
            Scalar::Binary(_) => ScalarKind::Binary,
            Scalar::Date(_) => ScalarKind::Date,
            Scalar::Time(_) => ScalarKind::Time,
            Scalar::DateTime(_) => ScalarKind::DateTime,
            Scalar::DateTimeOffset(_) => ScalarKind::DateTimeOffset,
            Scalar::Duration(_) => ScalarKind::Duration,
            Scalar::Guid(_) => ScalarKind::Guid,
            Scalar::Enum(value) => ScalarKind::Enum(value.def),
        }
    }

    /// Convert this value into the requested kind.
    pub fn convert_to(self, kind: ScalarKind) -> Result<Scalar, ConversionError> {
        convert(Some(self), kind)?.ok_or(ConversionError::NullToNonNullable { to: kind })
    }

    /// Read this value as a strongly-typed application value.
    pub fn get<T: FromScalar>(&self) -> Result<T, ConversionError> {
        T::from_value(Some(self.clone()))
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&text::format_text(self))
    }
}

/// Types with a statically known scalar kind.
pub trait ScalarType {
    fn scalar_kind() -> ScalarKind;
}

/// Conversion of application values into scalars.
pub trait ToScalar {
    /// The kind this value binds as, even when absent.
    fn value_kind(&self) -> ScalarKind;
    fn to_scalar(&self) -> Option<Scalar>;
}

/// Conversion of (possibly absent) scalars into application values.
pub trait FromScalar: Sized {
    fn target() -> TargetType;

    /// Extract from a value already converted to `target().kind`.
    fn from_scalar(value: Scalar) -> Result<Self, ConversionError>;

    fn from_value(value: Option<Scalar>) -> Result<Self, ConversionError> {
        let target = Self::target();
        match convert(value, target)? {
            Some(value) => Self::from_scalar(value),
            None => Err(ConversionError::NullToNonNullable { to: target.kind }),
        }
    }
}

impl<T: ScalarType> ScalarType for Option<T> {
    fn scalar_kind() -> ScalarKind {
        T::scalar_kind()
    }
}

impl<T: ScalarType + ?Sized> ScalarType for &T {
    fn scalar_kind() -> ScalarKind {
        T::scalar_kind()
    }
}

impl<T: ScalarType + ToScalar> ToScalar for Option<T> {
    fn value_kind(&self) -> ScalarKind {
        T::scalar_kind()
    }

    fn to_scalar(&self) -> Option<Scalar> {
        self.as_ref().and_then(ToScalar::to_scalar)
    }
}

impl<T: FromScalar> FromScalar for Option<T> {
    fn target() -> TargetType {
        T::target().kind.nullable()
    }

    fn from_scalar(value: Scalar) -> Result<Self, ConversionError> {
        T::from_scalar(value).map(Some)
    }

    fn from_value(value: Option<Scalar>) -> Result<Self, ConversionError> {
        match value {
            None => Ok(None),
            Some(value) => T::from_value(Some(value)).map(Some),
        }
    }
}

impl<T: ToScalar + ?Sized> ToScalar for &T {
    fn value_kind(&self) -> ScalarKind {
        (**self).value_kind()
    }

    fn to_scalar(&self) -> Option<Scalar> {
        (**self).to_scalar()
    }
}

impl ToScalar for Scalar {
    fn value_kind(&self) -> ScalarKind {
        self.kind()
    }

    fn to_scalar(&self) -> Option<Scalar> {
        Some(self.clone())
    }
}

impl FromScalar for Scalar {
    fn target() -> TargetType {
        ScalarKind::Any.into()
    }

    fn from_scalar(value: Scalar) -> Result<Self, ConversionError> {
        Ok(value)
    }
}

fn unexpected(value: Scalar, to: ScalarKind) -> ConversionError {
    ConversionError::UnsupportedConversion {
        from: value.kind(),
        to,
    }
}

macro_rules! impl_scalar {
    ($ty:ty, $kind:ident, $variant:ident) => {
        impl ScalarType for $ty {
            fn scalar_kind() -> ScalarKind {
                ScalarKind::$kind
            }
        }

        impl ToScalar for $ty {
            fn value_kind(&self) -> ScalarKind {
                ScalarKind::$kind
            }

            fn to_scalar(&self) -> Option<Scalar> {
                Some(Scalar::$variant(self.clone()))
            }
        }

        impl FromScalar for $ty {
            fn target() -> TargetType {
                ScalarKind::$kind.into()
            }

            fn from_scalar(value: Scalar) -> Result<Self, ConversionError> {
                match value {
                    Scalar::$variant(v) => Ok(v),
                    other => Err(unexpected(other, ScalarKind::$kind)),
                }
            }
        }
    };
}

impl_scalar!(bool, Boolean, Bool);
impl_scalar!(i8, Int8, Int8);
impl_scalar!(i16, Int16, Int16);
impl_scalar!(i32, Int32, Int32);
impl_scalar!(i64, Int64, Int64);
impl_scalar!(f32, Float32, Float32);
impl_scalar!(f64, Float64, Float64);
impl_scalar!(Decimal, Decimal, Decimal);
impl_scalar!(String, Text, Text);
impl_scalar!(char, Char, Char);
impl_scalar!(Vec<u8>, Binary, Binary);
impl_scalar!(NaiveDate, Date, Date);
impl_scalar!(NaiveTime, Time, Time);
impl_scalar!(NaiveDateTime, DateTime, DateTime);
impl_scalar!(DateTime<FixedOffset>, DateTimeOffset, DateTimeOffset);
impl_scalar!(chrono::Duration, Duration, Duration);
impl_scalar!(Uuid, Guid, Guid);

impl ScalarType for str {
    fn scalar_kind() -> ScalarKind {
        ScalarKind::Text
    }
}

impl ToScalar for str {
    fn value_kind(&self) -> ScalarKind {
        ScalarKind::Text
    }

    fn to_scalar(&self) -> Option<Scalar> {
        Some(Scalar::Text(self.to_string()))
    }
}

impl ToScalar for [u8] {
    fn value_kind(&self) -> ScalarKind {
        ScalarKind::Binary
    }

    fn to_scalar(&self) -> Option<Scalar> {
        Some(Scalar::Binary(self.to_vec()))
    }
}

impl ScalarType for DateTime<Utc> {
    fn scalar_kind() -> ScalarKind {
        ScalarKind::DateTimeOffset
    }
}

impl ToScalar for DateTime<Utc> {
    fn value_kind(&self) -> ScalarKind {
        ScalarKind::DateTimeOffset
    }

    fn to_scalar(&self) -> Option<Scalar> {
        Some(Scalar::DateTimeOffset(self.fixed_offset()))
    }
}

impl FromScalar for DateTime<Utc> {
    fn target() -> TargetType {
        ScalarKind::DateTimeOffset.into()
    }

    fn from_scalar(value: Scalar) -> Result<Self, ConversionError> {
        match value {
            Scalar::DateTimeOffset(v) => Ok(v.with_timezone(&Utc)),
            other => Err(unexpected(other, ScalarKind::DateTimeOffset)),
        }
    }
}

/// Rust enums that travel as enumerated scalars. Implemented by [`sql_enum!`].
pub trait SqlEnum: Copy + 'static {
    fn definition() -> &'static EnumDef;
    fn discriminant(self) -> i64;
    fn from_discriminant(value: i64) -> Option<Self>;

    fn to_enum_value(self) -> Option<EnumValue> {
        Self::definition().by_discriminant(self.discriminant())
    }
}

/// Declare a Rust enum that binds as an enumerated scalar.
///
/// ```
/// sqlstitch::sql_enum! {
///     pub enum Status { Active = 1, Suspended = 2 }
/// }
///
/// use sqlstitch::value::ToScalar;
/// let value = Status::Suspended.to_scalar().unwrap();
/// assert_eq!(value.to_string(), "Suspended");
/// ```
#[macro_export]
macro_rules! sql_enum {
    ($(#[$meta:meta])* $vis:vis enum $name:ident { $($variant:ident = $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant = $value),+
        }

        impl $crate::value::SqlEnum for $name {
            fn definition() -> &'static $crate::value::EnumDef {
                static DEFINITION: $crate::value::EnumDef = $crate::value::EnumDef {
                    name: stringify!($name),
                    variants: &[$((stringify!($variant), $value)),+],
                };
                &DEFINITION
            }

            fn discriminant(self) -> i64 {
                match self {
                    $($name::$variant => $value),+
                }
            }

            fn from_discriminant(value: i64) -> Option<Self> {
                match value {
                    $($value => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl $crate::value::ScalarType for $name {
            fn scalar_kind() -> $crate::value::ScalarKind {
                $crate::value::ScalarKind::Enum(<$name as $crate::value::SqlEnum>::definition())
            }
        }

        impl $crate::value::ToScalar for $name {
            fn value_kind(&self) -> $crate::value::ScalarKind {
                <$name as $crate::value::ScalarType>::scalar_kind()
            }

            fn to_scalar(&self) -> Option<$crate::value::Scalar> {
                $crate::value::SqlEnum::to_enum_value(*self).map($crate::value::Scalar::Enum)
            }
        }

        impl $crate::value::FromScalar for $name {
            fn target() -> $crate::value::TargetType {
                <$name as $crate::value::ScalarType>::scalar_kind().into()
            }

            fn from_scalar(
                value: $crate::value::Scalar,
            ) -> ::std::result::Result<Self, $crate::error::ConversionError> {
                match value {
                    $crate::value::Scalar::Enum(v) => {
                        <$name as $crate::value::SqlEnum>::from_discriminant(v.discriminant)
                            .ok_or_else(|| $crate::error::ConversionError::MalformedValue {
                                value: v.symbol.to_string(),
                                to: <$name as $crate::value::ScalarType>::scalar_kind(),
                                reason: "no such variant".to_string(),
                            })
                    }
                    other => Err($crate::error::ConversionError::UnsupportedConversion {
                        from: other.kind(),
                        to: <$name as $crate::value::ScalarType>::scalar_kind(),
                    }),
                }
            }
        }
    };
}
