//! The conversion matrix between scalar kinds.

use std::fmt;

use chrono::{NaiveDateTime, NaiveTime};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use super::text::{format_text, parse_text};
use super::{Scalar, ScalarKind, TargetType};
use crate::error::ConversionError;

/// Whether values of kind `from` can, in general, be converted to `to`.
///
/// A `true` answer does not promise that every value converts: text may be
/// malformed and narrowing may overflow.
pub fn can_convert(from: ScalarKind, to: ScalarKind) -> bool {
    use ScalarKind::*;

    if from == to || to == Any {
        return true;
    }
    match (from, to) {
        (Any, _) => false,
        (Enum(_), Text) | (Text, Enum(_)) => true,
        (Enum(_), other) | (other, Enum(_)) => other.is_integer(),
        (_, Text) | (Text, _) => true,
        (Boolean, other) | (other, Boolean) => other.is_numeric(),
        (a, b) if a.is_numeric() && b.is_numeric() => true,
        (Guid, Binary) | (Binary, Guid) => true,
        (a, b) if a.is_temporal() && b.is_temporal() => true,
        (Time, Duration) | (Duration, Time) => true,
        _ => false,
    }
}

/// Convert a possibly absent value to the target.
///
/// Absent values convert only to nullable targets and to `Any`.
pub fn convert(
    value: Option<Scalar>,
    target: impl Into<TargetType>,
) -> Result<Option<Scalar>, ConversionError> {
    let target = target.into();
    match value {
        None if target.nullable || target.kind == ScalarKind::Any => Ok(None),
        None => Err(ConversionError::NullToNonNullable { to: target.kind }),
        Some(value) => convert_scalar(value, target.kind).map(Some),
    }
}

fn convert_scalar(value: Scalar, to: ScalarKind) -> Result<Scalar, ConversionError> {
    let from = value.kind();
    if from == to || to == ScalarKind::Any {
        return Ok(value);
    }
    if !can_convert(from, to) {
        return Err(ConversionError::UnsupportedConversion { from, to });
    }

    match (value, to) {
        (Scalar::Enum(v), ScalarKind::Text) => Ok(Scalar::Text(v.symbol.to_string())),
        (Scalar::Enum(v), _) => from_number(Number::Int(v.discriminant as i128), to),
        (Scalar::Text(text), _) => parse_text(&text, to),
        (value, ScalarKind::Text) => Ok(Scalar::Text(format_text(&value))),
        (Scalar::Guid(g), ScalarKind::Binary) => Ok(Scalar::Binary(g.as_bytes().to_vec())),
        (Scalar::Binary(bytes), ScalarKind::Guid) => Uuid::from_slice(&bytes)
            .map(Scalar::Guid)
            .map_err(|_| {
                ConversionError::malformed(
                    format!("{} bytes", bytes.len()),
                    to,
                    "expected exactly 16 bytes",
                )
            }),
        (Scalar::Time(t), ScalarKind::Duration) => {
            Ok(Scalar::Duration(t.signed_duration_since(NaiveTime::MIN)))
        }
        (Scalar::Duration(d), ScalarKind::Time) => {
            if d < chrono::Duration::zero() || d >= chrono::Duration::days(1) {
                let shown = format_text(&Scalar::Duration(d));
                return Err(ConversionError::out_of_range(shown, to));
            }
            Ok(Scalar::Time(NaiveTime::MIN + d))
        }
        (value, _) if from.is_temporal() => {
            let instant = utc_instant(&value)
                .ok_or(ConversionError::UnsupportedConversion { from, to })?;
            match to {
                ScalarKind::Date => Ok(Scalar::Date(instant.date())),
                ScalarKind::DateTime => Ok(Scalar::DateTime(instant)),
                ScalarKind::DateTimeOffset => {
                    Ok(Scalar::DateTimeOffset(instant.and_utc().fixed_offset()))
                }
                _ => Err(ConversionError::UnsupportedConversion { from, to }),
            }
        }
        (value, _) => match number(&value) {
            Some(n) => from_number(n, to),
            None => Err(ConversionError::UnsupportedConversion { from, to }),
        },
    }
}

/// Date-like values as a naive UTC instant.
fn utc_instant(value: &Scalar) -> Option<NaiveDateTime> {
    match value {
        Scalar::Date(d) => Some(d.and_time(NaiveTime::MIN)),
        Scalar::DateTime(dt) => Some(*dt),
        Scalar::DateTimeOffset(dt) => Some(dt.naive_utc()),
        _ => None,
    }
}

/// Numeric and boolean values, widened.
#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i128),
    Float(f64),
    Decimal(Decimal),
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(n) => write!(f, "{}", n),
            Number::Float(n) => write!(f, "{}", n),
            Number::Decimal(n) => write!(f, "{}", n),
        }
    }
}

fn number(value: &Scalar) -> Option<Number> {
    Some(match value {
        Scalar::Bool(b) => Number::Int(i128::from(*b)),
        Scalar::Int8(n) => Number::Int(i128::from(*n)),
        Scalar::Int16(n) => Number::Int(i128::from(*n)),
        Scalar::Int32(n) => Number::Int(i128::from(*n)),
        Scalar::Int64(n) => Number::Int(i128::from(*n)),
        Scalar::Float32(n) => Number::Float(f64::from(*n)),
        Scalar::Float64(n) => Number::Float(*n),
        Scalar::Decimal(n) => Number::Decimal(*n),
        _ => return None,
    })
}

fn from_number(n: Number, to: ScalarKind) -> Result<Scalar, ConversionError> {
    match to {
        ScalarKind::Boolean => Ok(Scalar::Bool(match n {
            Number::Int(v) => v != 0,
            Number::Float(v) => v != 0.0,
            Number::Decimal(v) => !v.is_zero(),
        })),
        ScalarKind::Int8 | ScalarKind::Int16 | ScalarKind::Int32 | ScalarKind::Int64 => {
            let whole = match n {
                Number::Int(v) => v,
                Number::Float(v) if v.is_finite() => v.round_ties_even() as i128,
                Number::Float(_) => return Err(ConversionError::out_of_range(n, to)),
                Number::Decimal(v) => v
                    .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
                    .to_i128()
                    .ok_or_else(|| ConversionError::out_of_range(n, to))?,
            };
            integer(whole, to).ok_or_else(|| ConversionError::out_of_range(n, to))
        }
        ScalarKind::Float32 => {
            let v = as_f64(n);
            if v.is_finite() && v.abs() > f64::from(f32::MAX) {
                return Err(ConversionError::out_of_range(n, to));
            }
            Ok(Scalar::Float32(v as f32))
        }
        ScalarKind::Float64 => Ok(Scalar::Float64(as_f64(n))),
        ScalarKind::Decimal => {
            let decimal = match n {
                Number::Int(v) => Decimal::from_i128(v),
                Number::Float(v) => Decimal::from_f64(v),
                Number::Decimal(v) => Some(v),
            };
            decimal
                .map(Scalar::Decimal)
                .ok_or_else(|| ConversionError::out_of_range(n, to))
        }
        ScalarKind::Enum(def) => match n {
            Number::Int(v) => i64::try_from(v)
                .ok()
                .and_then(|v| def.by_discriminant(v))
                .map(Scalar::Enum)
                .ok_or_else(|| {
                    ConversionError::malformed(n.to_string(), to, "no variant with this value")
                }),
            _ => Err(ConversionError::UnsupportedConversion {
                from: ScalarKind::Float64,
                to,
            }),
        },
        _ => Err(ConversionError::UnsupportedConversion {
            from: ScalarKind::Int64,
            to,
        }),
    }
}

fn integer(v: i128, to: ScalarKind) -> Option<Scalar> {
    match to {
        ScalarKind::Int8 => i8::try_from(v).ok().map(Scalar::Int8),
        ScalarKind::Int16 => i16::try_from(v).ok().map(Scalar::Int16),
        ScalarKind::Int32 => i32::try_from(v).ok().map(Scalar::Int32),
        ScalarKind::Int64 => i64::try_from(v).ok().map(Scalar::Int64),
        _ => None,
    }
}

fn as_f64(n: Number) -> f64 {
    match n {
        Number::Int(v) => v as f64,
        Number::Float(v) => v,
        Number::Decimal(v) => v.to_f64().unwrap_or(f64::NAN),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn sample(kind: ScalarKind) -> Scalar {
        match kind {
            ScalarKind::Boolean => Scalar::Bool(true),
            ScalarKind::Int8 => Scalar::Int8(1),
            ScalarKind::Int16 => Scalar::Int16(1),
            ScalarKind::Int32 => Scalar::Int32(1),
            ScalarKind::Int64 => Scalar::Int64(1),
            ScalarKind::Float32 => Scalar::Float32(1.0),
            ScalarKind::Float64 => Scalar::Float64(1.0),
            ScalarKind::Decimal => Scalar::Decimal(Decimal::ONE),
            ScalarKind::Text => Scalar::Text("x".into()),
            ScalarKind::Char => Scalar::Char('x'),
            ScalarKind::Binary => Scalar::Binary(vec![7; 16]),
            ScalarKind::Date => Scalar::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()),
            ScalarKind::Time => Scalar::Time(NaiveTime::from_hms_opt(3, 4, 5).unwrap()),
            ScalarKind::DateTime => Scalar::DateTime(
                NaiveDate::from_ymd_opt(2024, 1, 2)
                    .unwrap()
                    .and_hms_opt(3, 4, 5)
                    .unwrap(),
            ),
            ScalarKind::DateTimeOffset => Scalar::DateTimeOffset(
                chrono::FixedOffset::east_opt(3600)
                    .unwrap()
                    .with_ymd_and_hms(2024, 1, 2, 3, 4, 5)
                    .unwrap(),
            ),
            ScalarKind::Duration => Scalar::Duration(chrono::Duration::minutes(5)),
            ScalarKind::Guid => Scalar::Guid(Uuid::nil()),
            ScalarKind::Enum(_) | ScalarKind::Any => unreachable!(),
        }
    }

    #[test]
    fn test_table_agrees_with_conversion() {
        for from in ScalarKind::PRIMITIVES {
            for to in ScalarKind::PRIMITIVES {
                let result = convert(Some(sample(from)), to);
                if can_convert(from, to) {
                    // Text samples are not parseable as every kind.
                    if from != ScalarKind::Text {
                        assert!(result.is_ok(), "{from} -> {to}: {result:?}");
                    }
                } else {
                    assert_eq!(
                        result,
                        Err(ConversionError::UnsupportedConversion { from, to }),
                        "{from} -> {to}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_any_accepts_everything() {
        assert_eq!(convert(None, ScalarKind::Any).unwrap(), None);
        let value = Scalar::Guid(Uuid::nil());
        assert_eq!(
            convert(Some(value.clone()), ScalarKind::Any).unwrap(),
            Some(value)
        );
    }

    #[test]
    fn test_rounds_half_to_even() {
        let cases = [(2.5, 2), (3.5, 4), (-2.5, -2), (0.49, 0)];
        for (input, expected) in cases {
            assert_eq!(
                convert(Some(Scalar::Float64(input)), ScalarKind::Int32).unwrap(),
                Some(Scalar::Int32(expected))
            );
        }
        let half = Decimal::new(45, 1);
        assert_eq!(
            convert(Some(Scalar::Decimal(half)), ScalarKind::Int64).unwrap(),
            Some(Scalar::Int64(4))
        );
    }

    #[test]
    fn test_narrowing_out_of_range() {
        assert_eq!(
            convert(Some(Scalar::Int32(128)), ScalarKind::Int8),
            Err(ConversionError::OutOfRange {
                value: "128".into(),
                to: ScalarKind::Int8
            })
        );
        assert!(convert(Some(Scalar::Float64(f64::NAN)), ScalarKind::Int64).is_err());
    }

    #[test]
    fn test_char_requires_single_character() {
        assert_eq!(
            convert(Some(Scalar::Text("ab".into())), ScalarKind::Char),
            Err(ConversionError::NotSingleCharacter { value: "ab".into() })
        );
        assert_eq!(
            convert(Some(Scalar::Text("é".into())), ScalarKind::Char).unwrap(),
            Some(Scalar::Char('é'))
        );
    }

    #[test]
    fn test_guid_binary() {
        let id = Uuid::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef);
        let bytes = convert(Some(Scalar::Guid(id)), ScalarKind::Binary)
            .unwrap()
            .unwrap();
        assert_eq!(bytes.clone().convert_to(ScalarKind::Guid).unwrap(), Scalar::Guid(id));
        assert!(matches!(
            Scalar::Binary(vec![1, 2, 3]).convert_to(ScalarKind::Guid),
            Err(ConversionError::MalformedValue { .. })
        ));
    }

    #[test]
    fn test_offset_to_date_time_is_utc() {
        let value = sample(ScalarKind::DateTimeOffset);
        let naive = value.convert_to(ScalarKind::DateTime).unwrap();
        assert_eq!(naive.to_string(), "2024-01-02T02:04:05");
    }

    #[test]
    fn test_duration_time() {
        let time = sample(ScalarKind::Time);
        let duration = time.clone().convert_to(ScalarKind::Duration).unwrap();
        assert_eq!(duration.to_string(), "03:04:05");
        assert_eq!(duration.convert_to(ScalarKind::Time).unwrap(), time);
        assert!(matches!(
            Scalar::Duration(chrono::Duration::hours(25)).convert_to(ScalarKind::Time),
            Err(ConversionError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_text_round_trips() {
        let values = [
            Scalar::Guid(Uuid::from_u128(42)),
            Scalar::Duration(chrono::Duration::seconds(-93_784) - chrono::Duration::milliseconds(5)),
            sample(ScalarKind::Date),
            sample(ScalarKind::Time),
            sample(ScalarKind::DateTime),
            sample(ScalarKind::DateTimeOffset),
            Scalar::Decimal(Decimal::new(-123_456_789, 4)),
        ];
        for value in values {
            let text = value.clone().convert_to(ScalarKind::Text).unwrap();
            assert_eq!(text.convert_to(value.kind()).unwrap(), value);
        }
    }

    #[test]
    fn test_malformed_text() {
        assert!(matches!(
            convert(Some(Scalar::Text("not-a-guid".into())), ScalarKind::Guid),
            Err(ConversionError::MalformedValue { .. })
        ));
        assert!(matches!(
            convert(Some(Scalar::Text("2024-13-01".into())), ScalarKind::Date),
            Err(ConversionError::MalformedValue { .. })
        ));
    }

    #[test]
    fn test_null_handling() {
        assert_eq!(
            convert(None, ScalarKind::Int32),
            Err(ConversionError::NullToNonNullable {
                to: ScalarKind::Int32
            })
        );
        assert_eq!(convert(None, ScalarKind::Int32.nullable()).unwrap(), None);
    }
}
