//! Canonical text forms of scalar values.

use std::num::IntErrorKind;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat};
use nom::{
    IResult,
    character::complete::{char, digit1},
    combinator::{all_consuming, map_res, opt},
    sequence::{preceded, terminated, tuple},
};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{Scalar, ScalarKind};
use crate::error::ConversionError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S%.f";
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const DATE_TIME_FORMAT_SPACED: &str = "%Y-%m-%d %H:%M:%S%.f";

const SECONDS_PER_DAY: i64 = 86_400;

/// Render a scalar in its canonical text form.
pub fn format_text(value: &Scalar) -> String {
    match value {
        Scalar::Bool(v) => v.to_string(),
        Scalar::Int8(v) => v.to_string(),
        Scalar::Int16(v) => v.to_string(),
        Scalar::Int32(v) => v.to_string(),
        Scalar::Int64(v) => v.to_string(),
        Scalar::Float32(v) => v.to_string(),
        Scalar::Float64(v) => v.to_string(),
        Scalar::Decimal(v) => v.to_string(),
        Scalar::Text(v) => v.clone(),
        Scalar::Char(v) => v.to_string(),
        Scalar::Binary(v) => STANDARD.encode(v),
        Scalar::Date(v) => v.format(DATE_FORMAT).to_string(),
        Scalar::Time(v) => v.format(TIME_FORMAT).to_string(),
        Scalar::DateTime(v) => v.format(DATE_TIME_FORMAT).to_string(),
        Scalar::DateTimeOffset(v) => v.to_rfc3339_opts(SecondsFormat::AutoSi, false),
        Scalar::Duration(v) => format_duration(*v),
        Scalar::Guid(v) => v.hyphenated().to_string(),
        Scalar::Enum(v) => v.symbol.to_string(),
    }
}

/// Parse canonical text into a scalar of the given kind.
pub fn parse_text(text: &str, kind: ScalarKind) -> Result<Scalar, ConversionError> {
    let malformed = |reason: String| ConversionError::malformed(text, kind, reason);

    match kind {
        ScalarKind::Text | ScalarKind::Any => Ok(Scalar::Text(text.to_string())),
        ScalarKind::Boolean => {
            if text.eq_ignore_ascii_case("true") {
                Ok(Scalar::Bool(true))
            } else if text.eq_ignore_ascii_case("false") {
                Ok(Scalar::Bool(false))
            } else {
                Err(malformed("expected 'true' or 'false'".to_string()))
            }
        }
        ScalarKind::Int8 => parse_integer::<i8>(text, kind).map(Scalar::Int8),
        ScalarKind::Int16 => parse_integer::<i16>(text, kind).map(Scalar::Int16),
        ScalarKind::Int32 => parse_integer::<i32>(text, kind).map(Scalar::Int32),
        ScalarKind::Int64 => parse_integer::<i64>(text, kind).map(Scalar::Int64),
        ScalarKind::Float32 => text
            .parse::<f32>()
            .map(Scalar::Float32)
            .map_err(|e| malformed(e.to_string())),
        ScalarKind::Float64 => text
            .parse::<f64>()
            .map(Scalar::Float64)
            .map_err(|e| malformed(e.to_string())),
        ScalarKind::Decimal => Decimal::from_str(text)
            .or_else(|_| Decimal::from_scientific(text))
            .map(Scalar::Decimal)
            .map_err(|e| malformed(e.to_string())),
        ScalarKind::Char => {
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Scalar::Char(c)),
                _ => Err(ConversionError::NotSingleCharacter {
                    value: text.to_string(),
                }),
            }
        }
        ScalarKind::Binary => STANDARD
            .decode(text)
            .map(Scalar::Binary)
            .map_err(|e| malformed(e.to_string())),
        ScalarKind::Date => NaiveDate::parse_from_str(text, DATE_FORMAT)
            .map(Scalar::Date)
            .map_err(|e| malformed(e.to_string())),
        ScalarKind::Time => NaiveTime::parse_from_str(text, TIME_FORMAT)
            .map(Scalar::Time)
            .map_err(|e| malformed(e.to_string())),
        ScalarKind::DateTime => NaiveDateTime::parse_from_str(text, DATE_TIME_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(text, DATE_TIME_FORMAT_SPACED))
            .map(Scalar::DateTime)
            .map_err(|e| malformed(e.to_string())),
        ScalarKind::DateTimeOffset => DateTime::parse_from_rfc3339(text)
            .map(Scalar::DateTimeOffset)
            .map_err(|e| malformed(e.to_string())),
        ScalarKind::Duration => parse_duration(text).map(Scalar::Duration),
        ScalarKind::Guid => Uuid::parse_str(text)
            .map(Scalar::Guid)
            .map_err(|e| malformed(e.to_string())),
        ScalarKind::Enum(def) => def
            .by_symbol(text)
            .or_else(|| {
                text.parse::<i64>()
                    .ok()
                    .and_then(|n| def.by_discriminant(n))
            })
            .map(Scalar::Enum)
            .ok_or_else(|| malformed(format!("not a variant of {}", def.name))),
    }
}

fn parse_integer<T>(text: &str, kind: ScalarKind) -> Result<T, ConversionError>
where
    T: FromStr<Err = std::num::ParseIntError>,
{
    text.parse::<T>().map_err(|e| match e.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
            ConversionError::out_of_range(text, kind)
        }
        _ => ConversionError::malformed(text, kind, e),
    })
}

/// Format a duration as `[-][d.]hh:mm:ss[.fffffffff]`.
pub fn format_duration(duration: chrono::Duration) -> String {
    let negative = duration < chrono::Duration::zero();
    let magnitude = if negative { -duration } else { duration };

    let total_seconds = magnitude.num_seconds();
    let nanos = (magnitude - chrono::Duration::seconds(total_seconds))
        .num_nanoseconds()
        .unwrap_or(0);

    let days = total_seconds / SECONDS_PER_DAY;
    let rest = total_seconds % SECONDS_PER_DAY;
    let (hours, minutes, seconds) = (rest / 3600, (rest % 3600) / 60, rest % 60);

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    if days > 0 {
        out.push_str(&format!("{}.", days));
    }
    out.push_str(&format!("{:02}:{:02}:{:02}", hours, minutes, seconds));
    if nanos > 0 {
        let fraction = format!("{:09}", nanos);
        out.push('.');
        out.push_str(fraction.trim_end_matches('0'));
    }
    out
}

type DurationParts<'a> = (Option<char>, Option<i64>, i64, i64, i64, Option<&'a str>);

fn number(input: &str) -> IResult<&str, i64> {
    map_res(digit1, str::parse::<i64>)(input)
}

fn duration_parts(input: &str) -> IResult<&str, DurationParts<'_>> {
    all_consuming(tuple((
        opt(char('-')),
        opt(terminated(number, char('.'))),
        number,
        preceded(char(':'), number),
        preceded(char(':'), number),
        opt(preceded(char('.'), digit1)),
    )))(input)
}

/// Parse `[-][d.]hh:mm:ss[.fffffffff]`.
pub fn parse_duration(text: &str) -> Result<chrono::Duration, ConversionError> {
    let malformed = |reason: &str| ConversionError::malformed(text, ScalarKind::Duration, reason);

    let (_, (sign, days, hours, minutes, seconds, fraction)) =
        duration_parts(text).map_err(|_| malformed("expected [-][d.]hh:mm:ss[.fffffffff]"))?;

    if hours > 23 || minutes > 59 || seconds > 59 {
        return Err(malformed("component out of range"));
    }
    let nanos = match fraction {
        None => 0,
        Some(digits) if digits.len() <= 9 => {
            let padded = format!("{:0<9}", digits);
            padded
                .parse::<i64>()
                .map_err(|_| malformed("invalid fraction"))?
        }
        Some(_) => return Err(malformed("more than nine fractional digits")),
    };

    let days = days.unwrap_or(0);
    let total_seconds = days
        .checked_mul(SECONDS_PER_DAY)
        .and_then(|s| s.checked_add(hours * 3600 + minutes * 60 + seconds))
        .filter(|s| *s <= i64::MAX / 1000)
        .ok_or_else(|| ConversionError::out_of_range(text, ScalarKind::Duration))?;

    let magnitude = chrono::Duration::seconds(total_seconds) + chrono::Duration::nanoseconds(nanos);
    Ok(if sign.is_some() { -magnitude } else { magnitude })
}
