//! Textual statement templates.
//!
//! ```text
//! SELECT * FROM Orders WHERE CustomerId = {@Customer} AND Id IN (SELECT Value FROM {#Ids})
//!                                         ─────┬─────                              ──┬───
//!                                              │                                    └── temporary table
//!                                              └── parameter
//! ```
//!
//! `{{` and `}}` stand for literal braces.

use std::collections::HashMap;

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{is_not, tag, take_while},
    character::complete::{char, satisfy},
    combinator::{map, recognize, value},
    sequence::{delimited, pair},
};

use super::{Fragment, ParameterValue, Statement, TemporaryTableRequest};
use crate::error::{Error, Result};
use crate::value::ToScalar;

/// Named values a template may refer to. Lookups ignore ASCII case.
#[derive(Debug, Clone, Default)]
pub struct TemplateArgs {
    parameters: HashMap<String, (String, ParameterValue)>,
    tables: HashMap<String, TemporaryTableRequest>,
}

impl TemplateArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param<T: ToScalar + ?Sized>(self, name: impl Into<String>, value: &T) -> Self {
        self.param_value(name, ParameterValue::new(value))
    }

    pub fn param_value(mut self, name: impl Into<String>, value: ParameterValue) -> Self {
        let name = name.into();
        self.parameters
            .insert(name.to_ascii_lowercase(), (name, value));
        self
    }

    pub fn table(mut self, name: impl Into<String>, request: TemporaryTableRequest) -> Self {
        self.tables.insert(name.into().to_ascii_lowercase(), request);
        self
    }

    fn parameter(&self, name: &str) -> Option<&(String, ParameterValue)> {
        self.parameters.get(&name.to_ascii_lowercase())
    }

    fn temporary_table(&self, name: &str) -> Option<&TemporaryTableRequest> {
        self.tables.get(&name.to_ascii_lowercase())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment<'a> {
    Text(&'a str),
    Brace(&'static str),
    Parameter(&'a str),
    Table(&'a str),
}

/// Parse an identifier: a letter or `_`, then letters, digits or `_`.
fn parse_identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)
}

fn parse_segment(input: &str) -> IResult<&str, Segment<'_>> {
    alt((
        value(Segment::Brace("{"), tag("{{")),
        value(Segment::Brace("}"), tag("}}")),
        map(
            delimited(tag("{@"), parse_identifier, char('}')),
            Segment::Parameter,
        ),
        map(delimited(tag("{#"), parse_identifier, char('}')), Segment::Table),
        map(is_not("{}"), Segment::Text),
    ))(input)
}

/// Parse a template into a statement.
pub fn parse(template: &str, args: &TemplateArgs) -> Result<Statement> {
    let mut statement = Statement::new();
    let mut input = template;

    while !input.is_empty() {
        let position = template.len() - input.len();
        let (rest, segment) = parse_segment(input).map_err(|_| {
            let found = input.chars().next().unwrap_or('{');
            Error::template(
                position,
                format!(
                    "Unexpected '{}': use {{@Name}}, {{#Name}}, '{{{{' or '}}}}'",
                    found
                ),
            )
        })?;

        match segment {
            Segment::Text(text) => statement.append_sql(text),
            Segment::Brace(brace) => statement.append_sql(brace),
            Segment::Parameter(name) => {
                let (declared, value) = args.parameter(name).ok_or_else(|| {
                    Error::template(position, format!("Unknown parameter '{}'", name))
                })?;
                statement.push(Fragment::Parameter {
                    name: declared.clone(),
                    value: value.clone(),
                });
            }
            Segment::Table(name) => {
                let request = args.temporary_table(name).ok_or_else(|| {
                    Error::template(position, format!("Unknown temporary table '{}'", name))
                })?;
                statement.append_temp_table(request.clone());
            }
        }
        input = rest;
    }

    Ok(statement)
}
