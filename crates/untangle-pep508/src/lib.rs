//! Dependency specifiers such as `requests[socks] >=2.28,<3 ; python_version >= "3.8"`, following
//! [PEP 508](https://packaging.python.org/en/latest/specifications/dependency-specifiers/).
//!
//! Direct URL references (`name @ https://...`) are rejected: everything is resolved against an
//! index.
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use unicode_width::UnicodeWidthStr;

use untangle_normalize::{ExtraName, PackageName};
use untangle_pep440::VersionSpecifiers;

pub use marker::{
    MarkerEnvironment, MarkerExpression, MarkerOperator, MarkerTree, MarkerValue,
    MarkerValueString, MarkerValueVersion, StringVersion,
};

use crate::cursor::Cursor;

mod cursor;
mod marker;

/// A failed parse, pointing at the span of the input at fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pep508Error {
    message: String,
    start: usize,
    len: usize,
    input: String,
}

impl Pep508Error {
    pub(crate) fn new(message: impl Into<String>, start: usize, len: usize, input: &str) -> Self {
        Self {
            message: message.into(),
            start,
            len,
            input: input.to_string(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Pep508Error {
    /// Prints the message, the input, and a line of `^` under the offending span.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // The span is in bytes but the underline is in terminal columns.
        let start_offset = self.input[..self.start].width();
        let underline_len = if self.start == self.input.len() {
            // Point at the end of input.
            1
        } else {
            self.input[self.start..(self.start + self.len).min(self.input.len())]
                .width()
                .max(1)
        };
        write!(
            f,
            "{}\n{}\n{}{}",
            self.message,
            self.input,
            " ".repeat(start_offset),
            "^".repeat(underline_len)
        )
    }
}

impl std::error::Error for Pep508Error {}

/// A PEP 508 dependency specifier.
#[derive(Debug, Clone, Eq, Hash, PartialEq)]
pub struct Requirement {
    /// The normalized distribution name, such as `requests` for `Requests`.
    pub name: PackageName,
    /// The extras to install alongside the package, such as `socks` in `requests[socks]`.
    pub extras: Vec<ExtraName>,
    /// An empty set means any version.
    pub specifiers: VersionSpecifiers,
    /// Markers restricting when the requirement applies, such as `python_version >= "3.8"`.
    pub marker: Option<MarkerTree>,
}

impl Requirement {
    /// Whether this requirement applies in the given environment, for any of the given extras.
    ///
    /// A requirement without markers always applies.
    pub fn evaluate_markers(&self, env: &MarkerEnvironment, extras: &[ExtraName]) -> bool {
        self.marker
            .as_ref()
            .is_none_or(|marker| marker.evaluate(env, extras))
    }
}

impl Display for Requirement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            write!(f, "[")?;
            for (idx, extra) in self.extras.iter().enumerate() {
                if idx > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{extra}")?;
            }
            write!(f, "]")?;
        }
        if !self.specifiers.is_empty() {
            write!(f, "{}", self.specifiers)?;
        }
        if let Some(marker) = &self.marker {
            write!(f, " ; {marker}")?;
        }
        Ok(())
    }
}

impl FromStr for Requirement {
    type Err = Pep508Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        parse_requirement(&mut Cursor::new(input))
    }
}

impl Serialize for Requirement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Requirement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

/// `identifier = letterOrDigit identifier_end*`, where inner characters may also be `-_.`.
fn parse_identifier<'a>(
    cursor: &mut Cursor<'a>,
    what: &str,
) -> Result<(&'a str, usize), Pep508Error> {
    let start = cursor.pos();
    match cursor.peek_char() {
        Some(char) if char.is_ascii_alphanumeric() => {}
        Some(char) => {
            return Err(cursor.error(
                format!("Expected {what} to start with an alphanumeric character, found '{char}'"),
                start,
                char.len_utf8(),
            ));
        }
        None => {
            return Err(cursor.error(
                format!("Expected {what}, found end of dependency specification"),
                start,
                1,
            ));
        }
    }
    let (start, len) =
        cursor.take_while(|char| char.is_ascii_alphanumeric() || matches!(char, '-' | '_' | '.'));
    let identifier = cursor.slice(start, len);
    if identifier.ends_with(['-', '_', '.']) {
        return Err(cursor.error(
            format!("{what} must end with an alphanumeric character"),
            start,
            len,
        ));
    }
    Ok((identifier, start))
}

fn parse_name(cursor: &mut Cursor) -> Result<PackageName, Pep508Error> {
    let (name, start) = parse_identifier(cursor, "package name")?;
    PackageName::new(name).map_err(|err| cursor.error(err.to_string(), start, name.len()))
}

/// ```text
/// extras_list   = identifier (wsp* ',' wsp* identifier)*
/// extras        = '[' wsp* extras_list? wsp* ']'
/// ```
fn parse_extras(cursor: &mut Cursor) -> Result<Vec<ExtraName>, Pep508Error> {
    let Some(bracket_pos) = cursor.eat_char('[') else {
        return Ok(vec![]);
    };
    let mut extras = Vec::new();

    cursor.eat_whitespace();
    if cursor.eat_char(']').is_some() {
        return Ok(extras);
    }
    loop {
        cursor.eat_whitespace();
        let (extra, start) = parse_identifier(cursor, "extra name")?;
        let extra = ExtraName::new(extra)
            .map_err(|err| cursor.error(err.to_string(), start, extra.len()))?;
        if !extras.contains(&extra) {
            extras.push(extra);
        }
        cursor.eat_whitespace();
        match cursor.next() {
            Some((_, ',')) => {}
            Some((_, ']')) => break,
            Some((pos, other)) => {
                return Err(cursor.error(
                    format!("Expected either ',' (separating extras) or ']' (ending the extras section), found '{other}'"),
                    pos,
                    other.len_utf8(),
                ));
            }
            None => {
                return Err(cursor.error(
                    "Missing closing bracket (expected ']', found end of dependency specification)",
                    bracket_pos,
                    1,
                ));
            }
        }
    }
    Ok(extras)
}

/// Parse the specifiers up to the first character matched by `end`.
fn parse_specifiers(
    cursor: &mut Cursor,
    end: impl Fn(char) -> bool,
) -> Result<VersionSpecifiers, Pep508Error> {
    let (start, len) = cursor.take_while(|char| !end(char));
    let text = cursor.slice(start, len);
    VersionSpecifiers::from_str(text).map_err(|err| cursor.error(err.to_string(), start, len))
}

/// ```text
/// name_req      = name wsp* extras? wsp* versionspec? wsp* quoted_marker?
/// ```
fn parse_requirement(cursor: &mut Cursor) -> Result<Requirement, Pep508Error> {
    cursor.eat_whitespace();
    let name = parse_name(cursor)?;
    cursor.eat_whitespace();
    let extras = parse_extras(cursor)?;
    cursor.eat_whitespace();

    let specifiers = match cursor.peek() {
        Some((start, '(')) => {
            cursor.next();
            let specifiers = parse_specifiers(cursor, |char| char == ')')?;
            cursor.next_expect_char(')', start)?;
            specifiers
        }
        Some((start, '@')) => {
            return Err(cursor.error(
                "Direct URL references are not supported, requirements must be resolvable from the index",
                start,
                cursor.remaining(),
            ));
        }
        Some((_, ';')) | None => VersionSpecifiers::empty(),
        Some((_, '<' | '=' | '>' | '~' | '!')) => parse_specifiers(cursor, |char| char == ';')?,
        Some((start, char)) => {
            return Err(cursor.error(
                format!("Expected one of `@`, `(`, `<`, `=`, `>`, `~`, `!`, `;`, found '{char}'"),
                start,
                char.len_utf8(),
            ));
        }
    };
    cursor.eat_whitespace();

    let marker = if cursor.eat_char(';').is_some() {
        Some(marker::parse_markers_cursor(cursor)?)
    } else {
        None
    };

    if let Some((pos, char)) = cursor.next() {
        return Err(cursor.error(
            format!("Unexpected character '{char}' after the requirement"),
            pos,
            cursor.remaining() + char.len_utf8(),
        ));
    }

    Ok(Requirement {
        name,
        extras,
        specifiers,
        marker,
    })
}
