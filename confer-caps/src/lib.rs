#![warn(rust_2018_idioms)]
#![allow(dead_code)]

//! Structured capability descriptors.
//!
//! A [`Caps`] describes one media or wire format: a mimetype-style name
//! (`audio/x-mulaw`, `application/x-rtp`, ...) plus a set of typed fields.
//! Two descriptors can be tested for intersection, which is how codec
//! capabilities are matched against each other during discovery and
//! negotiation. Descriptors round-trip through a textual form so they can be
//! persisted in the codec blueprint cache.

use std::fmt;
use std::str::FromStr;

use shared::error::{Error, Result};

/// A single typed field value inside a [`Caps`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapsValue {
    Str(String),
    Int(i32),
    /// Inclusive integer range.
    IntRange(i32, i32),
}

impl CapsValue {
    pub fn str(s: impl Into<String>) -> Self {
        CapsValue::Str(s.into())
    }

    /// Intersection of two field values, or `None` when they are disjoint.
    ///
    /// A range that collapses to a single value becomes `Int`.
    pub fn intersect(&self, other: &CapsValue) -> Option<CapsValue> {
        match (self, other) {
            (CapsValue::Str(a), CapsValue::Str(b)) => {
                if a == b {
                    Some(CapsValue::Str(a.clone()))
                } else {
                    None
                }
            }
            (CapsValue::Int(a), CapsValue::Int(b)) => {
                if a == b {
                    Some(CapsValue::Int(*a))
                } else {
                    None
                }
            }
            (CapsValue::Int(a), CapsValue::IntRange(min, max))
            | (CapsValue::IntRange(min, max), CapsValue::Int(a)) => {
                if a >= min && a <= max {
                    Some(CapsValue::Int(*a))
                } else {
                    None
                }
            }
            (CapsValue::IntRange(min1, max1), CapsValue::IntRange(min2, max2)) => {
                let min = *min1.max(min2);
                let max = *max1.min(max2);
                if min > max {
                    None
                } else if min == max {
                    Some(CapsValue::Int(min))
                } else {
                    Some(CapsValue::IntRange(min, max))
                }
            }
            _ => None,
        }
    }
}

impl fmt::Display for CapsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapsValue::Str(s) => {
                if needs_quoting(s) {
                    write!(f, "(string)\"{}\"", escape(s))
                } else {
                    write!(f, "(string){s}")
                }
            }
            CapsValue::Int(i) => write!(f, "(int){i}"),
            CapsValue::IntRange(min, max) => write!(f, "(int-range)[{min},{max}]"),
        }
    }
}

fn needs_quoting(s: &str) -> bool {
    s.is_empty()
        || s.chars()
            .any(|c| c.is_whitespace() || matches!(c, ',' | '"' | '\\' | '(' | ')' | '[' | ']' | '='))
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// A named capability structure.
///
/// Field order is preserved for serialization but is irrelevant for equality
/// and intersection.
#[derive(Debug, Clone)]
pub struct Caps {
    name: String,
    fields: Vec<(String, CapsValue)>,
}

impl Caps {
    pub fn new(name: impl Into<String>) -> Self {
        Caps {
            name: name.into(),
            fields: vec![],
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: CapsValue) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a field, replacing any previous value under the same name.
    pub fn set(&mut self, name: impl Into<String>, value: CapsValue) {
        let name = name.into();
        if let Some(entry) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = value;
        } else {
            self.fields.push((name, value));
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self, name: &str) -> Option<&CapsValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &CapsValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Whether any shared configuration exists between the two descriptors.
    pub fn intersects(&self, other: &Caps) -> bool {
        self.intersect(other).is_some()
    }

    /// Computes the shared configuration of two descriptors.
    ///
    /// The names must be equal and every field present on both sides must
    /// have a non-empty value intersection. Fields present on a single side
    /// constrain nothing and carry over into the result.
    pub fn intersect(&self, other: &Caps) -> Option<Caps> {
        if self.name != other.name {
            return None;
        }

        let mut result = Caps::new(self.name.clone());
        for (name, value) in &self.fields {
            match other.field(name) {
                Some(other_value) => {
                    result.fields.push((name.clone(), value.intersect(other_value)?));
                }
                None => result.fields.push((name.clone(), value.clone())),
            }
        }
        for (name, value) in &other.fields {
            if self.field(name).is_none() {
                result.fields.push((name.clone(), value.clone()));
            }
        }

        Some(result)
    }
}

impl PartialEq for Caps {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .all(|(name, value)| other.field(name) == Some(value))
    }
}

impl Eq for Caps {}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for (name, value) in &self.fields {
            write!(f, ", {name}={value}")?;
        }
        Ok(())
    }
}

impl FromStr for Caps {
    type Err = Error;

    fn from_str(s: &str) -> Result<Caps> {
        let mut parser = Parser::new(s);
        parser.parse()
    }
}

struct Parser<'a> {
    rest: &'a str,
}

impl<'a> Parser<'a> {
    fn new(s: &'a str) -> Self {
        Parser { rest: s }
    }

    fn parse(&mut self) -> Result<Caps> {
        let name = match self.rest.find(',') {
            Some(pos) => {
                let name = self.rest[..pos].trim();
                self.rest = &self.rest[pos + 1..];
                name
            }
            None => {
                let name = self.rest.trim();
                self.rest = "";
                name
            }
        };
        if name.is_empty() {
            return Err(Error::ErrCapsEmptyString);
        }

        let mut caps = Caps::new(name);
        loop {
            self.rest = self.rest.trim_start();
            if self.rest.is_empty() {
                return Ok(caps);
            }
            let (name, value) = self.parse_field()?;
            caps.set(name, value);
        }
    }

    fn parse_field(&mut self) -> Result<(String, CapsValue)> {
        let eq = self
            .rest
            .find('=')
            .ok_or_else(|| Error::ErrCapsMalformedField(self.rest.to_owned()))?;
        let name = self.rest[..eq].trim().to_owned();
        if name.is_empty() {
            return Err(Error::ErrCapsMalformedField(self.rest.to_owned()));
        }
        self.rest = &self.rest[eq + 1..];

        if !self.rest.starts_with('(') {
            return Err(Error::ErrCapsMalformedField(name));
        }
        let close = self
            .rest
            .find(')')
            .ok_or_else(|| Error::ErrCapsMalformedField(name.clone()))?;
        let type_name = &self.rest[1..close];
        let type_name = type_name.to_owned();
        self.rest = &self.rest[close + 1..];

        let value = match type_name.as_str() {
            "string" => CapsValue::Str(self.parse_string_value()?),
            "int" => CapsValue::Int(self.parse_raw_value()?.trim().parse()?),
            "int-range" => self.parse_range_value()?,
            other => return Err(Error::ErrCapsUnknownFieldType(other.to_owned())),
        };

        Ok((name, value))
    }

    /// Reads up to the next field separator. Used for unquoted scalars.
    fn parse_raw_value(&mut self) -> Result<String> {
        let end = self.rest.find(',').unwrap_or(self.rest.len());
        let value = self.rest[..end].to_owned();
        self.rest = &self.rest[(end + 1).min(self.rest.len())..];
        Ok(value)
    }

    fn parse_string_value(&mut self) -> Result<String> {
        if !self.rest.starts_with('"') {
            return Ok(self.parse_raw_value()?.trim().to_owned());
        }

        let mut value = String::new();
        let mut chars = self.rest.char_indices().skip(1);
        loop {
            match chars.next() {
                Some((_, '\\')) => match chars.next() {
                    Some((_, c)) => value.push(c),
                    None => return Err(Error::ErrCapsUnterminatedString),
                },
                Some((pos, '"')) => {
                    self.rest = &self.rest[pos + 1..];
                    // swallow the trailing separator, if any
                    if let Some(stripped) = self.rest.trim_start().strip_prefix(',') {
                        self.rest = stripped;
                    }
                    return Ok(value);
                }
                Some((_, c)) => value.push(c),
                None => return Err(Error::ErrCapsUnterminatedString),
            }
        }
    }

    fn parse_range_value(&mut self) -> Result<CapsValue> {
        let raw = self.parse_raw_value()?;
        // a range carries its own comma: "[96" was cut at the separator
        let raw = if !raw.contains(']') {
            let end = self
                .rest
                .find(']')
                .ok_or_else(|| Error::ErrCapsMalformedField(raw.clone()))?;
            let mut full = raw;
            full.push(',');
            full.push_str(&self.rest[..=end]);
            self.rest = &self.rest[end + 1..];
            if let Some(stripped) = self.rest.trim_start().strip_prefix(',') {
                self.rest = stripped;
            }
            full
        } else {
            raw
        };

        let inner = raw
            .trim()
            .strip_prefix('[')
            .and_then(|r| r.strip_suffix(']'))
            .ok_or_else(|| Error::ErrCapsMalformedField(raw.clone()))?;
        let mut parts = inner.splitn(2, ',');
        let min: i32 = parts
            .next()
            .ok_or_else(|| Error::ErrCapsMalformedField(raw.clone()))?
            .trim()
            .parse()?;
        let max: i32 = parts
            .next()
            .ok_or_else(|| Error::ErrCapsMalformedField(raw.clone()))?
            .trim()
            .parse()?;
        if min > max {
            return Err(Error::ErrCapsEmptyRange);
        }
        Ok(CapsValue::IntRange(min, max))
    }
}
