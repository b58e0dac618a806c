//! Field-accessor paths used by data mappings: dotted names and `[n]` indices,
//! e.g. `items[0].id` or `user.address.city`. Anything else (wildcards,
//! filters, negative indices, whitespace) is rejected at parse time.

use std::fmt;
use std::str::FromStr;
use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Field(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathSyntaxError {
    #[error("path is empty")]
    Empty,
    #[error("empty segment at position {position}")]
    EmptySegment { position: usize },
    #[error("unsupported character `{ch}` at position {position}")]
    UnexpectedChar { ch: char, position: usize },
    #[error("unclosed `[` at position {position}")]
    UnclosedIndex { position: usize },
    #[error("`{text}` is not an array index (position {position})")]
    BadIndex { text: String, position: usize },
}

/// A path component that does not exist in a declared schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("field `{field}` is not declared under `{at}`")]
    UndeclaredField { at: String, field: String },
    #[error("`{at}` is not declared as an array")]
    NotAnArray { at: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InjectError {
    #[error("cannot write `{path}`: `{at}` already holds a non-container value")]
    NotAContainer { path: String, at: String },
    /// Arrays only grow by appending, one element at a time.
    #[error("cannot write `{path}`: index {index} is past the end of `{at}` (length {len})")]
    IndexOutOfRange { path: String, at: String, index: usize, len: usize },
}

fn is_field_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '$'
}

impl FieldPath {
    pub fn parse(input: &str) -> Result<Self, PathSyntaxError> {
        if input.is_empty() {
            return Err(PathSyntaxError::Empty);
        }
        let chars: Vec<char> = input.chars().collect();
        let mut segments = Vec::new();
        let mut pos = 0;

        while pos < chars.len() {
            let c = chars[pos];
            if c == '[' {
                let start = pos + 1;
                let mut end = start;
                while end < chars.len() && chars[end] != ']' {
                    end += 1;
                }
                if end >= chars.len() {
                    return Err(PathSyntaxError::UnclosedIndex { position: pos });
                }
                let text: String = chars[start..end].iter().collect();
                if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
                    return Err(PathSyntaxError::BadIndex { text, position: pos });
                }
                let index = text.parse::<usize>()
                    .map_err(|_| PathSyntaxError::BadIndex { text: text.clone(), position: pos })?;
                segments.push(Segment::Index(index));
                pos = end + 1;
                continue;
            }

            if c == '.' {
                if segments.is_empty() {
                    return Err(PathSyntaxError::EmptySegment { position: pos });
                }
                pos += 1;
            } else if !segments.is_empty() {
                // A name may only follow the start of the path or a '.'
                return Err(PathSyntaxError::UnexpectedChar { ch: c, position: pos });
            }

            let start = pos;
            while pos < chars.len() && is_field_char(chars[pos]) {
                pos += 1;
            }
            if pos == start {
                return Err(match chars.get(pos) {
                    Some(&ch) if ch != '.' && ch != '[' => PathSyntaxError::UnexpectedChar { ch, position: pos },
                    _ => PathSyntaxError::EmptySegment { position: pos },
                });
            }
            segments.push(Segment::Field(chars[start..pos].iter().collect()));
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The leading field name, if the path starts with one.
    pub fn head_field(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Segment::Field(name)) => Some(name.as_str()),
            _ => None,
        }
    }

    /// Everything after the first segment.
    pub fn tail(&self) -> FieldPath {
        FieldPath {
            segments: self.segments.iter().skip(1).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Walks a JSON-Schema-shaped value and returns the schema of the addressed field.
    pub fn resolve_schema<'a>(&self, schema: &'a Value) -> Result<&'a Value, ResolveError> {
        let mut current = schema;
        for (i, segment) in self.segments.iter().enumerate() {
            let at = self.prefix_display(i);
            current = match segment {
                Segment::Field(name) => current
                    .get("properties")
                    .and_then(|props| props.get(name))
                    .ok_or_else(|| ResolveError::UndeclaredField { at, field: name.clone() })?,
                Segment::Index(_) => current
                    .get("items")
                    .filter(|items| items.is_object())
                    .ok_or(ResolveError::NotAnArray { at })?,
            };
        }
        Ok(current)
    }

    /// Reads the addressed value out of a live JSON document.
    pub fn extract<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        let mut current = value;
        for segment in &self.segments {
            current = match segment {
                Segment::Field(name) => current.as_object()?.get(name)?,
                Segment::Index(i) => current.as_array()?.get(*i)?,
            };
        }
        Some(current)
    }

    /// Writes `new_value` at this path inside `root`, creating intermediate
    /// objects and arrays where the document has nothing yet. An index may
    /// name an existing element or the slot right after the last one.
    pub fn inject(&self, root: &mut Value, new_value: Value) -> Result<(), InjectError> {
        let mut current = root;
        for (i, segment) in self.segments.iter().enumerate() {
            let conflict = || InjectError::NotAContainer {
                path: self.to_string(),
                at: self.prefix_display(i),
            };
            current = match segment {
                Segment::Field(name) => {
                    if current.is_null() {
                        *current = Value::Object(Map::new());
                    }
                    current
                        .as_object_mut()
                        .ok_or_else(conflict)?
                        .entry(name.clone())
                        .or_insert(Value::Null)
                }
                Segment::Index(idx) => {
                    if current.is_null() {
                        *current = Value::Array(Vec::new());
                    }
                    let items = current.as_array_mut().ok_or_else(conflict)?;
                    if *idx > items.len() {
                        return Err(InjectError::IndexOutOfRange {
                            path: self.to_string(),
                            at: self.prefix_display(i),
                            index: *idx,
                            len: items.len(),
                        });
                    }
                    if *idx == items.len() {
                        items.push(Value::Null);
                    }
                    &mut items[*idx]
                }
            };
        }
        *current = new_value;
        Ok(())
    }

    fn prefix_display(&self, len: usize) -> String {
        if len == 0 {
            return "$".to_string();
        }
        FieldPath { segments: self.segments[..len].to_vec() }.to_string()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Field(name) if i == 0 => write!(f, "{}", name)?,
                Segment::Field(name) => write!(f, ".{}", name)?,
                Segment::Index(idx) => write!(f, "[{}]", idx)?,
            }
        }
        Ok(())
    }
}

impl FromStr for FieldPath {
    type Err = PathSyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FieldPath {
    type Error = PathSyntaxError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}
