//! Dotted field paths over JSON message envelopes.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors from parsing a field path or writing through one.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The path was empty.
    #[error("field path cannot be empty")]
    EmptyPath,

    /// The path contained an empty segment, e.g. `payload..value`.
    #[error("field path {path:?} has an empty segment")]
    EmptySegment { path: String },

    /// A value on the way to the target field cannot hold child fields.
    #[error("cannot write {path}: {segment} is {found}, not an object")]
    NotAnObject {
        path: String,
        segment: String,
        found: &'static str,
    },
}

/// A validated dotted path such as `payload` or `payload.interval.ms`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath {
    raw: String,
    segments: Vec<String>,
}

impl FieldPath {
    /// Parses a dotted path.
    pub fn parse(path: impl Into<String>) -> Result<Self, EnvelopeError> {
        let raw = path.into();
        if raw.is_empty() {
            return Err(EnvelopeError::EmptyPath);
        }
        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(EnvelopeError::EmptySegment { path: raw });
        }
        Ok(Self { raw, segments })
    }

    /// Returns the path as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Reads the value at this path, if every segment resolves.
    pub fn get<'a>(&self, envelope: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(envelope, |current, segment| current.get(segment))
    }

    /// Writes `value` at this path, creating missing intermediate objects.
    ///
    /// Fails when the envelope itself, or any existing value along the path,
    /// is not an object. Null intermediates are replaced.
    pub fn set(&self, envelope: &mut Value, value: Value) -> Result<(), EnvelopeError> {
        let Some((last, parents)) = self.segments.split_last() else {
            return Err(EnvelopeError::EmptyPath);
        };

        let mut current = envelope;
        for (depth, segment) in parents.iter().enumerate() {
            let map = self.object_at(current, depth)?;
            current = map
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
        }

        let map = self.object_at(current, parents.len())?;
        map.insert(last.clone(), value);
        Ok(())
    }

    fn object_at<'a>(
        &self,
        value: &'a mut Value,
        depth: usize,
    ) -> Result<&'a mut Map<String, Value>, EnvelopeError> {
        if value.is_null() {
            *value = Value::Object(Map::new());
        }
        match value {
            Value::Object(map) => Ok(map),
            other => Err(EnvelopeError::NotAnObject {
                path: self.raw.clone(),
                segment: if depth == 0 {
                    "the message".to_string()
                } else {
                    self.segments[..depth].join(".")
                },
                found: json_type(other),
            }),
        }
    }
}

impl TryFrom<String> for FieldPath {
    type Error = EnvelopeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.raw
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
