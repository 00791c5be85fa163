// value.rs — Runtime values produced by expression evaluation
//
// `Value` mirrors the JSON-like data model of HCL expressions: null,
// booleans, numbers, strings, tuples and ordered objects. The typed
// conversions here are what schema setters use to move an evaluated value
// into a resource field.
//
// Preconditions: none.
// Postconditions: conversions never panic; mismatches are `ValueError`.
// Failure modes: `ValueError` on a kind mismatch.
// Side effects: none.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Tuple(Vec<Value>),
    Object(IndexMap<String, Value>),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("{expected} required, found {found}")]
    Mismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("object has no \"name\" attribute")]
    NotAResource,
}

impl Value {
    /// Name of the value's type as reported in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Tuple(_) => "tuple",
            Value::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn object(entries: impl IntoIterator<Item = (String, Value)>) -> Value {
        Value::Object(entries.into_iter().collect())
    }

    fn mismatch(&self, expected: &'static str) -> ValueError {
        ValueError::Mismatch {
            expected,
            found: self.type_name(),
        }
    }

    /// Strings pass through; numbers and bools convert to their text form.
    pub fn into_string(self) -> Result<String, ValueError> {
        match self {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(format_number(n)),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(other.mismatch("string")),
        }
    }

    pub fn into_number(self) -> Result<f64, ValueError> {
        match self {
            Value::Number(n) => Ok(n),
            Value::String(s) => s.trim().parse().map_err(|_| ValueError::Mismatch {
                expected: "number",
                found: "string",
            }),
            other => Err(other.mismatch("number")),
        }
    }

    pub fn into_bool(self) -> Result<bool, ValueError> {
        match self {
            Value::Bool(b) => Ok(b),
            Value::String(s) if s == "true" => Ok(true),
            Value::String(s) if s == "false" => Ok(false),
            other => Err(other.mismatch("bool")),
        }
    }

    pub fn into_string_map(self) -> Result<IndexMap<String, String>, ValueError> {
        match self {
            Value::Object(map) => map
                .into_iter()
                .map(|(k, v)| Ok((k, v.into_string()?)))
                .collect(),
            other => Err(other.mismatch("map of string")),
        }
    }

    /// A reference to another resource evaluates to that resource's value
    /// object; its `name` attribute is the qualified name.
    pub fn into_resource_name(self) -> Result<String, ValueError> {
        match self {
            Value::Object(mut map) => match map.shift_remove("name") {
                Some(Value::String(name)) => Ok(name),
                _ => Err(ValueError::NotAResource),
            },
            other => Err(other.mismatch("resource reference")),
        }
    }

    pub fn into_resource_names(self) -> Result<Vec<String>, ValueError> {
        match self {
            Value::Tuple(items) => items.into_iter().map(Value::into_resource_name).collect(),
            other => Err(other.mismatch("list of resource references")),
        }
    }
}

/// Integral numbers render without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Tuple(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Object(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k} = {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
