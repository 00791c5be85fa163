// literal.rs — Value to backend (PostgreSQL) literal conversion
//
// Param defaults and control args are stored as SQL literal text so they
// can be substituted into prepared statements at run time.
//
// Preconditions: none.
// Postconditions: each supported value kind has exactly one textual form.
// Failure modes: null and object values are `LiteralError::UnsupportedType`.
// Side effects: none.

use thiserror::Error;

use crate::value::{format_number, Value};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiteralError {
    #[error("unsupported type '{0}'")]
    UnsupportedType(&'static str),
}

pub fn to_backend_literal(value: &Value) -> Result<String, LiteralError> {
    match value {
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(format_number(*n)),
        Value::String(s) => Ok(format!("'{}'", s.replace('\'', "''"))),
        Value::Tuple(items) => {
            let elems = items
                .iter()
                .map(to_backend_literal)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(format!("array[{}]", elems.join(",")))
        }
        Value::Null | Value::Object(_) => Err(LiteralError::UnsupportedType(value.type_name())),
    }
}
