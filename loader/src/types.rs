// types.rs — Variable type constraints
//
// `variable` blocks declare a type constraint (`string`, `list(number)`,
// ...) written as a bare expression. Constraints are read syntactically
// from the AST, never evaluated.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::ast::{Expr, ExprKind};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeConstraint {
    Any,
    String,
    Number,
    Bool,
    List(Box<TypeConstraint>),
    Map(Box<TypeConstraint>),
    Object,
}

impl TypeConstraint {
    /// Read a constraint from a `type = ...` expression.
    pub fn from_expr(expr: &Expr) -> Result<TypeConstraint, String> {
        match &expr.kind {
            ExprKind::Traversal(t) if t.steps.is_empty() => Self::from_keyword(&t.root.name),
            ExprKind::Call(call) => {
                let element = match call.args.as_slice() {
                    [] => TypeConstraint::Any,
                    [arg] => Self::from_expr(arg)?,
                    _ => {
                        return Err(format!(
                            "type constructor \"{}\" takes one argument",
                            call.name.name
                        ))
                    }
                };
                match call.name.name.as_str() {
                    "list" | "set" | "tuple" => Ok(TypeConstraint::List(Box::new(element))),
                    "map" => Ok(TypeConstraint::Map(Box::new(element))),
                    "object" => Ok(TypeConstraint::Object),
                    other => Err(format!("unknown type constructor \"{other}\"")),
                }
            }
            _ => Err("a type constraint must be a type keyword or constructor".to_string()),
        }
    }

    fn from_keyword(name: &str) -> Result<TypeConstraint, String> {
        Ok(match name {
            "any" => TypeConstraint::Any,
            "string" => TypeConstraint::String,
            "number" => TypeConstraint::Number,
            "bool" => TypeConstraint::Bool,
            "list" | "set" | "tuple" => TypeConstraint::List(Box::new(TypeConstraint::Any)),
            "map" => TypeConstraint::Map(Box::new(TypeConstraint::Any)),
            "object" => TypeConstraint::Object,
            other => return Err(format!("unknown type keyword \"{other}\"")),
        })
    }

    /// Convert `value` to this type, as HCL's safe conversions do.
    pub fn conform(&self, value: Value) -> Result<Value, String> {
        match self {
            TypeConstraint::Any => Ok(value),
            TypeConstraint::String => value.into_string().map(Value::String).map_err(|e| e.to_string()),
            TypeConstraint::Number => value.into_number().map(Value::Number).map_err(|e| e.to_string()),
            TypeConstraint::Bool => value.into_bool().map(Value::Bool).map_err(|e| e.to_string()),
            TypeConstraint::List(elem) => match value {
                Value::Tuple(items) => items
                    .into_iter()
                    .map(|item| elem.conform(item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Tuple),
                other => Err(format!("{self} required, found {}", other.type_name())),
            },
            TypeConstraint::Map(elem) => match value {
                Value::Object(map) => map
                    .into_iter()
                    .map(|(k, v)| Ok((k, elem.conform(v)?)))
                    .collect::<Result<_, String>>()
                    .map(Value::Object),
                other => Err(format!("{self} required, found {}", other.type_name())),
            },
            TypeConstraint::Object => match value {
                Value::Object(map) => Ok(Value::Object(map)),
                other => Err(format!("object required, found {}", other.type_name())),
            },
        }
    }
}

impl fmt::Display for TypeConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeConstraint::Any => write!(f, "any"),
            TypeConstraint::String => write!(f, "string"),
            TypeConstraint::Number => write!(f, "number"),
            TypeConstraint::Bool => write!(f, "bool"),
            TypeConstraint::List(elem) => write!(f, "list({elem})"),
            TypeConstraint::Map(elem) => write!(f, "map({elem})"),
            TypeConstraint::Object => write!(f, "object"),
        }
    }
}

impl Serialize for TypeConstraint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
