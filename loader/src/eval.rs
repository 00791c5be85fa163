// eval.rs — Expression evaluator
//
// Evaluates one attribute expression against the per-load environment.
// Failures carry a closed `EvalErrorKind`; exactly three kinds mean "the
// value is not available yet" and become deferrals, everything else is a
// hard failure for the owning block.
//
// Preconditions: the expression came from the parser.
// Postconditions: `evaluate` returns Resolved, Deferred or Failed, never panics.
// Failure modes: see `EvalErrorKind`.
// Side effects: none (the context is read-only here).

use indexmap::IndexMap;

use crate::ast::{Expr, ExprKind, FileId, SourceRange, Span, Step, Traversal};
use crate::diag::{codes, DiagClass, Diagnostic};
use crate::value::{format_number, Value};

// ── Environment ──────────────────────────────────────────────────────────

/// Name→value environment for one load.
///
/// Top-level symbols are namespaces (`var`, `local`, `query`, ...), each an
/// object of named values. A namespace only exists once something has been
/// inserted into it, so a reference into an empty namespace is an unknown
/// variable rather than a missing attribute.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    namespaces: IndexMap<String, IndexMap<String, Value>>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the `var` namespace with externally supplied values.
    pub fn with_variables(variables: &IndexMap<String, Value>) -> Self {
        let mut ctx = Self::new();
        for (name, value) in variables {
            ctx.insert("var", name, value.clone());
        }
        ctx
    }

    pub fn insert(&mut self, namespace: &str, name: &str, value: Value) {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(name.to_string(), value);
    }

    /// Insert under `<namespace>.<group>.<name>`, e.g. `aws.query.q1` for
    /// references qualified by the mod name.
    pub fn insert_grouped(&mut self, namespace: &str, group: &str, name: &str, value: Value) {
        let slot = self
            .namespaces
            .entry(namespace.to_string())
            .or_default()
            .entry(group.to_string())
            .or_insert_with(|| Value::Object(IndexMap::new()));
        if let Value::Object(map) = slot {
            map.insert(name.to_string(), value);
        }
    }

    pub fn lookup(&self, namespace: &str, name: &str) -> Option<&Value> {
        self.namespaces.get(namespace)?.get(name)
    }

    pub fn contains(&self, namespace: &str, name: &str) -> bool {
        self.lookup(namespace, name).is_some()
    }

    /// Total number of named values across all namespaces.
    pub fn len(&self) -> usize {
        self.namespaces.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Errors ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalErrorKind {
    /// Root symbol of a traversal is not in the environment.
    UnknownVariable,
    /// Object does not (yet) have the named attribute.
    UnsupportedAttribute,
    /// Object does not (yet) have the indexed key.
    MissingMapElement,
    InvalidIndex,
    /// Attribute step applied to something that is not an object.
    InvalidAttributeAccess,
    UnknownFunction,
    InvalidFunctionArgument,
    /// A traversal where only constants are accepted.
    VariablesNotAllowed,
}

impl EvalErrorKind {
    /// The fixed set of "value not yet available" conditions.
    pub fn is_deferral(self) -> bool {
        matches!(
            self,
            EvalErrorKind::UnknownVariable
                | EvalErrorKind::UnsupportedAttribute
                | EvalErrorKind::MissingMapElement
        )
    }

    pub fn summary(self) -> &'static str {
        match self {
            EvalErrorKind::UnknownVariable => "Unknown variable",
            EvalErrorKind::UnsupportedAttribute => "Unsupported attribute",
            EvalErrorKind::MissingMapElement => "Missing map element",
            EvalErrorKind::InvalidIndex => "Invalid index",
            EvalErrorKind::InvalidAttributeAccess => "Invalid attribute access",
            EvalErrorKind::UnknownFunction => "Call to unknown function",
            EvalErrorKind::InvalidFunctionArgument => "Invalid function argument",
            EvalErrorKind::VariablesNotAllowed => "Variables not allowed",
        }
    }

    fn code(self) -> crate::diag::DiagCode {
        match self {
            EvalErrorKind::UnknownVariable => codes::E0100,
            EvalErrorKind::UnsupportedAttribute => codes::E0101,
            EvalErrorKind::MissingMapElement => codes::E0102,
            EvalErrorKind::InvalidIndex => codes::E0103,
            EvalErrorKind::InvalidAttributeAccess => codes::E0104,
            EvalErrorKind::UnknownFunction => codes::E0105,
            EvalErrorKind::InvalidFunctionArgument => codes::E0106,
            EvalErrorKind::VariablesNotAllowed => codes::E0107,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub detail: String,
    pub span: Span,
}

impl EvalError {
    fn new(kind: EvalErrorKind, span: Span, detail: impl Into<String>) -> Self {
        EvalError {
            kind,
            detail: detail.into(),
            span,
        }
    }

    pub fn to_diagnostic(&self, file: FileId) -> Diagnostic {
        let class = if self.kind.is_deferral() {
            DiagClass::Deferral
        } else {
            DiagClass::Evaluation
        };
        Diagnostic::error(class, self.kind.summary())
            .with_code(self.kind.code())
            .with_detail(self.detail.clone())
            .with_subject(SourceRange::new(file, self.span))
    }
}

// ── Outcome ──────────────────────────────────────────────────────────────

/// Outstanding need of an expression that could not be evaluated yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    /// Every name the expression references, rendered `a.b.c`.
    pub names: Vec<String>,
    pub range: SourceRange,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Evaluated {
    Resolved(Value),
    Deferred(Dependency),
    Failed(Diagnostic),
}

/// Evaluate `expr` and classify the outcome.
pub fn evaluate(expr: &Expr, ctx: &EvalContext, file: FileId) -> Evaluated {
    match eval_expr(expr, ctx) {
        Ok(value) => Evaluated::Resolved(value),
        Err(err) if err.kind.is_deferral() => Evaluated::Deferred(Dependency {
            names: expr.variable_names(),
            range: SourceRange::new(file, expr.span),
            detail: format!("{}: {}", err.kind.summary(), err.detail),
        }),
        Err(err) => Evaluated::Failed(err.to_diagnostic(file)),
    }
}

/// Evaluate against the environment.
pub fn eval_expr(expr: &Expr, ctx: &EvalContext) -> Result<Value, EvalError> {
    Evaluator { ctx: Some(ctx) }.eval(expr)
}

/// Evaluate an expression in which references are not allowed
/// (variable defaults, `--var` values).
pub fn evaluate_constant(expr: &Expr) -> Result<Value, EvalError> {
    Evaluator { ctx: None }.eval(expr)
}

// ── Evaluator ────────────────────────────────────────────────────────────

struct Evaluator<'a> {
    ctx: Option<&'a EvalContext>,
}

impl Evaluator<'_> {
    fn eval(&self, expr: &Expr) -> Result<Value, EvalError> {
        match &expr.kind {
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Number(n) => Ok(Value::Number(*n)),
            ExprKind::String(s) => Ok(Value::String(s.clone())),
            ExprKind::Tuple(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Tuple),
            ExprKind::Object(items) => {
                let mut map = IndexMap::with_capacity(items.len());
                for item in items {
                    map.insert(item.key.clone(), self.eval(&item.value)?);
                }
                Ok(Value::Object(map))
            }
            ExprKind::Traversal(t) => self.traverse(t),
            ExprKind::Call(call) => {
                let args = call
                    .args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                call_function(&call.name.name, args, expr.span)
            }
        }
    }

    fn traverse(&self, t: &Traversal) -> Result<Value, EvalError> {
        let Some(ctx) = self.ctx else {
            return Err(EvalError::new(
                EvalErrorKind::VariablesNotAllowed,
                t.root.span,
                "Variables may not be used here.",
            ));
        };

        let root = t.root.name.as_str();
        let Some(namespace) = ctx.namespaces.get(root) else {
            return Err(EvalError::new(
                EvalErrorKind::UnknownVariable,
                t.root.span,
                format!("There is no variable named \"{root}\"."),
            ));
        };

        // The namespace itself is an object; walk steps by reference and
        // clone only the final value.
        let mut current = Cursor::Namespace(namespace);
        for step in &t.steps {
            current = match step {
                Step::Attr(ident) => current.attr(&ident.name, ident.span)?,
                Step::Index(index) => {
                    let key = self.eval(index)?;
                    current.index(&key, index.span)?
                }
            };
        }
        Ok(current.into_value())
    }
}

enum Cursor<'v> {
    Namespace(&'v IndexMap<String, Value>),
    Value(&'v Value),
}

impl<'v> Cursor<'v> {
    fn object(&self) -> Option<&'v IndexMap<String, Value>> {
        match *self {
            Cursor::Namespace(map) => Some(map),
            Cursor::Value(Value::Object(map)) => Some(map),
            Cursor::Value(_) => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Cursor::Namespace(_) => "object",
            Cursor::Value(v) => v.type_name(),
        }
    }

    fn attr(self, name: &str, span: Span) -> Result<Cursor<'v>, EvalError> {
        let Some(map) = self.object() else {
            return Err(EvalError::new(
                EvalErrorKind::InvalidAttributeAccess,
                span,
                format!("Can't access attribute \"{name}\" on a {} value.", self.type_name()),
            ));
        };
        map.get(name).map(Cursor::Value).ok_or_else(|| {
            EvalError::new(
                EvalErrorKind::UnsupportedAttribute,
                span,
                format!("This object does not have an attribute named \"{name}\"."),
            )
        })
    }

    fn index(self, key: &Value, span: Span) -> Result<Cursor<'v>, EvalError> {
        if let Some(map) = self.object() {
            let key = match key {
                Value::String(s) => s.clone(),
                Value::Number(n) => format_number(*n),
                other => {
                    return Err(EvalError::new(
                        EvalErrorKind::InvalidIndex,
                        span,
                        format!("A {} value cannot be used as a map key.", other.type_name()),
                    ))
                }
            };
            return map.get(&key).map(Cursor::Value).ok_or_else(|| {
                EvalError::new(
                    EvalErrorKind::MissingMapElement,
                    span,
                    format!("This map does not have an element with the key \"{key}\"."),
                )
            });
        }
        match (self, key) {
            (Cursor::Value(Value::Tuple(items)), Value::Number(n)) => {
                let idx = *n;
                if idx.fract() != 0.0 || idx < 0.0 || idx as usize >= items.len() {
                    return Err(EvalError::new(
                        EvalErrorKind::InvalidIndex,
                        span,
                        format!(
                            "The given key does not identify an element in this collection value: index {} out of range for {} elements.",
                            format_number(idx),
                            items.len()
                        ),
                    ));
                }
                Ok(Cursor::Value(&items[idx as usize]))
            }
            (cursor, key) => Err(EvalError::new(
                EvalErrorKind::InvalidIndex,
                span,
                format!(
                    "A {} value cannot be indexed by a {}.",
                    cursor.type_name(),
                    key.type_name()
                ),
            )),
        }
    }

    fn into_value(self) -> Value {
        match self {
            Cursor::Namespace(map) => Value::Object(map.clone()),
            Cursor::Value(v) => v.clone(),
        }
    }
}

// ── Built-in functions ───────────────────────────────────────────────────

fn call_function(name: &str, args: Vec<Value>, span: Span) -> Result<Value, EvalError> {
    let bad_arg = |detail: String| EvalError::new(EvalErrorKind::InvalidFunctionArgument, span, detail);
    let arity = |n: usize| {
        if args.len() == n {
            Ok(())
        } else {
            Err(bad_arg(format!(
                "Function \"{name}\" expects {n} argument(s), got {}.",
                args.len()
            )))
        }
    };

    match name {
        "upper" | "lower" | "tostring" => {
            arity(1)?;
            let s = args
                .into_iter()
                .next()
                .unwrap_or_default()
                .into_string()
                .map_err(|e| bad_arg(e.to_string()))?;
            Ok(Value::String(match name {
                "upper" => s.to_uppercase(),
                "lower" => s.to_lowercase(),
                _ => s,
            }))
        }
        "length" => {
            arity(1)?;
            let len = match &args[0] {
                Value::String(s) => s.chars().count(),
                Value::Tuple(items) => items.len(),
                Value::Object(map) => map.len(),
                other => {
                    return Err(bad_arg(format!(
                        "Cannot take the length of a {} value.",
                        other.type_name()
                    )))
                }
            };
            Ok(Value::Number(len as f64))
        }
        "join" => {
            arity(2)?;
            let mut args = args.into_iter();
            let sep = args
                .next()
                .unwrap_or_default()
                .into_string()
                .map_err(|e| bad_arg(e.to_string()))?;
            let Some(Value::Tuple(items)) = args.next() else {
                return Err(bad_arg("Second argument to \"join\" must be a list.".into()));
            };
            let parts = items
                .into_iter()
                .map(Value::into_string)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| bad_arg(e.to_string()))?;
            Ok(Value::String(parts.join(&sep)))
        }
        "merge" => {
            let mut merged = IndexMap::new();
            for arg in args {
                match arg {
                    Value::Object(map) => merged.extend(map),
                    Value::Null => {}
                    other => {
                        return Err(bad_arg(format!(
                            "Arguments to \"merge\" must be objects, found {}.",
                            other.type_name()
                        )))
                    }
                }
            }
            Ok(Value::Object(merged))
        }
        "jsonencode" => {
            arity(1)?;
            serde_json::to_string(&args[0])
                .map(Value::String)
                .map_err(|e| bad_arg(e.to_string()))
        }
        _ => Err(EvalError::new(
            EvalErrorKind::UnknownFunction,
            span,
            format!("There is no function named \"{name}\"."),
        )),
    }
}
