// AST node types for .sp mod source files.
//
// Blocks, attributes and expressions of the HCL subset accepted by the
// parser. Every node carries a `SimpleSpan`; blocks also carry the `FileId`
// of the file they came from so diagnostics can point across files.
//
// Preconditions: produced by the parser from a valid or partially-valid token stream.
// Postconditions: each node's span covers the source range of the construct.
// Failure modes: none (data-only module).
// Side effects: none.

use chumsky::span::SimpleSpan;

/// Byte-offset span (alias for chumsky's `SimpleSpan`).
pub type Span = SimpleSpan;

/// Index of a source file registered in a `SourceMap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FileId(pub u32);

/// A span qualified by the file it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceRange {
    pub file: FileId,
    pub span: Span,
}

impl SourceRange {
    pub fn new(file: FileId, span: Span) -> Self {
        SourceRange { file, span }
    }
}

// ── Blocks ──

/// A raw declarative unit: `type "label"... { body }`.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub block_type: Ident,
    pub labels: Vec<Label>,
    pub body: Body,
    pub range: SourceRange,
}

impl Block {
    /// First label, conventionally the block's short name.
    pub fn short_name(&self) -> Option<&str> {
        self.labels.first().map(|l| l.value.as_str())
    }

    /// Range of the block header (type keyword through last label).
    pub fn def_range(&self) -> SourceRange {
        let end = self
            .labels
            .last()
            .map(|l| l.span.end)
            .unwrap_or(self.block_type.span.end);
        let span: Span = (self.block_type.span.start..end).into();
        SourceRange::new(self.range.file, span)
    }

    /// Range of the first label, falling back to the header.
    pub fn label_range(&self) -> SourceRange {
        match self.labels.first() {
            Some(label) => SourceRange::new(self.range.file, label.span),
            None => self.def_range(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.block_type.name
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub value: String,
    pub span: Span,
}

/// Block body: attributes and nested blocks, each in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub attributes: Vec<Attribute>,
    pub blocks: Vec<Block>,
    pub span: Span,
}

impl Body {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name.name == name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }
}

/// `name = expr`
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: Ident,
    pub expr: Expr,
    pub span: Span,
}

// ── Expressions ──

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Null,
    Bool(bool),
    Number(f64),
    /// String or heredoc literal. Template sequences are kept verbatim.
    String(String),
    /// `[a, b, c]`
    Tuple(Vec<Expr>),
    /// `{ key = value, ... }`
    Object(Vec<ObjectItem>),
    /// `root.attr["key"]...`
    Traversal(Traversal),
    /// `name(args...)`
    Call(Call),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectItem {
    pub key: String,
    pub key_span: Span,
    pub value: Expr,
}

/// A variable reference followed by attribute and index steps.
#[derive(Debug, Clone, PartialEq)]
pub struct Traversal {
    pub root: Ident,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// `.name`
    Attr(Ident),
    /// `[expr]`
    Index(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: Ident,
    pub args: Vec<Expr>,
}

/// An identifier with its source text and span.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Traversal {
    /// Leading static segments: the root, attribute steps, and literal
    /// string/number indices up to the first dynamic index.
    pub fn static_path(&self) -> Vec<String> {
        let mut path = vec![self.root.name.clone()];
        for step in &self.steps {
            match step {
                Step::Attr(ident) => path.push(ident.name.clone()),
                Step::Index(expr) => match &expr.kind {
                    ExprKind::String(s) => path.push(s.clone()),
                    ExprKind::Number(n) if n.fract() == 0.0 => path.push(format!("{}", *n as i64)),
                    _ => break,
                },
            }
        }
        path
    }

    /// Dotted rendering of the static path, e.g. `query.q1.sql`.
    pub fn display_name(&self) -> String {
        self.static_path().join(".")
    }
}

impl Expr {
    /// All traversals in this expression, depth-first in source order.
    pub fn variables(&self) -> Vec<&Traversal> {
        let mut out = Vec::new();
        collect_variables(self, &mut out);
        out
    }

    /// Rendered names of every traversal, deduplicated, in source order.
    pub fn variable_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for t in self.variables() {
            let name = t.display_name();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

fn collect_variables<'a>(expr: &'a Expr, out: &mut Vec<&'a Traversal>) {
    match &expr.kind {
        ExprKind::Null | ExprKind::Bool(_) | ExprKind::Number(_) | ExprKind::String(_) => {}
        ExprKind::Tuple(items) => {
            for item in items {
                collect_variables(item, out);
            }
        }
        ExprKind::Object(items) => {
            for item in items {
                collect_variables(&item.value, out);
            }
        }
        ExprKind::Traversal(t) => {
            out.push(t);
            for step in &t.steps {
                if let Step::Index(index) = step {
                    collect_variables(index, out);
                }
            }
        }
        ExprKind::Call(call) => {
            for arg in &call.args {
                collect_variables(arg, out);
            }
        }
    }
}
