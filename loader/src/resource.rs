// resource.rs — Typed resources produced by decoding blocks
//
// A `Resource` is a closed tagged variant: common identity fields plus a
// `ResourceBody` per kind. Container capability is an explicit table
// (`ResourceKind::can_contain`) instead of structural typing.
//
// Preconditions: none.
// Postconditions: `full_name` is always `<mod>.<prefix>.<short_name>`.
// Failure modes: `on_decoded` reports post-decode validation failures.
// Side effects: none.

use std::fmt;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use crate::ast::SourceRange;
use crate::types::TypeConstraint;
use crate::value::Value;

// ── Kinds ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Mod,
    Local,
    Variable,
    Query,
    Control,
    Param,
    Panel,
    Report,
    Benchmark,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 9] = [
        ResourceKind::Mod,
        ResourceKind::Local,
        ResourceKind::Variable,
        ResourceKind::Query,
        ResourceKind::Control,
        ResourceKind::Param,
        ResourceKind::Panel,
        ResourceKind::Report,
        ResourceKind::Benchmark,
    ];

    /// Map a block type keyword to the kind it decodes into.
    pub fn from_block_type(block_type: &str) -> Option<ResourceKind> {
        match block_type {
            "mod" => Some(ResourceKind::Mod),
            "locals" => Some(ResourceKind::Local),
            "variable" => Some(ResourceKind::Variable),
            "query" => Some(ResourceKind::Query),
            "control" => Some(ResourceKind::Control),
            "param" => Some(ResourceKind::Param),
            "panel" => Some(ResourceKind::Panel),
            "report" => Some(ResourceKind::Report),
            "benchmark" => Some(ResourceKind::Benchmark),
            _ => None,
        }
    }

    pub fn block_type(self) -> &'static str {
        match self {
            ResourceKind::Mod => "mod",
            ResourceKind::Local => "locals",
            ResourceKind::Variable => "variable",
            ResourceKind::Query => "query",
            ResourceKind::Control => "control",
            ResourceKind::Param => "param",
            ResourceKind::Panel => "panel",
            ResourceKind::Report => "report",
            ResourceKind::Benchmark => "benchmark",
        }
    }

    /// Prefix used in names and as the environment namespace.
    pub fn prefix(self) -> &'static str {
        match self {
            ResourceKind::Local => "local",
            ResourceKind::Variable => "var",
            other => other.block_type(),
        }
    }

    /// Capability table: which kinds may be attached under which.
    pub fn can_contain(self, child: ResourceKind) -> bool {
        match self {
            ResourceKind::Mod => !matches!(child, ResourceKind::Mod | ResourceKind::Param),
            ResourceKind::Report | ResourceKind::Panel => {
                matches!(child, ResourceKind::Panel | ResourceKind::Report)
            }
            ResourceKind::Benchmark => {
                matches!(child, ResourceKind::Control | ResourceKind::Benchmark)
            }
            ResourceKind::Local
            | ResourceKind::Variable
            | ResourceKind::Query
            | ResourceKind::Control
            | ResourceKind::Param => false,
        }
    }

    pub fn is_container(self) -> bool {
        Self::ALL.iter().any(|&child| self.can_contain(child))
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

// ── Metadata ─────────────────────────────────────────────────────────────

/// Declaring mod and source location, stamped on attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceMetadata {
    pub mod_short_name: String,
    pub file_name: String,
    pub start_line: usize,
    pub end_line: usize,
}

// ── Bodies ───────────────────────────────────────────────────────────────

/// Properties shared by most kinds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Properties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub tags: IndexMap<String, String>,
}

/// A `param` block of a query or control, default already in literal form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamDef {
    pub name: String,
    pub description: Option<String>,
    pub default: Option<String>,
}

/// Control `args`: named (object) or positional (tuple), values in
/// literal form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Args {
    Named(IndexMap<String, String>),
    Positional(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryBody {
    pub sql: Option<String>,
    pub search_path: Option<String>,
    pub search_path_prefix: Option<String>,
    pub params: Vec<ParamDef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ControlBody {
    pub sql: Option<String>,
    /// Qualified name of the referenced query.
    pub query: Option<String>,
    pub search_path: Option<String>,
    pub search_path_prefix: Option<String>,
    pub severity: Option<String>,
    pub args: Option<Args>,
    pub params: Vec<ParamDef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PanelBody {
    #[serde(rename = "type")]
    pub panel_type: Option<String>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub source: Option<String>,
    pub text: Option<String>,
    pub sql: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BenchmarkBody {
    /// Qualified names of child controls and benchmarks.
    pub children: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableBody {
    #[serde(rename = "type")]
    pub type_constraint: TypeConstraint,
    pub default: Option<Value>,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResourceBody {
    Mod,
    Local { value: Value },
    Variable(VariableBody),
    Query(QueryBody),
    Control(ControlBody),
    Panel(PanelBody),
    Report,
    Benchmark(BenchmarkBody),
}

impl ResourceBody {
    fn empty(kind: ResourceKind) -> Option<ResourceBody> {
        Some(match kind {
            ResourceKind::Mod => ResourceBody::Mod,
            ResourceKind::Local => ResourceBody::Local { value: Value::Null },
            ResourceKind::Variable => ResourceBody::Variable(VariableBody {
                type_constraint: TypeConstraint::Any,
                default: None,
                value: Value::Null,
            }),
            ResourceKind::Query => ResourceBody::Query(QueryBody::default()),
            ResourceKind::Control => ResourceBody::Control(ControlBody::default()),
            ResourceKind::Panel => ResourceBody::Panel(PanelBody::default()),
            ResourceKind::Report => ResourceBody::Report,
            ResourceKind::Benchmark => ResourceBody::Benchmark(BenchmarkBody::default()),
            ResourceKind::Param => return None,
        })
    }
}

// ── Resource ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    pub kind: ResourceKind,
    pub short_name: String,
    pub full_name: String,
    #[serde(skip)]
    pub decl_range: SourceRange,
    /// Union of every name referenced by this resource's expressions.
    #[serde(skip_serializing_if = "IndexSet::is_empty")]
    pub references: IndexSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResourceMetadata>,
    #[serde(flatten)]
    pub props: Properties,
    #[serde(flatten)]
    pub body: ResourceBody,
}

impl Resource {
    /// An empty shell for `kind`. Params are not standalone resources.
    pub fn shell(
        kind: ResourceKind,
        mod_name: &str,
        short_name: &str,
        decl_range: SourceRange,
    ) -> Option<Resource> {
        let body = ResourceBody::empty(kind)?;
        let full_name = if kind == ResourceKind::Mod {
            format!("mod.{short_name}")
        } else {
            format!("{mod_name}.{}.{short_name}", kind.prefix())
        };
        Some(Resource {
            kind,
            short_name: short_name.to_string(),
            full_name,
            decl_range,
            references: IndexSet::new(),
            metadata: None,
            props: Properties::default(),
            body,
        })
    }

    /// The root resource of a mod.
    pub fn root(mod_name: &str, decl_range: SourceRange) -> Resource {
        Resource {
            kind: ResourceKind::Mod,
            short_name: mod_name.to_string(),
            full_name: format!("mod.{mod_name}"),
            decl_range,
            references: IndexSet::new(),
            metadata: None,
            props: Properties::default(),
            body: ResourceBody::Mod,
        }
    }

    /// Unqualified name, e.g. `query.q1`.
    pub fn name(&self) -> String {
        format!("{}.{}", self.kind.prefix(), self.short_name)
    }

    /// Value exposed to other expressions through the environment.
    ///
    /// Locals and variables expose their value; every other kind exposes
    /// an object of its properties with `name` set to the qualified name.
    pub fn to_value(&self) -> Value {
        match &self.body {
            ResourceBody::Local { value } => return value.clone(),
            ResourceBody::Variable(v) => return v.value.clone(),
            _ => {}
        }

        let mut obj = IndexMap::new();
        obj.insert("name".to_string(), Value::from(self.full_name.clone()));
        obj.insert("short_name".to_string(), Value::from(self.short_name.clone()));
        obj.insert("title".to_string(), Value::from(self.props.title.clone()));
        obj.insert(
            "description".to_string(),
            Value::from(self.props.description.clone()),
        );
        obj.insert(
            "tags".to_string(),
            Value::object(
                self.props
                    .tags
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(v.clone()))),
            ),
        );
        match &self.body {
            ResourceBody::Query(q) => {
                obj.insert("sql".to_string(), Value::from(q.sql.clone()));
            }
            ResourceBody::Control(c) => {
                obj.insert("sql".to_string(), Value::from(c.sql.clone()));
                obj.insert("query".to_string(), Value::from(c.query.clone()));
                obj.insert("severity".to_string(), Value::from(c.severity.clone()));
            }
            ResourceBody::Panel(p) => {
                obj.insert("type".to_string(), Value::from(p.panel_type.clone()));
                obj.insert("sql".to_string(), Value::from(p.sql.clone()));
                obj.insert("text".to_string(), Value::from(p.text.clone()));
            }
            ResourceBody::Benchmark(b) => {
                obj.insert(
                    "children".to_string(),
                    Value::Tuple(b.children.iter().cloned().map(Value::from).collect()),
                );
            }
            _ => {}
        }
        Value::Object(obj)
    }

    /// Post-decode hook for the generic decode path.
    pub fn on_decoded(&self) -> Result<(), String> {
        if let ResourceBody::Benchmark(b) = &self.body {
            for child in &b.children {
                let kind = child.rsplit('.').nth(1).and_then(ResourceKind::from_block_type);
                if !matches!(kind, Some(k) if self.kind.can_contain(k)) {
                    return Err(format!(
                        "benchmark children must be controls or benchmarks, found '{child}'"
                    ));
                }
                if *child == self.full_name {
                    return Err(format!("benchmark '{child}' cannot contain itself"));
                }
            }
        }
        Ok(())
    }

    pub fn params(&self) -> &[ParamDef] {
        match &self.body {
            ResourceBody::Query(q) => &q.params,
            ResourceBody::Control(c) => &c.params,
            _ => &[],
        }
    }
}
