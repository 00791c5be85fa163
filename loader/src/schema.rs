// schema.rs — Block schema registry and resource factory
//
// Maps a block type name to the labels, attributes and nested block types
// it accepts. Each attribute names the setter that moves its evaluated
// value into the resource, so the generic decode loop is table-driven.
//
// Preconditions: none.
// Postconditions: `validate_block` reports every structural problem of a
//   block (and its nested blocks) without evaluating anything.
// Failure modes: none; unknown block types yield `None`.
// Side effects: none.

use std::collections::HashSet;

use crate::ast::{Block, SourceRange};
use crate::diag::{codes, DiagClass, Diagnostic};
use crate::resource::{Resource, ResourceBody, ResourceKind};
use crate::value::{Value, ValueError};

// ── Schema types ────────────────────────────────────────────────────────────

pub type FieldSetter = fn(&mut Resource, Value) -> Result<(), ValueError>;

#[derive(Clone, Copy)]
pub enum Setter {
    /// Generic path: convert and store.
    Field(FieldSetter),
    /// Decoded by type-specific rules (`args`, variable `type`, ...).
    Custom,
}

/// Expected shape of an attribute's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Number,
    StringMap,
    ResourceRef,
    ResourceRefList,
    Any,
}

pub struct AttrSchema {
    pub name: &'static str,
    pub required: bool,
    pub kind: ValueKind,
    pub setter: Setter,
}

pub struct BlockSchema {
    pub block_type: &'static str,
    pub kind: ResourceKind,
    /// Label names; empty for unlabelled blocks.
    pub labels: &'static [&'static str],
    pub attributes: &'static [AttrSchema],
    pub nested: &'static [&'static str],
    /// Any attribute name is accepted (`locals`).
    pub any_attributes: bool,
}

impl BlockSchema {
    pub fn attribute(&self, name: &str) -> Option<&'static AttrSchema> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn required_attrs(&self) -> impl Iterator<Item = &'static str> {
        self.attributes.iter().filter(|a| a.required).map(|a| a.name)
    }

    pub fn optional_attrs(&self) -> impl Iterator<Item = &'static str> {
        self.attributes.iter().filter(|a| !a.required).map(|a| a.name)
    }

    pub fn allows_nested(&self, block_type: &str) -> bool {
        self.nested.contains(&block_type)
    }
}

// ── Setters ─────────────────────────────────────────────────────────────────

macro_rules! prop_setter {
    ($fn_name:ident, $field:ident) => {
        fn $fn_name(r: &mut Resource, v: Value) -> Result<(), ValueError> {
            r.props.$field = Some(v.into_string()?);
            Ok(())
        }
    };
}

macro_rules! body_setter {
    ($fn_name:ident, $variant:ident, $field:ident, $conv:ident) => {
        fn $fn_name(r: &mut Resource, v: Value) -> Result<(), ValueError> {
            if let ResourceBody::$variant(body) = &mut r.body {
                body.$field = Some(v.$conv()?);
            }
            Ok(())
        }
    };
}

prop_setter!(set_title, title);
prop_setter!(set_description, description);
prop_setter!(set_documentation, documentation);

fn set_tags(r: &mut Resource, v: Value) -> Result<(), ValueError> {
    r.props.tags = v.into_string_map()?;
    Ok(())
}

body_setter!(set_query_sql, Query, sql, into_string);
body_setter!(set_query_search_path, Query, search_path, into_string);
body_setter!(set_query_search_path_prefix, Query, search_path_prefix, into_string);

body_setter!(set_control_sql, Control, sql, into_string);
body_setter!(set_control_query, Control, query, into_resource_name);
body_setter!(set_control_search_path, Control, search_path, into_string);
body_setter!(set_control_search_path_prefix, Control, search_path_prefix, into_string);
body_setter!(set_control_severity, Control, severity, into_string);

body_setter!(set_panel_type, Panel, panel_type, into_string);
body_setter!(set_panel_width, Panel, width, into_number);
body_setter!(set_panel_height, Panel, height, into_number);
body_setter!(set_panel_source, Panel, source, into_string);
body_setter!(set_panel_text, Panel, text, into_string);
body_setter!(set_panel_sql, Panel, sql, into_string);

fn set_benchmark_children(r: &mut Resource, v: Value) -> Result<(), ValueError> {
    if let ResourceBody::Benchmark(body) = &mut r.body {
        body.children = v.into_resource_names()?;
    }
    Ok(())
}

const fn attr(name: &'static str, kind: ValueKind, setter: FieldSetter) -> AttrSchema {
    AttrSchema {
        name,
        required: false,
        kind,
        setter: Setter::Field(setter),
    }
}

const fn custom(name: &'static str, kind: ValueKind) -> AttrSchema {
    AttrSchema {
        name,
        required: false,
        kind,
        setter: Setter::Custom,
    }
}

const fn required(mut schema: AttrSchema) -> AttrSchema {
    schema.required = true;
    schema
}

// ── Tables ──────────────────────────────────────────────────────────────────

const NAME_LABEL: &[&str] = &["name"];

const MOD_ATTRS: &[AttrSchema] = &[
    attr("title", ValueKind::String, set_title),
    attr("description", ValueKind::String, set_description),
    attr("documentation", ValueKind::String, set_documentation),
    attr("tags", ValueKind::StringMap, set_tags),
];

const VARIABLE_ATTRS: &[AttrSchema] = &[
    custom("type", ValueKind::Any),
    custom("default", ValueKind::Any),
    attr("description", ValueKind::String, set_description),
];

const QUERY_ATTRS: &[AttrSchema] = &[
    attr("description", ValueKind::String, set_description),
    attr("documentation", ValueKind::String, set_documentation),
    attr("search_path", ValueKind::String, set_query_search_path),
    attr("search_path_prefix", ValueKind::String, set_query_search_path_prefix),
    attr("sql", ValueKind::String, set_query_sql),
    attr("tags", ValueKind::StringMap, set_tags),
    attr("title", ValueKind::String, set_title),
];

const CONTROL_ATTRS: &[AttrSchema] = &[
    attr("description", ValueKind::String, set_description),
    attr("documentation", ValueKind::String, set_documentation),
    attr("search_path", ValueKind::String, set_control_search_path),
    attr("search_path_prefix", ValueKind::String, set_control_search_path_prefix),
    attr("sql", ValueKind::String, set_control_sql),
    attr("tags", ValueKind::StringMap, set_tags),
    attr("title", ValueKind::String, set_title),
    attr("severity", ValueKind::String, set_control_severity),
    attr("query", ValueKind::ResourceRef, set_control_query),
    custom("args", ValueKind::Any),
];

const PARAM_ATTRS: &[AttrSchema] = &[
    custom("description", ValueKind::String),
    custom("default", ValueKind::Any),
];

const PANEL_ATTRS: &[AttrSchema] = &[
    attr("title", ValueKind::String, set_title),
    attr("type", ValueKind::String, set_panel_type),
    attr("width", ValueKind::Number, set_panel_width),
    attr("height", ValueKind::Number, set_panel_height),
    attr("source", ValueKind::String, set_panel_source),
    attr("text", ValueKind::String, set_panel_text),
    attr("sql", ValueKind::String, set_panel_sql),
];

const REPORT_ATTRS: &[AttrSchema] = &[attr("title", ValueKind::String, set_title)];

const BENCHMARK_ATTRS: &[AttrSchema] = &[
    attr("title", ValueKind::String, set_title),
    attr("description", ValueKind::String, set_description),
    attr("documentation", ValueKind::String, set_documentation),
    attr("tags", ValueKind::StringMap, set_tags),
    required(attr(
        "children",
        ValueKind::ResourceRefList,
        set_benchmark_children,
    )),
];

static SCHEMAS: &[BlockSchema] = &[
    BlockSchema {
        block_type: "mod",
        kind: ResourceKind::Mod,
        labels: NAME_LABEL,
        attributes: MOD_ATTRS,
        nested: &[],
        any_attributes: false,
    },
    BlockSchema {
        block_type: "locals",
        kind: ResourceKind::Local,
        labels: &[],
        attributes: &[],
        nested: &[],
        any_attributes: true,
    },
    BlockSchema {
        block_type: "variable",
        kind: ResourceKind::Variable,
        labels: NAME_LABEL,
        attributes: VARIABLE_ATTRS,
        nested: &[],
        any_attributes: false,
    },
    BlockSchema {
        block_type: "query",
        kind: ResourceKind::Query,
        labels: NAME_LABEL,
        attributes: QUERY_ATTRS,
        nested: &["param"],
        any_attributes: false,
    },
    BlockSchema {
        block_type: "control",
        kind: ResourceKind::Control,
        labels: NAME_LABEL,
        attributes: CONTROL_ATTRS,
        nested: &["param"],
        any_attributes: false,
    },
    BlockSchema {
        block_type: "param",
        kind: ResourceKind::Param,
        labels: NAME_LABEL,
        attributes: PARAM_ATTRS,
        nested: &[],
        any_attributes: false,
    },
    BlockSchema {
        block_type: "panel",
        kind: ResourceKind::Panel,
        labels: NAME_LABEL,
        attributes: PANEL_ATTRS,
        nested: &["panel", "report"],
        any_attributes: false,
    },
    BlockSchema {
        block_type: "report",
        kind: ResourceKind::Report,
        labels: NAME_LABEL,
        attributes: REPORT_ATTRS,
        nested: &["panel", "report"],
        any_attributes: false,
    },
    BlockSchema {
        block_type: "benchmark",
        kind: ResourceKind::Benchmark,
        labels: NAME_LABEL,
        attributes: BENCHMARK_ATTRS,
        nested: &[],
        any_attributes: false,
    },
];

// ── Lookup & factory ────────────────────────────────────────────────────────

pub fn schema_for(block_type: &str) -> Option<&'static BlockSchema> {
    SCHEMAS.iter().find(|s| s.block_type == block_type)
}

/// Empty resource shell for a labelled block. `None` for unknown types,
/// unlabelled blocks, and params (which live inside their parent).
pub fn shell_for(block: &Block, mod_name: &str) -> Option<Resource> {
    let schema = schema_for(block.kind())?;
    let short_name = block.short_name()?;
    Resource::shell(schema.kind, mod_name, short_name, block.range)
}

// ── Validation ──────────────────────────────────────────────────────────────

const BAD_IDENTIFIER_DETAIL: &str = "A name must start with a letter or underscore and may contain only letters, digits, underscores, and dashes.";

pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Structural checks for a block of a known type and all of its nested
/// blocks. Nothing is evaluated.
pub fn validate_block(block: &Block, schema: &BlockSchema) -> Vec<Diagnostic> {
    let mut diags = Vec::new();
    validate_into(block, schema, &mut diags);
    diags
}

fn validate_into(block: &Block, schema: &BlockSchema, diags: &mut Vec<Diagnostic>) {
    let file = block.range.file;

    // ── Labels ──
    if block.labels.len() < schema.labels.len() {
        diags.push(
            Diagnostic::error(DiagClass::Validation, "Missing name")
                .with_code(codes::E0002)
                .with_detail(format!(
                    "All \"{}\" blocks must have {} label(s): {}.",
                    block.kind(),
                    schema.labels.len(),
                    schema.labels.join(", ")
                ))
                .with_subject(block.def_range()),
        );
    } else if let Some(extra) = block.labels.get(schema.labels.len()) {
        diags.push(
            Diagnostic::error(DiagClass::Validation, "Extraneous label")
                .with_code(codes::E0006)
                .with_detail(format!(
                    "\"{}\" blocks take {} label(s); \"{}\" is not expected.",
                    block.kind(),
                    schema.labels.len(),
                    extra.value
                ))
                .with_subject(SourceRange::new(file, extra.span)),
        );
    }

    if !schema.labels.is_empty() {
        if let Some(label) = block.labels.first() {
            if !is_valid_name(&label.value) {
                diags.push(invalid_name(SourceRange::new(file, label.span)));
            }
        }
    }

    // ── Attributes ──
    let mut seen = HashSet::new();
    for attribute in &block.body.attributes {
        let name = &attribute.name.name;
        let subject = SourceRange::new(file, attribute.name.span);
        if !seen.insert(name.as_str()) {
            diags.push(
                Diagnostic::error(DiagClass::Validation, "Attribute redefined")
                    .with_code(codes::E0007)
                    .with_detail(format!(
                        "The argument \"{name}\" was already set in this block."
                    ))
                    .with_subject(subject),
            );
            continue;
        }
        if schema.any_attributes {
            if !is_valid_name(name) {
                diags.push(invalid_name(subject));
            }
        } else if schema.attribute(name).is_none() {
            diags.push(
                Diagnostic::error(DiagClass::Validation, "Unsupported argument")
                    .with_code(codes::E0003)
                    .with_detail(format!("An argument named \"{name}\" is not expected here."))
                    .with_subject(subject),
            );
        }
    }

    for name in schema.required_attrs() {
        if !block.body.has_attribute(name) {
            diags.push(
                Diagnostic::error(DiagClass::Validation, "Missing required argument")
                    .with_code(codes::E0004)
                    .with_detail(format!(
                        "The argument \"{name}\" is required, but no definition was found."
                    ))
                    .with_subject(block.def_range()),
            );
        }
    }

    // ── Nested blocks ──
    for nested in &block.body.blocks {
        let nested_schema = if schema.allows_nested(nested.kind()) {
            schema_for(nested.kind())
        } else {
            None
        };
        match nested_schema {
            Some(nested_schema) => validate_into(nested, nested_schema, diags),
            None => diags.push(
                Diagnostic::error(DiagClass::Validation, "Unsupported block type")
                    .with_code(codes::E0005)
                    .with_detail(format!(
                        "Blocks of type \"{}\" are not expected here.",
                        nested.kind()
                    ))
                    .with_subject(nested.def_range()),
            ),
        }
    }
}

fn invalid_name(subject: SourceRange) -> Diagnostic {
    Diagnostic::error(DiagClass::Validation, "Invalid name")
        .with_code(codes::E0001)
        .with_detail(BAD_IDENTIFIER_DETAIL)
        .with_subject(subject)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::FileId;
    use crate::parser::parse;

    fn block(src: &str) -> Block {
        let result = parse(src, FileId(0));
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        result.blocks.unwrap().remove(0)
    }

    fn summaries(src: &str) -> Vec<String> {
        let b = block(src);
        let schema = schema_for(b.kind()).unwrap();
        validate_block(&b, schema)
            .into_iter()
            .map(|d| d.summary)
            .collect()
    }

    #[test]
    fn lookup_known_and_unknown() {
        assert_eq!(schema_for("control").unwrap().kind, ResourceKind::Control);
        assert!(schema_for("dashboard").is_none());
    }

    #[test]
    fn query_attribute_sets() {
        let q = schema_for("query").unwrap();
        let optional: Vec<_> = q.optional_attrs().collect();
        assert_eq!(
            optional,
            vec![
                "description",
                "documentation",
                "search_path",
                "search_path_prefix",
                "sql",
                "tags",
                "title"
            ]
        );
        assert_eq!(q.required_attrs().count(), 0);
        assert!(q.allows_nested("param"));
    }

    #[test]
    fn control_extends_query_attributes() {
        let c = schema_for("control").unwrap();
        for name in schema_for("query").unwrap().optional_attrs() {
            assert!(c.attribute(name).is_some(), "control lacks {name}");
        }
        for name in ["severity", "query", "args"] {
            assert!(c.attribute(name).is_some());
        }
    }

    #[test]
    fn name_validation() {
        assert!(is_valid_name("my_query-1"));
        assert!(is_valid_name("_x"));
        assert!(!is_valid_name("1abc"));
        assert!(!is_valid_name("has space"));
        assert!(!is_valid_name(""));
    }

    #[test]
    fn valid_block_has_no_diagnostics() {
        assert!(summaries("query \"q1\" {\n  sql = \"select 1\"\n  param \"p\" {\n    default = 1\n  }\n}").is_empty());
    }

    #[test]
    fn missing_and_invalid_name() {
        assert_eq!(summaries("query {\n}"), vec!["Missing name"]);
        assert_eq!(summaries("query \"9q\" {\n}"), vec!["Invalid name"]);
    }

    #[test]
    fn invalid_name_detail_is_fixed() {
        let b = block("control \"bad name\" {\n}");
        let diags = validate_block(&b, schema_for("control").unwrap());
        assert_eq!(diags[0].detail.as_deref(), Some(BAD_IDENTIFIER_DETAIL));
    }

    #[test]
    fn unsupported_argument_and_block() {
        let s = summaries("query \"q\" {\n  colour = \"red\"\n  panel \"p\" {\n  }\n}");
        assert_eq!(s, vec!["Unsupported argument", "Unsupported block type"]);
    }

    #[test]
    fn nested_blocks_are_validated() {
        let s = summaries("report \"r\" {\n  panel \"p\" {\n    bogus = 1\n  }\n}");
        assert_eq!(s, vec!["Unsupported argument"]);
    }

    #[test]
    fn missing_required_argument() {
        assert_eq!(
            summaries("benchmark \"b\" {\n  title = \"B\"\n}"),
            vec!["Missing required argument"]
        );
    }

    #[test]
    fn repeated_attribute_is_rejected() {
        let b = block("control \"c\" {\n  sql = \"select 1\"\n  sql = \"select 2\"\n}");
        let diags = validate_block(&b, schema_for("control").unwrap());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].summary, "Attribute redefined");
        assert_eq!(diags[0].code, Some(codes::E0007));
        assert!(diags[0].is_error());
        // Points at the second definition.
        assert_eq!(diags[0].subject.map(|r| r.span.start), Some(b.body.attributes[1].name.span.start));
    }

    #[test]
    fn repeated_local_is_rejected() {
        assert_eq!(
            summaries("locals {\n  x = 1\n  x = 2\n}"),
            vec!["Attribute redefined"]
        );
    }

    #[test]
    fn locals_accept_any_attribute() {
        assert!(summaries("locals {\n  anything = 1\n  other = 2\n}").is_empty());
    }

    #[test]
    fn extraneous_label() {
        assert_eq!(summaries("query \"a\" \"b\" {\n}"), vec!["Extraneous label"]);
    }

    #[test]
    fn shell_carries_names() {
        let b = block("control \"c1\" {\n}");
        let shell = shell_for(&b, "aws").unwrap();
        assert_eq!(shell.full_name, "aws.control.c1");
        assert_eq!(shell.decl_range, b.range);
    }
}
