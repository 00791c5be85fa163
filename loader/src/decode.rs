// decode.rs — Per-block-type decode rules
//
// Turns one decode unit (a block, or one `locals` attribute) into a typed
// resource against the current environment. Each call is idempotent for a
// given environment: it builds a fresh shell and reports deferrals and
// hard errors in a `DecodeResult` instead of failing.
//
// Preconditions: the block passed `schema::validate_block`.
// Postconditions: the returned node is complete iff `result.success()`.
// Failure modes: validation and evaluation problems become diagnostics.
// Side effects: none; attachment and environment updates are the driver's.

use indexmap::IndexMap;

use crate::ast::{Attribute, Block, SourceRange};
use crate::diag::{codes, DiagClass, Diagnostic};
use crate::eval::{evaluate, evaluate_constant, Dependency, EvalContext, Evaluated};
use crate::literal::to_backend_literal;
use crate::references::{collect_block_references, references_in_expr};
use crate::resource::{Args, ParamDef, Resource, ResourceBody, ResourceKind, VariableBody};
use crate::schema::{schema_for, shell_for, BlockSchema, Setter};
use crate::tree::DecodedNode;
use crate::types::TypeConstraint;
use crate::value::Value;

/// Inputs shared by every decode call of one pass.
pub struct DecodeCtx<'a> {
    pub env: &'a EvalContext,
    pub mod_name: &'a str,
    /// Externally supplied variable values.
    pub variables: &'a IndexMap<String, Value>,
}

// ── Result ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct DecodeResult {
    pub depends: Vec<Dependency>,
    pub diags: Vec<Diagnostic>,
}

impl DecodeResult {
    pub fn success(&self) -> bool {
        self.depends.is_empty() && !self.has_errors()
    }

    pub fn has_errors(&self) -> bool {
        self.diags.iter().any(Diagnostic::is_error)
    }

    pub fn is_deferred(&self) -> bool {
        !self.depends.is_empty() && !self.has_errors()
    }

    pub fn error(&mut self, diag: Diagnostic) {
        self.diags.push(diag);
    }

    pub fn merge(&mut self, other: DecodeResult) {
        self.depends.extend(other.depends);
        self.diags.extend(other.diags);
    }

    /// Fold an evaluation outcome in, returning the value if resolved.
    fn handle(&mut self, evaluated: Evaluated) -> Option<Value> {
        match evaluated {
            Evaluated::Resolved(value) => Some(value),
            Evaluated::Deferred(dep) => {
                self.depends.push(dep);
                None
            }
            Evaluated::Failed(diag) => {
                self.diags.push(diag);
                None
            }
        }
    }

    /// All outstanding needs folded into one dependency.
    pub fn dependency(&self) -> Option<Dependency> {
        let first = self.depends.first()?;
        let mut names: Vec<String> = Vec::new();
        for name in self.depends.iter().flat_map(|d| &d.names) {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        let detail = self
            .depends
            .iter()
            .map(|d| d.detail.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        Some(Dependency {
            names,
            range: first.range,
            detail,
        })
    }
}

// ── Entry points ────────────────────────────────────────────────────────────

/// Decode one attribute of a `locals` block.
pub fn decode_local(
    attribute: &Attribute,
    block: &Block,
    ctx: &DecodeCtx<'_>,
) -> (Option<Resource>, DecodeResult) {
    let mut result = DecodeResult::default();
    let range = SourceRange::new(block.range.file, attribute.span);
    let Some(mut local) = Resource::shell(ResourceKind::Local, ctx.mod_name, &attribute.name.name, range)
    else {
        return (None, result);
    };
    local.references = references_in_expr(&attribute.expr);
    if let Some(value) = result.handle(evaluate(&attribute.expr, ctx.env, block.range.file)) {
        local.body = ResourceBody::Local { value };
    }
    (Some(local), result)
}

/// Decode any labelled top-level block except `locals`.
pub fn decode_block(block: &Block, ctx: &DecodeCtx<'_>) -> (Option<DecodedNode>, DecodeResult) {
    let mut result = DecodeResult::default();
    let (Some(schema), Some(mut resource)) = (schema_for(block.kind()), shell_for(block, ctx.mod_name))
    else {
        return (None, result);
    };

    let children = match resource.kind {
        ResourceKind::Variable => {
            decode_variable(block, schema, &mut resource, ctx, &mut result);
            Vec::new()
        }
        ResourceKind::Query => {
            decode_query(block, schema, &mut resource, ctx, &mut result);
            Vec::new()
        }
        ResourceKind::Control => {
            decode_control(block, schema, &mut resource, ctx, &mut result);
            Vec::new()
        }
        ResourceKind::Panel | ResourceKind::Report => {
            decode_container(block, schema, &mut resource, ctx, &mut result)
        }
        _ => {
            decode_generic(block, schema, &mut resource, ctx, &mut result);
            Vec::new()
        }
    };

    // References are recorded whatever the outcome.
    resource.references = collect_block_references(block, resource.kind);
    (Some(DecodedNode { resource, children }), result)
}

// ── Generic property loop ───────────────────────────────────────────────────

/// Evaluate every schema attribute with a field setter, except `skip`.
fn decode_properties(
    block: &Block,
    schema: &BlockSchema,
    resource: &mut Resource,
    ctx: &DecodeCtx<'_>,
    result: &mut DecodeResult,
    skip: &[&str],
) {
    let file = block.range.file;
    for attribute in &block.body.attributes {
        let name = attribute.name.name.as_str();
        if skip.contains(&name) {
            continue;
        }
        let Some(Setter::Field(set)) = schema.attribute(name).map(|a| a.setter) else {
            continue;
        };
        let Some(value) = result.handle(evaluate(&attribute.expr, ctx.env, file)) else {
            continue;
        };
        if let Err(err) = set(resource, value) {
            result.error(
                Diagnostic::error(DiagClass::Evaluation, "Incorrect attribute value type")
                    .with_code(codes::E0110)
                    .with_detail(format!("Inappropriate value for attribute \"{name}\": {err}."))
                    .with_subject(SourceRange::new(file, attribute.expr.span)),
            );
        }
    }
}

/// Generic resource types: schema-driven properties plus the post-decode hook.
fn decode_generic(
    block: &Block,
    schema: &BlockSchema,
    resource: &mut Resource,
    ctx: &DecodeCtx<'_>,
    result: &mut DecodeResult,
) {
    decode_properties(block, schema, resource, ctx, result, &[]);
    if !result.success() {
        return;
    }
    if let Err(detail) = resource.on_decoded() {
        result.error(
            Diagnostic::error(DiagClass::Validation, format!("{} is invalid", resource.full_name))
                .with_code(codes::E0205)
                .with_detail(detail)
                .with_subject(block.def_range()),
        );
    }
}

// ── Mod ─────────────────────────────────────────────────────────────────────

/// Decode a `mod` block's properties into a fresh copy of the root.
pub fn decode_mod_block(block: &Block, root: &Resource, ctx: &DecodeCtx<'_>) -> (Resource, DecodeResult) {
    let mut result = DecodeResult::default();
    let mut resource = root.clone();
    if let Some(schema) = schema_for("mod") {
        decode_properties(block, schema, &mut resource, ctx, &mut result, &[]);
    }
    resource.references = collect_block_references(block, ResourceKind::Mod);
    (resource, result)
}

// ── Variable ────────────────────────────────────────────────────────────────

fn decode_variable(
    block: &Block,
    schema: &BlockSchema,
    resource: &mut Resource,
    ctx: &DecodeCtx<'_>,
    result: &mut DecodeResult,
) {
    let file = block.range.file;
    let name = resource.short_name.clone();

    let type_constraint = match block.body.attribute("type") {
        Some(attr) => match TypeConstraint::from_expr(&attr.expr) {
            Ok(tc) => tc,
            Err(detail) => {
                result.error(
                    Diagnostic::error(DiagClass::Validation, "Invalid type specification")
                        .with_code(codes::E0111)
                        .with_detail(detail)
                        .with_subject(SourceRange::new(file, attr.expr.span)),
                );
                return;
            }
        },
        None => TypeConstraint::Any,
    };

    let mut default = None;
    for attribute in &block.body.attributes {
        let Some(attr_schema) = schema.attribute(&attribute.name.name) else {
            continue;
        };
        if attr_schema.name == "type" {
            continue;
        }
        match evaluate_constant(&attribute.expr) {
            Ok(value) if attr_schema.name == "default" => default = Some(value),
            Ok(value) => {
                if let Setter::Field(set) = attr_schema.setter {
                    if let Err(err) = set(resource, value) {
                        result.error(
                            Diagnostic::error(DiagClass::Evaluation, "Incorrect attribute value type")
                                .with_code(codes::E0110)
                                .with_detail(format!(
                                    "Inappropriate value for attribute \"{}\": {err}.",
                                    attr_schema.name
                                ))
                                .with_subject(SourceRange::new(file, attribute.expr.span)),
                        );
                    }
                }
            }
            Err(err) => result.error(err.to_diagnostic(file)),
        }
    }
    if result.has_errors() {
        return;
    }

    let Some(raw) = ctx.variables.get(&name).cloned().or_else(|| default.clone()) else {
        result.error(
            Diagnostic::error(DiagClass::Validation, "No value for required variable")
                .with_code(codes::E0111)
                .with_detail(format!(
                    "The input variable \"{name}\" is not set, and has no default value."
                ))
                .with_subject(block.def_range()),
        );
        return;
    };

    match type_constraint.conform(raw) {
        Ok(value) => {
            resource.body = ResourceBody::Variable(VariableBody {
                type_constraint,
                default,
                value,
            });
        }
        Err(detail) => result.error(
            Diagnostic::error(DiagClass::Validation, "Invalid value for input variable")
                .with_code(codes::E0111)
                .with_detail(format!("The value for variable \"{name}\" is not valid: {detail}."))
                .with_subject(block.def_range()),
        ),
    }
}

// ── Query ───────────────────────────────────────────────────────────────────

fn decode_query(
    block: &Block,
    schema: &BlockSchema,
    resource: &mut Resource,
    ctx: &DecodeCtx<'_>,
    result: &mut DecodeResult,
) {
    decode_properties(block, schema, resource, ctx, result, &[]);
    let params = decode_params(block, &resource.full_name, ctx, result);
    if let ResourceBody::Query(body) = &mut resource.body {
        body.params = params;
    }
}

fn decode_params(
    block: &Block,
    parent_name: &str,
    ctx: &DecodeCtx<'_>,
    result: &mut DecodeResult,
) -> Vec<ParamDef> {
    block
        .body
        .blocks
        .iter()
        .filter(|b| b.kind() == "param")
        .filter_map(|b| decode_param(b, parent_name, ctx, result))
        .collect()
}

fn decode_param(
    block: &Block,
    parent_name: &str,
    ctx: &DecodeCtx<'_>,
    result: &mut DecodeResult,
) -> Option<ParamDef> {
    let file = block.range.file;
    let mut param = ParamDef {
        name: block.short_name()?.to_string(),
        description: None,
        default: None,
    };
    let mut complete = true;

    if let Some(attr) = block.body.attribute("description") {
        match result.handle(evaluate(&attr.expr, ctx.env, file)) {
            Some(value) => match value.into_string() {
                Ok(s) => param.description = Some(s),
                Err(err) => {
                    result.error(invalid_param_config(parent_name, err.to_string(), block));
                    complete = false;
                }
            },
            None => complete = false,
        }
    }

    if let Some(attr) = block.body.attribute("default") {
        match result.handle(evaluate(&attr.expr, ctx.env, file)) {
            Some(value) => match to_backend_literal(&value) {
                Ok(literal) => param.default = Some(literal),
                Err(err) => {
                    result.error(invalid_param_config(parent_name, err.to_string(), block));
                    complete = false;
                }
            },
            None => complete = false,
        }
    }

    complete.then_some(param)
}

fn invalid_param_config(parent_name: &str, detail: String, block: &Block) -> Diagnostic {
    Diagnostic::error(
        DiagClass::Validation,
        format!("{parent_name} has invalid parameter config"),
    )
    .with_code(codes::E0204)
    .with_detail(detail)
    .with_subject(block.def_range())
}

// ── Control ─────────────────────────────────────────────────────────────────

fn decode_control(
    block: &Block,
    schema: &BlockSchema,
    resource: &mut Resource,
    ctx: &DecodeCtx<'_>,
    result: &mut DecodeResult,
) {
    let file = block.range.file;
    let full_name = resource.full_name.clone();
    let has_sql = block.body.has_attribute("sql");
    let has_query = block.body.has_attribute("query");

    // Presence-based so the outcome is the same in every pass.
    let skip: &[&str] = if has_sql && has_query {
        result.error(
            Diagnostic::error(
                DiagClass::Validation,
                format!("{full_name} has both 'SQL' and 'query' property set - only 1 of these may be set"),
            )
            .with_code(codes::E0200)
            .with_subject(block.def_range()),
        );
        &["sql", "query"]
    } else {
        &[]
    };
    decode_properties(block, schema, resource, ctx, result, skip);

    let args = match block.body.attribute("args") {
        Some(attr) => decode_args(attr, &full_name, file, ctx, result),
        None => None,
    };

    let mut params = Vec::new();
    for param_block in block.body.blocks.iter().filter(|b| b.kind() == "param") {
        if has_query {
            result.error(
                Diagnostic::error(
                    DiagClass::Validation,
                    format!("{full_name} has 'query' property set so cannot define param blocks"),
                )
                .with_code(codes::E0201)
                .with_subject(param_block.def_range()),
            );
            continue;
        }
        if let Some(param) = decode_param(param_block, &full_name, ctx, result) {
            params.push(param);
        }
    }

    if !has_sql && !has_query {
        result.error(
            Diagnostic::error(
                DiagClass::Validation,
                format!("{full_name} must define either a 'sql' property or a 'query' property"),
            )
            .with_code(codes::E0202)
            .with_subject(block.def_range()),
        );
    }

    if let ResourceBody::Control(body) = &mut resource.body {
        body.args = args;
        body.params = params;
    }
}

fn decode_args(
    attr: &Attribute,
    control_name: &str,
    file: crate::ast::FileId,
    ctx: &DecodeCtx<'_>,
    result: &mut DecodeResult,
) -> Option<Args> {
    let value = result.handle(evaluate(&attr.expr, ctx.env, file))?;
    let subject = SourceRange::new(file, attr.expr.span);
    let literal_error = |err: crate::literal::LiteralError| {
        Diagnostic::error(
            DiagClass::Validation,
            format!("{control_name} has invalid parameter config"),
        )
        .with_code(codes::E0204)
        .with_detail(err.to_string())
        .with_subject(subject)
    };

    match value {
        Value::Object(map) => {
            let mut named = IndexMap::with_capacity(map.len());
            for (key, v) in &map {
                match to_backend_literal(v) {
                    Ok(literal) => {
                        named.insert(key.clone(), literal);
                    }
                    Err(err) => {
                        result.error(literal_error(err));
                        return None;
                    }
                }
            }
            Some(Args::Named(named))
        }
        Value::Tuple(items) => match items.iter().map(to_backend_literal).collect::<Result<Vec<_>, _>>() {
            Ok(list) => Some(Args::Positional(list)),
            Err(err) => {
                result.error(literal_error(err));
                None
            }
        },
        other => {
            result.error(
                Diagnostic::error(DiagClass::Validation, format!("{control_name} has invalid args"))
                    .with_code(codes::E0203)
                    .with_detail(format!(
                        "'args' must be an object or a tuple, found {}",
                        other.type_name()
                    ))
                    .with_subject(subject),
            );
            None
        }
    }
}

// ── Report / Panel ──────────────────────────────────────────────────────────

/// Properties, then nested panels/reports decoded recursively. A nested
/// child that does not fully succeed makes the container fail or defer
/// with it; the child is never retried on its own.
fn decode_container(
    block: &Block,
    schema: &BlockSchema,
    resource: &mut Resource,
    ctx: &DecodeCtx<'_>,
    result: &mut DecodeResult,
) -> Vec<DecodedNode> {
    decode_properties(block, schema, resource, ctx, result, &[]);

    let mut children = Vec::new();
    for nested in &block.body.blocks {
        let (node, nested_result) = decode_block(nested, ctx);
        let ok = nested_result.success();
        result.merge(nested_result);
        if let (true, Some(node)) = (ok, node) {
            children.push(node);
        }
    }
    children
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

    fn run(src: &str, env: &EvalContext) -> (DecodedNode, DecodeResult) {
        let vars = IndexMap::new();
        let ctx = DecodeCtx {
            env,
            mod_name: "m",
            variables: &vars,
        };
        let (node, result) = decode_block(&block(src), &ctx);
        (node.unwrap(), result)
    }

    fn env_with_query() -> EvalContext {
        let mut env = EvalContext::new();
        let q = Resource::shell(
            ResourceKind::Query,
            "m",
            "q1",
            SourceRange::new(FileId(0), (0..1).into()),
        )
        .unwrap();
        env.insert("query", "q1", q.to_value());
        env
    }

    fn summaries(result: &DecodeResult) -> Vec<String> {
        result.diags.iter().map(|d| d.summary.clone()).collect()
    }

    #[test]
    fn query_with_params() {
        let (node, result) = run(
            "query \"q\" {\n  sql = \"select $1\"\n  param \"p\" {\n    default = [\"a\", 1]\n  }\n}",
            &EvalContext::new(),
        );
        assert!(result.success());
        let params = node.resource.params();
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].default.as_deref(), Some("array['a',1]"));
    }

    #[test]
    fn query_param_unsupported_default() {
        let (node, result) = run(
            "query \"q\" {\n  sql = \"x\"\n  param \"p\" {\n    default = { a = 1 }\n  }\n}",
            &EvalContext::new(),
        );
        assert_eq!(summaries(&result), vec!["m.query.q has invalid parameter config"]);
        assert_eq!(result.diags[0].detail.as_deref(), Some("unsupported type 'object'"));
        assert!(node.resource.params().is_empty());
    }

    #[test]
    fn control_sql_and_query_conflict() {
        let (node, result) = run(
            "control \"c\" {\n  sql = \"select 1\"\n  query = query.q1\n}",
            &env_with_query(),
        );
        assert_eq!(
            summaries(&result),
            vec!["m.control.c has both 'SQL' and 'query' property set - only 1 of these may be set"]
        );
        let ResourceBody::Control(body) = &node.resource.body else {
            panic!("expected control")
        };
        assert!(body.sql.is_none());
        assert!(body.query.is_none());
    }

    #[test]
    fn control_query_reference_resolves_to_name() {
        let (node, result) = run("control \"c\" {\n  query = query.q1\n}", &env_with_query());
        assert!(result.success(), "{:?}", result.diags);
        let ResourceBody::Control(body) = &node.resource.body else {
            panic!("expected control")
        };
        assert_eq!(body.query.as_deref(), Some("m.query.q1"));
    }

    #[test]
    fn control_param_with_query_rejected() {
        let (node, result) = run(
            "control \"c\" {\n  query = query.q1\n  param \"p\" {\n    default = 1\n  }\n}",
            &env_with_query(),
        );
        assert_eq!(
            summaries(&result),
            vec!["m.control.c has 'query' property set so cannot define param blocks"]
        );
        assert!(node.resource.params().is_empty());
    }

    #[test]
    fn control_needs_sql_or_query() {
        let (_, result) = run("control \"c\" {\n  title = \"C\"\n}", &EvalContext::new());
        assert_eq!(
            summaries(&result),
            vec!["m.control.c must define either a 'sql' property or a 'query' property"]
        );
    }

    #[test]
    fn control_args_shapes() {
        let env = EvalContext::new();
        let (node, result) = run("control \"c\" {\n  sql = \"x\"\n  args = { a = 1, b = \"x\" }\n}", &env);
        assert!(result.success());
        let ResourceBody::Control(body) = &node.resource.body else {
            panic!("expected control")
        };
        let Some(Args::Named(named)) = &body.args else {
            panic!("expected named args")
        };
        assert_eq!(named.len(), 2);
        assert_eq!(named["b"], "'x'");

        let (node, _) = run("control \"c\" {\n  sql = \"x\"\n  args = [1, \"x\"]\n}", &env);
        let ResourceBody::Control(body) = &node.resource.body else {
            panic!("expected control")
        };
        assert_eq!(
            body.args,
            Some(Args::Positional(vec!["1".into(), "'x'".into()]))
        );

        let (_, result) = run("control \"c\" {\n  sql = \"x\"\n  args = 5\n}", &env);
        assert_eq!(summaries(&result), vec!["m.control.c has invalid args"]);
    }

    #[test]
    fn control_defers_on_missing_query() {
        let (node, result) = run(
            "control \"c\" {\n  sql = query.q1.sql\n  args = [var.v1]\n}",
            &EvalContext::new(),
        );
        assert!(result.is_deferred());
        let dep = result.dependency().unwrap();
        assert_eq!(dep.names, vec!["query.q1.sql", "var.v1"]);
        let refs: Vec<_> = node.resource.references.iter().cloned().collect();
        assert_eq!(refs, vec!["query.q1", "var.v1"]);
    }

    #[test]
    fn incorrect_value_type() {
        let (_, result) = run("query \"q\" {\n  sql = [1]\n}", &EvalContext::new());
        assert_eq!(summaries(&result), vec!["Incorrect attribute value type"]);
    }

    #[test]
    fn report_attaches_successful_children() {
        let (node, result) = run(
            "report \"r\" {\n  title = \"R\"\n  panel \"p\" {\n    text = \"hi\"\n  }\n}",
            &EvalContext::new(),
        );
        assert!(result.success());
        assert_eq!(node.children.len(), 1);
        assert_eq!(node.children[0].resource.full_name, "m.panel.p");
    }

    #[test]
    fn report_defers_with_deferred_child() {
        let (node, result) = run(
            "report \"r\" {\n  panel \"p\" {\n    text = local.greeting\n  }\n}",
            &EvalContext::new(),
        );
        assert!(result.is_deferred());
        assert!(node.children.is_empty());
        assert_eq!(result.dependency().unwrap().names, vec!["local.greeting"]);
    }

    #[test]
    fn benchmark_hook_runs_after_decode() {
        let env = env_with_query();
        let (_, result) = run("benchmark \"b\" {\n  children = [query.q1]\n}", &env);
        assert_eq!(summaries(&result), vec!["m.benchmark.b is invalid"]);
    }

    #[test]
    fn variable_prefers_injected_value() {
        let mut vars = IndexMap::new();
        vars.insert("region".to_string(), Value::from(7.0));
        let env = EvalContext::new();
        let ctx = DecodeCtx {
            env: &env,
            mod_name: "m",
            variables: &vars,
        };
        let b = block("variable \"region\" {\n  type = string\n  default = \"us\"\n}");
        let (node, result) = decode_block(&b, &ctx);
        assert!(result.success());
        let ResourceBody::Variable(v) = &node.unwrap().resource.body else {
            panic!("expected variable")
        };
        assert_eq!(v.value, Value::from("7"));
        assert_eq!(v.default, Some(Value::from("us")));
    }

    #[test]
    fn variable_without_value_is_error() {
        let (_, result) = run("variable \"v\" {\n  type = number\n}", &EvalContext::new());
        assert_eq!(summaries(&result), vec!["No value for required variable"]);
    }

    #[test]
    fn variable_default_cannot_reference() {
        let (_, result) = run("variable \"v\" {\n  default = var.other\n}", &EvalContext::new());
        assert_eq!(summaries(&result), vec!["Variables not allowed"]);
        assert!(result.depends.is_empty());
    }

    #[test]
    fn local_decodes_single_attribute() {
        let b = block("locals {\n  a = 1\n  b = local.a\n}");
        let env = EvalContext::new();
        let vars = IndexMap::new();
        let ctx = DecodeCtx {
            env: &env,
            mod_name: "m",
            variables: &vars,
        };
        let (local, result) = decode_local(&b.body.attributes[0], &b, &ctx);
        assert!(result.success());
        assert_eq!(local.unwrap().full_name, "m.local.a");
        let (_, result) = decode_local(&b.body.attributes[1], &b, &ctx);
        assert!(result.is_deferred());
    }
}
