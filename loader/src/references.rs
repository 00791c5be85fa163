// references.rs — Reference collector
//
// Harvests the resource names a block's expressions mention, whether or
// not those expressions can be evaluated yet. Names are `type.name`, or
// `mod.type.name` for references qualified by a mod name.

use indexmap::IndexSet;

use crate::ast::{Block, Expr};
use crate::resource::ResourceKind;

/// Traversal roots that name a referenceable resource type.
const REFERENCE_TYPES: &[&str] = &[
    "query",
    "control",
    "benchmark",
    "report",
    "panel",
    "local",
    "var",
];

/// True for `query`, `local`, `var` and the other reference roots.
pub fn is_reference_type(segment: &str) -> bool {
    REFERENCE_TYPES.contains(&segment)
}

/// Resource names referenced by one expression, in source order.
pub fn references_in_expr(expr: &Expr) -> IndexSet<String> {
    let mut out = IndexSet::new();
    for traversal in expr.variables() {
        let path = traversal.static_path();
        match path.as_slice() {
            [root, name, ..] if is_reference_type(root) => {
                out.insert(format!("{root}.{name}"));
            }
            [mod_name, kind, name, ..] if is_reference_type(kind) => {
                out.insert(format!("{mod_name}.{kind}.{name}"));
            }
            _ => {}
        }
    }
    out
}

/// References of a whole block as decoded into `kind`.
///
/// Queries and controls include their nested `param` blocks. Reports and
/// panels cover their own attributes only; nested children record their
/// own. Variables collect nothing.
pub fn collect_block_references(block: &Block, kind: ResourceKind) -> IndexSet<String> {
    let mut out = IndexSet::new();
    if kind == ResourceKind::Variable {
        return out;
    }
    for attribute in &block.body.attributes {
        out.extend(references_in_expr(&attribute.expr));
    }
    if matches!(kind, ResourceKind::Query | ResourceKind::Control) {
        for param in block.body.blocks.iter().filter(|b| b.kind() == "param") {
            for attribute in &param.body.attributes {
                out.extend(references_in_expr(&attribute.expr));
            }
        }
    }
    out
}
