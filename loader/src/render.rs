// render.rs — Presentation of load results
//
// Human-readable diagnostics, the indented resource tree, and the JSON
// report emitted by `--emit json`.
//
// Preconditions: `sources` is the map the result was loaded from.
// Postconditions: output is deterministic for a given load.
// Failure modes: JSON serialization errors are returned to the caller.
// Side effects: none.

use std::fmt::Write as _;

use serde::Serialize;

use crate::diag::Diagnostic;
use crate::driver::{LoadResult, LoadStatus};
use crate::source::SourceMap;
use crate::tree::ModTree;

// ── Diagnostics ────────────────────────────────────────────────────────────

/// Position a diagnostic points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

pub fn location(diag: &Diagnostic, sources: &SourceMap) -> Option<Location> {
    let subject = diag.subject?;
    let (line, column) = sources.line_col(subject.file, subject.span.start);
    Some(Location {
        file: sources.file_name(subject.file).to_string(),
        line,
        column,
    })
}

/// ```text
/// error[E0200]: control has both sql and query
///   --> controls.sp:3:1
///   = detail
/// ```
pub fn render_diagnostic(diag: &Diagnostic, sources: &SourceMap) -> String {
    let mut out = String::new();
    let level = if diag.is_error() { "error" } else { "warning" };
    match &diag.code {
        Some(code) => {
            let _ = writeln!(out, "{level}[{code}]: {}", diag.summary);
        }
        None => {
            let _ = writeln!(out, "{level}: {}", diag.summary);
        }
    }
    if let Some(loc) = location(diag, sources) {
        let _ = writeln!(out, "  --> {}:{}:{}", loc.file, loc.line, loc.column);
    }
    if let Some(detail) = &diag.detail {
        let _ = writeln!(out, "  = {detail}");
    }
    out
}

pub fn render_diagnostics(diags: &[Diagnostic], sources: &SourceMap) -> String {
    diags
        .iter()
        .map(|d| render_diagnostic(d, sources))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One-line verdict printed after the diagnostics.
pub fn render_status(result: &LoadResult) -> String {
    match result.status() {
        LoadStatus::Clean => format!(
            "loaded mod '{}': {} resources in {} passes",
            result.tree.mod_name(),
            result.tree.len(),
            result.passes
        ),
        LoadStatus::Failed { errors, unresolved } => format!(
            "failed to load mod '{}': {errors} errors, {unresolved} unresolved",
            result.tree.mod_name()
        ),
    }
}

// ── Tree ───────────────────────────────────────────────────────────────────

pub fn render_tree(tree: &ModTree) -> String {
    tree.to_string()
}

// ── JSON ───────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct DiagnosticView<'a> {
    #[serde(flatten)]
    diagnostic: &'a Diagnostic,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<Location>,
}

#[derive(Serialize)]
struct Report<'a> {
    #[serde(rename = "mod")]
    mod_name: &'a str,
    ok: bool,
    passes: u32,
    fingerprint: String,
    unresolved: &'a [String],
    diagnostics: Vec<DiagnosticView<'a>>,
    tree: &'a ModTree,
}

pub fn render_json(result: &LoadResult, sources: &SourceMap) -> Result<String, serde_json::Error> {
    let report = Report {
        mod_name: result.tree.mod_name(),
        ok: result.status() == LoadStatus::Clean,
        passes: result.passes,
        fingerprint: sources.fingerprint(),
        unresolved: &result.unresolved,
        diagnostics: result
            .diagnostics
            .iter()
            .map(|d| DiagnosticView {
                diagnostic: d,
                location: location(d, sources),
            })
            .collect(),
        tree: &result.tree,
    };
    serde_json::to_string_pretty(&report)
}
