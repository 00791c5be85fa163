// Snapshot tests: lock the rendered resource tree and diagnostics so that
// changes to decode order, naming or message text are deliberate.
//
// Snapshots are inline; run `cargo insta review` after intentional output
// changes to update them.

use std::path::{Path, PathBuf};

use modload::render::{render_diagnostics, render_tree};
use modload::{load_mod_dir, load_mod_source, LoadOptions, LoadStatus};

fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .to_path_buf()
}

fn diagnostics_of(src: &str) -> String {
    let loaded = load_mod_source("main.sp", src, &LoadOptions::default());
    render_diagnostics(&loaded.result.diagnostics, &loaded.sources)
}

#[test]
fn snapshot_demo_mod_tree() {
    let loaded = load_mod_dir(&project_root().join("demos/cis"), &LoadOptions::default())
        .unwrap_or_else(|e| panic!("failed to load demo mod: {e}"));
    assert_eq!(
        loaded.result.status(),
        LoadStatus::Clean,
        "{}",
        render_diagnostics(&loaded.result.diagnostics, &loaded.sources)
    );
    assert_eq!(loaded.result.passes, 2);

    insta::assert_snapshot!(render_tree(&loaded.result.tree), @r"
    mod.cis
      cis.var.region
      cis.var.max_key_age
      cis.local.common_tags
      cis.local.region_up
      cis.query.access_key_age
      cis.report.overview
        cis.panel.intro
        cis.report.details
          cis.panel.keys
      cis.control.cis_1_4
      cis.control.cis_1_5
      cis.benchmark.cis_v140
    ");
}

#[test]
fn snapshot_unresolved_local() {
    insta::assert_snapshot!(diagnostics_of("locals {\n  a = local.b\n}\n"), @r#"
    error[E0400]: Failed to resolve dependencies for local.local.a
      --> main.sp:2:7
      = unresolved references: local.b; Unknown variable: There is no variable named "local".
    "#);
}

#[test]
fn snapshot_control_with_sql_and_query() {
    insta::assert_snapshot!(
        diagnostics_of("control \"c\" {\n  sql = \"select 1\"\n  query = query.q\n}\n"),
        @r"
    error[E0200]: local.control.c has both 'SQL' and 'query' property set - only 1 of these may be set
      --> main.sp:1:1
    "
    );
}

#[test]
fn snapshot_name_collision() {
    insta::assert_snapshot!(
        diagnostics_of("query \"q\" {\n  sql = \"a\"\n}\nquery \"q\" {\n  sql = \"b\"\n}\n"),
        @r#"
    error[E0300]: Mod defines more than one query named 'q'
      --> main.sp:4:1
      = a query named "q" is already defined
    "#
    );
}
