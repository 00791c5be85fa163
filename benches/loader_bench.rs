use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use modload::*;

// Load-latency scenarios. All scenarios load cleanly.

const FLAT_MOD: &str = r#"
query "q1" {
  sql = "select 1"
}

query "q2" {
  sql = "select 2"
}

control "c1" {
  sql = "select 3"
}

locals {
  a = 1
  b = "two"
}
"#;

const FORWARD_REFS_MOD: &str = r#"
benchmark "all" {
  children = [control.c1, control.c2]
}

control "c1" {
  query = query.q1
  args  = { limit = local.limit }
}

control "c2" {
  sql  = query.q2.sql
  args = [var.region]
}

query "q1" {
  sql = "select * from t limit $1"
  param "limit" {
    default = local.limit
  }
}

query "q2" {
  sql = "select $1"
}

locals {
  limit = 10
}

variable "region" {
  type    = string
  default = "us-east-1"
}
"#;

const REPORT_MOD: &str = r#"
report "r" {
  title = "Overview"
  panel "intro" {
    type = "markdown"
    text = local.intro
  }
  report "nested" {
    panel "table" {
      sql   = query.q.sql
      width = 12
    }
  }
}

query "q" {
  sql = "select 1"
}

locals {
  intro = "Hello"
}
"#;

fn scenarios() -> [(&'static str, &'static str); 3] {
    [
        ("flat", FLAT_MOD),
        ("forward_refs", FORWARD_REFS_MOD),
        ("report", REPORT_MOD),
    ]
}

/// A chain of `n` locals declared in reverse, so every link but the last
/// is deferred in the first pass.
fn generate_reverse_chain(n: usize) -> String {
    let mut src = String::new();
    for i in (0..n).rev() {
        let value = if i == 0 {
            "\"start\"".to_string()
        } else {
            format!("local.l{}", i - 1)
        };
        src.push_str(&format!("locals {{\n  l{i} = {value}\n}}\n"));
    }
    src
}

fn parse_blocks(source: &str) -> Vec<ast::Block> {
    let parsed = parser::parse(source, ast::FileId(0));
    assert!(parsed.errors.is_empty(), "benchmark scenario must parse");
    parsed.blocks.unwrap_or_default()
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for (name, text) in scenarios() {
        group.bench_with_input(BenchmarkId::from_parameter(name), text, |b, text| {
            b.iter(|| {
                let r = parser::parse(black_box(text), ast::FileId(0));
                black_box(&r.blocks);
            });
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    let options = LoadOptions::default();
    for (name, text) in scenarios() {
        let mut sources = source::SourceMap::new();
        sources.add("main.sp", text);
        group.bench_function(name, |b| {
            b.iter_batched(
                || parse_blocks(text),
                |blocks| {
                    let result = decode_mod(black_box(&blocks), &sources, &options);
                    assert_eq!(result.status(), LoadStatus::Clean);
                    black_box(result);
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_chain_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode/reverse_chain");
    let options = LoadOptions::default();
    for n in [1_usize, 10, 50, 200] {
        let text = generate_reverse_chain(n);
        let mut sources = source::SourceMap::new();
        sources.add("main.sp", text.as_str());
        let blocks = parse_blocks(&text);
        group.bench_with_input(BenchmarkId::from_parameter(format!("{n}links")), &blocks, |b, blocks| {
            b.iter(|| black_box(decode_mod(black_box(blocks), &sources, &options)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_parse, bench_decode, bench_chain_scaling);
criterion_main!(benches);
