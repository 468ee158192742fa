//! Benchmarks for layered configuration resolution.
//!
//! Every document resolves its configuration once per run; directory
//! overrides are parsed once and cached, so repeated resolution in the same
//! directory should stay cheap.

use std::fs;
use std::path::PathBuf;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tempfile::TempDir;
use texcorpus::config::ConfigStack;

const OVERRIDE: &str = r#"
compilation:
  passes: 2
  engine_args+: ["-shell-escape"]
naming:
  pattern: "{class}-{doc_type}-{title}"
batch:
  exclude+: ["**/brouillons/**"]
"#;

/// A corpus with an override at the root and one `depth` levels down.
fn corpus(depth: usize) -> (TempDir, PathBuf) {
    let temp = TempDir::new().expect("temp dir");
    fs::write(temp.path().join(".texcorpus.yaml"), OVERRIDE).expect("root override");
    let mut dir = temp.path().to_path_buf();
    for level in 0..depth {
        dir = dir.join(format!("niveau{}", level));
    }
    fs::create_dir_all(&dir).expect("nested dirs");
    fs::write(dir.join(".texcorpus.yaml"), "compilation:\n  passes: 3\n").expect("nested override");
    (temp, dir)
}

fn stack(root: &std::path::Path) -> ConfigStack {
    ConfigStack::builder()
        .installation_file(root.join("none.yaml"))
        .secrets_file(root.join("none.toml"))
        .ceiling(root)
        .build()
        .expect("stack")
}

fn bench_build(c: &mut Criterion) {
    let temp = TempDir::new().expect("temp dir");
    c.bench_function("config_stack_build", |b| {
        b.iter(|| stack(black_box(temp.path())))
    });
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("config_resolution");

    let temp = TempDir::new().expect("temp dir");
    let base = stack(temp.path());
    group.bench_function("base", |b| b.iter(|| base.resolve_base()));

    for depth in [1, 4, 8] {
        let (temp, dir) = corpus(depth);
        let stack = stack(temp.path());
        group.bench_with_input(BenchmarkId::new("cached_override", depth), &dir, |b, dir| {
            b.iter(|| stack.resolve(black_box(dir)))
        });
        group.bench_with_input(BenchmarkId::new("cold_override", depth), &dir, |b, dir| {
            b.iter(|| {
                let stack = self::stack(temp.path());
                stack.resolve(black_box(dir))
            })
        });
    }

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let (temp, dir) = corpus(2);
    let config = stack(temp.path()).resolve(&dir).expect("resolve");

    c.bench_function("config_entries", |b| b.iter(|| config.entries()));
    c.bench_function("config_string_list", |b| {
        b.iter(|| config.string_list(black_box("batch.exclude")))
    });
}

criterion_group!(benches, bench_build, bench_resolve, bench_lookup);
criterion_main!(benches);
