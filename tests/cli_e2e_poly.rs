//! End-to-end tests for the `texcorpus poly` command.

mod common;

use common::prelude::*;

/// Two documents in `chapitre/`, compiled with the mock renderer.
fn compiled_chapter() -> TestFixture {
    let fixture = TestFixture::new()
        .with_file("chapitre/a.tex", &sources::titled("Introduction"))
        .with_file("chapitre/b.tex", sources::COMMANDS_ONLY);
    let result = fixture
        .orchestrator(MockRenderer::new())
        .run(&fixture.job())
        .unwrap();
    assert!(!result.has_failures());
    fixture
}

#[test]
fn test_poly_init_writes_descriptor() {
    let fixture = compiled_chapter();

    fixture
        .command()
        .args(["poly", "init", "chapitre"])
        .assert()
        .success()
        .stdout(predicate::str::contains("poly.yaml"));

    let descriptor = fixture.read("chapitre/poly.yaml");
    assert!(descriptor.contains("Introduction"));
    assert!(descriptor.contains("Cinématique"));
}

#[test]
fn test_poly_build_without_render() {
    let fixture = compiled_chapter();
    fixture
        .command()
        .args(["poly", "init", "chapitre"])
        .assert()
        .success();

    fixture
        .command()
        .args(["poly", "build", "chapitre/poly.yaml", "--no-render"])
        .assert()
        .success()
        .stdout(predicate::str::contains("p.1    Introduction (1 pages)"))
        .stdout(predicate::str::contains("p.2    Cinématique (2 pages)"))
        .stdout(predicate::str::contains("3 pages in total"));

    fixture.child("chapitre/chapitre-poly.tex").assert(predicate::path::exists());
    fixture
        .child("chapitre/chapitre-poly.toc.yaml")
        .assert(predicate::path::exists());
}

#[test]
fn test_poly_build_dry_run() {
    let fixture = compiled_chapter();
    fixture
        .command()
        .args(["poly", "init", "chapitre"])
        .assert()
        .success();
    let before = snapshot(fixture.path());

    fixture
        .command()
        .args(["poly", "build", "chapitre/poly.yaml", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Would write"));

    assert_eq!(snapshot(fixture.path()), before);
}

#[test]
fn test_poly_build_missing_descriptor() {
    let fixture = TestFixture::new();
    fixture
        .command()
        .args(["poly", "build"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Poly descriptor not found"))
        .stderr(predicate::str::contains("poly init"));
}
