//! End-to-end tests for the `texcorpus prepare` command.

mod common;

use common::prelude::*;

#[test]
fn test_prepare_moves_declarations_into_block() {
    let fixture = TestFixture::new().with_file("cours.tex", sources::COMMANDS_ONLY);

    fixture
        .command()
        .args(["prepare", "cours.tex"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "format 1 (commands): moved title, doc_type into the metadata block",
        ))
        .stdout(predicate::str::contains("1 migrated, 0 already current"));

    let text = fixture.read("cours.tex");
    assert!(text.starts_with("%### BEGIN metadata ###\n"));
    assert!(text.contains("% doc_type: cours\n"));
    assert!(!text.contains("\\newcommand"));
    assert!(text.ends_with("\\begin{document}\nCinématique.\n\\newpage\nSuite.\n\\end{document}\n"));

    fixture
        .command()
        .args(["meta", "get", "cours.tex", "title"])
        .assert()
        .success()
        .stdout("Cinématique\n");
}

#[test]
fn test_prepare_twice_changes_nothing_more() {
    let fixture = TestFixture::new().with_file("cours.tex", sources::COMMANDS_ONLY);
    fixture.command().args(["prepare"]).assert().success();
    let first = fixture.read("cours.tex");

    fixture
        .command()
        .args(["prepare"])
        .assert()
        .success()
        .stdout(predicate::str::contains("format 2 (block)"))
        .stdout(predicate::str::contains("0 migrated, 1 already current"));
    assert_eq!(fixture.read("cours.tex"), first);
}

#[test]
fn test_prepare_dry_run_writes_nothing() {
    let fixture = TestFixture::new().with_file("cours.tex", sources::COMMANDS_ONLY);

    fixture
        .command()
        .args(["prepare", "--dry-run", "."])
        .assert()
        .success()
        .stdout(predicate::str::contains("would move title, doc_type"))
        .stdout(predicate::str::contains("1 to migrate"));
    assert_eq!(fixture.read("cours.tex"), sources::COMMANDS_ONLY);
}

#[test]
fn test_prepare_leaves_current_and_bare_documents() {
    let fixture = TestFixture::new()
        .with_file("td1.tex", sources::WITH_BLOCK)
        .with_file("vide.tex", sources::BARE);

    fixture
        .command()
        .args(["prepare"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no metadata"))
        .stdout(predicate::str::contains(
            "0 migrated, 1 already current, 1 without metadata",
        ));
    assert_eq!(fixture.read("td1.tex"), sources::WITH_BLOCK);
    assert_eq!(fixture.read("vide.tex"), sources::BARE);
}

#[test]
fn test_prepare_missing_path_fails() {
    let fixture = TestFixture::new();
    fixture
        .command()
        .args(["prepare", "absent.tex"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Document not found"));
}
