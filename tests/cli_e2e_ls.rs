//! End-to-end tests for the `texcorpus ls` command.

mod common;

use common::prelude::*;

#[test]
fn test_ls_help() {
    cargo_bin_cmd!("texcorpus")
        .args(["ls", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("List the documents of a corpus"));
}

#[test]
fn test_ls_lists_documents_with_titles() {
    let fixture = TestFixture::new()
        .with_file("td/td1.tex", sources::WITH_BLOCK)
        .with_file("cours.tex", sources::COMMANDS_ONLY)
        .with_file("notes.txt", "not a document");

    fixture
        .command()
        .arg("ls")
        .assert()
        .success()
        .stdout(predicate::str::contains("Statique du solide"))
        .stdout(predicate::str::contains("Cinématique"))
        .stdout(predicate::str::contains("td1.tex"))
        .stdout(predicate::str::contains("notes.txt").not());
}

#[test]
fn test_ls_skips_excluded_directories() {
    let fixture = TestFixture::new()
        .with_file("a.tex", &sources::titled("Kept"))
        .with_file("_build/a.tex", &sources::titled("Build copy"))
        .with_file("a-sources/a.tex", &sources::titled("Bundled copy"));

    fixture
        .command()
        .arg("ls")
        .assert()
        .success()
        .stdout(predicate::str::contains("Kept"))
        .stdout(predicate::str::contains("Build copy").not())
        .stdout(predicate::str::contains("Bundled copy").not());
}

#[test]
fn test_ls_count_and_filter() {
    let fixture = TestFixture::new()
        .with_file("a.tex", sources::WITH_BLOCK)
        .with_file("b.tex", sources::COMMANDS_ONLY)
        .with_file("c.tex", sources::BARE);

    fixture
        .command()
        .args(["ls", "--count"])
        .assert()
        .success()
        .stdout("3\n");

    fixture
        .command()
        .args(["ls", "--count", "--filter", "without-metadata"])
        .assert()
        .success()
        .stdout("1\n");
}

#[test]
fn test_ls_with_ids() {
    let fixture = TestFixture::new()
        .with_file("a.tex", sources::WITH_BLOCK)
        .with_file("b.tex", sources::BARE);

    fixture
        .command()
        .args(["ls", "--ids"])
        .assert()
        .success()
        .stdout(predicate::str::contains("DOC-0000000001"))
        .stdout(predicate::str::contains("(none)"));
}

#[test]
fn test_ls_empty_directory() {
    let fixture = TestFixture::new();
    fixture
        .command()
        .arg("ls")
        .assert()
        .success()
        .stdout(predicate::str::contains("No documents found."));
}
