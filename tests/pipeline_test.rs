//! Integration tests for the compilation pipeline, driven through the
//! library with a mock renderer.

mod common;

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use common::prelude::*;
use common::sources;

use texcorpus::config::LayerKind;
use texcorpus::document::{Document, SourceEncoding};
use texcorpus::error::FailureKind;
use texcorpus::identity::{Claim, RemoteAuthority, RemoteStatus};
use texcorpus::manifest::Manifest;
use texcorpus::metadata::MetadataValue;
use texcorpus::phases::{CancellationToken, Mode, Outcome, Stage};
use texcorpus::render::{DispatchFailure, LocalDirectoryTransport, Transport};

#[test]
fn test_save_then_reload_round_trips_metadata() {
    let fixture = TestFixture::new().with_file("td1.tex", sources::WITH_BLOCK);
    let path = fixture.path().join("td1.tex");

    let mut document = Document::from_path(&path).unwrap();
    document.set_metadata("version", 3i64);
    document.set_metadata("title", "Statique (v3)");
    document.set_metadata(
        "tags",
        MetadataValue::List(vec!["forces".into(), "moments".into()]),
    );
    document.save().unwrap();

    let reloaded = Document::from_path(&path).unwrap();
    assert_eq!(reloaded.metadata(), document.metadata());
    assert!(reloaded.issues().is_empty());
    assert!(fixture.read("td1.tex").contains("\\begin{document}\nStatique.\n"));
}

#[test]
fn test_round_trip_keeps_command_declarations() {
    let fixture = TestFixture::new().with_file("c.tex", sources::COMMANDS_ONLY);
    let path = fixture.path().join("c.tex");

    let mut document = Document::from_path(&path).unwrap();
    document.set_metadata("title", "Dynamique");
    document.save().unwrap();

    let text = fixture.read("c.tex");
    assert!(text.contains("\\newcommand{\\DocTitle}{Dynamique}"));
    assert_eq!(Document::from_path(&path).unwrap().metadata(), document.metadata());
}

#[test]
fn test_round_trip_keeps_awkward_command_values() {
    for value in ["Rendement 50% minimum", " padded ", ""] {
        let fixture = TestFixture::new().with_file("c.tex", sources::COMMANDS_ONLY);
        let path = fixture.path().join("c.tex");

        let mut document = Document::from_path(&path).unwrap();
        document.set_metadata("title", value);
        document.save().unwrap();

        let reloaded = Document::from_path(&path).unwrap();
        assert_eq!(
            reloaded.metadata_value("title").value(),
            Some(&MetadataValue::from(value)),
            "{:?}",
            value
        );
        assert!(reloaded.issues().is_empty(), "{:?}", reloaded.issues());
        assert!(fixture.read("c.tex").contains("\\newcommand{\\DocType}{cours}"));
    }
}

#[test]
fn test_identity_assignment_keeps_latin1_body_bytes() {
    let fixture = TestFixture::new();
    let path = fixture.path().join("ancien.tex");
    let mut original = sources::COMMANDS_ONLY.as_bytes().to_vec();
    original.extend_from_slice(b"% r\xe9sum\xe9 \xe0 revoir\n");
    fs::write(&path, &original).unwrap();

    let result = fixture
        .orchestrator(MockRenderer::new())
        .run(&fixture.job())
        .unwrap();

    assert_eq!(result.reports[0].outcome, Outcome::Success);
    assert!(result.reports[0]
        .issues
        .iter()
        .any(|i| i.message.contains("Latin-1")));
    let saved = fs::read(&path).unwrap();
    assert!(saved.ends_with(b"\\end{document}\n% r\xe9sum\xe9 \xe0 revoir\n"));
    let reloaded = Document::from_path(&path).unwrap();
    assert_eq!(reloaded.encoding(), SourceEncoding::Latin1);
    assert_eq!(
        reloaded.identity().map(|id| id.to_string()),
        result.reports[0].identity
    );
}

#[test]
fn test_normal_run_assigns_identity_and_writes_manifest() {
    let fixture = TestFixture::new().with_file("cours.tex", sources::COMMANDS_ONLY);
    let renderer = MockRenderer::new();

    let result = fixture
        .orchestrator(renderer.clone())
        .run(&fixture.job())
        .unwrap();

    assert_eq!(result.succeeded(), 1);
    let report = &result.reports[0];
    // No transport is configured, so nothing is dispatched
    assert_eq!(report.stage, Some(Stage::ManifestWritten));
    let identity = report.identity.clone().unwrap();
    assert!(identity.starts_with("DOC-"));

    let reloaded = Document::from_path(fixture.path().join("cours.tex")).unwrap();
    assert_eq!(reloaded.identity().unwrap().as_str(), identity);

    let manifest = Manifest::read(&fixture.path().join("cours.manifest.json")).unwrap();
    assert_eq!(manifest.identity.as_deref(), Some(identity.as_str()));
    assert_eq!(manifest.page_count, 2);
    assert_eq!(manifest.artifact, "cours.pdf");
    assert!(manifest.mandatory_parameter_change);
    assert!(fixture.path().join("cours.pdf").is_file());
    assert!(fixture.path().join("cours-sources/cours.tex").is_file());
    assert_eq!(renderer.calls(), 1);
}

#[test]
fn test_two_normal_runs_give_identical_manifests() {
    let fixture = TestFixture::new()
        .with_file("td1.tex", sources::WITH_BLOCK)
        .with_file("cours.tex", sources::COMMANDS_ONLY);

    fixture
        .orchestrator(MockRenderer::new())
        .run(&fixture.job())
        .unwrap();
    let first = snapshot(fixture.path());

    let result = fixture
        .orchestrator(MockRenderer::new())
        .run(&fixture.job())
        .unwrap();
    assert!(!result.has_failures());
    let second = snapshot(fixture.path());

    for name in ["td1.manifest.json", "cours.manifest.json", "td1.tex", "cours.tex"] {
        let key = std::path::PathBuf::from(name);
        assert_eq!(first.get(&key), second.get(&key), "{} changed", name);
    }
    let manifest = Manifest::read(&fixture.path().join("td1.manifest.json")).unwrap();
    assert!(manifest.mandatory_parameter_change);
}

#[test]
fn test_quick_mode_skips_unchanged_documents() {
    let fixture = TestFixture::new().with_file("td1.tex", sources::WITH_BLOCK);
    fixture
        .orchestrator(MockRenderer::new())
        .run(&fixture.job())
        .unwrap();

    let renderer = MockRenderer::new();
    let result = fixture
        .orchestrator(renderer.clone())
        .run(&fixture.job().mode(Mode::Quick))
        .unwrap();

    assert_eq!(result.reports[0].outcome, Outcome::SkippedUnchanged);
    assert_eq!(result.skipped(), 1);
    assert_eq!(renderer.calls(), 0);
}

#[test]
fn test_quick_mode_renders_changed_documents() {
    let fixture = TestFixture::new().with_file("td1.tex", sources::WITH_BLOCK);
    fixture
        .orchestrator(MockRenderer::new())
        .run(&fixture.job())
        .unwrap();
    let edited = sources::WITH_BLOCK.replace("Statique.", "Statique, revue.");
    fixture.child("td1.tex").write_str(&edited).unwrap();

    let renderer = MockRenderer::new();
    let result = fixture
        .orchestrator(renderer.clone())
        .run(&fixture.job().mode(Mode::Quick))
        .unwrap();

    assert_eq!(result.reports[0].outcome, Outcome::Success);
    assert_eq!(renderer.calls(), 1);
}

#[test]
fn test_directory_override_beats_builtin_default() {
    let fixture = TestFixture::new()
        .with_override("td", "compilation:\n  passes: 3\nbatch:\n  exclude+: [\"**/brouillon/**\"]\n")
        .with_file("td/td1.tex", sources::WITH_BLOCK);
    let stack = fixture.stack();

    let nested = stack.resolve(&fixture.path().join("td")).unwrap();
    assert_eq!(nested.integer("compilation.passes").unwrap(), 3);
    assert_eq!(
        nested.provenance("compilation.passes").unwrap().kind,
        LayerKind::Directory
    );
    let exclude = nested.string_list("batch.exclude").unwrap();
    assert!(exclude.contains(&"**/_build/**".to_string()));
    assert_eq!(exclude.last().map(String::as_str), Some("**/brouillon/**"));

    // Keys only the builtin layer sets resolve to the builtin value
    assert_eq!(nested.string("compilation.engine").unwrap(), "latexmk");
    assert_eq!(
        nested.provenance("compilation.engine").unwrap().kind,
        LayerKind::Builtin
    );

    let root = stack.resolve(fixture.path()).unwrap();
    assert_eq!(root.integer("compilation.passes").unwrap(), 1);
}

#[test]
fn test_new_identities_are_unique_across_a_batch() {
    let mut fixture = TestFixture::new();
    for n in 0..6 {
        fixture = fixture.with_file(&format!("td{}.tex", n), &sources::titled(&format!("TD {}", n)));
    }
    fixture = fixture.with_file("cours.tex", &sources::with_id("DOC-EXISTING", "Cours"));

    let result = fixture
        .orchestrator(MockRenderer::new())
        .run(&fixture.job())
        .unwrap();
    assert!(!result.has_failures());

    let identities: Vec<String> = fixture
        .sources()
        .iter()
        .map(|p| Document::from_path(p).unwrap().identity().unwrap().to_string())
        .collect();
    let distinct: BTreeSet<&String> = identities.iter().collect();
    assert_eq!(identities.len(), 7);
    assert_eq!(distinct.len(), 7);
    assert!(identities.contains(&"DOC-EXISTING".to_string()));
}

#[test]
fn test_existing_collision_is_reported_not_fixed() {
    let fixture = TestFixture::new()
        .with_file("a.tex", &sources::with_id("DOC-SAME", "A"))
        .with_file("b.tex", &sources::with_id("DOC-SAME", "B"))
        .with_file("c.tex", &sources::with_id("DOC-OTHER", "C"));
    let before_a = fixture.read("a.tex");

    let result = fixture
        .orchestrator(MockRenderer::new())
        .run(&fixture.job())
        .unwrap();

    assert_eq!(result.failed(), 2);
    assert_eq!(result.succeeded(), 1);
    for report in &result.reports[..2] {
        match &report.outcome {
            Outcome::Failed {
                stage: Stage::IdentityValidated,
                reason: FailureKind::IdentityCollision { identity, others },
            } => {
                assert_eq!(identity, "DOC-SAME");
                assert_eq!(others.len(), 1);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }
    assert_eq!(fixture.read("a.tex"), before_a);
    assert!(!fixture.path().join("a.manifest.json").exists());
}

#[test]
fn test_broken_override_only_fails_its_documents() {
    let fixture = TestFixture::new()
        .with_file("a.tex", &sources::titled("A"))
        .with_file("b.tex", &sources::titled("B"))
        .with_override("broken", "compilation: [unclosed\n")
        .with_file("broken/c.tex", &sources::titled("C"));

    let result = fixture
        .orchestrator(MockRenderer::new())
        .run(&fixture.job())
        .unwrap();

    assert_eq!(result.reports.len(), 3);
    assert_eq!(result.succeeded(), 2);
    let broken = result
        .reports
        .iter()
        .find(|r| r.path.ends_with("broken/c.tex"))
        .unwrap();
    assert!(matches!(
        broken.outcome,
        Outcome::Failed {
            stage: Stage::ConfigResolved,
            reason: FailureKind::Config(_)
        }
    ));
}

#[test]
fn test_dry_run_changes_nothing() {
    let fixture = TestFixture::new()
        .with_file("td1.tex", sources::WITH_BLOCK)
        .with_file("cours.tex", sources::COMMANDS_ONLY)
        .with_override("", "compilation:\n  auto_rename: true\n");
    let before = snapshot(fixture.path());
    let renderer = MockRenderer::new();

    let result = fixture
        .orchestrator(renderer.clone())
        .run(&fixture.job().dry_run(true))
        .unwrap();

    assert_eq!(snapshot(fixture.path()), before);
    assert_eq!(renderer.calls(), 0);
    assert_eq!(result.succeeded(), 2);
    for report in &result.reports {
        assert_eq!(report.stage, Some(Stage::ManifestWritten));
        assert!(!report.actions.is_empty());
        assert!(report.actions.iter().all(|a| a.projected));
        assert!(report
            .actions
            .iter()
            .any(|a| a.stage == Stage::Rendered && a.description.starts_with("render")));
    }
    let cours = result
        .reports
        .iter()
        .find(|r| r.path.ends_with("cours.tex"))
        .unwrap();
    assert!(cours
        .actions
        .iter()
        .any(|a| a.stage == Stage::IdentityValidated));
}

#[test]
fn test_auto_rename_uses_naming_pattern() {
    let fixture = TestFixture::new()
        .with_file("draft.tex", sources::WITH_BLOCK)
        .with_override("", "compilation:\n  auto_rename: true\n");

    let result = fixture
        .orchestrator(MockRenderer::new())
        .run(&fixture.job())
        .unwrap();

    assert!(!result.has_failures());
    let report = &result.reports[0];
    assert!(report.final_path.ends_with("si-ptsi-td-statique-du-solide.tex"));
    assert!(!fixture.path().join("draft.tex").exists());
    assert!(fixture
        .path()
        .join("si-ptsi-td-statique-du-solide.manifest.json")
        .is_file());
}

#[test]
fn test_render_failure_keeps_diagnostics() {
    let fixture = TestFixture::new()
        .with_file("good.tex", &sources::titled("Good"))
        .with_file("bad.tex", &sources::titled("Bad").replace("Bad\n\\end", "\\fail\n\\end"));

    let result = fixture
        .orchestrator(MockRenderer::new())
        .run(&fixture.job())
        .unwrap();

    let bad = result
        .reports
        .iter()
        .find(|r| r.path.ends_with("bad.tex"))
        .unwrap();
    match &bad.outcome {
        Outcome::Failed {
            stage: Stage::Rendered,
            reason: FailureKind::Render { diagnostics },
        } => assert!(diagnostics.contains("Undefined control sequence")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(result.succeeded(), 1);
    assert!(!fixture.path().join("bad.manifest.json").exists());
}

#[test]
fn test_ignored_documents_are_left_out() {
    let fixture = TestFixture::new()
        .with_file("a.tex", &sources::titled("A"))
        .with_override("archive", "compilation:\n  ignore: true\n")
        .with_file("archive/old.tex", &sources::titled("Old"));

    let result = fixture
        .orchestrator(MockRenderer::new())
        .run(&fixture.job())
        .unwrap();

    assert_eq!(result.reports.len(), 1);
    assert_eq!(result.ignored.len(), 1);
    assert!(result.ignored[0].ends_with("archive/old.tex"));
    assert!(Document::from_path(fixture.path().join("archive/old.tex"))
        .unwrap()
        .identity()
        .is_none());
}

#[test]
fn test_local_transport_receives_artifact_and_manifest() {
    let fixture = TestFixture::new().with_file("td1.tex", sources::WITH_BLOCK);
    let target = assert_fs::TempDir::new().unwrap();

    let result = fixture
        .orchestrator(MockRenderer::new())
        .with_transport(Box::new(LocalDirectoryTransport::new(target.path())))
        .run(&fixture.job())
        .unwrap();

    assert!(!result.has_failures());
    assert!(target.path().join("td1.pdf").is_file());
    assert!(target.path().join("td1.manifest.json").is_file());
    assert!(result.reports[0]
        .actions
        .iter()
        .any(|a| a.stage == Stage::Dispatched));
}

#[test]
fn test_configured_local_transport() {
    let target = assert_fs::TempDir::new().unwrap();
    let override_text = format!(
        "transport:\n  kind: local\n  target_dir: \"{}\"\n",
        target.path().display()
    );
    let fixture = TestFixture::new()
        .with_file("td1.tex", sources::WITH_BLOCK)
        .with_override("", &override_text);

    fixture
        .orchestrator(MockRenderer::new())
        .run(&fixture.job().disposition(texcorpus::phases::Disposition::Package))
        .unwrap();
    assert!(!target.path().join("td1.pdf").exists());

    fixture
        .orchestrator(MockRenderer::new())
        .run(&fixture.job())
        .unwrap();
    assert!(target.path().join("td1.pdf").is_file());
}

#[test]
fn test_cancelled_run_reports_every_document() {
    let fixture = TestFixture::new()
        .with_file("a.tex", &sources::titled("A"))
        .with_file("b.tex", &sources::titled("B"));
    let cancel = CancellationToken::new();
    cancel.cancel();
    let before = snapshot(fixture.path());

    let result = fixture
        .orchestrator(MockRenderer::new())
        .with_cancellation(cancel)
        .run(&fixture.job())
        .unwrap();

    assert_eq!(result.failed(), 2);
    for report in &result.reports {
        assert_eq!(
            report.outcome,
            Outcome::Failed {
                stage: Stage::ConfigResolved,
                reason: FailureKind::Cancelled
            }
        );
    }
    assert_eq!(snapshot(fixture.path()), before);
}

#[test]
fn test_deep_mode_cleans_build_directory() {
    let fixture = TestFixture::new().with_file("td1.tex", sources::WITH_BLOCK);
    fixture
        .orchestrator(MockRenderer::new())
        .run(&fixture.job())
        .unwrap();
    fixture.child("_build/stale.aux").write_str("stale").unwrap();

    let result = fixture
        .orchestrator(MockRenderer::new())
        .run(&fixture.job().mode(Mode::Deep))
        .unwrap();

    assert!(!result.has_failures());
    assert!(!fixture.path().join("_build/stale.aux").exists());
    assert!(fs::metadata(fixture.path().join("td1.pdf")).is_ok());
}

/// Authority that never answers.
struct Unreachable;

impl RemoteAuthority for Unreachable {
    fn check(&self, _claim: &Claim) -> RemoteStatus {
        RemoteStatus::Unknown
    }

    fn publish(&self, _claim: &Claim) -> Result<(), String> {
        Err("unreachable".to_string())
    }
}

/// Transport whose deliveries always fail.
struct Offline;

impl Transport for Offline {
    fn deliver(&self, _artifact: &Path, _manifest: &Path) -> Result<(), DispatchFailure> {
        Err(DispatchFailure {
            message: "host unreachable".to_string(),
        })
    }

    fn describe(&self) -> String {
        "offline host".to_string()
    }
}

/// Authority that accepts every identity and records publications.
#[derive(Default)]
struct Registrar {
    published: Mutex<Vec<String>>,
}

impl Registrar {
    fn published(&self) -> Vec<String> {
        self.published.lock().unwrap().clone()
    }
}

impl RemoteAuthority for Registrar {
    fn check(&self, _claim: &Claim) -> RemoteStatus {
        RemoteStatus::Available
    }

    fn publish(&self, claim: &Claim) -> Result<(), String> {
        self.published.lock().unwrap().push(claim.identity.to_string());
        Ok(())
    }
}

#[test]
fn test_failed_render_publishes_nothing() {
    let fixture = TestFixture::new().with_file(
        "bad.tex",
        &sources::titled("Bad").replace("Bad\n\\end", "\\fail\n\\end"),
    );
    let registrar = Arc::new(Registrar::default());
    let target = assert_fs::TempDir::new().unwrap();

    let result = fixture
        .orchestrator(MockRenderer::new())
        .with_authority(Some(registrar.clone() as Arc<dyn RemoteAuthority>))
        .with_transport(Box::new(LocalDirectoryTransport::new(target.path())))
        .run(&fixture.job())
        .unwrap();

    assert!(matches!(
        result.reports[0].outcome,
        Outcome::Failed {
            stage: Stage::Rendered,
            ..
        }
    ));
    assert!(result.reports[0].identity.is_some());
    assert!(registrar.published().is_empty());
}

#[test]
fn test_identity_is_published_after_dispatch() {
    let fixture = TestFixture::new().with_file("cours.tex", sources::COMMANDS_ONLY);
    let registrar = Arc::new(Registrar::default());
    let target = assert_fs::TempDir::new().unwrap();

    let orchestrator = || {
        fixture
            .orchestrator(MockRenderer::new())
            .with_authority(Some(registrar.clone() as Arc<dyn RemoteAuthority>))
    };
    orchestrator().run(&fixture.job().dry_run(true)).unwrap();
    assert!(registrar.published().is_empty());

    orchestrator().run(&fixture.job()).unwrap();
    // No transport: nothing dispatched, nothing published
    assert!(registrar.published().is_empty());

    let result = orchestrator()
        .with_transport(Box::new(LocalDirectoryTransport::new(target.path())))
        .run(&fixture.job())
        .unwrap();
    let identity = result.reports[0].identity.clone().unwrap();
    assert_eq!(result.reports[0].outcome, Outcome::Success);
    assert_eq!(registrar.published(), vec![identity]);
}

#[test]
fn test_dispatch_fails_on_offline_transport_before_publishing() {
    let fixture = TestFixture::new().with_file("td1.tex", sources::WITH_BLOCK);
    let registrar = Arc::new(Registrar::default());

    fixture
        .orchestrator(MockRenderer::new())
        .with_authority(Some(registrar.clone() as Arc<dyn RemoteAuthority>))
        .with_transport(Box::new(Offline))
        .run(&fixture.job())
        .unwrap();

    assert!(registrar.published().is_empty());
}

#[test]
fn test_refused_publication_is_a_warning() {
    let fixture = TestFixture::new().with_file("td1.tex", sources::WITH_BLOCK);
    let target = assert_fs::TempDir::new().unwrap();

    let result = fixture
        .orchestrator(MockRenderer::new())
        .with_authority(Some(Arc::new(Unreachable)))
        .with_transport(Box::new(LocalDirectoryTransport::new(target.path())))
        .run(&fixture.job())
        .unwrap();

    let report = &result.reports[0];
    assert_eq!(report.outcome, Outcome::Success);
    assert_eq!(report.stage, Some(Stage::Dispatched));
    assert!(target.path().join("td1.pdf").is_file());
    assert!(report
        .issues
        .iter()
        .any(|i| i.message.contains("not published")));
}

#[test]
fn test_unconfirmed_identity_warns_in_normal_mode() {
    let fixture = TestFixture::new().with_file("td1.tex", sources::WITH_BLOCK);

    let result = fixture
        .orchestrator(MockRenderer::new())
        .with_authority(Some(Arc::new(Unreachable)))
        .run(&fixture.job())
        .unwrap();

    let report = &result.reports[0];
    assert_eq!(report.outcome, Outcome::Success);
    assert!(report
        .issues
        .iter()
        .any(|i| i.message.contains("did not confirm")));
}

#[test]
fn test_unconfirmed_identity_fails_in_deep_mode() {
    let fixture = TestFixture::new().with_file("td1.tex", sources::WITH_BLOCK);

    let result = fixture
        .orchestrator(MockRenderer::new())
        .with_authority(Some(Arc::new(Unreachable)))
        .run(&fixture.job().mode(Mode::Deep))
        .unwrap();

    assert!(matches!(
        &result.reports[0].outcome,
        Outcome::Failed {
            stage: Stage::IdentityValidated,
            reason: FailureKind::RemoteUnknown { identity },
        } if identity == "DOC-0000000001"
    ));
}

#[test]
fn test_new_identity_fails_closed_without_authority_answer() {
    let fixture = TestFixture::new().with_file("cours.tex", sources::COMMANDS_ONLY);
    let before = fixture.read("cours.tex");

    let result = fixture
        .orchestrator(MockRenderer::new())
        .with_authority(Some(Arc::new(Unreachable)))
        .run(&fixture.job())
        .unwrap();

    assert!(matches!(
        result.reports[0].outcome,
        Outcome::Failed {
            stage: Stage::IdentityValidated,
            reason: FailureKind::RemoteUnknown { .. }
        }
    ));
    assert_eq!(fixture.read("cours.tex"), before);
}

#[test]
fn test_dispatch_failure_keeps_packaged_artifact() {
    let fixture = TestFixture::new().with_file("td1.tex", sources::WITH_BLOCK);

    let result = fixture
        .orchestrator(MockRenderer::new())
        .with_transport(Box::new(Offline))
        .run(&fixture.job())
        .unwrap();

    match &result.reports[0].outcome {
        Outcome::Failed {
            stage: Stage::Dispatched,
            reason: FailureKind::Dispatch(message),
        } => assert!(message.contains("host unreachable")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(fixture.path().join("td1.pdf").is_file());
    assert!(Manifest::read(&fixture.path().join("td1.manifest.json")).is_ok());
}

#[test]
fn test_sequential_batch_keeps_input_order() {
    let fixture = TestFixture::new()
        .with_override("", "batch:\n  parallel: false\n")
        .with_file("c.tex", &sources::titled("C"))
        .with_file("a.tex", &sources::titled("A"))
        .with_file("b.tex", &sources::titled("B"));
    let mut sources = fixture.sources();
    sources.reverse();
    let job = texcorpus::phases::CompilationJob::new(fixture.path(), sources.clone());

    let result = fixture.orchestrator(MockRenderer::new()).run(&job).unwrap();

    let reported: Vec<_> = result.reports.iter().map(|r| r.path.clone()).collect();
    assert_eq!(reported, sources);
}
