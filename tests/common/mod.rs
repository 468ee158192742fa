//! Shared test utilities for integration and E2E tests.
//!
//! Add `mod common;` to a test file, then:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! let fixture = TestFixture::new().with_file("td1.tex", sources::WITH_BLOCK);
//! let result = fixture.orchestrator(MockRenderer::new()).run(&fixture.job()).unwrap();
//! ```

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use assert_fs::prelude::*;
use walkdir::WalkDir;

use texcorpus::config::ConfigStack;
use texcorpus::phases::{CompilationJob, Orchestrator};
use texcorpus::render::{RenderFailure, RenderRequest, RenderedArtifact, Renderer};

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    pub use predicates::prelude::*;

    pub use super::sources;
    pub use super::{snapshot, MockRenderer, TestFixture};
}

/// Document sources used across tests.
pub mod sources {
    /// Metadata block with an identity.
    pub const WITH_BLOCK: &str = "%### BEGIN metadata ###\n\
% id: DOC-0000000001\n\
% title: Statique du solide\n\
% doc_type: td\n\
% class: PTSI\n\
% subject: SI\n\
%### END metadata ###\n\
\\documentclass{article}\n\
\\begin{document}\n\
Statique.\n\
\\end{document}\n";

    /// Command declarations only, no identity.
    pub const COMMANDS_ONLY: &str = "\\documentclass{article}\n\
\\newcommand{\\DocTitle}{Cinématique}\n\
\\newcommand{\\DocType}{cours}\n\
\\begin{document}\n\
Cinématique.\n\
\\newpage\n\
Suite.\n\
\\end{document}\n";

    /// No metadata at all.
    pub const BARE: &str = "\\documentclass{article}\n\\begin{document}\nBare.\n\\end{document}\n";

    /// A source with the given title and no identity.
    pub fn titled(title: &str) -> String {
        format!(
            "%### BEGIN metadata ###\n% title: {}\n%### END metadata ###\n\\documentclass{{article}}\n\\begin{{document}}\n{}\n\\end{{document}}\n",
            title, title
        )
    }

    /// A source with the given identity and title.
    pub fn with_id(id: &str, title: &str) -> String {
        format!(
            "%### BEGIN metadata ###\n% id: {}\n% title: {}\n%### END metadata ###\n\\documentclass{{article}}\n\\begin{{document}}\n{}\n\\end{{document}}\n",
            id, title, title
        )
    }
}

/// Renderer standing in for the typesetting engine.
///
/// Writes `<build_dir>/<stem>.pdf` and reports one page plus one per
/// `\newpage`. A source containing `\fail` fails with diagnostics.
#[derive(Clone, Default)]
pub struct MockRenderer {
    calls: Arc<AtomicUsize>,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of render calls so far, shared between clones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Renderer for MockRenderer {
    fn render(&self, request: &RenderRequest) -> Result<RenderedArtifact, RenderFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.source.contains("\\fail") {
            return Err(RenderFailure {
                diagnostics: "! Undefined control sequence.\nl.3 \\fail".to_string(),
            });
        }
        let page_count = 1 + request.source.matches("\\newpage").count() as u32;
        fs::create_dir_all(&request.build_dir).map_err(|e| RenderFailure {
            diagnostics: e.to_string(),
        })?;
        let path = request.build_dir.join(format!("{}.pdf", request.stem()));
        fs::write(&path, format!("%PDF-1.4 mock of {} pages\n", page_count)).map_err(|e| {
            RenderFailure {
                diagnostics: e.to_string(),
            }
        })?;
        Ok(RenderedArtifact { path, page_count })
    }
}

/// Every file under `root` with its content, for before/after comparisons.
pub fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let content = fs::read(e.path()).expect("Failed to read file");
            (e.path().strip_prefix(root).unwrap().to_path_buf(), content)
        })
        .collect()
}

/// A temporary corpus directory with an isolated configuration stack.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

impl TestFixture {
    /// Create a new test fixture with an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Add a file with the given path and content.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    /// Add a `.texcorpus.yaml` override in `dir` ("" for the root).
    pub fn with_override(self, dir: &str, content: &str) -> Self {
        let path = if dir.is_empty() {
            ".texcorpus.yaml".to_string()
        } else {
            format!("{}/.texcorpus.yaml", dir)
        };
        self.with_file(&path, content)
    }

    /// Get the path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }

    pub fn read(&self, path: &str) -> String {
        fs::read_to_string(self.path().join(path)).expect("Failed to read file")
    }

    /// Stack with no installation or secrets file and the fixture root as
    /// ceiling.
    pub fn stack(&self) -> ConfigStack {
        ConfigStack::builder()
            .installation_file(self.path().join("no-installation.yaml"))
            .secrets_file(self.path().join("no-secrets.toml"))
            .ceiling(self.path())
            .build()
            .expect("Failed to build config stack")
    }

    /// Orchestrator over this fixture using `renderer` and no remote
    /// authority.
    pub fn orchestrator(&self, renderer: MockRenderer) -> Orchestrator {
        Orchestrator::new(self.stack())
            .with_renderer(Box::new(renderer))
            .with_authority(None)
    }

    /// Sources under the fixture root, sorted.
    pub fn sources(&self) -> Vec<PathBuf> {
        let mut sources: Vec<PathBuf> = WalkDir::new(self.path())
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "tex"))
            .filter(|p| !p.components().any(|c| c.as_os_str().to_string_lossy().ends_with("-sources")))
            .collect();
        sources.sort();
        sources
    }

    /// Job over every source of the fixture.
    pub fn job(&self) -> CompilationJob {
        CompilationJob::new(self.path(), self.sources())
    }

    /// A command running the binary in this fixture, isolated from the
    /// user's configuration.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("texcorpus");
        cmd.current_dir(self.path())
            .env("TEXCORPUS_CONFIG", self.path().join("no-installation.yaml"))
            .env("TEXCORPUS_SECRETS", self.path().join("no-secrets.toml"))
            .env_remove("RUST_LOG")
            .env("NO_COLOR", "1");
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_creates_temp_dir() {
        let fixture = TestFixture::new();
        assert!(fixture.path().exists());
    }

    #[test]
    fn test_fixture_with_override() {
        let fixture = TestFixture::new().with_override("td", "compilation:\n  passes: 2\n");
        assert!(fixture.path().join("td/.texcorpus.yaml").exists());
    }

    #[test]
    fn test_sources_are_sorted() {
        let fixture = TestFixture::new()
            .with_file("b.tex", sources::BARE)
            .with_file("a.tex", sources::BARE)
            .with_file("notes.txt", "x");
        let names: Vec<String> = fixture
            .sources()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.tex", "b.tex"]);
    }
}
