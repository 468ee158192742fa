//! The compilation pipeline.
//!
//! ## Overview
//!
//! Every document of a [`CompilationJob`] moves through these stages, in
//! order:
//!
//! 1. `Discovered` - the source was read and its metadata extracted
//! 2. `ConfigResolved` - its layered configuration was resolved and checked
//! 3. `IdentityValidated` - its identity is unique (or was just assigned)
//! 4. `Renamed` - the file carries its canonical name
//! 5. `Rendered` - the engine produced an artifact
//! 6. `Packaged` - the artifact (and sources) were copied to the output dir
//! 7. `ManifestWritten` - the manifest sidecar is up to date
//! 8. `Dispatched` - the transport delivered artifact and manifest
//!
//! Documents are independent: a failure is recorded in that document's
//! [`DocumentReport`] and the batch goes on. Rename runs after identity
//! validation, so a document with a colliding identity is never renamed.
//!
//! [`orchestrator::Orchestrator`] drives the stages; each stage lives in its
//! own module.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::document::Document;
use crate::error::FailureKind;
use crate::metadata::Issue;
use crate::settings::Settings;

pub mod discovery;
pub mod dispatch;
pub mod identity;
pub mod orchestrator;
pub mod package;
pub mod rename;
pub mod render;

pub use orchestrator::Orchestrator;

/// Execution mode of a compilation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Run every stage
    #[default]
    Normal,
    /// Skip documents whose fingerprint and artifact are unchanged
    Quick,
    /// Regenerate everything and re-validate identities remotely
    Deep,
}

impl FromStr for Mode {
    type Err = std::convert::Infallible;

    /// Unknown names fall back to normal mode.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "quick" => Mode::Quick,
            "deep" => Mode::Deep,
            _ => Mode::Normal,
        })
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Normal => write!(f, "normal"),
            Mode::Quick => write!(f, "quick"),
            Mode::Deep => write!(f, "deep"),
        }
    }
}

/// What happens to artifacts once packaged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Disposition {
    Package,
    #[default]
    PackageAndDispatch,
}

/// One compilation request. Built per invocation and consumed by a run.
#[derive(Debug, Clone)]
pub struct CompilationJob {
    pub corpus_root: PathBuf,
    pub sources: Vec<PathBuf>,
    pub mode: Mode,
    pub dry_run: bool,
    pub disposition: Disposition,
}

impl CompilationJob {
    pub fn new(corpus_root: impl Into<PathBuf>, sources: Vec<PathBuf>) -> Self {
        Self {
            corpus_root: corpus_root.into(),
            sources,
            mode: Mode::Normal,
            dry_run: false,
            disposition: Disposition::PackageAndDispatch,
        }
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn disposition(mut self, disposition: Disposition) -> Self {
        self.disposition = disposition;
        self
    }
}

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Discovered,
    ConfigResolved,
    IdentityValidated,
    Renamed,
    Rendered,
    Packaged,
    ManifestWritten,
    Dispatched,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Discovered => "discovered",
            Stage::ConfigResolved => "config-resolved",
            Stage::IdentityValidated => "identity-validated",
            Stage::Renamed => "renamed",
            Stage::Rendered => "rendered",
            Stage::Packaged => "packaged",
            Stage::ManifestWritten => "manifest-written",
            Stage::Dispatched => "dispatched",
        };
        f.write_str(name)
    }
}

/// Final state of one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Quick mode found nothing to do. Counts as a success.
    SkippedUnchanged,
    /// `stage` is the stage that could not be reached.
    Failed { stage: Stage, reason: FailureKind },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Outcome::Failed { .. })
    }

    pub fn label(&self) -> String {
        match self {
            Outcome::Success => "ok".to_string(),
            Outcome::SkippedUnchanged => "unchanged".to_string(),
            Outcome::Failed { reason, .. } => reason.label().to_string(),
        }
    }
}

/// Something a stage did, or would do in a dry run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub stage: Stage,
    pub description: String,
    /// Only projected: this was a dry run
    pub projected: bool,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.projected {
            write!(f, "would {}", self.description)
        } else {
            write!(f, "{}", self.description)
        }
    }
}

/// What happened to one input document
#[derive(Debug, Clone)]
pub struct DocumentReport {
    pub path: PathBuf,
    /// Path after a rename, otherwise `path`
    pub final_path: PathBuf,
    pub identity: Option<String>,
    /// Last stage reached
    pub stage: Option<Stage>,
    pub outcome: Outcome,
    pub actions: Vec<Action>,
    /// Metadata issues and policy warnings
    pub issues: Vec<Issue>,
}

impl DocumentReport {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            final_path: path.to_path_buf(),
            identity: None,
            stage: None,
            outcome: Outcome::Success,
            actions: Vec::new(),
            issues: Vec::new(),
        }
    }
}

/// Per-document results of a run, in input order
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub reports: Vec<DocumentReport>,
    /// Documents dropped at discovery by `compilation.ignore`
    pub ignored: Vec<PathBuf>,
}

impl BatchResult {
    pub fn succeeded(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.outcome == Outcome::Success)
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.outcome == Outcome::SkippedUnchanged)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| !r.outcome.is_success())
            .count()
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }
}

/// Shared flag asking a run to stop between stages
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Where a document's derived files go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub build_dir: PathBuf,
    pub output_dir: PathBuf,
    pub artifact: PathBuf,
    pub manifest: PathBuf,
    pub bundle: PathBuf,
}

impl OutputPaths {
    pub fn for_source(source: &Path, settings: &Settings) -> Self {
        let dir = source
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let output_dir = dir.join(&settings.compilation.output_dir);
        Self {
            build_dir: dir.join(&settings.compilation.build_dir),
            artifact: output_dir.join(format!("{}.pdf", stem)),
            manifest: crate::manifest::manifest_path(&output_dir, &stem),
            bundle: output_dir.join(format!("{}-sources", stem)),
            output_dir,
        }
    }
}

/// A document on its way through the pipeline
pub struct WorkItem {
    pub document: Document,
    pub settings: Settings,
    pub report: DocumentReport,
    /// Set by the render stage
    pub rendered: Option<crate::render::RenderedArtifact>,
    /// Content fingerprint, set by the render stage
    pub fingerprint: Option<String>,
    pub previous_manifest: Option<crate::manifest::Manifest>,
}

impl WorkItem {
    pub fn reach(&mut self, stage: Stage) {
        self.report.stage = Some(stage);
    }

    pub fn act(&mut self, stage: Stage, description: impl Into<String>, projected: bool) {
        self.report.actions.push(Action {
            stage,
            description: description.into(),
            projected,
        });
    }

    pub fn paths(&self) -> OutputPaths {
        OutputPaths::for_source(self.document.path(), &self.settings)
    }
}

/// Result of one stage: keep going, stop early with success, or fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Nothing left to do for this document
    Done(Outcome),
}

pub type StageResult = Result<Flow, FailureKind>;
