//! Stages 1 and 2: Discovery and Configuration
//!
//! Reads each source, extracts its metadata and resolves the configuration
//! layers that apply to its directory. A document whose override chain
//! contains a malformed file fails here with a `Config` outcome; documents
//! elsewhere in the corpus are unaffected. Documents with
//! `compilation.ignore: true` are dropped from the job.

use std::path::{Path, PathBuf};

use log::{debug, info};

use super::{CancellationToken, DocumentReport, Outcome, Stage, WorkItem};
use crate::config::ConfigStack;
use crate::document::Document;
use crate::error::FailureKind;
use crate::identity::IdentityRegistry;
use crate::metadata::TexKeyMap;
use crate::settings::Settings;

/// What discovery made of one input
pub enum Discovery {
    Ready(Box<WorkItem>),
    Ignored(PathBuf),
    Failed(DocumentReport),
}

fn failed(mut report: DocumentReport, stage: Stage, reason: FailureKind) -> Discovery {
    report.outcome = Outcome::Failed { stage, reason };
    Discovery::Failed(report)
}

/// Read `path` and resolve its configuration.
pub fn execute(
    path: &Path,
    stack: &ConfigStack,
    keys: &TexKeyMap,
    registry: &IdentityRegistry,
    cancel: &CancellationToken,
) -> Discovery {
    let mut report = DocumentReport::new(path);

    let document = match Document::from_path_with_keys(path, keys.clone()) {
        Ok(document) => document,
        Err(e) => return failed(report, Stage::Discovered, e.into()),
    };
    report.stage = Some(Stage::Discovered);
    report.issues = document.issues().to_vec();
    report.identity = document.identity().map(|id| id.to_string());

    if cancel.is_cancelled() {
        return failed(report, Stage::ConfigResolved, FailureKind::Cancelled);
    }

    let config = match stack.resolve_for_document(path) {
        Ok(config) => config,
        Err(e) => return failed(report, Stage::ConfigResolved, e.into()),
    };
    let settings = match Settings::from_config(&config) {
        Ok(settings) => settings,
        Err(e) => return failed(report, Stage::ConfigResolved, e.into()),
    };

    if settings.compilation.ignore {
        info!("Ignoring {} (compilation.ignore)", path.display());
        return Discovery::Ignored(path.to_path_buf());
    }

    if let Some(identity) = document.identity() {
        if let Err(e) = registry.register(identity, path) {
            return failed(report, Stage::ConfigResolved, e.into());
        }
    }

    debug!(
        "{}: configuration resolved{}",
        path.display(),
        config
            .directory_file()
            .map(|f| format!(" with {}", f.display()))
            .unwrap_or_default()
    );
    report.stage = Some(Stage::ConfigResolved);

    Discovery::Ready(Box::new(WorkItem {
        document: document.with_config(config),
        settings,
        report,
        rendered: None,
        fingerprint: None,
        previous_manifest: None,
    }))
}
