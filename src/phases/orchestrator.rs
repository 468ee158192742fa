//! Orchestrator for a complete compilation run
//!
//! Builds the identity index for the corpus, discovers every input, then
//! drives each document through the remaining stages. Documents run in
//! parallel with rayon when `batch.parallel` is set; reports always come
//! back in input order.

use std::sync::Arc;

use log::{debug, error, info, warn};
use rayon::prelude::*;

use super::discovery::{self, Discovery};
use super::{
    dispatch, identity, package, rename, render, BatchResult, CancellationToken, CompilationJob,
    Disposition, DocumentReport, Flow, Mode, Outcome, Stage, StageResult, WorkItem,
};
use crate::config::ConfigStack;
use crate::error::{FailureKind, Result};
use crate::identity::{CommandAuthority, IdentityRegistry, RemoteAuthority};
use crate::metadata::TexKeyMap;
use crate::render::{ExternalEngine, Renderer, Transport};
use crate::scan::ScanFilter;
use crate::settings::Settings;

/// Per-run state shared by every stage
pub struct RunContext<'a> {
    pub mode: Mode,
    pub dry_run: bool,
    pub disposition: Disposition,
    pub registry: &'a IdentityRegistry,
    pub renderer: &'a dyn Renderer,
    /// Overrides the transport configured per document
    pub transport: Option<&'a dyn Transport>,
}

type StageFn = fn(&mut WorkItem, &RunContext<'_>) -> StageResult;

/// Stages after configuration, in order
const STAGES: [(Stage, StageFn); 6] = [
    (Stage::IdentityValidated, identity::execute),
    (Stage::Renamed, rename::execute),
    (Stage::Rendered, render::execute),
    (Stage::Packaged, package::execute),
    (Stage::ManifestWritten, package::write_manifest),
    (Stage::Dispatched, dispatch::execute),
];

enum AuthoritySource {
    /// `remote.command` from the base configuration
    FromSettings,
    Fixed(Option<Arc<dyn RemoteAuthority>>),
}

/// Runs compilation jobs against a configuration stack
pub struct Orchestrator {
    stack: ConfigStack,
    keys: TexKeyMap,
    renderer: Box<dyn Renderer>,
    transport: Option<Box<dyn Transport>>,
    authority: AuthoritySource,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Orchestrator using the external engine, the configured transport and
    /// the configured remote authority.
    pub fn new(stack: ConfigStack) -> Self {
        Self {
            stack,
            keys: TexKeyMap::default(),
            renderer: Box::new(ExternalEngine::new()),
            transport: None,
            authority: AuthoritySource::FromSettings,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Use `transport` for every document instead of `transport.*` settings.
    pub fn with_transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use `authority` (or none) instead of `remote.command`.
    pub fn with_authority(mut self, authority: Option<Arc<dyn RemoteAuthority>>) -> Self {
        self.authority = AuthoritySource::Fixed(authority);
        self
    }

    pub fn with_keys(mut self, keys: TexKeyMap) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn stack(&self) -> &ConfigStack {
        &self.stack
    }

    /// Run `job`. Per-document failures are recorded in the result; only
    /// problems affecting the whole run are returned as errors.
    pub fn run(&self, job: &CompilationJob) -> Result<BatchResult> {
        let base = match self.stack.resolve_base().and_then(|c| Settings::from_config(&c)) {
            Ok(settings) => Some(settings),
            Err(e) => {
                error!("{}", e);
                None
            }
        };

        let registry = match &base {
            Some(settings) if job.corpus_root.is_dir() => {
                let filter = ScanFilter::from_settings(&settings.batch)?;
                IdentityRegistry::scan(&job.corpus_root, &filter, &self.keys)?
            }
            _ => IdentityRegistry::new(),
        };
        let authority = match &self.authority {
            AuthoritySource::Fixed(authority) => authority.clone(),
            AuthoritySource::FromSettings => base
                .as_ref()
                .and_then(|s| {
                    CommandAuthority::from_settings(&s.remote)
                        .map(|a| a.with_timeout(s.identity.remote_timeout))
                })
                .map(|a| Arc::new(a) as Arc<dyn RemoteAuthority>),
        };
        let registry = match authority {
            Some(authority) => registry.with_authority(authority),
            None => registry,
        };
        let parallel = base.as_ref().map_or(true, |s| s.batch.parallel);

        info!(
            "Compiling {} document(s) in {} mode{}",
            job.sources.len(),
            job.mode,
            if job.dry_run { " (dry run)" } else { "" }
        );

        let discover = |path: &std::path::PathBuf| {
            discovery::execute(path, &self.stack, &self.keys, &registry, &self.cancel)
        };
        let discovered: Vec<Discovery> = if parallel {
            job.sources.par_iter().map(discover).collect()
        } else {
            job.sources.iter().map(discover).collect()
        };

        let ctx = RunContext {
            mode: job.mode,
            dry_run: job.dry_run,
            disposition: job.disposition,
            registry: &registry,
            renderer: self.renderer.as_ref(),
            transport: self.transport.as_deref(),
        };

        let mut ignored = Vec::new();
        let mut pending: Vec<std::result::Result<Box<WorkItem>, DocumentReport>> = Vec::new();
        for outcome in discovered {
            match outcome {
                Discovery::Ready(item) => pending.push(Ok(item)),
                Discovery::Failed(report) => pending.push(Err(report)),
                Discovery::Ignored(path) => ignored.push(path),
            }
        }

        let process = |next: std::result::Result<Box<WorkItem>, DocumentReport>| match next {
            Ok(item) => self.run_document(*item, &ctx),
            Err(report) => {
                log_failure(&report);
                report
            }
        };
        let reports: Vec<DocumentReport> = if parallel {
            pending.into_par_iter().map(process).collect()
        } else {
            pending.into_iter().map(process).collect()
        };

        let result = BatchResult { reports, ignored };
        info!(
            "{} succeeded, {} unchanged, {} failed, {} ignored",
            result.succeeded(),
            result.skipped(),
            result.failed(),
            result.ignored.len()
        );
        Ok(result)
    }

    fn run_document(&self, mut item: WorkItem, ctx: &RunContext<'_>) -> DocumentReport {
        for (stage, run) in STAGES {
            if self.cancel.is_cancelled() {
                item.report.outcome = Outcome::Failed {
                    stage,
                    reason: FailureKind::Cancelled,
                };
                break;
            }
            match run(&mut item, ctx) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Done(outcome)) => {
                    item.report.outcome = outcome;
                    break;
                }
                Err(reason) => {
                    item.report.outcome = Outcome::Failed { stage, reason };
                    break;
                }
            }
        }

        match &item.report.outcome {
            Outcome::Failed { .. } => log_failure(&item.report),
            outcome => debug!("{}: {}", item.report.path.display(), outcome.label()),
        }
        item.report
    }
}

fn log_failure(report: &DocumentReport) {
    if let Outcome::Failed { stage, reason } = &report.outcome {
        warn!(
            "{}: failed before {} ({})",
            report.path.display(),
            stage,
            reason
        );
    }
}
