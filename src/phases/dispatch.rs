//! Stage 8: Dispatch
//!
//! Hands the packaged artifact and its manifest to the configured
//! transport. A failed delivery fails only this stage: the artifact and
//! manifest on disk remain valid and the dispatch can be retried.
//!
//! Once delivered, the document's identity is published to the remote
//! authority, if one is configured. A refused publication is a warning on
//! the report; the dispatch itself stands.

use log::{debug, info, warn};

use super::orchestrator::RunContext;
use super::{Disposition, Flow, Stage, StageResult, WorkItem};
use crate::error::FailureKind;
use crate::identity::Claim;
use crate::metadata::{Issue, Severity};
use crate::render::transport_from_settings;

pub fn execute(item: &mut WorkItem, ctx: &RunContext<'_>) -> StageResult {
    if ctx.disposition == Disposition::Package || !item.settings.compilation.dispatch {
        return Ok(Flow::Continue);
    }

    let configured;
    let transport = match ctx.transport {
        Some(transport) => transport,
        None => {
            configured = transport_from_settings(&item.settings.transport);
            match configured.as_deref() {
                Some(transport) => transport,
                None => {
                    debug!("{}: no transport configured", item.document.path().display());
                    return Ok(Flow::Continue);
                }
            }
        }
    };

    let paths = item.paths();
    let description = format!("dispatch to {}", transport.describe());
    if ctx.dry_run {
        item.act(Stage::Dispatched, description, true);
    } else {
        transport
            .deliver(&paths.artifact, &paths.manifest)
            .map_err(|failure| FailureKind::Dispatch(failure.message))?;
        info!("{}: {}", item.document.path().display(), description);
        item.act(Stage::Dispatched, description, false);
    }
    publish(item, ctx);
    item.reach(Stage::Dispatched);
    Ok(Flow::Continue)
}

fn publish(item: &mut WorkItem, ctx: &RunContext<'_>) {
    let (Some(authority), Some(identity)) = (ctx.registry.authority(), item.document.identity())
    else {
        return;
    };
    let description = format!("publish {}", identity);
    if ctx.dry_run {
        item.act(Stage::Dispatched, description, true);
        return;
    }
    let claim = Claim {
        identity,
        title: item.document.title(),
        path: item.document.path().to_path_buf(),
    };
    match authority.publish(&claim) {
        Ok(()) => item.act(Stage::Dispatched, description, false),
        Err(message) => {
            warn!("{}: {}", item.document.path().display(), message);
            item.report.issues.push(Issue {
                severity: Severity::Warning,
                line: None,
                key: Some("id".to_string()),
                message: format!("identity was not published: {}", message),
            });
        }
    }
}
