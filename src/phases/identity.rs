//! Stage 3: Identity Validation
//!
//! A document that already has an identity must hold it alone; a collision
//! fails the document and is never resolved here. When a remote authority
//! is configured, existing identities are re-checked in deep mode, and in
//! other modes whenever no previous manifest vouches for them. What happens
//! when the authority cannot answer is governed by
//! `identity.on_remote_unknown.<mode>`.
//!
//! A document without an identity gets a new one, fail-closed.

use log::{info, warn};

use super::orchestrator::RunContext;
use super::{Flow, Mode, Stage, StageResult, WorkItem};
use crate::error::FailureKind;
use crate::identity::{check_remote_with_timeout, Claim, RemoteStatus, Validation};
use crate::manifest::Manifest;
use crate::metadata::{Issue, Severity};
use crate::settings::UnknownPolicy;

pub fn execute(item: &mut WorkItem, ctx: &RunContext<'_>) -> StageResult {
    match item.document.identity() {
        Some(identity) => {
            let path = item.document.path().to_path_buf();
            if let Validation::Collision(others) = ctx.registry.validate(&identity, &path)? {
                return Err(FailureKind::IdentityCollision {
                    identity: identity.to_string(),
                    others,
                });
            }

            if let Some(authority) = ctx.registry.authority() {
                let previous = Manifest::read_optional(&item.paths().manifest)
                    .ok()
                    .flatten();
                let vouched = previous
                    .as_ref()
                    .is_some_and(|m| m.identity.as_deref() == Some(identity.as_str()));
                if ctx.mode == Mode::Deep || !vouched {
                    let claim = Claim {
                        identity: identity.clone(),
                        title: item.document.title(),
                        path: path.clone(),
                    };
                    match check_remote_with_timeout(
                        authority,
                        &claim,
                        item.settings.identity.remote_timeout,
                    ) {
                        RemoteStatus::Available => {}
                        RemoteStatus::Taken => {
                            return Err(FailureKind::RemoteTaken {
                                identity: identity.to_string(),
                            })
                        }
                        RemoteStatus::Unknown => {
                            match item.settings.identity.unknown_policy(ctx.mode) {
                                UnknownPolicy::Fail => {
                                    return Err(FailureKind::RemoteUnknown {
                                        identity: identity.to_string(),
                                    })
                                }
                                UnknownPolicy::Warn => {
                                    warn!(
                                        "{}: remote authority did not confirm {}",
                                        path.display(),
                                        identity
                                    );
                                    item.report.issues.push(Issue {
                                        severity: Severity::Warning,
                                        line: None,
                                        key: Some("id".to_string()),
                                        message: "remote authority did not confirm this identity"
                                            .to_string(),
                                    });
                                }
                            }
                        }
                    }
                }
            }
            item.report.identity = Some(identity.to_string());
        }
        None if ctx.dry_run => {
            let preview = ctx
                .registry
                .preview_assignment(item.document.path(), &item.settings.identity)?;
            let description = match preview {
                Some(identity) => format!("assign identity {}", identity),
                None => "assign a new identity".to_string(),
            };
            item.act(Stage::IdentityValidated, description, true);
        }
        None => {
            let identity = ctx.registry.assign(
                item.document.path(),
                &item.document.title(),
                &item.settings.identity,
            )?;
            item.document.set_metadata("id", identity.as_str());
            item.document.save()?;
            info!("{}: assigned {}", item.document.path().display(), identity);
            item.act(
                Stage::IdentityValidated,
                format!("assign identity {}", identity),
                false,
            );
            item.report.identity = Some(identity.to_string());
        }
    }

    item.reach(Stage::IdentityValidated);
    Ok(Flow::Continue)
}
