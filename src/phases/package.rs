//! Stages 6 and 7: Packaging and Manifest
//!
//! The rendered artifact is copied to `<output_dir>/<stem>.pdf`. With
//! `compilation.package_sources`, the source and its assets are bundled
//! into `<output_dir>/<stem>-sources/`. In normal mode the bundle is left
//! alone when the fingerprint did not change; deep mode always rebuilds it.
//!
//! The manifest is then written next to the artifact.

use std::fs;

use log::debug;

use super::orchestrator::RunContext;
use super::{Flow, Mode, Stage, StageResult, WorkItem};
use crate::error::{Error, FailureKind};
use crate::filesystem::{copy_file, copy_tree, remove_dir_if_exists};
use crate::manifest::{parameters_fingerprint, Manifest, ManifestDraft};

pub fn execute(item: &mut WorkItem, ctx: &RunContext<'_>) -> StageResult {
    let paths = item.paths();

    let artifact_description = format!("package {}", paths.artifact.display());
    if ctx.dry_run {
        item.act(Stage::Packaged, artifact_description, true);
    } else {
        let rendered = item
            .rendered
            .as_ref()
            .ok_or_else(|| FailureKind::Io("no rendered artifact to package".to_string()))?;
        if rendered.path != paths.artifact {
            copy_file(&rendered.path, &paths.artifact)?;
        }
        item.act(Stage::Packaged, artifact_description, false);
    }

    if item.settings.compilation.package_sources {
        let unchanged = item
            .previous_manifest
            .as_ref()
            .zip(item.fingerprint.as_ref())
            .is_some_and(|(previous, current)| previous.fingerprint == *current);
        if ctx.mode != Mode::Deep && unchanged && paths.bundle.is_dir() {
            debug!("{}: source bundle is up to date", item.document.path().display());
        } else {
            let description = format!("bundle sources into {}", paths.bundle.display());
            if ctx.dry_run {
                item.act(Stage::Packaged, description, true);
            } else {
                remove_dir_if_exists(&paths.bundle)?;
                fs::create_dir_all(&paths.bundle).map_err(Error::from)?;
                let source = item.document.path();
                if let Some(name) = source.file_name() {
                    copy_file(source, &paths.bundle.join(name))?;
                }
                let assets_dir = &item.settings.compilation.assets_dir;
                if let Some(parent) = source.parent() {
                    let assets = parent.join(assets_dir);
                    if assets.is_dir() {
                        copy_tree(&assets, &paths.bundle.join(assets_dir))?;
                    }
                }
                item.act(Stage::Packaged, description, false);
            }
        }
    }

    item.reach(Stage::Packaged);
    Ok(Flow::Continue)
}

pub fn write_manifest(item: &mut WorkItem, ctx: &RunContext<'_>) -> StageResult {
    let paths = item.paths();
    let description = format!("write manifest {}", paths.manifest.display());
    if ctx.dry_run {
        item.act(Stage::ManifestWritten, description, true);
        item.reach(Stage::ManifestWritten);
        return Ok(Flow::Continue);
    }

    let (Some(rendered), Some(fingerprint)) = (&item.rendered, &item.fingerprint) else {
        return Err(FailureKind::Io("nothing was rendered".to_string()));
    };
    let artifact = paths
        .artifact
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let draft = ManifestDraft {
        version: item
            .document
            .text_or_default("version", &item.settings.metadata)
            .unwrap_or_default(),
        identity: item.document.identity().map(|id| id.to_string()),
        fingerprint: fingerprint.clone(),
        parameters_fingerprint: parameters_fingerprint(
            item.document.metadata(),
            &item.settings.manifest.mandatory_keys,
        )?,
        page_count: rendered.page_count,
        artifact,
    };
    let manifest = Manifest::next(draft, item.previous_manifest.as_ref());
    if manifest.write(&paths.manifest)? {
        item.act(Stage::ManifestWritten, description, false);
    } else {
        debug!("{} unchanged", paths.manifest.display());
    }
    item.reach(Stage::ManifestWritten);
    Ok(Flow::Continue)
}
