//! Stage 5: Rendering
//!
//! Computes the document's content fingerprint and hands it to the
//! [`Renderer`](crate::render::Renderer). Quick mode stops here when the
//! previous manifest has the same fingerprint and the packaged artifact is
//! still there. Deep mode clears the build directory first.

use log::{debug, info, warn};

use super::orchestrator::RunContext;
use super::{Flow, Mode, Outcome, Stage, StageResult, WorkItem};
use crate::error::FailureKind;
use crate::filesystem::remove_dir_if_exists;
use crate::manifest::{content_fingerprint, Manifest};
use crate::render::{resolve_assets, RenderRequest};

pub fn execute(item: &mut WorkItem, ctx: &RunContext<'_>) -> StageResult {
    let paths = item.paths();
    let Some(config) = item.document.config().cloned() else {
        return Err(FailureKind::Config(
            "document has no resolved configuration".to_string(),
        ));
    };

    let fingerprint = content_fingerprint(item.document.source(), &config)?;
    item.previous_manifest = match Manifest::read_optional(&paths.manifest) {
        Ok(previous) => previous,
        Err(e) => {
            warn!("Ignoring unreadable manifest: {}", e);
            None
        }
    };

    if ctx.mode == Mode::Quick {
        let unchanged = item
            .previous_manifest
            .as_ref()
            .is_some_and(|m| m.fingerprint == fingerprint);
        if unchanged && paths.artifact.is_file() {
            debug!("{}: unchanged, skipping", item.document.path().display());
            item.fingerprint = Some(fingerprint);
            return Ok(Flow::Done(Outcome::SkippedUnchanged));
        }
    }
    item.fingerprint = Some(fingerprint);

    if ctx.mode == Mode::Deep {
        let description = format!("clean {}", paths.build_dir.display());
        if ctx.dry_run {
            if paths.build_dir.is_dir() {
                item.act(Stage::Rendered, description, true);
            }
        } else if remove_dir_if_exists(&paths.build_dir)? {
            item.act(Stage::Rendered, description, false);
        }
    }

    let description = format!(
        "render {} with {}",
        item.document.path().display(),
        item.settings.compilation.engine
    );
    if ctx.dry_run {
        item.act(Stage::Rendered, description, true);
        item.reach(Stage::Rendered);
        return Ok(Flow::Continue);
    }

    let request = RenderRequest {
        source_path: item.document.path().to_path_buf(),
        source: item.document.source().to_string(),
        assets: resolve_assets(item.document.path(), &item.settings.compilation.assets_dir),
        compilation: item.settings.compilation.clone(),
        config,
        build_dir: paths.build_dir,
    };
    let rendered = ctx
        .renderer
        .render(&request)
        .map_err(|failure| FailureKind::Render {
            diagnostics: failure.diagnostics,
        })?;
    info!(
        "{}: rendered {} page(s)",
        item.document.path().display(),
        rendered.page_count
    );
    item.act(Stage::Rendered, description, false);
    item.rendered = Some(rendered);
    item.reach(Stage::Rendered);
    Ok(Flow::Continue)
}
