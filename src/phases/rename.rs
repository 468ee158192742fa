//! Stage 4: Canonical File Names
//!
//! With `compilation.auto_rename` enabled, a source is renamed after
//! `naming.pattern`, whose `{key}` placeholders are filled from metadata
//! (falling back to `metadata.defaults`) and slugified. An existing file is
//! never overwritten.

use std::fs;

use log::{info, warn};

use super::orchestrator::RunContext;
use super::{Flow, Stage, StageResult, WorkItem};
use crate::document::Document;
use crate::error::FailureKind;
use crate::metadata::{Issue, Severity};
use crate::settings::MetadataDefaults;

/// Lower-case ASCII slug: accents folded, runs of other characters
/// collapsed into single hyphens.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars().flat_map(char::to_lowercase) {
        let folded = match c {
            'à' | 'â' | 'ä' | 'á' | 'ã' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'î' | 'ï' | 'í' | 'ì' => 'i',
            'ô' | 'ö' | 'ó' | 'ò' | 'õ' => 'o',
            'ù' | 'û' | 'ü' | 'ú' => 'u',
            'ç' => 'c',
            'ñ' => 'n',
            'ÿ' => 'y',
            other => other,
        };
        if folded.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(folded);
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Fill `pattern` for `document`. Returns `None` when every placeholder is
/// empty.
pub fn target_stem(pattern: &str, document: &Document, defaults: &MetadataDefaults) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    let mut literal = String::new();
    let mut rest = pattern;
    let mut filled_any = false;

    while let Some(open) = rest.find('{') {
        literal.push_str(&rest[..open]);
        let Some(close) = rest[open..].find('}') else {
            literal.push_str(&rest[open..]);
            rest = "";
            break;
        };
        let key = &rest[open + 1..open + close];
        let value = if key == "title" {
            Some(document.title())
        } else {
            document.text_or_default(key, defaults)
        };
        if let Some(value) = value.filter(|v| !slugify(v).is_empty()) {
            parts.push(slugify(&literal));
            parts.push(slugify(&value));
            filled_any = true;
        }
        literal.clear();
        rest = &rest[open + close + 1..];
    }
    literal.push_str(rest);
    parts.push(slugify(&literal));

    let stem = parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    (filled_any && !stem.is_empty()).then_some(stem)
}

pub fn execute(item: &mut WorkItem, ctx: &RunContext<'_>) -> StageResult {
    if !item.settings.compilation.auto_rename {
        item.reach(Stage::Renamed);
        return Ok(Flow::Continue);
    }

    let Some(stem) = target_stem(
        &item.settings.naming.pattern,
        &item.document,
        &item.settings.metadata,
    ) else {
        warn!(
            "{}: no metadata to build a name from; keeping the current name",
            item.document.path().display()
        );
        item.report.issues.push(Issue {
            severity: Severity::Warning,
            line: None,
            key: None,
            message: "not renamed: naming pattern produced an empty name".to_string(),
        });
        item.reach(Stage::Renamed);
        return Ok(Flow::Continue);
    };

    if stem == item.document.stem() {
        item.reach(Stage::Renamed);
        return Ok(Flow::Continue);
    }

    let current = item.document.path().to_path_buf();
    let mut target = current.with_file_name(&stem);
    if let Some(ext) = current.extension() {
        target.set_extension(ext);
    }
    let description = format!("rename {} -> {}", current.display(), target.display());
    if ctx.dry_run {
        if target.exists() {
            return Err(FailureKind::Io(format!(
                "cannot rename to {}: file exists",
                target.display()
            )));
        }
        item.act(Stage::Renamed, description, true);
    } else {
        let indexed = fs::canonicalize(&current).unwrap_or_else(|_| current.clone());
        item.document.rename_to(&target)?;
        ctx.registry.relocate(&indexed, &target)?;
        info!("{}", description);
        item.act(Stage::Renamed, description, false);
    }
    item.report.final_path = target;
    item.reach(Stage::Renamed);
    Ok(Flow::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::TexKeyMap;

    fn defaults() -> MetadataDefaults {
        MetadataDefaults {
            doc_type: "cours".to_string(),
            variant: "standard".to_string(),
            version: "0.1".to_string(),
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Cinématique du solide"), "cinematique-du-solide");
        assert_eq!(slugify("  TD n°3 : Forces!! "), "td-n-3-forces");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn test_target_stem_from_metadata() {
        let doc = Document::from_source(
            "/c/draft.tex",
            "%### BEGIN metadata ###\n% subject: SI\n% class: PTSI\n% doc_type: td\n% title: Statique\n%### END metadata ###\n",
            TexKeyMap::default(),
        );
        assert_eq!(
            target_stem("{subject}-{class}-{doc_type}-{title}", &doc, &defaults()).as_deref(),
            Some("si-ptsi-td-statique")
        );
    }

    #[test]
    fn test_missing_placeholders_collapse() {
        let doc = Document::from_source(
            "/c/draft.tex",
            "\\newcommand{\\DocTitle}{Énergie}\n",
            TexKeyMap::default(),
        );
        assert_eq!(
            target_stem("{subject}-{class}-{doc_type}-{title}", &doc, &defaults()).as_deref(),
            Some("cours-energie")
        );
    }

    #[test]
    fn test_literal_only_pattern_is_none() {
        let doc = Document::from_source("/c/x.tex", "", TexKeyMap::default());
        assert_eq!(target_stem("{subject}", &doc, &defaults()), None);
    }
}
