//! Poly assembly
//!
//! A poly is one printable booklet made of several compiled documents. It is
//! built in two steps so the operator can reorder or retitle documents in
//! between:
//!
//! 1. [`generate_descriptor`] lists the compiled documents of a directory in
//!    an editable `poly.yaml`.
//! 2. [`build_from_descriptor`] reads that file back, lays the documents out
//!    page by page with [`assemble`], writes a `pdfpages` master source and a
//!    table of contents, and renders the master.

use std::fs;
use std::path::{Component, Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::ConfigStack;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::filesystem::{copy_file, write_atomic};
use crate::manifest::Manifest;
use crate::metadata::TexKeyMap;
use crate::phases::rename::slugify;
use crate::phases::OutputPaths;
use crate::render::{RenderRequest, RenderedArtifact, Renderer};
use crate::scan::{scan_corpus, ScanFilter};
use crate::settings::{PolySettings, Settings};

/// A compiled document to include in a poly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolyInput {
    pub title: String,
    pub artifact: PathBuf,
    pub page_count: u32,
}

/// Page layout options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolyOptions {
    /// Pad every document with blank pages up to a sheet boundary
    pub pad_to_sheet: bool,
    pub pages_per_sheet: u32,
    pub duplex: bool,
}

impl PolyOptions {
    /// Pages printed on one physical sheet.
    pub fn sheet_size(&self) -> u32 {
        let per_side = self.pages_per_sheet.max(1);
        if self.duplex {
            per_side.saturating_mul(2)
        } else {
            per_side
        }
    }
}

impl Default for PolyOptions {
    fn default() -> Self {
        Self {
            pad_to_sheet: false,
            pages_per_sheet: 2,
            duplex: true,
        }
    }
}

impl From<&PolySettings> for PolyOptions {
    fn from(settings: &PolySettings) -> Self {
        Self {
            pad_to_sheet: settings.pad_to_sheet,
            pages_per_sheet: settings.pages_per_sheet,
            duplex: settings.duplex,
        }
    }
}

/// One document placed in a poly
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolyEntry {
    pub title: String,
    pub artifact: PathBuf,
    /// First page of the document, 1-based
    pub start_page: u32,
    pub page_count: u32,
    /// Blank pages appended after the document
    pub padding: u32,
}

/// Documents laid out in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolyBatch {
    pub entries: Vec<PolyEntry>,
    pub total_pages: u32,
}

/// Lay `inputs` out one after another, in the given order.
pub fn assemble(inputs: &[PolyInput], options: &PolyOptions) -> PolyBatch {
    let sheet = options.sheet_size();
    let mut next_page = 1;
    let mut entries = Vec::with_capacity(inputs.len());
    for input in inputs {
        let padding = if options.pad_to_sheet {
            (sheet - input.page_count % sheet) % sheet
        } else {
            0
        };
        entries.push(PolyEntry {
            title: input.title.clone(),
            artifact: input.artifact.clone(),
            start_page: next_page,
            page_count: input.page_count,
            padding,
        });
        next_page += input.page_count + padding;
    }
    PolyBatch {
        entries,
        total_pages: next_page - 1,
    }
}

/// Editable description of a poly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolyDescriptor {
    /// Base name of the generated files
    pub name: String,
    pub title: String,
    pub documents: Vec<DescriptorEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorEntry {
    pub title: String,
    /// Source file, relative to the descriptor
    pub source: PathBuf,
    /// Manifest of the compiled document, relative to the descriptor
    pub manifest: PathBuf,
}

impl PolyDescriptor {
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let descriptor: Self = serde_yaml::from_str(&text).map_err(|e| Error::Poly {
            message: format!("cannot parse {}: {}", path.display(), e),
            hint: Some("regenerate it with 'texcorpus poly init <dir>'".to_string()),
        })?;
        if descriptor.documents.is_empty() {
            return Err(Error::Poly {
                message: format!("{} lists no documents", path.display()),
                hint: None,
            });
        }
        Ok(descriptor)
    }
}

/// Table of contents written next to the master source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolyToc {
    pub name: String,
    pub title: String,
    pub total_pages: u32,
    pub documents: Vec<TocEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocEntry {
    pub title: String,
    pub start_page: u32,
    pub page_count: u32,
}

/// Files produced (or, in a dry run, that would be produced) by a poly build
#[derive(Debug, Clone)]
pub struct PolyBuild {
    pub batch: PolyBatch,
    pub master: PathBuf,
    pub toc: PathBuf,
    /// Final artifact; `None` in a dry run or when not rendered
    pub rendered: Option<RenderedArtifact>,
}

fn settings_for(stack: &ConfigStack, dir: &Path) -> Result<Settings> {
    let config = stack.resolve(dir)?;
    Settings::from_config(&config)
}

/// Write `<dir>/<poly.descriptor>` listing every compiled document under
/// `dir`. An existing descriptor is first copied to
/// `<dir>/<poly.backup_dir>/poly-<n>.yaml`.
///
/// Returns the descriptor path.
pub fn generate_descriptor(dir: &Path, stack: &ConfigStack, keys: &TexKeyMap) -> Result<PathBuf> {
    let settings = settings_for(stack, dir)?;
    let filter = ScanFilter::from_settings(&settings.batch)?;

    let mut documents = Vec::new();
    for source in scan_corpus(dir, &filter)? {
        let manifest = OutputPaths::for_source(&source, &settings).manifest;
        if !manifest.is_file() {
            warn!("{} has not been compiled; leaving it out", source.display());
            continue;
        }
        let document = Document::from_path_with_keys(&source, keys.clone())?;
        documents.push(DescriptorEntry {
            title: document.title(),
            source: relative_to(&source, dir),
            manifest: relative_to(&manifest, dir),
        });
    }
    if documents.is_empty() {
        return Err(Error::Poly {
            message: format!("no compiled documents under {}", dir.display()),
            hint: Some("run 'texcorpus compile' first".to_string()),
        });
    }

    let dir_name = dir
        .canonicalize()
        .ok()
        .and_then(|d| d.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "poly".to_string());
    let name = match slugify(&dir_name) {
        slug if slug.is_empty() => "poly".to_string(),
        slug => slug,
    };
    let descriptor = PolyDescriptor {
        name,
        title: dir_name,
        documents,
    };

    let path = dir.join(&settings.poly.descriptor);
    if path.is_file() {
        let backup = next_backup_path(&dir.join(&settings.poly.backup_dir))?;
        copy_file(&path, &backup)?;
        info!("Backed up {} to {}", path.display(), backup.display());
    }
    let text = format!(
        "# Reorder or retitle documents, then run 'texcorpus poly build'.\n{}",
        serde_yaml::to_string(&descriptor)?
    );
    write_atomic(&path, text.as_bytes())?;
    info!("Wrote {} ({} documents)", path.display(), descriptor.documents.len());
    Ok(path)
}

fn next_backup_path(backup_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(backup_dir)?;
    let mut n = 1;
    loop {
        let candidate = backup_dir.join(format!("poly-{}.yaml", n));
        if !candidate.exists() {
            return Ok(candidate);
        }
        n += 1;
    }
}

fn relative_to(path: &Path, base: &Path) -> PathBuf {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Build the poly described by `descriptor_path`. Without a renderer only
/// the master source and table of contents are written.
pub fn build_from_descriptor(
    descriptor_path: &Path,
    stack: &ConfigStack,
    renderer: Option<&dyn Renderer>,
    dry_run: bool,
) -> Result<PolyBuild> {
    let dir = descriptor_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let descriptor = PolyDescriptor::read(descriptor_path)?;
    let config = stack.resolve(dir)?;
    let settings = Settings::from_config(&config)?;

    let mut inputs = Vec::with_capacity(descriptor.documents.len());
    for entry in &descriptor.documents {
        let manifest_path = dir.join(&entry.manifest);
        let manifest = Manifest::read(&manifest_path).map_err(|e| Error::Poly {
            message: format!("'{}': {}", entry.title, e),
            hint: Some("compile the document before building the poly".to_string()),
        })?;
        let artifact = manifest.artifact_path(&manifest_path);
        if !dry_run && !artifact.is_file() {
            return Err(Error::Poly {
                message: format!("'{}': {} is missing", entry.title, artifact.display()),
                hint: Some("compile the document before building the poly".to_string()),
            });
        }
        inputs.push(PolyInput {
            title: entry.title.clone(),
            artifact,
            page_count: manifest.page_count,
        });
    }

    let batch = assemble(&inputs, &PolyOptions::from(&settings.poly));
    let base_name = format!("{}{}", descriptor.name, settings.poly.output_suffix);
    let master = dir.join(format!("{}.tex", base_name));
    let toc = dir.join(format!("{}.toc.yaml", base_name));
    debug!(
        "{} documents, {} pages",
        batch.entries.len(),
        batch.total_pages
    );

    if dry_run {
        info!("Would write {} and {}", master.display(), toc.display());
        return Ok(PolyBuild {
            batch,
            master,
            toc,
            rendered: None,
        });
    }

    let source = master_source(&descriptor.title, &batch, dir);
    write_atomic(&master, source.as_bytes())?;
    let toc_text = serde_yaml::to_string(&PolyToc {
        name: descriptor.name.clone(),
        title: descriptor.title.clone(),
        total_pages: batch.total_pages,
        documents: batch
            .entries
            .iter()
            .map(|e| TocEntry {
                title: e.title.clone(),
                start_page: e.start_page,
                page_count: e.page_count,
            })
            .collect(),
    })?;
    write_atomic(&toc, toc_text.as_bytes())?;

    let Some(renderer) = renderer else {
        info!("Wrote {} and {}", master.display(), toc.display());
        return Ok(PolyBuild {
            batch,
            master,
            toc,
            rendered: None,
        });
    };
    let paths = OutputPaths::for_source(&master, &settings);
    let request = RenderRequest {
        source_path: master.clone(),
        source,
        config,
        compilation: settings.compilation.clone(),
        assets: Vec::new(),
        build_dir: paths.build_dir,
    };
    let rendered = renderer.render(&request).map_err(|failure| Error::Poly {
        message: format!("rendering {} failed:\n{}", master.display(), failure),
        hint: None,
    })?;
    if rendered.path != paths.artifact {
        copy_file(&rendered.path, &paths.artifact)?;
    }
    info!(
        "Built {} ({} pages)",
        paths.artifact.display(),
        rendered.page_count
    );

    Ok(PolyBuild {
        batch,
        master,
        toc,
        rendered: Some(RenderedArtifact {
            path: paths.artifact,
            page_count: rendered.page_count,
        }),
    })
}

/// `pdfpages` master source including every entry of `batch`, with a PDF
/// bookmark per document.
pub fn master_source(title: &str, batch: &PolyBatch, dir: &Path) -> String {
    let mut tex = String::new();
    tex.push_str("\\documentclass[a4paper]{article}\n");
    tex.push_str("\\usepackage{pdfpages}\n");
    tex.push_str("\\usepackage[bookmarks=true]{hyperref}\n");
    tex.push_str(&format!("\\hypersetup{{pdftitle={{{}}}}}\n", escape_tex(title)));
    tex.push_str("\\begin{document}\n");
    for (n, entry) in batch.entries.iter().enumerate() {
        let pages = if entry.padding == 0 {
            "-".to_string()
        } else {
            format!("-{}", ",{}".repeat(entry.padding as usize))
        };
        let file = relative_to(&entry.artifact, dir)
            .to_string_lossy()
            .replace('\\', "/");
        tex.push_str(&format!(
            "% {}: page {}\n\\includepdf[pages={{{}}},addtotoc={{1,section,1,{{{}}},doc{}}}]{{{}}}\n",
            entry.title.replace(['\n', '\r'], " "),
            entry.start_page,
            pages,
            escape_tex(&entry.title),
            n + 1,
            file
        ));
    }
    tex.push_str("\\end{document}\n");
    tex
}

fn escape_tex(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\textbackslash{}"),
            '{' | '}' | '#' | '$' | '%' | '&' | '_' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '^' => escaped.push_str("\\^{}"),
            '~' => escaped.push_str("\\~{}"),
            '\n' | '\r' => escaped.push(' '),
            _ => escaped.push(c),
        }
    }
    escaped
}
