//! Rendering and transport collaborators
//!
//! The orchestrator drives two external systems through traits so tests can
//! substitute them:
//!
//! - [`Renderer`] turns a document source into an artifact and reports its
//!   page count. [`ExternalEngine`] runs the configured typesetting program.
//! - [`Transport`] delivers a packaged artifact and its manifest.
//!   [`LocalDirectoryTransport`] copies them into a directory,
//!   [`CommandTransport`] hands them to an external program.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, warn};
use regex::Regex;
use walkdir::WalkDir;

use crate::config::EffectiveConfig;
use crate::filesystem::copy_file;
use crate::settings::{CompilationSettings, TransportKind, TransportSettings};

/// Log line reporting the page count, e.g.
/// `Output written on _build/statics.pdf (3 pages, 48213 bytes).`
const PAGE_COUNT_PATTERN: &str = r"Output written on .*?\((\d+) pages?";

/// Environment variables passed to the command transport
pub const TRANSPORT_HOST_ENV: &str = "TEXCORPUS_TRANSPORT_HOST";
pub const TRANSPORT_USER_ENV: &str = "TEXCORPUS_TRANSPORT_USER";
pub const TRANSPORT_PASSWORD_ENV: &str = "TEXCORPUS_TRANSPORT_PASSWORD";

/// Everything a renderer needs for one document
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub source_path: PathBuf,
    pub source: String,
    pub config: EffectiveConfig,
    pub compilation: CompilationSettings,
    /// Files under the document's assets directory
    pub assets: Vec<PathBuf>,
    pub build_dir: PathBuf,
}

impl RenderRequest {
    pub fn stem(&self) -> String {
        self.source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArtifact {
    pub path: PathBuf,
    pub page_count: u32,
}

/// A failed render, with the engine's full diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderFailure {
    pub diagnostics: String,
}

impl fmt::Display for RenderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.diagnostics)
    }
}

/// Turns a document source into a paginated artifact.
pub trait Renderer: Send + Sync {
    fn render(&self, request: &RenderRequest) -> Result<RenderedArtifact, RenderFailure>;
}

/// Runs `compilation.engine` with `compilation.engine_args`,
/// `compilation.passes` times, from the source's directory.
///
/// Arguments may use `{source}` (source file name), `{stem}` and
/// `{build_dir}` placeholders.
#[derive(Debug, Clone, Default)]
pub struct ExternalEngine;

impl ExternalEngine {
    pub fn new() -> Self {
        Self
    }

    /// Engine arguments with placeholders substituted.
    ///
    /// `build_dir` must already be absolute: the engine runs from the
    /// source's directory, not from the caller's.
    fn arguments(request: &RenderRequest, build_dir: &Path) -> Vec<String> {
        let file_name = request
            .source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let build_dir = build_dir.display().to_string();
        let stem = request.stem();
        request
            .compilation
            .engine_args
            .iter()
            .map(|arg| {
                arg.replace("{source}", &file_name)
                    .replace("{stem}", &stem)
                    .replace("{build_dir}", &build_dir)
            })
            .collect()
    }
}

impl Renderer for ExternalEngine {
    fn render(&self, request: &RenderRequest) -> Result<RenderedArtifact, RenderFailure> {
        let absolute = |path: &Path| {
            std::path::absolute(path).map_err(|e| RenderFailure {
                diagnostics: format!("cannot resolve {}: {}", path.display(), e),
            })
        };
        let source_path = absolute(&request.source_path)?;
        let build_dir = absolute(&request.build_dir)?;
        let workdir = source_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&build_dir).map_err(|e| RenderFailure {
            diagnostics: format!("cannot create {}: {}", build_dir.display(), e),
        })?;

        let args = Self::arguments(request, &build_dir);
        let mut transcript = String::new();
        for pass in 1..=request.compilation.passes {
            debug!(
                "Pass {}: {} {}",
                pass,
                request.compilation.engine,
                args.join(" ")
            );
            let output = Command::new(&request.compilation.engine)
                .args(&args)
                .current_dir(&workdir)
                .output()
                .map_err(|e| RenderFailure {
                    diagnostics: format!(
                        "could not start '{}': {}",
                        request.compilation.engine, e
                    ),
                })?;
            transcript = format!(
                "{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
            if !output.status.success() {
                return Err(RenderFailure {
                    diagnostics: format!(
                        "{} exited with {} on pass {}\n{}",
                        request.compilation.engine,
                        output.status,
                        pass,
                        transcript.trim_end()
                    ),
                });
            }
        }

        let stem = request.stem();
        let artifact = build_dir.join(format!("{}.pdf", stem));
        if !artifact.is_file() {
            return Err(RenderFailure {
                diagnostics: format!(
                    "engine succeeded but {} was not produced\n{}",
                    artifact.display(),
                    transcript.trim_end()
                ),
            });
        }

        let log = fs::read_to_string(build_dir.join(format!("{}.log", stem)))
            .unwrap_or_default();
        let page_count = page_count_from_log(&log)
            .or_else(|| page_count_from_log(&transcript))
            .or_else(|| fs::read(&artifact).ok().and_then(|b| page_count_from_pdf(&b)))
            .ok_or_else(|| RenderFailure {
                diagnostics: format!("could not determine the page count of {}", artifact.display()),
            })?;

        Ok(RenderedArtifact {
            path: artifact,
            page_count,
        })
    }
}

/// Page count from an engine log. TeX wraps long log lines, so line breaks
/// are ignored.
pub fn page_count_from_log(log: &str) -> Option<u32> {
    let pattern = Regex::new(PAGE_COUNT_PATTERN).ok()?;
    let joined: String = log.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    pattern
        .captures_iter(&joined)
        .last()
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Rough page count of a PDF: the number of `/Type /Page` objects.
pub fn page_count_from_pdf(bytes: &[u8]) -> Option<u32> {
    let mut count = 0u32;
    for needle in [b"/Type /Page".as_slice(), b"/Type/Page".as_slice()] {
        let mut i = 0;
        while i + needle.len() <= bytes.len() {
            if &bytes[i..i + needle.len()] == needle {
                // `/Type /Pages` is the page tree, not a page
                if bytes.get(i + needle.len()) != Some(&b's') {
                    count += 1;
                }
                i += needle.len();
            } else {
                i += 1;
            }
        }
    }
    (count > 0).then_some(count)
}

/// Files under `assets_dir`, resolved against the source's directory.
pub fn resolve_assets(source_path: &Path, assets_dir: &Path) -> Vec<PathBuf> {
    let dir = match source_path.parent() {
        Some(parent) => parent.join(assets_dir),
        None => assets_dir.to_path_buf(),
    };
    if !dir.is_dir() {
        return Vec::new();
    }
    WalkDir::new(&dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}

/// A failed delivery. The packaged artifact and manifest stay valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchFailure {
    pub message: String,
}

impl fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Delivers packaged artifacts to remote storage.
pub trait Transport: Send + Sync {
    fn deliver(&self, artifact: &Path, manifest: &Path) -> Result<(), DispatchFailure>;

    /// Where artifacts go, for reports
    fn describe(&self) -> String;
}

/// Copies artifact and manifest into a directory
#[derive(Debug, Clone)]
pub struct LocalDirectoryTransport {
    target_dir: PathBuf,
}

impl LocalDirectoryTransport {
    pub fn new(target_dir: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
        }
    }
}

impl Transport for LocalDirectoryTransport {
    fn deliver(&self, artifact: &Path, manifest: &Path) -> Result<(), DispatchFailure> {
        for file in [artifact, manifest] {
            let name = file.file_name().ok_or_else(|| DispatchFailure {
                message: format!("{} has no file name", file.display()),
            })?;
            copy_file(file, &self.target_dir.join(name)).map_err(|e| DispatchFailure {
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.target_dir.display().to_string()
    }
}

/// Runs `transport.command <artifact> <manifest>`, with host and
/// credentials in the environment
#[derive(Clone)]
pub struct CommandTransport {
    program: String,
    args: Vec<String>,
    host: Option<String>,
    user: Option<String>,
    password: Option<String>,
}

impl fmt::Debug for CommandTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandTransport")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Transport for CommandTransport {
    fn deliver(&self, artifact: &Path, manifest: &Path) -> Result<(), DispatchFailure> {
        let mut command = Command::new(&self.program);
        command.args(&self.args).arg(artifact).arg(manifest);
        for (name, value) in [
            (TRANSPORT_HOST_ENV, &self.host),
            (TRANSPORT_USER_ENV, &self.user),
            (TRANSPORT_PASSWORD_ENV, &self.password),
        ] {
            if let Some(value) = value {
                command.env(name, value);
            }
        }
        let output = command.output().map_err(|e| DispatchFailure {
            message: format!("could not start '{}': {}", self.program, e),
        })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(DispatchFailure {
                message: format!(
                    "'{}' exited with {}: {}",
                    self.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            })
        }
    }

    fn describe(&self) -> String {
        match &self.host {
            Some(host) => format!("{} ({})", self.program, host),
            None => self.program.clone(),
        }
    }
}

/// The transport configured by `transport.kind`, or `None` when dispatch is
/// disabled.
pub fn transport_from_settings(settings: &TransportSettings) -> Option<Box<dyn Transport>> {
    match settings.kind {
        TransportKind::None => None,
        TransportKind::Local => {
            let dir = settings.target_dir.clone()?;
            Some(Box::new(LocalDirectoryTransport::new(dir)))
        }
        TransportKind::Command => {
            let command = settings.command.as_deref()?;
            let mut words = command.split_whitespace().map(String::from);
            let Some(program) = words.next() else {
                warn!("transport.command is blank; dispatch disabled");
                return None;
            };
            Some(Box::new(CommandTransport {
                program,
                args: words.collect(),
                host: settings.host.clone(),
                user: settings.user.clone(),
                password: settings.password.clone(),
            }))
        }
    }
}
