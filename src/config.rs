//! # Layered Configuration
//!
//! Every document is compiled with an *effective configuration* obtained by
//! overlaying, in increasing precedence:
//!
//! 1. **builtin** defaults embedded in the binary (`defaults.yaml`);
//! 2. the **installation** file (`~/.config/texcorpus/config.yaml` or
//!    `$TEXCORPUS_CONFIG`);
//! 3. the **secrets** file (`~/.config/texcorpus/secrets.toml` or
//!    `$TEXCORPUS_SECRETS`), restricted to [`SECRET_KEYS`];
//! 4. the nearest **directory** override, a `.texcorpus.yaml` found by
//!    walking upward from the document's directory.
//!
//! Layers are immutable mappings merged by [`overlay`]: mappings merge key by
//! key, scalars and lists are replaced, and a `key+:` list appends. The
//! resulting [`EffectiveConfig`] remembers which layer supplied each leaf.
//!
//! ## Failure policy
//!
//! A broken builtin layer is fatal when the stack is built. A broken
//! installation, secrets or directory layer is *not*: it is recorded and
//! every [`ConfigStack::resolve`] that depends on it fails with
//! [`Error::Config`] naming the layer and key path, so only the affected
//! documents are excluded from a batch.
//!
//! [`SECRET_KEYS`]: crate::defaults::SECRET_KEYS

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde_yaml::{Mapping, Value};

use crate::cache::LayerCache;
use crate::defaults;
use crate::error::{Error, Result};
use crate::merge::yaml::{key_to_string, overlay, split_marker, type_name, MergeConflict};
use crate::merge::{join_key_path, parse_key_path, KeySegment};

/// Precedence rank of a configuration layer, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LayerKind {
    Builtin,
    Installation,
    Secrets,
    Directory,
}

impl LayerKind {
    pub fn name(&self) -> &'static str {
        match self {
            LayerKind::Builtin => "builtin",
            LayerKind::Installation => "installation",
            LayerKind::Secrets => "secrets",
            LayerKind::Directory => "directory",
        }
    }
}

/// Where a layer came from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayerSource {
    pub kind: LayerKind,
    pub path: Option<PathBuf>,
}

impl LayerSource {
    pub fn builtin() -> Self {
        Self {
            kind: LayerKind::Builtin,
            path: None,
        }
    }

    pub fn file(kind: LayerKind, path: &Path) -> Self {
        Self {
            kind,
            path: Some(path.to_path_buf()),
        }
    }

    pub fn directory(path: &Path) -> Self {
        Self::file(LayerKind::Directory, path)
    }

    fn problem(&self, key_path: impl Into<String>, message: impl Into<String>) -> LayerProblem {
        LayerProblem {
            source: self.clone(),
            key_path: key_path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for LayerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{} ({})", self.kind.name(), path.display()),
            None => write!(f, "{}", self.kind.name()),
        }
    }
}

/// One parsed configuration layer
#[derive(Debug, Clone)]
pub struct Layer {
    pub source: LayerSource,
    pub values: Mapping,
}

/// Why a layer could not be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerProblem {
    pub source: LayerSource,
    pub key_path: String,
    pub message: String,
}

impl LayerProblem {
    pub fn to_error(&self) -> Error {
        Error::Config {
            layer: self.source.to_string(),
            key_path: self.key_path.clone(),
            message: self.message.clone(),
        }
    }
}

/// Result of loading one layer file
pub type LayerLoad = std::result::Result<Layer, LayerProblem>;

impl Layer {
    /// Parse a YAML layer. An empty document is an empty layer.
    pub fn parse_yaml(source: LayerSource, text: &str) -> LayerLoad {
        let value: Value =
            serde_yaml::from_str(text).map_err(|e| source.problem("", e.to_string()))?;
        Self::from_value(source, value)
    }

    /// Parse a TOML layer.
    pub fn parse_toml(source: LayerSource, text: &str) -> LayerLoad {
        let table: toml::Table = toml::from_str(text).map_err(|e| source.problem("", e.to_string()))?;
        let value = serde_yaml::to_value(table).map_err(|e| source.problem("", e.to_string()))?;
        Self::from_value(source, value)
    }

    fn from_value(source: LayerSource, value: Value) -> LayerLoad {
        let values = match value {
            Value::Null => Mapping::new(),
            Value::Mapping(map) => map,
            other => {
                return Err(source.problem(
                    "",
                    format!("expected a mapping at the top level, found {}", type_name(&other)),
                ))
            }
        };

        // Trial overlay catches misplaced append markers and unusable keys
        // while the layer is loaded rather than on every resolve.
        let mut scratch = Mapping::new();
        let mut provenance: BTreeMap<String, ()> = BTreeMap::new();
        overlay(&mut scratch, &values, "", &(), &mut provenance)
            .map_err(|MergeConflict { key_path, message }| source.problem(key_path, message))?;

        Ok(Layer { source, values })
    }

    /// Load a layer file. Returns `None` when the file does not exist.
    pub fn load_file(kind: LayerKind, path: &Path) -> Option<LayerLoad> {
        if !path.is_file() {
            return None;
        }
        let source = LayerSource::file(kind, path);
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => return Some(Err(source.problem("", e.to_string()))),
        };
        let is_toml = path.extension().is_some_and(|ext| ext == "toml");
        Some(if is_toml {
            Self::parse_toml(source, &text)
        } else {
            Self::parse_yaml(source, &text)
        })
    }

    /// Dotted paths of every leaf value in this layer, markers removed.
    pub fn leaf_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_leaves(&self.values, "", &mut out);
        out
    }
}

fn collect_leaves(map: &Mapping, prefix: &str, out: &mut Vec<String>) {
    for (key, value) in map {
        let Some(raw) = key_to_string(key) else {
            continue;
        };
        let path = join_key_path(prefix, split_marker(&raw).0);
        match value {
            Value::Mapping(inner) if !inner.is_empty() => collect_leaves(inner, &path, out),
            _ => out.push(path),
        }
    }
}

/// Builder for [`ConfigStack`]
#[derive(Debug, Default)]
pub struct ConfigStackBuilder {
    builtin: Option<String>,
    installation: Option<PathBuf>,
    secrets: Option<PathBuf>,
    ceiling: Option<PathBuf>,
    override_file: Option<String>,
}

impl ConfigStackBuilder {
    /// Replace the embedded builtin layer. Mostly useful in tests.
    pub fn builtin_text(mut self, text: impl Into<String>) -> Self {
        self.builtin = Some(text.into());
        self
    }

    pub fn installation_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.installation = Some(path.into());
        self
    }

    pub fn secrets_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.secrets = Some(path.into());
        self
    }

    /// Stop the upward search for directory overrides at this directory.
    pub fn ceiling(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ceiling = Some(dir.into());
        self
    }

    pub fn override_file_name(mut self, name: impl Into<String>) -> Self {
        self.override_file = Some(name.into());
        self
    }

    /// Build the stack. Only a broken builtin layer is an error here.
    pub fn build(self) -> Result<ConfigStack> {
        let builtin_text = self
            .builtin
            .unwrap_or_else(|| defaults::BUILTIN_CONFIG.to_string());
        let builtin = Layer::parse_yaml(LayerSource::builtin(), &builtin_text).map_err(|p| {
            Error::BuiltinConfig {
                message: if p.key_path.is_empty() {
                    p.message
                } else {
                    format!("{}: {}", p.key_path, p.message)
                },
            }
        })?;

        let mut base = Mapping::new();
        let mut base_provenance = BTreeMap::new();
        overlay(&mut base, &builtin.values, "", &builtin.source, &mut base_provenance).map_err(
            |c| Error::BuiltinConfig {
                message: format!("{}: {}", c.key_path, c.message),
            },
        )?;

        let mut base_problem = None;
        let installation = self
            .installation
            .and_then(|path| Layer::load_file(LayerKind::Installation, &path));
        let secrets = self
            .secrets
            .and_then(|path| Layer::load_file(LayerKind::Secrets, &path))
            .map(|load| load.and_then(restrict_secrets));

        for load in [installation, secrets].into_iter().flatten() {
            match load {
                Ok(layer) => {
                    debug!("Loaded {} layer", layer.source);
                    if let Err(c) =
                        overlay(&mut base, &layer.values, "", &layer.source, &mut base_provenance)
                    {
                        if base_problem.is_none() {
                            base_problem = Some(layer.source.problem(c.key_path, c.message));
                        }
                    }
                }
                Err(problem) => {
                    if base_problem.is_none() {
                        base_problem = Some(problem);
                    }
                }
            }
        }

        Ok(ConfigStack {
            base,
            base_provenance,
            base_problem,
            ceiling: self.ceiling,
            override_file: self
                .override_file
                .unwrap_or_else(|| defaults::DIRECTORY_OVERRIDE_FILE.to_string()),
            directory_layers: LayerCache::new(),
        })
    }
}

/// Reject any secrets key outside the allow-list.
fn restrict_secrets(layer: Layer) -> LayerLoad {
    for path in layer.leaf_paths() {
        if !defaults::SECRET_KEYS.contains(&path.as_str()) {
            return Err(layer.source.problem(
                path,
                format!(
                    "key is not allowed in the secrets layer (allowed: {})",
                    defaults::SECRET_KEYS.join(", ")
                ),
            ));
        }
    }
    Ok(layer)
}

/// The ordered configuration layers, ready to resolve per directory
#[derive(Debug)]
pub struct ConfigStack {
    base: Mapping,
    base_provenance: BTreeMap<String, LayerSource>,
    base_problem: Option<LayerProblem>,
    ceiling: Option<PathBuf>,
    override_file: String,
    directory_layers: LayerCache,
}

impl ConfigStack {
    pub fn builder() -> ConfigStackBuilder {
        ConfigStackBuilder::default()
    }

    /// Stack using the installation and secrets files from the environment.
    pub fn from_environment() -> Result<Self> {
        Self::builder()
            .installation_file(defaults::installation_config_path())
            .secrets_file(defaults::secrets_path())
            .build()
    }

    /// The problem with the installation or secrets layer, if any.
    pub fn base_problem(&self) -> Option<&LayerProblem> {
        self.base_problem.as_ref()
    }

    /// Effective configuration without any directory override.
    pub fn resolve_base(&self) -> Result<EffectiveConfig> {
        if let Some(problem) = &self.base_problem {
            return Err(problem.to_error());
        }
        Ok(EffectiveConfig {
            values: self.base.clone(),
            provenance: self.base_provenance.clone(),
            directory_file: None,
        })
    }

    /// Effective configuration for documents in `dir`.
    pub fn resolve(&self, dir: &Path) -> Result<EffectiveConfig> {
        let mut config = self.resolve_base()?;

        if let Some(path) = self.find_override(dir)? {
            let layer = self
                .directory_layers
                .get_or_load(&path, || {
                    Layer::load_file(LayerKind::Directory, &path).unwrap_or_else(|| {
                        Err(LayerSource::directory(&path).problem("", "override file disappeared"))
                    })
                })?
                .map_err(|problem| problem.to_error())?;

            overlay(
                &mut config.values,
                &layer.values,
                "",
                &layer.source,
                &mut config.provenance,
            )
            .map_err(|c| layer.source.problem(c.key_path, c.message).to_error())?;
            debug!("Applied {} to {}", layer.source, dir.display());
            config.directory_file = Some(path);
        }

        Ok(config)
    }

    /// Effective configuration for the document at `path`.
    pub fn resolve_for_document(&self, path: &Path) -> Result<EffectiveConfig> {
        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        self.resolve(dir)
    }

    /// Nearest override file at or above `dir`, not above the ceiling.
    pub fn find_override(&self, dir: &Path) -> Result<Option<PathBuf>> {
        let dir = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            std::env::current_dir()?.join(dir)
        };

        for ancestor in dir.ancestors() {
            let candidate = ancestor.join(&self.override_file);
            if candidate.is_file() {
                return Ok(Some(candidate));
            }
            if self.ceiling.as_deref() == Some(ancestor) {
                break;
            }
        }
        Ok(None)
    }

    /// Drop cached directory layers, e.g. after override files changed.
    pub fn invalidate(&self) -> Result<()> {
        self.directory_layers.clear()
    }
}

/// A resolved `(key, value, layer)` triple
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValue {
    pub key: String,
    pub value: Value,
    pub layer: LayerSource,
}

/// The merged configuration one document is compiled with
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    values: Mapping,
    provenance: BTreeMap<String, LayerSource>,
    directory_file: Option<PathBuf>,
}

impl EffectiveConfig {
    pub fn values(&self) -> &Mapping {
        &self.values
    }

    /// The directory override file that took part, if any.
    pub fn directory_file(&self) -> Option<&Path> {
        self.directory_file.as_deref()
    }

    /// Value at a dotted key path.
    pub fn get(&self, key_path: &str) -> Option<&Value> {
        let mut segments = parse_key_path(key_path).into_iter();
        let first = match segments.next()? {
            KeySegment::Key(key) => self.values.get(Value::String(key))?,
            KeySegment::Index(_) => return None,
        };
        segments.try_fold(first, |current, segment| match segment {
            KeySegment::Key(key) => current.as_mapping()?.get(Value::String(key)),
            KeySegment::Index(index) => current.as_sequence()?.get(index),
        })
    }

    /// Layer that supplied the value at `key_path`. Paths inside a list
    /// report the layer that supplied the list.
    pub fn provenance(&self, key_path: &str) -> Option<&LayerSource> {
        let mut prefix = String::new();
        let mut found = None;
        for segment in parse_key_path(key_path) {
            match segment {
                KeySegment::Key(key) => prefix = join_key_path(&prefix, &key),
                KeySegment::Index(_) => break,
            }
            if let Some(layer) = self.provenance.get(&prefix) {
                found = Some(layer);
            }
        }
        found
    }

    /// The value at `key_path` with its provenance.
    pub fn lookup(&self, key_path: &str) -> Option<ConfigValue> {
        let value = self.get(key_path)?.clone();
        let layer = self.provenance(key_path)?.clone();
        Some(ConfigValue {
            key: key_path.to_string(),
            value,
            layer,
        })
    }

    /// Every leaf with its provenance, sorted by key path.
    pub fn entries(&self) -> Vec<ConfigValue> {
        self.provenance
            .iter()
            .filter_map(|(key, layer)| {
                self.get(key).map(|value| ConfigValue {
                    key: key.clone(),
                    value: value.clone(),
                    layer: layer.clone(),
                })
            })
            .collect()
    }

    /// Stable JSON rendering of the merged values, used in fingerprints.
    pub fn canonical_json(&self) -> Result<String> {
        let sorted = serde_json::to_value(&self.values)?;
        Ok(serde_json::to_string(&sorted)?)
    }

    /// Required string value. Numbers and booleans are rendered as text.
    pub fn string(&self, key_path: &str) -> Result<String> {
        match self.get(key_path) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(Value::Bool(b)) => Ok(b.to_string()),
            Some(Value::Null) | None => Err(self.invalid(key_path, "key is not set")),
            Some(other) => Err(self.invalid(
                key_path,
                format!("expected a string, found {}", type_name(other)),
            )),
        }
    }

    /// Optional string value; null and empty strings are `None`.
    pub fn optional_string(&self, key_path: &str) -> Result<Option<String>> {
        match self.get(key_path) {
            Some(Value::Null) | None => Ok(None),
            Some(_) => {
                let s = self.string(key_path)?;
                Ok(if s.trim().is_empty() { None } else { Some(s) })
            }
        }
    }

    /// Boolean value. Accepts `true/false`, `1/0`, `yes/no`, `y/n`, `on/off`.
    pub fn boolean(&self, key_path: &str) -> Result<bool> {
        match self.get(key_path) {
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::Number(n)) if n.as_u64() == Some(0) => Ok(false),
            Some(Value::Number(n)) if n.as_u64() == Some(1) => Ok(true),
            Some(Value::String(s)) => parse_bool(s).ok_or_else(|| {
                self.invalid(key_path, format!("'{}' is not a boolean", s))
            }),
            Some(Value::Null) | None => Err(self.invalid(key_path, "key is not set")),
            Some(other) => Err(self.invalid(
                key_path,
                format!("expected a boolean, found {}", type_name(other)),
            )),
        }
    }

    /// Non-negative integer value.
    pub fn integer(&self, key_path: &str) -> Result<u64> {
        match self.get(key_path) {
            Some(Value::Number(n)) => n
                .as_u64()
                .ok_or_else(|| self.invalid(key_path, format!("{} is not a non-negative integer", n))),
            Some(Value::String(s)) => s
                .trim()
                .parse::<u64>()
                .map_err(|_| self.invalid(key_path, format!("'{}' is not an integer", s))),
            Some(Value::Null) | None => Err(self.invalid(key_path, "key is not set")),
            Some(other) => Err(self.invalid(
                key_path,
                format!("expected an integer, found {}", type_name(other)),
            )),
        }
    }

    /// List of strings. A plain string is split on commas.
    pub fn string_list(&self, key_path: &str) -> Result<Vec<String>> {
        match self.get(key_path) {
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(Value::String(s)) => Ok(s
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(String::from)
                .collect()),
            Some(Value::Sequence(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    Value::Number(n) => Ok(n.to_string()),
                    Value::Bool(b) => Ok(b.to_string()),
                    other => Err(self.invalid(
                        key_path,
                        format!("list items must be scalars, found {}", type_name(other)),
                    )),
                })
                .collect(),
            Some(other) => Err(self.invalid(
                key_path,
                format!("expected a list, found {}", type_name(other)),
            )),
        }
    }

    /// Config error for `key_path`, attributed to the layer that set it.
    pub(crate) fn invalid(&self, key_path: &str, message: impl Into<String>) -> Error {
        Error::Config {
            layer: self
                .provenance(key_path)
                .map(|l| l.to_string())
                .unwrap_or_else(|| "effective".to_string()),
            key_path: key_path.to_string(),
            message: message.into(),
        }
    }
}

/// Parse the boolean spellings accepted in configuration files.
pub fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}
