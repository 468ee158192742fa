//! Typed views over an [`EffectiveConfig`].
//!
//! The pipeline reads configuration through these structs so that a bad
//! value surfaces once, at the `ConfigResolved` stage, as a configuration
//! error naming the key and the layer that supplied it.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::EffectiveConfig;
use crate::error::Result;
use crate::phases::Mode;

/// Largest `poly.pages_per_sheet` accepted
pub const MAX_PAGES_PER_SHEET: u32 = 16;

/// Everything the pipeline needs from one document's configuration
#[derive(Debug, Clone)]
pub struct Settings {
    pub metadata: MetadataDefaults,
    pub identity: IdentitySettings,
    pub compilation: CompilationSettings,
    pub naming: NamingSettings,
    pub manifest: ManifestSettings,
    pub batch: BatchSettings,
    pub poly: PolySettings,
    pub transport: TransportSettings,
    pub remote: RemoteSettings,
}

impl Settings {
    pub fn from_config(config: &EffectiveConfig) -> Result<Self> {
        Ok(Self {
            metadata: MetadataDefaults::from_config(config)?,
            identity: IdentitySettings::from_config(config)?,
            compilation: CompilationSettings::from_config(config)?,
            naming: NamingSettings {
                pattern: config.string("naming.pattern")?,
            },
            manifest: ManifestSettings {
                mandatory_keys: config.string_list("manifest.mandatory_keys")?,
            },
            batch: BatchSettings::from_config(config)?,
            poly: PolySettings::from_config(config)?,
            transport: TransportSettings::from_config(config)?,
            remote: RemoteSettings {
                command: config.optional_string("remote.command")?,
                token: config.optional_string("remote.token")?,
            },
        })
    }
}

/// Fallback metadata for documents that leave keys unset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataDefaults {
    pub doc_type: String,
    pub variant: String,
    pub version: String,
}

impl MetadataDefaults {
    fn from_config(config: &EffectiveConfig) -> Result<Self> {
        Ok(Self {
            doc_type: config.string("metadata.defaults.doc_type")?,
            variant: config.string("metadata.defaults.variant")?,
            version: config.string("metadata.defaults.version")?,
        })
    }
}

/// What to do when the remote authority cannot confirm an existing identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownPolicy {
    /// Log a warning and keep going
    Warn,
    /// Fail the document
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentitySettings {
    pub prefix: String,
    pub attempts: u32,
    pub remote_timeout: Duration,
    pub unknown_normal: UnknownPolicy,
    pub unknown_quick: UnknownPolicy,
    pub unknown_deep: UnknownPolicy,
}

impl IdentitySettings {
    fn from_config(config: &EffectiveConfig) -> Result<Self> {
        let policy = |key: &str| -> Result<UnknownPolicy> {
            match config.string(key)?.trim().to_lowercase().as_str() {
                "warn" => Ok(UnknownPolicy::Warn),
                "fail" => Ok(UnknownPolicy::Fail),
                other => Err(config.invalid(
                    key,
                    format!("'{}' is not a policy (expected 'warn' or 'fail')", other),
                )),
            }
        };

        let attempts = bounded(config, "identity.attempts", 1)?;
        Ok(Self {
            prefix: config.string("identity.prefix")?,
            attempts,
            remote_timeout: Duration::from_secs(config.integer("identity.remote_timeout_secs")?),
            unknown_normal: policy("identity.on_remote_unknown.normal")?,
            unknown_quick: policy("identity.on_remote_unknown.quick")?,
            unknown_deep: policy("identity.on_remote_unknown.deep")?,
        })
    }

    /// Policy applied when re-validating an existing identity in `mode`.
    pub fn unknown_policy(&self, mode: Mode) -> UnknownPolicy {
        match mode {
            Mode::Normal => self.unknown_normal,
            Mode::Quick => self.unknown_quick,
            Mode::Deep => self.unknown_deep,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationSettings {
    pub ignore: bool,
    pub auto_rename: bool,
    pub engine: String,
    pub engine_args: Vec<String>,
    pub passes: u32,
    pub build_dir: PathBuf,
    pub output_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub package_sources: bool,
    pub dispatch: bool,
}

impl CompilationSettings {
    fn from_config(config: &EffectiveConfig) -> Result<Self> {
        let engine = config.string("compilation.engine")?;
        if engine.trim().is_empty() {
            return Err(config.invalid("compilation.engine", "engine must not be empty"));
        }
        Ok(Self {
            ignore: config.boolean("compilation.ignore")?,
            auto_rename: config.boolean("compilation.auto_rename")?,
            engine,
            engine_args: config.string_list("compilation.engine_args")?,
            passes: bounded(config, "compilation.passes", 1)?,
            build_dir: PathBuf::from(config.string("compilation.build_dir")?),
            output_dir: PathBuf::from(config.string("compilation.output_dir")?),
            assets_dir: PathBuf::from(config.string("compilation.assets_dir")?),
            package_sources: config.boolean("compilation.package_sources")?,
            dispatch: config.boolean("compilation.dispatch")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingSettings {
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestSettings {
    pub mandatory_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSettings {
    pub extensions: Vec<String>,
    pub exclude: Vec<String>,
    pub parallel: bool,
}

impl BatchSettings {
    fn from_config(config: &EffectiveConfig) -> Result<Self> {
        let exclude = config.string_list("batch.exclude")?;
        for pattern in &exclude {
            glob::Pattern::new(pattern).map_err(|e| {
                config.invalid("batch.exclude", format!("invalid glob '{}': {}", pattern, e))
            })?;
        }
        Ok(Self {
            extensions: config
                .string_list("batch.extensions")?
                .into_iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            exclude,
            parallel: config.boolean("batch.parallel")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolySettings {
    pub descriptor: String,
    pub backup_dir: String,
    pub output_suffix: String,
    pub pad_to_sheet: bool,
    pub pages_per_sheet: u32,
    pub duplex: bool,
}

impl PolySettings {
    fn from_config(config: &EffectiveConfig) -> Result<Self> {
        Ok(Self {
            descriptor: config.string("poly.descriptor")?,
            backup_dir: config.string("poly.backup_dir")?,
            output_suffix: config.string("poly.output_suffix")?,
            pad_to_sheet: config.boolean("poly.pad_to_sheet")?,
            pages_per_sheet: within(config, "poly.pages_per_sheet", 1, MAX_PAGES_PER_SHEET)?,
            duplex: config.boolean("poly.duplex")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Artifacts are never dispatched
    None,
    /// Copy artifact and manifest into a directory
    Local,
    /// Hand artifact and manifest to an external program
    Command,
}

#[derive(Clone, PartialEq, Eq)]
pub struct TransportSettings {
    pub kind: TransportKind,
    pub target_dir: Option<PathBuf>,
    pub command: Option<String>,
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl TransportSettings {
    fn from_config(config: &EffectiveConfig) -> Result<Self> {
        let kind = match config.string("transport.kind")?.trim().to_lowercase().as_str() {
            "none" | "" => TransportKind::None,
            "local" => TransportKind::Local,
            "command" => TransportKind::Command,
            other => {
                return Err(config.invalid(
                    "transport.kind",
                    format!("unknown transport '{}' (expected none, local or command)", other),
                ))
            }
        };
        let settings = Self {
            kind,
            target_dir: config.optional_string("transport.target_dir")?.map(PathBuf::from),
            command: config.optional_string("transport.command")?,
            host: config.optional_string("transport.host")?,
            user: config.optional_string("transport.user")?,
            password: config.optional_string("transport.password")?,
        };
        match settings.kind {
            TransportKind::Local if settings.target_dir.is_none() => Err(config.invalid(
                "transport.target_dir",
                "the local transport needs a target directory",
            )),
            TransportKind::Command if settings.command.is_none() => Err(config.invalid(
                "transport.command",
                "the command transport needs a command",
            )),
            _ => Ok(settings),
        }
    }
}

impl fmt::Debug for TransportSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSettings")
            .field("kind", &self.kind)
            .field("target_dir", &self.target_dir)
            .field("command", &self.command)
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct RemoteSettings {
    pub command: Option<String>,
    pub token: Option<String>,
}

impl fmt::Debug for RemoteSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSettings")
            .field("command", &self.command)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}

fn within(config: &EffectiveConfig, key: &str, min: u32, max: u32) -> Result<u32> {
    let value = bounded(config, key, min)?;
    if value > max {
        return Err(config.invalid(key, format!("{} is out of range (maximum {})", value, max)));
    }
    Ok(value)
}

fn bounded(config: &EffectiveConfig, key: &str, min: u32) -> Result<u32> {
    let value = config.integer(key)?;
    match u32::try_from(value) {
        Ok(v) if v >= min => Ok(v),
        _ => Err(config.invalid(key, format!("{} is out of range (minimum {})", value, min))),
    }
}
