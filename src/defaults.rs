//! Default values for texcorpus configuration.
//!
//! This module provides the builtin configuration layer and the locations
//! of the installation-wide files, so every command resolves configuration
//! the same way.

use std::env;
use std::path::PathBuf;

/// The builtin configuration layer, embedded at compile time.
pub const BUILTIN_CONFIG: &str = include_str!("defaults.yaml");

/// Name of the per-directory override file, searched from a document's
/// directory upward.
pub const DIRECTORY_OVERRIDE_FILE: &str = ".texcorpus.yaml";

/// File name of the installation layer inside the config directory.
pub const INSTALLATION_FILE: &str = "config.yaml";

/// File name of the secrets layer inside the config directory.
pub const SECRETS_FILE: &str = "secrets.toml";

/// Keys the secrets layer is allowed to set. Anything else in the secrets
/// file is rejected.
pub const SECRET_KEYS: &[&str] = &[
    "transport.user",
    "transport.password",
    "transport.host",
    "remote.token",
];

/// Environment variable overriding the installation layer path.
pub const CONFIG_ENV: &str = "TEXCORPUS_CONFIG";

/// Environment variable overriding the secrets layer path.
pub const SECRETS_ENV: &str = "TEXCORPUS_SECRETS";

/// Returns the directory holding installation-wide configuration.
///
/// - Linux: `~/.config/texcorpus`
/// - macOS: `~/Library/Application Support/texcorpus`
/// - Windows: `{FOLDERID_RoamingAppData}\texcorpus`
///
/// Falls back to `.texcorpus` in the current directory if the platform
/// directory cannot be determined.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".texcorpus"))
        .join("texcorpus")
}

/// Path of the installation layer, honouring `TEXCORPUS_CONFIG`.
pub fn installation_config_path() -> PathBuf {
    env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| config_dir().join(INSTALLATION_FILE))
}

/// Path of the secrets layer, honouring `TEXCORPUS_SECRETS`.
pub fn secrets_path() -> PathBuf {
    env::var_os(SECRETS_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| config_dir().join(SECRETS_FILE))
}
