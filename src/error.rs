//! # Error Handling
//!
//! This module defines the centralized error type for the `texcorpus`
//! library. It uses `thiserror` to derive an `Error` enum covering every
//! failure that can escape a library call, with contextual fields so the
//! CLI can print precise diagnostics.
//!
//! Two families of failure exist and are deliberately kept apart:
//!
//! - **`Error`**: something went wrong while performing an operation
//!   (reading a layer file, saving a document, writing a manifest). These
//!   propagate with `?`.
//! - **`FailureKind`**: the classified reason a single document did not make
//!   it through the compilation pipeline. These are values recorded in a
//!   batch report, never raised, so one document cannot abort a batch.
//!
//! `Result<T>` is the usual alias for `std::result::Result<T, Error>`.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Main error type for texcorpus operations
#[derive(Error, Debug)]
pub enum Error {
    /// A configuration layer could not be loaded or contains an invalid key.
    ///
    /// Names the layer and the key path so the operator can locate the
    /// problem. `key_path` is empty when the whole document is unreadable.
    #[error("Configuration error in {layer} layer{}: {message}", if key_path.is_empty() { String::new() } else { format!(" at '{}'", key_path) })]
    Config {
        layer: String,
        key_path: String,
        message: String,
    },

    /// The embedded default configuration is broken. This indicates a
    /// broken installation and is fatal for the whole process.
    #[error("Builtin configuration is invalid: {message}")]
    BuiltinConfig { message: String },

    /// A metadata value could not be written back into a document source.
    #[error("Metadata error in {}: {message}", path.display())]
    Metadata { path: PathBuf, message: String },

    /// Identity assignment or validation could not complete.
    #[error("Identity error: {message}")]
    Identity { message: String },

    /// A poly descriptor or assembly problem.
    #[error("Poly error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    Poly {
        message: String,
        /// Optional hint for how to fix the descriptor
        hint: Option<String>,
    },

    /// A manifest could not be read or was not produced by this tool.
    #[error("Manifest error in {}: {message}", path.display())]
    Manifest { path: PathBuf, message: String },

    /// A filesystem operation on the corpus failed.
    #[error("Filesystem operation error: {message}")]
    Filesystem { message: String },

    /// A shared lock was poisoned by a panicking thread.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML error, wrapped from `serde_yaml::Error`.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A JSON error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A TOML parse error, wrapped from `toml::de::Error`.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// An invalid glob pattern, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    /// A directory walk error, wrapped from `walkdir::Error`.
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Classified reason for a per-document pipeline failure.
///
/// Recorded in the batch report alongside the stage that could not be
/// reached. Dispatch failures have their own kind because the packaged
/// artifact and manifest stay valid and the dispatch can be retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// A configuration layer for this document is malformed.
    Config(String),
    /// The document's identity is used by other documents.
    IdentityCollision { identity: String, others: Vec<PathBuf> },
    /// The remote authority reports the identity as registered elsewhere.
    RemoteTaken { identity: String },
    /// The remote authority could not be reached or did not answer in time.
    RemoteUnknown { identity: String },
    /// A new identity could not be assigned.
    Identity(String),
    /// The rendering engine failed; carries its full diagnostics.
    Render { diagnostics: String },
    /// The transport could not deliver the artifact.
    Dispatch(String),
    /// A local filesystem operation failed.
    Io(String),
    /// The batch was cancelled before this stage started.
    Cancelled,
}

impl FailureKind {
    /// Short label for summaries.
    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::Config(_) => "config",
            FailureKind::IdentityCollision { .. } => "identity-collision",
            FailureKind::RemoteTaken { .. } => "remote-taken",
            FailureKind::RemoteUnknown { .. } => "remote-unknown",
            FailureKind::Identity(_) => "identity",
            FailureKind::Render { .. } => "render",
            FailureKind::Dispatch(_) => "dispatch",
            FailureKind::Io(_) => "io",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Config(message) => write!(f, "{}", message),
            FailureKind::IdentityCollision { identity, others } => {
                let paths: Vec<String> = others.iter().map(|p| p.display().to_string()).collect();
                write!(
                    f,
                    "identity '{}' is also used by: {}",
                    identity,
                    paths.join(", ")
                )
            }
            FailureKind::RemoteTaken { identity } => {
                write!(f, "identity '{}' is registered to another document", identity)
            }
            FailureKind::RemoteUnknown { identity } => write!(
                f,
                "remote authority did not confirm identity '{}'",
                identity
            ),
            FailureKind::Identity(message) => write!(f, "{}", message),
            FailureKind::Render { diagnostics } => write!(f, "render failed: {}", diagnostics),
            FailureKind::Dispatch(message) => write!(f, "dispatch failed: {}", message),
            FailureKind::Io(message) => write!(f, "{}", message),
            FailureKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl From<Error> for FailureKind {
    fn from(error: Error) -> Self {
        match error {
            Error::Config { .. } | Error::BuiltinConfig { .. } => {
                FailureKind::Config(error.to_string())
            }
            Error::Identity { message } => FailureKind::Identity(message),
            other => FailureKind::Io(other.to_string()),
        }
    }
}
