//! Manifest sidecars
//!
//! Each packaged artifact `<stem>.pdf` has a `<stem>.manifest.json` next
//! to it describing what was built: the document identity and version, a
//! fingerprint of everything that went into the build, and the page count
//! the poly assembler relies on.
//!
//! Manifests are pretty-printed JSON with a trailing newline, always
//! written atomically. Reading a manifest and writing it back gives the same
//! bytes.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::EffectiveConfig;
use crate::error::{Error, Result};
use crate::filesystem::write_atomic;
use crate::metadata::Metadata;

/// Current manifest schema version
pub const MANIFEST_SCHEMA: u32 = 1;

/// Suffix appended to the artifact stem for the manifest file name
pub const MANIFEST_SUFFIX: &str = ".manifest.json";

/// Configuration sections that do not affect the built artifact. They are
/// left out of fingerprints so that rotating a credential does not trigger
/// rebuilds.
const NON_BUILD_SECTIONS: &[&str] = &["transport", "remote"];

/// Build record of one packaged artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub schema: u32,
    /// Document version (`version` metadata key or its default)
    pub version: String,
    pub identity: Option<String>,
    /// Fingerprint of the source text and build configuration
    pub fingerprint: String,
    /// Fingerprint of the mandatory metadata keys
    pub parameters_fingerprint: String,
    /// Whether a mandatory key changed since the previous manifest
    pub mandatory_parameter_change: bool,
    pub page_count: u32,
    /// Artifact file name, relative to the manifest's directory
    pub artifact: String,
}

/// Fields of a manifest about to be written
#[derive(Debug, Clone)]
pub struct ManifestDraft {
    pub version: String,
    pub identity: Option<String>,
    pub fingerprint: String,
    pub parameters_fingerprint: String,
    pub page_count: u32,
    pub artifact: String,
}

impl Manifest {
    /// Manifest for a new build, given the one it replaces.
    ///
    /// An unchanged build (same fingerprints, same artifact and page count)
    /// reproduces the previous manifest exactly, so repeated runs on an
    /// unchanged corpus leave manifests untouched.
    pub fn next(draft: ManifestDraft, previous: Option<&Manifest>) -> Self {
        if let Some(previous) = previous {
            let unchanged = previous.fingerprint == draft.fingerprint
                && previous.parameters_fingerprint == draft.parameters_fingerprint
                && previous.page_count == draft.page_count
                && previous.artifact == draft.artifact
                && previous.identity == draft.identity
                && previous.version == draft.version;
            if unchanged {
                return previous.clone();
            }
        }
        let mandatory_parameter_change =
            previous.map_or(true, |p| p.parameters_fingerprint != draft.parameters_fingerprint);
        Self {
            schema: MANIFEST_SCHEMA,
            version: draft.version,
            identity: draft.identity,
            fingerprint: draft.fingerprint,
            parameters_fingerprint: draft.parameters_fingerprint,
            mandatory_parameter_change,
            page_count: draft.page_count,
            artifact: draft.artifact,
        }
    }

    /// Serialized form: pretty JSON and a trailing newline.
    pub fn to_json(&self) -> Result<String> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        Ok(text)
    }

    pub fn from_json(path: &Path, text: &str) -> Result<Self> {
        let manifest: Self = serde_json::from_str(text).map_err(|e| Error::Manifest {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        if manifest.schema != MANIFEST_SCHEMA {
            return Err(Error::Manifest {
                path: path.to_path_buf(),
                message: format!(
                    "unsupported schema {} (expected {})",
                    manifest.schema, MANIFEST_SCHEMA
                ),
            });
        }
        Ok(manifest)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::Manifest {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_json(path, &text)
    }

    /// Read a manifest if the file exists.
    pub fn read_optional(path: &Path) -> Result<Option<Self>> {
        if path.is_file() {
            Self::read(path).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Atomically write the manifest. Returns `false` when the file already
    /// held exactly these bytes and was left alone.
    pub fn write(&self, path: &Path) -> Result<bool> {
        let text = self.to_json()?;
        if fs::read_to_string(path).ok().as_deref() == Some(text.as_str()) {
            return Ok(false);
        }
        write_atomic(path, text.as_bytes())?;
        Ok(true)
    }

    /// Absolute path of the artifact, given where the manifest lives.
    pub fn artifact_path(&self, manifest_path: &Path) -> PathBuf {
        manifest_path
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(&self.artifact)
    }
}

/// `<dir>/<stem>.manifest.json`
pub fn manifest_path(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{}{}", stem, MANIFEST_SUFFIX))
}

/// Stem of the document a manifest file describes.
pub fn stem_of_manifest(path: &Path) -> Option<String> {
    path.file_name()?
        .to_str()?
        .strip_suffix(MANIFEST_SUFFIX)
        .map(String::from)
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}

/// Fingerprint of a document build: its source text plus the build-relevant
/// part of its configuration.
pub fn content_fingerprint(source: &str, config: &EffectiveConfig) -> Result<String> {
    let mut values = serde_json::to_value(config.values())?;
    if let Some(object) = values.as_object_mut() {
        for section in NON_BUILD_SECTIONS {
            object.remove(*section);
        }
    }
    let mut bytes = source.as_bytes().to_vec();
    bytes.push(0);
    bytes.extend_from_slice(serde_json::to_string(&values)?.as_bytes());
    Ok(sha256_hex(&bytes))
}

/// Fingerprint of the mandatory metadata keys. Missing keys count as null.
pub fn parameters_fingerprint(metadata: &Metadata, mandatory_keys: &[String]) -> Result<String> {
    let selected: BTreeMap<&str, Option<serde_json::Value>> = mandatory_keys
        .iter()
        .map(|key| -> std::result::Result<_, serde_json::Error> {
            let value = metadata
                .get(key)
                .map(serde_json::to_value)
                .transpose()?;
            Ok((key.as_str(), value))
        })
        .collect::<std::result::Result<_, serde_json::Error>>()?;
    Ok(sha256_hex(serde_json::to_string(&selected)?.as_bytes()))
}
