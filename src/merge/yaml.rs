//! Key-wise overlay of YAML configuration layers
//!
//! ## Rules
//!
//! - Mappings merge recursively: the overriding layer only replaces the keys
//!   it sets, every other key keeps its earlier value.
//! - Scalars and lists are replaced wholesale by default.
//! - A key written with a trailing `+` (`exclude+: [...]`) appends its list
//!   to the existing one, skipping items already present.
//! - Every leaf records the layer that last wrote it.
//!
//! ## Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use texcorpus::merge::yaml::overlay;
//!
//! let base: serde_yaml::Mapping = serde_yaml::from_str("batch:\n  exclude: ['_build']\n  parallel: true").unwrap();
//! let over: serde_yaml::Mapping = serde_yaml::from_str("batch:\n  exclude+: ['_bak']").unwrap();
//!
//! let mut merged = serde_yaml::Mapping::new();
//! let mut provenance = BTreeMap::new();
//! overlay(&mut merged, &base, "", &"builtin", &mut provenance).unwrap();
//! overlay(&mut merged, &over, "", &"directory", &mut provenance).unwrap();
//!
//! assert_eq!(provenance["batch.exclude"], "directory");
//! assert_eq!(provenance["batch.parallel"], "builtin");
//! ```

use std::collections::BTreeMap;

use log::{debug, warn};
use serde_yaml::{Mapping, Value};

use super::join_key_path;

/// Suffix on a key that switches list merging from replace to append.
pub const APPEND_MARKER: char = '+';

/// How a list-valued key in an overriding layer combines with the earlier value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMergeMode {
    /// The overriding list replaces the earlier one
    Replace,
    /// Items are appended unless already present
    AppendUnique,
}

/// A layer that cannot be overlaid, with the offending key path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    pub key_path: String,
    pub message: String,
}

/// Strip the append marker from a raw key.
pub fn split_marker(raw: &str) -> (&str, ListMergeMode) {
    match raw.strip_suffix(APPEND_MARKER) {
        Some(base) if !base.trim().is_empty() => (base.trim_end(), ListMergeMode::AppendUnique),
        _ => (raw, ListMergeMode::Replace),
    }
}

/// Render a scalar mapping key as a string. Non-scalar keys are rejected.
pub fn key_to_string(key: &Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Overlay `source` onto `target`, recording `origin` for every leaf written.
///
/// `prefix` is the key path of `target` within the whole configuration and
/// is only used for provenance and error reporting.
pub fn overlay<L: Clone>(
    target: &mut Mapping,
    source: &Mapping,
    prefix: &str,
    origin: &L,
    provenance: &mut BTreeMap<String, L>,
) -> Result<(), MergeConflict> {
    for (raw_key, value) in source {
        let raw = key_to_string(raw_key).ok_or_else(|| MergeConflict {
            key_path: prefix.to_string(),
            message: format!("unsupported {} mapping key", type_name(raw_key)),
        })?;
        let (key, mode) = split_marker(&raw);
        let path = join_key_path(prefix, key);
        let slot = Value::String(key.to_string());

        if mode == ListMergeMode::AppendUnique {
            let Value::Sequence(items) = value else {
                return Err(MergeConflict {
                    key_path: path,
                    message: format!(
                        "append marker '{}' requires a list, found {}",
                        APPEND_MARKER,
                        type_name(value)
                    ),
                });
            };
            match target.get_mut(&slot) {
                Some(Value::Sequence(existing)) => {
                    for item in items {
                        if !existing.contains(item) {
                            existing.push(item.clone());
                        }
                    }
                }
                Some(other) => {
                    warn!(
                        "Appending to '{}' which holds a {}; replacing it with the list",
                        path,
                        type_name(other)
                    );
                    *other = value.clone();
                }
                None => {
                    target.insert(slot, value.clone());
                }
            }
            forget(provenance, &path);
            provenance.insert(path, origin.clone());
            continue;
        }

        let existing_is_mapping = matches!(target.get(&slot), Some(Value::Mapping(_)));
        match value {
            Value::Mapping(incoming) if existing_is_mapping => {
                if let Some(Value::Mapping(existing)) = target.get_mut(&slot) {
                    overlay(existing, incoming, &path, origin, provenance)?;
                }
            }
            Value::Mapping(incoming) => {
                forget(provenance, &path);
                let mut fresh = Mapping::new();
                overlay(&mut fresh, incoming, &path, origin, provenance)?;
                if fresh.is_empty() {
                    provenance.insert(path.clone(), origin.clone());
                }
                target.insert(slot, Value::Mapping(fresh));
            }
            _ => {
                if let Some(previous) = target.get(&slot) {
                    if existing_is_mapping || previous.is_sequence() {
                        debug!(
                            "Layer replaces {} at '{}' with {}",
                            type_name(previous),
                            path,
                            type_name(value)
                        );
                    }
                }
                forget(provenance, &path);
                target.insert(slot, strip_markers(value));
                provenance.insert(path, origin.clone());
            }
        }
    }

    Ok(())
}

/// Lists can contain mappings that carry markers meant for nested layers;
/// markers are only meaningful at overlay time, so they are dropped here.
fn strip_markers(value: &Value) -> Value {
    match value {
        Value::Sequence(items) => Value::Sequence(items.iter().map(strip_markers).collect()),
        Value::Mapping(map) => {
            let mut out = Mapping::new();
            for (k, v) in map {
                let key = match k {
                    Value::String(s) => Value::String(split_marker(s).0.to_string()),
                    other => other.clone(),
                };
                out.insert(key, strip_markers(v));
            }
            Value::Mapping(out)
        }
        other => other.clone(),
    }
}

/// Drop provenance for `path` and everything beneath it.
fn forget<L>(provenance: &mut BTreeMap<String, L>, path: &str) {
    let dotted = format!("{}.", path);
    let indexed = format!("{}[", path);
    provenance.retain(|key, _| key != path && !key.starts_with(&dotted) && !key.starts_with(&indexed));
}

/// Human-readable type name for a YAML value
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}
