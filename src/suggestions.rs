//! # Error Suggestions
//!
//! Helpers building CLI errors that say what went wrong and how to fix it.
//!
//! ```rust,ignore
//! use texcorpus::suggestions;
//!
//! // Instead of:
//! anyhow::bail!("Not a file: {}", path.display());
//!
//! // Use:
//! return Err(suggestions::document_not_found(path));
//! ```

use std::path::{Path, PathBuf};

use crate::defaults::{CONFIG_ENV, DIRECTORY_OVERRIDE_FILE, SECRETS_ENV};
use crate::metadata::TexKeyMap;

/// Metadata keys the tooling itself reads.
const KNOWN_KEYS: &[&str] = &[
    "id", "title", "doc_type", "variant", "version", "author", "class", "subject",
];

/// Error for a document path that does not exist or is not a file.
pub fn document_not_found(path: &Path) -> anyhow::Error {
    anyhow::anyhow!(
        "Document not found: {path}\n\n\
         hint: Pass the path of a .tex source file\n\
         hint: Run 'texcorpus ls' to list the documents of the corpus",
        path = path.display()
    )
}

/// Error for a compile run that selected no document.
pub fn no_documents(inputs: &[PathBuf]) -> anyhow::Error {
    let searched: Vec<String> = inputs.iter().map(|p| p.display().to_string()).collect();
    anyhow::anyhow!(
        "No documents found in {searched}\n\n\
         hint: Only files with a configured extension are compiled (batch.extensions)\n\
         hint: Check batch.exclude in {override_file} or run 'texcorpus config'",
        searched = searched.join(", "),
        override_file = DIRECTORY_OVERRIDE_FILE
    )
}

/// Error for a configuration layer that cannot be used.
pub fn config_problem(error: &crate::error::Error) -> anyhow::Error {
    anyhow::anyhow!(
        "{error}\n\n\
         hint: Fix the file named above, or point {config_env} / {secrets_env} at another one\n\
         hint: Run 'texcorpus config <dir>' to see where every value comes from",
        config_env = CONFIG_ENV,
        secrets_env = SECRETS_ENV
    )
}

/// Error for writing metadata into an unrecoverable block.
pub fn metadata_unrecoverable(path: &Path) -> anyhow::Error {
    anyhow::anyhow!(
        "The metadata block of {path} cannot be parsed, refusing to rewrite it\n\n\
         hint: Run 'texcorpus info {path}' to see the problems found\n\
         hint: Each line of the block must be a '% key: value' entry",
        path = path.display()
    )
}

/// Warning text for an unfamiliar metadata key, with a suggestion when the
/// key looks like a typo of a known one.
pub fn unknown_metadata_key(key: &str, keys: &TexKeyMap) -> Option<String> {
    if KNOWN_KEYS.contains(&key) || keys.command_for(key).is_some() {
        return None;
    }
    let did_you_mean = find_similar(key, KNOWN_KEYS)
        .map(|s| format!(" (did you mean '{s}'?)"))
        .unwrap_or_default();
    Some(format!("'{key}' is not a key texcorpus uses{did_you_mean}"))
}

/// Error for identity collisions found by `texcorpus ids`.
pub fn identity_collisions(count: usize) -> anyhow::Error {
    anyhow::anyhow!(
        "{count} identity collision(s) found\n\n\
         hint: Collisions are never fixed automatically\n\
         hint: Remove the 'id' of the copies with 'texcorpus meta unset <file> id', then compile to assign new ones"
    )
}

/// Error for a poly command run without its input.
pub fn poly_descriptor_missing(path: &Path) -> anyhow::Error {
    anyhow::anyhow!(
        "Poly descriptor not found: {path}\n\n\
         hint: Generate it with 'texcorpus poly init <dir>'",
        path = path.display()
    )
}

/// Find a similar string from a list of candidates using edit distance.
///
/// Returns Some(candidate) if a close match is found (edit distance <= 2).
fn find_similar<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .filter_map(|&candidate| {
            let distance = edit_distance(input, candidate);
            if distance <= 2 && distance < input.len() {
                Some((candidate, distance))
            } else {
                None
            }
        })
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate)
}

/// Levenshtein distance, counted in chars.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}
