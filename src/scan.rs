//! Corpus discovery
//!
//! Walks a directory tree for document sources: files with one of the
//! configured extensions, outside hidden directories, not matching any
//! exclude pattern, and not binary.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use glob::Pattern;
use log::{debug, trace};
use walkdir::{DirEntry, WalkDir};

use crate::error::Result;
use crate::settings::BatchSettings;

/// Bytes inspected when deciding whether a file is binary.
const BINARY_SNIFF_LEN: usize = 8 * 1024;

/// Filters applied while walking a corpus
#[derive(Debug, Clone)]
pub struct ScanFilter {
    extensions: Vec<String>,
    exclude: Vec<Pattern>,
}

impl ScanFilter {
    pub fn new(extensions: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            exclude: exclude
                .iter()
                .map(|p| Pattern::new(p))
                .collect::<std::result::Result<_, _>>()?,
        })
    }

    pub fn from_settings(settings: &BatchSettings) -> Result<Self> {
        Self::new(&settings.extensions, &settings.exclude)
    }

    fn has_extension(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| {
                let ext = ext.to_string_lossy().to_lowercase();
                self.extensions.iter().any(|e| *e == ext)
            })
            .unwrap_or(false)
    }

    fn is_excluded(&self, relative: &Path) -> bool {
        self.exclude.iter().any(|p| p.matches_path(relative))
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

/// Whether the start of the file contains a NUL byte.
pub fn looks_binary(path: &Path) -> Result<bool> {
    let mut buffer = Vec::with_capacity(BINARY_SNIFF_LEN);
    File::open(path)?
        .take(BINARY_SNIFF_LEN as u64)
        .read_to_end(&mut buffer)?;
    Ok(buffer.contains(&0))
}

/// All document sources under `root`, sorted by path.
pub fn scan_corpus(root: &Path, filter: &ScanFilter) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(e.file_type().is_dir() && is_hidden(e)));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() || !filter.has_extension(entry.path()) {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if filter.is_excluded(relative) {
            trace!("Excluded {}", relative.display());
            continue;
        }
        if looks_binary(entry.path())? {
            debug!("Skipping binary file {}", entry.path().display());
            continue;
        }
        found.push(entry.path().to_path_buf());
    }

    found.sort();
    Ok(found)
}

/// Expand command-line inputs: files are taken as given, directories are
/// scanned. Duplicates are dropped, first occurrence wins.
pub fn expand_inputs(inputs: &[PathBuf], filter: &ScanFilter) -> Result<Vec<PathBuf>> {
    let mut out: Vec<PathBuf> = Vec::new();
    for input in inputs {
        let batch = if input.is_dir() {
            scan_corpus(input, filter)?
        } else {
            vec![input.clone()]
        };
        for path in batch {
            if !out.contains(&path) {
                out.push(path);
            }
        }
    }
    Ok(out)
}
