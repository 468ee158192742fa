//! Filesystem helpers shared by documents, manifests and packaging
//!
//! Every write that replaces a file the user cares about (a document
//! source, a manifest, a poly descriptor) goes through [`write_atomic`]:
//! content lands in a temporary file in the same directory and is then
//! persisted over the target, so readers see either the old or the new
//! file, never a truncated one.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::debug;
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Atomically replace `path` with `content`.
///
/// Permissions of an existing file are carried over to the new one.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    if let Ok(existing) = fs::metadata(path) {
        fs::set_permissions(temp.path(), existing.permissions())?;
    }
    temp.persist(path).map_err(|e| Error::Filesystem {
        message: format!("Failed to replace {}: {}", path.display(), e.error),
    })?;
    Ok(())
}

/// Rename a file, refusing to overwrite an existing target.
///
/// # Arguments
/// * `from` - The file to move; it must exist
/// * `to` - The new path; it must not exist
///
/// # Behavior
/// The target name is claimed with an exclusive create before the rename,
/// so of two concurrent renames to the same name exactly one succeeds.
/// When the rename itself fails the claimed name is removed again.
pub fn rename_no_clobber(from: &Path, to: &Path) -> Result<()> {
    if !from.exists() {
        return Err(Error::Filesystem {
            message: format!("Source file not found: {}", from.display()),
        });
    }
    match fs::OpenOptions::new().write(true).create_new(true).open(to) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(Error::Filesystem {
                message: format!("Refusing to overwrite existing file: {}", to.display()),
            });
        }
        Err(e) => return Err(e.into()),
    }
    if let Err(e) = fs::rename(from, to) {
        // Give the claimed name back
        let _ = fs::remove_file(to);
        return Err(e.into());
    }
    debug!("Renamed {} -> {}", from.display(), to.display());
    Ok(())
}

/// Copy a single file, creating the target's parent directories.
pub fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(from, to).map_err(|e| Error::Filesystem {
        message: format!("Failed to copy {} to {}: {}", from.display(), to.display(), e),
    })?;
    Ok(())
}

/// Copy every file under `from` into `to`, keeping relative paths.
/// Returns the copied target paths.
pub fn copy_tree(from: &Path, to: &Path) -> Result<Vec<PathBuf>> {
    let mut copied = Vec::new();
    for entry in WalkDir::new(from).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| Error::Filesystem {
                message: format!("Unexpected path {}: {}", entry.path().display(), e),
            })?;
        let target = to.join(relative);
        copy_file(entry.path(), &target)?;
        copied.push(target);
    }
    Ok(copied)
}

/// Remove a directory tree if it exists.
pub fn remove_dir_if_exists(dir: &Path) -> Result<bool> {
    if dir.is_dir() {
        fs::remove_dir_all(dir)?;
        debug!("Removed {}", dir.display());
        Ok(true)
    } else {
        Ok(false)
    }
}
