//! # CLI Command Implementations
//!
//! One module per `texcorpus` subcommand. Each holds a `clap` `Args` struct
//! and an `execute` function that calls into the `texcorpus` library and
//! prints the result.

pub mod compile;
pub mod config;
pub mod ids;
pub mod info;
pub mod ls;
pub mod meta;
pub mod poly;
pub mod prepare;

use std::path::{Path, PathBuf};

use anyhow::Result;

use texcorpus::config::ConfigStack;
use texcorpus::scan::ScanFilter;
use texcorpus::settings::Settings;
use texcorpus::suggestions;

/// Configuration stack from the installation and secrets files.
pub(crate) fn load_stack() -> Result<ConfigStack> {
    ConfigStack::from_environment().map_err(|e| suggestions::config_problem(&e))
}

/// Settings resolved for `dir`.
pub(crate) fn settings_for(stack: &ConfigStack, dir: &Path) -> Result<Settings> {
    stack
        .resolve(dir)
        .and_then(|config| Settings::from_config(&config))
        .map_err(|e| suggestions::config_problem(&e))
}

/// Scan filter from the settings of `dir`.
pub(crate) fn filter_for(stack: &ConfigStack, dir: &Path) -> Result<ScanFilter> {
    let settings = settings_for(stack, dir)?;
    Ok(ScanFilter::from_settings(&settings.batch)?)
}

/// `paths`, or the current directory when none were given.
pub(crate) fn inputs_or_cwd(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    if paths.is_empty() {
        vec![PathBuf::from(".")]
    } else {
        paths
    }
}
