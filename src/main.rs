//! # texcorpus CLI
//!
//! Binary entry point for the `texcorpus` command-line tool. It parses the
//! command line with `clap`, runs the selected command, and turns
//! top-level errors into readable output. All of the real work lives in
//! the `texcorpus` library crate.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
