//! # Prepare Command Implementation
//!
//! Brings sources written in the older command-declaration format up to
//! the metadata block format. For each document the detected format is
//! shown; documents that still declare metadata with commands have those
//! keys moved into the block and the declarations removed. Everything else
//! in the file is left as it is.
//!
//! Documents already in the block format, and documents without metadata,
//! are not touched. With `--dry-run` nothing is written.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use log::debug;

use texcorpus::document::Document;
use texcorpus::metadata::{SourceFormat, TexKeyMap};
use texcorpus::output::{emoji, OutputConfig};
use texcorpus::scan::expand_inputs;
use texcorpus::suggestions;

use super::{filter_for, inputs_or_cwd, load_stack};

/// Move command-declared metadata into the metadata block
#[derive(Args, Debug)]
pub struct PrepareArgs {
    /// Files or directories to prepare (defaults to the current directory)
    #[arg(value_name = "PATHS")]
    pub paths: Vec<PathBuf>,

    /// Show what would change without writing anything
    #[arg(long)]
    pub dry_run: bool,
}

/// Tally of a prepare run
#[derive(Debug, Default, PartialEq, Eq)]
struct Summary {
    migrated: usize,
    current: usize,
    bare: usize,
    failed: usize,
}

/// Execute the `prepare` command.
///
/// # Behavior
/// - Each document line shows the detected format
/// - Command-declared keys move into the block, unless `--dry-run` is set
/// - A document that cannot be read or saved counts as failed; the others
///   are still processed and the command exits non-zero at the end
pub fn execute(args: PrepareArgs, output: &OutputConfig) -> Result<()> {
    let inputs = inputs_or_cwd(args.paths);
    for input in &inputs {
        if !input.exists() {
            return Err(suggestions::document_not_found(input));
        }
    }
    let stack = load_stack()?;
    let filter = filter_for(&stack, &std::env::current_dir()?)?;
    let sources = expand_inputs(&inputs, &filter)?;
    if sources.is_empty() {
        return Err(suggestions::no_documents(&inputs));
    }

    let mut summary = Summary::default();
    for source in &sources {
        let mut document = match Document::from_path_with_keys(source, TexKeyMap::default()) {
            Ok(document) => document,
            Err(e) => {
                eprintln!("{} {}: {}", emoji(output, "❌", "[ERROR]"), source.display(), e);
                summary.failed += 1;
                continue;
            }
        };
        let format = document.format();
        debug!("{}: {:?}", source.display(), format);

        match format {
            SourceFormat::Bare => {
                summary.bare += 1;
                println!("  {}  {}", source.display(), format);
            }
            SourceFormat::Block => {
                summary.current += 1;
                println!("  {}  {}", source.display(), format);
            }
            SourceFormat::Commands | SourceFormat::Mixed => {
                if document.is_unrecoverable() {
                    eprintln!(
                        "{} {}: {}",
                        emoji(output, "❌", "[ERROR]"),
                        source.display(),
                        suggestions::metadata_unrecoverable(source)
                    );
                    summary.failed += 1;
                    continue;
                }
                let keys: Vec<String> = document.metadata().keys().map(String::from).collect();
                document.move_metadata_to_block();
                let verb = if args.dry_run {
                    "would move"
                } else {
                    if let Err(e) = document.save() {
                        eprintln!("{} {}: {}", emoji(output, "❌", "[ERROR]"), source.display(), e);
                        summary.failed += 1;
                        continue;
                    }
                    "moved"
                };
                summary.migrated += 1;
                println!(
                    "{} {}  {}: {} {} into the metadata block",
                    emoji(output, "✅", "[OK]"),
                    source.display(),
                    format,
                    verb,
                    keys.join(", ")
                );
            }
        }
    }

    println!(
        "\n{} {}, {} already current, {} without metadata",
        summary.migrated,
        if args.dry_run { "to migrate" } else { "migrated" },
        summary.current,
        summary.bare
    );
    if summary.failed > 0 {
        anyhow::bail!("{} document(s) could not be prepared", summary.failed);
    }
    Ok(())
}
