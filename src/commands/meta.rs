//! # Meta Command Implementation
//!
//! Reads and edits a single metadata key. Values given to `set` are read as
//! YAML, so `3` is a number, `[a, b]` a list and anything else plain text.
//! Edits keep the entry where it was declared: a key declared with a
//! command stays a command, everything else goes into the metadata block.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Subcommand};

use texcorpus::document::{Document, MetadataLookup};
use texcorpus::metadata::{normalize_key, MetadataValue};
use texcorpus::output::{emoji, OutputConfig};
use texcorpus::suggestions;

/// Read or change a document's metadata
#[derive(Args, Debug)]
pub struct MetaArgs {
    #[command(subcommand)]
    pub command: MetaCommand,
}

#[derive(Subcommand, Debug)]
pub enum MetaCommand {
    /// Print the value of a key
    Get {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(value_name = "KEY")]
        key: String,
    },
    /// Set a key
    Set {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(value_name = "KEY")]
        key: String,
        #[arg(value_name = "VALUE")]
        value: String,
    },
    /// Remove a key
    Unset {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(value_name = "KEY")]
        key: String,
    },
}

/// Execute the `meta` command.
pub fn execute(args: MetaArgs, output: &OutputConfig) -> Result<()> {
    match args.command {
        MetaCommand::Get { file, key } => {
            let document = open(&file)?;
            match document.metadata_value(&key) {
                MetadataLookup::Set(value) => println!("{}", value),
                MetadataLookup::NotSet => anyhow::bail!("{} is not set in {}", key, file.display()),
            }
        }
        MetaCommand::Set { file, key, value } => {
            let key = checked_key(&key)?;
            let mut document = open(&file)?;
            document.set_metadata(&key, MetadataValue::parse_user(&value));
            save(&mut document)?;
            println!("{} {} = {}", emoji(output, "✅", "[OK]"), key, value);
        }
        MetaCommand::Unset { file, key } => {
            let mut document = open(&file)?;
            if document.remove_metadata(&key).is_none() {
                println!("{} was not set", key);
                return Ok(());
            }
            save(&mut document)?;
            println!("{} removed {}", emoji(output, "✅", "[OK]"), key);
        }
    }
    Ok(())
}

fn open(file: &Path) -> Result<Document> {
    if !file.is_file() {
        return Err(suggestions::document_not_found(file));
    }
    Ok(Document::from_path(file)?)
}

fn checked_key(key: &str) -> Result<String> {
    let normalized = normalize_key(key);
    if normalized.is_empty() {
        anyhow::bail!("Invalid metadata key: '{}'", key);
    }
    Ok(normalized)
}

fn save(document: &mut Document) -> Result<()> {
    if document.is_unrecoverable() {
        return Err(suggestions::metadata_unrecoverable(document.path()));
    }
    document.save()?;
    Ok(())
}
