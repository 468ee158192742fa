//! # Ls Command Implementation
//!
//! Lists the documents of a corpus with their classification and title.
//! Read-only: nothing is written and no identity is assigned.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, ValueEnum};

use texcorpus::document::Document;
use texcorpus::output::{emoji, OutputConfig};
use texcorpus::scan::expand_inputs;

use super::{filter_for, inputs_or_cwd, load_stack};

/// List the documents of a corpus
#[derive(Args, Debug)]
pub struct LsArgs {
    /// Files or directories to list (defaults to the current directory)
    #[arg(value_name = "PATHS")]
    pub paths: Vec<PathBuf>,

    /// Which documents to show
    #[arg(short, long, value_enum, default_value = "all")]
    pub filter: MetadataFilter,

    /// Show each document's identity
    #[arg(long)]
    pub ids: bool,

    /// Show only the number of documents
    #[arg(long)]
    pub count: bool,
}

/// Selection by presence of metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum MetadataFilter {
    #[default]
    All,
    /// Documents with at least one metadata entry
    WithMetadata,
    /// Documents without any metadata
    WithoutMetadata,
}

impl MetadataFilter {
    fn accepts(&self, document: &Document) -> bool {
        match self {
            MetadataFilter::All => true,
            MetadataFilter::WithMetadata => !document.metadata().is_empty(),
            MetadataFilter::WithoutMetadata => document.metadata().is_empty(),
        }
    }
}

/// Execute the `ls` command.
pub fn execute(args: LsArgs, output: &OutputConfig) -> Result<()> {
    let stack = load_stack()?;
    let filter = filter_for(&stack, &std::env::current_dir()?)?;
    let sources = expand_inputs(&inputs_or_cwd(args.paths), &filter)?;

    let mut shown = 0;
    for source in &sources {
        let document = match Document::from_path(source) {
            Ok(document) => document,
            Err(e) => {
                eprintln!("{} {}: {}", emoji(output, "⚠️ ", "[WARN]"), source.display(), e);
                continue;
            }
        };
        if !args.filter.accepts(&document) {
            continue;
        }
        shown += 1;
        if args.count {
            continue;
        }

        let kind = document.kind();
        let kind = if kind.code().is_empty() {
            "-".to_string()
        } else {
            kind.code().to_string()
        };
        let mut line = format!("{:<8} {}", kind, source.display());
        if args.ids {
            let id = document
                .identity()
                .map(|id| id.to_string())
                .unwrap_or_else(|| "(none)".to_string());
            line = format!("{:<16} {}", id, line);
        }
        println!("{}  {}", line, document.title());
    }

    if args.count {
        println!("{}", shown);
    } else if shown == 0 {
        println!("No documents found.");
    }
    Ok(())
}
