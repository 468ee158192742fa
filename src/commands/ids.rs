//! # Ids Command Implementation
//!
//! Indexes every document identity under a corpus root and reports
//! identities shared by several files and documents without an identity.
//! Collisions are only reported; the command exits non-zero when it finds
//! any.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use texcorpus::identity::IdentityRegistry;
use texcorpus::metadata::TexKeyMap;
use texcorpus::output::{emoji, OutputConfig};
use texcorpus::suggestions;

use super::{filter_for, load_stack};

/// Report identity collisions and unassigned documents
#[derive(Args, Debug)]
pub struct IdsArgs {
    /// Corpus root (defaults to the current directory)
    #[arg(value_name = "ROOT", default_value = ".")]
    pub root: PathBuf,

    /// Do not list documents without an identity
    #[arg(long)]
    pub collisions_only: bool,
}

/// Execute the `ids` command.
pub fn execute(args: IdsArgs, output: &OutputConfig) -> Result<()> {
    if !args.root.is_dir() {
        anyhow::bail!("Not a directory: {}", args.root.display());
    }
    let stack = load_stack()?;
    let filter = filter_for(&stack, &args.root)?;
    let registry = IdentityRegistry::scan(&args.root, &filter, &TexKeyMap::default())?;

    let collisions = registry.collisions()?;
    let unassigned = registry.unassigned()?;
    println!("{} identities indexed", registry.len()?);

    if !args.collisions_only && !unassigned.is_empty() {
        println!("\nWithout identity ({}):", unassigned.len());
        for path in &unassigned {
            println!("  • {}", path.display());
        }
    }

    if collisions.is_empty() {
        println!("\n{} No collisions", emoji(output, "✅", "[OK]"));
        return Ok(());
    }

    println!("\nCollisions ({}):", collisions.len());
    for (identity, paths) in &collisions {
        println!("{} {}", emoji(output, "❌", "[COLLISION]"), identity);
        for path in paths {
            println!("    {}", path.display());
        }
    }
    Err(suggestions::identity_collisions(collisions.len()))
}
