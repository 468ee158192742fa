//! # Poly Command Implementation
//!
//! - `poly init <DIR>` writes an editable descriptor listing the compiled
//!   documents of a directory
//! - `poly build <DESCRIPTOR>` assembles and renders the booklet it describes

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};

use texcorpus::metadata::TexKeyMap;
use texcorpus::output::{emoji, OutputConfig};
use texcorpus::poly::{build_from_descriptor, generate_descriptor};
use texcorpus::render::{ExternalEngine, Renderer};
use texcorpus::suggestions;

use super::load_stack;

/// Generate or build a poly
#[derive(Args, Debug)]
pub struct PolyArgs {
    #[command(subcommand)]
    pub command: PolyCommand,
}

#[derive(Subcommand, Debug)]
pub enum PolyCommand {
    /// Write the poly descriptor for a directory of compiled documents
    Init {
        /// Directory holding the documents
        #[arg(value_name = "DIR", default_value = ".")]
        dir: PathBuf,
    },
    /// Build the poly described by a descriptor
    Build {
        /// Descriptor written by 'poly init'
        #[arg(value_name = "DESCRIPTOR", default_value = "poly.yaml")]
        descriptor: PathBuf,

        /// Show the layout without writing anything
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Write the master source and table of contents only
        #[arg(long)]
        no_render: bool,
    },
}

/// Execute the `poly` command.
pub fn execute(args: PolyArgs, output: &OutputConfig) -> Result<()> {
    let stack = load_stack()?;
    match args.command {
        PolyCommand::Init { dir } => {
            if !dir.is_dir() {
                anyhow::bail!("Not a directory: {}", dir.display());
            }
            let path = generate_descriptor(&dir, &stack, &TexKeyMap::default())?;
            println!("{} Wrote {}", emoji(output, "📝", "[OK]"), path.display());
            println!("Edit it, then run 'texcorpus poly build {}'", path.display());
        }
        PolyCommand::Build {
            descriptor,
            dry_run,
            no_render,
        } => {
            if !descriptor.is_file() {
                return Err(suggestions::poly_descriptor_missing(&descriptor));
            }
            let engine = ExternalEngine::new();
            let renderer: Option<&dyn Renderer> = if no_render { None } else { Some(&engine) };
            let build = build_from_descriptor(&descriptor, &stack, renderer, dry_run)?;

            for entry in &build.batch.entries {
                let padding = if entry.padding > 0 {
                    format!(" + {} blank", entry.padding)
                } else {
                    String::new()
                };
                println!(
                    "  p.{:<4} {} ({} pages{})",
                    entry.start_page, entry.title, entry.page_count, padding
                );
            }
            println!("{} pages in total", build.batch.total_pages);

            if dry_run {
                println!(
                    "{} Would write {} and {}",
                    emoji(output, "🔎", "[DRY RUN]"),
                    build.master.display(),
                    build.toc.display()
                );
            } else if let Some(rendered) = &build.rendered {
                println!(
                    "{} Built {} ({} pages)",
                    emoji(output, "✅", "[OK]"),
                    rendered.path.display(),
                    rendered.page_count
                );
            } else {
                println!(
                    "{} Wrote {} and {}",
                    emoji(output, "✅", "[OK]"),
                    build.master.display(),
                    build.toc.display()
                );
            }
        }
    }
    Ok(())
}
