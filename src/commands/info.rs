//! # Info Command Implementation
//!
//! Shows what texcorpus knows about one document: its metadata and where
//! each entry was declared, extraction issues, its classification, the
//! canonical name it would get, and the configuration it compiles with.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use texcorpus::document::Document;
use texcorpus::metadata::{Origin, TexKeyMap};
use texcorpus::output::{severity_marker, OutputConfig};
use texcorpus::phases::rename::target_stem;
use texcorpus::phases::OutputPaths;
use texcorpus::settings::Settings;
use texcorpus::suggestions;

use super::config::format_value;
use super::load_stack;

/// Show information about a document
#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Source file
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Also show the effective configuration with the layer of each value
    #[arg(long)]
    pub provenance: bool,
}

/// Execute the `info` command.
pub fn execute(args: InfoArgs, output: &OutputConfig) -> Result<()> {
    if !args.file.is_file() {
        return Err(suggestions::document_not_found(&args.file));
    }
    let stack = load_stack()?;
    let keys = TexKeyMap::default();
    let mut document = Document::from_path_with_keys(&args.file, keys.clone())?;

    println!("Document: {}", args.file.display());
    let settings = match stack.resolve_for_document(&args.file) {
        Ok(config) => {
            let settings = Settings::from_config(&config);
            document = document.with_config(config);
            settings.ok()
        }
        Err(e) => {
            println!("Configuration: {}", e);
            None
        }
    };

    println!(
        "Identity: {}",
        document
            .identity()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "(none)".to_string())
    );
    println!("Title: {}", document.title());
    println!("Kind: {}", document.kind());

    if document.metadata().is_empty() {
        println!("\nMetadata: none");
    } else {
        println!("\nMetadata:");
        for (key, value) in document.metadata().iter() {
            let origin = match document.metadata().origin(key) {
                Some(Origin::Command(name)) => format!("\\{}", name),
                Some(Origin::Assigned) => "assigned".to_string(),
                Some(Origin::Block) | None => "block".to_string(),
            };
            println!("  • {} = {}  ({})", key, value, origin);
            if let Some(warning) = suggestions::unknown_metadata_key(key, &keys) {
                println!("      {}", warning);
            }
        }
    }

    if !document.issues().is_empty() {
        println!("\nIssues:");
        for issue in document.issues() {
            println!("  {} {}", severity_marker(output, issue.severity), issue);
        }
    }

    if let Some(settings) = &settings {
        let paths = OutputPaths::for_source(&args.file, settings);
        println!("\nArtifact: {}", paths.artifact.display());
        println!("Manifest: {}", paths.manifest.display());
        if settings.compilation.ignore {
            println!("Ignored: compilation.ignore is set");
        }
        if settings.compilation.auto_rename {
            match target_stem(&settings.naming.pattern, &document, &settings.metadata) {
                Some(stem) if stem != document.stem() => println!("Would be renamed to: {}", stem),
                Some(_) => {}
                None => println!("Would not be renamed: not enough metadata"),
            }
        }
    }

    if args.provenance {
        if let Some(config) = document.config() {
            println!("\nConfiguration:");
            for entry in config.entries() {
                if entry.key == "transport.password" || entry.key == "remote.token" {
                    continue;
                }
                println!("  {} = {}  # {}", entry.key, format_value(&entry.value), entry.layer);
            }
        }
    }
    Ok(())
}
