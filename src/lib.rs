//! # texcorpus
//!
//! Library behind the `texcorpus` command-line tool, which manages a corpus
//! of LaTeX teaching documents: their embedded metadata, their identities,
//! and their compilation into packaged, dispatched PDF artifacts.
//!
//! ## Quick Example
//!
//! ```
//! use texcorpus::metadata::{extract, MetadataValue};
//!
//! let source = "%### BEGIN metadata ###\n\
//!               % title: Statique du solide\n\
//!               % version: 2\n\
//!               %### END metadata ###\n\
//!               \\documentclass{article}\n";
//!
//! let (metadata, issues) = extract(source);
//! assert!(issues.is_empty());
//! assert_eq!(metadata.text("title").as_deref(), Some("Statique du solide"));
//! assert_eq!(metadata.get("version"), Some(&MetadataValue::Integer(2)));
//! ```
//!
//! ## Core Concepts
//!
//! - **Configuration (`config`, `merge`, `settings`)**: an ordered stack of
//!   YAML layers (builtin, installation, secrets, directory override) merged
//!   key-wise, with per-key provenance and typed settings on top.
//! - **Metadata (`metadata`)**: a tolerant scanner for the metadata comment
//!   block and `\newcommand`-style declarations, and a writer that puts
//!   changes back without disturbing the rest of the source.
//! - **Documents (`document`)**: one source file, its metadata and the
//!   configuration it is compiled with.
//! - **Identities (`identity`)**: the corpus-wide index of document
//!   identities, collision detection, and assignment of new identities,
//!   optionally confirmed by a remote authority.
//! - **Compilation (`phases`, `render`, `manifest`)**: the staged pipeline
//!   that validates, renames, renders, packages and dispatches documents,
//!   leaving a manifest next to each artifact.
//! - **Polys (`poly`)**: booklets assembled from compiled documents.
//!
//! Entry point for a compilation run is [`phases::Orchestrator`].

pub mod cache;
pub mod config;
pub mod defaults;
pub mod document;
pub mod error;
pub mod filesystem;
pub mod identity;
pub mod manifest;
pub mod merge;
pub mod metadata;
mod metadata_proptest;
pub mod output;
pub mod phases;
pub mod poly;
pub mod render;
pub mod scan;
pub mod settings;
pub mod suggestions;
