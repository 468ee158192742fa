//! CLI argument parsing and command dispatch

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::LevelFilter;

use crate::commands;
use texcorpus::output::OutputConfig;

/// texcorpus - Manage, compile and publish a corpus of LaTeX documents
#[derive(Parser, Debug)]
#[command(name = "texcorpus")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace). RUST_LOG takes precedence.
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile documents: validate identities, render, package and dispatch
    Compile(commands::compile::CompileArgs),
    /// Generate or build a poly (booklet) from compiled documents
    Poly(commands::poly::PolyArgs),
    /// List the documents of a corpus
    Ls(commands::ls::LsArgs),
    /// Show a document's metadata, classification and configuration
    Info(commands::info::InfoArgs),
    /// Read or change a document's metadata
    Meta(commands::meta::MetaArgs),
    /// Report identity collisions and documents without an identity
    Ids(commands::ids::IdsArgs),
    /// Move command-declared metadata into the metadata block
    Prepare(commands::prepare::PrepareArgs),
    /// Show the effective configuration for a directory
    Config(commands::config::ConfigArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        init_logging(&self.log_level)?;
        let output = OutputConfig::from_env_and_flag(&self.color);

        match self.command {
            Commands::Compile(args) => commands::compile::execute(args, &output),
            Commands::Poly(args) => commands::poly::execute(args, &output),
            Commands::Ls(args) => commands::ls::execute(args, &output),
            Commands::Info(args) => commands::info::execute(args, &output),
            Commands::Meta(args) => commands::meta::execute(args, &output),
            Commands::Ids(args) => commands::ids::execute(args, &output),
            Commands::Prepare(args) => commands::prepare::execute(args, &output),
            Commands::Config(args) => commands::config::execute(args, &output),
        }
    }
}

fn parse_level(level: &str) -> Result<LevelFilter> {
    match level.to_lowercase().as_str() {
        "off" => Ok(LevelFilter::Off),
        "error" => Ok(LevelFilter::Error),
        "warn" | "warning" => Ok(LevelFilter::Warn),
        "info" => Ok(LevelFilter::Info),
        "debug" => Ok(LevelFilter::Debug),
        "trace" => Ok(LevelFilter::Trace),
        other => anyhow::bail!(
            "Invalid log level: {other}\n\n\
             hint: Use one of error, warn, info, debug, trace"
        ),
    }
}

/// Log to stderr at `level`, unless `RUST_LOG` says otherwise.
fn init_logging(level: &str) -> Result<()> {
    let level = parse_level(level)?;
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).format_timestamp(None);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    // A second initialisation (tests) is harmless
    let _ = builder.try_init();
    Ok(())
}
