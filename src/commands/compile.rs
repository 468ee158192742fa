//! # Compile Command Implementation
//!
//! Runs the compilation pipeline over the selected documents and prints
//! one line per document. Directories are scanned for sources.
//!
//! - `--mode quick` skips documents whose manifest fingerprint is current
//! - `--mode deep` cleans build directories and re-checks every identity
//!   with the remote authority
//! - `--dry-run` reports what would happen without touching anything
//!
//! Compiling several documents asks for confirmation first, unless `--yes`
//! is given or stdin is not a terminal. The command fails when any document
//! failed.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Args;
use dialoguer::{theme::ColorfulTheme, Confirm};

use texcorpus::output::{emoji, outcome_marker, severity_marker, OutputConfig};
use texcorpus::phases::{BatchResult, CompilationJob, Disposition, Mode, Orchestrator, Outcome};
use texcorpus::scan::expand_inputs;
use texcorpus::suggestions;

use super::{filter_for, inputs_or_cwd, load_stack};

/// Compile documents
#[derive(Args, Debug)]
pub struct CompileArgs {
    /// Source files or directories (defaults to the current directory)
    #[arg(value_name = "PATHS")]
    pub paths: Vec<PathBuf>,

    /// Compilation mode: normal, quick or deep
    #[arg(short, long, default_value = "normal")]
    pub mode: String,

    /// Show what would be done without making changes
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Package artifacts but do not dispatch them
    #[arg(long)]
    pub no_dispatch: bool,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Root of the corpus whose identities are checked for collisions
    /// (defaults to the current directory)
    #[arg(long, value_name = "DIR")]
    pub corpus_root: Option<PathBuf>,

    /// List every action taken for each document
    #[arg(short, long)]
    pub verbose: bool,
}

/// Execute the `compile` command.
pub fn execute(args: CompileArgs, output: &OutputConfig) -> Result<()> {
    let start_time = Instant::now();
    let mode: Mode = args.mode.parse().unwrap_or_default();
    let stack = load_stack()?;
    let corpus_root = match args.corpus_root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };

    let inputs = inputs_or_cwd(args.paths);
    let filter = filter_for(&stack, &corpus_root)?;
    let sources = expand_inputs(&inputs, &filter)?;
    if sources.is_empty() {
        return Err(suggestions::no_documents(&inputs));
    }
    for source in &sources {
        if !source.is_file() {
            return Err(suggestions::document_not_found(source));
        }
    }

    if args.dry_run {
        println!(
            "{} DRY RUN MODE - No changes will be made",
            emoji(output, "🔎", "[DRY RUN]")
        );
    }
    if sources.len() > 1 && !args.yes && !args.dry_run && std::io::stdin().is_terminal() {
        let theme = ColorfulTheme::default();
        let proceed = Confirm::with_theme(&theme)
            .with_prompt(format!(
                "Compile {} documents in {} mode?",
                sources.len(),
                mode
            ))
            .default(true)
            .interact()?;
        if !proceed {
            println!("Compilation cancelled.");
            return Ok(());
        }
    }

    let disposition = if args.no_dispatch {
        Disposition::Package
    } else {
        Disposition::PackageAndDispatch
    };
    let job = CompilationJob::new(corpus_root, sources)
        .mode(mode)
        .dry_run(args.dry_run)
        .disposition(disposition);
    let result = Orchestrator::new(stack).run(&job)?;

    print_reports(&result, output, args.verbose || args.dry_run);
    println!(
        "\n{} succeeded, {} unchanged, {} failed, {} ignored in {:.2}s",
        result.succeeded(),
        result.skipped(),
        result.failed(),
        result.ignored.len(),
        start_time.elapsed().as_secs_f64()
    );

    if result.has_failures() {
        anyhow::bail!("{} document(s) failed to compile", result.failed());
    }
    Ok(())
}

fn print_reports(result: &BatchResult, output: &OutputConfig, show_actions: bool) {
    for report in &result.reports {
        let identity = report
            .identity
            .as_deref()
            .map(|id| format!(" [{}]", id))
            .unwrap_or_default();
        println!(
            "{} {}{}",
            outcome_marker(output, &report.outcome),
            report.final_path.display(),
            identity
        );
        if let Outcome::Failed { stage, reason } = &report.outcome {
            println!("    failed before {}: {}", stage, reason);
        }
        for issue in &report.issues {
            println!("    {} {}", severity_marker(output, issue.severity), issue);
        }
        if show_actions {
            for action in &report.actions {
                println!("    {}", action);
            }
        }
    }
    for path in &result.ignored {
        println!("{} {} (ignored)", emoji(output, "➖", "[IGNORED]"), path.display());
    }
}
