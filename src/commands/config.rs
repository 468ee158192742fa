//! # Config Command Implementation
//!
//! Prints the effective configuration for a directory, one leaf per line,
//! with the layer that supplied it. Credentials are masked.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde_yaml::Value;

use texcorpus::config::ConfigValue;
use texcorpus::output::OutputConfig;

use super::load_stack;

/// Keys whose values are never printed.
const MASKED_KEYS: &[&str] = &["transport.password", "remote.token"];

/// Show the effective configuration
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Directory to resolve the configuration for
    #[arg(value_name = "DIR", default_value = ".")]
    pub dir: PathBuf,

    /// Show a single key
    #[arg(short, long, value_name = "KEY")]
    pub key: Option<String>,
}

/// Execute the `config` command.
pub fn execute(args: ConfigArgs, output: &OutputConfig) -> Result<()> {
    let stack = load_stack()?;
    let config = stack
        .resolve(&args.dir)
        .map_err(|e| texcorpus::suggestions::config_problem(&e))?;

    if let Some(key) = &args.key {
        let Some(entry) = config.lookup(key) else {
            anyhow::bail!("Key not set: {}", key);
        };
        print_entry(&entry, output);
        return Ok(());
    }

    if let Some(file) = config.directory_file() {
        println!("Directory override: {}", file.display());
    }
    for entry in config.entries() {
        print_entry(&entry, output);
    }
    Ok(())
}

fn print_entry(entry: &ConfigValue, output: &OutputConfig) {
    let value = if MASKED_KEYS.contains(&entry.key.as_str()) && !is_blank(&entry.value) {
        "********".to_string()
    } else {
        format_value(&entry.value)
    };
    let layer = output.paint(&console::Style::new().dim(), &format!("# {}", entry.layer));
    println!("{} = {}  {}", entry.key, value, layer);
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// One-line rendering of a configuration value.
pub(crate) fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "~".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("{:?}", s),
        Value::Sequence(items) => {
            let items: Vec<String> = items.iter().map(format_value).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Mapping(map) => {
            let entries: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", format_value(k), format_value(v)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
        Value::Tagged(tagged) => format_value(&tagged.value),
    }
}
