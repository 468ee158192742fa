//! # Output Configuration
//!
//! Controls how the CLI decorates its output: colors and status markers
//! are used only when the terminal and the user's preferences allow it.
//!
//! ## Respecting User Preferences
//!
//! - `--color=never|always|auto` - CLI flag for color control
//! - `NO_COLOR` - Disables colors when set (per https://no-color.org/)
//! - `CLICOLOR=0` - Disables colors
//! - `CLICOLOR_FORCE=1` - Forces colors even in non-TTY
//! - `TERM=dumb` - Disables colors for dumb terminals
//!
//! ## Usage
//!
//! ```rust,ignore
//! use texcorpus::output::{OutputConfig, outcome_marker};
//!
//! let config = OutputConfig::from_env_and_flag("auto");
//! println!("{} {}", outcome_marker(&config, &report.outcome), report.path.display());
//! ```

use std::env;

use console::Style;

use crate::metadata::Severity;
use crate::phases::Outcome;

/// Output configuration for controlling colors and markers.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Whether colors and emojis should be used in output.
    pub use_color: bool,
}

impl OutputConfig {
    /// Build an output configuration from the environment and the CLI flag.
    ///
    /// # Arguments
    /// * `color_flag` - The value of the `--color` flag: "always", "never" or "auto"
    ///
    /// # Behavior
    /// - `--color=always`: colors on, even with `NO_COLOR` set
    /// - `--color=never`: colors off
    /// - anything else: detect from the environment
    ///
    /// In auto mode colors are off when any of these hold:
    /// - `NO_COLOR` is set (any value, including empty)
    /// - `CLICOLOR=0`
    /// - `TERM=dumb`
    /// - stdout is not a TTY, unless `CLICOLOR_FORCE=1`
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };

        Self { use_color }
    }

    fn detect_color_support() -> bool {
        let var = |name: &str| env::var(name).ok();
        // NO_COLOR disables colors by its presence alone, even when empty
        if env::var_os("NO_COLOR").is_some() || var("CLICOLOR").as_deref() == Some("0") {
            return false;
        }
        if var("CLICOLOR_FORCE").is_some_and(|v| v != "0" && !v.is_empty()) {
            return true;
        }
        var("TERM").as_deref() != Some("dumb")
            && console::Term::stdout().features().colors_supported()
    }

    #[cfg(test)]
    pub fn with_color() -> Self {
        Self { use_color: true }
    }

    #[cfg(test)]
    pub fn without_color() -> Self {
        Self { use_color: false }
    }

    /// `text` rendered with `style` when colors are on.
    pub fn paint(&self, style: &Style, text: &str) -> String {
        if self.use_color {
            style.apply_to(text).force_styling(true).to_string()
        } else {
            text.to_string()
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

/// The emoji when colors are enabled, `plain` otherwise.
///
/// # Arguments
/// * `config` - The output configuration
/// * `emoji_str` - Shown when colors are enabled
/// * `plain` - Shown when colors are disabled, e.g. `[OK]`
///
/// # Example
/// ```rust,ignore
/// println!("{} {}", emoji(&config, "✅", "[OK]"), path.display());
/// ```
pub fn emoji<'a>(config: &OutputConfig, emoji_str: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        emoji_str
    } else {
        plain
    }
}

/// Status marker for a document outcome.
///
/// Successes are green, skipped documents dim and failures red. Without
/// colors the markers read `[OK]`, `[SKIP]` and `[FAIL]`.
pub fn outcome_marker(config: &OutputConfig, outcome: &Outcome) -> String {
    match outcome {
        Outcome::Success => config.paint(&Style::new().green(), emoji(config, "✅", "[OK]")),
        Outcome::SkippedUnchanged => {
            config.paint(&Style::new().dim(), emoji(config, "⏭️ ", "[SKIP]"))
        }
        Outcome::Failed { .. } => config.paint(&Style::new().red(), emoji(config, "❌", "[FAIL]")),
    }
}

/// Marker for a metadata issue.
pub fn severity_marker(config: &OutputConfig, severity: Severity) -> String {
    match severity {
        Severity::Warning => config.paint(&Style::new().yellow(), emoji(config, "⚠️ ", "[WARN]")),
        Severity::Error => config.paint(&Style::new().red(), emoji(config, "❗", "[ERROR]")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::phases::Stage;

    #[test]
    fn test_color_always() {
        let config = OutputConfig::from_env_and_flag("always");
        assert!(config.use_color);
    }

    #[test]
    fn test_color_never() {
        let config = OutputConfig::from_env_and_flag("NEVER");
        assert!(!config.use_color);
    }

    #[test]
    fn test_plain_markers() {
        let config = OutputConfig::without_color();
        assert_eq!(outcome_marker(&config, &Outcome::Success), "[OK]");
        assert_eq!(outcome_marker(&config, &Outcome::SkippedUnchanged), "[SKIP]");
        let failed = Outcome::Failed {
            stage: Stage::Rendered,
            reason: FailureKind::Cancelled,
        };
        assert_eq!(outcome_marker(&config, &failed), "[FAIL]");
        assert_eq!(severity_marker(&config, Severity::Warning), "[WARN]");
    }

    #[test]
    fn test_colored_markers_use_emoji() {
        let config = OutputConfig::with_color();
        assert!(outcome_marker(&config, &Outcome::Success).contains("✅"));
    }

    #[test]
    fn test_paint_without_color_is_plain() {
        let config = OutputConfig::without_color();
        assert_eq!(config.paint(&Style::new().bold(), "texcorpus"), "texcorpus");
    }
}
