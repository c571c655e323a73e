//! # Output Configuration
//!
//! Decides how reports are printed: status emoji and colored text on a
//! capable terminal, bracketed plain markers otherwise.
//!
//! In `auto` mode the decision follows the usual conventions:
//! - `NO_COLOR` set (any value) disables color
//! - `CLICOLOR=0` disables color
//! - `CLICOLOR_FORCE` set to a non-zero value enables color even without a TTY
//! - `TERM=dumb` disables color
//!
//! ```rust,ignore
//! use stack_builder::output::{Marker, OutputConfig};
//!
//! let out = OutputConfig::from_env_and_flag("auto");
//! println!("{} develop is up to date", out.marker(Marker::Ok));
//! ```

use std::env;

use console::style;

#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Whether colors and emojis should be used in output.
    pub use_color: bool,
}

/// Status markers used in the branch and build reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Ok,
    Updated,
    Reset,
    Skipped,
    Warning,
    Failed,
    Build,
    Installed,
}

impl Marker {
    fn pair(self) -> (&'static str, &'static str) {
        match self {
            Marker::Ok => ("✅", "[OK]"),
            Marker::Updated => ("⏩", "[FF]"),
            Marker::Reset => ("♻️ ", "[RESET]"),
            Marker::Skipped => ("⏭️ ", "[SKIP]"),
            Marker::Warning => ("⚠️ ", "[WARN]"),
            Marker::Failed => ("❌", "[FAIL]"),
            Marker::Build => ("🔨", "[BUILD]"),
            Marker::Installed => ("📦", "[INSTALLED]"),
        }
    }
}

impl OutputConfig {
    /// `color_flag` is the value of `--color`: `always`, `never` or `auto`.
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };

        Self { use_color }
    }

    fn detect_color_support() -> bool {
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }
        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }
        if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
            return true;
        }
        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }

        console::Term::stdout().features().colors_supported()
    }

    pub fn plain() -> Self {
        Self { use_color: false }
    }

    pub fn marker(&self, marker: Marker) -> &'static str {
        let (emoji_str, plain) = marker.pair();
        emoji(self, emoji_str, plain)
    }

    /// Bold text for headings, when color is on.
    pub fn heading(&self, text: &str) -> String {
        if self.use_color {
            style(text).bold().to_string()
        } else {
            text.to_string()
        }
    }

    /// Dimmed text for secondary details, when color is on.
    pub fn dim(&self, text: &str) -> String {
        if self.use_color {
            style(text).dim().to_string()
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

/// The emoji when color is on, the plain alternative otherwise.
pub fn emoji<'a>(config: &OutputConfig, emoji_str: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        emoji_str
    } else {
        plain
    }
}
