//! # Output Configuration
//!
//! Controls whether CLI output uses colors and emojis. The `--color` flag
//! wins (`always`/`never`); in `auto` mode `NO_COLOR` (per
//! https://no-color.org/) and `TERM=dumb` disable decoration, otherwise the
//! terminal's own capabilities decide.

use std::env;

/// Output configuration for controlling colors and emojis.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Whether colors and emojis should be used in output.
    pub use_color: bool,
}

impl OutputConfig {
    /// Create an output configuration from environment and CLI flag.
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };

        Self { use_color }
    }

    fn detect_color_support() -> bool {
        // The presence of NO_COLOR (even empty) disables colors
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }
        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }
        console::Term::stdout().features().colors_supported()
    }

    /// The emoji when decoration is enabled, the plain marker otherwise.
    pub fn symbol<'a>(&self, emoji: &'a str, plain: &'a str) -> &'a str {
        if self.use_color {
            emoji
        } else {
            plain
        }
    }

    /// Create a configuration with colors always enabled.
    pub fn with_color() -> Self {
        Self { use_color: true }
    }

    /// Create a configuration with colors always disabled.
    pub fn without_color() -> Self {
        Self { use_color: false }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}
