//! # Output Configuration
//!
//! Controls how the CLI prints: whether emoji and colours are used, and
//! which structured format reports are rendered in.
//!
//! Colour handling honours, in order:
//! - `--color=never|always|auto`
//! - `NO_COLOR` (any value disables colours)
//! - `CLICOLOR=0`
//! - `CLICOLOR_FORCE=1` (forces colours without a TTY)
//! - `TERM=dumb`

use std::env;

use clap::ValueEnum;
use serde::Serialize;

use crate::error::Result;

/// Output configuration for colours and emoji.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub use_color: bool,
}

impl OutputConfig {
    /// Resolve the `--color` flag value against the environment.
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

    #[cfg(test)]
    pub fn with_color() -> Self {
        Self { use_color: true }
    }

    #[cfg(test)]
    pub fn without_color() -> Self {
        Self { use_color: false }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

/// The emoji when colours are on, the plain marker otherwise.
pub fn emoji<'a>(config: &OutputConfig, emoji_str: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        emoji_str
    } else {
        plain
    }
}

/// Structured format of printed reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

/// Render `value` in `format`.
pub fn render<T: Serialize>(value: &T, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::BTreeMap;

    #[test]
    fn test_color_flags() {
        assert!(OutputConfig::from_env_and_flag("always").use_color);
        assert!(!OutputConfig::from_env_and_flag("NEVER").use_color);
    }

    #[test]
    #[serial]
    fn test_no_color_disables_auto() {
        env::set_var("NO_COLOR", "");
        let config = OutputConfig::from_env_and_flag("auto");
        env::remove_var("NO_COLOR");
        assert!(!config.use_color);
    }

    #[test]
    fn test_emoji_helper() {
        assert_eq!(emoji(&OutputConfig::with_color(), "✅", "[OK]"), "✅");
        assert_eq!(emoji(&OutputConfig::without_color(), "✅", "[OK]"), "[OK]");
    }

    #[test]
    fn test_render_formats() {
        let mut value = BTreeMap::new();
        value.insert("allowed", vec!["proj-a"]);
        assert_eq!(render(&value, OutputFormat::Yaml).unwrap(), "allowed:\n- proj-a\n");
        assert_eq!(
            render(&value, OutputFormat::Json).unwrap(),
            "{\n  \"allowed\": [\n    \"proj-a\"\n  ]\n}"
        );
    }
}
