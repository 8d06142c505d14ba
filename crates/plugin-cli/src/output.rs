//! Terminal output helpers
//!
//! Normal output goes to stdout; warnings go to stderr so that `--json`
//! output stays machine-readable.

use std::fmt::Display;

use colored::{ColoredString, Colorize};
use plugin_core::PluginState;
use plugin_registry::TrustLevel;
use serde::Serialize;

use crate::error::Result;

pub fn success(msg: impl Display) {
    println!("{} {msg}", "✓".green());
}

pub fn warning(msg: impl Display) {
    eprintln!("{} {msg}", "warning:".yellow().bold());
}

/// Indented detail line under a heading or status message.
pub fn info(msg: impl Display) {
    println!("  {msg}");
}

pub fn heading(title: &str) {
    println!("{}", title.bold());
    println!();
}

/// Labelled field, aligned for `info`-style listings.
pub fn field(label: &str, value: impl Display) {
    println!("{:<14} {value}", format!("{label}:").dimmed());
}

pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn state_label(state: PluginState) -> ColoredString {
    match state {
        PluginState::Enabled => state.as_str().green(),
        PluginState::Disabled => state.as_str().yellow(),
        PluginState::Error => state.as_str().red(),
        PluginState::Discovered | PluginState::Loaded => state.as_str().normal(),
    }
}

pub fn trust_label(trust: TrustLevel) -> ColoredString {
    match trust {
        TrustLevel::Official => trust.as_str().green().bold(),
        TrustLevel::Trusted => trust.as_str().green(),
        TrustLevel::Community => trust.as_str().yellow(),
        TrustLevel::Unregistered => trust.as_str().red(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_keep_their_text() {
        colored::control::set_override(false);
        assert_eq!(state_label(PluginState::Enabled).to_string(), "enabled");
        assert_eq!(trust_label(TrustLevel::Community).to_string(), "community");
    }
}
