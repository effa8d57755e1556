// src/cli/mod.rs

use crate::core::config::EngineConfig;
use anyhow::{Context as _, Result};
use clap::Parser;

pub mod args;
pub mod dispatcher;
pub mod help;
pub mod prompt;

/// cascade: runs commands and builds everything they need along the way.
///
/// Several commands can share one session by separating them with a
/// standalone `+`:
///
/// ```text
/// cascade login --user alice --pass s3cret + open --app Fin1 + close
/// ```
///
/// `cascade help` lists every command, `cascade help <command>` describes one.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// Engine configuration file. Defaults to `<config dir>/cascade/cascade.toml`.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Prompt for any argument that was not supplied.
    #[arg(long, short)]
    pub interactive: bool,

    /// Only allow commands and parameters available in this version.
    #[arg(long, value_name = "VERSION")]
    pub target_version: Option<String>,

    /// The invocations: `<command> [--key value | -k value | --flag]... [+ <command> ...]`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub tokens: Vec<String>,
}

impl Cli {
    /// Applies the command-line flags on top of the file configuration.
    pub fn apply_overrides(&self, config: &mut EngineConfig) -> Result<()> {
        if self.interactive {
            config.interactive = true;
        }
        if let Some(raw) = &self.target_version {
            config.target_version = Some(
                raw.parse()
                    .with_context(|| format!("Invalid --target-version '{}'", raw))?,
            );
        }
        Ok(())
    }
}
