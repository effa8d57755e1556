// src/cli/dispatcher.rs

use crate::catalog;
use crate::cli::Cli;
use crate::cli::args::{Invocation, split_invocations};
use crate::cli::{help, prompt};
use crate::core::config::EngineConfig;
use crate::core::context::Context;
use crate::core::registry::Registry;
use crate::models::{Command, Object, downcast};
use anyhow::{Result, bail};
use colored::*;

/// The main application dispatcher.
///
/// Loads the configuration, registers the catalogue and runs every invocation
/// on the command line against one shared session.
pub fn run(cli: Cli) -> Result<()> {
    log::debug!("CLI args parsed: {:?}", cli);

    let mut config = EngineConfig::load_or_default(cli.config.as_deref())?;
    cli.apply_overrides(&mut config)?;

    let mut registry = Registry::new();
    catalog::register(&mut registry)?;

    let invocations = split_invocations(&cli.tokens)?;
    if invocations.is_empty() {
        help::print_overview(&registry, config.target_version.as_ref());
        return Ok(());
    }

    let mut session = new_session(&registry, &config);
    for invocation in invocations {
        if let Some(output) = execute(&mut session, invocation)? {
            println!("{}", output);
        }
    }
    Ok(())
}

/// A fresh context over `registry`, set up the way `config` asks.
pub fn new_session<'r>(registry: &'r Registry, config: &EngineConfig) -> Context<'r> {
    let mut context = Context::new(registry).with_config(config);
    catalog::install_conversions(context.converter_mut());
    if config.interactive {
        context = context.with_missing_argument_handler(prompt::ask);
    }
    context
}

/// Runs one invocation and returns what should be shown for it, if anything.
pub fn execute(context: &mut Context<'_>, invocation: Invocation) -> Result<Option<String>> {
    let Invocation {
        command: name,
        args,
        positionals,
    } = invocation;

    if name.eq_ignore_ascii_case("help") {
        match positionals.first() {
            Some(topic) => help::print_command(context.registry(), topic)?,
            None => help::print_overview(context.registry(), context.target_version()),
        }
        return Ok(None);
    }
    if let Some(stray) = positionals.first() {
        bail!(
            "Unexpected value '{}' for '{}'. Values must follow a --key.",
            stray,
            name
        );
    }

    let result = context.invoke(&name, args)?;
    let command = context.registry().lookup(&name)?;
    Ok(Some(describe_result(command, result)))
}

/// Text results are shown as they are; anything else gets a short confirmation.
fn describe_result(command: &Command, result: Option<Object>) -> String {
    match result.as_ref().and_then(downcast::<String>) {
        Some(text) => text.to_string(),
        None if result.is_some() => format!("{} {} is ready.", "✔".green(), command.returns),
        None => format!("{} {} done.", "✔".green(), command.name),
    }
}
