// src/cli/help.rs

use crate::core::registry::Registry;
use crate::core::version::Version;
use crate::models::{Parameter, Setting};
use anyhow::Result;
use colored::*;

/// Lists every registered command.
pub fn print_overview(registry: &Registry, target: Option<&Version>) {
    println!("\n--- {} ---", "Available commands".green());
    for command in registry.commands() {
        let name = overview_label(&command.name, command.alias.as_deref());
        let unavailable = target.is_some_and(|v| !command.versions.applies_to(v));
        let description = command.description.as_deref().unwrap_or("");
        if unavailable {
            println!("  {} {} {}", name.cyan().bold(), description.dimmed(), "[unavailable]".red());
        } else {
            println!("  {} {}", name.cyan().bold(), description);
        }
    }
    println!(
        "\nRun `{}` for the parameters of one command.",
        "cascade help <command>".yellow()
    );
}

/// The padded name column of the overview. Padding happens before colouring
/// so escape codes don't count toward the width.
fn overview_label(name: &str, alias: Option<&str>) -> String {
    let label = match alias {
        Some(alias) => format!("{} ({})", name, alias),
        None => name.to_string(),
    };
    format!("{:<30}", label)
}

/// Describes one command and its parameters.
pub fn print_command(registry: &Registry, name: &str) -> Result<()> {
    let command = registry.lookup(name)?;

    println!("\n--- {} '{}' ---", "Command".green(), command.name.yellow());
    if let Some(description) = &command.description {
        println!("  {}", description);
    }
    if let Some(alias) = &command.alias {
        println!("  {} {}", format!("{:<12}", "Alias:").blue(), alias);
    }
    println!("  {} {}", format!("{:<12}", "Runs on:").blue(), command.host);
    if !command.versions.is_unbounded() {
        println!("  {} {}", format!("{:<12}", "Versions:").blue(), command.versions);
    }

    if command.parameters.is_empty() {
        println!("\n  {}", "No parameters.".dimmed());
        return Ok(());
    }
    println!("\n  {}", "Parameters:".blue());
    for parameter in &command.parameters {
        print_parameter(registry, parameter);
    }
    Ok(())
}

fn print_parameter(registry: &Registry, parameter: &Parameter) {
    if !parameter.has_metadata {
        println!(
            "    {} {}",
            format!("{:<22}", format!("<{}>", parameter.value_type())).dimmed(),
            "provided by the session".dimmed()
        );
        return;
    }

    println!(
        "    {} {}",
        format!("{:<22}", describe_key(parameter)).cyan(),
        describe_setting(parameter)
    );

    if parameter.is_collection {
        for setting in registry.settings(parameter.value_type()) {
            let key = if setting.dynamic {
                "--<name>".to_string()
            } else {
                describe_key(setting)
            };
            println!("      {} {}", format!("{:<20}", key).cyan(), describe_setting(setting));
        }
    }
}

fn describe_key(setting: &dyn Setting) -> String {
    match setting.alias() {
        Some(alias) if alias.len() == 1 => format!("--{}, -{}", setting.name(), alias),
        Some(alias) => format!("--{}, --{}", setting.name(), alias),
        None => format!("--{}", setting.name()),
    }
}

fn describe_setting(setting: &dyn Setting) -> String {
    let mut parts = vec![format!("<{}>", setting.value_type())];
    if let Some(description) = setting.description() {
        parts.push(description.to_string());
    }
    if let Some(default) = setting.default_value() {
        parts.push(format!("(default: {})", default));
    }
    if setting.is_sensitive() {
        parts.push("(sensitive)".to_string());
    }
    if !setting.versions().is_unbounded() {
        parts.push(format!("[{}]", setting.versions()));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;

    #[test]
    fn test_describe_key_and_setting() {
        let mut registry = Registry::new();
        catalog::register(&mut registry).unwrap();
        let login = registry.lookup("Login").unwrap();

        let user = login.parameter("user").unwrap();
        assert_eq!(describe_key(user), "--user, -u");

        let pass = login.parameter("pass").unwrap();
        let text = describe_setting(pass);
        assert!(text.starts_with("<String>"));
        assert!(text.contains("(sensitive)"));

        let resume = registry.lookup("Resume").unwrap();
        let token = resume.parameter("token").unwrap();
        assert!(describe_setting(token).contains("[since 1.1]"));
    }

    #[test]
    fn test_overview_names_are_padded_before_colouring() {
        let plain = overview_label("Login", None);
        let aliased = overview_label("Open", Some("o"));
        assert_eq!(plain.len(), 30);
        assert_eq!(aliased.len(), 30);
        assert!(aliased.starts_with("Open (o)"));
    }

    #[test]
    fn test_unknown_command_help_is_an_error() {
        let registry = Registry::new();
        assert!(print_command(&registry, "nope").is_err());
    }
}
