// src/cli/args.rs

use crate::constants::INVOCATION_SEPARATOR;
use crate::core::arguments::ArgMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgsError {
    #[error("Expected a command name, found '{0}'.")]
    MissingCommand(String),
    #[error("Empty invocation: '+' must sit between two commands.")]
    EmptyInvocation,
    #[error("Empty argument name in '{0}'.")]
    EmptyKey(String),
}

/// One command call taken from the command line.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub command: String,
    pub args: ArgMap,
    /// Values that did not follow a `--key`. Only `help` accepts these.
    pub positionals: Vec<String>,
}

/// Splits the raw tokens into invocations on every standalone `+`.
///
/// No tokens at all yields no invocations.
pub fn split_invocations(tokens: &[String]) -> Result<Vec<Invocation>, ArgsError> {
    if tokens.is_empty() {
        return Ok(Vec::new());
    }
    tokens
        .split(|t| t == INVOCATION_SEPARATOR)
        .map(parse_invocation)
        .collect()
}

/// Parses `<command> [--key value | -k value | --key=value | --flag | positional]...`.
///
/// A key followed by another key (or by nothing) is a flag and gets the value
/// `"true"`. Negative numbers are values, not keys.
fn parse_invocation(tokens: &[String]) -> Result<Invocation, ArgsError> {
    let mut iter = tokens.iter().map(String::as_str).peekable();

    let command = match iter.next() {
        None => return Err(ArgsError::EmptyInvocation),
        Some(first) if is_key(first) => return Err(ArgsError::MissingCommand(first.to_string())),
        Some(first) => first.to_string(),
    };

    let mut args = ArgMap::new();
    let mut positionals = Vec::new();

    while let Some(token) = iter.next() {
        let Some(key) = strip_key(token) else {
            positionals.push(token.to_string());
            continue;
        };

        if let Some((key, value)) = key.split_once('=') {
            if key.is_empty() {
                return Err(ArgsError::EmptyKey(token.to_string()));
            }
            args.insert(key, value);
            continue;
        }
        if key.is_empty() {
            return Err(ArgsError::EmptyKey(token.to_string()));
        }

        let value = match iter.peek() {
            Some(next) if !is_key(next) => iter.next().unwrap_or("true"),
            _ => "true",
        };
        args.insert(key, value);
    }

    log::debug!("Parsed invocation '{}': {:?}", command, args);
    Ok(Invocation {
        command,
        args,
        positionals,
    })
}

fn strip_key(token: &str) -> Option<&str> {
    if !is_key(token) {
        return None;
    }
    token.strip_prefix("--").or_else(|| token.strip_prefix('-'))
}

fn is_key(token: &str) -> bool {
    token.starts_with('-') && token.parse::<f64>().is_err()
}
