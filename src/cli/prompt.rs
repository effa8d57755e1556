// src/cli/prompt.rs

use crate::models::{Parameter, Setting};
use dialoguer::{Input, Password, theme::ColorfulTheme};

/// Asks the user for a parameter the command line did not supply.
///
/// Sensitive parameters are read without echo. An interrupted or failed
/// prompt leaves the parameter unresolved.
pub fn ask(parameter: &Parameter) -> Option<String> {
    let prompt = prompt_text(parameter);
    let theme = ColorfulTheme::default();

    let answer = if parameter.is_sensitive() {
        Password::with_theme(&theme)
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()
    } else {
        let mut input = Input::<String>::with_theme(&theme).with_prompt(prompt);
        if let Some(default) = parameter.default_value() {
            input = input.default(default.to_string());
        }
        input.interact_text()
    };

    match answer {
        Ok(value) => Some(value),
        Err(e) => {
            log::debug!("Prompt for '{}' failed: {}", parameter.name(), e);
            None
        }
    }
}

fn prompt_text(parameter: &Parameter) -> String {
    match parameter.description() {
        Some(description) => format!("{} ({})", parameter.name(), description),
        None => parameter.name().to_string(),
    }
}
