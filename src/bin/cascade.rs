// src/bin/cascade.rs

use cascade::cli::{Cli, dispatcher};
use clap::Parser;
use colored::*;

/// The main entry point of the `cascade` application.
/// It sets up logging, parses arguments, hands them to the dispatcher
/// and performs centralized error handling.
fn main() {
    env_logger::init();

    if let Err(e) = dispatcher::run(Cli::parse()) {
        eprintln!("\n{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}
