//! attrflow command line entry point.
//!
//! # Responsibility
//! - Parse flags and environment, bootstrap logging, dispatch one command.
//! - Print the command result as JSON on stdout, or a JSON error on stderr
//!   with a non-zero exit code.

mod cli;

use attrflow_core::{default_log_level, init_logging, LogTarget};
use clap::Parser;
use serde_json::json;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = cli::Cli::parse();

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| default_log_level().to_string());
    let target = match &cli.log_dir {
        Some(dir) => LogTarget::Directory(dir.clone()),
        None => LogTarget::Stderr,
    };
    if let Err(message) = init_logging(&level, target) {
        eprintln!("{}", json!({ "error": "logging", "message": message }));
        return ExitCode::FAILURE;
    }

    match cli::run(cli) {
        Ok(output) => match serde_json::to_string_pretty(&output) {
            Ok(rendered) => {
                println!("{rendered}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("{}", json!({ "error": "json", "message": err.to_string() }));
                ExitCode::FAILURE
            }
        },
        Err(err) => {
            eprintln!(
                "{}",
                json!({ "error": err.kind(), "message": err.to_string() })
            );
            ExitCode::FAILURE
        }
    }
}
