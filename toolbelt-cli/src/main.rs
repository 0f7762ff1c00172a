use std::process;
mod call;
mod cli;
mod error;
mod exit_codes;
mod list;
mod logging;
mod validate;
mod watch;

use clap::CommandFactory;
use cli::{Cli, Commands};
use error::{handle_cli_result, CliError};
use exit_codes::{EXIT_ERROR, EXIT_SUCCESS, EXIT_WARNING};
use toolbelt::Toolbelt;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    // Fast path for help
    let Some(command) = cli.command.as_ref() else {
        if let Err(e) = Cli::command().print_help() {
            eprintln!("Failed to print help: {e}");
            process::exit(EXIT_WARNING);
        }
        process::exit(EXIT_SUCCESS);
    };

    if !Cli::should_use_color() {
        colored::control::set_override(false);
    }

    let level = logging::log_level(cli.quiet, cli.debug, cli.verbose);
    logging::init_logging(level, cli.log_file().as_deref());

    let toolbelt = match Toolbelt::new(cli.config()) {
        Ok(toolbelt) => toolbelt,
        Err(e) => {
            tracing::error!("Failed to set up toolbelt: {}", e);
            process::exit(handle_cli_result(Err(CliError::from(e))));
        }
    };

    let exit_code = match command {
        Commands::List { format } => {
            tracing::debug!("Running list command");
            run_list(&toolbelt, *format).await
        }
        Commands::Call { name, args, json } => {
            tracing::debug!("Running call command for '{}'", name);
            handle_cli_result(call::run_call_command(&toolbelt, name, args, json.as_deref()).await)
        }
        Commands::Validate { quiet, format } => {
            tracing::debug!("Running validate command");
            run_validate(&toolbelt, *quiet, *format).await
        }
        Commands::Watch => {
            tracing::info!("Starting watch");
            run_watch(&toolbelt).await
        }
    };

    process::exit(exit_code);
}

async fn run_list(toolbelt: &Toolbelt, format: cli::OutputFormat) -> i32 {
    handle_cli_result(
        list::run_list_command(toolbelt, format)
            .await
            .map(|()| EXIT_SUCCESS)
            .map_err(CliError::from),
    )
}

/// Runs the validate command.
///
/// # Returns
///
/// Exit code:
/// - 0: Every unit loaded
/// - 2: At least one unit is invalid
async fn run_validate(toolbelt: &Toolbelt, quiet: bool, format: cli::ValidateFormat) -> i32 {
    match validate::run_validate_command(toolbelt, quiet, format).await {
        Ok(exit_code) => exit_code,
        Err(e) => {
            tracing::error!("Validate error: {}", e);
            EXIT_ERROR
        }
    }
}

async fn run_watch(toolbelt: &Toolbelt) -> i32 {
    match watch::run_watch_command(toolbelt).await {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            tracing::error!("Watch error: {}", e);
            EXIT_WARNING
        }
    }
}
