//! Toolbelt CLI Library
//!
//! Command-line definitions, exit codes and logging helpers for the
//! `toolbelt` binary, exposed so they can be tested directly.

/// Command-line interface definitions and argument parsing
pub mod cli;
/// Exit codes used by the CLI application
pub mod exit_codes;
/// Log output setup
pub mod logging;
