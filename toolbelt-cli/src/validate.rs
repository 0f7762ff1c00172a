use anyhow::Result;
use colored::*;
use serde::Serialize;
use toolbelt::{ScanReport, Toolbelt};

use crate::cli::ValidateFormat;
use crate::exit_codes::{EXIT_ERROR, EXIT_SUCCESS};

#[derive(Serialize)]
struct JsonValidationIssue {
    file_path: String,
    kind: &'static str,
    message: String,
}

#[derive(Serialize)]
struct JsonValidationResult {
    files_checked: usize,
    valid: usize,
    errors: usize,
    issues: Vec<JsonValidationIssue>,
}

fn issue_kind(error: &toolbelt::ToolbeltError) -> &'static str {
    match error {
        toolbelt::ToolbeltError::InvalidUnit { .. } => "invalid_unit",
        toolbelt::ToolbeltError::ImportFailure { .. } => "import_failure",
        _ => "error",
    }
}

fn print_text_results(report: &ScanReport, quiet: bool) {
    for failure in &report.failures {
        println!(
            "  {} {}: {}",
            "ERROR".red(),
            failure.path.display().to_string().bold(),
            failure.error
        );
    }

    if quiet {
        return;
    }

    if report.failures.is_empty() {
        println!(
            "{} All {} tool units validated successfully!",
            "✓".green(),
            report.total()
        );
        return;
    }

    println!("\n{}", "Summary:".bold());
    println!("  Files checked: {}", report.total());
    println!("  Valid: {}", report.loaded.len().to_string().green());
    println!("  Errors: {}", report.failures.len().to_string().red());
    println!("\n{} Validation failed with errors.", "✗".red());
}

fn print_json_results(report: &ScanReport) -> Result<()> {
    let result = JsonValidationResult {
        files_checked: report.total(),
        valid: report.loaded.len(),
        errors: report.failures.len(),
        issues: report
            .failures
            .iter()
            .map(|failure| JsonValidationIssue {
                file_path: failure.path.display().to_string(),
                kind: issue_kind(&failure.error),
                message: failure.error.to_string(),
            })
            .collect(),
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

pub async fn run_validate_command(
    toolbelt: &Toolbelt,
    quiet: bool,
    format: ValidateFormat,
) -> Result<i32> {
    let report = toolbelt.validate().await?;

    match format {
        ValidateFormat::Text => print_text_results(&report, quiet),
        ValidateFormat::Json => print_json_results(&report)?,
    }

    if report.failures.is_empty() {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_ERROR)
    }
}
