use anyhow::Result;
use colored::*;
use is_terminal::IsTerminal;
use std::io;
use tabled::{
    settings::{object::Rows, Alignment, Color, Modify, Style},
    Table, Tabled,
};
use toolbelt::{ToolDefinition, Toolbelt};

use crate::cli::OutputFormat;

const DESCRIPTION_WIDTH: usize = 50;

#[derive(Tabled)]
struct ToolRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Description")]
    description: String,
    #[tabled(rename = "Source")]
    source: String,
}

#[derive(serde::Serialize)]
struct ToolInfo {
    name: String,
    description: String,
    source: String,
    input_schema: serde_json::Map<String, serde_json::Value>,
}

impl From<&ToolDefinition> for ToolInfo {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            source: tool.source().display().to_string(),
            input_schema: tool.input_schema().clone(),
        }
    }
}

pub async fn run_list_command(toolbelt: &Toolbelt, format: OutputFormat) -> Result<()> {
    let tools = toolbelt.load_tools().await?;
    print_tools(&tools, format)
}

/// Print `tools` in the requested format
pub fn print_tools(tools: &[ToolDefinition], format: OutputFormat) -> Result<()> {
    let infos: Vec<ToolInfo> = tools.iter().map(ToolInfo::from).collect();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&infos)?);
        }
        OutputFormat::Table => display_table(&infos),
    }

    Ok(())
}

/// The unit's own description, without the provenance footer
fn summary(description: &str) -> &str {
    description
        .split("\n\n")
        .next()
        .unwrap_or(description)
        .lines()
        .next()
        .unwrap_or("")
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        let kept: String = text.chars().take(width - 3).collect();
        format!("{kept}...")
    } else {
        text.to_string()
    }
}

fn display_table(infos: &[ToolInfo]) {
    if infos.is_empty() {
        println!("No tools found.");
        return;
    }

    let is_tty = io::stdout().is_terminal();

    let rows: Vec<ToolRow> = infos
        .iter()
        .map(|info| ToolRow {
            name: info.name.clone(),
            description: truncate(summary(&info.description), DESCRIPTION_WIDTH),
            source: info.source.clone(),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::modern());

    if is_tty {
        table.with(Modify::new(Rows::one(0)).with(Color::FG_BRIGHT_CYAN));
    }

    table.with(Modify::new(Rows::new(1..)).with(Alignment::left()));

    println!("{}", table);

    if is_tty {
        println!();
        println!(
            "{} {} tools. Use {} for schemas.",
            "●".green(),
            infos.len(),
            "--format json".cyan()
        );
    }
}
