use anyhow::Result;
use colored::*;
use tokio_util::sync::CancellationToken;
use toolbelt::Toolbelt;

use crate::cli::OutputFormat;
use crate::list::print_tools;

/// Print the tool list, then again after every change, until Ctrl-C
pub async fn run_watch_command(toolbelt: &Toolbelt) -> Result<()> {
    let mut changes = toolbelt.subscribe();
    toolbelt.start_watching().await?;

    println!(
        "{} Watching {} for {} (Ctrl-C to stop)",
        "👀".cyan(),
        toolbelt.config().target_folder.display(),
        toolbelt.config().glob
    );
    print_tools(&toolbelt.load_tools().await?, OutputFormat::Table)?;

    let ct = CancellationToken::new();
    let ct_signal = ct.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
        }
        ct_signal.cancel();
    });

    loop {
        tokio::select! {
            _ = ct.cancelled() => break,
            change = changes.recv() => {
                let Some(change) = change else { break };
                println!(
                    "\n{} Tools changed (generation {})",
                    "🔄".yellow(),
                    change.generation
                );
                for path in &change.paths {
                    println!("  {}", path.display().to_string().dimmed());
                }
                match toolbelt.load_tools().await {
                    Ok(tools) => print_tools(&tools, OutputFormat::Table)?,
                    Err(e) => tracing::error!("Failed to reload tools: {}", e),
                }
            }
        }
    }

    toolbelt.stop_watching().await;
    println!("{} Stopped watching", "✓".green());
    Ok(())
}
