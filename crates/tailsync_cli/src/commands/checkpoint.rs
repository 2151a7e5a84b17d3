//! The `checkpoint` command: inspect and clear stored sync state.

use clap::ValueEnum;
use console::style;
use tabled::{Table, Tabled, settings::Style};

use tailsync::store::SavedCheckpoint;
use tailsync::{CheckpointStore, DatabaseCheckpointStore};

use crate::CheckpointAction;
use crate::config::Config;

/// Output format for checkpoint display.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Display as a formatted table (default)
    #[default]
    Table,
    /// Display as JSON
    Json,
}

/// One row per stored checkpoint.
#[derive(Debug, Clone, serde::Serialize, Tabled)]
struct CheckpointDisplay {
    #[tabled(rename = "Feed")]
    feed: String,
    #[tabled(rename = "Cursor")]
    cursor: String,
    #[tabled(rename = "Months")]
    months: String,
    #[tabled(rename = "Pending Workers")]
    pending_workers: usize,
    #[tabled(rename = "Backfilled")]
    backfilled: bool,
    #[tabled(rename = "Saved")]
    saved_at: String,
}

impl From<&SavedCheckpoint> for CheckpointDisplay {
    fn from(saved: &SavedCheckpoint) -> Self {
        let months = saved
            .checkpoint
            .managers
            .iter()
            .map(|m| {
                if m.backfilled {
                    format!("{}*", m.date)
                } else {
                    m.date.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(", ");

        Self {
            feed: format!("{}/{}", saved.data_type, saved.chain),
            cursor: saved.checkpoint.date.to_string(),
            months,
            pending_workers: saved.checkpoint.pending_workers(),
            backfilled: saved.checkpoint.backfilled,
            saved_at: saved.saved_at.format("%Y-%m-%d %H:%M:%S %z").to_string(),
        }
    }
}

/// Handle checkpoint commands.
pub(crate) async fn handle_checkpoint(
    action: CheckpointAction,
    config: &Config,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = DatabaseCheckpointStore::new(tailsync::connect_and_migrate(database_url).await?);

    match action {
        CheckpointAction::Show { output } => {
            show_checkpoints(&store, output).await?;
        }
        CheckpointAction::Clear {
            data_type,
            chain,
            yes,
        } => {
            let chain = chain.unwrap_or(config.sync.chain);
            let feed = format!("{}/{}", data_type, chain);

            if !yes {
                print!(
                    "{} Clear the checkpoint for '{}'? The next sync starts over. [y/N] ",
                    style("⚠").yellow().bold(),
                    style(&feed).cyan()
                );
                use std::io::{self, Write};
                io::stdout().flush()?;

                let mut input = String::new();
                io::stdin().read_line(&mut input)?;

                if !input.trim().eq_ignore_ascii_case("y") {
                    println!("Aborted.");
                    return Ok(());
                }
            }

            if store.clear(data_type, chain).await? {
                println!(
                    "{} Cleared checkpoint for '{}'",
                    style("✓").green().bold(),
                    style(&feed).cyan()
                );
            } else {
                println!("No checkpoint stored for '{}'", feed);
            }
        }
    }
    Ok(())
}

async fn show_checkpoints(
    store: &DatabaseCheckpointStore,
    output: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let saved = store.list().await?;

    match output {
        OutputFormat::Table => {
            if saved.is_empty() {
                println!("No checkpoints stored.");
                return Ok(());
            }
            let rows: Vec<CheckpointDisplay> = saved.iter().map(CheckpointDisplay::from).collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{}", table);
            println!("  * month is tailing live data");
        }
        OutputFormat::Json => {
            let values = saved
                .iter()
                .map(|s| {
                    Ok(serde_json::json!({
                        "data_type": s.data_type,
                        "chain": s.chain,
                        "saved_at": s.saved_at,
                        "checkpoint": s.checkpoint.to_json()?,
                    }))
                })
                .collect::<Result<Vec<_>, tailsync::CheckpointError>>()?;
            println!("{}", serde_json::to_string_pretty(&values)?);
        }
    }
    Ok(())
}
