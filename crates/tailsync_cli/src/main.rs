//! Tailsync CLI - command-line interface for checkpointed feed syncing.

mod commands;
mod config;
mod progress;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::Term;
use tailsync::{Chain, DataType};
use tracing_subscriber::EnvFilter;

use crate::commands::checkpoint::OutputFormat;
use crate::commands::sync::SyncArgs;

#[derive(Parser)]
#[command(name = "tailsync")]
#[command(version)]
#[command(about = "Checkpointed backfill and live tailing of NFT event feeds")]
#[command(
    long_about = "Tailsync backfills a paginated event feed (sales or transfers) month by \
month from a start date, splitting each month across concurrent workers, then keeps \
tailing the current month for new and deleted events. Progress is checkpointed to the \
database so an interrupted run resumes where it stopped."
)]
#[command(after_long_help = r#"EXAMPLES
    Backfill sales on Ethereum since January 2023, then tail live:
        $ tailsync sync sales --from 2023-01-01

    Transfers on Base for two contracts, eight workers per month:
        $ tailsync sync transfers --chain base --workers 8 \
            --contract 0xabc... --contract 0xdef...

    Start over, ignoring the stored checkpoint:
        $ tailsync sync sales --from 2023-01-01 --fresh

    Inspect stored checkpoints:
        $ tailsync checkpoint show

    Generate shell completions:
        $ tailsync completions bash > ~/.local/share/bash-completion/completions/tailsync

CONFIGURATION
    Tailsync reads configuration from:
      1. ~/.config/tailsync/config.toml (or $XDG_CONFIG_HOME/tailsync/config.toml)
      2. ./tailsync.toml
      3. Environment variables (TAILSYNC_* prefix, e.g., TAILSYNC_API_KEY)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    TAILSYNC_DATABASE_URL     Database connection string (default: ~/.local/state/tailsync/tailsync.db)
    TAILSYNC_API_KEY          Upstream API key
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backfill a feed from its start month, then tail live data
    Sync(SyncArgs),
    /// Inspect or clear stored checkpoints
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
    /// Generate man page(s)
    Man {
        /// Output directory for man pages (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// Show stored checkpoints
    Show {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Delete the checkpoint of one feed so the next sync starts fresh
    Clear {
        /// Data type (sales or transfers)
        data_type: DataType,

        /// Chain the feed is read from (default from config or ethereum)
        #[arg(short = 'C', long)]
        chain: Option<Chain>,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Rollback the last migration
    Down,
    /// Show migration status
    Status,
    /// Fresh install - drop all tables and reapply migrations
    Fresh,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing for non-TTY mode (structured logging)
    // Only initialize if not connected to a TTY
    if !Term::stdout().is_term() {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::new("tailsync=info,tailsync_cli=info"),
        };

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    // Load configuration (config file -> env vars -> defaults)
    let config = config::Config::load();

    let cli = Cli::parse();

    // Handle commands that don't require database access first
    match &cli.command {
        Commands::Completions { shell } => {
            commands::meta::handle_completions(*shell)?;
            return Ok(());
        }
        Commands::Man { output } => {
            commands::meta::handle_man(output.clone())?;
            return Ok(());
        }
        _ => {}
    }

    let database_url = config
        .database_url()
        .ok_or("Could not determine a database URL; set TAILSYNC_DATABASE_URL")?;

    // Ensure the database directory exists for SQLite
    if database_url.starts_with("sqlite://") {
        let db_path = database_url.trim_start_matches("sqlite://");
        // Strip query parameters (e.g., ?mode=rwc) before path operations
        let db_path = db_path.split('?').next().unwrap_or(db_path);
        let db_path = std::path::Path::new(db_path);

        // Warn if using a relative path (can cause issues depending on cwd)
        if db_path.is_relative()
            && !db_path.as_os_str().is_empty()
            && db_path.as_os_str() != ":memory:"
        {
            tracing::warn!(
                "Database path '{}' is relative - behavior depends on current directory. \
                 Consider using an absolute path.",
                db_path.display()
            );
        }

        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
    }

    match cli.command {
        Commands::Sync(args) => {
            commands::sync::handle_sync(args, &config, &database_url).await?;
        }
        Commands::Checkpoint { action } => {
            commands::checkpoint::handle_checkpoint(action, &config, &database_url).await?;
        }
        Commands::Migrate { action } => {
            commands::migrate::handle_migrate(action, &database_url).await?;
        }
        Commands::Completions { .. } | Commands::Man { .. } => {}
    }

    Ok(())
}
