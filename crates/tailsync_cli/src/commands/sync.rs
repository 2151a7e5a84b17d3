//! The `sync` command: backfill a feed, then tail it until interrupted.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use console::{Term, style};

use tailsync::sync::{Orchestrator, SyncConfig, SyncDeps, SyncSummary};
use tailsync::{
    ApiClient, ApiRateLimiter, Chain, ContractAllowList, DataType, DatabaseCheckpointStore,
    DatabaseStore, MemoryCheckpointStore, MemoryRowStore,
};

use crate::config::Config;
use crate::progress::ProgressReporter;
use crate::shutdown::setup_shutdown_handler;

/// Options for one sync run. Unset options fall back to the config file.
#[derive(Debug, Clone, clap::Args)]
pub(crate) struct SyncArgs {
    /// Data type to sync (sales or transfers)
    pub data_type: DataType,

    /// Chain to read from (default from config or ethereum)
    #[arg(short = 'C', long)]
    pub chain: Option<Chain>,

    /// First day of the backfill, e.g. 2023-01-01 (default from config)
    #[arg(short = 'f', long = "from")]
    pub start_date: Option<NaiveDate>,

    /// Months synced concurrently (default from config or 4)
    #[arg(short = 'u', long)]
    pub units: Option<usize>,

    /// Workers per month (default from config or 4)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Only sync these contracts (repeatable; default from config, empty = all)
    #[arg(short = 'c', long = "contract")]
    pub contracts: Vec<String>,

    /// Ignore any stored checkpoint and start from the start date
    #[arg(long)]
    pub fresh: bool,

    /// Dry run - fetch and transform pages without writing to the database
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Disable proactive rate limiting (may cause API throttling)
    #[arg(short = 'R', long)]
    pub no_rate_limit: bool,

    /// Proactive request rate (default from config or 4)
    #[arg(long)]
    pub rps: Option<u32>,

    /// Seconds between polls once a window is caught up (default from config or 15)
    #[arg(long)]
    pub tail_interval: Option<u64>,
}

impl SyncArgs {
    /// Merge flags over the config file into a library sync configuration.
    pub(crate) fn to_sync_config(
        &self,
        config: &Config,
    ) -> Result<SyncConfig, Box<dyn std::error::Error>> {
        let defaults = &config.sync;
        let chain = self.chain.unwrap_or(defaults.chain);
        let start_date = self.start_date.or(defaults.start_date).ok_or(
            "No start date given; pass --from or set sync.start_date in the config file",
        )?;

        let contracts = if self.contracts.is_empty() {
            ContractAllowList::new(&defaults.contracts)
        } else {
            ContractAllowList::new(&self.contracts)
        };

        let sync_config = SyncConfig::new(self.data_type, chain, start_date)
            .with_contracts(contracts)
            .with_units(
                self.units.unwrap_or(defaults.units),
                self.workers.unwrap_or(defaults.workers_per_unit),
            )
            .with_resume(!self.fresh)
            .with_intervals(
                Duration::from_secs(self.tail_interval.unwrap_or(defaults.tail_interval_secs)),
                Duration::from_secs(defaults.retry_backoff_secs),
                Duration::from_secs(defaults.checkpoint_interval_secs),
            );

        sync_config.validate()?;
        Ok(sync_config)
    }

    fn rate_limiter(&self, config: &Config) -> Option<ApiRateLimiter> {
        if self.no_rate_limit || config.api.no_rate_limit {
            None
        } else {
            Some(ApiRateLimiter::new(
                self.rps.unwrap_or(config.api.requests_per_second),
            ))
        }
    }
}

/// Handle the sync command.
pub(crate) async fn handle_sync(
    args: SyncArgs,
    config: &Config,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let is_tty = Term::stdout().is_term();
    let sync_config = args.to_sync_config(config)?;

    let rate_limiter = args.rate_limiter(config);
    if rate_limiter.is_none() && is_tty {
        eprintln!("Warning: Rate limiting disabled - you may experience API throttling\n");
    }

    let client = ApiClient::new(sync_config.chain, config.api_key(), rate_limiter)?;

    let deps = if args.dry_run {
        if is_tty {
            println!(
                "{} Dry run: rows and checkpoints are kept in memory only\n",
                style("ℹ").blue().bold()
            );
        } else {
            tracing::info!("Dry run: rows and checkpoints are kept in memory only");
        }
        SyncDeps::new(
            Arc::new(client),
            Arc::new(MemoryRowStore::new()),
            Arc::new(MemoryCheckpointStore::new()),
        )
    } else {
        let db = tailsync::connect_and_migrate(database_url).await?;
        SyncDeps::new(
            Arc::new(client),
            Arc::new(DatabaseStore::new(db.clone())),
            Arc::new(DatabaseCheckpointStore::new(db)),
        )
    };

    if is_tty {
        println!(
            "Syncing {} on {} from {}...\n",
            style(sync_config.data_type).cyan(),
            style(sync_config.chain).cyan(),
            sync_config.start_date
        );
    }

    let reporter = Arc::new(ProgressReporter::new());
    let mut orchestrator = Orchestrator::new(sync_config, deps, Some(reporter.as_callback()))?;

    let cancel = setup_shutdown_handler();
    let result = orchestrator.run(cancel).await;
    reporter.finish();

    let summary = result?;
    display_summary(&summary, is_tty);

    Ok(())
}

/// Print run totals.
fn display_summary(summary: &SyncSummary, is_tty: bool) {
    if is_tty {
        println!();
        println!("{} Sync stopped", style("✓").green().bold());
        println!("  Pages fetched:     {}", summary.pages_fetched);
        println!("  Rows written:      {}", summary.rows_written);
        println!("  Checkpoints saved: {}", summary.checkpoints_saved);
        if summary.page_failures > 0 {
            println!(
                "  {} {}",
                style("Page failures:").yellow(),
                summary.page_failures
            );
        }
        if summary.units_retired > 0 {
            println!("  Units retired:     {}", summary.units_retired);
        }
        let phase = if summary.backfilled {
            style("caught up, tailing").green()
        } else {
            style("backfill in progress").yellow()
        };
        println!("  State:             {}", phase);
    } else {
        tracing::info!(
            pages_fetched = summary.pages_fetched,
            page_failures = summary.page_failures,
            rows_written = summary.rows_written,
            units_retired = summary.units_retired,
            checkpoints_saved = summary.checkpoints_saved,
            backfilled = summary.backfilled,
            "Sync stopped"
        );
    }
}
