//! Operator CLI over the pin store.
//!
//! # Responsibility
//! - Inspect a pin database file without running the pinning service.
//! - Print records as JSON lines for piping into other tools.

use clap::{Args, Parser, Subcommand};
use log::error;
use pinrepo_core::db::open_pool;
use pinrepo_core::{
    init_logging, init_stderr_logging, KeyLockRegistry, OwnerScope, PinQuery, PinService,
    PinState, PinStatus, PoolConfig, SqlitePinStore, TextMatch,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "pinrepo", version, about = "Inspect pin records")]
struct Cli {
    /// SQLite database file.
    #[arg(long, default_value = "pins.db")]
    db: PathBuf,
    /// Maximum pooled connections.
    #[arg(long, default_value_t = pinrepo_core::config::DEFAULT_POOL_SIZE)]
    pool_size: u32,
    /// trace|debug|info|warn|error
    #[arg(long, default_value_t = pinrepo_core::default_log_level().to_string())]
    log_level: String,
    /// Absolute directory for rotating log files. Logs go to stderr when unset.
    #[arg(long)]
    log_dir: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List records matching filters, newest first.
    List(ListArgs),
    /// Count records referencing a CID across all owners.
    CountCid { cid: String },
    /// Stream every record with the given statuses in batches.
    Scan {
        #[arg(long = "status", value_parser = parse_state)]
        statuses: Vec<PinState>,
    },
    /// Print the core version.
    Version,
}

#[derive(Debug, Args)]
struct ListArgs {
    /// Restrict to one owner.
    #[arg(long, conflicts_with = "all_owners", required_unless_present = "all_owners")]
    owner: Option<i64>,
    /// Search every owner.
    #[arg(long)]
    all_owners: bool,
    #[arg(long = "cid")]
    cids: Vec<String>,
    #[arg(long = "status", value_parser = parse_state)]
    statuses: Vec<PinState>,
    #[arg(long)]
    name: Option<String>,
    /// exact|iexact|partial|ipartial
    #[arg(long = "match", default_value = "exact")]
    name_match: String,
    /// Epoch milliseconds, exclusive.
    #[arg(long)]
    before: Option<i64>,
    /// Epoch milliseconds, exclusive.
    #[arg(long)]
    after: Option<i64>,
    #[arg(long, default_value_t = 10)]
    limit: u32,
}

impl ListArgs {
    fn query(&self) -> PinQuery {
        let scope = match self.owner {
            Some(owner) if !self.all_owners => OwnerScope::Owner(owner),
            _ => OwnerScope::Any,
        };
        let mut query = PinQuery::with_scope(scope)
            .cids(self.cids.iter().cloned())
            .statuses(self.statuses.iter().copied())
            .limit(self.limit);
        if let Some(name) = &self.name {
            query = query.name(name.clone(), TextMatch::parse_lenient(&self.name_match));
        }
        query.before = self.before;
        query.after = self.after;
        query
    }
}

fn parse_state(value: &str) -> Result<PinState, String> {
    PinState::parse(value)
        .ok_or_else(|| format!("unknown status `{value}`; expected queued|pinning|pinned|failed"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let logging = match cli.log_dir.as_deref() {
        Some(dir) => init_logging(&cli.log_level, dir),
        None => init_stderr_logging(&cli.log_level),
    };
    if let Err(message) = logging {
        eprintln!("pinrepo: {message}");
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("event=cli_run module=cli status=error error={message}");
            eprintln!("pinrepo: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    if let Command::Version = cli.command {
        println!("pinrepo_core version={}", pinrepo_core::core_version());
        return Ok(());
    }

    let pool_config = PoolConfig {
        max_size: cli.pool_size,
        ..PoolConfig::default()
    };
    let pool = open_pool(&cli.db, &pool_config)
        .map_err(|err| format!("open {}: {err}", cli.db.display()))?;
    let service = PinService::new(SqlitePinStore::pooled(pool), Arc::new(KeyLockRegistry::new()));

    match cli.command {
        Command::List(args) => {
            let results = service.find(&args.query()).map_err(|err| err.to_string())?;
            eprintln!("count={}", results.count);
            for status in &results.results {
                print_json(status)?;
            }
        }
        Command::CountCid { cid } => {
            let count = service.count_by_cid(&cid).map_err(|err| err.to_string())?;
            println!("{count}");
        }
        Command::Scan { statuses } => {
            for batch in service.stream_by_status(&statuses) {
                for status in batch.map_err(|err| err.to_string())? {
                    print_json(&status)?;
                }
            }
        }
        Command::Version => {}
    }
    Ok(())
}

fn print_json(status: &PinStatus) -> Result<(), String> {
    let line = serde_json::to_string(status).map_err(|err| err.to_string())?;
    println!("{line}");
    Ok(())
}
