//! BondLab CLI — sync, rating and config commands.
//!
//! Commands:
//! - `sync`: fetch every configured dataset, merge, and upsert into the store
//! - `rating`: normalize free-text ratings and show their rank
//! - `config show`: print the effective configuration as TOML

use anyhow::{Context, Result};
use bondlab_core::clock::SystemClock;
use bondlab_core::data::{CookieRefresher, NoRefresher, RefreshingSessionStore, ReqwestTransport};
use bondlab_core::domain::SourceEndpoint;
use bondlab_core::rating::normalize_rating;
use bondlab_core::transform::KeywordClassifier;
use bondlab_runner::{
    BondStore, CommandRefresher, EndpointOutcome, EnvSeed, JsonSnapshotStore, JsonlRunLog,
    MemoryStore, NullRunLog, RunLog, RunStatus, SyncConfig, SyncDeps, SyncSummary, Syncer,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "bondlab",
    about = "BondLab CLI — bond reference data ingestion"
)]
struct Cli {
    /// Debug-level logging (RUST_LOG overrides).
    #[arg(long, global = true, default_value_t = false)]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync against the upstream.
    Sync {
        /// Path to a TOML config file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Dataset to sync (repeatable). The primary listing is always fetched.
        #[arg(long = "dataset", value_parser = parse_dataset)]
        datasets: Vec<SourceEndpoint>,

        /// JSON snapshot store file.
        #[arg(long, default_value = "data/bonds.json")]
        store: PathBuf,

        /// JSONL run log file.
        #[arg(long, default_value = "data/sync-runs.jsonl")]
        run_log: PathBuf,

        /// Fetch and merge, but write neither the store nor the run log.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Normalize rating strings and print grade and rank.
    Rating {
        #[arg(required = true)]
        ratings: Vec<String>,
    },
    /// Configuration commands.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML.
    Show {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Sync {
            config,
            datasets,
            store,
            run_log,
            dry_run,
        } => {
            let status = run_sync(config.as_deref(), datasets, &store, &run_log, dry_run)?;
            std::process::exit(exit_code(status));
        }
        Commands::Rating { ratings } => {
            run_rating(&ratings);
            Ok(())
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { config } => run_config_show(config.as_deref()),
        },
    }
}

fn init_logging(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Logs go to stderr; stdout carries command output.
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn parse_dataset(s: &str) -> Result<SourceEndpoint, String> {
    s.parse()
}

fn load_config(path: Option<&Path>) -> Result<SyncConfig> {
    match path {
        Some(path) => {
            let config = SyncConfig::from_file(path)
                .with_context(|| format!("loading config from {}", path.display()))?;
            info!(path = %path.display(), "config loaded");
            Ok(config)
        }
        None => Ok(SyncConfig::default()),
    }
}

fn exit_code(status: RunStatus) -> i32 {
    match status {
        RunStatus::Succeeded => 0,
        RunStatus::PartiallySucceeded => 2,
        RunStatus::Failed | RunStatus::Cancelled => 1,
    }
}

fn run_sync(
    config_path: Option<&Path>,
    datasets: Vec<SourceEndpoint>,
    store_path: &Path,
    run_log_path: &Path,
    dry_run: bool,
) -> Result<RunStatus> {
    let mut config = load_config(config_path)?;
    if !datasets.is_empty() {
        config.sync.datasets = datasets;
    }

    let seed = EnvSeed::from_env(&config.upstream);
    let refresher: Box<dyn CookieRefresher> =
        match CommandRefresher::from_config(&config.session, &config.upstream) {
            Some(command) => Box::new(command),
            None => Box::new(NoRefresher),
        };
    let transport = ReqwestTransport::new(&config.upstream.user_agent)
        .context("building HTTP client")?;

    let deps = SyncDeps {
        transport: Arc::new(transport),
        session: Arc::new(RefreshingSessionStore::new(seed.cookies, refresher)),
        clock: Arc::new(SystemClock),
        classifier: Arc::new(KeywordClassifier::default()),
    };
    let syncer = Syncer::new(config, deps).context("invalid sync configuration")?;

    let (store, run_log): (Box<dyn BondStore>, Box<dyn RunLog>) = if dry_run {
        (Box::new(MemoryStore::new()), Box::new(NullRunLog))
    } else {
        (
            Box::new(JsonSnapshotStore::new(store_path)),
            Box::new(JsonlRunLog::new(run_log_path)),
        )
    };

    let cancel = AtomicBool::new(false);
    let summary = syncer.run(store.as_ref(), run_log.as_ref(), &cancel);
    print_summary(&summary, dry_run);
    Ok(summary.status)
}

fn run_rating(ratings: &[String]) {
    println!("{:<40} {:<14} {:>4}", "Input", "Grade", "Rank");
    println!("{}", "-".repeat(60));
    for raw in ratings {
        match normalize_rating(raw) {
            Some(grade) => println!("{:<40} {:<14} {:>4}", raw, grade.as_str(), grade.rank()),
            None => println!("{:<40} {:<14} {:>4}", raw, "(blank)", "-"),
        }
    }
}

fn run_config_show(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;
    print!("{}", config.to_toml()?);
    Ok(())
}

fn print_summary(summary: &SyncSummary, dry_run: bool) {
    let c = &summary.counters;
    println!();
    println!("=== Sync {} ===", summary.run_id);
    println!("Status:      {}", summary.status);
    println!("Duration:    {} ms", summary.duration_ms());
    println!("Fetched:     {}", c.fetched);
    println!("Transformed: {}", c.transformed);
    println!("Skipped:     {}", c.skipped);
    println!("Bonds:       {}", c.bonds);
    if dry_run {
        println!("Persisted:   (dry run)");
    } else {
        println!(
            "Persisted:   {} created, {} updated, {} unchanged",
            c.created, c.updated, c.unchanged
        );
    }
    println!("Orphaned:    {}", c.orphaned);
    println!();
    println!(
        "{:<18} {:<10} {:>8} {:>6} {:>9}  Endpoint",
        "Dataset", "Outcome", "Records", "Pages", "ms"
    );
    println!("{}", "-".repeat(78));
    for e in &summary.endpoints {
        let outcome = match e.outcome {
            EndpointOutcome::Succeeded => "ok",
            EndpointOutcome::Partial => "partial",
            EndpointOutcome::Failed => "FAILED",
            EndpointOutcome::NotFound => "not-found",
            EndpointOutcome::Skipped => "skipped",
        };
        let params: Vec<String> = e.params.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let endpoint = if params.is_empty() {
            e.path.clone()
        } else {
            format!("{}?{}", e.path, params.join("&"))
        };
        println!(
            "{:<18} {:<10} {:>8} {:>6} {:>9}  {}",
            e.source.as_str(),
            outcome,
            e.records,
            e.pages,
            e.duration_ms,
            endpoint
        );
        if let Some(err) = &e.error {
            println!("{:<18} {err}", "");
        }
    }
    if !summary.skipped_reasons.is_empty() {
        println!();
        println!("Skipped records (sample):");
        for reason in &summary.skipped_reasons {
            println!("  {reason}");
        }
    }
    if let Some(err) = &summary.persist_error {
        println!();
        println!("ERROR: persist failed: {err}");
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn sync_flags_parse() {
        let cli = Cli::try_parse_from([
            "bondlab",
            "--verbose",
            "sync",
            "--dataset",
            "ratings",
            "--dataset",
            "issuer_types",
            "--dry-run",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Sync {
                datasets, dry_run, ..
            } => {
                assert_eq!(
                    datasets,
                    vec![SourceEndpoint::Ratings, SourceEndpoint::IssuerTypes]
                );
                assert!(dry_run);
            }
            _ => panic!("expected sync"),
        }
    }

    #[test]
    fn unknown_dataset_is_rejected() {
        assert!(Cli::try_parse_from(["bondlab", "sync", "--dataset", "prices"]).is_err());
    }

    #[test]
    fn exit_codes() {
        assert_eq!(exit_code(RunStatus::Succeeded), 0);
        assert_eq!(exit_code(RunStatus::PartiallySucceeded), 2);
        assert_eq!(exit_code(RunStatus::Failed), 1);
        assert_eq!(exit_code(RunStatus::Cancelled), 1);
    }
}
