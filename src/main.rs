//! WolfElect - Lease-Based Leader Election
//!
//! Participates in a leader election against a configured shared store
//! and reports who currently holds the claim.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wolfelect::backend::{self, Backend};
use wolfelect::config::WolfElectConfig;
use wolfelect::error::Result;
use wolfelect::state::Election;

/// WolfElect - Lease-Based Leader Election
#[derive(Parser)]
#[command(name = "wolfelect")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "wolfelect.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Participate in the election until interrupted
    Run,

    /// Show the current claim holder
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "wolfelect.toml")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

/// Claim report printed by `status`
#[derive(Serialize)]
struct StatusReport {
    election: String,
    backend: &'static str,
    holder: Option<String>,
    last_heartbeat: Option<chrono::DateTime<chrono::Utc>>,
    age_ms: Option<i64>,
    stale: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            let config = load_config(&cli.config, cli.log_level.as_deref())?;
            run_election(config).await
        }
        Commands::Status { json } => {
            let config = load_config(&cli.config, cli.log_level.as_deref())?;
            run_status(config, json).await
        }
        Commands::Init { output } => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"));
            run_init(output)
        }
        Commands::Validate => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"));
            run_validate(cli.config)
        }
    }
}

/// Initialize logging
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Load configuration and start logging at the configured level
fn load_config(path: &Path, level_override: Option<&str>) -> Result<WolfElectConfig> {
    let content = std::fs::read_to_string(path);
    let parsed = content
        .map_err(wolfelect::Error::from)
        .and_then(|c| toml::from_str::<WolfElectConfig>(&c).map_err(wolfelect::Error::from));

    let level = match (&parsed, level_override) {
        (_, Some(level)) => level.to_string(),
        (Ok(config), None) => config.logging.level.clone(),
        (Err(_), None) => "info".to_string(),
    };
    init_logging(&level);

    let config = match parsed {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load configuration from {:?}: {}", path, e);
            tracing::error!("Please check that the config file exists and is valid TOML");
            return Err(e);
        }
    };
    config.validate()?;
    Ok(config)
}

/// Participate in the election until Ctrl+C
async fn run_election(config: WolfElectConfig) -> Result<()> {
    tracing::info!(
        "Opening {} backend for election {}",
        config.backend.kind(),
        config.election.name
    );
    let store = match backend::open(&config.backend, &config.election.name).await {
        Ok(b) => b,
        Err(e) => {
            tracing::error!("Failed to open {} backend: {}", config.backend.kind(), e);
            return Err(e);
        }
    };

    let election = Arc::new(Election::new(config.election.clone(), store).on_change(|lead| {
        if lead {
            tracing::info!("This process is now the leader");
        } else {
            tracing::info!("This process is no longer the leader");
        }
    }));
    tracing::info!("Process ID: {}", election.id());

    let driver = election.spawn();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal");

    election.stop();
    match driver.await {
        Ok(result) => result?,
        Err(e) => {
            return Err(wolfelect::Error::Internal(format!("election task failed: {}", e)));
        }
    }

    tracing::info!("WolfElect shutdown complete");
    Ok(())
}

/// Read the current claim without writing anything
async fn run_status(config: WolfElectConfig, json: bool) -> Result<()> {
    let mut store = backend::open(&config.backend, &config.election.name).await?;

    store.begin().await?;
    let claim = store.current().await;
    if let Err(e) = store.rollback().await {
        tracing::debug!("Rollback after status read failed: {}", e);
    }
    let claim = claim?;

    let timeout = config.election.timeout();
    let report = StatusReport {
        election: config.election.name.clone(),
        backend: config.backend.kind(),
        holder: claim.holder.clone(),
        last_heartbeat: claim.holder.as_ref().map(|_| claim.last_heartbeat),
        age_ms: claim.holder.as_ref().map(|_| claim.age().num_milliseconds()),
        stale: !claim.is_vacant() && claim.is_stale(timeout),
    };

    if json {
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|e| wolfelect::Error::Internal(e.to_string()))?;
        println!("{}", rendered);
        return Ok(());
    }

    println!("WolfElect Status");
    println!("================");
    println!();
    println!("Election:         {}", report.election);
    println!("Backend:          {}", report.backend);
    match (&report.holder, report.last_heartbeat, report.age_ms) {
        (Some(holder), Some(heartbeat), Some(age_ms)) => {
            println!("Leader:           {}", holder);
            println!("Last Heartbeat:   {} ({} ms ago)", heartbeat, age_ms);
            println!(
                "Lease:            {}",
                if report.stale { "STALE" } else { "LIVE" }
            );
        }
        _ => println!("Leader:           (none)"),
    }

    Ok(())
}

/// Initialize a new configuration file
fn run_init(output: PathBuf) -> Result<()> {
    let config_content = r#"# WolfElect Configuration
# Generated configuration file

[election]
name = "default"
heartbeat_interval_ms = 15000
# Must be comfortably larger than heartbeat_interval_ms
timeout_ms = 25000
release_on_stop = false

[backend]
kind = "sqlite"
path = "/var/lib/wolfelect/election.db"
table = "leader_election"
busy_timeout_ms = 5000

# [backend]
# kind = "mysql"
# host = "localhost"
# port = 3306
# user = "wolfelect"
# password = "changeme"
# database = "coordination"
# table = "leader_election"

[logging]
level = "info"
"#;

    std::fs::write(&output, config_content)?;
    tracing::info!("Configuration written to {:?}", output);
    println!("Configuration file created: {}", output.display());
    Ok(())
}

/// Validate configuration file
fn run_validate(config_path: PathBuf) -> Result<()> {
    match WolfElectConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Election:   {}", config.election.name);
            println!("  Backend:    {}", config.backend.kind());
            println!("  Heartbeat:  {} ms", config.election.heartbeat_interval_ms);
            println!("  Timeout:    {} ms", config.election.timeout_ms);
            if config.election.has_timing_hazard() {
                println!("  ! heartbeat interval is not shorter than the lease timeout");
            }
            if config.has_blocking_hazard() {
                println!("  ! sqlite busy timeout is not shorter than the heartbeat interval");
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}
