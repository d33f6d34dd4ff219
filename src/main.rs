use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use lyceum_core::StaticRoster;
use lyceum_engine::DiscussionService;
use lyceum_server::ServerConfig;
use lyceum_store::Database;
use lyceum_telemetry::{init_telemetry, TelemetryConfig};

/// Course discussion server: threads, posts, and a poll-driven unread signal.
#[derive(Parser)]
#[command(name = "lyceum", version)]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = 9280)]
    port: u16,

    /// Path to the SQLite database. Defaults to ~/.lyceum/lyceum.db.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Roster file: JSON object mapping context ids to member user ids,
    /// e.g. {"ctx_rust101": ["usr_alice", "usr_bob"]}.
    #[arg(long)]
    roster: PathBuf,

    /// Default log level (overridden by RUST_LOG).
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let lyceum_dir = home_dir().join(".lyceum");
    let _telemetry = init_telemetry(TelemetryConfig {
        log_level: cli.log_level,
        log_db_path: lyceum_dir.join("logs.db"),
        ..Default::default()
    });

    let db_path = cli.db.unwrap_or_else(|| lyceum_dir.join("lyceum.db"));
    let db = Database::open(&db_path)
        .with_context(|| format!("open database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "database ready");

    let roster_raw = std::fs::read_to_string(&cli.roster)
        .with_context(|| format!("read roster file {}", cli.roster.display()))?;
    let roster_map: HashMap<String, Vec<String>> =
        serde_json::from_str(&roster_raw).context("parse roster file")?;
    let roster = StaticRoster::from_map(roster_map);
    tracing::info!(contexts = roster.context_count(), "roster loaded");

    let service = Arc::new(DiscussionService::new(db, Arc::new(roster)));

    let config = ServerConfig {
        port: cli.port,
        ..Default::default()
    };
    let handle = lyceum_server::start(config, service).await?;
    tracing::info!(port = handle.port, "lyceum ready");

    tokio::signal::ctrl_c().await.context("listen for ctrl+c")?;
    tracing::info!("shutting down");
    Ok(())
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
