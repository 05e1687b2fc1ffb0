//! Corral Cloud Server
//!
//! HTTP control plane that devices register against, push messages to, and
//! pull management commands and code from.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use corral_cloud::artifacts::OsArtifacts;
use corral_cloud::server::{AppState, build_router};
use corral_cloud::storage::CloudDatabase;
use corral_core::CloudConfig;
use corral_core::tracing_init::{LogFormat, init_tracing};
use corral_crypto::Srsa;

#[derive(Parser, Debug)]
#[command(name = "corral-cloud")]
#[command(version, about = "Corral cloud server - device control plane")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:8080", env = "CORRAL_LISTEN_ADDR")]
    addr: SocketAddr,

    /// Path to SQLite database file.
    #[arg(long, default_value = "corral-cloud.db", env = "CORRAL_DB_PATH")]
    db_path: PathBuf,

    /// Path to the bootstrap public-key exponent file.
    #[arg(long, default_value = "keys/pubkey", env = "CORRAL_PUBKEY_PATH")]
    pubkey: PathBuf,

    /// Path to the bootstrap private-key exponent file.
    #[arg(long, default_value = "keys/privkey", env = "CORRAL_PRIVKEY_PATH")]
    privkey: PathBuf,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing("corral_cloud=info", LogFormat::from_json_flag(args.log_json));

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %args.addr,
        "Starting corral-cloud"
    );

    let config = CloudConfig::load();

    info!(path = %args.db_path.display(), "Opening cloud database");
    let db = CloudDatabase::open(&args.db_path).await?;

    let srsa = Srsa::from_key_files(&args.pubkey, &args.privkey)?;
    let artifacts = OsArtifacts::new(config.os_dist_root.clone());

    let state = AppState {
        db,
        srsa: Arc::new(srsa),
        config: Arc::new(config),
        artifacts: Arc::new(artifacts),
    };

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(args.addr).await?;
    info!(addr = %args.addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to install Ctrl-C handler");
        return;
    }
    info!("Shutdown signal received");
}
