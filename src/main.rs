//! EmberKV server entry point.
//!
//! Parses flags, sets up logging, builds the one storage engine every
//! connection shares, and accepts clients until Ctrl+C.

use clap::Parser;
use emberkv::commands::CommandHandler;
use emberkv::config::{DEFAULT_DBFILENAME, DEFAULT_DIR};
use emberkv::connection::{handle_connection, ConnectionStats};
use emberkv::storage::{start_expiry_sweeper, StorageEngine};
use emberkv::Config;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "emberkv", author, version, about, long_about = None)]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = emberkv::DEFAULT_HOST)]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = emberkv::DEFAULT_PORT)]
    port: u16,

    /// Directory reported for the database file (CONFIG GET dir)
    #[arg(long, default_value = DEFAULT_DIR)]
    dir: PathBuf,

    /// Database filename (CONFIG GET dbfilename)
    #[arg(long, default_value = DEFAULT_DBFILENAME)]
    dbfilename: String,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Config {
            host: args.host,
            port: args.port,
            dir: args.dir,
            dbfilename: args.dbfilename,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("emberkv={}", args.log_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = Arc::new(Config::from(args));
    info!(
        version = emberkv::VERSION,
        dir = %config.dir.display(),
        dbfilename = %config.dbfilename,
        "Starting EmberKV"
    );

    // Shared by every connection for the lifetime of the process
    let storage = Arc::new(StorageEngine::new());
    let _sweeper = start_expiry_sweeper(Arc::clone(&storage));

    let stats = Arc::new(ConnectionStats::new());

    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("Listening on {}", config.bind_address());

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    tokio::select! {
        _ = accept_loop(listener, storage, config, stats) => {}
        _ = shutdown => {}
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Accepts clients forever, one task per connection.
async fn accept_loop(
    listener: TcpListener,
    storage: Arc<StorageEngine>,
    config: Arc<Config>,
    stats: Arc<ConnectionStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    error!(client = %addr, error = %e, "Failed to set TCP_NODELAY");
                }
                let handler = CommandHandler::new(Arc::clone(&storage), Arc::clone(&config));
                let stats = Arc::clone(&stats);

                tokio::spawn(handle_connection(stream, addr, handler, stats));
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
