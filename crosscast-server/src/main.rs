//! crosscast-server - HTTP front for multi-platform post broadcasts

use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use libcrosscast::config::Config;
use libcrosscast::db::Database;
use libcrosscast::files::FileStore;
use libcrosscast::logging::{LogFormat, LoggingConfig};

use crosscast_server::routes;
use crosscast_server::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "crosscast-server")]
#[command(about = "Fan a single post out to every configured platform", long_about = None)]
struct Cli {
    /// Path to the config file (defaults to the XDG location)
    #[arg(short, long, env = "CROSSCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Override the bind address from the config
    #[arg(short, long)]
    bind: Option<String>,

    /// Log output format (text, json, pretty)
    #[arg(long, default_value = "text")]
    log_format: LogFormat,

    /// Minimum log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::new(cli.log_format, cli.log_level.clone()).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    let db = Database::new(&config.database.path).await?;
    let files = FileStore::new(&config.files, &config.server.public_url, db.clone())?;

    let state = AppState::new(&config, db, files).await;
    info!(
        "Configured targets: {}",
        state.broadcaster.platform_names().join(", ")
    );

    let bind = cli.bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("Listening on {}", bind);

    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
