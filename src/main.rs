//! Rated Sentinel daemon.
//!
//! Loads the configuration, starts the metrics server, resolves the
//! configured keys and runs the watch loop until Ctrl-C.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prometheus::Registry;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use rated_sentinel::beacon::BeaconClient;
use rated_sentinel::metrics::WatcherMetrics;
use rated_sentinel::rated::{RatedClient, RetryPolicy};
use rated_sentinel::{server, Config, Watcher};

#[derive(Parser, Debug)]
#[command(author, version, about = "Beacon Chain validator ratings from the command line.")]
struct Cli {
    /// Config file (default is $HOME/.rated-cli.yaml)
    #[arg(long, global = true, env = "RATED_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch performances of Ethereum validator keys
    Watch {
        /// Run a single sampling cycle and exit.
        #[arg(long)]
        once: bool,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "rated_sentinel=info".into());

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    info!("Rated Sentinel v{}", env!("CARGO_PKG_VERSION"));

    let path = match cli.config {
        Some(p) => p,
        None => Config::default_path()?,
    };
    let config = Arc::new(Config::load(&path)?);
    info!(config = %path.display(), "successfully read configuration file");

    match cli.command {
        Command::Watch { once } => watch(config, once).await,
    }
}

async fn watch(config: Arc<Config>, once: bool) -> Result<()> {
    let registry = Registry::new();
    let metrics = Arc::new(WatcherMetrics::new(&registry).context("Failed to create metrics")?);

    let beacon = BeaconClient::new(&config).context("Failed to build beacon client")?;
    let rated = RatedClient::new(&config, RetryPolicy::default())
        .context("Failed to build rated network client")?;

    if once {
        let watcher = Watcher::new(Arc::clone(&config), &beacon, rated, metrics).await;
        let report = watcher.run_cycle().await;
        info!(succeeded = report.succeeded, failed = report.failed, "single cycle done");
        return Ok(());
    }

    // Serve metrics before resolving keys so health checks pass during
    // a slow startup, and a bind failure ends startup at once.
    let listen_on = config.listen_addr()?;
    let server = tokio::spawn(server::serve(listen_on, registry));

    let watching = async {
        let watcher = Watcher::new(Arc::clone(&config), &beacon, rated, metrics).await;
        watcher.run().await
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("unable to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("received Ctrl-C");
    };

    server::supervise(server, watching, shutdown).await
}
