//! `monte` command line: run an echo server or call one.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use monte::config::{load_config, validation::validate_config, ConfigError, MonteConfig};
use monte::lifecycle::wait_for_signal;
use monte::observability::{logging, metrics};
use monte::{Client, Echo, Server};

#[derive(Parser)]
#[command(name = "monte")]
#[command(about = "Encrypted multiplexed RPC over TCP", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an echo server until Ctrl+C
    Serve {
        /// Override server.bind_address
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Send one message and print the response
    Call {
        /// Override client.address
        #[arg(short, long)]
        addr: Option<String>,

        /// Send fire-and-forget; do not wait for a response
        #[arg(short, long)]
        notify: bool,

        message: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => MonteConfig::default(),
    };

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind_address = bind;
            }
            validate_config(&config).map_err(ConfigError::Validation)?;
            logging::init(&config.observability.log_level)?;
            serve(config).await
        }
        Commands::Call {
            addr,
            notify,
            message,
        } => {
            if let Some(addr) = addr {
                config.client.address = addr;
            }
            validate_config(&config).map_err(ConfigError::Validation)?;
            logging::init(&config.observability.log_level)?;
            call(config, notify, message).await
        }
    }
}

async fn serve(config: MonteConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("monte v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let server = Arc::new(Server::new(
        config.server.clone(),
        config.connection.clone(),
        Echo,
    ));
    let listener = server.bind().await?;

    let mut serving = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.serve(listener).await }
    });

    tokio::select! {
        result = &mut serving => result??,
        _ = wait_for_signal() => {
            tracing::info!("Shutdown signal received");
            server.shutdown().await;
            serving.await??;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn call(
    config: MonteConfig,
    notify: bool,
    message: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::new(config.client.clone(), config.connection.clone());
    let conn = client.connect(Echo).await?;

    if notify {
        conn.write(message.as_bytes()).await?;
    } else {
        let dst = Vec::with_capacity(config.connection.effective_read_buffer_size());
        let response = conn
            .request(message.as_bytes(), dst, config.connection.request_timeout())
            .await?;
        println!("{}", String::from_utf8_lossy(&response));
    }

    conn.close().await?;
    client.shutdown().await;
    Ok(())
}
