mod config;
mod server;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::{Config, DEFAULT_BALANCER_PORT, DEFAULT_NODE_PORT};
use server::{run_balancer_server, run_node_server};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "dynamite")]
#[command(about = "A small Dynamo-style partitioned key-value store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a storage node
    Node {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.yaml")]
        config: String,

        /// Cluster member `host:port`, repeatable
        #[arg(short = 's', long = "server")]
        servers: Vec<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Advertised `host:port` of this node
        #[arg(long)]
        identity: Option<String>,
    },
    /// Start the load balancer
    Balancer {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.yaml")]
        config: String,

        /// Storage node `host:port`, repeatable
        #[arg(short = 's', long = "server")]
        servers: Vec<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dynamite=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if let Err(error) = run(cli).await {
        tracing::error!("{:#}", error);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Node {
            config,
            servers,
            port,
            identity,
        } => {
            tracing::info!("Starting Dynamite node with config: {}", config);
            let mut cfg = Config::from_file(&config).context("failed to load config")?;
            cfg.apply_overrides(servers, port, identity, DEFAULT_NODE_PORT)
                .context("invalid command-line override")?;
            run_node_server(cfg).await.context("storage node failed")?;
        }
        Commands::Balancer {
            config,
            servers,
            port,
        } => {
            tracing::info!("Starting Dynamite balancer with config: {}", config);
            let mut cfg = Config::from_file(&config).context("failed to load config")?;
            cfg.apply_overrides(servers, port, None, DEFAULT_BALANCER_PORT)
                .context("invalid command-line override")?;
            run_balancer_server(cfg)
                .await
                .context("load balancer failed")?;
        }
    }

    Ok(())
}
