mod config;
use clap::{Parser, Subcommand};
use config::Config;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod server;
use server::run_server;

#[derive(Parser)]
#[command(name = "verso")]
#[command(about = "Zero-downtime dataset version rollover for peer-to-peer nodes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a node with the given config
    Start {
        /// Path to configuration file
        #[arg(long = "conf", default_value = "config.yaml")]
        conf: String,

        /// Override node_id from config at runtime
        #[arg(long)]
        node: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "verso=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { conf, node } => {
            tracing::info!("Starting Verso with config: {}", conf);

            let mut cfg = match Config::from_file(&conf) {
                Ok(c) => c,
                Err(error) => {
                    tracing::error!("Failed to load config: {}", error);
                    std::process::exit(1);
                }
            };

            if let Some(node_id) = node {
                tracing::info!("Using node override '{}' via CLI", node_id);
                cfg.node.node_id = node_id;
            }

            let registry = match cfg.registry_builder().build().await {
                Ok(registry) => registry,
                Err(error) => {
                    tracing::error!("Failed to create registry: {}", error);
                    std::process::exit(1);
                }
            };

            if let Err(error) = run_server(cfg, registry).await {
                tracing::error!("Server error: {}", error);
                std::process::exit(1);
            }
        }
    }
}
