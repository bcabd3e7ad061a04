use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use topicbot::config::{redact, Config};
use topicbot::gateway;

/// `topicbot` — topic-routed retrieval chatbot webhook for the LINE Messaging API.
#[derive(Parser, Debug)]
#[command(name = "topicbot")]
#[command(version)]
#[command(about = "Topic-routed retrieval chatbot webhook.", long_about = None)]
struct Cli {
    /// Override the config directory (default: ~/.topicbot)
    #[arg(long, global = true)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the webhook gateway server
    #[command(long_about = "\
Start the webhook gateway server.

Listens for LINE webhook events, routes each user's messages through the
topic state machine, and replies via the LINE Messaging API. Bind address
defaults to the values in your config file (gateway.host / gateway.port).

Examples:
  topicbot serve                  # use config defaults
  topicbot serve -p 8080          # listen on port 8080
  topicbot serve --host 0.0.0.0   # bind to all interfaces")]
    Serve {
        /// Port to listen on; defaults to config gateway.port
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to; defaults to config gateway.host
        #[arg(long)]
        host: Option<String>,
    },

    /// Show effective configuration (credentials redacted)
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(config_dir) = &cli.config_dir {
        if config_dir.trim().is_empty() {
            bail!("--config-dir cannot be empty");
        }
        std::env::set_var("TOPICBOT_CONFIG_DIR", config_dir);
    }

    // Initialize logging - respects RUST_LOG env var, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let mut config = Config::load_or_init().await?;
    config.apply_env_overrides();

    match cli.command {
        Commands::Serve { port, host } => {
            let port = port.unwrap_or(config.gateway.port);
            let host = host.unwrap_or_else(|| config.gateway.host.clone());
            info!("starting topicbot gateway on {host}:{port}");
            gateway::run_gateway(&host, port, config).await
        }

        Commands::Status => {
            println!("topicbot status");
            println!();
            println!("Version:      {}", env!("CARGO_PKG_VERSION"));
            println!("Config:       {}", config.config_path.display());
            println!();
            println!("Gateway:      {}:{}", config.gateway.host, config.gateway.port);
            println!(
                "LINE token:   {}",
                config
                    .line
                    .channel_access_token
                    .as_deref()
                    .map(redact)
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Provider:     {} ({})", config.provider.kind, config.provider.base_url);
            println!("Model:        {}", config.provider.model);
            println!("Temperature:  {}", config.provider.temperature);
            println!();
            println!(
                "Sessions:     idle timeout {}s, sweep every {}s",
                config.sessions.idle_timeout_secs, config.sessions.sweep_interval_secs
            );
            println!(
                "Restaurant:   {}",
                config.backends.restaurant.data_dir.display()
            );
            Ok(())
        }
    }
}
