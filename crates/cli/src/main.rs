use std::sync::Arc;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use swingbot_core::ConfigLoader;
use swingbot_engine::paper::{LogNotifier, MemoryStore, PaperBroker, PaperMarket};
use swingbot_engine::DecisionEngine;

#[derive(Parser)]
#[command(name = "swingbot")]
#[command(about = "Options decision engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scan loop against the paper brokerage
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
        /// Profile overlay, e.g. "paper" reads Config.paper.toml on top
        #[arg(short, long)]
        profile: Option<String>,
        /// Paper account equity
        #[arg(long, default_value = "100000")]
        equity: Decimal,
    },
    /// Resolve and print the effective configuration
    CheckConfig {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
        #[arg(short, long)]
        profile: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            profile,
            equity,
        } => run_paper(&config, profile.as_deref(), equity).await?,
        Commands::CheckConfig { config, profile } => check_config(&config, profile.as_deref())?,
    }
    Ok(())
}

fn load_config(path: &str, profile: Option<&str>) -> anyhow::Result<swingbot_core::AppConfig> {
    match profile {
        Some(profile) => ConfigLoader::load_with_profile(path, profile),
        None => ConfigLoader::load(path),
    }
}

async fn run_paper(config_path: &str, profile: Option<&str>, equity: Decimal) -> anyhow::Result<()> {
    let config = load_config(config_path, profile)?;
    if config.strategies.iter().all(|s| !s.enabled) {
        anyhow::bail!("no enabled strategy instances in {config_path}");
    }

    let market = Arc::new(PaperMarket::new());
    let broker = Arc::new(PaperBroker::new());
    broker.set_equity(equity).await;
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(LogNotifier::new());

    let mut engine = DecisionEngine::new(config, market, broker, store, notifier)?;
    engine.startup().await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received");
            let _ = shutdown_tx.send(true);
        }
    });

    tracing::info!(config = config_path, "Starting scan loop (paper)");
    engine.run(shutdown_rx).await
}

fn check_config(config_path: &str, profile: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path, profile)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    for instance in &config.strategies {
        tracing::info!(
            name = %instance.name,
            kind = %instance.kind,
            enabled = instance.enabled,
            budget = %instance.budget_cap,
            symbols = instance.symbols.len(),
            "Strategy instance"
        );
    }
    Ok(())
}
