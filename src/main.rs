use anyhow::Context;
use clap::Parser;
use futuresbot::api::{BinanceFuturesClient, PaperExchange};
use futuresbot::config::{AppConfig, DEFAULT_CONFIG_PATH};
use futuresbot::execution::TradingBot;
use futuresbot::gateway::{ExchangeClient, ResilientGateway};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "futuresbot", about = "Indicator-driven futures trading bots")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Simulate fills instead of sending orders to the exchange
    #[arg(long)]
    paper: bool,
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("futuresbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();
    let mut config = AppConfig::load(&args.config)?;
    if args.paper {
        config.exchange.paper = true;
    }

    tracing::info!(
        config = %args.config.display(),
        paper = config.exchange.paper,
        bots = config.bots.len(),
        "futuresbot starting"
    );

    let binance: Arc<dyn ExchangeClient> = Arc::new(
        BinanceFuturesClient::new(&config.exchange.api_key, &config.exchange.api_secret)
            .with_base_url(&config.exchange.base_url)
            .with_recv_window(config.exchange.recv_window_ms),
    );
    let raw: Arc<dyn ExchangeClient> = if config.exchange.paper {
        Arc::new(PaperExchange::new(binance, config.exchange.paper_balance))
    } else {
        binance
    };

    // One gateway per account: every bot shares its rate budget and breakers
    let gateway: Arc<dyn ExchangeClient> = Arc::new(
        ResilientGateway::new(raw, &config.gateway).context("Invalid gateway settings")?,
    );

    let mut handles = Vec::with_capacity(config.bots.len());
    for bot_config in config.bots {
        let symbol = bot_config.symbol.clone();
        let params = bot_config
            .into_params(gateway.clone())
            .with_context(|| format!("Invalid bot configuration for {}", symbol))?;
        handles.push(TradingBot::new(params).spawn());
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested, stopping bots at their next tick boundary");

    for handle in &handles {
        handle.stop();
    }

    let mut failed = 0;
    for handle in handles {
        let symbol = handle.symbol().to_string();
        if let Err(e) = handle.join().await {
            tracing::error!(%symbol, "Bot exited with error: {:#}", e);
            failed += 1;
        }
    }

    if failed > 0 {
        anyhow::bail!("{} bot(s) halted with errors", failed);
    }
    tracing::info!("All bots stopped");
    Ok(())
}
