// src/main.rs
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use dotenvy::dotenv;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dip_trailer::config::AppConfig;
use dip_trailer::connectors::binance::BinanceGateway;
use dip_trailer::connectors::paper::PaperGateway;
use dip_trailer::connectors::traits::ExchangeGateway;
use dip_trailer::console;
use dip_trailer::core::engine::TradingEngine;
use dip_trailer::storage::StateStore;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let config = AppConfig::new()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Keep the non-blocking writer's guard alive for the whole run.
    let _guard = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "bot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    };

    println!("========================================");
    println!("   DIP TRAILER - buy low, trail high");
    println!("========================================");
    println!(
        "Mode:    {}",
        if config.live_trading {
            "LIVE TRADING"
        } else {
            "PAPER TRADING"
        }
    );
    println!(
        "Network: {}",
        if config.testnet { "testnet" } else { "mainnet" }
    );
    println!("Type 'help' for commands.");
    println!("========================================");

    let store = StateStore::new(&config.state_file);
    let state = store.load_or_init()?;
    info!(
        symbol = %state.params.symbol,
        running = state.running,
        remaining = %state.ledger.remaining(),
        "state loaded"
    );

    let binance = Arc::new(BinanceGateway::new(
        config.api_key.clone(),
        config.secret_key.clone(),
        config.testnet,
        Duration::from_millis(config.request_timeout_ms),
    )?);
    let gateway: Arc<dyn ExchangeGateway> = if config.live_trading {
        binance
    } else {
        Arc::new(PaperGateway::new(binance))
    };

    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let engine = TradingEngine::new(state, gateway, store, &config);
    let engine_task = tokio::spawn(engine.run(cmd_rx, shutdown_rx));
    let console_task = tokio::spawn(console::run(cmd_tx, shutdown_tx.clone()));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Ctrl+C received; shutting down"),
        _ = console_task => {}
    }
    let _ = shutdown_tx.send(true);

    engine_task.await??;
    Ok(())
}
