// src/core/engine.rs
//
// The single-owner actor around `BotState`. Price ticks and operator
// commands are branches of one select loop, so a configuration change can
// never interleave with an in-flight decision cycle.
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::commands::{self, Command, CommandError, CommandReply};
use crate::config::AppConfig;
use crate::connectors::traits::{ExchangeGateway, GatewayError};
use crate::core::state::BotState;
use crate::core::strategy::Action;
use crate::storage::StateStore;

/// One operator command plus the slot its reply goes back through.
pub struct CommandRequest {
    pub command: Command,
    pub reply: oneshot::Sender<Result<CommandReply, CommandError>>,
}

pub struct TradingEngine {
    state: BotState,
    gateway: Arc<dyn ExchangeGateway>,
    store: StateStore,
    poll_interval: Duration,
    call_timeout: Duration,
}

impl TradingEngine {
    pub fn new(
        state: BotState,
        gateway: Arc<dyn ExchangeGateway>,
        store: StateStore,
        config: &AppConfig,
    ) -> Self {
        Self {
            state,
            gateway,
            store,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            call_timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }

    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<CommandRequest>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        info!(
            symbol = %self.state.params.symbol,
            running = self.state.running,
            "engine started"
        );

        let mut ticker = interval(self.poll_interval);
        // No catch-up burst after a stop/start cycle.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                request = commands.recv() => {
                    match request {
                        Some(request) => self.handle_command(request).await,
                        None => break,
                    }
                }
                _ = ticker.tick(), if self.state.running => {
                    self.poll_cycle().await;
                }
            }
        }

        info!("engine stopped");
        Ok(())
    }

    async fn handle_command(&mut self, request: CommandRequest) {
        let result = commands::apply_command(&mut self.state, &request.command);

        // Persist before acknowledging; a command whose effect is not on disk
        // has not happened.
        let result = match result {
            Ok(reply) if reply.mutated => match self.store.save(&self.state) {
                Ok(()) => Ok(reply),
                Err(e) => {
                    error!(error = %e, "failed to persist state after command; halting monitor");
                    self.state.running = false;
                    Err(CommandError::Persistence(e.to_string()))
                }
            },
            other => other,
        };

        if request.reply.send(result).is_err() {
            warn!("command requester went away before the reply");
        }
    }

    /// One tick: fetch price, decide, execute, apply the fill, checkpoint.
    async fn poll_cycle(&mut self) {
        let symbol = self.state.params.symbol.clone();

        let price = match self.with_timeout(self.gateway.get_price(&symbol)).await {
            Ok(price) => price,
            Err(e) => {
                warn!(%symbol, error = %e, "price fetch failed; retrying next tick");
                return;
            }
        };

        let action = self.state.on_price(price);
        let mut dirty = action == Action::Track;

        match action {
            Action::Hold | Action::Track => {}
            Action::Buy { quote_amount } => {
                match self
                    .with_timeout(self.gateway.market_buy(&symbol, quote_amount))
                    .await
                {
                    Ok(fill) if fill.quantity > Decimal::ZERO => {
                        self.state.apply_buy_fill(quote_amount, &fill, Utc::now());
                        dirty = true;
                        info!(
                            %symbol,
                            quantity = %fill.quantity,
                            avg_price = %fill.avg_price,
                            remaining = %self.state.ledger.remaining(),
                            "bought"
                        );
                    }
                    Ok(_) => warn!(%symbol, "buy executed with zero quantity; ignoring"),
                    Err(e) => warn!(%symbol, error = %e, "buy failed; trigger stays armed"),
                }
            }
            Action::Sell { quantity, reason } => {
                match self
                    .with_timeout(self.gateway.market_sell(&symbol, quantity))
                    .await
                {
                    Ok(fill) if fill.quantity > Decimal::ZERO => {
                        if let Some(closed) = self.state.apply_sell_fill(price) {
                            let pnl = (fill.avg_price - closed.buy_price) * fill.quantity;
                            info!(
                                %symbol,
                                ?reason,
                                quantity = %fill.quantity,
                                avg_price = %fill.avg_price,
                                %pnl,
                                "sold"
                            );
                        }
                        dirty = true;
                    }
                    Ok(_) => warn!(%symbol, "sell executed with zero quantity; ignoring"),
                    Err(e) => warn!(%symbol, error = %e, "sell failed; trigger stays armed"),
                }
            }
        }

        // The high-water mark is safety-critical, so checkpoint every tick
        // while a position is open.
        if dirty || self.state.position.is_some() {
            if let Err(e) = self.store.save(&self.state) {
                error!(error = %e, "state checkpoint failed; halting monitor");
                self.state.running = false;
            }
        }
    }

    async fn with_timeout<T>(
        &self,
        call: impl Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, GatewayError> {
        match timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(self.call_timeout)),
        }
    }
}
