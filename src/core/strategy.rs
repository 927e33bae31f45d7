// src/core/strategy.rs
//
// The decision function: one price observation in, one action out. State is
// only mutated here for the two marker values that belong to the decision
// itself (reference price, high-water mark); order results are applied
// separately via `apply_buy_fill` / `apply_sell_fill` so a failed order
// leaves the trigger armed.
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::core::state::{BotState, Position};
use crate::types::Fill;

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Nothing changed.
    Hold,
    /// No order, but a marker moved and should be checkpointed.
    Track,
    Buy {
        quote_amount: Decimal,
    },
    Sell {
        quantity: Decimal,
        reason: ExitReason,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    ProfitTarget,
    TrailingStop,
}

impl BotState {
    /// Evaluates one price observation against the current state.
    pub fn on_price(&mut self, price: Decimal) -> Action {
        if let Some(pos) = self.position.as_mut() {
            pos.track_high(price);

            let target = pos.buy_price * (Decimal::ONE + self.params.increase_pct);
            if price >= target {
                info!(%price, %target, "profit target reached");
                return Action::Sell {
                    quantity: pos.quantity,
                    reason: ExitReason::ProfitTarget,
                };
            }

            // The trailing stop arms only once the position has been in
            // profit; an unarmed position is held through any drawdown.
            if pos.highest_price > pos.buy_price {
                let stop = pos.highest_price * (Decimal::ONE - self.params.decrease_pct);
                if price <= stop && price >= pos.buy_price {
                    info!(%price, %stop, buy_price = %pos.buy_price, "trailing stop hit");
                    return Action::Sell {
                        quantity: pos.quantity,
                        reason: ExitReason::TrailingStop,
                    };
                }
                // price <= stop but below cost: selling at a loss is forbidden.
            }
            return Action::Track;
        }

        let reference = match self.reference_price {
            Some(reference) => reference,
            None => {
                info!(%price, "seeding reference price");
                self.reference_price = Some(price);
                return Action::Track;
            }
        };

        let threshold = reference * (Decimal::ONE - self.params.decrease_pct);
        if price <= threshold {
            if self.ledger.can_spend(self.params.trade_amount) {
                info!(%price, %threshold, %reference, "dip trigger");
                return Action::Buy {
                    quote_amount: self.params.trade_amount,
                };
            }
            // The reference is not advanced, so the trigger stays armed.
            info!(
                remaining = %self.ledger.remaining(),
                required = %self.params.trade_amount,
                "dip trigger skipped: insufficient budget"
            );
            return Action::Hold;
        }
        if price > reference {
            debug!(%price, old = %reference, "reference price ratcheted up");
            self.reference_price = Some(price);
            return Action::Track;
        }
        Action::Hold
    }

    /// Applies a confirmed buy fill: opens the position at the fill's VWAP and
    /// debits the ledger by the quote amount the Buy action committed to (a
    /// partial fill still consumes a full budget slot).
    pub fn apply_buy_fill(&mut self, spent: Decimal, fill: &Fill, entry_time: DateTime<Utc>) {
        self.ledger.debit(spent);
        self.position = Some(Position {
            symbol: self.params.symbol.clone(),
            quantity: fill.quantity,
            buy_price: fill.avg_price,
            highest_price: fill.avg_price,
            entry_time,
        });
    }

    /// Applies a confirmed sell fill: closes the position and reseeds the
    /// reference price at the observed tick, so the next buy-watch starts from
    /// the sale price. Returns the closed position for logging.
    pub fn apply_sell_fill(&mut self, observed_price: Decimal) -> Option<Position> {
        let closed = self.position.take()?;
        self.reference_price = Some(observed_price);
        Some(closed)
    }
}
