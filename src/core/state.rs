// src/core/state.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Strategy configuration. Mutated only through operator commands.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyParams {
    /// Exchange trading pair, stored uppercase (e.g. BTCUSDT).
    pub symbol: String,
    /// Drop fraction that triggers a buy; doubles as the trailing-stop distance.
    pub decrease_pct: Decimal,
    /// Rise fraction above the purchase price that triggers a full profit exit.
    pub increase_pct: Decimal,
    /// Quote currency spent per buy.
    pub trade_amount: Decimal,
    /// Lifetime spend ceiling.
    pub allocated_budget: Decimal,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            decrease_pct: Decimal::new(2, 2),  // 0.02
            increase_pct: Decimal::new(3, 2),  // 0.03
            trade_amount: Decimal::from(50),
            allocated_budget: Decimal::from(500),
        }
    }
}

/// Spend capacity for new buys. Fields are private so every mutation path
/// keeps `0 <= remaining <= allocated`.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetLedger {
    allocated: Decimal,
    remaining: Decimal,
}

impl BudgetLedger {
    pub fn new(allocated: Decimal) -> Self {
        Self {
            allocated,
            remaining: allocated,
        }
    }

    /// Rebuilds a ledger from stored values. Returns `None` when the pair is
    /// inconsistent.
    pub fn from_parts(allocated: Decimal, remaining: Decimal) -> Option<Self> {
        if remaining < Decimal::ZERO || remaining > allocated {
            return None;
        }
        Some(Self {
            allocated,
            remaining,
        })
    }

    pub fn allocated(&self) -> Decimal {
        self.allocated
    }

    pub fn remaining(&self) -> Decimal {
        self.remaining
    }

    pub fn can_spend(&self, amount: Decimal) -> bool {
        self.remaining >= amount
    }

    pub fn debit(&mut self, amount: Decimal) {
        self.remaining = (self.remaining - amount).max(Decimal::ZERO);
    }

    /// Resets both sides of the ledger, e.g. after `set_budget`.
    pub fn reset(&mut self, allocated: Decimal) {
        self.allocated = allocated;
        self.remaining = allocated;
    }
}

/// The single open position for the active symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub quantity: Decimal,
    /// Volume-weighted average fill price of the entry.
    pub buy_price: Decimal,
    /// High-water mark since entry. Never below `buy_price`'s initial value.
    pub highest_price: Decimal,
    pub entry_time: DateTime<Utc>,
}

impl Position {
    /// Returns true when the high-water mark moved.
    pub fn track_high(&mut self, price: Decimal) -> bool {
        if price > self.highest_price {
            self.highest_price = price;
            true
        } else {
            false
        }
    }
}

/// The whole strategy state: the unit of persistence.
///
/// At most one position can be open, and only for the active symbol; the
/// reference price is only meaningful while no position is open.
#[derive(Debug, Clone, PartialEq)]
pub struct BotState {
    pub params: StrategyParams,
    pub ledger: BudgetLedger,
    pub position: Option<Position>,
    pub reference_price: Option<Decimal>,
    pub running: bool,
}

impl Default for BotState {
    fn default() -> Self {
        let params = StrategyParams::default();
        let ledger = BudgetLedger::new(params.allocated_budget);
        Self {
            params,
            ledger,
            position: None,
            reference_price: None,
            running: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn ledger_debit_never_goes_negative() {
        let mut ledger = BudgetLedger::new(dec!(100));
        ledger.debit(dec!(60));
        assert_eq!(ledger.remaining(), dec!(40));
        ledger.debit(dec!(60));
        assert_eq!(ledger.remaining(), dec!(0));
    }

    #[test]
    fn ledger_rejects_inconsistent_parts() {
        assert!(BudgetLedger::from_parts(dec!(100), dec!(101)).is_none());
        assert!(BudgetLedger::from_parts(dec!(100), dec!(-1)).is_none());
        assert!(BudgetLedger::from_parts(dec!(100), dec!(100)).is_some());
    }

    #[test]
    fn high_water_mark_only_rises() {
        let mut pos = Position {
            symbol: "BTCUSDT".into(),
            quantity: dec!(1),
            buy_price: dec!(100),
            highest_price: dec!(100),
            entry_time: chrono::Utc::now(),
        };
        assert!(pos.track_high(dec!(105)));
        assert!(!pos.track_high(dec!(101)));
        assert_eq!(pos.highest_price, dec!(105));
    }
}
