// src/storage/mod.rs
//
// JSON state store. The document schema is the contract; writes go through a
// sibling temp file and a rename, so a crash leaves either the old or the new
// file, never a torn one.
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::core::state::{BotState, BudgetLedger, Position, StrategyParams};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("state file is inconsistent: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamsDocument {
    pub symbol: String,
    pub decrease_pct: Decimal,
    pub increase_pct: Decimal,
    pub trade_amount: Decimal,
    pub allocated_budget: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionDocument {
    pub symbol: String,
    pub quantity: Decimal,
    pub buy_price: Decimal,
    pub highest_price: Decimal,
    pub entry_time: DateTime<Utc>,
}

/// On-disk form of the whole strategy state. `positions` holds zero or one
/// entries keyed by symbol; in memory it collapses to an `Option`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    pub params: ParamsDocument,
    pub remaining_budget: Decimal,
    pub positions: BTreeMap<String, PositionDocument>,
    pub last_reference_price: Option<Decimal>,
    pub running: bool,
}

impl StateDocument {
    pub fn from_state(state: &BotState) -> Self {
        let mut positions = BTreeMap::new();
        if let Some(pos) = &state.position {
            positions.insert(
                pos.symbol.clone(),
                PositionDocument {
                    symbol: pos.symbol.clone(),
                    quantity: pos.quantity,
                    buy_price: pos.buy_price,
                    highest_price: pos.highest_price,
                    entry_time: pos.entry_time,
                },
            );
        }
        Self {
            params: ParamsDocument {
                symbol: state.params.symbol.clone(),
                decrease_pct: state.params.decrease_pct,
                increase_pct: state.params.increase_pct,
                trade_amount: state.params.trade_amount,
                allocated_budget: state.params.allocated_budget,
            },
            remaining_budget: state.ledger.remaining(),
            positions,
            last_reference_price: state.reference_price,
            running: state.running,
        }
    }

    pub fn into_state(self) -> Result<BotState, StoreError> {
        let fraction_ok =
            |v: Decimal| v > Decimal::ZERO && v < Decimal::ONE;
        if !fraction_ok(self.params.decrease_pct) {
            return Err(StoreError::Invalid(format!(
                "decrease_pct {} outside (0, 1)",
                self.params.decrease_pct
            )));
        }
        if !fraction_ok(self.params.increase_pct) {
            return Err(StoreError::Invalid(format!(
                "increase_pct {} outside (0, 1)",
                self.params.increase_pct
            )));
        }
        if self.params.trade_amount <= Decimal::ZERO {
            return Err(StoreError::Invalid("trade_amount is not positive".into()));
        }
        if self.params.allocated_budget <= Decimal::ZERO {
            return Err(StoreError::Invalid(
                "allocated_budget is not positive".into(),
            ));
        }

        let ledger = BudgetLedger::from_parts(self.params.allocated_budget, self.remaining_budget)
            .ok_or_else(|| {
                StoreError::Invalid(format!(
                    "remaining budget {} outside [0, {}]",
                    self.remaining_budget, self.params.allocated_budget
                ))
            })?;

        if self.positions.len() > 1 {
            return Err(StoreError::Invalid(format!(
                "{} positions stored; at most one is supported",
                self.positions.len()
            )));
        }

        let mut position = None;
        for (key, doc) in self.positions {
            if key != doc.symbol {
                return Err(StoreError::Invalid(format!(
                    "position keyed {key} but records symbol {}",
                    doc.symbol
                )));
            }
            if doc.symbol != self.params.symbol {
                return Err(StoreError::Invalid(format!(
                    "position open for {} but the active symbol is {}",
                    doc.symbol, self.params.symbol
                )));
            }
            if doc.quantity <= Decimal::ZERO || doc.buy_price <= Decimal::ZERO {
                return Err(StoreError::Invalid(
                    "position quantity and buy price must be positive".into(),
                ));
            }
            if doc.highest_price < doc.buy_price {
                return Err(StoreError::Invalid(format!(
                    "high-water mark {} below buy price {}",
                    doc.highest_price, doc.buy_price
                )));
            }
            position = Some(Position {
                symbol: doc.symbol,
                quantity: doc.quantity,
                buy_price: doc.buy_price,
                highest_price: doc.highest_price,
                entry_time: doc.entry_time,
            });
        }

        Ok(BotState {
            params: StrategyParams {
                symbol: self.params.symbol,
                decrease_pct: self.params.decrease_pct,
                increase_pct: self.params.increase_pct,
                trade_amount: self.params.trade_amount,
                allocated_budget: self.params.allocated_budget,
            },
            ledger,
            position,
            reference_price: self.last_reference_price,
            running: self.running,
        })
    }
}

pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Loads the stored state, or writes and returns the default one on
    /// first run.
    pub fn load_or_init(&self) -> Result<BotState, StoreError> {
        if self.path.exists() {
            let raw = fs::read_to_string(&self.path)?;
            let doc: StateDocument = serde_json::from_str(&raw)?;
            doc.into_state()
        } else {
            let state = BotState::default();
            self.save(&state)?;
            info!(path = %self.path.display(), "created fresh state file");
            Ok(state)
        }
    }

    pub fn save(&self, state: &BotState) -> Result<(), StoreError> {
        let doc = StateDocument::from_state(state);
        let data = serde_json::to_string_pretty(&doc)?;

        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn sample_position() -> Position {
        Position {
            symbol: "BTCUSDT".into(),
            quantity: dec!(0.5109),
            buy_price: dec!(97.9),
            highest_price: dec!(99.4),
            entry_time: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    fn store() -> (tempfile::TempDir, StateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("bot_state.json"));
        (dir, store)
    }

    #[test]
    fn round_trips_state_without_position() {
        let (_dir, store) = store();
        let mut state = BotState::default();
        state.reference_price = Some(dec!(101.5));
        state.running = true;

        store.save(&state).unwrap();
        assert_eq!(store.load_or_init().unwrap(), state);
    }

    #[test]
    fn round_trips_state_with_position() {
        let (_dir, store) = store();
        let mut state = BotState::default();
        state.ledger.debit(dec!(50));
        state.position = Some(sample_position());

        store.save(&state).unwrap();
        assert_eq!(store.load_or_init().unwrap(), state);
    }

    #[test]
    fn creates_default_state_file_on_first_load() {
        let (dir, store) = store();
        let state = store.load_or_init().unwrap();
        assert_eq!(state, BotState::default());
        assert!(dir.path().join("bot_state.json").exists());
        // A second load reads the file it just wrote.
        assert_eq!(store.load_or_init().unwrap(), BotState::default());
    }

    #[test]
    fn pins_the_on_disk_schema() {
        let raw = r#"{
            "params": {
                "symbol": "BTCUSDT",
                "decrease_pct": "0.02",
                "increase_pct": "0.03",
                "trade_amount": "50",
                "allocated_budget": "500"
            },
            "remaining_budget": "450",
            "positions": {
                "BTCUSDT": {
                    "symbol": "BTCUSDT",
                    "quantity": "0.5109",
                    "buy_price": "97.9",
                    "highest_price": "99.4",
                    "entry_time": "2024-05-01T12:00:00Z"
                }
            },
            "last_reference_price": null,
            "running": true
        }"#;

        let doc: StateDocument = serde_json::from_str(raw).unwrap();
        let state = doc.into_state().unwrap();
        assert_eq!(state.position, Some(sample_position()));
        assert_eq!(state.ledger.remaining(), dec!(450));
        assert_eq!(state.reference_price, None);
        assert!(state.running);

        // Writing it back produces the same document.
        let rewritten = StateDocument::from_state(&state);
        assert_eq!(
            serde_json::to_value(&rewritten).unwrap(),
            serde_json::from_str::<serde_json::Value>(raw).unwrap()
        );
    }

    #[test]
    fn rejects_remaining_budget_above_allocation() {
        let mut doc = StateDocument::from_state(&BotState::default());
        doc.remaining_budget = dec!(600);
        assert!(matches!(doc.into_state(), Err(StoreError::Invalid(_))));
    }

    #[test]
    fn rejects_high_water_mark_below_cost() {
        let mut state = BotState::default();
        let mut pos = sample_position();
        pos.highest_price = dec!(90);
        state.position = Some(pos);
        let doc = StateDocument::from_state(&state);
        assert!(matches!(doc.into_state(), Err(StoreError::Invalid(_))));
    }

    #[test]
    fn rejects_position_for_an_inactive_symbol() {
        let mut state = BotState::default();
        let mut pos = sample_position();
        pos.symbol = "ETHUSDT".into();
        state.position = Some(pos);
        let doc = StateDocument::from_state(&state);
        assert!(matches!(doc.into_state(), Err(StoreError::Invalid(_))));
    }

    #[test]
    fn rejects_bad_percentages() {
        let mut doc = StateDocument::from_state(&BotState::default());
        doc.params.decrease_pct = dec!(1.5);
        assert!(matches!(doc.into_state(), Err(StoreError::Invalid(_))));
    }
}
