// src/types.rs
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Confirmed result of an executed order: realized base quantity and the
/// volume-weighted average price it filled at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub quantity: Decimal,
    pub avg_price: Decimal,
}
