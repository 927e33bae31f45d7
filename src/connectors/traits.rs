// src/connectors/traits.rs
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::Fill;

/// Anything that can go wrong talking to an exchange. All of these are
/// transient from the strategy's point of view: the caller logs and retries
/// on the next tick.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("exchange rejected the request ({code}): {msg}")]
    Api { code: i64, msg: String },

    #[error("unexpected exchange response: {0}")]
    InvalidResponse(String),

    #[error("gateway call timed out after {0:?}")]
    Timeout(Duration),

    #[error("no price observed yet for {0}")]
    NoPrice(String),
}

#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    async fn get_price(&self, symbol: &str) -> Result<Decimal, GatewayError>;

    /// Spends `quote_amount` of the quote currency at market.
    async fn market_buy(&self, symbol: &str, quote_amount: Decimal)
        -> Result<Fill, GatewayError>;

    /// Sells `quantity` of the base asset at market.
    async fn market_sell(&self, symbol: &str, quantity: Decimal) -> Result<Fill, GatewayError>;
}
