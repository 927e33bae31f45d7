// src/connectors/paper.rs
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use tokio::sync::Mutex;
use tracing::info;

use crate::connectors::traits::{ExchangeGateway, GatewayError};
use crate::types::Fill;

/// Simulated execution over real market data: prices come from the inner
/// gateway, orders fill instantly at the last observed price and never reach
/// the exchange.
pub struct PaperGateway {
    inner: Arc<dyn ExchangeGateway>,
    last_price: Mutex<Option<Decimal>>,
}

impl PaperGateway {
    pub fn new(inner: Arc<dyn ExchangeGateway>) -> Self {
        Self {
            inner,
            last_price: Mutex::new(None),
        }
    }

    async fn last(&self, symbol: &str) -> Result<Decimal, GatewayError> {
        self.last_price
            .lock()
            .await
            .ok_or_else(|| GatewayError::NoPrice(symbol.to_string()))
    }
}

#[async_trait]
impl ExchangeGateway for PaperGateway {
    async fn get_price(&self, symbol: &str) -> Result<Decimal, GatewayError> {
        let price = self.inner.get_price(symbol).await?;
        *self.last_price.lock().await = Some(price);
        Ok(price)
    }

    async fn market_buy(
        &self,
        symbol: &str,
        quote_amount: Decimal,
    ) -> Result<Fill, GatewayError> {
        let price = self.last(symbol).await?;
        let quantity = (quote_amount / price).round_dp_with_strategy(8, RoundingStrategy::ToZero);
        info!(%symbol, %quantity, %price, "paper buy filled");
        Ok(Fill {
            quantity,
            avg_price: price,
        })
    }

    async fn market_sell(&self, symbol: &str, quantity: Decimal) -> Result<Fill, GatewayError> {
        let price = self.last(symbol).await?;
        info!(%symbol, %quantity, %price, "paper sell filled");
        Ok(Fill {
            quantity,
            avg_price: price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    struct FixedPrice(Decimal);

    #[async_trait]
    impl ExchangeGateway for FixedPrice {
        async fn get_price(&self, _symbol: &str) -> Result<Decimal, GatewayError> {
            Ok(self.0)
        }

        async fn market_buy(
            &self,
            _symbol: &str,
            _quote_amount: Decimal,
        ) -> Result<Fill, GatewayError> {
            unreachable!("paper mode must not forward orders")
        }

        async fn market_sell(
            &self,
            _symbol: &str,
            _quantity: Decimal,
        ) -> Result<Fill, GatewayError> {
            unreachable!("paper mode must not forward orders")
        }
    }

    #[tokio::test]
    async fn ordering_before_any_price_is_an_error() {
        let paper = PaperGateway::new(Arc::new(FixedPrice(dec!(100))));
        let err = paper.market_buy("BTCUSDT", dec!(50)).await.unwrap_err();
        assert!(matches!(err, GatewayError::NoPrice(_)));
    }

    #[tokio::test]
    async fn fills_at_last_observed_price() {
        let paper = PaperGateway::new(Arc::new(FixedPrice(dec!(200))));
        let price = paper.get_price("BTCUSDT").await.unwrap();
        assert_eq!(price, dec!(200));

        let buy = paper.market_buy("BTCUSDT", dec!(50)).await.unwrap();
        assert_eq!(buy.avg_price, dec!(200));
        assert_eq!(buy.quantity, dec!(0.25));

        let sell = paper.market_sell("BTCUSDT", dec!(0.25)).await.unwrap();
        assert_eq!(sell.avg_price, dec!(200));
        assert_eq!(sell.quantity, dec!(0.25));
    }
}
