// src/connectors/binance.rs
use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::connectors::traits::{ExchangeGateway, GatewayError};
use crate::types::Fill;
use crate::utils::precision::normalize_quantity;

type HmacSha256 = Hmac<Sha256>;

const LIVE_URL: &str = "https://api.binance.com";
const TESTNET_URL: &str = "https://testnet.binance.vision";

/// Binance spot REST gateway. Buys spend quote currency via `quoteOrderQty`;
/// sell quantities are rounded down to the symbol's LOT_SIZE step.
pub struct BinanceGateway {
    api_key: String,
    secret_key: String,
    http: Client,
    base_url: String,
    // LOT_SIZE steps, fetched once per symbol.
    lot_steps: Mutex<HashMap<String, Decimal>>,
}

#[derive(Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}

#[derive(Deserialize)]
struct TickerPrice {
    price: Decimal,
}

#[derive(Deserialize)]
struct OrderFill {
    price: Decimal,
    qty: Decimal,
}

#[derive(Deserialize)]
struct OrderResponse {
    #[serde(rename = "executedQty", default)]
    executed_qty: Decimal,
    #[serde(rename = "cummulativeQuoteQty", default)]
    cummulative_quote_qty: Decimal,
    #[serde(default)]
    fills: Vec<OrderFill>,
}

#[derive(Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Deserialize)]
struct SymbolInfo {
    symbol: String,
    filters: Vec<SymbolFilter>,
}

#[derive(Deserialize)]
struct SymbolFilter {
    #[serde(rename = "filterType")]
    filter_type: String,
    #[serde(rename = "stepSize", default)]
    step_size: Option<Decimal>,
}

impl BinanceGateway {
    pub fn new(
        api_key: String,
        secret_key: String,
        testnet: bool,
        request_timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let http = Client::builder().timeout(request_timeout).build()?;
        let base_url = if testnet { TESTNET_URL } else { LIVE_URL }.to_string();
        Ok(Self {
            api_key,
            secret_key,
            http,
            base_url,
            lot_steps: Mutex::new(HashMap::new()),
        })
    }

    /// Points the gateway at a different server; used by tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn sign_and_build_query(&self, params: Vec<(&str, String)>) -> Result<String, GatewayError> {
        let mut params = params;
        params.push(("timestamp", Utc::now().timestamp_millis().to_string()));

        let query = serde_urlencoded::to_string(&params)
            .map_err(|e| GatewayError::InvalidResponse(format!("query encoding failed: {e}")))?;

        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|_| GatewayError::InvalidResponse("invalid secret key length".into()))?;
        mac.update(query.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(format!("{query}&signature={signature}"))
    }

    async fn send_signed<T: for<'de> Deserialize<'de>>(
        &self,
        method: Method,
        endpoint: &str,
        params: Vec<(&str, String)>,
    ) -> Result<T, GatewayError> {
        let query = self.sign_and_build_query(params)?;
        let url = format!("{}{}?{}", self.base_url, endpoint, query);

        let response = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;

        Self::decode(response).await
    }

    async fn decode<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            if let Ok(api) = serde_json::from_str::<ApiError>(&body) {
                return Err(GatewayError::Api {
                    code: api.code,
                    msg: api.msg,
                });
            }
            return Err(GatewayError::InvalidResponse(format!(
                "HTTP {status}: {body}"
            )));
        }
        serde_json::from_str(&body).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }

    async fn lot_step(&self, symbol: &str) -> Result<Decimal, GatewayError> {
        {
            let cache = self.lot_steps.lock().await;
            if let Some(step) = cache.get(symbol) {
                return Ok(*step);
            }
        }

        let url = format!("{}/api/v3/exchangeInfo?symbol={}", self.base_url, symbol);
        let response = self.http.get(&url).send().await?;
        let info: ExchangeInfo = Self::decode(response).await?;

        let step = info
            .symbols
            .iter()
            .find(|s| s.symbol == symbol)
            .and_then(|s| s.filters.iter().find(|f| f.filter_type == "LOT_SIZE"))
            .and_then(|f| f.step_size)
            .unwrap_or_else(|| Decimal::new(1, 8));

        self.lot_steps.lock().await.insert(symbol.to_string(), step);
        Ok(step)
    }

    /// VWAP over the order's fills, falling back to the cumulative totals
    /// when the response carries no fill breakdown.
    fn aggregate_fill(order: &OrderResponse) -> Fill {
        if !order.fills.is_empty() {
            let quantity: Decimal = order.fills.iter().map(|f| f.qty).sum();
            if quantity > Decimal::ZERO {
                let notional: Decimal = order.fills.iter().map(|f| f.price * f.qty).sum();
                return Fill {
                    quantity,
                    avg_price: notional / quantity,
                };
            }
        }
        if order.executed_qty > Decimal::ZERO {
            Fill {
                quantity: order.executed_qty,
                avg_price: order.cummulative_quote_qty / order.executed_qty,
            }
        } else {
            Fill {
                quantity: Decimal::ZERO,
                avg_price: Decimal::ZERO,
            }
        }
    }
}

#[async_trait]
impl ExchangeGateway for BinanceGateway {
    async fn get_price(&self, symbol: &str) -> Result<Decimal, GatewayError> {
        let url = format!("{}/api/v3/ticker/price?symbol={}", self.base_url, symbol);
        let response = self.http.get(&url).send().await?;
        let ticker: TickerPrice = Self::decode(response).await?;
        Ok(ticker.price)
    }

    async fn market_buy(
        &self,
        symbol: &str,
        quote_amount: Decimal,
    ) -> Result<Fill, GatewayError> {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("side", "BUY".to_string()),
            ("type", "MARKET".to_string()),
            ("quoteOrderQty", quote_amount.to_string()),
            ("newClientOrderId", Uuid::new_v4().to_string()),
        ];

        info!(%symbol, %quote_amount, "sending market buy");
        let order: OrderResponse = self.send_signed(Method::POST, "/api/v3/order", params).await?;
        Ok(Self::aggregate_fill(&order))
    }

    async fn market_sell(&self, symbol: &str, quantity: Decimal) -> Result<Fill, GatewayError> {
        let step = self.lot_step(symbol).await?;
        let quantity = normalize_quantity(quantity, step).normalize();
        if quantity <= Decimal::ZERO {
            return Err(GatewayError::InvalidResponse(format!(
                "sell quantity rounds to zero at lot step {step}"
            )));
        }

        let params = vec![
            ("symbol", symbol.to_string()),
            ("side", "SELL".to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", quantity.to_string()),
            ("newClientOrderId", Uuid::new_v4().to_string()),
        ];

        info!(%symbol, %quantity, "sending market sell");
        let order: OrderResponse = self.send_signed(Method::POST, "/api/v3/order", params).await?;
        Ok(Self::aggregate_fill(&order))
    }
}
