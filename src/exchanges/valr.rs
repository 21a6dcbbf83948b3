use async_trait::async_trait;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

use super::adapter::{ExchangeAdapter, ExchangeError};
use super::http::build_client;
use super::rate_limiter::RateLimiter;
use super::signing::hmac_sha512_hex;
use crate::models::credentials::ExchangeCredentials;
use crate::models::market::{Candle, Fill, Interval, OrderBook, OrderBookLevel, OrderSide, Pair};

const BASE_URL: &str = "https://api.valr.com";

pub struct ValrAdapter {
    http: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
}

impl Default for ValrAdapter {
    fn default() -> Self {
        Self::new(BASE_URL)
    }
}

impl ValrAdapter {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: build_client(),
            base_url: base_url.to_string(),
            limiter: RateLimiter::new(Duration::from_millis(200)),
        }
    }

    pub fn to_venue_symbol(pair: &Pair) -> String {
        format!("{}{}", pair.base, pair.quote)
    }

    pub fn from_venue_symbol(symbol: &str, quote_hints: &[&str]) -> Option<Pair> {
        for quote in quote_hints {
            if let Some(base) = symbol.strip_suffix(quote) {
                if !base.is_empty() {
                    return Some(Pair::new(base, quote));
                }
            }
        }
        None
    }

    fn sign(timestamp: &str, method: &str, path: &str, body: &str, secret: &str) -> String {
        let payload = format!("{timestamp}{method}{path}{body}");
        hmac_sha512_hex(secret.as_bytes(), &payload)
    }
}

#[async_trait]
impl ExchangeAdapter for ValrAdapter {
    fn name(&self) -> &'static str {
        "valr"
    }

    async fn fetch_candles(
        &self,
        pair: &Pair,
        _interval: Interval,
        _limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        // VALR's public market-data API doesn't expose historical klines; we
        // approximate the latest candle from the current ticker summary.
        let price = self.fetch_current_price(pair).await?;
        let as_f64 = price.to_string().parse::<f64>().unwrap_or(0.0);
        Ok(vec![Candle {
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            open: as_f64,
            high: as_f64,
            low: as_f64,
            close: as_f64,
            volume: 0.0,
        }])
    }

    async fn fetch_current_price(&self, pair: &Pair) -> Result<Decimal, ExchangeError> {
        self.limiter.acquire().await;
        let url = format!(
            "{}/v1/public/{}/marketsummary",
            self.base_url,
            Self::to_venue_symbol(pair)
        );
        let resp = self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "marketsummary".into(),
            message: e.to_string(),
        })?;
        let val: serde_json::Value = resp.json().await.map_err(|e| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: e.to_string(),
        })?;
        decimal_field(self.name(), &val, "lastTradedPrice")
    }

    async fn fetch_balance(
        &self,
        currency: &str,
        credentials: &ExchangeCredentials,
    ) -> Result<Decimal, ExchangeError> {
        self.limiter.acquire().await;
        let path = "/v1/account/balances";
        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let signature = Self::sign(&timestamp, "GET", path, "", &credentials.api_secret);
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .header("X-VALR-API-KEY", &credentials.api_key)
            .header("X-VALR-SIGNATURE", signature)
            .header("X-VALR-TIMESTAMP", timestamp)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport {
                exchange: self.name().into(),
                endpoint: "account/balances".into(),
                message: e.to_string(),
            })?;
        let entries: Vec<serde_json::Value> = resp.json().await.map_err(|e| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: e.to_string(),
        })?;
        for entry in &entries {
            if entry.get("currency").and_then(|c| c.as_str()) == Some(currency) {
                return decimal_field(self.name(), entry, "available");
            }
        }
        Ok(Decimal::ZERO)
    }

    async fn fetch_order_book(&self, pair: &Pair) -> Result<OrderBook, ExchangeError> {
        self.limiter.acquire().await;
        let url = format!(
            "{}/v1/public/{}/orderbook",
            self.base_url,
            Self::to_venue_symbol(pair)
        );
        let resp = self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "orderbook".into(),
            message: e.to_string(),
        })?;
        let val: serde_json::Value = resp.json().await.map_err(|e| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: e.to_string(),
        })?;
        parse_order_book(self.name(), &val)
    }

    async fn execute_market_buy(
        &self,
        pair: &Pair,
        quote_amount: Decimal,
        credentials: &ExchangeCredentials,
    ) -> Result<Fill, ExchangeError> {
        self.submit_order(pair, OrderSide::Buy, quote_amount, credentials).await
    }

    async fn execute_market_sell(
        &self,
        pair: &Pair,
        base_quantity: Decimal,
        credentials: &ExchangeCredentials,
    ) -> Result<Fill, ExchangeError> {
        self.submit_order(pair, OrderSide::Sell, base_quantity, credentials).await
    }

    async fn test_connection(&self) -> Result<(), ExchangeError> {
        self.limiter.acquire().await;
        let url = format!("{}/v1/public/time", self.base_url);
        self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "public/time".into(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}

impl ValrAdapter {
    async fn submit_order(
        &self,
        pair: &Pair,
        side: OrderSide,
        amount: Decimal,
        credentials: &ExchangeCredentials,
    ) -> Result<Fill, ExchangeError> {
        self.limiter.acquire().await;
        let path = "/v1/orders/market";
        let side_str = match side {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        };
        let body = serde_json::json!({
            "side": side_str,
            "pair": Self::to_venue_symbol(pair),
            "quoteAmount": amount.to_string(),
        })
        .to_string();
        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let signature = Self::sign(&timestamp, "POST", path, &body, &credentials.api_secret);
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .post(&url)
            .header("X-VALR-API-KEY", &credentials.api_key)
            .header("X-VALR-SIGNATURE", signature)
            .header("X-VALR-TIMESTAMP", timestamp)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport {
                exchange: self.name().into(),
                endpoint: "orders/market".into(),
                message: e.to_string(),
            })?;
        let val: serde_json::Value = resp.json().await.map_err(|e| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: e.to_string(),
        })?;
        parse_order_fill(self.name(), &val)
    }
}

fn parse_order_fill(exchange: &str, val: &serde_json::Value) -> Result<Fill, ExchangeError> {
    let order_id = val.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let executed_quantity = decimal_field(exchange, val, "totalFilled")?;
    let executed_value = decimal_field(exchange, val, "total")?;
    let executed_price = if executed_quantity.is_zero() { Decimal::ZERO } else { executed_value / executed_quantity };
    let fee = decimal_field(exchange, val, "feePaid").unwrap_or(Decimal::ZERO);
    Ok(Fill { order_id, executed_price, executed_quantity, executed_value, fee })
}

fn decimal_field(exchange: &str, val: &serde_json::Value, field: &str) -> Result<Decimal, ExchangeError> {
    val.get(field)
        .and_then(|v| v.as_str())
        .and_then(|s| Decimal::from_str(s).ok())
        .ok_or_else(|| ExchangeError::Malformed {
            exchange: exchange.into(),
            message: format!("missing or non-decimal field `{field}`"),
        })
}

fn parse_order_book(exchange: &str, val: &serde_json::Value) -> Result<OrderBook, ExchangeError> {
    let side = |key: &str| -> Result<Vec<OrderBookLevel>, ExchangeError> {
        let arr = val.get(key).and_then(|v| v.as_array()).ok_or_else(|| ExchangeError::Malformed {
            exchange: exchange.into(),
            message: format!("missing `{key}`"),
        })?;
        arr.iter()
            .map(|lvl| {
                Ok(OrderBookLevel {
                    price: decimal_field(exchange, lvl, "price")?,
                    size: decimal_field(exchange, lvl, "quantity")?,
                })
            })
            .collect()
    };
    Ok(OrderBook {
        bids: side("Bids")?,
        asks: side("Asks")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_roundtrip() {
        let pair = Pair::new("BTC", "ZAR");
        let venue = ValrAdapter::to_venue_symbol(&pair);
        assert_eq!(venue, "BTCZAR");
        assert_eq!(ValrAdapter::from_venue_symbol(&venue, &["ZAR"]), Some(pair));
    }

    #[test]
    fn order_fill_parses_price_quantity_value_and_fee() {
        let val = serde_json::json!({
            "id": "8ffc8e2e-f09b-4d2b-9763-ffbf0ba9a88b",
            "totalFilled": "0.1",
            "total": "90000.0",
            "feePaid": "90.0",
        });
        let fill = parse_order_fill("valr", &val).unwrap();
        assert_eq!(fill.order_id, "8ffc8e2e-f09b-4d2b-9763-ffbf0ba9a88b");
        assert_eq!(fill.executed_quantity, Decimal::from_str("0.1").unwrap());
        assert_eq!(fill.executed_value, Decimal::from_str("90000.0").unwrap());
        assert_eq!(fill.executed_price, Decimal::from_str("900000.0").unwrap());
        assert_eq!(fill.fee, Decimal::from_str("90.0").unwrap());
    }
}
