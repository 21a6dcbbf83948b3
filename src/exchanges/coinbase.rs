use async_trait::async_trait;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

use super::adapter::{ExchangeAdapter, ExchangeError};
use super::http::build_client;
use super::rate_limiter::RateLimiter;
use super::signing::hmac_sha256_base64;
use crate::models::credentials::ExchangeCredentials;
use crate::models::market::{Candle, Fill, Interval, OrderBook, OrderBookLevel, OrderSide, Pair};

const BASE_URL: &str = "https://api.exchange.coinbase.com";

pub struct CoinbaseAdapter {
    http: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
}

impl Default for CoinbaseAdapter {
    fn default() -> Self {
        Self::new(BASE_URL)
    }
}

impl CoinbaseAdapter {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: build_client(),
            base_url: base_url.to_string(),
            limiter: RateLimiter::new(Duration::from_millis(150)),
        }
    }

    pub fn to_venue_symbol(pair: &Pair) -> String {
        format!("{}-{}", pair.base, pair.quote)
    }

    pub fn from_venue_symbol(symbol: &str) -> Option<Pair> {
        let (base, quote) = symbol.split_once('-')?;
        Some(Pair::new(base, quote))
    }

    /// Coinbase only exposes a fixed granularity set in seconds.
    pub fn to_venue_granularity(interval: Interval) -> u32 {
        match interval {
            Interval::M1 => 60,
            Interval::M3 => 60,
            Interval::M5 => 300,
            Interval::M15 => 900,
            Interval::M30 => 900,
            Interval::H1 => 3600,
            Interval::H2 => 3600,
            Interval::H4 => 21600,
            Interval::H6 => 21600,
            Interval::H12 => 21600,
            Interval::D1 => 86400,
            Interval::W1 => 86400,
        }
    }

    fn sign(timestamp: &str, method: &str, path: &str, body: &str, secret: &str) -> String {
        let payload = format!("{timestamp}{method}{path}{body}");
        hmac_sha256_base64(secret.as_bytes(), &payload)
    }
}

#[async_trait]
impl ExchangeAdapter for CoinbaseAdapter {
    fn name(&self) -> &'static str {
        "coinbase"
    }

    async fn fetch_candles(
        &self,
        pair: &Pair,
        interval: Interval,
        _limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        self.limiter.acquire().await;
        let url = format!(
            "{}/products/{}/candles?granularity={}",
            self.base_url,
            Self::to_venue_symbol(pair),
            Self::to_venue_granularity(interval)
        );
        let resp = self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "products/candles".into(),
            message: e.to_string(),
        })?;
        let rows: Vec<Vec<f64>> = resp.json().await.map_err(|e| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: e.to_string(),
        })?;
        rows.iter()
            .map(|row| {
                if row.len() < 6 {
                    return Err(ExchangeError::Malformed {
                        exchange: self.name().into(),
                        message: "candle row too short".into(),
                    });
                }
                // Coinbase order: time, low, high, open, close, volume
                Ok(Candle {
                    timestamp_ms: (row[0] as i64) * 1000,
                    low: row[1],
                    high: row[2],
                    open: row[3],
                    close: row[4],
                    volume: row[5],
                })
            })
            .collect()
    }

    async fn fetch_current_price(&self, pair: &Pair) -> Result<Decimal, ExchangeError> {
        self.limiter.acquire().await;
        let url = format!("{}/products/{}/ticker", self.base_url, Self::to_venue_symbol(pair));
        let resp = self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "products/ticker".into(),
            message: e.to_string(),
        })?;
        let val: serde_json::Value = resp.json().await.map_err(|e| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: e.to_string(),
        })?;
        decimal_field(self.name(), &val, "price")
    }

    async fn fetch_balance(
        &self,
        currency: &str,
        credentials: &ExchangeCredentials,
    ) -> Result<Decimal, ExchangeError> {
        self.limiter.acquire().await;
        let path = "/accounts";
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = Self::sign(&timestamp, "GET", path, "", &credentials.api_secret);
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .header("CB-ACCESS-KEY", &credentials.api_key)
            .header("CB-ACCESS-SIGN", signature)
            .header("CB-ACCESS-TIMESTAMP", timestamp)
            .header("CB-ACCESS-PASSPHRASE", credentials.passphrase.clone().unwrap_or_default())
            .send()
            .await
            .map_err(|e| ExchangeError::Transport {
                exchange: self.name().into(),
                endpoint: "accounts".into(),
                message: e.to_string(),
            })?;
        let accounts: Vec<serde_json::Value> = resp.json().await.map_err(|e| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: e.to_string(),
        })?;
        for account in &accounts {
            if account.get("currency").and_then(|c| c.as_str()) == Some(currency) {
                return decimal_field(self.name(), account, "available");
            }
        }
        Ok(Decimal::ZERO)
    }

    async fn fetch_order_book(&self, pair: &Pair) -> Result<OrderBook, ExchangeError> {
        self.limiter.acquire().await;
        let url = format!("{}/products/{}/book?level=2", self.base_url, Self::to_venue_symbol(pair));
        let resp = self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "products/book".into(),
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
        let url = format!("{}/time", self.base_url);
        self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "time".into(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}

impl CoinbaseAdapter {
    async fn submit_order(
        &self,
        pair: &Pair,
        side: OrderSide,
        amount: Decimal,
        credentials: &ExchangeCredentials,
    ) -> Result<Fill, ExchangeError> {
        self.limiter.acquire().await;
        let path = "/orders";
        let side_str = match side {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        };
        let body = serde_json::json!({
            "type": "market",
            "side": side_str,
            "product_id": Self::to_venue_symbol(pair),
            "funds": amount.to_string(),
        })
        .to_string();
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = Self::sign(&timestamp, "POST", path, &body, &credentials.api_secret);
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .post(&url)
            .header("CB-ACCESS-KEY", &credentials.api_key)
            .header("CB-ACCESS-SIGN", signature)
            .header("CB-ACCESS-TIMESTAMP", timestamp)
            .header("CB-ACCESS-PASSPHRASE", credentials.passphrase.clone().unwrap_or_default())
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport {
                exchange: self.name().into(),
                endpoint: "orders".into(),
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
    let executed_quantity = decimal_field(exchange, val, "filled_size")?;
    let executed_value = decimal_field(exchange, val, "executed_value")?;
    let executed_price = if executed_quantity.is_zero() { Decimal::ZERO } else { executed_value / executed_quantity };
    let fee = decimal_field(exchange, val, "fill_fees").unwrap_or(Decimal::ZERO);
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
                let pair = lvl.as_array().ok_or_else(|| ExchangeError::Malformed {
                    exchange: exchange.into(),
                    message: "book level not an array".into(),
                })?;
                let price = pair.first().and_then(|v| v.as_str()).and_then(|s| Decimal::from_str(s).ok()).ok_or_else(|| {
                    ExchangeError::Malformed { exchange: exchange.into(), message: "bad price".into() }
                })?;
                let size = pair.get(1).and_then(|v| v.as_str()).and_then(|s| Decimal::from_str(s).ok()).ok_or_else(|| {
                    ExchangeError::Malformed { exchange: exchange.into(), message: "bad size".into() }
                })?;
                Ok(OrderBookLevel { price, size })
            })
            .collect()
    };
    Ok(OrderBook {
        bids: side("bids")?,
        asks: side("asks")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_roundtrip() {
        let pair = Pair::new("BTC", "USD");
        let venue = CoinbaseAdapter::to_venue_symbol(&pair);
        assert_eq!(venue, "BTC-USD");
        assert_eq!(CoinbaseAdapter::from_venue_symbol(&venue), Some(pair));
    }

    #[test]
    fn granularity_covers_every_canonical_interval() {
        for iv in [Interval::M1, Interval::M5, Interval::M15, Interval::H1, Interval::H4, Interval::D1, Interval::W1] {
            assert!(CoinbaseAdapter::to_venue_granularity(iv) > 0);
        }
    }

    #[test]
    fn order_fill_parses_price_quantity_value_and_fee() {
        let val = serde_json::json!({
            "id": "d1c2b3a4",
            "filled_size": "0.5",
            "executed_value": "25000.0",
            "fill_fees": "25.0",
        });
        let fill = parse_order_fill("coinbase", &val).unwrap();
        assert_eq!(fill.order_id, "d1c2b3a4");
        assert_eq!(fill.executed_quantity, Decimal::from_str("0.5").unwrap());
        assert_eq!(fill.executed_value, Decimal::from_str("25000.0").unwrap());
        assert_eq!(fill.executed_price, Decimal::from_str("50000.0").unwrap());
        assert_eq!(fill.fee, Decimal::from_str("25.0").unwrap());
    }
}
