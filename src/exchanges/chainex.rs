use async_trait::async_trait;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

use super::adapter::{ExchangeAdapter, ExchangeError};
use super::http::build_client;
use super::rate_limiter::RateLimiter;
use super::signing::hmac_sha256_hex;
use crate::models::credentials::ExchangeCredentials;
use crate::models::market::{Candle, Fill, Interval, OrderBook, OrderBookLevel, OrderSide, Pair};

const BASE_URL: &str = "https://chainex.io";

pub struct ChainexAdapter {
    http: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
}

impl Default for ChainexAdapter {
    fn default() -> Self {
        Self::new(BASE_URL)
    }
}

impl ChainexAdapter {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: build_client(),
            base_url: base_url.to_string(),
            limiter: RateLimiter::new(Duration::from_millis(500)),
        }
    }

    pub fn to_venue_symbol(pair: &Pair) -> String {
        format!("{}_{}", pair.base, pair.quote)
    }

    pub fn from_venue_symbol(symbol: &str) -> Option<Pair> {
        let (base, quote) = symbol.split_once('_')?;
        Some(Pair::new(base, quote))
    }

    /// ChainEX has no published candle/interval spelling in the catalogue; it
    /// is assigned the query-string HMAC-SHA256 hex scheme shared with the
    /// Binance/Bybit family.
    fn sign(query: &str, secret: &str) -> String {
        hmac_sha256_hex(secret.as_bytes(), query)
    }
}

#[async_trait]
impl ExchangeAdapter for ChainexAdapter {
    fn name(&self) -> &'static str {
        "chainex"
    }

    async fn fetch_candles(
        &self,
        pair: &Pair,
        _interval: Interval,
        _limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
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
        let url = format!("{}/api/v1/market/{}", self.base_url, Self::to_venue_symbol(pair));
        let resp = self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "market".into(),
            message: e.to_string(),
        })?;
        let val: serde_json::Value = resp.json().await.map_err(|e| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: e.to_string(),
        })?;
        let data = val.get("data").unwrap_or(&val);
        decimal_field(self.name(), data, "last_price")
    }

    async fn fetch_balance(
        &self,
        currency: &str,
        credentials: &ExchangeCredentials,
    ) -> Result<Decimal, ExchangeError> {
        self.limiter.acquire().await;
        let nonce = chrono::Utc::now().timestamp_millis().to_string();
        let query = format!("apikey={}&nonce={}", credentials.api_key, nonce);
        let signature = Self::sign(&query, &credentials.api_secret);
        let url = format!("{}/api/v1/balance?{}&signature={}", self.base_url, query, signature);
        let resp = self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "balance".into(),
            message: e.to_string(),
        })?;
        let val: serde_json::Value = resp.json().await.map_err(|e| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: e.to_string(),
        })?;
        let entries = val.get("data").and_then(|d| d.as_array()).ok_or_else(|| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: "missing data array".into(),
        })?;
        for entry in entries {
            if entry.get("coin_code").and_then(|c| c.as_str()) == Some(currency) {
                return decimal_field(self.name(), entry, "available");
            }
        }
        Ok(Decimal::ZERO)
    }

    async fn fetch_order_book(&self, pair: &Pair) -> Result<OrderBook, ExchangeError> {
        self.limiter.acquire().await;
        let url = format!("{}/api/v1/orderbook/{}", self.base_url, Self::to_venue_symbol(pair));
        let resp = self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "orderbook".into(),
            message: e.to_string(),
        })?;
        let val: serde_json::Value = resp.json().await.map_err(|e| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: e.to_string(),
        })?;
        let data = val.get("data").unwrap_or(&val);
        parse_order_book(self.name(), data)
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
        let url = format!("{}/api/v1/market/BTC_ZAR", self.base_url);
        self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "market".into(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}

impl ChainexAdapter {
    async fn submit_order(
        &self,
        pair: &Pair,
        side: OrderSide,
        amount: Decimal,
        credentials: &ExchangeCredentials,
    ) -> Result<Fill, ExchangeError> {
        self.limiter.acquire().await;
        let nonce = chrono::Utc::now().timestamp_millis().to_string();
        let side_str = match side {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        };
        let query = format!(
            "apikey={}&nonce={}&market_pair={}&type={}&amount={}",
            credentials.api_key,
            nonce,
            Self::to_venue_symbol(pair),
            side_str,
            amount
        );
        let signature = Self::sign(&query, &credentials.api_secret);
        let url = format!("{}/api/v1/order/market?{}&signature={}", self.base_url, query, signature);
        let resp = self.http.post(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "order/market".into(),
            message: e.to_string(),
        })?;
        let val: serde_json::Value = resp.json().await.map_err(|e| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: e.to_string(),
        })?;
        let data = val.get("data").ok_or_else(|| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: "missing data".into(),
        })?;
        parse_order_fill(self.name(), data)
    }
}

fn parse_order_fill(exchange: &str, data: &serde_json::Value) -> Result<Fill, ExchangeError> {
    let order_id = data.get("order_id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let executed_quantity = decimal_field(exchange, data, "amount_executed")?;
    let executed_price = decimal_field(exchange, data, "price_avg")?;
    let executed_value = executed_price * executed_quantity;
    let fee = decimal_field(exchange, data, "fee").unwrap_or(Decimal::ZERO);
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

fn parse_order_book(exchange: &str, data: &serde_json::Value) -> Result<OrderBook, ExchangeError> {
    let side = |key: &str| -> Result<Vec<OrderBookLevel>, ExchangeError> {
        let arr = data.get(key).and_then(|v| v.as_array()).ok_or_else(|| ExchangeError::Malformed {
            exchange: exchange.into(),
            message: format!("missing `{key}`"),
        })?;
        arr.iter()
            .map(|lvl| {
                Ok(OrderBookLevel {
                    price: decimal_field(exchange, lvl, "price")?,
                    size: decimal_field(exchange, lvl, "volume")?,
                })
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
        let pair = Pair::new("BTC", "ZAR");
        let venue = ChainexAdapter::to_venue_symbol(&pair);
        assert_eq!(venue, "BTC_ZAR");
        assert_eq!(ChainexAdapter::from_venue_symbol(&venue), Some(pair));
    }

    #[test]
    fn order_fill_parses_price_quantity_value_and_fee() {
        let data = serde_json::json!({
            "order_id": "55213",
            "price_avg": "900000.0",
            "amount_executed": "0.1",
            "fee": "90.0",
        });
        let fill = parse_order_fill("chainex", &data).unwrap();
        assert_eq!(fill.order_id, "55213");
        assert_eq!(fill.executed_price, Decimal::from_str("900000.0").unwrap());
        assert_eq!(fill.executed_quantity, Decimal::from_str("0.1").unwrap());
        assert_eq!(fill.executed_value, Decimal::from_str("90000.00").unwrap());
        assert_eq!(fill.fee, Decimal::from_str("90.0").unwrap());
    }
}
