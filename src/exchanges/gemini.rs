use async_trait::async_trait;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

use super::adapter::{ExchangeAdapter, ExchangeError};
use super::http::build_client;
use super::rate_limiter::RateLimiter;
use super::signing::{base64_encode, hmac_sha384_base64};
use crate::models::credentials::ExchangeCredentials;
use crate::models::market::{Candle, Fill, Interval, OrderBook, OrderBookLevel, OrderSide, Pair};

const BASE_URL: &str = "https://api.gemini.com";

pub struct GeminiAdapter {
    http: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
}

impl Default for GeminiAdapter {
    fn default() -> Self {
        Self::new(BASE_URL)
    }
}

impl GeminiAdapter {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: build_client(),
            base_url: base_url.to_string(),
            limiter: RateLimiter::new(Duration::from_millis(200)),
        }
    }

    pub fn to_venue_symbol(pair: &Pair) -> String {
        format!("{}{}", pair.base, pair.quote).to_lowercase()
    }

    pub fn from_venue_symbol(symbol: &str, quote_hints: &[&str]) -> Option<Pair> {
        let upper = symbol.to_uppercase();
        for quote in quote_hints {
            if let Some(base) = upper.strip_suffix(quote) {
                if !base.is_empty() {
                    return Some(Pair::new(base, quote));
                }
            }
        }
        None
    }

    pub fn to_venue_interval(interval: Interval) -> &'static str {
        match interval {
            Interval::M1 => "1m",
            Interval::M3 => "3m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::H1 => "1hr",
            Interval::H2 => "1hr",
            Interval::H4 => "6hr",
            Interval::H6 => "6hr",
            Interval::H12 => "6hr",
            Interval::D1 => "1day",
            Interval::W1 => "1day",
        }
    }

    /// Gemini's private API signs a base64-encoded JSON payload (which carries
    /// the nonce and request path) with HMAC-SHA384, matching the
    /// Gemini-specific row of the signing catalogue.
    fn sign_payload(payload_json: &serde_json::Value, secret: &str) -> (String, String) {
        let encoded = base64_encode(payload_json.to_string().as_bytes());
        let signature = hmac_sha384_base64(secret.as_bytes(), &encoded);
        (encoded, signature)
    }
}

#[async_trait]
impl ExchangeAdapter for GeminiAdapter {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn fetch_candles(
        &self,
        pair: &Pair,
        interval: Interval,
        _limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        self.limiter.acquire().await;
        let url = format!(
            "{}/v2/candles/{}/{}",
            self.base_url,
            Self::to_venue_symbol(pair),
            Self::to_venue_interval(interval)
        );
        let resp = self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "v2/candles".into(),
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
                Ok(Candle {
                    timestamp_ms: row[0] as i64,
                    open: row[1],
                    high: row[2],
                    low: row[3],
                    close: row[4],
                    volume: row[5],
                })
            })
            .collect()
    }

    async fn fetch_current_price(&self, pair: &Pair) -> Result<Decimal, ExchangeError> {
        self.limiter.acquire().await;
        let url = format!("{}/v1/pubticker/{}", self.base_url, Self::to_venue_symbol(pair));
        let resp = self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "v1/pubticker".into(),
            message: e.to_string(),
        })?;
        let val: serde_json::Value = resp.json().await.map_err(|e| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: e.to_string(),
        })?;
        decimal_field(self.name(), &val, "last")
    }

    async fn fetch_balance(
        &self,
        currency: &str,
        credentials: &ExchangeCredentials,
    ) -> Result<Decimal, ExchangeError> {
        self.limiter.acquire().await;
        let nonce = chrono::Utc::now().timestamp_millis().to_string();
        let payload = serde_json::json!({
            "request": "/v1/balances",
            "nonce": nonce,
        });
        let (encoded, signature) = Self::sign_payload(&payload, &credentials.api_secret);
        let url = format!("{}/v1/balances", self.base_url);
        let resp = self
            .http
            .post(&url)
            .header("X-GEMINI-APIKEY", &credentials.api_key)
            .header("X-GEMINI-PAYLOAD", encoded)
            .header("X-GEMINI-SIGNATURE", signature)
            .header("Content-Length", "0")
            .send()
            .await
            .map_err(|e| ExchangeError::Transport {
                exchange: self.name().into(),
                endpoint: "v1/balances".into(),
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
        let url = format!("{}/v1/book/{}", self.base_url, Self::to_venue_symbol(pair));
        let resp = self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "v1/book".into(),
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
        let url = format!("{}/v1/pubticker/btcusd", self.base_url);
        self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "v1/pubticker".into(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}

impl GeminiAdapter {
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
        let payload = serde_json::json!({
            "request": "/v1/order/new",
            "nonce": nonce,
            "symbol": Self::to_venue_symbol(pair),
            "amount": amount.to_string(),
            "side": side_str,
            "type": "market",
        });
        let (encoded, signature) = Self::sign_payload(&payload, &credentials.api_secret);
        let url = format!("{}/v1/order/new", self.base_url);
        let resp = self
            .http
            .post(&url)
            .header("X-GEMINI-APIKEY", &credentials.api_key)
            .header("X-GEMINI-PAYLOAD", encoded)
            .header("X-GEMINI-SIGNATURE", signature)
            .header("Content-Length", "0")
            .send()
            .await
            .map_err(|e| ExchangeError::Transport {
                exchange: self.name().into(),
                endpoint: "v1/order/new".into(),
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
    let order_id = val.get("order_id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let executed_quantity = decimal_field(exchange, val, "executed_amount")?;
    let executed_price = decimal_field(exchange, val, "avg_execution_price")?;
    let executed_value = executed_price * executed_quantity;
    let fee = decimal_field(exchange, val, "fee_amount").unwrap_or(Decimal::ZERO);
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
                    size: decimal_field(exchange, lvl, "amount")?,
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
        let pair = Pair::new("BTC", "USD");
        let venue = GeminiAdapter::to_venue_symbol(&pair);
        assert_eq!(venue, "btcusd");
        assert_eq!(GeminiAdapter::from_venue_symbol(&venue, &["USD", "USDT"]), Some(pair));
    }

    #[test]
    fn payload_signature_is_deterministic() {
        let payload = serde_json::json!({"request": "/v1/balances", "nonce": "1"});
        let (e1, s1) = GeminiAdapter::sign_payload(&payload, "secret");
        let (e2, s2) = GeminiAdapter::sign_payload(&payload, "secret");
        assert_eq!(e1, e2);
        assert_eq!(s1, s2);
    }

    #[test]
    fn order_fill_parses_price_quantity_value_and_fee() {
        let val = serde_json::json!({
            "order_id": "106817",
            "avg_execution_price": "50000.0",
            "executed_amount": "0.5",
            "fee_amount": "25.0",
        });
        let fill = parse_order_fill("gemini", &val).unwrap();
        assert_eq!(fill.order_id, "106817");
        assert_eq!(fill.executed_price, Decimal::from_str("50000.0").unwrap());
        assert_eq!(fill.executed_quantity, Decimal::from_str("0.5").unwrap());
        assert_eq!(fill.executed_value, Decimal::from_str("25000.00").unwrap());
        assert_eq!(fill.fee, Decimal::from_str("25.0").unwrap());
    }
}
