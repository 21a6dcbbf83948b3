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

const BASE_URL: &str = "https://ascendex.com";

pub struct AscendexAdapter {
    http: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
}

impl Default for AscendexAdapter {
    fn default() -> Self {
        Self::new(BASE_URL)
    }
}

impl AscendexAdapter {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: build_client(),
            base_url: base_url.to_string(),
            limiter: RateLimiter::new(Duration::from_millis(200)),
        }
    }

    pub fn to_venue_symbol(pair: &Pair) -> String {
        format!("{}/{}", pair.base, pair.quote)
    }

    pub fn from_venue_symbol(symbol: &str) -> Option<Pair> {
        let (base, quote) = symbol.split_once('/')?;
        Some(Pair::new(base, quote))
    }

    pub fn to_venue_interval(interval: Interval) -> &'static str {
        match interval {
            Interval::M1 => "1",
            Interval::M3 => "3",
            Interval::M5 => "5",
            Interval::M15 => "15",
            Interval::M30 => "30",
            Interval::H1 => "60",
            Interval::H2 => "120",
            Interval::H4 => "240",
            Interval::H6 => "360",
            Interval::H12 => "720",
            Interval::D1 => "1d",
            Interval::W1 => "1w",
        }
    }

    /// AscendEX signs `timestamp + "+" + path` with HMAC-SHA256, base64 encoded —
    /// its own variant of the base64 scheme family.
    fn sign(timestamp: &str, path: &str, secret: &str) -> String {
        let payload = format!("{timestamp}+{path}");
        hmac_sha256_base64(secret.as_bytes(), &payload)
    }
}

#[async_trait]
impl ExchangeAdapter for AscendexAdapter {
    fn name(&self) -> &'static str {
        "ascendex"
    }

    async fn fetch_candles(
        &self,
        pair: &Pair,
        interval: Interval,
        limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        self.limiter.acquire().await;
        let url = format!(
            "{}/api/pro/v1/barhist?symbol={}&interval={}&n={}",
            self.base_url,
            Self::to_venue_symbol(pair),
            Self::to_venue_interval(interval),
            limit
        );
        let resp = self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "barhist".into(),
            message: e.to_string(),
        })?;
        let val: serde_json::Value = resp.json().await.map_err(|e| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: e.to_string(),
        })?;
        let rows = val.get("data").and_then(|d| d.as_array()).ok_or_else(|| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: "missing data array".into(),
        })?;
        rows.iter().map(|row| parse_candle_row(self.name(), row)).collect()
    }

    async fn fetch_current_price(&self, pair: &Pair) -> Result<Decimal, ExchangeError> {
        self.limiter.acquire().await;
        let url = format!("{}/api/pro/v1/ticker?symbol={}", self.base_url, Self::to_venue_symbol(pair));
        let resp = self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "ticker".into(),
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
        decimal_field(self.name(), data, "close")
    }

    async fn fetch_balance(
        &self,
        currency: &str,
        credentials: &ExchangeCredentials,
    ) -> Result<Decimal, ExchangeError> {
        self.limiter.acquire().await;
        let path = "api/pro/v1/cash/balance";
        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let signature = Self::sign(&timestamp, path, &credentials.api_secret);
        let url = format!("{}/{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .header("x-auth-key", &credentials.api_key)
            .header("x-auth-signature", signature)
            .header("x-auth-timestamp", timestamp)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport {
                exchange: self.name().into(),
                endpoint: "cash/balance".into(),
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
            if entry.get("asset").and_then(|a| a.as_str()) == Some(currency) {
                return decimal_field(self.name(), entry, "availableBalance");
            }
        }
        Ok(Decimal::ZERO)
    }

    async fn fetch_order_book(&self, pair: &Pair) -> Result<OrderBook, ExchangeError> {
        self.limiter.acquire().await;
        let url = format!("{}/api/pro/v1/depth?symbol={}", self.base_url, Self::to_venue_symbol(pair));
        let resp = self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "depth".into(),
            message: e.to_string(),
        })?;
        let val: serde_json::Value = resp.json().await.map_err(|e| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: e.to_string(),
        })?;
        let data = val.get("data").and_then(|d| d.get("data")).ok_or_else(|| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: "missing data".into(),
        })?;
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
        let url = format!("{}/api/pro/v1/exchange-info", self.base_url);
        self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "exchange-info".into(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}

impl AscendexAdapter {
    async fn submit_order(
        &self,
        pair: &Pair,
        side: OrderSide,
        amount: Decimal,
        credentials: &ExchangeCredentials,
    ) -> Result<Fill, ExchangeError> {
        self.limiter.acquire().await;
        let path = "api/pro/v1/cash/order";
        let side_str = match side {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        };
        let body = serde_json::json!({
            "symbol": Self::to_venue_symbol(pair),
            "orderType": "market",
            "side": side_str,
            "orderQty": amount.to_string(),
        })
        .to_string();
        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let signature = Self::sign(&timestamp, path, &credentials.api_secret);
        let url = format!("{}/{}", self.base_url, path);
        let resp = self
            .http
            .post(&url)
            .header("x-auth-key", &credentials.api_key)
            .header("x-auth-signature", signature)
            .header("x-auth-timestamp", timestamp)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport {
                exchange: self.name().into(),
                endpoint: "cash/order".into(),
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
    let info = val.get("data").and_then(|d| d.get("info")).unwrap_or(val);
    let order_id = info.get("orderId").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let executed_quantity = decimal_field(exchange, info, "cumFilledQty")?;
    let executed_price = decimal_field(exchange, info, "avgPx")?;
    let executed_value = executed_price * executed_quantity;
    let fee = decimal_field(exchange, info, "cumFee").unwrap_or(Decimal::ZERO);
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

fn parse_candle_row(exchange: &str, row: &serde_json::Value) -> Result<Candle, ExchangeError> {
    let data = row.get("data").unwrap_or(row);
    let malformed = || ExchangeError::Malformed {
        exchange: exchange.into(),
        message: "ascendex candle row missing fields".into(),
    };
    let timestamp_ms = data.get("ts").and_then(|v| v.as_i64()).ok_or_else(malformed)?;
    let f = |field: &str| -> Result<f64, ExchangeError> {
        data.get(field).and_then(|v| v.as_str()).and_then(|s| s.parse::<f64>().ok()).ok_or_else(malformed)
    };
    Ok(Candle {
        timestamp_ms,
        open: f("o")?,
        high: f("h")?,
        low: f("l")?,
        close: f("c")?,
        volume: f("v")?,
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
                let row = lvl.as_array().ok_or_else(|| ExchangeError::Malformed {
                    exchange: exchange.into(),
                    message: "book level not an array".into(),
                })?;
                let price = row.first().and_then(|v| v.as_str()).and_then(|s| Decimal::from_str(s).ok()).ok_or_else(|| {
                    ExchangeError::Malformed { exchange: exchange.into(), message: "bad price".into() }
                })?;
                let size = row.get(1).and_then(|v| v.as_str()).and_then(|s| Decimal::from_str(s).ok()).ok_or_else(|| {
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
        let pair = Pair::new("BTC", "USDT");
        let venue = AscendexAdapter::to_venue_symbol(&pair);
        assert_eq!(venue, "BTC/USDT");
        assert_eq!(AscendexAdapter::from_venue_symbol(&venue), Some(pair));
    }

    #[test]
    fn signature_is_deterministic() {
        let s1 = AscendexAdapter::sign("1000", "api/pro/v1/cash/balance", "secret");
        let s2 = AscendexAdapter::sign("1000", "api/pro/v1/cash/balance", "secret");
        assert_eq!(s1, s2);
    }

    #[test]
    fn order_fill_parses_price_quantity_value_and_fee() {
        let resp = serde_json::json!({
            "code": 0,
            "data": {
                "info": {
                    "orderId": "a1b2c3",
                    "avgPx": "50000.0",
                    "cumFilledQty": "0.5",
                    "cumFee": "0.025",
                }
            }
        });
        let fill = parse_order_fill("ascendex", &resp).unwrap();
        assert_eq!(fill.order_id, "a1b2c3");
        assert_eq!(fill.executed_price, Decimal::from_str("50000.0").unwrap());
        assert_eq!(fill.executed_quantity, Decimal::from_str("0.5").unwrap());
        assert_eq!(fill.executed_value, Decimal::from_str("25000.00").unwrap());
        assert_eq!(fill.fee, Decimal::from_str("0.025").unwrap());
    }
}
