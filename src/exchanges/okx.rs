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

const BASE_URL: &str = "https://www.okx.com";

pub struct OkxAdapter {
    http: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
}

impl Default for OkxAdapter {
    fn default() -> Self {
        Self::new(BASE_URL)
    }
}

impl OkxAdapter {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: build_client(),
            base_url: base_url.to_string(),
            limiter: RateLimiter::new(Duration::from_millis(100)),
        }
    }

    pub fn to_venue_symbol(pair: &Pair) -> String {
        format!("{}-{}", pair.base, pair.quote)
    }

    pub fn from_venue_symbol(symbol: &str) -> Option<Pair> {
        let (base, quote) = symbol.split_once('-')?;
        Some(Pair::new(base, quote))
    }

    pub fn to_venue_interval(interval: Interval) -> &'static str {
        match interval {
            Interval::M1 => "1m",
            Interval::M3 => "3m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::H1 => "1H",
            Interval::H2 => "2H",
            Interval::H4 => "4H",
            Interval::H6 => "6H",
            Interval::H12 => "12H",
            Interval::D1 => "1D",
            Interval::W1 => "1W",
        }
    }

    fn from_venue_interval(s: &str) -> Option<Interval> {
        match s {
            "1m" => Some(Interval::M1),
            "3m" => Some(Interval::M3),
            "5m" => Some(Interval::M5),
            "15m" => Some(Interval::M15),
            "30m" => Some(Interval::M30),
            "1H" => Some(Interval::H1),
            "2H" => Some(Interval::H2),
            "4H" => Some(Interval::H4),
            "6H" => Some(Interval::H6),
            "12H" => Some(Interval::H12),
            "1D" => Some(Interval::D1),
            "1W" => Some(Interval::W1),
            _ => None,
        }
    }

    /// OKX-family signing: base64(HMAC-SHA256(ts+method+path+body)), plus a
    /// passphrase header (spec.md §4.1 "OKX-family").
    fn sign(timestamp: &str, method: &str, path: &str, body: &str, secret: &str) -> String {
        let payload = format!("{timestamp}{method}{path}{body}");
        hmac_sha256_base64(secret.as_bytes(), &payload)
    }
}

#[async_trait]
impl ExchangeAdapter for OkxAdapter {
    fn name(&self) -> &'static str {
        "okx"
    }

    async fn fetch_candles(
        &self,
        pair: &Pair,
        interval: Interval,
        limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        self.limiter.acquire().await;
        let url = format!(
            "{}/api/v5/market/candles?instId={}&bar={}&limit={}",
            self.base_url,
            Self::to_venue_symbol(pair),
            Self::to_venue_interval(interval),
            limit
        );
        let resp = self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "candles".into(),
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
        let url = format!(
            "{}/api/v5/market/ticker?instId={}",
            self.base_url,
            Self::to_venue_symbol(pair)
        );
        let resp = self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "ticker".into(),
            message: e.to_string(),
        })?;
        let val: serde_json::Value = resp.json().await.map_err(|e| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: e.to_string(),
        })?;
        let entry = val.get("data").and_then(|d| d.as_array()).and_then(|d| d.first()).ok_or_else(|| {
            ExchangeError::Malformed {
                exchange: self.name().into(),
                message: "missing data[0]".into(),
            }
        })?;
        parse_decimal(self.name(), entry, "last")
    }

    async fn fetch_balance(
        &self,
        currency: &str,
        credentials: &ExchangeCredentials,
    ) -> Result<Decimal, ExchangeError> {
        self.limiter.acquire().await;
        let path = "/api/v5/account/balance";
        let timestamp = chrono::Utc::now().to_rfc3339();
        let signature = Self::sign(&timestamp, "GET", path, "", &credentials.api_secret);
        let passphrase = credentials.passphrase.clone().unwrap_or_default();
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .header("OK-ACCESS-KEY", &credentials.api_key)
            .header("OK-ACCESS-SIGN", signature)
            .header("OK-ACCESS-TIMESTAMP", timestamp)
            .header("OK-ACCESS-PASSPHRASE", passphrase)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport {
                exchange: self.name().into(),
                endpoint: "account/balance".into(),
                message: e.to_string(),
            })?;
        let val: serde_json::Value = resp.json().await.map_err(|e| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: e.to_string(),
        })?;
        let details = val
            .get("data")
            .and_then(|d| d.as_array())
            .and_then(|d| d.first())
            .and_then(|a| a.get("details"))
            .and_then(|d| d.as_array())
            .ok_or_else(|| ExchangeError::Malformed {
                exchange: self.name().into(),
                message: "missing data[0].details".into(),
            })?;
        for entry in details {
            if entry.get("ccy").and_then(|c| c.as_str()) == Some(currency) {
                return parse_decimal(self.name(), entry, "availBal");
            }
        }
        Ok(Decimal::ZERO)
    }

    async fn fetch_order_book(&self, pair: &Pair) -> Result<OrderBook, ExchangeError> {
        self.limiter.acquire().await;
        let url = format!(
            "{}/api/v5/market/books?instId={}&sz=20",
            self.base_url,
            Self::to_venue_symbol(pair)
        );
        let resp = self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "books".into(),
            message: e.to_string(),
        })?;
        let val: serde_json::Value = resp.json().await.map_err(|e| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: e.to_string(),
        })?;
        let entry = val.get("data").and_then(|d| d.as_array()).and_then(|d| d.first()).ok_or_else(|| {
            ExchangeError::Malformed {
                exchange: self.name().into(),
                message: "missing data[0]".into(),
            }
        })?;
        parse_order_book(self.name(), entry)
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
        let url = format!("{}/api/v5/public/time", self.base_url);
        self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "public/time".into(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}

impl OkxAdapter {
    async fn submit_order(
        &self,
        pair: &Pair,
        side: OrderSide,
        amount: Decimal,
        credentials: &ExchangeCredentials,
    ) -> Result<Fill, ExchangeError> {
        self.limiter.acquire().await;
        let path = "/api/v5/trade/order";
        let side_str = match side {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        };
        let body = serde_json::json!({
            "instId": Self::to_venue_symbol(pair),
            "tdMode": "cash",
            "side": side_str,
            "ordType": "market",
            "sz": amount.to_string(),
        })
        .to_string();
        let timestamp = chrono::Utc::now().to_rfc3339();
        let signature = Self::sign(&timestamp, "POST", path, &body, &credentials.api_secret);
        let passphrase = credentials.passphrase.clone().unwrap_or_default();
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .post(&url)
            .header("OK-ACCESS-KEY", &credentials.api_key)
            .header("OK-ACCESS-SIGN", signature)
            .header("OK-ACCESS-TIMESTAMP", timestamp)
            .header("OK-ACCESS-PASSPHRASE", passphrase)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport {
                exchange: self.name().into(),
                endpoint: "trade/order".into(),
                message: e.to_string(),
            })?;
        let val: serde_json::Value = resp.json().await.map_err(|e| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: e.to_string(),
        })?;
        let entry = val.get("data").and_then(|d| d.as_array()).and_then(|d| d.first()).ok_or_else(|| {
            ExchangeError::Malformed {
                exchange: self.name().into(),
                message: "missing data[0]".into(),
            }
        })?;
        parse_order_fill(self.name(), entry)
    }
}

fn parse_order_fill(exchange: &str, entry: &serde_json::Value) -> Result<Fill, ExchangeError> {
    let order_id = entry.get("ordId").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let executed_quantity = parse_decimal(exchange, entry, "accFillSz")?;
    let executed_price = parse_decimal(exchange, entry, "fillPx")?;
    let executed_value = executed_price * executed_quantity;
    let fee = parse_decimal(exchange, entry, "fee").unwrap_or(Decimal::ZERO).abs();
    Ok(Fill { order_id, executed_price, executed_quantity, executed_value, fee })
}

fn parse_decimal(exchange: &str, val: &serde_json::Value, field: &str) -> Result<Decimal, ExchangeError> {
    val.get(field)
        .and_then(|v| v.as_str())
        .and_then(|s| Decimal::from_str(s).ok())
        .ok_or_else(|| ExchangeError::Malformed {
            exchange: exchange.into(),
            message: format!("missing or non-decimal field `{field}`"),
        })
}

fn parse_candle_row(exchange: &str, row: &serde_json::Value) -> Result<Candle, ExchangeError> {
    let arr = row.as_array().ok_or_else(|| ExchangeError::Malformed {
        exchange: exchange.into(),
        message: "candle row not an array".into(),
    })?;
    let malformed = || ExchangeError::Malformed {
        exchange: exchange.into(),
        message: "okx candle row shape mismatch".into(),
    };
    let timestamp_ms = arr.first().and_then(|v| v.as_str()).and_then(|s| s.parse::<i64>().ok()).ok_or_else(malformed)?;
    let f = |i: usize| -> Result<f64, ExchangeError> {
        arr.get(i).and_then(|v| v.as_str()).and_then(|s| s.parse::<f64>().ok()).ok_or_else(malformed)
    };
    Ok(Candle {
        timestamp_ms,
        open: f(1)?,
        high: f(2)?,
        low: f(3)?,
        close: f(4)?,
        volume: f(5)?,
    })
}

fn parse_order_book(exchange: &str, entry: &serde_json::Value) -> Result<OrderBook, ExchangeError> {
    let side = |key: &str| -> Result<Vec<OrderBookLevel>, ExchangeError> {
        let arr = entry.get(key).and_then(|v| v.as_array()).ok_or_else(|| ExchangeError::Malformed {
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
        let pair = Pair::new("BTC", "USDT");
        let venue = OkxAdapter::to_venue_symbol(&pair);
        assert_eq!(venue, "BTC-USDT");
        assert_eq!(OkxAdapter::from_venue_symbol(&venue), Some(pair));
    }

    #[test]
    fn interval_roundtrip_over_canonical_set() {
        for iv in [Interval::M1, Interval::M5, Interval::M15, Interval::M30, Interval::H1, Interval::H4, Interval::D1] {
            let venue = OkxAdapter::to_venue_interval(iv);
            assert_eq!(OkxAdapter::from_venue_interval(venue), Some(iv));
        }
    }

    #[test]
    fn order_fill_parses_price_quantity_value_and_fee() {
        let entry = serde_json::json!({
            "ordId": "312269865356374016",
            "fillPx": "50000.0",
            "accFillSz": "0.5",
            "fee": "-12.5",
        });
        let fill = parse_order_fill("okx", &entry).unwrap();
        assert_eq!(fill.order_id, "312269865356374016");
        assert_eq!(fill.executed_price, Decimal::from_str("50000.0").unwrap());
        assert_eq!(fill.executed_quantity, Decimal::from_str("0.5").unwrap());
        assert_eq!(fill.executed_value, Decimal::from_str("25000.00").unwrap());
        assert_eq!(fill.fee, Decimal::from_str("12.5").unwrap());
    }
}
