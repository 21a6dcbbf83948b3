use async_trait::async_trait;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

use super::adapter::{ExchangeAdapter, ExchangeError};
use super::http::build_client;
use super::rate_limiter::RateLimiter;
use super::signing::kraken_signature;
use crate::models::credentials::ExchangeCredentials;
use crate::models::market::{Candle, Fill, Interval, OrderBook, OrderBookLevel, OrderSide, Pair};

const BASE_URL: &str = "https://api.kraken.com";

pub struct KrakenAdapter {
    http: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
}

impl Default for KrakenAdapter {
    fn default() -> Self {
        Self::new(BASE_URL)
    }
}

impl KrakenAdapter {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: build_client(),
            base_url: base_url.to_string(),
            limiter: RateLimiter::new(Duration::from_millis(500)),
        }
    }

    /// Kraken renames BTC to XBT on the wire; every other asset is passed through.
    pub fn to_venue_symbol(pair: &Pair) -> String {
        let base = if pair.base == "BTC" { "XBT".to_string() } else { pair.base.clone() };
        format!("{base}{}", pair.quote)
    }

    pub fn from_venue_symbol(symbol: &str, quote_hints: &[&str]) -> Option<Pair> {
        for quote in quote_hints {
            if let Some(base) = symbol.strip_suffix(quote) {
                if !base.is_empty() {
                    let base = if base == "XBT" { "BTC" } else { base };
                    return Some(Pair::new(base, quote));
                }
            }
        }
        None
    }

    pub fn to_venue_interval(interval: Interval) -> u32 {
        match interval {
            Interval::M1 => 1,
            Interval::M3 => 3,
            Interval::M5 => 5,
            Interval::M15 => 15,
            Interval::M30 => 30,
            Interval::H1 => 60,
            Interval::H2 => 120,
            Interval::H4 => 240,
            Interval::H6 => 240,
            Interval::H12 => 720,
            Interval::D1 => 1440,
            Interval::W1 => 10080,
        }
    }
}

#[async_trait]
impl ExchangeAdapter for KrakenAdapter {
    fn name(&self) -> &'static str {
        "kraken"
    }

    async fn fetch_candles(
        &self,
        pair: &Pair,
        interval: Interval,
        _limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        self.limiter.acquire().await;
        let url = format!(
            "{}/0/public/OHLC?pair={}&interval={}",
            self.base_url,
            Self::to_venue_symbol(pair),
            Self::to_venue_interval(interval)
        );
        let resp = self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "OHLC".into(),
            message: e.to_string(),
        })?;
        let val: serde_json::Value = resp.json().await.map_err(|e| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: e.to_string(),
        })?;
        let result = val.get("result").and_then(|r| r.as_object()).ok_or_else(|| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: "missing result object".into(),
        })?;
        let rows = result
            .iter()
            .find(|(k, _)| k.as_str() != "last")
            .and_then(|(_, v)| v.as_array())
            .ok_or_else(|| ExchangeError::Malformed {
                exchange: self.name().into(),
                message: "missing OHLC series".into(),
            })?;
        rows.iter().map(|row| parse_candle_row(self.name(), row)).collect()
    }

    async fn fetch_current_price(&self, pair: &Pair) -> Result<Decimal, ExchangeError> {
        self.limiter.acquire().await;
        let symbol = Self::to_venue_symbol(pair);
        let url = format!("{}/0/public/Ticker?pair={}", self.base_url, symbol);
        let resp = self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "Ticker".into(),
            message: e.to_string(),
        })?;
        let val: serde_json::Value = resp.json().await.map_err(|e| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: e.to_string(),
        })?;
        let result = val.get("result").and_then(|r| r.as_object()).ok_or_else(|| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: "missing result object".into(),
        })?;
        let entry = result.values().next().ok_or_else(|| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: "empty ticker result".into(),
        })?;
        let last = entry
            .get("c")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|v| v.as_str())
            .and_then(|s| Decimal::from_str(s).ok())
            .ok_or_else(|| ExchangeError::Malformed {
                exchange: self.name().into(),
                message: "missing last price".into(),
            })?;
        Ok(last)
    }

    async fn fetch_balance(
        &self,
        currency: &str,
        credentials: &ExchangeCredentials,
    ) -> Result<Decimal, ExchangeError> {
        self.limiter.acquire().await;
        let path = "/0/private/Balance";
        let nonce = chrono::Utc::now().timestamp_millis().to_string();
        let body = format!("nonce={nonce}");
        let signature = kraken_signature(path, &nonce, &body, &credentials.api_secret).map_err(|e| {
            ExchangeError::Malformed { exchange: self.name().into(), message: e.to_string() }
        })?;
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .post(&url)
            .header("API-Key", &credentials.api_key)
            .header("API-Sign", signature)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport {
                exchange: self.name().into(),
                endpoint: "Balance".into(),
                message: e.to_string(),
            })?;
        let val: serde_json::Value = resp.json().await.map_err(|e| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: e.to_string(),
        })?;
        let result = val.get("result").and_then(|r| r.as_object());
        let Some(result) = result else { return Ok(Decimal::ZERO) };
        let key = if currency == "BTC" { "XXBT" } else { currency };
        if let Some(amount) = result.get(key).and_then(|v| v.as_str()).and_then(|s| Decimal::from_str(s).ok()) {
            return Ok(amount);
        }
        Ok(Decimal::ZERO)
    }

    async fn fetch_order_book(&self, pair: &Pair) -> Result<OrderBook, ExchangeError> {
        self.limiter.acquire().await;
        let symbol = Self::to_venue_symbol(pair);
        let url = format!("{}/0/public/Depth?pair={}", self.base_url, symbol);
        let resp = self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "Depth".into(),
            message: e.to_string(),
        })?;
        let val: serde_json::Value = resp.json().await.map_err(|e| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: e.to_string(),
        })?;
        let result = val.get("result").and_then(|r| r.as_object()).ok_or_else(|| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: "missing result object".into(),
        })?;
        let entry = result.values().next().ok_or_else(|| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: "empty depth result".into(),
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
        let url = format!("{}/0/public/Time", self.base_url);
        self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "Time".into(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}

impl KrakenAdapter {
    async fn submit_order(
        &self,
        pair: &Pair,
        side: OrderSide,
        amount: Decimal,
        credentials: &ExchangeCredentials,
    ) -> Result<Fill, ExchangeError> {
        self.limiter.acquire().await;
        let path = "/0/private/AddOrder";
        let nonce = chrono::Utc::now().timestamp_millis().to_string();
        let side_str = match side {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        };
        let body = format!(
            "nonce={nonce}&pair={}&type={side_str}&ordertype=market&volume={amount}",
            Self::to_venue_symbol(pair)
        );
        let signature = kraken_signature(path, &nonce, &body, &credentials.api_secret).map_err(|e| {
            ExchangeError::Malformed { exchange: self.name().into(), message: e.to_string() }
        })?;
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .post(&url)
            .header("API-Key", &credentials.api_key)
            .header("API-Sign", signature)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport {
                exchange: self.name().into(),
                endpoint: "AddOrder".into(),
                message: e.to_string(),
            })?;
        let val: serde_json::Value = resp.json().await.map_err(|e| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: e.to_string(),
        })?;
        let result = val.get("result").ok_or_else(|| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: "missing result".into(),
        })?;
        parse_order_fill(self.name(), result)
    }
}

fn parse_order_fill(exchange: &str, result: &serde_json::Value) -> Result<Fill, ExchangeError> {
    let order_id = result
        .get("txid")
        .and_then(|t| t.as_array())
        .and_then(|a| a.first())
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let field = |name: &str| -> Result<Decimal, ExchangeError> {
        result
            .get(name)
            .and_then(|v| v.as_str())
            .and_then(|s| Decimal::from_str(s).ok())
            .ok_or_else(|| ExchangeError::Malformed { exchange: exchange.into(), message: format!("missing or non-decimal field `{name}`") })
    };
    let executed_quantity = field("vol_exec")?;
    let executed_value = field("cost")?;
    let executed_price = if executed_quantity.is_zero() { Decimal::ZERO } else { executed_value / executed_quantity };
    let fee = field("fee").unwrap_or(Decimal::ZERO);
    Ok(Fill { order_id, executed_price, executed_quantity, executed_value, fee })
}

fn parse_candle_row(exchange: &str, row: &serde_json::Value) -> Result<Candle, ExchangeError> {
    let arr = row.as_array().ok_or_else(|| ExchangeError::Malformed {
        exchange: exchange.into(),
        message: "candle row not an array".into(),
    })?;
    let malformed = || ExchangeError::Malformed {
        exchange: exchange.into(),
        message: "kraken candle row shape mismatch".into(),
    };
    let timestamp_ms = arr.first().and_then(|v| v.as_i64()).map(|s| s * 1000).ok_or_else(malformed)?;
    let f = |i: usize| -> Result<f64, ExchangeError> {
        arr.get(i).and_then(|v| v.as_str()).and_then(|s| s.parse::<f64>().ok()).ok_or_else(malformed)
    };
    // Kraken order: time, open, high, low, close, vwap, volume, count
    Ok(Candle {
        timestamp_ms,
        open: f(1)?,
        high: f(2)?,
        low: f(3)?,
        close: f(4)?,
        volume: f(6)?,
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
    fn pair_roundtrip_renames_btc_to_xbt() {
        let pair = Pair::new("BTC", "USDT");
        let venue = KrakenAdapter::to_venue_symbol(&pair);
        assert_eq!(venue, "XBTUSDT");
        assert_eq!(KrakenAdapter::from_venue_symbol(&venue, &["USDT"]), Some(pair));
    }

    #[test]
    fn non_btc_symbol_passes_through() {
        let pair = Pair::new("ETH", "USDT");
        let venue = KrakenAdapter::to_venue_symbol(&pair);
        assert_eq!(venue, "ETHUSDT");
    }

    #[test]
    fn order_fill_parses_price_quantity_value_and_fee() {
        let result = serde_json::json!({
            "txid": ["OQCLML-BW3P3-BUCMWZ"],
            "vol_exec": "0.5",
            "cost": "25000.0",
            "fee": "25.0",
        });
        let fill = parse_order_fill("kraken", &result).unwrap();
        assert_eq!(fill.order_id, "OQCLML-BW3P3-BUCMWZ");
        assert_eq!(fill.executed_quantity, Decimal::from_str("0.5").unwrap());
        assert_eq!(fill.executed_value, Decimal::from_str("25000.0").unwrap());
        assert_eq!(fill.executed_price, Decimal::from_str("50000.0").unwrap());
        assert_eq!(fill.fee, Decimal::from_str("25.0").unwrap());
    }
}
