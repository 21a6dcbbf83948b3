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

const BASE_URL: &str = "https://api.bitget.com";
const SUFFIX: &str = "_SPBL";

pub struct BitgetAdapter {
    http: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
}

impl Default for BitgetAdapter {
    fn default() -> Self {
        Self::new(BASE_URL)
    }
}

impl BitgetAdapter {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: build_client(),
            base_url: base_url.to_string(),
            limiter: RateLimiter::new(Duration::from_millis(100)),
        }
    }

    pub fn to_venue_symbol(pair: &Pair) -> String {
        format!("{}{}{}", pair.base, pair.quote, SUFFIX)
    }

    pub fn from_venue_symbol(symbol: &str) -> Option<Pair> {
        let base = symbol.strip_suffix(SUFFIX)?;
        if base.len() < 2 {
            return None;
        }
        // Bitget quotes are USDT-dominated in this catalogue; fall back to
        // a fixed split since the REST responses don't echo base/quote.
        for quote in ["USDT", "USDC", "BTC", "ETH"] {
            if let Some(b) = base.strip_suffix(quote) {
                if !b.is_empty() {
                    return Some(Pair::new(b, quote));
                }
            }
        }
        None
    }

    pub fn to_venue_interval(interval: Interval) -> &'static str {
        match interval {
            Interval::M1 => "1min",
            Interval::M3 => "3min",
            Interval::M5 => "5min",
            Interval::M15 => "15min",
            Interval::M30 => "30min",
            Interval::H1 => "1h",
            Interval::H2 => "2h",
            Interval::H4 => "4h",
            Interval::H6 => "6h",
            Interval::H12 => "12h",
            Interval::D1 => "1day",
            Interval::W1 => "1week",
        }
    }

    fn from_venue_interval(s: &str) -> Option<Interval> {
        match s {
            "1min" => Some(Interval::M1),
            "3min" => Some(Interval::M3),
            "5min" => Some(Interval::M5),
            "15min" => Some(Interval::M15),
            "30min" => Some(Interval::M30),
            "1h" => Some(Interval::H1),
            "2h" => Some(Interval::H2),
            "4h" => Some(Interval::H4),
            "6h" => Some(Interval::H6),
            "12h" => Some(Interval::H12),
            "1day" => Some(Interval::D1),
            "1week" => Some(Interval::W1),
            _ => None,
        }
    }

    fn sign(timestamp: &str, method: &str, path: &str, body: &str, secret: &str) -> String {
        let payload = format!("{timestamp}{method}{path}{body}");
        hmac_sha256_base64(secret.as_bytes(), &payload)
    }
}

#[async_trait]
impl ExchangeAdapter for BitgetAdapter {
    fn name(&self) -> &'static str {
        "bitget"
    }

    async fn fetch_candles(
        &self,
        pair: &Pair,
        interval: Interval,
        limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        self.limiter.acquire().await;
        let url = format!(
            "{}/api/spot/v1/market/candles?symbol={}&period={}&limit={}",
            self.base_url,
            Self::to_venue_symbol(pair),
            Self::to_venue_interval(interval),
            limit
        );
        let resp = self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "market/candles".into(),
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
            "{}/api/spot/v1/market/ticker?symbol={}",
            self.base_url,
            Self::to_venue_symbol(pair)
        );
        let resp = self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "market/ticker".into(),
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
        let path = "/api/spot/v1/account/assets";
        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let signature = Self::sign(&timestamp, "GET", path, "", &credentials.api_secret);
        let passphrase = credentials.passphrase.clone().unwrap_or_default();
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .header("ACCESS-KEY", &credentials.api_key)
            .header("ACCESS-SIGN", signature)
            .header("ACCESS-TIMESTAMP", timestamp)
            .header("ACCESS-PASSPHRASE", passphrase)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport {
                exchange: self.name().into(),
                endpoint: "account/assets".into(),
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
            if entry.get("coinName").and_then(|c| c.as_str()) == Some(currency) {
                return decimal_field(self.name(), entry, "available");
            }
        }
        Ok(Decimal::ZERO)
    }

    async fn fetch_order_book(&self, pair: &Pair) -> Result<OrderBook, ExchangeError> {
        self.limiter.acquire().await;
        let url = format!(
            "{}/api/spot/v1/market/depth?symbol={}&type=step0",
            self.base_url,
            Self::to_venue_symbol(pair)
        );
        let resp = self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "market/depth".into(),
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
        let url = format!("{}/api/spot/v1/public/time", self.base_url);
        self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "public/time".into(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}

impl BitgetAdapter {
    async fn submit_order(
        &self,
        pair: &Pair,
        side: OrderSide,
        amount: Decimal,
        credentials: &ExchangeCredentials,
    ) -> Result<Fill, ExchangeError> {
        self.limiter.acquire().await;
        let path = "/api/spot/v1/trade/orders";
        let side_str = match side {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        };
        let body = serde_json::json!({
            "symbol": Self::to_venue_symbol(pair),
            "side": side_str,
            "orderType": "market",
            "quantity": amount.to_string(),
        })
        .to_string();
        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let signature = Self::sign(&timestamp, "POST", path, &body, &credentials.api_secret);
        let passphrase = credentials.passphrase.clone().unwrap_or_default();
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .post(&url)
            .header("ACCESS-KEY", &credentials.api_key)
            .header("ACCESS-SIGN", signature)
            .header("ACCESS-TIMESTAMP", timestamp)
            .header("ACCESS-PASSPHRASE", passphrase)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport {
                exchange: self.name().into(),
                endpoint: "trade/orders".into(),
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
    let order_id = data.get("orderId").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let executed_quantity = decimal_field(exchange, data, "fillQuantity")?;
    let executed_price = decimal_field(exchange, data, "priceAvg")?;
    let executed_value = decimal_field(exchange, data, "fillTotalAmount").unwrap_or(executed_price * executed_quantity);
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

fn parse_candle_row(exchange: &str, row: &serde_json::Value) -> Result<Candle, ExchangeError> {
    let arr = row.as_array().ok_or_else(|| ExchangeError::Malformed {
        exchange: exchange.into(),
        message: "candle row not an array".into(),
    })?;
    let malformed = || ExchangeError::Malformed {
        exchange: exchange.into(),
        message: "bitget candle row shape mismatch".into(),
    };
    let timestamp_ms = arr
        .first()
        .and_then(|v| v.as_str().map(String::from).or_else(|| v.as_i64().map(|n| n.to_string())))
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(malformed)?;
    let f = |i: usize| -> Result<f64, ExchangeError> {
        arr.get(i)
            .and_then(|v| v.as_str().map(String::from).or_else(|| v.as_f64().map(|n| n.to_string())))
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(malformed)
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

fn parse_order_book(exchange: &str, data: &serde_json::Value) -> Result<OrderBook, ExchangeError> {
    let side = |key: &str| -> Result<Vec<OrderBookLevel>, ExchangeError> {
        let arr = data.get(key).and_then(|v| v.as_array()).ok_or_else(|| ExchangeError::Malformed {
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
        let venue = BitgetAdapter::to_venue_symbol(&pair);
        assert_eq!(venue, "BTCUSDT_SPBL");
        assert_eq!(BitgetAdapter::from_venue_symbol(&venue), Some(pair));
    }

    #[test]
    fn interval_roundtrip_over_canonical_set() {
        for iv in [Interval::M1, Interval::M5, Interval::M15, Interval::M30, Interval::H1, Interval::H4, Interval::D1] {
            let venue = BitgetAdapter::to_venue_interval(iv);
            assert_eq!(BitgetAdapter::from_venue_interval(venue), Some(iv));
        }
    }

    #[test]
    fn order_fill_parses_price_quantity_value_and_fee() {
        let data = serde_json::json!({
            "orderId": "102847",
            "priceAvg": "50000.0",
            "fillQuantity": "0.5",
            "fillTotalAmount": "25000.0",
            "fee": "0.025",
        });
        let fill = parse_order_fill("bitget", &data).unwrap();
        assert_eq!(fill.order_id, "102847");
        assert_eq!(fill.executed_price, Decimal::from_str("50000.0").unwrap());
        assert_eq!(fill.executed_quantity, Decimal::from_str("0.5").unwrap());
        assert_eq!(fill.executed_value, Decimal::from_str("25000.0").unwrap());
        assert_eq!(fill.fee, Decimal::from_str("0.025").unwrap());
    }
}
