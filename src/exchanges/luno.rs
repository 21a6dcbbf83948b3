use async_trait::async_trait;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

use super::adapter::{ExchangeAdapter, ExchangeError};
use super::http::build_client;
use super::rate_limiter::RateLimiter;
use crate::models::credentials::ExchangeCredentials;
use crate::models::market::{Candle, Fill, Interval, OrderBook, OrderBookLevel, OrderSide, Pair};

const BASE_URL: &str = "https://api.luno.com";

pub struct LunoAdapter {
    http: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
}

impl Default for LunoAdapter {
    fn default() -> Self {
        Self::new(BASE_URL)
    }
}

impl LunoAdapter {
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

    pub fn to_venue_duration_seconds(interval: Interval) -> u32 {
        match interval {
            Interval::M1 => 60,
            Interval::M3 => 300,
            Interval::M5 => 300,
            Interval::M15 => 900,
            Interval::M30 => 1800,
            Interval::H1 => 3600,
            Interval::H2 => 7200,
            Interval::H4 => 14400,
            Interval::H6 => 14400,
            Interval::H12 => 86400,
            Interval::D1 => 86400,
            Interval::W1 => 604800,
        }
    }
}

#[async_trait]
impl ExchangeAdapter for LunoAdapter {
    fn name(&self) -> &'static str {
        "luno"
    }

    async fn fetch_candles(
        &self,
        pair: &Pair,
        interval: Interval,
        _limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        self.limiter.acquire().await;
        let since_ms = chrono::Utc::now().timestamp_millis() - 86_400_000;
        let url = format!(
            "{}/api/exchange/1/candles?pair={}&since={}&duration={}",
            self.base_url,
            Self::to_venue_symbol(pair),
            since_ms,
            Self::to_venue_duration_seconds(interval)
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
        let rows = val.get("candles").and_then(|c| c.as_array()).ok_or_else(|| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: "missing candles array".into(),
        })?;
        rows.iter().map(|row| parse_candle_row(self.name(), row)).collect()
    }

    async fn fetch_current_price(&self, pair: &Pair) -> Result<Decimal, ExchangeError> {
        self.limiter.acquire().await;
        let url = format!("{}/api/1/ticker?pair={}", self.base_url, Self::to_venue_symbol(pair));
        let resp = self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "ticker".into(),
            message: e.to_string(),
        })?;
        let val: serde_json::Value = resp.json().await.map_err(|e| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: e.to_string(),
        })?;
        decimal_field(self.name(), &val, "last_trade")
    }

    async fn fetch_balance(
        &self,
        currency: &str,
        credentials: &ExchangeCredentials,
    ) -> Result<Decimal, ExchangeError> {
        self.limiter.acquire().await;
        let url = format!("{}/api/1/balance", self.base_url);
        let resp = self
            .http
            .get(&url)
            .basic_auth(&credentials.api_key, Some(&credentials.api_secret))
            .send()
            .await
            .map_err(|e| ExchangeError::Transport {
                exchange: self.name().into(),
                endpoint: "balance".into(),
                message: e.to_string(),
            })?;
        let val: serde_json::Value = resp.json().await.map_err(|e| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: e.to_string(),
        })?;
        let entries = val.get("balance").and_then(|b| b.as_array()).ok_or_else(|| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: "missing balance array".into(),
        })?;
        for entry in entries {
            if entry.get("asset").and_then(|a| a.as_str()) == Some(currency) {
                return decimal_field(self.name(), entry, "balance");
            }
        }
        Ok(Decimal::ZERO)
    }

    async fn fetch_order_book(&self, pair: &Pair) -> Result<OrderBook, ExchangeError> {
        self.limiter.acquire().await;
        let url = format!("{}/api/1/orderbook?pair={}", self.base_url, Self::to_venue_symbol(pair));
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
        let url = format!("{}/api/1/ticker?pair=XBTUSD", self.base_url);
        self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "ticker".into(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}

impl LunoAdapter {
    async fn submit_order(
        &self,
        pair: &Pair,
        side: OrderSide,
        amount: Decimal,
        credentials: &ExchangeCredentials,
    ) -> Result<Fill, ExchangeError> {
        self.limiter.acquire().await;
        let url = format!("{}/api/1/marketorder", self.base_url);
        let (type_field, amount_field) = match side {
            OrderSide::Buy => ("BUY", "counter_volume"),
            OrderSide::Sell => ("SELL", "base_volume"),
        };
        let form = [
            ("pair", Self::to_venue_symbol(pair)),
            ("type", type_field.to_string()),
            (amount_field, amount.to_string()),
        ];
        let resp = self
            .http
            .post(&url)
            .basic_auth(&credentials.api_key, Some(&credentials.api_secret))
            .form(&form)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport {
                exchange: self.name().into(),
                endpoint: "marketorder".into(),
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
    let executed_quantity = decimal_field(exchange, val, "base")?;
    let executed_value = decimal_field(exchange, val, "counter")?;
    let executed_price = if executed_quantity.is_zero() { Decimal::ZERO } else { executed_value / executed_quantity };
    let fee = decimal_field(exchange, val, "fee_counter").unwrap_or(Decimal::ZERO);
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
    let malformed = || ExchangeError::Malformed {
        exchange: exchange.into(),
        message: "luno candle row missing fields".into(),
    };
    let timestamp_ms = row.get("timestamp").and_then(|v| v.as_i64()).ok_or_else(malformed)?;
    let f = |field: &str| -> Result<f64, ExchangeError> {
        row.get(field).and_then(|v| v.as_str()).and_then(|s| s.parse::<f64>().ok()).ok_or_else(malformed)
    };
    Ok(Candle {
        timestamp_ms,
        open: f("open")?,
        high: f("high")?,
        low: f("low")?,
        close: f("close")?,
        volume: f("volume")?,
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
        let pair = Pair::new("BTC", "USD");
        let venue = LunoAdapter::to_venue_symbol(&pair);
        assert_eq!(venue, "BTC_USD");
        assert_eq!(LunoAdapter::from_venue_symbol(&venue), Some(pair));
    }

    #[test]
    fn duration_covers_every_canonical_interval() {
        for iv in [Interval::M1, Interval::M15, Interval::H1, Interval::H4, Interval::D1, Interval::W1] {
            assert!(LunoAdapter::to_venue_duration_seconds(iv) > 0);
        }
    }

    #[test]
    fn order_fill_parses_price_quantity_value_and_fee() {
        let val = serde_json::json!({
            "order_id": "BXMC2CJ7HNB88U4",
            "base": "0.1",
            "counter": "90000.0",
            "fee_counter": "90.0",
        });
        let fill = parse_order_fill("luno", &val).unwrap();
        assert_eq!(fill.order_id, "BXMC2CJ7HNB88U4");
        assert_eq!(fill.executed_quantity, Decimal::from_str("0.1").unwrap());
        assert_eq!(fill.executed_value, Decimal::from_str("90000.0").unwrap());
        assert_eq!(fill.executed_price, Decimal::from_str("900000.0").unwrap());
        assert_eq!(fill.fee, Decimal::from_str("90.0").unwrap());
    }
}
