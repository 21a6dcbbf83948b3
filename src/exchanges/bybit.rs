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

const BASE_URL: &str = "https://api.bybit.com";

pub struct BybitAdapter {
    http: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
}

impl Default for BybitAdapter {
    fn default() -> Self {
        Self::new(BASE_URL)
    }
}

impl BybitAdapter {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: build_client(),
            base_url: base_url.to_string(),
            limiter: RateLimiter::new(Duration::from_millis(100)),
        }
    }

    pub fn to_venue_symbol(pair: &Pair) -> String {
        pair.canonical()
    }

    pub fn from_venue_symbol(symbol: &str, quote: &str) -> Option<Pair> {
        Pair::from_canonical(symbol, quote)
    }

    /// Bybit's kline interval is minutes-as-a-number, or `D`/`W` for day/week.
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
            Interval::D1 => "D",
            Interval::W1 => "W",
        }
    }

    fn from_venue_interval(s: &str) -> Option<Interval> {
        match s {
            "1" => Some(Interval::M1),
            "3" => Some(Interval::M3),
            "5" => Some(Interval::M5),
            "15" => Some(Interval::M15),
            "30" => Some(Interval::M30),
            "60" => Some(Interval::H1),
            "120" => Some(Interval::H2),
            "240" => Some(Interval::H4),
            "360" => Some(Interval::H6),
            "720" => Some(Interval::H12),
            "D" => Some(Interval::D1),
            "W" => Some(Interval::W1),
            _ => None,
        }
    }

    fn sign(&self, timestamp: i64, api_key: &str, recv_window: &str, query_or_body: &str, secret: &str) -> String {
        let payload = format!("{timestamp}{api_key}{recv_window}{query_or_body}");
        hmac_sha256_hex(secret.as_bytes(), &payload)
    }
}

#[async_trait]
impl ExchangeAdapter for BybitAdapter {
    fn name(&self) -> &'static str {
        "bybit"
    }

    async fn fetch_candles(
        &self,
        pair: &Pair,
        interval: Interval,
        limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        self.limiter.acquire().await;
        let url = format!(
            "{}/v5/market/kline?category=spot&symbol={}&interval={}&limit={}",
            self.base_url,
            Self::to_venue_symbol(pair),
            Self::to_venue_interval(interval),
            limit
        );
        let resp = self.http.get(&url).send().await.map_err(transport(self.name(), "kline"))?;
        let val: serde_json::Value = resp.json().await.map_err(malformed(self.name()))?;
        let rows = val
            .get("result")
            .and_then(|r| r.get("list"))
            .and_then(|l| l.as_array())
            .ok_or_else(|| ExchangeError::Malformed {
                exchange: self.name().into(),
                message: "missing result.list".into(),
            })?;
        rows.iter()
            .map(|row| {
                let arr = row.as_array().ok_or_else(|| ExchangeError::Malformed {
                    exchange: self.name().into(),
                    message: "kline row not an array".into(),
                })?;
                parse_bybit_row(self.name(), arr)
            })
            .collect()
    }

    async fn fetch_current_price(&self, pair: &Pair) -> Result<Decimal, ExchangeError> {
        self.limiter.acquire().await;
        let url = format!(
            "{}/v5/market/tickers?category=spot&symbol={}",
            self.base_url,
            Self::to_venue_symbol(pair)
        );
        let resp = self.http.get(&url).send().await.map_err(transport(self.name(), "tickers"))?;
        let val: serde_json::Value = resp.json().await.map_err(malformed(self.name()))?;
        let entry = val
            .get("result")
            .and_then(|r| r.get("list"))
            .and_then(|l| l.as_array())
            .and_then(|l| l.first())
            .ok_or_else(|| ExchangeError::Malformed {
                exchange: self.name().into(),
                message: "missing result.list[0]".into(),
            })?;
        decimal_field(self.name(), entry, "lastPrice")
    }

    async fn fetch_balance(
        &self,
        currency: &str,
        credentials: &ExchangeCredentials,
    ) -> Result<Decimal, ExchangeError> {
        self.limiter.acquire().await;
        let timestamp = chrono::Utc::now().timestamp_millis();
        let recv_window = "5000";
        let query = "accountType=UNIFIED";
        let signature = self.sign(timestamp, &credentials.api_key, recv_window, query, &credentials.api_secret);
        let url = format!("{}/v5/account/wallet-balance?{}", self.base_url, query);
        let resp = self
            .http
            .get(&url)
            .header("X-BAPI-API-KEY", &credentials.api_key)
            .header("X-BAPI-TIMESTAMP", timestamp.to_string())
            .header("X-BAPI-RECV-WINDOW", recv_window)
            .header("X-BAPI-SIGN", signature)
            .send()
            .await
            .map_err(transport(self.name(), "wallet-balance"))?;
        let val: serde_json::Value = resp.json().await.map_err(malformed(self.name()))?;
        let coins = val
            .get("result")
            .and_then(|r| r.get("list"))
            .and_then(|l| l.as_array())
            .and_then(|l| l.first())
            .and_then(|a| a.get("coin"))
            .and_then(|c| c.as_array())
            .ok_or_else(|| ExchangeError::Malformed {
                exchange: self.name().into(),
                message: "missing wallet coin list".into(),
            })?;
        for coin in coins {
            if coin.get("coin").and_then(|c| c.as_str()) == Some(currency) {
                return decimal_field(self.name(), coin, "walletBalance");
            }
        }
        Ok(Decimal::ZERO)
    }

    async fn fetch_order_book(&self, pair: &Pair) -> Result<OrderBook, ExchangeError> {
        self.limiter.acquire().await;
        let url = format!(
            "{}/v5/market/orderbook?category=spot&symbol={}&limit=20",
            self.base_url,
            Self::to_venue_symbol(pair)
        );
        let resp = self.http.get(&url).send().await.map_err(transport(self.name(), "orderbook"))?;
        let val: serde_json::Value = resp.json().await.map_err(malformed(self.name()))?;
        let result = val.get("result").ok_or_else(|| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: "missing result".into(),
        })?;
        parse_order_book(self.name(), result, "b", "a")
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
        let url = format!("{}/v5/market/time", self.base_url);
        self.http.get(&url).send().await.map_err(transport(self.name(), "time"))?;
        Ok(())
    }
}

impl BybitAdapter {
    async fn submit_order(
        &self,
        pair: &Pair,
        side: OrderSide,
        amount: Decimal,
        credentials: &ExchangeCredentials,
    ) -> Result<Fill, ExchangeError> {
        self.limiter.acquire().await;
        let timestamp = chrono::Utc::now().timestamp_millis();
        let recv_window = "5000";
        let side_str = match side {
            OrderSide::Buy => "Buy",
            OrderSide::Sell => "Sell",
        };
        let body = serde_json::json!({
            "category": "spot",
            "symbol": Self::to_venue_symbol(pair),
            "side": side_str,
            "orderType": "Market",
            "qty": amount.to_string(),
        })
        .to_string();
        let signature = self.sign(timestamp, &credentials.api_key, recv_window, &body, &credentials.api_secret);
        let url = format!("{}/v5/order/create", self.base_url);
        let resp = self
            .http
            .post(&url)
            .header("X-BAPI-API-KEY", &credentials.api_key)
            .header("X-BAPI-TIMESTAMP", timestamp.to_string())
            .header("X-BAPI-RECV-WINDOW", recv_window)
            .header("X-BAPI-SIGN", signature)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(transport(self.name(), "order/create"))?;
        let val: serde_json::Value = resp.json().await.map_err(malformed(self.name()))?;
        let result = val.get("result").ok_or_else(|| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: "missing result".into(),
        })?;
        parse_order_fill(self.name(), result)
    }
}

fn transport(exchange: &'static str, endpoint: &'static str) -> impl Fn(reqwest::Error) -> ExchangeError {
    move |e| ExchangeError::Transport {
        exchange: exchange.into(),
        endpoint: endpoint.into(),
        message: e.to_string(),
    }
}

fn malformed(exchange: &'static str) -> impl Fn(reqwest::Error) -> ExchangeError {
    move |e| ExchangeError::Malformed {
        exchange: exchange.into(),
        message: e.to_string(),
    }
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

fn parse_order_fill(exchange: &str, result: &serde_json::Value) -> Result<Fill, ExchangeError> {
    let order_id = result.get("orderId").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let executed_quantity = decimal_field(exchange, result, "cumExecQty")?;
    let executed_value = decimal_field(exchange, result, "cumExecValue")?;
    let executed_price = if executed_quantity.is_zero() { Decimal::ZERO } else { executed_value / executed_quantity };
    let fee = decimal_field(exchange, result, "cumExecFee").unwrap_or(Decimal::ZERO);
    Ok(Fill { order_id, executed_price, executed_quantity, executed_value, fee })
}

fn parse_bybit_row(exchange: &str, row: &[serde_json::Value]) -> Result<Candle, ExchangeError> {
    let malformed = || ExchangeError::Malformed {
        exchange: exchange.into(),
        message: "bybit kline row shape mismatch".into(),
    };
    let timestamp_ms = row
        .first()
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(malformed)?;
    let f = |i: usize| -> Result<f64, ExchangeError> {
        row.get(i).and_then(|v| v.as_str()).and_then(|s| s.parse::<f64>().ok()).ok_or_else(malformed)
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

fn parse_order_book(
    exchange: &str,
    val: &serde_json::Value,
    bid_key: &str,
    ask_key: &str,
) -> Result<OrderBook, ExchangeError> {
    let side = |key: &str| -> Result<Vec<OrderBookLevel>, ExchangeError> {
        let arr = val.get(key).and_then(|v| v.as_array()).ok_or_else(|| ExchangeError::Malformed {
            exchange: exchange.into(),
            message: format!("missing `{key}` array"),
        })?;
        arr.iter()
            .map(|lvl| {
                let pair = lvl.as_array().ok_or_else(|| ExchangeError::Malformed {
                    exchange: exchange.into(),
                    message: "book level not a [price, size] pair".into(),
                })?;
                let price = pair
                    .first()
                    .and_then(|v| v.as_str())
                    .and_then(|s| Decimal::from_str(s).ok())
                    .ok_or_else(|| ExchangeError::Malformed {
                        exchange: exchange.into(),
                        message: "bad price".into(),
                    })?;
                let size = pair
                    .get(1)
                    .and_then(|v| v.as_str())
                    .and_then(|s| Decimal::from_str(s).ok())
                    .ok_or_else(|| ExchangeError::Malformed {
                        exchange: exchange.into(),
                        message: "bad size".into(),
                    })?;
                Ok(OrderBookLevel { price, size })
            })
            .collect()
    };
    Ok(OrderBook {
        bids: side(bid_key)?,
        asks: side(ask_key)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_roundtrip() {
        let pair = Pair::new("ETH", "USDT");
        let venue = BybitAdapter::to_venue_symbol(&pair);
        assert_eq!(BybitAdapter::from_venue_symbol(&venue, "USDT"), Some(pair));
    }

    #[test]
    fn interval_roundtrip_over_canonical_set() {
        for iv in [Interval::M1, Interval::M5, Interval::M15, Interval::M30, Interval::H1, Interval::H4, Interval::D1] {
            let venue = BybitAdapter::to_venue_interval(iv);
            assert_eq!(BybitAdapter::from_venue_interval(venue), Some(iv));
        }
    }

    #[test]
    fn candle_row_parses() {
        let row = vec![
            "1700000000000".into(),
            "1.0".into(),
            "1.2".into(),
            "0.9".into(),
            "1.1".into(),
            "500".into(),
        ];
        let c = parse_bybit_row("bybit", &row).unwrap();
        assert_eq!(c.close, 1.1);
    }

    #[test]
    fn order_fill_parses_price_quantity_value_and_fee() {
        let result = serde_json::json!({
            "orderId": "e108b9c2",
            "cumExecQty": "0.5",
            "cumExecValue": "25000.0",
            "cumExecFee": "0.025",
        });
        let fill = parse_order_fill("bybit", &result).unwrap();
        assert_eq!(fill.order_id, "e108b9c2");
        assert_eq!(fill.executed_quantity, Decimal::from_str("0.5").unwrap());
        assert_eq!(fill.executed_value, Decimal::from_str("25000.0").unwrap());
        assert_eq!(fill.executed_price, Decimal::from_str("50000.0").unwrap());
        assert_eq!(fill.fee, Decimal::from_str("0.025").unwrap());
    }
}
