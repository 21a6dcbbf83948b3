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

const BASE_URL: &str = "https://api.binance.com";

pub struct BinanceAdapter {
    http: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
}

impl Default for BinanceAdapter {
    fn default() -> Self {
        Self::new(BASE_URL)
    }
}

impl BinanceAdapter {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: build_client(),
            base_url: base_url.to_string(),
            limiter: RateLimiter::new(Duration::from_millis(100)),
        }
    }

    /// Canonical `BTCUSDT` is already Binance's own spelling — no separator.
    pub fn to_venue_symbol(pair: &Pair) -> String {
        pair.canonical()
    }

    pub fn from_venue_symbol(symbol: &str, quote: &str) -> Option<Pair> {
        Pair::from_canonical(symbol, quote)
    }

    pub fn to_venue_interval(interval: Interval) -> &'static str {
        match interval {
            Interval::M1 => "1m",
            Interval::M3 => "3m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::H1 => "1h",
            Interval::H2 => "2h",
            Interval::H4 => "4h",
            Interval::H6 => "6h",
            Interval::H12 => "12h",
            Interval::D1 => "1d",
            Interval::W1 => "1w",
        }
    }

    fn sign(&self, query: &str, secret: &str) -> String {
        hmac_sha256_hex(secret.as_bytes(), query)
    }
}

#[async_trait]
impl ExchangeAdapter for BinanceAdapter {
    fn name(&self) -> &'static str {
        "binance"
    }

    async fn fetch_candles(
        &self,
        pair: &Pair,
        interval: Interval,
        limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        self.limiter.acquire().await;
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            Self::to_venue_symbol(pair),
            Self::to_venue_interval(interval),
            limit
        );
        let resp = self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "klines".into(),
            message: e.to_string(),
        })?;
        if !resp.status().is_success() {
            return Err(ExchangeError::Venue {
                exchange: self.name().into(),
                endpoint: "klines".into(),
                status: resp.status().as_u16(),
                venue_code: None,
                message: resp.text().await.unwrap_or_default(),
            });
        }
        let raw: Vec<Vec<serde_json::Value>> = resp.json().await.map_err(|e| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: e.to_string(),
        })?;
        raw.into_iter().map(|row| parse_kline_row(self.name(), &row)).collect()
    }

    async fn fetch_current_price(&self, pair: &Pair) -> Result<Decimal, ExchangeError> {
        self.limiter.acquire().await;
        let url = format!(
            "{}/api/v3/ticker/price?symbol={}",
            self.base_url,
            Self::to_venue_symbol(pair)
        );
        let resp = self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "ticker/price".into(),
            message: e.to_string(),
        })?;
        let val: serde_json::Value = resp.json().await.map_err(|e| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: e.to_string(),
        })?;
        parse_decimal_field(self.name(), &val, "price")
    }

    async fn fetch_balance(
        &self,
        currency: &str,
        credentials: &ExchangeCredentials,
    ) -> Result<Decimal, ExchangeError> {
        self.limiter.acquire().await;
        let timestamp = chrono::Utc::now().timestamp_millis();
        let query = format!("timestamp={}", timestamp);
        let signature = self.sign(&query, &credentials.api_secret);
        let url = format!(
            "{}/api/v3/account?{}&signature={}",
            self.base_url, query, signature
        );
        let resp = self
            .http
            .get(&url)
            .header("X-MBX-APIKEY", &credentials.api_key)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport {
                exchange: self.name().into(),
                endpoint: "account".into(),
                message: e.to_string(),
            })?;
        let val: serde_json::Value = resp.json().await.map_err(|e| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: e.to_string(),
        })?;
        let balances = val.get("balances").and_then(|b| b.as_array()).ok_or_else(|| {
            ExchangeError::Malformed {
                exchange: self.name().into(),
                message: "missing balances array".into(),
            }
        })?;
        for entry in balances {
            if entry.get("asset").and_then(|a| a.as_str()) == Some(currency) {
                return parse_decimal_field(self.name(), entry, "free");
            }
        }
        Ok(Decimal::ZERO)
    }

    async fn fetch_order_book(&self, pair: &Pair) -> Result<OrderBook, ExchangeError> {
        self.limiter.acquire().await;
        let url = format!(
            "{}/api/v3/depth?symbol={}&limit=20",
            self.base_url,
            Self::to_venue_symbol(pair)
        );
        let resp = self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "depth".into(),
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
        self.submit_market_order(pair, OrderSide::Buy, quote_amount, true, credentials)
            .await
    }

    async fn execute_market_sell(
        &self,
        pair: &Pair,
        base_quantity: Decimal,
        credentials: &ExchangeCredentials,
    ) -> Result<Fill, ExchangeError> {
        self.submit_market_order(pair, OrderSide::Sell, base_quantity, false, credentials)
            .await
    }

    async fn test_connection(&self) -> Result<(), ExchangeError> {
        self.limiter.acquire().await;
        let url = format!("{}/api/v3/ping", self.base_url);
        self.http.get(&url).send().await.map_err(|e| ExchangeError::Transport {
            exchange: self.name().into(),
            endpoint: "ping".into(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}

impl BinanceAdapter {
    async fn submit_market_order(
        &self,
        pair: &Pair,
        side: OrderSide,
        amount: Decimal,
        is_quote_qty: bool,
        credentials: &ExchangeCredentials,
    ) -> Result<Fill, ExchangeError> {
        self.limiter.acquire().await;
        let side_str = match side {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        };
        let amount_field = if is_quote_qty { "quoteOrderQty" } else { "quantity" };
        let timestamp = chrono::Utc::now().timestamp_millis();
        let query = format!(
            "symbol={}&side={}&type=MARKET&{}={}&timestamp={}",
            Self::to_venue_symbol(pair),
            side_str,
            amount_field,
            amount,
            timestamp
        );
        let signature = self.sign(&query, &credentials.api_secret);
        let url = format!("{}/api/v3/order?{}&signature={}", self.base_url, query, signature);
        let resp = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &credentials.api_key)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport {
                exchange: self.name().into(),
                endpoint: "order".into(),
                message: e.to_string(),
            })?;
        if !resp.status().is_success() {
            return Err(ExchangeError::Venue {
                exchange: self.name().into(),
                endpoint: "order".into(),
                status: resp.status().as_u16(),
                venue_code: None,
                message: resp.text().await.unwrap_or_default(),
            });
        }
        let val: serde_json::Value = resp.json().await.map_err(|e| ExchangeError::Malformed {
            exchange: self.name().into(),
            message: e.to_string(),
        })?;
        parse_order_fill(self.name(), &val)
    }
}

fn parse_kline_row(exchange: &str, row: &[serde_json::Value]) -> Result<Candle, ExchangeError> {
    let malformed = || ExchangeError::Malformed {
        exchange: exchange.into(),
        message: "kline row did not match [open_time, o, h, l, c, v, ...]".into(),
    };
    let timestamp_ms = row.first().and_then(|v| v.as_i64()).ok_or_else(malformed)?;
    let f = |i: usize| -> Result<f64, ExchangeError> {
        row.get(i)
            .and_then(|v| v.as_str())
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

fn parse_decimal_field(
    exchange: &str,
    val: &serde_json::Value,
    field: &str,
) -> Result<Decimal, ExchangeError> {
    val.get(field)
        .and_then(|v| v.as_str())
        .and_then(|s| Decimal::from_str(s).ok())
        .ok_or_else(|| ExchangeError::Malformed {
            exchange: exchange.into(),
            message: format!("missing or non-decimal field `{field}`"),
        })
}

/// Both `{bids, asks}` lowercase (Binance's own shape) and `{Bids, Asks}`
/// are accepted here since the same parser is reused by venues whose JSON
/// capitalises field names (spec.md §4.5 "must support both ... shapes").
fn parse_order_book(exchange: &str, val: &serde_json::Value) -> Result<OrderBook, ExchangeError> {
    let side = |names: &[&str]| -> Result<Vec<OrderBookLevel>, ExchangeError> {
        let arr = names
            .iter()
            .find_map(|n| val.get(n))
            .and_then(|v| v.as_array())
            .ok_or_else(|| ExchangeError::Malformed {
                exchange: exchange.into(),
                message: "missing bids/asks array".into(),
            })?;
        arr.iter().map(|lvl| parse_level(exchange, lvl)).collect()
    };
    Ok(OrderBook {
        bids: side(&["bids", "Bids"])?,
        asks: side(&["asks", "Asks"])?,
    })
}

fn parse_level(exchange: &str, lvl: &serde_json::Value) -> Result<OrderBookLevel, ExchangeError> {
    let malformed = || ExchangeError::Malformed {
        exchange: exchange.into(),
        message: "order book level did not match [price, size] or {price, size}".into(),
    };
    if let Some(arr) = lvl.as_array() {
        let price = arr.first().and_then(value_to_decimal).ok_or_else(malformed)?;
        let size = arr.get(1).and_then(value_to_decimal).ok_or_else(malformed)?;
        return Ok(OrderBookLevel { price, size });
    }
    let price = lvl
        .get("price")
        .or_else(|| lvl.get("Price"))
        .and_then(value_to_decimal)
        .ok_or_else(malformed)?;
    let size = lvl
        .get("size")
        .or_else(|| lvl.get("Size"))
        .or_else(|| lvl.get("quantity"))
        .and_then(value_to_decimal)
        .ok_or_else(malformed)?;
    Ok(OrderBookLevel { price, size })
}

fn value_to_decimal(v: &serde_json::Value) -> Option<Decimal> {
    v.as_str()
        .and_then(|s| Decimal::from_str(s).ok())
        .or_else(|| v.as_f64().and_then(Decimal::from_f64_retain))
}

fn parse_order_fill(exchange: &str, val: &serde_json::Value) -> Result<Fill, ExchangeError> {
    let order_id = val
        .get("orderId")
        .map(|v| v.to_string())
        .unwrap_or_default();
    let executed_quantity = parse_decimal_field(exchange, val, "executedQty")?;
    let executed_value = parse_decimal_field(exchange, val, "cummulativeQuoteQty")?;
    let executed_price = if executed_quantity == Decimal::ZERO {
        Decimal::ZERO
    } else {
        executed_value / executed_quantity
    };
    let fee = val
        .get("fills")
        .and_then(|v| v.as_array())
        .map(|fills| {
            fills
                .iter()
                .filter_map(|f| f.get("commission").and_then(value_to_decimal))
                .sum()
        })
        .unwrap_or(Decimal::ZERO);
    Ok(Fill {
        order_id,
        executed_price,
        executed_quantity,
        executed_value,
        fee,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn pair_roundtrip() {
        let pair = Pair::new("BTC", "USDT");
        let venue = BinanceAdapter::to_venue_symbol(&pair);
        assert_eq!(venue, "BTCUSDT");
        let back = BinanceAdapter::from_venue_symbol(&venue, "USDT").unwrap();
        assert_eq!(back, pair);
    }

    #[test]
    fn interval_roundtrip_over_canonical_set() {
        for iv in [
            Interval::M1,
            Interval::M5,
            Interval::M15,
            Interval::M30,
            Interval::H1,
            Interval::H4,
            Interval::D1,
        ] {
            let venue = BinanceAdapter::to_venue_interval(iv);
            assert_eq!(Interval::from_canonical(venue), Some(iv));
        }
    }

    #[test]
    fn candle_normalisation_matches_field_wise() {
        let row: Vec<serde_json::Value> = vec![
            1700000000000i64.into(),
            "100.5".into(),
            "101.0".into(),
            "99.5".into(),
            "100.8".into(),
            "12.3".into(),
        ];
        let candle = parse_kline_row("binance", &row).unwrap();
        assert_eq!(candle.timestamp_ms, 1700000000000);
        assert_eq!(candle.open, 100.5);
        assert_eq!(candle.high, 101.0);
        assert_eq!(candle.low, 99.5);
        assert_eq!(candle.close, 100.8);
        assert_eq!(candle.volume, 12.3);
    }

    #[test]
    fn order_book_accepts_lowercase_and_capitalised_shapes() {
        let lower = serde_json::json!({ "bids": [["100.0", "1.0"]], "asks": [["101.0", "2.0"]] });
        let ob = parse_order_book("binance", &lower).unwrap();
        assert_eq!(ob.bids[0].price, dec!(100.0));

        let upper = serde_json::json!({ "Bids": [{"price": "100.0", "size": "1.0"}], "Asks": [{"price": "101.0", "size": "2.0"}] });
        let ob2 = parse_order_book("binance", &upper).unwrap();
        assert_eq!(ob2.asks[0].size, dec!(2.0));
    }

    #[test]
    fn order_fill_parses_price_quantity_value_and_summed_commission() {
        let resp = serde_json::json!({
            "orderId": 28457,
            "executedQty": "0.5",
            "cummulativeQuoteQty": "25000.0",
            "fills": [
                { "price": "50000.0", "qty": "0.3", "commission": "0.0003", "commissionAsset": "BNB" },
                { "price": "50000.0", "qty": "0.2", "commission": "0.0002", "commissionAsset": "BNB" },
            ],
        });
        let fill = parse_order_fill("binance", &resp).unwrap();
        assert_eq!(fill.order_id, "28457");
        assert_eq!(fill.executed_quantity, dec!(0.5));
        assert_eq!(fill.executed_value, dec!(25000.0));
        assert_eq!(fill.executed_price, dec!(50000.0));
        assert_eq!(fill.fee, dec!(0.0005));
    }
}
