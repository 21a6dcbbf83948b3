use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::credentials::ExchangeCredentials;
use crate::models::market::{Candle, Fill, Interval, OrderBook, Pair};

/// Typed error surface for any venue call (spec.md §4.1 "Error surface").
/// Never silently coerced — every non-2xx response or transport failure
/// becomes one of these.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("{exchange}: transport error calling {endpoint}: {message}")]
    Transport {
        exchange: String,
        endpoint: String,
        message: String,
    },
    #[error("{exchange}: HTTP {status} from {endpoint}: {message}")]
    Venue {
        exchange: String,
        endpoint: String,
        status: u16,
        venue_code: Option<String>,
        message: String,
    },
    #[error("{exchange}: rate limited")]
    RateLimited { exchange: String },
    #[error("{exchange}: unsupported pair {pair}")]
    UnsupportedPair { exchange: String, pair: String },
    #[error("{exchange}: response did not match expected shape: {message}")]
    Malformed { exchange: String, message: String },
}

/// Uniform access to a single spot exchange (spec.md §4.1). Implementations
/// own their own symbol/interval tables and signing scheme as pure data
/// plus one signing function; this is the *only* place signing logic
/// exists (spec.md §4.1, §9).
///
/// Credentials are passed as parameters, never stored on the adapter —
/// the adapter itself only ever owns rate-limiter state and venue config.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_candles(
        &self,
        pair: &Pair,
        interval: Interval,
        limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError>;

    async fn fetch_current_price(&self, pair: &Pair) -> Result<Decimal, ExchangeError>;

    async fn fetch_balance(
        &self,
        currency: &str,
        credentials: &ExchangeCredentials,
    ) -> Result<Decimal, ExchangeError>;

    async fn fetch_order_book(&self, pair: &Pair) -> Result<OrderBook, ExchangeError>;

    async fn execute_market_buy(
        &self,
        pair: &Pair,
        quote_amount: Decimal,
        credentials: &ExchangeCredentials,
    ) -> Result<Fill, ExchangeError>;

    async fn execute_market_sell(
        &self,
        pair: &Pair,
        base_quantity: Decimal,
        credentials: &ExchangeCredentials,
    ) -> Result<Fill, ExchangeError>;

    async fn test_connection(&self) -> Result<(), ExchangeError>;
}
