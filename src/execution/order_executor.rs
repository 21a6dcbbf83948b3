//! Dispatches market orders to a venue adapter, gated by the process-wide
//! [`ExecutionRateLimiter`] (spec §4.4, §4.6).

use std::future::Future;
use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;

use super::rate_limiter::{ExecutionRateLimiter, RateLimitDecision};
use crate::exchanges::{ExchangeAdapter, ExchangeError};
use crate::models::credentials::ExchangeCredentials;
use crate::models::market::{Fill, Pair};

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("{exchange}: busy, retry after {retry_after_ms}ms")]
    Busy { exchange: String, retry_after_ms: u64 },
    #[error("{exchange}: cooling down, retry after {retry_after_ms}ms")]
    Cooldown { exchange: String, retry_after_ms: u64 },
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

/// Thin dispatcher over `ExchangeAdapter::execute_market_{buy,sell}`; every
/// live call is wrapped by the rate limiter, every dry-run call bypasses it
/// entirely (spec §4.6: "dry runs bypass the limiter").
pub struct OrderExecutor {
    rate_limiter: Arc<ExecutionRateLimiter>,
}

impl OrderExecutor {
    pub fn new(rate_limiter: Arc<ExecutionRateLimiter>) -> Self {
        Self { rate_limiter }
    }

    pub async fn market_buy(
        &self,
        adapter: &dyn ExchangeAdapter,
        pair: &Pair,
        quote_amount: Decimal,
        credentials: &ExchangeCredentials,
        dry_run: bool,
    ) -> Result<Fill, ExecutionError> {
        self.guarded(adapter.name(), dry_run, adapter.execute_market_buy(pair, quote_amount, credentials)).await
    }

    pub async fn market_sell(
        &self,
        adapter: &dyn ExchangeAdapter,
        pair: &Pair,
        base_quantity: Decimal,
        credentials: &ExchangeCredentials,
        dry_run: bool,
    ) -> Result<Fill, ExecutionError> {
        self.guarded(adapter.name(), dry_run, adapter.execute_market_sell(pair, base_quantity, credentials)).await
    }

    async fn guarded<Fut>(&self, exchange: &str, dry_run: bool, call: Fut) -> Result<Fill, ExecutionError>
    where
        Fut: Future<Output = Result<Fill, ExchangeError>>,
    {
        if !dry_run {
            match self.rate_limiter.check(exchange).await {
                RateLimitDecision::Busy { retry_after_ms } => {
                    return Err(ExecutionError::Busy { exchange: exchange.to_string(), retry_after_ms })
                }
                RateLimitDecision::Cooldown { retry_after_ms } => {
                    return Err(ExecutionError::Cooldown { exchange: exchange.to_string(), retry_after_ms })
                }
                RateLimitDecision::Proceed => {}
            }
            self.rate_limiter.begin(exchange).await;
        }

        let result = call.await;

        if !dry_run {
            self.rate_limiter.end(exchange).await;
        }
        Ok(result?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::market::{Candle, Interval, OrderBook};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubAdapter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ExchangeAdapter for StubAdapter {
        fn name(&self) -> &'static str {
            "stub"
        }
        async fn fetch_candles(&self, _pair: &Pair, _interval: Interval, _limit: u32) -> Result<Vec<Candle>, ExchangeError> {
            unimplemented!()
        }
        async fn fetch_current_price(&self, _pair: &Pair) -> Result<Decimal, ExchangeError> {
            unimplemented!()
        }
        async fn fetch_balance(&self, _currency: &str, _credentials: &ExchangeCredentials) -> Result<Decimal, ExchangeError> {
            unimplemented!()
        }
        async fn fetch_order_book(&self, _pair: &Pair) -> Result<OrderBook, ExchangeError> {
            unimplemented!()
        }
        async fn execute_market_buy(
            &self,
            _pair: &Pair,
            quote_amount: Decimal,
            _credentials: &ExchangeCredentials,
        ) -> Result<Fill, ExchangeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Fill {
                order_id: "1".into(),
                executed_price: Decimal::new(100, 0),
                executed_quantity: quote_amount / Decimal::new(100, 0),
                executed_value: quote_amount,
                fee: Decimal::ZERO,
            })
        }
        async fn execute_market_sell(
            &self,
            _pair: &Pair,
            base_quantity: Decimal,
            _credentials: &ExchangeCredentials,
        ) -> Result<Fill, ExchangeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Fill {
                order_id: "2".into(),
                executed_price: Decimal::new(100, 0),
                executed_quantity: base_quantity,
                executed_value: base_quantity * Decimal::new(100, 0),
                fee: Decimal::ZERO,
            })
        }
        async fn test_connection(&self) -> Result<(), ExchangeError> {
            Ok(())
        }
    }

    fn credentials() -> ExchangeCredentials {
        ExchangeCredentials { api_key: "k".into(), api_secret: "s".into(), passphrase: None, memo: None }
    }

    #[tokio::test]
    async fn second_live_call_hits_cooldown() {
        let limiter = Arc::new(ExecutionRateLimiter::new());
        let executor = OrderExecutor::new(limiter);
        let adapter = StubAdapter { calls: AtomicUsize::new(0) };
        let pair = Pair::new("BTC", "USDT");
        let creds = credentials();

        let first = executor.market_buy(&adapter, &pair, Decimal::new(100, 0), &creds, false).await;
        assert!(first.is_ok());

        let second = executor.market_buy(&adapter, &pair, Decimal::new(100, 0), &creds, false).await;
        assert!(matches!(second, Err(ExecutionError::Cooldown { .. })));
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dry_run_bypasses_limiter() {
        let limiter = Arc::new(ExecutionRateLimiter::new());
        let executor = OrderExecutor::new(limiter);
        let adapter = StubAdapter { calls: AtomicUsize::new(0) };
        let pair = Pair::new("BTC", "USDT");
        let creds = credentials();

        for _ in 0..3 {
            let result = executor.market_buy(&adapter, &pair, Decimal::new(100, 0), &creds, true).await;
            assert!(result.is_ok());
        }
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 3);
    }
}
