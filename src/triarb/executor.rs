//! Sequential three-leg triangular-arb execution (spec §4.5). Each leg is
//! wrapped in a timeout; realised slippage is checked against what the scan
//! expected. No automatic rollback on failure — a partially executed path is
//! recorded and returned as-is.

use std::time::Duration;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::warn;

use super::profit::{Path, PathStep, ProfitResult};
use crate::exchanges::ExchangeAdapter;
use crate::execution::{ExecutionError, OrderExecutor};
use crate::models::credentials::ExchangeCredentials;
use crate::models::market::Fill;

#[derive(Debug, Error)]
pub enum LegError {
    #[error("leg timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
    #[error("slippage {actual_percent:.4}% exceeds max {max_percent:.4}%")]
    SlippageExceeded { actual_percent: f64, max_percent: f64 },
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

#[derive(Debug, Clone)]
pub struct LegResult {
    pub step_index: usize,
    pub expected_amount: Decimal,
    pub fill: Fill,
    pub slippage_percent: f64,
}

#[derive(Debug)]
pub struct ExecutionResult {
    pub path_id: String,
    /// Legs that completed, in order. Shorter than `path.steps.len()` if a
    /// leg failed partway through.
    pub completed_legs: Vec<LegResult>,
    pub failure: Option<LegError>,
}

impl ExecutionResult {
    pub fn fully_completed(&self, total_steps: usize) -> bool {
        self.failure.is_none() && self.completed_legs.len() == total_steps
    }
}

fn slippage_percent(expected: Decimal, actual: Decimal) -> f64 {
    if expected.is_zero() {
        return 0.0;
    }
    ((actual - expected).abs() / expected * Decimal::new(100, 0)).to_f64().unwrap_or(0.0)
}

async fn run_leg(
    executor: &OrderExecutor,
    adapter: &dyn ExchangeAdapter,
    step: &PathStep,
    input_amount: Decimal,
    credentials: &ExchangeCredentials,
    dry_run: bool,
) -> Result<Fill, ExecutionError> {
    use crate::models::market::OrderSide;
    match step.side {
        OrderSide::Buy => executor.market_buy(adapter, &step.pair, input_amount, credentials, dry_run).await,
        OrderSide::Sell => executor.market_sell(adapter, &step.pair, input_amount, credentials, dry_run).await,
    }
}

/// Parameters for a single [`execute`] call.
pub struct ExecutionParams<'a> {
    pub path: &'a Path,
    pub scan_result: &'a ProfitResult,
    pub start_amount: Decimal,
    pub credentials: &'a ExchangeCredentials,
    pub leg_timeout: Duration,
    pub max_slippage_percent: f64,
    pub dry_run: bool,
}

/// Executes `params.path` leg by leg against the single amounts already
/// computed by [`super::profit::compute_profit`]. Stops at the first
/// failure; does not attempt to unwind legs that already executed (spec
/// §4.5: "no automatic rollback").
pub async fn execute(executor: &OrderExecutor, adapter: &dyn ExchangeAdapter, params: ExecutionParams<'_>) -> ExecutionResult {
    let ExecutionParams { path, scan_result, start_amount, credentials, leg_timeout, max_slippage_percent, dry_run } = params;

    let mut completed_legs = Vec::with_capacity(path.steps.len());
    let mut input_amount = start_amount;
    let mut failure = None;

    for (index, step) in path.steps.iter().enumerate() {
        let expected_amount = scan_result.step_amounts.get(index).copied().unwrap_or(input_amount);

        let leg_outcome = tokio::time::timeout(leg_timeout, run_leg(executor, adapter, step, input_amount, credentials, dry_run)).await;

        let fill = match leg_outcome {
            Err(_) => {
                failure = Some(LegError::Timeout { timeout_secs: leg_timeout.as_secs() });
                break;
            }
            Ok(Err(err)) => {
                failure = Some(LegError::Execution(err));
                break;
            }
            Ok(Ok(fill)) => fill,
        };

        let actual_amount = match step.side {
            crate::models::market::OrderSide::Buy => fill.executed_quantity,
            crate::models::market::OrderSide::Sell => fill.executed_value,
        };
        let slippage = slippage_percent(expected_amount, actual_amount);
        if slippage > max_slippage_percent {
            warn!(path_id = %path.id, step_index = index, slippage, max_slippage_percent, "leg slippage exceeded limit");
            completed_legs.push(LegResult { step_index: index, expected_amount, fill, slippage_percent: slippage });
            failure = Some(LegError::SlippageExceeded { actual_percent: slippage, max_percent: max_slippage_percent });
            break;
        }

        input_amount = actual_amount;
        completed_legs.push(LegResult { step_index: index, expected_amount, fill, slippage_percent: slippage });
    }

    ExecutionResult { path_id: path.id.clone(), completed_legs, failure }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchanges::ExchangeError;
    use crate::execution::ExecutionRateLimiter;
    use crate::models::credentials::ExchangeCredentials;
    use crate::models::market::{Candle, Interval, OrderBook, OrderSide, Pair};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    struct StubAdapter {
        sell_multiplier: Decimal,
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
        async fn execute_market_buy(&self, _pair: &Pair, quote_amount: Decimal, _credentials: &ExchangeCredentials) -> Result<Fill, ExchangeError> {
            Ok(Fill {
                order_id: "buy".into(),
                executed_price: dec!(1),
                executed_quantity: quote_amount,
                executed_value: quote_amount,
                fee: Decimal::ZERO,
            })
        }
        async fn execute_market_sell(&self, _pair: &Pair, base_quantity: Decimal, _credentials: &ExchangeCredentials) -> Result<Fill, ExchangeError> {
            Ok(Fill {
                order_id: "sell".into(),
                executed_price: dec!(1),
                executed_quantity: base_quantity,
                executed_value: base_quantity * self.sell_multiplier,
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

    fn path() -> Path {
        Path {
            id: "p1".into(),
            sequence: "A->B".into(),
            steps: vec![
                PathStep { pair: Pair::new("BTC", "USDT"), side: OrderSide::Buy },
                PathStep { pair: Pair::new("BTC", "ZAR"), side: OrderSide::Sell },
            ],
        }
    }

    #[tokio::test]
    async fn all_legs_complete_within_slippage() {
        let adapter = StubAdapter { sell_multiplier: dec!(1) };
        let executor = OrderExecutor::new(Arc::new(ExecutionRateLimiter::new()));
        let scan_result =
            ProfitResult { path_id: "p1".into(), sequence: "A->B".into(), start_amount: dec!(100), end_amount: dec!(100), profit_percent: 0.0, step_amounts: vec![dec!(100), dec!(100)] };

        let p = path();
        let creds = credentials();
        let params = ExecutionParams {
            path: &p,
            scan_result: &scan_result,
            start_amount: dec!(100),
            credentials: &creds,
            leg_timeout: Duration::from_secs(5),
            max_slippage_percent: 0.5,
            dry_run: true,
        };
        let result = execute(&executor, &adapter, params).await;
        assert!(result.failure.is_none());
        assert_eq!(result.completed_legs.len(), 2);
    }

    #[tokio::test]
    async fn excess_slippage_stops_execution_after_offending_leg() {
        // Second leg's actual output is 10% below what the scan expected.
        let adapter = StubAdapter { sell_multiplier: dec!(0.9) };
        let executor = OrderExecutor::new(Arc::new(ExecutionRateLimiter::new()));
        let scan_result =
            ProfitResult { path_id: "p1".into(), sequence: "A->B".into(), start_amount: dec!(100), end_amount: dec!(100), profit_percent: 0.0, step_amounts: vec![dec!(100), dec!(100)] };

        let p = path();
        let creds = credentials();
        let params = ExecutionParams {
            path: &p,
            scan_result: &scan_result,
            start_amount: dec!(100),
            credentials: &creds,
            leg_timeout: Duration::from_secs(5),
            max_slippage_percent: 0.5,
            dry_run: true,
        };
        let result = execute(&executor, &adapter, params).await;
        assert_eq!(result.completed_legs.len(), 2);
        assert!(matches!(result.failure, Some(LegError::SlippageExceeded { .. })));
        assert!(!result.fully_completed(2));
    }
}
