//! TriArbScanner (spec §4.5): sequential order-book fetch across the union
//! of pairs, then profit computation and descending sort.

use std::collections::HashMap;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::warn;

use super::profit::{self, Path, ProfitResult};
use crate::exchanges::ExchangeAdapter;
use crate::models::market::{OrderBook, Pair};

/// Conservative pacing on top of the adapter's own rate limiting — some
/// venues (notably VALR) 429 under parallel order-book fetches (spec §4.5,
/// §5).
const INTER_REQUEST_DELAY: Duration = Duration::from_millis(250);

/// Fetches the union of pairs referenced by `paths` sequentially, computes
/// profit for each path, and returns opportunities at or above
/// `profit_threshold_percent`, sorted descending by `profit_percent`.
pub async fn scan(
    adapter: &dyn ExchangeAdapter,
    paths: &[Path],
    start_amount: Decimal,
    fee_rate: f64,
    profit_threshold_percent: f64,
) -> Vec<ProfitResult> {
    let books = fetch_books(adapter, paths).await;

    let mut opportunities: Vec<ProfitResult> = paths
        .iter()
        .filter_map(|path| profit::compute_profit(path, &books, start_amount, fee_rate))
        .filter(|result| result.profit_percent >= profit_threshold_percent)
        .collect();

    opportunities.sort_by(|a, b| b.profit_percent.partial_cmp(&a.profit_percent).unwrap_or(std::cmp::Ordering::Equal));
    opportunities
}

/// Exposed separately so the pre-flight re-pricing step can reuse the same
/// sequential-fetch discipline without re-running the whole scan.
pub async fn fetch_books(adapter: &dyn ExchangeAdapter, paths: &[Path]) -> HashMap<Pair, OrderBook> {
    let mut unique_pairs: Vec<Pair> = Vec::new();
    for path in paths {
        for step in &path.steps {
            if !unique_pairs.contains(&step.pair) {
                unique_pairs.push(step.pair.clone());
            }
        }
    }

    let mut books = HashMap::new();
    for (i, pair) in unique_pairs.iter().enumerate() {
        match adapter.fetch_order_book(pair).await {
            Ok(book) => {
                books.insert(pair.clone(), book);
            }
            Err(err) => {
                warn!(pair = %pair.canonical(), error = %err, "failed to fetch order book for triarb scan");
            }
        }
        if i + 1 < unique_pairs.len() {
            tokio::time::sleep(INTER_REQUEST_DELAY).await;
        }
    }
    books
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::credentials::ExchangeCredentials;
    use crate::models::market::{Candle, Fill, Interval, OrderBookLevel};
    use crate::models::market::OrderSide;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    struct StubAdapter;

    #[async_trait]
    impl ExchangeAdapter for StubAdapter {
        fn name(&self) -> &'static str {
            "stub"
        }
        async fn fetch_candles(&self, _pair: &Pair, _interval: Interval, _limit: u32) -> Result<Vec<Candle>, crate::exchanges::ExchangeError> {
            unimplemented!()
        }
        async fn fetch_current_price(&self, _pair: &Pair) -> Result<Decimal, crate::exchanges::ExchangeError> {
            unimplemented!()
        }
        async fn fetch_balance(&self, _currency: &str, _credentials: &ExchangeCredentials) -> Result<Decimal, crate::exchanges::ExchangeError> {
            unimplemented!()
        }
        async fn fetch_order_book(&self, _pair: &Pair) -> Result<OrderBook, crate::exchanges::ExchangeError> {
            Ok(OrderBook {
                bids: vec![OrderBookLevel { price: dec!(100), size: dec!(1) }],
                asks: vec![OrderBookLevel { price: dec!(101), size: dec!(1) }],
            })
        }
        async fn execute_market_buy(&self, _pair: &Pair, _quote_amount: Decimal, _credentials: &ExchangeCredentials) -> Result<Fill, crate::exchanges::ExchangeError> {
            unimplemented!()
        }
        async fn execute_market_sell(&self, _pair: &Pair, _base_quantity: Decimal, _credentials: &ExchangeCredentials) -> Result<Fill, crate::exchanges::ExchangeError> {
            unimplemented!()
        }
        async fn test_connection(&self) -> Result<(), crate::exchanges::ExchangeError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn scan_sorts_descending_by_profit() {
        let adapter = StubAdapter;
        let paths = vec![
            Path {
                id: "low".into(),
                sequence: "A->B".into(),
                steps: vec![super::super::profit::PathStep { pair: Pair::new("AAA", "BBB"), side: OrderSide::Sell }],
            },
            Path {
                id: "high".into(),
                sequence: "B->A".into(),
                steps: vec![super::super::profit::PathStep { pair: Pair::new("CCC", "DDD"), side: OrderSide::Buy }],
            },
        ];

        let results = scan(&adapter, &paths, dec!(1000), 0.0, -100.0).await;
        assert_eq!(results.len(), 2);
        assert!(results[0].profit_percent >= results[1].profit_percent);
    }
}
