//! The 60-second scheduler core driving the entire momentum engine (spec
//! §4.3). A single long-running tick: position monitoring, then per-strategy
//! entry-signal evaluation with asset rotation and bounded parallel fan-out.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::join_all;
use tracing::{error, info, warn};

use super::position_monitor;
use crate::config::{ExchangeConfig, WorkerConfig};
use crate::exchanges::registry;
use crate::execution::OrderExecutor;
use crate::models::credentials::ExchangeCredentials;
use crate::models::market::{Fill, Pair};
use crate::models::position::{Position, PositionStatus, TriggeredSignal};
use crate::models::strategy::{ExitRules, Strategy};
use crate::persistence::Store;
use crate::signals::{indicator_engine, signal_evaluator};

const CANDLES_REQUIRED: u32 = 100;

/// Drives the momentum engine's periodic tick. Holds per-strategy rotation
/// cursors for the lifetime of the worker (spec §4.3 "asset rotation").
pub struct MomentumWorker {
    store: Arc<dyn Store>,
    executor: Arc<OrderExecutor>,
    config: WorkerConfig,
    exchange_configs: HashMap<String, ExchangeConfig>,
    rotation_cursors: DashMap<String, usize>,
    cycle_errors: AtomicU64,
}

impl MomentumWorker {
    pub fn new(
        store: Arc<dyn Store>,
        executor: Arc<OrderExecutor>,
        config: WorkerConfig,
        exchange_configs: HashMap<String, ExchangeConfig>,
    ) -> Self {
        Self {
            store,
            executor,
            config,
            exchange_configs,
            rotation_cursors: DashMap::new(),
            cycle_errors: AtomicU64::new(0),
        }
    }

    pub fn cycle_error_count(&self) -> u64 {
        self.cycle_errors.load(Ordering::Relaxed)
    }

    /// Runs the periodic tick forever. Cancelling the containing task joins
    /// any in-flight strategy processing (spec §5 "Cancellation").
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.tick_interval_secs));
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    /// One full cycle (spec §4.3 steps 1-4). Never panics or aborts on a
    /// single strategy's failure (spec §4.3 "cycle isolation").
    pub async fn tick(&self) {
        let mut strategies = match self.store.list_active_strategies().await {
            Ok(strategies) => strategies,
            Err(err) => {
                error!(error = %err, "failed to load active strategies, skipping cycle");
                return;
            }
        };
        strategies.sort_by(|a, b| (&a.user_id, &a.exchange, &a.id).cmp(&(&b.user_id, &b.exchange, &b.id)));

        let exit_rules_by_strategy: HashMap<String, ExitRules> =
            strategies.iter().map(|s| (s.id.clone(), s.exit_rules.clone())).collect();

        let mut monitored: HashSet<(String, String)> = HashSet::new();

        for strategy in &strategies {
            let credentials = match self.store.get_credentials(&strategy.user_id, &strategy.exchange).await {
                Ok(credentials) => credentials,
                Err(_) => {
                    warn!(strategy_id = %strategy.id, "missing credentials, skipping strategy this cycle");
                    continue;
                }
            };

            let monitor_key = (strategy.user_id.clone(), strategy.exchange.clone());
            if monitored.insert(monitor_key) {
                let closed = position_monitor::close_due_positions(
                    &self.store,
                    &self.executor,
                    &strategy.user_id,
                    &strategy.exchange,
                    &exit_rules_by_strategy,
                    &credentials,
                    self.config.dry_run,
                )
                .await;
                if closed > 0 {
                    info!(user_id = %strategy.user_id, exchange = %strategy.exchange, closed, "closed due positions");
                }
            }

            if let Err(err) = self.process_entries(strategy, &credentials).await {
                error!(strategy_id = %strategy.id, error = %err, "cycle error processing strategy");
                self.cycle_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    async fn process_entries(&self, strategy: &Strategy, credentials: &ExchangeCredentials) -> anyhow::Result<()> {
        let open_count = self.store.list_open_positions_for_strategy(&strategy.id).await?.len() as u32;
        if open_count >= strategy.max_open_positions {
            return Ok(());
        }

        let batch = self.asset_batch(strategy);
        let data_source_exchange = self.config.market_data_source.clone().unwrap_or_else(|| strategy.exchange.clone());
        let Some(data_adapter) = registry::build(&data_source_exchange) else {
            anyhow::bail!("no adapter registered for market-data source {data_source_exchange}");
        };
        let quote = self
            .exchange_configs
            .get(&strategy.exchange)
            .map(|c| c.default_quote.as_str())
            .unwrap_or("USDT");

        let mut eligible: Vec<(String, signal_evaluator::EntryEvaluation)> = Vec::new();
        for chunk in batch.chunks(self.config.parallel_batch_size.max(1)) {
            let evaluations = join_all(chunk.iter().map(|asset| {
                let pair = Pair::new(asset, quote);
                let adapter = data_adapter.as_ref();
                async move {
                    let candles = adapter.fetch_candles(&pair, strategy.timeframe, CANDLES_REQUIRED).await.ok()?;
                    if candles.len() < indicator_engine::MIN_CANDLES {
                        return None;
                    }
                    let results = indicator_engine::compute_all(&candles, &strategy.entry_indicators);
                    let evaluation = signal_evaluator::evaluate_entry(&strategy.entry_indicators, &results, strategy.entry_logic);
                    Some((asset.clone(), evaluation))
                }
            }))
            .await;

            for outcome in evaluations.into_iter().flatten() {
                if outcome.1.should_enter {
                    eligible.push(outcome);
                }
            }
        }

        let executor_adapter = registry::build(&strategy.exchange);
        let Some(trade_adapter) = executor_adapter else {
            anyhow::bail!("no adapter registered for trade exchange {}", strategy.exchange);
        };

        let mut open_count = open_count;
        for (asset, evaluation) in eligible {
            if open_count >= strategy.max_open_positions {
                break;
            }
            let pair = Pair::new(&asset, quote);
            match self
                .open_position(strategy, &asset, &pair, &*trade_adapter, credentials, evaluation.triggered_signals)
                .await
            {
                Ok(()) => open_count += 1,
                Err(err) => warn!(strategy_id = %strategy.id, asset, error = %err, "failed to open position"),
            }
        }

        Ok(())
    }

    async fn open_position(
        &self,
        strategy: &Strategy,
        asset: &str,
        pair: &Pair,
        adapter: &dyn crate::exchanges::ExchangeAdapter,
        credentials: &ExchangeCredentials,
        entry_signals: Vec<TriggeredSignal>,
    ) -> anyhow::Result<()> {
        let Fill { order_id, executed_price, executed_quantity, executed_value, fee } = self
            .executor
            .market_buy(adapter, pair, strategy.max_trade_amount, credentials, self.config.dry_run)
            .await?;

        let position = Position {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: strategy.user_id.clone(),
            strategy_id: strategy.id.clone(),
            exchange: strategy.exchange.clone(),
            asset: asset.to_string(),
            pair: pair.canonical(),
            status: PositionStatus::Open,
            entry_price: executed_price,
            entry_quantity: executed_quantity,
            entry_value: executed_value,
            entry_fee: fee,
            entry_time: chrono::Utc::now(),
            entry_signals,
            entry_order_id: order_id,
            exit_price: None,
            exit_quantity: None,
            exit_fee: None,
            exit_time: None,
            exit_reason: None,
            exit_order_id: None,
            exit_pnl: None,
            exit_pnl_percent: None,
        };

        self.store.insert_position(position).await?;
        Ok(())
    }

    /// Asset rotation (spec §4.3): strategies with more than
    /// `rotation_threshold` assets process a sliding `rotation_window` each
    /// tick, advancing and wrapping.
    fn asset_batch(&self, strategy: &Strategy) -> Vec<String> {
        if strategy.assets.len() <= self.config.rotation_threshold {
            return strategy.assets.clone();
        }

        let window = self.config.rotation_window.min(strategy.assets.len());
        let mut cursor = self.rotation_cursors.entry(strategy.id.clone()).or_insert(0);
        let start = *cursor;

        let batch: Vec<String> = (0..window).map(|i| strategy.assets[(start + i) % strategy.assets.len()].clone()).collect();
        *cursor = (start + window) % strategy.assets.len();
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::market::Interval;
    use crate::models::strategy::{EntryLogic, ExitRules, IndicatorConfig, TakeProfitMode};
    use chrono::Utc;

    fn worker() -> MomentumWorker {
        MomentumWorker::new(
            Arc::new(crate::persistence::InMemoryStore::new()),
            Arc::new(OrderExecutor::new(Arc::new(crate::execution::ExecutionRateLimiter::new()))),
            WorkerConfig {
                tick_interval_secs: 60,
                rotation_threshold: 30,
                rotation_window: 25,
                parallel_batch_size: 5,
                market_data_source: None,
                dry_run: true,
            },
            HashMap::new(),
        )
    }

    fn strategy_with_assets(n: usize) -> Strategy {
        Strategy {
            id: "s1".into(),
            user_id: "u1".into(),
            exchange: "binance".into(),
            name: "rot".into(),
            assets: (0..n).map(|i| format!("A{i}")).collect(),
            entry_indicators: HashMap::from([("rsi".to_string(), IndicatorConfig { enabled: true, params: HashMap::new() })]),
            entry_logic: EntryLogic::Any1,
            exit_rules: ExitRules { take_profit_percent: 3.0, stop_loss_percent: 5.0, max_hold_hours: 24.0, take_profit_mode: TakeProfitMode::Auto },
            timeframe: Interval::H1,
            max_trade_amount: rust_decimal::Decimal::new(100, 0),
            max_open_positions: 1,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn small_asset_list_is_not_rotated() {
        let w = worker();
        let strategy = strategy_with_assets(10);
        assert_eq!(w.asset_batch(&strategy).len(), 10);
    }

    #[test]
    fn large_asset_list_rotates_and_wraps() {
        let w = worker();
        let strategy = strategy_with_assets(40);

        let first = w.asset_batch(&strategy);
        assert_eq!(first.len(), 25);
        assert_eq!(first[0], "A0");

        let second = w.asset_batch(&strategy);
        assert_eq!(second[0], "A25");
        // window of 25 starting at 25 wraps after 15 entries (40-25=15)
        assert_eq!(second[15], "A0");

        let third = w.asset_batch(&strategy);
        assert_eq!(third[0], "A10");
    }
}
