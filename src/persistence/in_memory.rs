use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use super::store::{PersistenceError, Store};
use crate::models::balance::{AssetDeclaration, SyncSource};
use crate::models::credentials::ExchangeCredentials;
use crate::models::position::{ExitReason, Position, PositionStatus};
use crate::models::strategy::Strategy;

/// Reference `Store` implementation: everything lives in `DashMap`s, in the
/// teacher's style of holding hot state in concurrent maps (see
/// `telemetry::pnl::PnlTracker::strategy_pnl`, `telemetry::latency::LatencyTracker::histograms`).
///
/// The `OPEN -> CLOSING` transition still needs a single critical section
/// per position (a `DashMap::entry` closure alone can't express "read, check,
/// conditionally write" atomically across the broader position+strategy
/// relationship we want to keep consistent), so positions are additionally
/// guarded by a coarse `Mutex<()>` held only for the transition itself.
pub struct InMemoryStore {
    strategies: DashMap<String, Strategy>,
    positions: DashMap<String, Position>,
    credentials: DashMap<(String, String), ExchangeCredentials>,
    asset_declarations: DashMap<(String, String, String), AssetDeclaration>,
    close_lock: Mutex<()>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            strategies: DashMap::new(),
            positions: DashMap::new(),
            credentials: DashMap::new(),
            asset_declarations: DashMap::new(),
            close_lock: Mutex::new(()),
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_strategy(&self, strategy: Strategy) -> Result<Strategy, PersistenceError> {
        strategy.validate()?;
        self.strategies.insert(strategy.id.clone(), strategy.clone());
        Ok(strategy)
    }

    async fn update_strategy(&self, strategy: Strategy) -> Result<Strategy, PersistenceError> {
        strategy.validate()?;
        if !self.strategies.contains_key(&strategy.id) {
            return Err(PersistenceError::StrategyNotFound(strategy.id));
        }
        self.strategies.insert(strategy.id.clone(), strategy.clone());
        Ok(strategy)
    }

    async fn get_strategy(&self, id: &str) -> Result<Strategy, PersistenceError> {
        self.strategies
            .get(id)
            .map(|r| r.clone())
            .ok_or_else(|| PersistenceError::StrategyNotFound(id.to_string()))
    }

    async fn list_active_strategies(&self) -> Result<Vec<Strategy>, PersistenceError> {
        let mut out: Vec<Strategy> = self
            .strategies
            .iter()
            .filter(|r| r.is_active)
            .map(|r| r.clone())
            .collect();
        out.sort_by(|a, b| (&a.user_id, &a.exchange, &a.id).cmp(&(&b.user_id, &b.exchange, &b.id)));
        Ok(out)
    }

    async fn toggle_strategy(&self, id: &str, active: bool) -> Result<Strategy, PersistenceError> {
        let mut strategy = self.get_strategy(id).await?;
        if active {
            for other in self.strategies.iter() {
                if let Some(asset) = strategy.conflicts_with(&other) {
                    return Err(PersistenceError::Validation(
                        crate::models::strategy::StrategyValidationError::AssetConflict {
                            asset,
                            exchange: strategy.exchange.clone(),
                            other_strategy_id: other.id.clone(),
                        },
                    ));
                }
            }
        }
        strategy.is_active = active;
        strategy.updated_at = Utc::now();
        self.strategies.insert(strategy.id.clone(), strategy.clone());
        Ok(strategy)
    }

    async fn insert_position(&self, position: Position) -> Result<Position, PersistenceError> {
        self.positions.insert(position.id.clone(), position.clone());
        Ok(position)
    }

    async fn get_position(&self, id: &str) -> Result<Position, PersistenceError> {
        self.positions
            .get(id)
            .map(|r| r.clone())
            .ok_or_else(|| PersistenceError::PositionNotFound(id.to_string()))
    }

    async fn list_open_positions(&self, user_id: &str, exchange: &str) -> Result<Vec<Position>, PersistenceError> {
        Ok(self
            .positions
            .iter()
            .filter(|r| r.user_id == user_id && r.exchange == exchange && r.is_open())
            .map(|r| r.clone())
            .collect())
    }

    async fn list_open_positions_for_strategy(&self, strategy_id: &str) -> Result<Vec<Position>, PersistenceError> {
        Ok(self
            .positions
            .iter()
            .filter(|r| r.strategy_id == strategy_id && r.status != PositionStatus::Closed)
            .map(|r| r.clone())
            .collect())
    }

    async fn mark_closing(&self, id: &str) -> Result<Position, PersistenceError> {
        let _guard = self.close_lock.lock().await;
        let mut entry = self
            .positions
            .get_mut(id)
            .ok_or_else(|| PersistenceError::PositionNotFound(id.to_string()))?;
        if entry.status != PositionStatus::Open {
            return Err(PersistenceError::AlreadyClosing(id.to_string()));
        }
        entry.status = PositionStatus::Closing;
        Ok(entry.clone())
    }

    async fn finalize_close(
        &self,
        id: &str,
        exit_price: Decimal,
        exit_quantity: Decimal,
        exit_fee: Decimal,
        exit_order_id: String,
        exit_reason: ExitReason,
    ) -> Result<Position, PersistenceError> {
        let mut entry = self
            .positions
            .get_mut(id)
            .ok_or_else(|| PersistenceError::PositionNotFound(id.to_string()))?;
        let (pnl, pnl_percent) = entry.compute_exit_pnl(exit_quantity, exit_price, exit_fee);
        entry.status = PositionStatus::Closed;
        entry.exit_price = Some(exit_price);
        entry.exit_quantity = Some(exit_quantity);
        entry.exit_fee = Some(exit_fee);
        entry.exit_time = Some(Utc::now());
        entry.exit_reason = Some(exit_reason);
        entry.exit_order_id = Some(exit_order_id);
        entry.exit_pnl = Some(pnl);
        entry.exit_pnl_percent = Some(pnl_percent);
        Ok(entry.clone())
    }

    async fn get_credentials(&self, user_id: &str, exchange: &str) -> Result<ExchangeCredentials, PersistenceError> {
        self.credentials
            .get(&(user_id.to_string(), exchange.to_string()))
            .map(|r| r.clone())
            .ok_or_else(|| PersistenceError::CredentialsNotFound {
                user_id: user_id.to_string(),
                exchange: exchange.to_string(),
            })
    }

    async fn put_credentials(
        &self,
        user_id: &str,
        exchange: &str,
        credentials: ExchangeCredentials,
    ) -> Result<(), PersistenceError> {
        self.credentials.insert((user_id.to_string(), exchange.to_string()), credentials);
        Ok(())
    }

    async fn upsert_asset_declaration(
        &self,
        user_id: &str,
        exchange: &str,
        asset: &str,
        available: Decimal,
        sync_source: SyncSource,
    ) -> Result<AssetDeclaration, PersistenceError> {
        let key = (user_id.to_string(), exchange.to_string(), asset.to_string());
        let mut entry = self.asset_declarations.entry(key).or_insert_with(|| AssetDeclaration {
            user_id: user_id.to_string(),
            exchange: exchange.to_string(),
            asset: asset.to_string(),
            available,
            locked: Decimal::ZERO,
            initial_balance: available,
            last_synced_at: Utc::now(),
            sync_source,
        });
        entry.available = available;
        entry.last_synced_at = Utc::now();
        entry.sync_source = sync_source;
        Ok(entry.clone())
    }

    async fn get_asset_declaration(
        &self,
        user_id: &str,
        exchange: &str,
        asset: &str,
    ) -> Result<AssetDeclaration, PersistenceError> {
        self.asset_declarations
            .get(&(user_id.to_string(), exchange.to_string(), asset.to_string()))
            .map(|r| r.clone())
            .ok_or_else(|| PersistenceError::AssetDeclarationNotFound {
                user_id: user_id.to_string(),
                exchange: exchange.to_string(),
                asset: asset.to_string(),
            })
    }

    async fn lock_balance(
        &self,
        user_id: &str,
        exchange: &str,
        asset: &str,
        amount: Decimal,
    ) -> Result<AssetDeclaration, PersistenceError> {
        let mut entry = self
            .asset_declarations
            .get_mut(&(user_id.to_string(), exchange.to_string(), asset.to_string()))
            .ok_or_else(|| PersistenceError::AssetDeclarationNotFound {
                user_id: user_id.to_string(),
                exchange: exchange.to_string(),
                asset: asset.to_string(),
            })?;
        entry.lock(amount)?;
        Ok(entry.clone())
    }

    async fn unlock_balance(
        &self,
        user_id: &str,
        exchange: &str,
        asset: &str,
        amount: Decimal,
    ) -> Result<AssetDeclaration, PersistenceError> {
        let mut entry = self
            .asset_declarations
            .get_mut(&(user_id.to_string(), exchange.to_string(), asset.to_string()))
            .ok_or_else(|| PersistenceError::AssetDeclarationNotFound {
                user_id: user_id.to_string(),
                exchange: exchange.to_string(),
                asset: asset.to_string(),
            })?;
        entry.unlock(amount)?;
        Ok(entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::market::Interval;
    use crate::models::strategy::{EntryLogic, ExitRules, TakeProfitMode};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn strategy(id: &str, exchange: &str, assets: Vec<&str>, active: bool) -> Strategy {
        Strategy {
            id: id.into(),
            user_id: "u1".into(),
            exchange: exchange.into(),
            name: "test".into(),
            assets: assets.into_iter().map(String::from).collect(),
            entry_indicators: HashMap::new(),
            entry_logic: EntryLogic::Any1,
            exit_rules: ExitRules {
                take_profit_percent: 3.0,
                stop_loss_percent: 5.0,
                max_hold_hours: 24.0,
                take_profit_mode: TakeProfitMode::Auto,
            },
            timeframe: Interval::H1,
            max_trade_amount: dec!(100),
            max_open_positions: 1,
            is_active: active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn position(id: &str, strategy_id: &str) -> Position {
        Position {
            id: id.into(),
            user_id: "u1".into(),
            strategy_id: strategy_id.into(),
            exchange: "binance".into(),
            asset: "BTC".into(),
            pair: "BTCUSDT".into(),
            status: PositionStatus::Open,
            entry_price: dec!(100),
            entry_quantity: dec!(10),
            entry_value: dec!(1000),
            entry_fee: dec!(1),
            entry_time: Utc::now(),
            entry_signals: vec![],
            entry_order_id: "o1".into(),
            exit_price: None,
            exit_quantity: None,
            exit_fee: None,
            exit_time: None,
            exit_reason: None,
            exit_order_id: None,
            exit_pnl: None,
            exit_pnl_percent: None,
        }
    }

    #[tokio::test]
    async fn toggle_to_active_rejects_asset_conflict() {
        let store = InMemoryStore::new();
        store.insert_strategy(strategy("A", "binance", vec!["BTC"], true)).await.unwrap();
        store.insert_strategy(strategy("B", "binance", vec!["BTC", "ETH"], false)).await.unwrap();

        let err = store.toggle_strategy("B", true).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Validation(_)));
    }

    #[tokio::test]
    async fn concurrent_mark_closing_only_one_wins() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_position(position("p1", "s1")).await.unwrap();

        let a = store.clone();
        let b = store.clone();
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { a.mark_closing("p1").await }),
            tokio::spawn(async move { b.mark_closing("p1").await })
        );
        let results = [r1.unwrap(), r2.unwrap()];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let already_closing = results
            .iter()
            .filter(|r| matches!(r, Err(PersistenceError::AlreadyClosing(_))))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(already_closing, 1);
    }

    #[tokio::test]
    async fn finalize_close_computes_pnl() {
        let store = InMemoryStore::new();
        store.insert_position(position("p1", "s1")).await.unwrap();
        store.mark_closing("p1").await.unwrap();
        let closed = store
            .finalize_close("p1", dec!(102), dec!(10), dec!(1.02), "o2".into(), ExitReason::TakeProfit)
            .await
            .unwrap();
        assert_eq!(closed.exit_pnl, Some(dec!(17.98)));
        assert_eq!(closed.status, PositionStatus::Closed);
    }

    #[tokio::test]
    async fn lock_then_unlock_roundtrips_total() {
        let store = InMemoryStore::new();
        store
            .upsert_asset_declaration("u1", "binance", "USDT", dec!(100), SyncSource::Api)
            .await
            .unwrap();
        let locked = store.lock_balance("u1", "binance", "USDT", dec!(40)).await.unwrap();
        assert_eq!(locked.total(), dec!(100));
        let unlocked = store.unlock_balance("u1", "binance", "USDT", dec!(40)).await.unwrap();
        assert_eq!(unlocked.available, dec!(100));
    }
}
