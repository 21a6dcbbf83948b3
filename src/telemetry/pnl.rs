//! Realised P&L tracking over the momentum engine's [`Position`] lifecycle,
//! in the spirit of the teacher's `PnlTracker` over its `PositionManager`
//! but folded over the new `Portfolio`/`Position` models.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::info;

use crate::models::position::{Portfolio, Position};

#[derive(Debug, Clone)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub strategy_id: String,
    pub asset: String,
    pub pnl: Decimal,
    pub pnl_percent: Decimal,
}

/// Per-strategy realised P&L plus an aggregate [`Portfolio`] and a bounded
/// trade log, shared across the momentum worker and the triarb scanner.
pub struct PnlTracker {
    portfolio: RwLock<Portfolio>,
    strategy_pnl: DashMap<String, Decimal>,
    trade_log: RwLock<Vec<TradeRecord>>,
}

impl PnlTracker {
    pub fn new(starting_capital: Decimal) -> Self {
        Self {
            portfolio: RwLock::new(Portfolio::new(starting_capital)),
            strategy_pnl: DashMap::new(),
            trade_log: RwLock::new(Vec::new()),
        }
    }

    /// Folds a just-closed position's realised PnL into the running totals
    /// (spec §3/§8: PnL is net of entry and exit fees).
    pub async fn record_position_close(&self, position: &Position) {
        let (Some(pnl), Some(pnl_percent)) = (position.exit_pnl, position.exit_pnl_percent) else {
            return;
        };

        self.strategy_pnl.entry(position.strategy_id.clone()).and_modify(|v| *v += pnl).or_insert(pnl);
        self.portfolio.write().await.record_close(pnl);

        self.trade_log.write().await.push(TradeRecord {
            timestamp: position.exit_time.unwrap_or_else(Utc::now),
            strategy_id: position.strategy_id.clone(),
            asset: position.asset.clone(),
            pnl,
            pnl_percent,
        });
    }

    pub fn strategy_pnl(&self, strategy_id: &str) -> Decimal {
        self.strategy_pnl.get(strategy_id).map(|v| *v).unwrap_or(Decimal::ZERO)
    }

    pub async fn trade_count(&self) -> usize {
        self.trade_log.read().await.len()
    }

    pub async fn log_summary(&self) {
        let portfolio = self.portfolio.read().await;
        info!(
            capital = %portfolio.capital,
            daily_pnl = %portfolio.daily_pnl,
            total_pnl = %portfolio.total_pnl,
            trades = portfolio.total_trades,
            win_rate_pct = portfolio.win_rate() * 100.0,
            "P&L summary",
        );

        for entry in self.strategy_pnl.iter() {
            info!(strategy_id = %entry.key(), pnl = %entry.value(), "strategy P&L");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::position::PositionStatus;
    use rust_decimal_macros::dec;

    fn closed_position(strategy_id: &str, pnl: Decimal) -> Position {
        Position {
            id: "p1".into(),
            user_id: "u1".into(),
            strategy_id: strategy_id.into(),
            exchange: "binance".into(),
            asset: "BTC".into(),
            pair: "BTCUSDT".into(),
            status: PositionStatus::Closed,
            entry_price: dec!(100),
            entry_quantity: dec!(10),
            entry_value: dec!(1000),
            entry_fee: dec!(1),
            entry_time: Utc::now(),
            entry_signals: vec![],
            entry_order_id: "o1".into(),
            exit_price: Some(dec!(110)),
            exit_quantity: Some(dec!(10)),
            exit_fee: Some(dec!(1)),
            exit_time: Some(Utc::now()),
            exit_reason: Some(crate::models::position::ExitReason::TakeProfit),
            exit_order_id: Some("o2".into()),
            exit_pnl: Some(pnl),
            exit_pnl_percent: Some(dec!(9.8)),
        }
    }

    #[tokio::test]
    async fn accumulates_pnl_per_strategy_and_portfolio() {
        let tracker = PnlTracker::new(dec!(1000));
        tracker.record_position_close(&closed_position("s1", dec!(98))).await;
        tracker.record_position_close(&closed_position("s1", dec!(-20))).await;
        tracker.record_position_close(&closed_position("s2", dec!(5))).await;

        assert_eq!(tracker.strategy_pnl("s1"), dec!(78));
        assert_eq!(tracker.strategy_pnl("s2"), dec!(5));
        assert_eq!(tracker.trade_count().await, 3);
        assert_eq!(tracker.portfolio.read().await.total_trades, 3);
    }
}
