use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    MaxHoldTime,
    ManualClose,
    ManualRecovery,
}

/// One indicator that fired at entry, with the value it fired on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggeredSignal {
    pub indicator: String,
    pub value: f64,
}

/// Lifecycle `OPEN -> CLOSING -> CLOSED` (spec.md §3/§4.4). The `CLOSING`
/// transition is the at-most-once linearisation point and must be applied
/// by the persistence layer as a conditional update, never read-then-write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub user_id: String,
    pub strategy_id: String,
    pub exchange: String,
    pub asset: String,
    pub pair: String,
    pub status: PositionStatus,

    pub entry_price: Decimal,
    pub entry_quantity: Decimal,
    pub entry_value: Decimal,
    pub entry_fee: Decimal,
    pub entry_time: DateTime<Utc>,
    pub entry_signals: Vec<TriggeredSignal>,
    pub entry_order_id: String,

    pub exit_price: Option<Decimal>,
    pub exit_quantity: Option<Decimal>,
    pub exit_fee: Option<Decimal>,
    pub exit_time: Option<DateTime<Utc>>,
    pub exit_reason: Option<ExitReason>,
    pub exit_order_id: Option<String>,
    pub exit_pnl: Option<Decimal>,
    pub exit_pnl_percent: Option<Decimal>,
}

impl Position {
    /// `(exit_qty * exit_price - exit_fee) - (entry_value + entry_fee)`,
    /// and the percent of that against `entry_value` (spec.md §3, §8
    /// boundary scenario 3).
    pub fn compute_exit_pnl(
        &self,
        exit_quantity: Decimal,
        exit_price: Decimal,
        exit_fee: Decimal,
    ) -> (Decimal, Decimal) {
        let proceeds = exit_quantity * exit_price - exit_fee;
        let cost = self.entry_value + self.entry_fee;
        let pnl = proceeds - cost;
        let pnl_percent = if self.entry_value == Decimal::ZERO {
            Decimal::ZERO
        } else {
            (pnl / self.entry_value) * Decimal::from(100)
        };
        (pnl, pnl_percent)
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }
}

/// Aggregate per-user/exchange accounting, in the spirit of the teacher's
/// `Portfolio` (realised PnL, exposure, win rate) but over the momentum
/// engine's `Position` lifecycle instead of token-payout positions.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Portfolio {
    pub capital: Decimal,
    pub starting_capital: Decimal,
    pub daily_pnl: Decimal,
    pub total_pnl: Decimal,
    pub consecutive_losses: u32,
    pub total_trades: u64,
    pub winning_trades: u64,
}

impl Portfolio {
    pub fn new(capital: Decimal) -> Self {
        Self {
            capital,
            starting_capital: capital,
            ..Default::default()
        }
    }

    pub fn exposure_ratio(&self, total_exposure: Decimal) -> Decimal {
        if self.capital == Decimal::ZERO {
            return Decimal::ZERO;
        }
        total_exposure / self.capital
    }

    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }
        self.winning_trades as f64 / self.total_trades as f64
    }

    /// Folds a closed position's realised PnL into the running totals.
    pub fn record_close(&mut self, pnl: Decimal) {
        self.capital += pnl;
        self.daily_pnl += pnl;
        self.total_pnl += pnl;
        self.total_trades += 1;
        if pnl > Decimal::ZERO {
            self.winning_trades += 1;
            self.consecutive_losses = 0;
        } else {
            self.consecutive_losses += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn open_position() -> Position {
        Position {
            id: "p1".into(),
            user_id: "u1".into(),
            strategy_id: "s1".into(),
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

    #[test]
    fn pnl_net_of_fees_boundary_scenario() {
        let p = open_position();
        let (pnl, pct) = p.compute_exit_pnl(dec!(10), dec!(102), dec!(1.02));
        assert_eq!(pnl, dec!(17.98));
        assert_eq!(pct, dec!(1.798));
    }

    #[test]
    fn portfolio_records_win_and_loss() {
        let mut pf = Portfolio::new(dec!(1000));
        pf.record_close(dec!(50));
        pf.record_close(dec!(-20));
        assert_eq!(pf.total_trades, 2);
        assert_eq!(pf.winning_trades, 1);
        assert_eq!(pf.consecutive_losses, 1);
        assert_eq!(pf.capital, dec!(1030));
    }
}
