use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::market::Interval;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryLogic {
    Any1,
    TwoOfThree,
    ThreeOfFour,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TakeProfitMode {
    Auto,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorConfig {
    pub enabled: bool,
    pub params: HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitRules {
    pub take_profit_percent: f64,
    pub stop_loss_percent: f64,
    pub max_hold_hours: f64,
    pub take_profit_mode: TakeProfitMode,
}

/// A user-authored rule set (spec §3 `Strategy`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub id: String,
    pub user_id: String,
    pub exchange: String,
    pub name: String,
    pub assets: Vec<String>,
    pub entry_indicators: HashMap<String, IndicatorConfig>,
    pub entry_logic: EntryLogic,
    pub exit_rules: ExitRules,
    pub timeframe: Interval,
    pub max_trade_amount: Decimal,
    pub max_open_positions: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StrategyValidationError {
    #[error("Max open positions must be 1")]
    MaxOpenPositionsNotOne,
    #[error("invalid asset code: {0}")]
    InvalidAssetCode(String),
    #[error("asset {asset} already active on {exchange} in strategy {other_strategy_id}")]
    AssetConflict {
        asset: String,
        exchange: String,
        other_strategy_id: String,
    },
}

static ASSET_CODE_RE_CHARS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// `^[A-Z0-9]{2,10}$` without pulling in the `regex` crate for one pattern.
pub fn is_valid_asset_code(code: &str) -> bool {
    let len = code.chars().count();
    (2..=10).contains(&len) && code.chars().all(|c| ASSET_CODE_RE_CHARS.contains(c))
}

impl Strategy {
    /// Validates the invariants spec.md §6 `POST /strategies` enforces.
    pub fn validate(&self) -> Result<(), StrategyValidationError> {
        if self.max_open_positions != 1 {
            return Err(StrategyValidationError::MaxOpenPositionsNotOne);
        }
        for asset in &self.assets {
            if !is_valid_asset_code(asset) {
                return Err(StrategyValidationError::InvalidAssetCode(asset.clone()));
            }
        }
        Ok(())
    }

    /// Checks this strategy's assets against another **active** strategy's
    /// on the same exchange; used by the toggle-to-active endpoint and by
    /// the persistence layer's activation invariant (spec.md §8 boundary 6).
    pub fn conflicts_with(&self, other: &Strategy) -> Option<String> {
        if self.exchange != other.exchange || !other.is_active || self.id == other.id {
            return None;
        }
        self.assets
            .iter()
            .find(|a| other.assets.contains(a))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Strategy {
        Strategy {
            id: "s1".into(),
            user_id: "u1".into(),
            exchange: "binance".into(),
            name: "test".into(),
            assets: vec!["BTC".into()],
            entry_indicators: HashMap::new(),
            entry_logic: EntryLogic::Any1,
            exit_rules: ExitRules {
                take_profit_percent: 3.0,
                stop_loss_percent: 5.0,
                max_hold_hours: 24.0,
                take_profit_mode: TakeProfitMode::Auto,
            },
            timeframe: Interval::H1,
            max_trade_amount: Decimal::new(100, 0),
            max_open_positions: 1,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn rejects_max_open_positions_above_one() {
        let mut s = base();
        s.max_open_positions = 2;
        assert_eq!(
            s.validate(),
            Err(StrategyValidationError::MaxOpenPositionsNotOne)
        );
    }

    #[test]
    fn rejects_bad_asset_code() {
        let mut s = base();
        s.assets = vec!["btc-usdt!".into()];
        assert!(matches!(
            s.validate(),
            Err(StrategyValidationError::InvalidAssetCode(_))
        ));
    }

    #[test]
    fn asset_code_boundary_lengths() {
        assert!(!is_valid_asset_code("B"));
        assert!(is_valid_asset_code("BT"));
        assert!(is_valid_asset_code("ABCDEFGHIJ"));
        assert!(!is_valid_asset_code("ABCDEFGHIJK"));
    }

    #[test]
    fn asset_conflict_toggle_scenario() {
        let mut a = base();
        a.id = "A".into();
        a.assets = vec!["BTC".into()];
        a.is_active = true;

        let mut b = base();
        b.id = "B".into();
        b.assets = vec!["BTC".into(), "ETH".into()];

        assert_eq!(b.conflicts_with(&a), Some("BTC".to_string()));
    }

    #[test]
    fn no_conflict_on_different_exchange() {
        let mut a = base();
        a.exchange = "okx".into();
        let b = base();
        assert_eq!(b.conflicts_with(&a), None);
    }
}
