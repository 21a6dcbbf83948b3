//! `POST /strategies` and related payload shapes (spec §6).

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::market::Interval;
use crate::models::strategy::{EntryLogic, ExitRules, IndicatorConfig, Strategy, StrategyValidationError};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStrategyRequest {
    pub user_id: String,
    pub exchange: String,
    pub strategy_name: String,
    pub assets: Vec<String>,
    pub entry_logic: EntryLogic,
    pub timeframe: Option<Interval>,
    pub entry_indicators: HashMap<String, IndicatorConfig>,
    pub exit_rules: ExitRules,
    pub max_trade_amount: Decimal,
    pub max_open_positions: u32,
}

impl CreateStrategyRequest {
    /// Builds a [`Strategy`] from the request, running the same validation
    /// the model itself enforces (spec §6: invalid `maxOpenPositions` or
    /// asset codes are rejected before persistence).
    pub fn into_strategy(self, id: String) -> Result<Strategy, StrategyValidationError> {
        let now = chrono::Utc::now();
        let strategy = Strategy {
            id,
            user_id: self.user_id,
            exchange: self.exchange,
            name: self.strategy_name,
            assets: self.assets,
            entry_indicators: self.entry_indicators,
            entry_logic: self.entry_logic,
            exit_rules: self.exit_rules,
            timeframe: self.timeframe.unwrap_or_default(),
            max_trade_amount: self.max_trade_amount,
            max_open_positions: self.max_open_positions,
            is_active: false,
            created_at: now,
            updated_at: now,
        };
        strategy.validate()?;
        Ok(strategy)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyResponse {
    pub id: String,
    pub user_id: String,
    pub exchange: String,
    pub strategy_name: String,
    pub assets: Vec<String>,
    pub entry_logic: EntryLogic,
    pub timeframe: Interval,
    pub max_trade_amount: Decimal,
    pub max_open_positions: u32,
    pub is_active: bool,
}

impl From<&Strategy> for StrategyResponse {
    fn from(s: &Strategy) -> Self {
        Self {
            id: s.id.clone(),
            user_id: s.user_id.clone(),
            exchange: s.exchange.clone(),
            strategy_name: s.name.clone(),
            assets: s.assets.clone(),
            entry_logic: s.entry_logic,
            timeframe: s.timeframe,
            max_trade_amount: s.max_trade_amount,
            max_open_positions: s.max_open_positions,
            is_active: s.is_active,
        }
    }
}

/// `POST /strategies/:id/toggle` request and conflict error (spec §6, §8
/// boundary scenario 6).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleStrategyRequest {
    pub activate: bool,
}

/// Rejects activation if any asset in `candidate` overlaps with an asset in
/// an already-active strategy on the same exchange (spec §6, §8 boundary
/// scenario 6). Thin wrapper over [`Strategy::conflicts_with`] naming the
/// conflicting asset and strategy the way the `POST /strategies/:id/toggle`
/// response must.
pub fn check_asset_conflict(candidate: &Strategy, other_active: &[Strategy]) -> Result<(), StrategyValidationError> {
    for other in other_active {
        if let Some(asset) = candidate.conflicts_with(other) {
            return Err(StrategyValidationError::AssetConflict { asset, exchange: candidate.exchange.clone(), other_strategy_id: other.id.clone() });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::strategy::TakeProfitMode;

    fn strategy(id: &str, exchange: &str, assets: &[&str]) -> Strategy {
        Strategy {
            id: id.into(),
            user_id: "u1".into(),
            exchange: exchange.into(),
            name: "s".into(),
            assets: assets.iter().map(|a| a.to_string()).collect(),
            entry_indicators: HashMap::new(),
            entry_logic: EntryLogic::Any1,
            exit_rules: ExitRules { take_profit_percent: 3.0, stop_loss_percent: 5.0, max_hold_hours: 24.0, take_profit_mode: TakeProfitMode::Auto },
            timeframe: Interval::H1,
            max_trade_amount: Decimal::new(100, 0),
            max_open_positions: 1,
            is_active: true,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    /// Boundary scenario 6.
    #[test]
    fn asset_conflict_names_asset_and_strategy() {
        let a = strategy("A", "binance", &["BTC"]);
        let b = strategy("B", "binance", &["BTC", "ETH"]);
        let err = check_asset_conflict(&b, std::slice::from_ref(&a)).unwrap_err();
        match err {
            StrategyValidationError::AssetConflict { asset, other_strategy_id, .. } => {
                assert_eq!(asset, "BTC");
                assert_eq!(other_strategy_id, "A");
            }
            other => panic!("expected AssetConflict, got {other:?}"),
        }
    }

    #[test]
    fn disjoint_assets_do_not_conflict() {
        let a = strategy("A", "binance", &["BTC"]);
        let b = strategy("B", "binance", &["ETH"]);
        assert!(check_asset_conflict(&b, std::slice::from_ref(&a)).is_ok());
    }

    #[test]
    fn different_exchange_does_not_conflict() {
        let a = strategy("A", "binance", &["BTC"]);
        let b = strategy("B", "kraken", &["BTC"]);
        assert!(check_asset_conflict(&b, std::slice::from_ref(&a)).is_ok());
    }
}
