//! Position endpoint payload shapes (spec §6): list/open/close/force-close.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::position::{ExitReason, Position, PositionStatus, TriggeredSignal};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionResponse {
    pub id: String,
    pub user_id: String,
    pub strategy_id: String,
    pub exchange: String,
    pub asset: String,
    pub status: PositionStatus,
    pub entry_price: Decimal,
    pub entry_quantity: Decimal,
    pub entry_time: DateTime<Utc>,
    pub entry_signals: Vec<TriggeredSignal>,
    pub exit_price: Option<Decimal>,
    pub exit_time: Option<DateTime<Utc>>,
    pub exit_reason: Option<ExitReason>,
    pub exit_pnl: Option<Decimal>,
    pub exit_pnl_percent: Option<Decimal>,
}

impl From<&Position> for PositionResponse {
    fn from(p: &Position) -> Self {
        Self {
            id: p.id.clone(),
            user_id: p.user_id.clone(),
            strategy_id: p.strategy_id.clone(),
            exchange: p.exchange.clone(),
            asset: p.asset.clone(),
            status: p.status,
            entry_price: p.entry_price,
            entry_quantity: p.entry_quantity,
            entry_time: p.entry_time,
            entry_signals: p.entry_signals.clone(),
            exit_price: p.exit_price,
            exit_time: p.exit_time,
            exit_reason: p.exit_reason,
            exit_pnl: p.exit_pnl,
            exit_pnl_percent: p.exit_pnl_percent,
        }
    }
}

/// `GET /positions?userId&exchange` response shape (spec §6: "returns
/// `{open, closed}`").
#[derive(Debug, Clone, Serialize)]
pub struct PositionListResponse {
    pub open: Vec<PositionResponse>,
    pub closed: Vec<PositionResponse>,
}

impl PositionListResponse {
    pub fn from_positions(positions: &[Position]) -> Self {
        let (open, closed): (Vec<_>, Vec<_>) = positions.iter().partition(|p| p.status != PositionStatus::Closed);
        Self { open: open.into_iter().map(PositionResponse::from).collect(), closed: closed.into_iter().map(PositionResponse::from).collect() }
    }
}

/// `GET /positions?userId&exchange` query parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPositionsQuery {
    pub user_id: String,
    pub exchange: String,
}

/// `PUT /positions/:id/force-close` request: operator-supplied exit fields
/// for manual recovery, bypassing the normal sell-then-finalise protocol
/// (spec §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceClosePositionRequest {
    pub exit_price: Decimal,
    pub exit_quantity: Decimal,
    pub exit_fee: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(status: PositionStatus) -> Position {
        Position {
            id: "p1".into(),
            user_id: "u1".into(),
            strategy_id: "s1".into(),
            exchange: "binance".into(),
            asset: "BTC".into(),
            pair: "BTCUSDT".into(),
            status,
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
    fn partitions_open_and_closed() {
        let positions = vec![position(PositionStatus::Open), position(PositionStatus::Closing), position(PositionStatus::Closed)];
        let response = PositionListResponse::from_positions(&positions);
        assert_eq!(response.open.len(), 2);
        assert_eq!(response.closed.len(), 1);
    }
}
