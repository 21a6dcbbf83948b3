use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::market::{OrderSide, Pair};

/// One leg of a triangular path. `side` is trusted as configured — spec §9's
/// open question warns against re-deriving it from the pair/sequence string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathStep {
    pub pair: Pair,
    pub side: OrderSide,
}

/// A three-leg cycle, e.g. `USDT -> BTC -> ZAR -> USDT` (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangularPath {
    pub id: String,
    pub sequence: String,
    pub steps: Vec<PathStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityStep {
    pub pair: Pair,
    pub input_amount: Decimal,
    pub output_amount: Decimal,
}

/// Transient ranked result of a scan (spec.md §3 `Opportunity`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    pub path_id: String,
    pub sequence: String,
    pub start_amount: Decimal,
    pub end_amount: Decimal,
    pub profit_percent: f64,
    pub steps: Vec<OpportunityStep>,
}
