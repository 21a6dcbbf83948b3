//! `POST /triarb/scan` and `POST /triarb/execute` payload shapes (spec §6).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::credentials::ExchangeCredentials;
use crate::models::triangular::Opportunity;
use crate::triarb::executor::ExecutionResult;
use crate::triarb::preflight::PreflightError;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub exchange: String,
    pub credentials: ExchangeCredentials,
    /// Path ids to restrict the scan to; `None` scans every configured path.
    pub paths: Option<Vec<String>>,
    pub amount: Option<Decimal>,
    pub profit_threshold: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanResponse {
    pub opportunities: Vec<Opportunity>,
    pub debug: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub exchange: String,
    pub path_id: String,
    pub amount: Decimal,
    pub credentials: ExchangeCredentials,
    pub dry_run: bool,
    pub confirmed: bool,
    pub min_profit_threshold: f64,
    pub max_trade_amount: Option<Decimal>,
    pub portfolio_percent: Option<f64>,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecuteResponse {
    pub path_id: String,
    pub completed_legs: usize,
    pub failure: Option<String>,
}

impl From<&ExecutionResult> for ExecuteResponse {
    fn from(result: &ExecutionResult) -> Self {
        Self { path_id: result.path_id.clone(), completed_legs: result.completed_legs.len(), failure: result.failure.as_ref().map(|e| e.to_string()) }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreflightRejection {
    pub code: &'static str,
    pub message: String,
}

impl From<&PreflightError> for PreflightRejection {
    fn from(err: &PreflightError) -> Self {
        Self { code: err.code(), message: err.to_string() }
    }
}
