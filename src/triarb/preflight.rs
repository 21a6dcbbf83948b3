//! Pre-flight validation (spec §4.6): balance, re-priced profitability,
//! amount limits, confirmation — in that exact order, each either passing
//! or producing a typed, named failure.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;

/// Per-leg fee estimate used for the balance check (spec §4.6: `amount *
/// 0.002 * 3`, three legs at an assumed 0.2% each).
const ESTIMATED_FEE_RATE_PER_LEG: Decimal = dec!(0.002);
const LEG_COUNT: Decimal = dec!(3);
const MINIMUM_TRADE_AMOUNT: Decimal = dec!(10);

#[derive(Debug, Error, PartialEq)]
pub enum PreflightError {
    #[error("insufficient balance: have {balance}, need {required}")]
    InsufficientBalance { balance: Decimal, required: Decimal },
    #[error("profit {current_percent}% below threshold {required_percent}%")]
    ProfitBelowThreshold { current_percent: f64, required_percent: f64 },
    #[error("amount {amount} exceeds max_trade_amount {max}")]
    AmountAboveMax { amount: Decimal, max: Decimal },
    #[error("amount {amount} exceeds portfolio limit {limit}")]
    AmountAboveTradeLimit { amount: Decimal, limit: Decimal },
    #[error("amount {amount} below minimum {minimum}")]
    AmountBelowMin { amount: Decimal, minimum: Decimal },
    #[error("confirmation required for live execution")]
    ConfirmationRequired,
}

impl PreflightError {
    /// Stable code surfaced to the caller (spec §8 boundary scenario 5).
    pub fn code(&self) -> &'static str {
        match self {
            PreflightError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            PreflightError::ProfitBelowThreshold { .. } => "PROFIT_BELOW_THRESHOLD",
            PreflightError::AmountAboveMax { .. } => "AMOUNT_ABOVE_MAX",
            PreflightError::AmountAboveTradeLimit { .. } => "AMOUNT_ABOVE_TRADE_LIMIT",
            PreflightError::AmountBelowMin { .. } => "AMOUNT_BELOW_MIN",
            PreflightError::ConfirmationRequired => "CONFIRMATION_REQUIRED",
        }
    }
}

pub struct PreflightParams {
    pub amount: Decimal,
    pub balance: Decimal,
    pub current_profit_percent: f64,
    pub min_profit_threshold_percent: f64,
    pub max_trade_amount: Option<Decimal>,
    pub portfolio_percent: Option<f64>,
    pub confirmed: bool,
    pub dry_run: bool,
}

/// Runs the four checks in spec order; the first failure short-circuits.
pub fn validate(params: &PreflightParams) -> Result<(), PreflightError> {
    let estimated_fees = params.amount * ESTIMATED_FEE_RATE_PER_LEG * LEG_COUNT;
    let required = params.amount + estimated_fees;
    if params.balance < required {
        return Err(PreflightError::InsufficientBalance { balance: params.balance, required });
    }

    if params.current_profit_percent < params.min_profit_threshold_percent {
        return Err(PreflightError::ProfitBelowThreshold {
            current_percent: params.current_profit_percent,
            required_percent: params.min_profit_threshold_percent,
        });
    }

    if let Some(max) = params.max_trade_amount {
        if params.amount > max {
            return Err(PreflightError::AmountAboveMax { amount: params.amount, max });
        }
    }
    if let Some(pct) = params.portfolio_percent {
        let limit = params.balance * Decimal::from_f64_retain(pct / 100.0).unwrap_or(Decimal::ONE);
        if params.amount > limit {
            return Err(PreflightError::AmountAboveTradeLimit { amount: params.amount, limit });
        }
    }
    if params.amount < MINIMUM_TRADE_AMOUNT {
        return Err(PreflightError::AmountBelowMin { amount: params.amount, minimum: MINIMUM_TRADE_AMOUNT });
    }

    if !params.dry_run && !params.confirmed {
        return Err(PreflightError::ConfirmationRequired);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_params() -> PreflightParams {
        PreflightParams {
            amount: dec!(100),
            balance: dec!(10_000),
            current_profit_percent: 1.0,
            min_profit_threshold_percent: 0.1,
            max_trade_amount: None,
            portfolio_percent: None,
            confirmed: true,
            dry_run: false,
        }
    }

    /// Boundary scenario 5, all three sub-cases.
    #[test]
    fn insufficient_balance() {
        let mut params = base_params();
        params.balance = dec!(50);
        params.amount = dec!(100);
        let err = validate(&params).unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_BALANCE");
    }

    #[test]
    fn amount_below_minimum() {
        let mut params = base_params();
        params.balance = dec!(10_000);
        params.amount = dec!(5);
        let err = validate(&params).unwrap_err();
        assert_eq!(err.code(), "AMOUNT_BELOW_MIN");
    }

    #[test]
    fn confirmation_required_for_live_execution() {
        let mut params = base_params();
        params.confirmed = false;
        params.dry_run = false;
        let err = validate(&params).unwrap_err();
        assert_eq!(err.code(), "CONFIRMATION_REQUIRED");
    }

    #[test]
    fn dry_run_bypasses_confirmation() {
        let mut params = base_params();
        params.confirmed = false;
        params.dry_run = true;
        assert!(validate(&params).is_ok());
    }

    #[test]
    fn checks_run_in_spec_order() {
        // balance AND amount-below-min both fail; balance must win.
        let mut params = base_params();
        params.balance = dec!(1);
        params.amount = dec!(5);
        let err = validate(&params).unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_BALANCE");
    }
}
