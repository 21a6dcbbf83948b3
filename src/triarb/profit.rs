//! Triangular-arb path definitions and profit calculation (spec §4.5).
//! Grounded on the `TriangularArbitrageDetector` forward/reverse-path
//! calculators: fee applied on every leg, buy divides by the ask, sell
//! multiplies by the bid.

use std::collections::HashMap;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::market::{OrderBook, OrderSide, Pair};
pub use crate::models::triangular::{PathStep, TriangularPath as Path};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitResult {
    pub path_id: String,
    pub sequence: String,
    pub start_amount: Decimal,
    pub end_amount: Decimal,
    pub profit_percent: f64,
    /// Amount after each leg, in execution order — used by the executor to
    /// judge per-leg slippage against what the scan expected.
    pub step_amounts: Vec<Decimal>,
}

fn fee_multiplier(fee_rate: f64) -> Decimal {
    Decimal::from_f64_retain(1.0 - fee_rate).unwrap_or(Decimal::ONE)
}

/// Applies one leg: fee on input for a buy (`output_base = input_quote *
/// (1-fee) / ask`), fee on output for a sell (`output_quote = input_base *
/// bid * (1-fee)`).
fn apply_step(amount: Decimal, step: &PathStep, books: &HashMap<Pair, OrderBook>, fee_rate: f64) -> Option<Decimal> {
    let book = books.get(&step.pair)?;
    let fee_mult = fee_multiplier(fee_rate);
    match step.side {
        OrderSide::Buy => {
            let ask = book.best_ask()?.price;
            if ask == Decimal::ZERO {
                return None;
            }
            Some(amount * fee_mult / ask)
        }
        OrderSide::Sell => {
            let bid = book.best_bid()?.price;
            Some(amount * bid * fee_mult)
        }
    }
}

/// Computes end-to-end profit for `path` given a snapshot of order books
/// keyed by pair, or `None` if any leg's book is missing.
pub fn compute_profit(
    path: &Path,
    books: &HashMap<Pair, OrderBook>,
    start_amount: Decimal,
    fee_rate: f64,
) -> Option<ProfitResult> {
    let mut amount = start_amount;
    let mut step_amounts = Vec::with_capacity(path.steps.len());
    for step in &path.steps {
        amount = apply_step(amount, step, books, fee_rate)?;
        step_amounts.push(amount);
    }

    let profit_percent = ((amount - start_amount) / start_amount * Decimal::new(100, 0)).to_f64()?;
    Some(ProfitResult {
        path_id: path.id.clone(),
        sequence: path.sequence.clone(),
        start_amount,
        end_amount: amount,
        profit_percent,
        step_amounts,
    })
}

impl ProfitResult {
    /// Projects the internal computation result onto the spec §3
    /// `Opportunity` shape returned by `POST /triarb/scan`.
    pub fn to_opportunity(&self, path: &Path, start_amount: Decimal) -> crate::models::triangular::Opportunity {
        use crate::models::triangular::OpportunityStep;
        let mut prev = start_amount;
        let steps = path
            .steps
            .iter()
            .zip(&self.step_amounts)
            .map(|(step, &output)| {
                let opportunity_step = OpportunityStep { pair: step.pair.clone(), input_amount: prev, output_amount: output };
                prev = output;
                opportunity_step
            })
            .collect();

        crate::models::triangular::Opportunity {
            path_id: self.path_id.clone(),
            sequence: self.sequence.clone(),
            start_amount: self.start_amount,
            end_amount: self.end_amount,
            profit_percent: self.profit_percent,
            steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::market::OrderBookLevel;
    use rust_decimal_macros::dec;

    fn book(bid: Decimal, ask: Decimal) -> OrderBook {
        OrderBook {
            bids: vec![OrderBookLevel { price: bid, size: Decimal::ONE }],
            asks: vec![OrderBookLevel { price: ask, size: Decimal::ONE }],
        }
    }

    /// Boundary scenario 4: USDT -> BTC -> ZAR -> USDT.
    #[test]
    fn triarb_profit_boundary_scenario() {
        let btc_usdt = Pair::new("BTC", "USDT");
        let btc_zar = Pair::new("BTC", "ZAR");
        let usdt_zar = Pair::new("USDT", "ZAR");

        let mut books = HashMap::new();
        books.insert(btc_usdt.clone(), book(dec!(49990), dec!(50000)));
        books.insert(btc_zar.clone(), book(dec!(900000), dec!(900010)));
        books.insert(usdt_zar.clone(), book(dec!(18), dec!(18.01)));

        let path = Path {
            id: "p1".into(),
            sequence: "USDT->BTC->ZAR->USDT".into(),
            steps: vec![
                PathStep { pair: btc_usdt, side: OrderSide::Buy },
                PathStep { pair: btc_zar, side: OrderSide::Sell },
                PathStep { pair: usdt_zar, side: OrderSide::Buy },
            ],
        };

        let result = compute_profit(&path, &books, dec!(1000), 0.001).unwrap();

        let step1 = dec!(1000) * fee_multiplier(0.001) / dec!(50000);
        let step2 = step1 * dec!(900000) * fee_multiplier(0.001);
        let step3 = step2 * fee_multiplier(0.001) / dec!(18.01);

        assert_eq!(result.step_amounts[0], step1);
        assert_eq!(result.step_amounts[1], step2);
        assert_eq!(result.step_amounts[2], step3);
        assert_eq!(result.end_amount, step3);
    }

    #[test]
    fn missing_book_returns_none() {
        let path = Path {
            id: "p1".into(),
            sequence: "A->B".into(),
            steps: vec![PathStep { pair: Pair::new("BTC", "USDT"), side: OrderSide::Buy }],
        };
        assert!(compute_profit(&path, &HashMap::new(), dec!(1000), 0.001).is_none());
    }
}
