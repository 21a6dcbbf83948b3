//! Combines indicator triggers into an entry decision per `entry_logic`, and
//! evaluates exit conditions against a live position (spec §4.2).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::indicator_engine::IndicatorResult;
use crate::models::position::{ExitReason, TriggeredSignal};
use crate::models::strategy::{EntryLogic, ExitRules, IndicatorConfig, TakeProfitMode};

#[derive(Debug, Clone)]
pub struct EntryEvaluation {
    pub should_enter: bool,
    pub enabled: usize,
    pub triggered: usize,
    pub triggered_signals: Vec<TriggeredSignal>,
}

/// `any_1` / `2_of_3` / `3_of_4` / `all` per spec §4.2's combinatorial table.
fn entry_logic_satisfied(enabled: usize, triggered: usize, logic: EntryLogic) -> bool {
    match logic {
        EntryLogic::Any1 => triggered >= 1,
        EntryLogic::TwoOfThree => match enabled {
            0 => false,
            1 => triggered >= 1,
            _ => triggered >= 2,
        },
        EntryLogic::ThreeOfFour => match enabled {
            0 => false,
            n if n >= 4 => triggered >= 3,
            n => triggered == n,
        },
        EntryLogic::All => enabled > 0 && triggered == enabled,
    }
}

/// Combines the strategy's enabled indicators against their computed
/// results for this tick and decides whether to enter a position.
pub fn evaluate_entry(
    entry_indicators: &HashMap<String, IndicatorConfig>,
    results: &HashMap<String, IndicatorResult>,
    logic: EntryLogic,
) -> EntryEvaluation {
    let enabled = entry_indicators.values().filter(|cfg| cfg.enabled).count();

    let mut triggered_signals = Vec::new();
    for (name, cfg) in entry_indicators {
        if !cfg.enabled {
            continue;
        }
        if let Some(result) = results.get(name) {
            if result.triggered {
                triggered_signals.push(TriggeredSignal { indicator: name.clone(), value: result.value });
            }
        }
    }
    triggered_signals.sort_by(|a, b| a.indicator.cmp(&b.indicator));

    let triggered = triggered_signals.len();
    let should_enter = entry_logic_satisfied(enabled, triggered, logic);
    EntryEvaluation { should_enter, enabled, triggered, triggered_signals }
}

/// Time- and price-based exit evaluation only; indicator-driven exits remain
/// a documented TODO (spec §4.2). Fires in priority order: take_profit,
/// stop_loss, max_hold_time.
pub fn evaluate_exit(
    exit_rules: &ExitRules,
    entry_price: Decimal,
    current_price: Decimal,
    entry_time: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<ExitReason> {
    let entry_f = entry_price.to_f64().unwrap_or(0.0);
    if entry_f == 0.0 {
        return None;
    }
    let current_f = current_price.to_f64().unwrap_or(entry_f);
    let pnl_percent = (current_f - entry_f) / entry_f * 100.0;
    let hours_open = (now - entry_time).num_seconds() as f64 / 3600.0;

    if exit_rules.take_profit_mode == TakeProfitMode::Auto && pnl_percent >= exit_rules.take_profit_percent {
        return Some(ExitReason::TakeProfit);
    }
    if pnl_percent <= -exit_rules.stop_loss_percent {
        return Some(ExitReason::StopLoss);
    }
    if hours_open >= exit_rules.max_hold_hours {
        return Some(ExitReason::MaxHoldTime);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn config(enabled: bool) -> IndicatorConfig {
        IndicatorConfig { enabled, params: HashMap::new() }
    }

    fn result(triggered: bool) -> IndicatorResult {
        IndicatorResult { triggered, value: 0.0 }
    }

    /// Boundary scenario 1: enabled={rsi,volume,macd}, triggered={rsi,volume}.
    #[test]
    fn two_of_three_boundary_scenario() {
        let mut indicators = HashMap::new();
        indicators.insert("rsi".to_string(), config(true));
        indicators.insert("volume_spike".to_string(), config(true));
        indicators.insert("macd".to_string(), config(true));

        let mut results = HashMap::new();
        results.insert("rsi".to_string(), result(true));
        results.insert("volume_spike".to_string(), result(true));
        results.insert("macd".to_string(), result(false));

        let eval = evaluate_entry(&indicators, &results, EntryLogic::TwoOfThree);
        assert!(eval.should_enter);

        let mut results_one = HashMap::new();
        results_one.insert("rsi".to_string(), result(true));
        results_one.insert("volume_spike".to_string(), result(false));
        results_one.insert("macd".to_string(), result(false));
        let eval_one = evaluate_entry(&indicators, &results_one, EntryLogic::TwoOfThree);
        assert!(!eval_one.should_enter);
    }

    #[test]
    fn two_of_three_truth_table() {
        assert!(!entry_logic_satisfied(0, 0, EntryLogic::TwoOfThree));
        assert!(entry_logic_satisfied(1, 1, EntryLogic::TwoOfThree));
        assert!(!entry_logic_satisfied(1, 0, EntryLogic::TwoOfThree));
        assert!(!entry_logic_satisfied(2, 1, EntryLogic::TwoOfThree));
        assert!(entry_logic_satisfied(2, 2, EntryLogic::TwoOfThree));
        assert!(!entry_logic_satisfied(3, 1, EntryLogic::TwoOfThree));
        assert!(entry_logic_satisfied(3, 2, EntryLogic::TwoOfThree));
        assert!(entry_logic_satisfied(6, 2, EntryLogic::TwoOfThree));
    }

    #[test]
    fn three_of_four_truth_table() {
        assert!(!entry_logic_satisfied(0, 0, EntryLogic::ThreeOfFour));
        assert!(entry_logic_satisfied(1, 1, EntryLogic::ThreeOfFour));
        assert!(entry_logic_satisfied(2, 2, EntryLogic::ThreeOfFour));
        assert!(!entry_logic_satisfied(2, 1, EntryLogic::ThreeOfFour));
        assert!(entry_logic_satisfied(3, 3, EntryLogic::ThreeOfFour));
        assert!(!entry_logic_satisfied(3, 2, EntryLogic::ThreeOfFour));
        assert!(!entry_logic_satisfied(4, 2, EntryLogic::ThreeOfFour));
        assert!(entry_logic_satisfied(4, 3, EntryLogic::ThreeOfFour));
        assert!(entry_logic_satisfied(6, 3, EntryLogic::ThreeOfFour));
    }

    #[test]
    fn any_1_and_all_truth_tables() {
        for enabled in 0..=6 {
            for triggered in 0..=enabled {
                assert_eq!(
                    entry_logic_satisfied(enabled, triggered, EntryLogic::Any1),
                    triggered >= 1
                );
                assert_eq!(
                    entry_logic_satisfied(enabled, triggered, EntryLogic::All),
                    enabled > 0 && triggered == enabled
                );
            }
        }
    }

    /// Property test over every (enabled, triggered) pair spec §8 names:
    /// triggered_count must never exceed enabled_count and the combinator
    /// must not panic for any of them.
    #[test]
    fn combinator_property_over_all_enabled_triggered_pairs() {
        for enabled in 0..=6usize {
            for triggered in 0..=enabled {
                for logic in [EntryLogic::Any1, EntryLogic::TwoOfThree, EntryLogic::ThreeOfFour, EntryLogic::All] {
                    let decision = entry_logic_satisfied(enabled, triggered, logic);
                    if decision {
                        assert!(triggered >= 1, "a true decision requires at least one trigger");
                    }
                }
            }
        }
    }

    fn exit_rules(tp: f64, sl: f64, max_hold: f64, mode: TakeProfitMode) -> ExitRules {
        ExitRules { take_profit_percent: tp, stop_loss_percent: sl, max_hold_hours: max_hold, take_profit_mode: mode }
    }

    /// Boundary scenario 2, all four sub-cases.
    #[test]
    fn exit_priority_boundary_scenario() {
        let entry_price = Decimal::new(100, 0);
        let entry_time = Utc::now() - Duration::minutes(30);

        let reason = evaluate_exit(
            &exit_rules(3.0, 5.0, 24.0, TakeProfitMode::Auto),
            entry_price,
            Decimal::new(105, 0),
            entry_time,
            Utc::now(),
        );
        assert_eq!(reason, Some(ExitReason::TakeProfit));

        let reason = evaluate_exit(
            &exit_rules(3.0, 5.0, 24.0, TakeProfitMode::Auto),
            entry_price,
            Decimal::new(94, 0),
            entry_time,
            Utc::now(),
        );
        assert_eq!(reason, Some(ExitReason::StopLoss));

        let old_entry_time = Utc::now() - Duration::hours(25);
        let reason = evaluate_exit(
            &exit_rules(3.0, 5.0, 24.0, TakeProfitMode::Auto),
            entry_price,
            Decimal::new(101, 0),
            old_entry_time,
            Utc::now(),
        );
        assert_eq!(reason, Some(ExitReason::MaxHoldTime));

        let reason = evaluate_exit(
            &exit_rules(3.0, 5.0, 24.0, TakeProfitMode::Manual),
            entry_price,
            Decimal::new(105, 0),
            entry_time,
            Utc::now(),
        );
        assert_eq!(reason, None);
    }
}
