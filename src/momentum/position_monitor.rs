//! Per-position exit check and the three-step close protocol (spec §4.4).

use std::sync::Arc;

use tracing::{error, warn};

use crate::exchanges::registry;
use crate::execution::OrderExecutor;
use crate::models::credentials::ExchangeCredentials;
use crate::models::market::Pair;
use crate::models::position::Position;
use crate::models::strategy::ExitRules;
use crate::persistence::{PersistenceError, Store};
use crate::signals::signal_evaluator;

/// Closes every open position for `(user_id, exchange)` whose exit
/// conditions fire. A failure closing one position is logged and does not
/// abort the rest (spec §4.3 step 3).
pub async fn close_due_positions(
    store: &Arc<dyn Store>,
    executor: &OrderExecutor,
    user_id: &str,
    exchange: &str,
    exit_rules_by_strategy: &std::collections::HashMap<String, ExitRules>,
    credentials: &ExchangeCredentials,
    dry_run: bool,
) -> usize {
    let positions = match store.list_open_positions(user_id, exchange).await {
        Ok(positions) => positions,
        Err(err) => {
            error!(user_id, exchange, error = %err, "failed to list open positions");
            return 0;
        }
    };

    let Some(adapter) = registry::build(exchange) else {
        error!(exchange, "no adapter registered for exchange");
        return 0;
    };

    let mut closed = 0;
    for position in positions {
        let Some(exit_rules) = exit_rules_by_strategy.get(&position.strategy_id) else {
            continue;
        };

        let pair = Pair::new(&position.asset, pair_quote(&position.pair, &position.asset));
        let current_price = match adapter.fetch_current_price(&pair).await {
            Ok(price) => price,
            Err(err) => {
                warn!(position_id = %position.id, error = %err, "failed to fetch current price, skipping exit check");
                continue;
            }
        };

        let exit_reason = signal_evaluator::evaluate_exit(
            exit_rules,
            position.entry_price,
            current_price,
            position.entry_time,
            chrono::Utc::now(),
        );
        let Some(exit_reason) = exit_reason else {
            continue;
        };

        if let Err(err) = close_position(store, executor, &*adapter, &position, &pair, exit_reason, credentials, dry_run).await {
            error!(position_id = %position.id, error = %err, "failed to close position");
            continue;
        }
        closed += 1;
    }
    closed
}

#[allow(clippy::too_many_arguments)]
async fn close_position(
    store: &Arc<dyn Store>,
    executor: &OrderExecutor,
    adapter: &dyn crate::exchanges::ExchangeAdapter,
    position: &Position,
    pair: &Pair,
    exit_reason: crate::models::position::ExitReason,
    credentials: &ExchangeCredentials,
    dry_run: bool,
) -> Result<(), PersistenceError> {
    // Step 1: mark-closing. Returns AlreadyClosing if another task won the race.
    store.mark_closing(&position.id).await?;

    // Step 2: submit the market sell for the recorded entry quantity.
    let fill = executor
        .market_sell(adapter, pair, position.entry_quantity, credentials, dry_run)
        .await
        .map_err(|err| PersistenceError::PositionNotFound(format!("{}: sell failed: {err}", position.id)))?;

    // Step 3: finalise with the venue's reported fill.
    store
        .finalize_close(&position.id, fill.executed_price, fill.executed_quantity, fill.fee, fill.order_id, exit_reason)
        .await?;
    Ok(())
}

/// Recovers the quote currency from a stored canonical pair string
/// (`BASEQUOTE`) given the known base symbol.
fn pair_quote<'a>(canonical_pair: &'a str, base: &str) -> &'a str {
    canonical_pair.strip_prefix(base).unwrap_or(canonical_pair)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_quote_strips_known_base() {
        assert_eq!(pair_quote("BTCUSDT", "BTC"), "USDT");
        assert_eq!(pair_quote("BTCZAR", "BTC"), "ZAR");
    }
}
