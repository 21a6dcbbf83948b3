//! Process-wide execution rate limiter (spec §4.6, §9): a singleton keyed on
//! exchange name, tracking `active_execution_count` and `last_execution_at`.
//! Grounded on the teacher's `risk::risk_manager::RiskManager` — an
//! independent watchdog holding its state behind atomics and an `RwLock`,
//! shared via `Arc` rather than a module-level static.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateLimitDecision {
    Proceed,
    /// `active_execution_count > 0` on this exchange already.
    Busy { retry_after_ms: u64 },
    /// `now - last_execution_at < cooldown_ms` for this exchange.
    Cooldown { retry_after_ms: u64 },
}

struct ExchangeState {
    active_execution_count: AtomicU32,
    last_execution_at: RwLock<Option<DateTime<Utc>>>,
}

impl ExchangeState {
    fn new() -> Self {
        Self { active_execution_count: AtomicU32::new(0), last_execution_at: RwLock::new(None) }
    }
}

/// Suggested retry delay while another execution is in flight on the venue.
const BUSY_RETRY_HINT_MS: u64 = 2_000;

fn cooldown_ms(exchange: &str) -> u64 {
    match exchange.to_lowercase().as_str() {
        "valr" | "luno" | "chainex" => 30_000,
        "binance" | "bybit" | "okx" | "kucoin" | "coinbase" => 15_000,
        "kraken" => 20_000,
        _ => 20_000,
    }
}

/// Shared across every execution path (momentum opens/closes, triarb legs).
/// Dry runs never touch this — callers are expected to bypass it entirely.
pub struct ExecutionRateLimiter {
    states: DashMap<String, Arc<ExchangeState>>,
    cooldown_overrides: std::collections::HashMap<String, u64>,
}

impl Default for ExecutionRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionRateLimiter {
    pub fn new() -> Self {
        Self { states: DashMap::new(), cooldown_overrides: std::collections::HashMap::new() }
    }

    /// Env-configurable per-exchange cooldowns (spec §6 "Environment
    /// configuration") layered over the spec §4.6 default table.
    pub fn with_cooldown_overrides(overrides: std::collections::HashMap<String, u64>) -> Self {
        Self { states: DashMap::new(), cooldown_overrides: overrides }
    }

    fn effective_cooldown_ms(&self, exchange: &str) -> u64 {
        self.cooldown_overrides.get(exchange).copied().unwrap_or_else(|| cooldown_ms(exchange))
    }

    fn state_for(&self, exchange: &str) -> Arc<ExchangeState> {
        self.states.entry(exchange.to_string()).or_insert_with(|| Arc::new(ExchangeState::new())).clone()
    }

    /// Checks whether a live execution may proceed, without mutating state.
    pub async fn check(&self, exchange: &str) -> RateLimitDecision {
        let state = self.state_for(exchange);
        if state.active_execution_count.load(Ordering::SeqCst) > 0 {
            return RateLimitDecision::Busy { retry_after_ms: BUSY_RETRY_HINT_MS };
        }
        if let Some(last) = *state.last_execution_at.read().await {
            let elapsed_ms = (Utc::now() - last).num_milliseconds().max(0) as u64;
            let cooldown = self.effective_cooldown_ms(exchange);
            if elapsed_ms < cooldown {
                return RateLimitDecision::Cooldown { retry_after_ms: cooldown - elapsed_ms };
            }
        }
        RateLimitDecision::Proceed
    }

    /// Call once `check` has passed and the live call is about to start.
    pub async fn begin(&self, exchange: &str) {
        let state = self.state_for(exchange);
        state.active_execution_count.fetch_add(1, Ordering::SeqCst);
        *state.last_execution_at.write().await = Some(Utc::now());
    }

    /// Call on completion, success or error, of every `begin`.
    pub async fn end(&self, exchange: &str) {
        if let Some(state) = self.states.get(exchange) {
            state.active_execution_count.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_call_proceeds_then_cools_down() {
        let limiter = ExecutionRateLimiter::new();
        assert_eq!(limiter.check("binance").await, RateLimitDecision::Proceed);
        limiter.begin("binance").await;
        limiter.end("binance").await;

        match limiter.check("binance").await {
            RateLimitDecision::Cooldown { retry_after_ms } => assert!(retry_after_ms <= 15_000),
            other => panic!("expected cooldown, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn busy_while_active_count_is_nonzero() {
        let limiter = ExecutionRateLimiter::new();
        limiter.begin("valr").await;
        assert_eq!(limiter.check("valr").await, RateLimitDecision::Busy { retry_after_ms: BUSY_RETRY_HINT_MS });
        limiter.end("valr").await;
    }

    #[tokio::test]
    async fn cooldown_table_matches_spec_groups() {
        assert_eq!(cooldown_ms("valr"), 30_000);
        assert_eq!(cooldown_ms("luno"), 30_000);
        assert_eq!(cooldown_ms("chainex"), 30_000);
        assert_eq!(cooldown_ms("binance"), 15_000);
        assert_eq!(cooldown_ms("bybit"), 15_000);
        assert_eq!(cooldown_ms("okx"), 15_000);
        assert_eq!(cooldown_ms("kucoin"), 15_000);
        assert_eq!(cooldown_ms("coinbase"), 15_000);
        assert_eq!(cooldown_ms("kraken"), 20_000);
        assert_eq!(cooldown_ms("gemini"), 20_000);
    }

    #[tokio::test]
    async fn exchanges_are_independent() {
        let limiter = ExecutionRateLimiter::new();
        limiter.begin("binance").await;
        limiter.end("binance").await;
        assert_eq!(limiter.check("kraken").await, RateLimitDecision::Proceed);
    }
}
