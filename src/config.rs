use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::exchanges::registry::SUPPORTED_EXCHANGES;

/// Per-venue overrides: the adapters hard-code production base URLs, so
/// everything here is optional (spec §6: "per-venue base URLs, defaults
/// hard-coded").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub base_url_override: Option<String>,
    /// Quote currency this venue's strategies trade against (spec §9 open
    /// question: the engine is quote-agnostic, so this is pushed out to
    /// config rather than hard-coded per asset).
    pub default_quote: String,
    pub taker_fee_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub tick_interval_secs: u64,
    pub rotation_threshold: usize,
    pub rotation_window: usize,
    pub parallel_batch_size: usize,
    /// Universal-market-data-source policy (spec §9 open question): when
    /// set, candles for every strategy's signal evaluation are fetched from
    /// this venue regardless of the strategy's trade venue.
    pub market_data_source: Option<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriArbConfig {
    pub default_slippage_percent: f64,
    pub profit_threshold_percent: f64,
    pub leg_timeout_secs: u64,
    pub estimated_fee_rate_for_preflight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Schema obligations only (spec §1 Non-goals); this crate's own store
    /// is the in-memory reference implementation regardless of this value.
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub discord_webhook_url: Option<String>,
    pub alert_on_trade: bool,
    pub alert_on_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub exchanges: HashMap<String, ExchangeConfig>,
    pub worker: WorkerConfig,
    pub triarb: TriArbConfig,
    pub persistence: PersistenceConfig,
    pub telemetry: TelemetryConfig,
    /// Env-configurable overrides for the execution rate limiter's default
    /// per-exchange cooldown table (spec §6).
    pub cooldown_overrides: HashMap<String, u64>,
}

/// South-African-quoted venues (spec §4.5's `USDTZAR` leg example); every
/// other supported venue defaults to a USDT quote.
fn default_quote_for(exchange: &str) -> &'static str {
    match exchange {
        "valr" | "luno" | "chainex" => "ZAR",
        _ => "USDT",
    }
}

fn default_taker_fee_for(exchange: &str) -> f64 {
    match exchange {
        "binance" | "bybit" | "okx" | "kucoin" | "bitget" => 0.001,
        "coinbase" => 0.006,
        "gemini" => 0.0035,
        "kraken" => 0.0026,
        "valr" => 0.001,
        "luno" => 0.001,
        "ascendex" => 0.002,
        "chainex" => 0.0015,
        _ => 0.002,
    }
}

impl Default for Config {
    fn default() -> Self {
        let exchanges = SUPPORTED_EXCHANGES
            .iter()
            .map(|&name| {
                (
                    name.to_string(),
                    ExchangeConfig {
                        base_url_override: None,
                        default_quote: default_quote_for(name).to_string(),
                        taker_fee_percent: default_taker_fee_for(name),
                    },
                )
            })
            .collect();

        Self {
            exchanges,
            worker: WorkerConfig {
                tick_interval_secs: 60,
                rotation_threshold: 30,
                rotation_window: 25,
                parallel_batch_size: 5,
                market_data_source: None,
                dry_run: true,
            },
            triarb: TriArbConfig {
                default_slippage_percent: 0.5,
                profit_threshold_percent: 0.0,
                leg_timeout_secs: 30,
                estimated_fee_rate_for_preflight: 0.002,
            },
            persistence: PersistenceConfig { database_url: None },
            telemetry: TelemetryConfig {
                log_level: "info".into(),
                telegram_bot_token: None,
                telegram_chat_id: None,
                discord_webhook_url: None,
                alert_on_trade: true,
                alert_on_error: true,
            },
            cooldown_overrides: HashMap::new(),
        }
    }
}

impl Config {
    /// Loads configuration from environment variables (`.env` file) layered
    /// over [`Config::default`] (spec §6 "Environment configuration").
    pub fn load_or_default() -> Self {
        let _ = dotenv::dotenv();
        let mut config = Self::default();

        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.is_empty() {
                config.persistence.database_url = Some(url);
            }
        }

        let mut cooldown_overrides = HashMap::new();
        for name in SUPPORTED_EXCHANGES {
            let base_url_key = format!("EXCHANGE_{}_BASE_URL", name.to_uppercase());
            if let Ok(url) = std::env::var(&base_url_key) {
                if let Some(exchange) = config.exchanges.get_mut(*name) {
                    exchange.base_url_override = Some(url);
                }
            }
            let cooldown_key = format!("EXCHANGE_{}_COOLDOWN_MS", name.to_uppercase());
            if let Ok(ms) = std::env::var(&cooldown_key) {
                if let Ok(ms) = ms.parse::<u64>() {
                    cooldown_overrides.insert(name.to_string(), ms);
                }
            }
        }
        config.cooldown_overrides = cooldown_overrides;

        if let Ok(v) = std::env::var("WORKER_TICK_INTERVAL_SECS") {
            config.worker.tick_interval_secs = v.parse().unwrap_or(config.worker.tick_interval_secs);
        }
        if let Ok(v) = std::env::var("WORKER_ROTATION_THRESHOLD") {
            config.worker.rotation_threshold = v.parse().unwrap_or(config.worker.rotation_threshold);
        }
        if let Ok(v) = std::env::var("WORKER_ROTATION_WINDOW") {
            config.worker.rotation_window = v.parse().unwrap_or(config.worker.rotation_window);
        }
        if let Ok(v) = std::env::var("WORKER_PARALLEL_BATCH_SIZE") {
            config.worker.parallel_batch_size = v.parse().unwrap_or(config.worker.parallel_batch_size);
        }
        if let Ok(v) = std::env::var("WORKER_MARKET_DATA_SOURCE") {
            if !v.is_empty() {
                config.worker.market_data_source = Some(v);
            }
        }

        if let Ok(v) = std::env::var("TRIARB_DEFAULT_SLIPPAGE_PERCENT") {
            config.triarb.default_slippage_percent = v.parse().unwrap_or(config.triarb.default_slippage_percent);
        }
        if let Ok(v) = std::env::var("TRIARB_PROFIT_THRESHOLD_PERCENT") {
            config.triarb.profit_threshold_percent = v.parse().unwrap_or(config.triarb.profit_threshold_percent);
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.telemetry.log_level = level;
        }
        if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN") {
            if !token.is_empty() {
                config.telemetry.telegram_bot_token = Some(token);
            }
        }
        if let Ok(chat) = std::env::var("TELEGRAM_CHAT_ID") {
            if !chat.is_empty() {
                config.telemetry.telegram_chat_id = Some(chat);
            }
        }
        if let Ok(url) = std::env::var("DISCORD_WEBHOOK_URL") {
            if !url.is_empty() {
                config.telemetry.discord_webhook_url = Some(url);
            }
        }

        let dry_run = std::env::var("DRY_RUN").map(|v| v == "true" || v == "1").unwrap_or(true);
        config.worker.dry_run = dry_run;
        if dry_run {
            tracing::warn!("DRY_RUN active — no live orders will be submitted");
        }

        config
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.worker.tick_interval_secs > 0, "worker.tick_interval_secs must be > 0");
        anyhow::ensure!(
            self.worker.rotation_window <= self.worker.rotation_threshold,
            "worker.rotation_window must not exceed worker.rotation_threshold"
        );
        anyhow::ensure!(self.worker.parallel_batch_size > 0, "worker.parallel_batch_size must be > 0");
        anyhow::ensure!(
            self.triarb.default_slippage_percent >= 0.0,
            "triarb.default_slippage_percent must be >= 0"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn every_supported_exchange_has_a_default_quote() {
        let config = Config::default();
        for name in SUPPORTED_EXCHANGES {
            assert!(config.exchanges.contains_key(*name));
        }
        assert_eq!(config.exchanges["valr"].default_quote, "ZAR");
        assert_eq!(config.exchanges["binance"].default_quote, "USDT");
    }

    #[test]
    fn rotation_window_larger_than_threshold_fails_validation() {
        let mut config = Config::default();
        config.worker.rotation_window = 100;
        config.worker.rotation_threshold = 30;
        assert!(config.validate().is_err());
    }
}
