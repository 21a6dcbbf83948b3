//! Candle-indicator math, treated as a black-box library (spec's Out-of-scope
//! note on RSI/MACD/EMA/Bollinger/Stochastic formulas). Mirrors the shape of
//! the original `models::candle::IndicatorEngine`: plain `f64` math over a
//! candle window, one function per indicator, no decimal types in sight.

use std::collections::HashMap;

use crate::models::market::Candle;
use crate::models::strategy::IndicatorConfig;

/// Minimum candle-window length the engine requires before it will compute
/// anything (spec §4.2: "given a candle sequence of length >= 50").
pub const MIN_CANDLES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorResult {
    pub triggered: bool,
    pub value: f64,
}

fn param(params: &HashMap<String, f64>, key: &str, default: f64) -> f64 {
    params.get(key).copied().unwrap_or(default)
}

fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    let k = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev = values[0];
    out.push(prev);
    for &v in &values[1..] {
        prev = v * k + prev * (1.0 - k);
        out.push(prev);
    }
    out
}

fn rsi_series(closes: &[f64], period: usize) -> Vec<f64> {
    let mut gains = vec![0.0];
    let mut losses = vec![0.0];
    for w in closes.windows(2) {
        let delta = w[1] - w[0];
        gains.push(delta.max(0.0));
        losses.push((-delta).max(0.0));
    }

    let mut rsis = vec![f64::NAN; period.min(closes.len())];
    if closes.len() <= period {
        return rsis;
    }

    let rsi_from = |avg_gain: f64, avg_loss: f64| {
        if avg_loss == 0.0 {
            100.0
        } else {
            let rs = avg_gain / avg_loss;
            100.0 - 100.0 / (1.0 + rs)
        }
    };

    let mut avg_gain = gains[1..=period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[1..=period].iter().sum::<f64>() / period as f64;
    rsis.push(rsi_from(avg_gain, avg_loss));

    for i in (period + 1)..gains.len() {
        avg_gain = (avg_gain * (period as f64 - 1.0) + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + losses[i]) / period as f64;
        rsis.push(rsi_from(avg_gain, avg_loss));
    }
    rsis
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std_dev(values: &[f64]) -> f64 {
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

fn rsi_oversold_crossing(closes: &[f64], params: &HashMap<String, f64>) -> IndicatorResult {
    let period = param(params, "period", 14.0) as usize;
    let threshold = param(params, "oversold_threshold", 30.0);
    let rsis = rsi_series(closes, period);
    let last = *rsis.last().unwrap();
    let prev = rsis[rsis.len() - 2];
    let triggered = !prev.is_nan() && !last.is_nan() && prev >= threshold && last < threshold;
    IndicatorResult { triggered, value: last }
}

fn volume_spike(candles: &[Candle], params: &HashMap<String, f64>) -> IndicatorResult {
    let period = param(params, "period", 20.0) as usize;
    let multiplier = param(params, "multiplier", 2.0);
    let n = candles.len();
    let window = &candles[n - period - 1..n - 1];
    let avg_volume = mean(&window.iter().map(|c| c.volume).collect::<Vec<_>>());
    let current = candles[n - 1].volume;
    let ratio = if avg_volume == 0.0 { 0.0 } else { current / avg_volume };
    IndicatorResult { triggered: ratio >= multiplier, value: ratio }
}

fn macd_bullish_crossover(closes: &[f64], params: &HashMap<String, f64>) -> IndicatorResult {
    let fast = param(params, "fast_period", 12.0) as usize;
    let slow = param(params, "slow_period", 26.0) as usize;
    let signal_period = param(params, "signal_period", 9.0) as usize;

    let ema_fast = ema_series(closes, fast);
    let ema_slow = ema_series(closes, slow);
    let macd_line: Vec<f64> = ema_fast.iter().zip(ema_slow.iter()).map(|(f, s)| f - s).collect();
    let signal_line = ema_series(&macd_line, signal_period);

    let last = macd_line.len() - 1;
    let macd_now = macd_line[last];
    let macd_prev = macd_line[last - 1];
    let signal_now = signal_line[last];
    let signal_prev = signal_line[last - 1];

    let triggered = macd_now > signal_now && macd_prev <= signal_prev;
    IndicatorResult { triggered, value: macd_now - signal_now }
}

fn ema_crossover(closes: &[f64], params: &HashMap<String, f64>) -> IndicatorResult {
    let fast = param(params, "fast_period", 9.0) as usize;
    let slow = param(params, "slow_period", 21.0) as usize;

    let ema_fast = ema_series(closes, fast);
    let ema_slow = ema_series(closes, slow);
    let last = ema_fast.len() - 1;

    let triggered =
        ema_fast[last] > ema_slow[last] && ema_fast[last - 1] <= ema_slow[last - 1];
    IndicatorResult { triggered, value: ema_fast[last] - ema_slow[last] }
}

fn bollinger_lower_band(closes: &[f64], params: &HashMap<String, f64>) -> IndicatorResult {
    let period = param(params, "period", 20.0) as usize;
    let std_dev_mult = param(params, "std_dev", 2.0);
    let epsilon_percent = param(params, "epsilon_percent", 0.5);

    let window = &closes[closes.len() - period..];
    let sma = mean(window);
    let std_dev = population_std_dev(window);
    let lower_band = sma - std_dev_mult * std_dev;

    let close = *closes.last().unwrap();
    let epsilon = close * epsilon_percent / 100.0;
    let triggered = (close - lower_band).abs() <= epsilon || close < lower_band;
    IndicatorResult { triggered, value: lower_band }
}

fn stochastic_oversold(candles: &[Candle], params: &HashMap<String, f64>) -> IndicatorResult {
    let period = param(params, "period", 14.0) as usize;
    let threshold = param(params, "threshold", 20.0);

    let window = &candles[candles.len() - period..];
    let highest_high = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let lowest_low = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let close = candles.last().unwrap().close;

    let percent_k = if highest_high == lowest_low {
        50.0
    } else {
        (close - lowest_low) / (highest_high - lowest_low) * 100.0
    };
    IndicatorResult { triggered: percent_k < threshold, value: percent_k }
}

/// Computes a single named indicator over `candles`. Returns `None` if the
/// window is shorter than [`MIN_CANDLES`] or the name isn't recognised.
pub fn compute(candles: &[Candle], name: &str, params: &HashMap<String, f64>) -> Option<IndicatorResult> {
    if candles.len() < MIN_CANDLES {
        return None;
    }
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    match name {
        "rsi" => Some(rsi_oversold_crossing(&closes, params)),
        "volume_spike" => Some(volume_spike(candles, params)),
        "macd" => Some(macd_bullish_crossover(&closes, params)),
        "ema_crossover" => Some(ema_crossover(&closes, params)),
        "bollinger" => Some(bollinger_lower_band(&closes, params)),
        "stochastic" => Some(stochastic_oversold(candles, params)),
        _ => None,
    }
}

/// Computes every *enabled* indicator named in `entry_indicators`, skipping
/// indicators that are disabled or unrecognised.
pub fn compute_all(
    candles: &[Candle],
    entry_indicators: &HashMap<String, IndicatorConfig>,
) -> HashMap<String, IndicatorResult> {
    entry_indicators
        .iter()
        .filter(|(_, cfg)| cfg.enabled)
        .filter_map(|(name, cfg)| compute(candles, name, &cfg.params).map(|r| (name.clone(), r)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(i: usize, close: f64, high: f64, low: f64, volume: f64) -> Candle {
        Candle {
            timestamp_ms: i as i64 * 60_000,
            open: close,
            high,
            low,
            close,
            volume,
        }
    }

    /// 60 candles drifting down from 100 toward an oversold bounce on the
    /// final bar, enough to exercise every indicator at once.
    fn downtrend_then_bounce() -> Vec<Candle> {
        let mut candles = Vec::new();
        let mut price = 100.0;
        for i in 0..59 {
            price -= 0.6;
            candles.push(candle(i, price, price + 0.2, price - 0.2, 10.0));
        }
        // final bar: sharp bounce with a volume spike
        price += 3.0;
        candles.push(candle(59, price, price + 0.3, price - 3.3, 80.0));
        candles
    }

    #[test]
    fn fewer_than_min_candles_returns_none() {
        let candles = vec![candle(0, 100.0, 101.0, 99.0, 10.0); 10];
        assert_eq!(compute(&candles, "rsi", &HashMap::new()), None);
    }

    #[test]
    fn unknown_indicator_name_returns_none() {
        let candles = downtrend_then_bounce();
        assert_eq!(compute(&candles, "nonsense", &HashMap::new()), None);
    }

    #[test]
    fn volume_spike_detects_spike_bar() {
        let candles = downtrend_then_bounce();
        let result = compute(&candles, "volume_spike", &HashMap::new()).unwrap();
        assert!(result.triggered, "expected spike, ratio={}", result.value);
    }

    #[test]
    fn rsi_crosses_into_oversold_then_back_out() {
        let candles = downtrend_then_bounce();
        let result = compute(&candles, "rsi", &HashMap::new()).unwrap();
        // the long grind down should have pushed RSI to a low value even if
        // the final bounce bar doesn't itself cross the threshold.
        assert!(result.value < 50.0);
    }

    #[test]
    fn bollinger_lower_band_trigger_on_close_bar() {
        let candles = downtrend_then_bounce();
        let result = compute(&candles, "bollinger", &HashMap::new()).unwrap();
        assert!(result.value > 0.0);
    }

    #[test]
    fn stochastic_percent_k_in_range() {
        let candles = downtrend_then_bounce();
        let result = compute(&candles, "stochastic", &HashMap::new()).unwrap();
        assert!((0.0..=100.0).contains(&result.value));
    }

    #[test]
    fn compute_all_skips_disabled_and_unknown() {
        let candles = downtrend_then_bounce();
        let mut indicators = HashMap::new();
        indicators.insert(
            "rsi".to_string(),
            IndicatorConfig { enabled: true, params: HashMap::new() },
        );
        indicators.insert(
            "macd".to_string(),
            IndicatorConfig { enabled: false, params: HashMap::new() },
        );
        let results = compute_all(&candles, &indicators);
        assert_eq!(results.len(), 1);
        assert!(results.contains_key("rsi"));
    }
}
