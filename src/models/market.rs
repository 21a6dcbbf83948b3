use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Canonical candle-interval values. Adapters map these to their own
/// spelling; an adapter receiving an interval it does not recognise
/// defaults to `H1` (spec §4.1).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    M1,
    M3,
    M5,
    M15,
    M30,
    #[default]
    H1,
    H2,
    H4,
    H6,
    H12,
    D1,
    W1,
}

impl Interval {
    pub fn canonical(&self) -> &'static str {
        match self {
            Interval::M1 => "1m",
            Interval::M3 => "3m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::H1 => "1h",
            Interval::H2 => "2h",
            Interval::H4 => "4h",
            Interval::H6 => "6h",
            Interval::H12 => "12h",
            Interval::D1 => "1d",
            Interval::W1 => "1w",
        }
    }

    pub fn from_canonical(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(Interval::M1),
            "3m" => Some(Interval::M3),
            "5m" => Some(Interval::M5),
            "15m" => Some(Interval::M15),
            "30m" => Some(Interval::M30),
            "1h" => Some(Interval::H1),
            "2h" => Some(Interval::H2),
            "4h" => Some(Interval::H4),
            "6h" => Some(Interval::H6),
            "12h" => Some(Interval::H12),
            "1d" => Some(Interval::D1),
            "1w" => Some(Interval::W1),
            _ => None,
        }
    }
}


/// A single OHLCV candle at a fixed interval (spec GLOSSARY).
///
/// Indicator math is float-based throughout this crate (teacher precedent:
/// the original `IndicatorEngine` ring buffer); money-bearing types stay
/// `Decimal`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Canonical trading pair, `BASEQUOTE` uppercase (e.g. `BTCUSDT`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pair {
    pub base: String,
    pub quote: String,
}

impl Pair {
    pub fn new(base: &str, quote: &str) -> Self {
        Self {
            base: base.to_uppercase(),
            quote: quote.to_uppercase(),
        }
    }

    /// Parse a canonical concatenated pair against a known quote currency,
    /// e.g. `from_canonical("BTCUSDT", "USDT") == Pair { base: "BTC", quote: "USDT" }`.
    pub fn from_canonical(canonical: &str, quote: &str) -> Option<Self> {
        let canonical = canonical.to_uppercase();
        let quote = quote.to_uppercase();
        let base = canonical.strip_suffix(&quote)?;
        if base.is_empty() {
            return None;
        }
        Some(Self {
            base: base.to_string(),
            quote,
        })
    }

    pub fn canonical(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: Decimal,
    pub size: Decimal,
}

/// Order book snapshot, bids/asks sorted best-first (spec §4.1: top-of-book
/// plus whatever depth the venue returned — this crate only ever reads
/// top-of-book per the Non-goals).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<OrderBookLevel> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<OrderBookLevel> {
        self.asks.first().copied()
    }
}

/// Normalised fill from any venue (spec §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub executed_price: Decimal,
    pub executed_quantity: Decimal,
    pub executed_value: Decimal,
    pub fee: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_canonical_roundtrip() {
        let p = Pair::new("btc", "usdt");
        assert_eq!(p.canonical(), "BTCUSDT");
        let back = Pair::from_canonical(&p.canonical(), "USDT").unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn interval_canonical_roundtrip() {
        for s in ["1m", "5m", "15m", "30m", "1h", "4h", "1d"] {
            let iv = Interval::from_canonical(s).unwrap();
            assert_eq!(iv.canonical(), s);
        }
    }

    #[test]
    fn unknown_interval_has_no_canonical_mapping() {
        assert!(Interval::from_canonical("9x").is_none());
    }
}
