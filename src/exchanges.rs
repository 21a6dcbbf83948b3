pub mod adapter;
pub mod ascendex;
pub mod http;
pub mod binance;
pub mod bitget;
pub mod bybit;
pub mod chainex;
pub mod coinbase;
pub mod gemini;
pub mod kraken;
pub mod kucoin;
pub mod luno;
pub mod okx;
pub mod rate_limiter;
pub mod registry;
pub mod signing;
pub mod valr;

pub use adapter::{ExchangeAdapter, ExchangeError};
