use super::adapter::ExchangeAdapter;
use super::{
    ascendex::AscendexAdapter, binance::BinanceAdapter, bitget::BitgetAdapter, bybit::BybitAdapter,
    chainex::ChainexAdapter, coinbase::CoinbaseAdapter, gemini::GeminiAdapter, kraken::KrakenAdapter,
    kucoin::KucoinAdapter, luno::LunoAdapter, okx::OkxAdapter, valr::ValrAdapter,
};

/// Builds the adapter for a venue name as stored on `Strategy::exchange` /
/// `AssetDeclaration::exchange`. Names are lower-case venue identifiers.
pub fn build(exchange: &str) -> Option<Box<dyn ExchangeAdapter>> {
    let adapter: Box<dyn ExchangeAdapter> = match exchange {
        "binance" => Box::new(BinanceAdapter::default()),
        "bybit" => Box::new(BybitAdapter::default()),
        "okx" => Box::new(OkxAdapter::default()),
        "kucoin" => Box::new(KucoinAdapter::default()),
        "bitget" => Box::new(BitgetAdapter::default()),
        "coinbase" => Box::new(CoinbaseAdapter::default()),
        "gemini" => Box::new(GeminiAdapter::default()),
        "kraken" => Box::new(KrakenAdapter::default()),
        "valr" => Box::new(ValrAdapter::default()),
        "luno" => Box::new(LunoAdapter::default()),
        "ascendex" => Box::new(AscendexAdapter::default()),
        "chainex" => Box::new(ChainexAdapter::default()),
        _ => return None,
    };
    Some(adapter)
}

pub const SUPPORTED_EXCHANGES: &[&str] = &[
    "binance", "bybit", "okx", "kucoin", "bitget", "coinbase", "gemini", "kraken", "valr", "luno",
    "ascendex", "chainex",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_supported_exchange_builds_an_adapter() {
        for name in SUPPORTED_EXCHANGES {
            assert!(build(name).is_some(), "expected adapter for {name}");
        }
    }

    #[test]
    fn unknown_exchange_returns_none() {
        assert!(build("notreal").is_none());
    }
}
