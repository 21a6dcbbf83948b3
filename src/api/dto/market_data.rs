//! Market data and order endpoint payload shapes (spec §6): candles,
//! current price, balance, buy/sell. Credentials travel in the request
//! body, never persisted (spec §9 "stateless, credential-in-parameter").

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::credentials::ExchangeCredentials;
use crate::models::market::{Candle, Interval};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchCandlesRequest {
    pub exchange: String,
    pub pair: String,
    pub interval: Interval,
    pub limit: u32,
    pub credentials: Option<ExchangeCredentials>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchCandlesResponse {
    pub candles: Vec<Candle>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentPriceRequest {
    pub exchange: String,
    pub pair: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrentPriceResponse {
    pub price: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceRequest {
    pub exchange: String,
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: Option<String>,
    pub memo: Option<String>,
}

impl BalanceRequest {
    pub fn credentials(&self) -> ExchangeCredentials {
        ExchangeCredentials {
            api_key: self.api_key.clone(),
            api_secret: self.api_secret.clone(),
            passphrase: self.passphrase.clone(),
            memo: self.memo.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceResponse {
    pub balances: HashMap<String, Decimal>,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketBuyRequest {
    pub exchange: String,
    pub pair: String,
    pub amount_usdt: Decimal,
    pub credentials: ExchangeCredentials,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSellRequest {
    pub exchange: String,
    pub pair: String,
    pub quantity: Decimal,
    pub credentials: ExchangeCredentials,
}
