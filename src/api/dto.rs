pub mod market_data;
pub mod position;
pub mod strategy;
pub mod triarb;
