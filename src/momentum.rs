pub mod position_monitor;
pub mod worker;

pub use worker::MomentumWorker;
