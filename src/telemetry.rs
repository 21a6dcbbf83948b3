pub mod alerts;
pub mod latency;
pub mod pnl;

pub use alerts::AlertManager;
pub use latency::LatencyTracker;
pub use pnl::PnlTracker;
