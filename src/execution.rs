pub mod order_executor;
pub mod rate_limiter;

pub use order_executor::{ExecutionError, OrderExecutor};
pub use rate_limiter::ExecutionRateLimiter;
