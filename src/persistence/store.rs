use async_trait::async_trait;
use thiserror::Error;

use crate::models::balance::{AssetDeclaration, SyncSource};
use crate::models::credentials::ExchangeCredentials;
use crate::models::position::{ExitReason, Position};
use crate::models::strategy::{Strategy, StrategyValidationError};
use rust_decimal::Decimal;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("strategy not found: {0}")]
    StrategyNotFound(String),
    #[error("position not found: {0}")]
    PositionNotFound(String),
    #[error("credentials not found for user {user_id} on {exchange}")]
    CredentialsNotFound { user_id: String, exchange: String },
    #[error("asset declaration not found for user {user_id} on {exchange}/{asset}")]
    AssetDeclarationNotFound { user_id: String, exchange: String, asset: String },
    #[error(transparent)]
    Validation(#[from] StrategyValidationError),
    #[error("position {0} is not OPEN, already claimed by another close")]
    AlreadyClosing(String),
    #[error(transparent)]
    Balance(#[from] crate::models::balance::BalanceError),
}

/// Storage contract the momentum and triarb engines are written against.
///
/// Every operation here corresponds to a relational obligation from the
/// spec's persisted-state layout (`momentum_strategies`, `momentum_positions`
/// with its `status` CHECK, `momentum_credentials`,
/// `currency_swap_asset_declarations`, `currency_swap_balances`) — this
/// crate only commits to the obligations, not to a specific SQL backend.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_strategy(&self, strategy: Strategy) -> Result<Strategy, PersistenceError>;
    async fn update_strategy(&self, strategy: Strategy) -> Result<Strategy, PersistenceError>;
    async fn get_strategy(&self, id: &str) -> Result<Strategy, PersistenceError>;
    async fn list_active_strategies(&self) -> Result<Vec<Strategy>, PersistenceError>;
    /// Flips `is_active`, re-validating the cross-strategy asset-disjointness
    /// invariant when activating (spec.md §3, §8 boundary scenario 6).
    async fn toggle_strategy(&self, id: &str, active: bool) -> Result<Strategy, PersistenceError>;

    async fn insert_position(&self, position: Position) -> Result<Position, PersistenceError>;
    async fn get_position(&self, id: &str) -> Result<Position, PersistenceError>;
    async fn list_open_positions(&self, user_id: &str, exchange: &str) -> Result<Vec<Position>, PersistenceError>;
    async fn list_open_positions_for_strategy(&self, strategy_id: &str) -> Result<Vec<Position>, PersistenceError>;

    /// Conditional `OPEN -> CLOSING` transition — the at-most-once
    /// linearisation point (spec.md §4.4, §8 concurrency property). Returns
    /// `AlreadyClosing` if the position wasn't `OPEN`.
    async fn mark_closing(&self, id: &str) -> Result<Position, PersistenceError>;

    /// `CLOSING -> CLOSED`, populating exit fields and computed PnL.
    #[allow(clippy::too_many_arguments)]
    async fn finalize_close(
        &self,
        id: &str,
        exit_price: Decimal,
        exit_quantity: Decimal,
        exit_fee: Decimal,
        exit_order_id: String,
        exit_reason: ExitReason,
    ) -> Result<Position, PersistenceError>;

    async fn get_credentials(&self, user_id: &str, exchange: &str) -> Result<ExchangeCredentials, PersistenceError>;
    async fn put_credentials(
        &self,
        user_id: &str,
        exchange: &str,
        credentials: ExchangeCredentials,
    ) -> Result<(), PersistenceError>;

    async fn upsert_asset_declaration(
        &self,
        user_id: &str,
        exchange: &str,
        asset: &str,
        available: Decimal,
        sync_source: SyncSource,
    ) -> Result<AssetDeclaration, PersistenceError>;
    async fn get_asset_declaration(
        &self,
        user_id: &str,
        exchange: &str,
        asset: &str,
    ) -> Result<AssetDeclaration, PersistenceError>;
    async fn lock_balance(
        &self,
        user_id: &str,
        exchange: &str,
        asset: &str,
        amount: Decimal,
    ) -> Result<AssetDeclaration, PersistenceError>;
    async fn unlock_balance(
        &self,
        user_id: &str,
        exchange: &str,
        asset: &str,
        amount: Decimal,
    ) -> Result<AssetDeclaration, PersistenceError>;
}
