use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncSource {
    Api,
    Manual,
    Calculated,
}

#[derive(Debug, Error)]
pub enum BalanceError {
    #[error("insufficient available balance: have {available}, need {amount}")]
    InsufficientAvailable { available: Decimal, amount: Decimal },
    #[error("insufficient locked balance: have {locked}, need {amount}")]
    InsufficientLocked { locked: Decimal, amount: Decimal },
}

/// Per `(user_id, exchange, asset)` funded-asset row (`currency_swap_balances`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetDeclaration {
    pub user_id: String,
    pub exchange: String,
    pub asset: String,
    pub available: Decimal,
    pub locked: Decimal,
    pub initial_balance: Decimal,
    pub last_synced_at: DateTime<Utc>,
    pub sync_source: SyncSource,
}

impl AssetDeclaration {
    pub fn total(&self) -> Decimal {
        self.available + self.locked
    }

    /// Atomic conditional lock: fails rather than going negative.
    pub fn lock(&mut self, amount: Decimal) -> Result<(), BalanceError> {
        if self.available < amount {
            return Err(BalanceError::InsufficientAvailable {
                available: self.available,
                amount,
            });
        }
        self.available -= amount;
        self.locked += amount;
        Ok(())
    }

    /// Atomic conditional unlock: fails rather than going negative.
    pub fn unlock(&mut self, amount: Decimal) -> Result<(), BalanceError> {
        if self.locked < amount {
            return Err(BalanceError::InsufficientLocked {
                locked: self.locked,
                amount,
            });
        }
        self.locked -= amount;
        self.available += amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn declaration() -> AssetDeclaration {
        AssetDeclaration {
            user_id: "u1".into(),
            exchange: "binance".into(),
            asset: "USDT".into(),
            available: dec!(100),
            locked: dec!(0),
            initial_balance: dec!(100),
            last_synced_at: Utc::now(),
            sync_source: SyncSource::Api,
        }
    }

    #[test]
    fn total_is_available_plus_locked_after_lock() {
        let mut d = declaration();
        d.lock(dec!(40)).unwrap();
        assert_eq!(d.total(), dec!(100));
        assert_eq!(d.available, dec!(60));
        assert_eq!(d.locked, dec!(40));
    }

    #[test]
    fn lock_beyond_available_fails() {
        let mut d = declaration();
        assert!(d.lock(dec!(200)).is_err());
        assert_eq!(d.available, dec!(100));
    }

    #[test]
    fn unlock_beyond_locked_fails() {
        let mut d = declaration();
        d.lock(dec!(10)).unwrap();
        assert!(d.unlock(dec!(50)).is_err());
        assert_eq!(d.locked, dec!(10));
    }
}
