use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Venue API credentials for one `(user_id, exchange)` pair.
///
/// Never store this beyond a single call's dynamic scope and never derive
/// `Debug` on it — `api_secret`/`passphrase` would leak into logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct ExchangeCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: Option<String>,
    pub memo: Option<String>,
}

impl fmt::Debug for ExchangeCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeCredentials")
            .field("api_key", &redact(&self.api_key))
            .field("api_secret", &"[redacted]")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[redacted]"))
            .field("memo", &self.memo.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

fn redact(key: &str) -> String {
    if key.len() <= 4 {
        "*".repeat(key.len())
    } else {
        format!("{}***", &key[..4])
    }
}

/// Row shape for `momentum_credentials`: presence metadata only, the secret
/// fields never round-trip through a read API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsRecord {
    pub user_id: String,
    pub exchange: String,
    pub is_connected: bool,
    pub last_connected_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_prints_secret() {
        let creds = ExchangeCredentials {
            api_key: "AKIA1234567890".to_string(),
            api_secret: "supersecret".to_string(),
            passphrase: Some("pw".to_string()),
            memo: None,
        };
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("supersecret"));
        assert!(!rendered.contains("pw"));
        assert!(rendered.contains("AKIA"));
    }
}
