//! Access credentials and the expiry guard every authenticated call runs first.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Minutes before the real expiry at which a token is already treated as expired.
pub const DEFAULT_SAFETY_MARGIN_MINUTES: i64 = 5;

pub fn default_safety_margin() -> Duration {
    Duration::minutes(DEFAULT_SAFETY_MARGIN_MINUTES)
}

/// A bearer token issued by the login endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(rename = ".issued", default, skip_serializing_if = "Option::is_none")]
    pub issued: Option<DateTime<Utc>>,
    #[serde(rename = ".expires")]
    pub expires: DateTime<Utc>,
    /// Any other claims returned alongside the token.
    #[serde(flatten)]
    pub claims: serde_json::Map<String, serde_json::Value>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, expires: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            issued: None,
            expires,
            claims: serde_json::Map::new(),
        }
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

/// Fails with [`ScanError::AuthExpired`] if `credential` expires within
/// `margin` from now.
pub fn verify_token(credential: &Credential, margin: Duration) -> Result<(), ScanError> {
    verify_token_at(credential, Utc::now(), margin)
}

pub fn verify_token_at(
    credential: &Credential,
    now: DateTime<Utc>,
    margin: Duration,
) -> Result<(), ScanError> {
    if credential.expires <= now + margin {
        return Err(ScanError::AuthExpired {
            expires: credential.expires,
        });
    }
    Ok(())
}
