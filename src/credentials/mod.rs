//! Upstream access credentials.

mod file_store;

pub use file_store::FileCredentialStore;

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

/// Tokens are treated as expired this many seconds before their real expiry.
pub const TOKEN_EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix timestamp in seconds. `None` means the token never expires.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl AccessToken {
    pub fn is_expired_at(&self, now_unix: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => now_unix + TOKEN_EXPIRY_SKEW_SECS >= expires_at,
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp())
    }
}

pub trait CredentialStore: Send + Sync {
    fn get_cached_token(&self) -> Result<Option<AccessToken>>;
    fn save_token(&self, token: &AccessToken) -> Result<()>;
}

/// Credential store that lives only as long as the process.
#[derive(Default)]
pub struct MemoryCredentialStore {
    token: Mutex<Option<AccessToken>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: AccessToken) -> Self {
        Self {
            token: Mutex::new(Some(token)),
        }
    }

    pub fn clear(&self) {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get_cached_token(&self) -> Result<Option<AccessToken>> {
        Ok(self
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save_token(&self, token: &AccessToken) -> Result<()> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        Ok(())
    }
}
