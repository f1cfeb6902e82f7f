//! Credential acquisition for the simulation endpoint.
//!
//! The controller treats the bearer token as an opaque artifact supplied on
//! demand; any acquisition failure is surfaced as `Unauthenticated`.

use crate::error::{Result, SessionError};
use async_trait::async_trait;

/// Supplies an opaque bearer token on demand.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Acquire the current bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Unauthenticated`] if no token is available.
    async fn bearer_token(&self) -> Result<String>;
}

/// Fixed token, typically read from the environment at startup.
pub struct StaticCredential {
    token: String,
}

impl StaticCredential {
    /// Wrap an already-acquired token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn bearer_token(&self) -> Result<String> {
        if self.token.is_empty() {
            return Err(SessionError::Unauthenticated("no token configured".into()));
        }
        Ok(self.token.clone())
    }
}

/// Token stored in the OS keychain.
pub struct KeyringCredential {
    service: String,
    account: String,
}

impl KeyringCredential {
    /// Reference a keychain entry by service and account name.
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for KeyringCredential {
    async fn bearer_token(&self) -> Result<String> {
        let service = self.service.clone();
        let account = self.account.clone();
        // Keychain access is blocking on every platform backend.
        tokio::task::spawn_blocking(move || {
            let entry = keyring::Entry::new(&service, &account)
                .map_err(|e| SessionError::Unauthenticated(format!("keychain access failed: {e}")))?;
            entry
                .get_password()
                .map_err(|e| SessionError::Unauthenticated(format!("no stored token: {e}")))
        })
        .await
        .map_err(|e| SessionError::Channel(format!("keychain task failed: {e}")))?
    }
}
