//! Vault: the in-memory session key and its unlock state.
//!
//! The vault holds the 32-byte message key derived from the user's password.
//! Locking drops the key, which zeroizes it. Every encrypt/decrypt goes
//! through the vault so a locked store fails with
//! [`CryptoError::NotInitialized`] instead of touching stale key material.

use std::sync::Arc;

use shellchat_crypto::{CryptoError, SessionKey, aead};
use tokio::sync::RwLock;

/// Observable vault state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultState {
    /// No session key resident
    Locked,
    /// Salt fetch and key derivation in progress
    Unlocking,
    /// Session key resident
    Unlocked,
}

enum Slot {
    Locked,
    Unlocking,
    Unlocked(SessionKey),
}

/// Thread-safe vault handle. Clones share the same key slot.
#[derive(Clone)]
pub struct Vault {
    inner: Arc<RwLock<Slot>>,
}

impl Vault {
    /// Create a locked vault.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Slot::Locked)),
        }
    }

    /// Current state.
    pub async fn state(&self) -> VaultState {
        match *self.inner.read().await {
            Slot::Locked => VaultState::Locked,
            Slot::Unlocking => VaultState::Unlocking,
            Slot::Unlocked(_) => VaultState::Unlocked,
        }
    }

    /// Whether operations needing the key will fail.
    pub async fn is_locked(&self) -> bool {
        self.state().await != VaultState::Unlocked
    }

    /// Mark the vault as unlocking. Any resident key is dropped.
    pub async fn begin_unlock(&self) {
        *self.inner.write().await = Slot::Unlocking;
    }

    /// Install a derived key.
    pub async fn install(&self, key: SessionKey) {
        *self.inner.write().await = Slot::Unlocked(key);
    }

    /// Lock the vault and zeroize the key.
    pub async fn lock(&self) {
        let previous = std::mem::replace(&mut *self.inner.write().await, Slot::Locked);
        if matches!(previous, Slot::Unlocked(_)) {
            tracing::debug!("vault locked");
        }
        // `previous` drops here; SessionKey zeroizes on drop
    }

    /// Run `f` with the resident key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::NotInitialized`] unless the vault is unlocked.
    pub async fn with_key<F, R>(&self, f: F) -> Result<R, CryptoError>
    where
        F: FnOnce(&SessionKey) -> R,
    {
        match &*self.inner.read().await {
            Slot::Unlocked(key) => Ok(f(key)),
            Slot::Locked | Slot::Unlocking => Err(CryptoError::NotInitialized),
        }
    }

    /// Encrypt a message body with the session key.
    pub async fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        self.with_key(|key| aead::encrypt(key, plaintext.as_bytes()))
            .await?
    }

    /// Decrypt a stored envelope with the session key.
    pub async fn decrypt(&self, encoded: &str) -> Result<String, CryptoError> {
        self.with_key(|key| aead::decrypt(key, encoded)).await?
    }
}

impl Default for Vault {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> SessionKey {
        SessionKey::from_bytes([0x11; 32])
    }

    #[tokio::test]
    async fn test_new_vault_is_locked() {
        let vault = Vault::new();
        assert_eq!(vault.state().await, VaultState::Locked);
        assert!(matches!(
            vault.encrypt("hi").await,
            Err(CryptoError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_unlock_lifecycle() {
        let vault = Vault::new();

        vault.begin_unlock().await;
        assert_eq!(vault.state().await, VaultState::Unlocking);
        assert!(vault.is_locked().await);

        vault.install(test_key()).await;
        assert_eq!(vault.state().await, VaultState::Unlocked);

        let encoded = vault.encrypt("hello").await.unwrap();
        assert_eq!(vault.decrypt(&encoded).await.unwrap(), "hello");

        vault.lock().await;
        assert_eq!(vault.state().await, VaultState::Locked);
        assert!(matches!(
            vault.decrypt(&encoded).await,
            Err(CryptoError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let vault = Vault::new();
        let clone = vault.clone();

        vault.install(test_key()).await;
        assert!(!clone.is_locked().await);

        clone.lock().await;
        assert!(vault.is_locked().await);
    }
}
