//! The message store handle.

use std::path::{Path, PathBuf};
use std::time::Duration;

use shellchat_crypto::{CryptoError, KdfParams, aead, derive_key, generate_salt};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use zeroize::Zeroizing;

use crate::error::{Result, StoreError};
use crate::message::{Message, MessageRow};
use crate::paths::ensure_parent_dir;
use crate::schema::{self, SALT_KEY};
use crate::vault::{Vault, VaultState};

/// Connections in the pool. WAL allows concurrent readers next to one writer.
const MAX_CONNECTIONS: u32 = 4;

/// How long a writer waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Encrypted message log. Cheap to clone; clones share the pool and vault.
#[derive(Clone)]
pub struct MessageStore {
    pool: SqlitePool,
    vault: Vault,
    path: PathBuf,
}

impl MessageStore {
    /// Open (or create) the store at `path` and unlock it with `password`.
    ///
    /// The password is not validated: a wrong password yields a usable store
    /// whose existing rows read back as decryption failures.
    pub async fn open(path: impl AsRef<Path>, password: &str) -> Result<Self> {
        Self::open_with_params(path, password, KdfParams::default()).await
    }

    /// Like [`open`](Self::open) with explicit key derivation parameters.
    pub async fn open_with_params(
        path: impl AsRef<Path>,
        password: &str,
        kdf: KdfParams,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        ensure_parent_dir(&path).await?;

        // journal_mode is set per connection, outside any transaction
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        schema::create(&pool).await?;

        let store = Self {
            pool,
            vault: Vault::new(),
            path,
        };
        store.unlock(password, kdf).await?;

        tracing::info!(path = %store.path.display(), "message store opened");
        Ok(store)
    }

    /// Locked → Unlocking → Unlocked. Falls back to Locked on failure.
    async fn unlock(&self, password: &str, kdf: KdfParams) -> Result<()> {
        self.vault.begin_unlock().await;

        match self.derive_session_key(password, kdf).await {
            Ok(key) => {
                self.vault.install(key).await;
                Ok(())
            }
            Err(e) => {
                self.vault.lock().await;
                Err(e)
            }
        }
    }

    async fn derive_session_key(
        &self,
        password: &str,
        kdf: KdfParams,
    ) -> Result<shellchat_crypto::SessionKey> {
        let salt = self.load_or_create_salt().await?;
        let password = Zeroizing::new(password.as_bytes().to_vec());

        // Argon2id with 64 MiB is too heavy for an async worker
        let key = tokio::task::spawn_blocking(move || derive_key(&password, &salt, &kdf))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;
        Ok(key)
    }

    /// Read the stored salt, generating and persisting one on first use.
    async fn load_or_create_salt(&self) -> Result<Vec<u8>> {
        if let Some(salt) = self.read_salt().await? {
            return Ok(salt);
        }

        let fresh = generate_salt()?;
        // OR IGNORE: a concurrent opener may have won the race
        sqlx::query("INSERT OR IGNORE INTO metadata (key, value) VALUES (?, ?)")
            .bind(SALT_KEY)
            .bind(&fresh[..])
            .execute(&self.pool)
            .await?;
        tracing::debug!("generated new vault salt");

        self.read_salt()
            .await?
            .ok_or_else(|| StoreError::Database(sqlx::Error::RowNotFound))
    }

    async fn read_salt(&self) -> Result<Option<Vec<u8>>> {
        let salt = sqlx::query_scalar::<_, Vec<u8>>("SELECT value FROM metadata WHERE key = ?")
            .bind(SALT_KEY)
            .fetch_optional(&self.pool)
            .await?;
        Ok(salt)
    }

    /// Encrypt `plaintext` and append it to `peer_id`'s history.
    ///
    /// Returns the new row id.
    pub async fn save(
        &self,
        peer_id: &str,
        plaintext: &str,
        timestamp: i64,
        is_sent: bool,
    ) -> Result<i64> {
        let content = self.vault.encrypt(plaintext).await?;

        let id = sqlx::query(
            "INSERT INTO messages (peer_id, content, timestamp, is_sent) VALUES (?, ?, ?, ?)",
        )
        .bind(peer_id)
        .bind(content)
        .bind(timestamp)
        .bind(is_sent)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(id)
    }

    /// The `limit` most recent messages for `peer_id`, oldest first.
    ///
    /// Rows that fail to decrypt are returned with a placeholder content
    /// instead of failing the query.
    pub async fn get_recent(&self, peer_id: &str, limit: u32) -> Result<Vec<Message>> {
        let mut rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, peer_id, content, timestamp, is_sent FROM messages
             WHERE peer_id = ?
             ORDER BY timestamp DESC, id DESC
             LIMIT ?",
        )
        .bind(peer_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        // Newest-first from SQL, display order is oldest-first
        rows.reverse();

        let decrypted = self
            .vault
            .with_key(|key| {
                rows.iter()
                    .map(|row| aead::decrypt(key, &row.content))
                    .collect::<Vec<_>>()
            })
            .await
            .unwrap_or_else(|_| {
                rows.iter()
                    .map(|_| Err(CryptoError::NotInitialized))
                    .collect()
            });

        let failed = decrypted.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            tracing::warn!(peer_id, failed, "some messages could not be decrypted");
        }

        Ok(rows
            .into_iter()
            .zip(decrypted)
            .map(|(row, content)| row.into_message(content))
            .collect())
    }

    /// Delete every message. The salt survives, so the same password keeps
    /// unlocking the (now empty) history.
    ///
    /// Returns the number of deleted rows.
    pub async fn clear_all(&self) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM messages")
            .execute(&self.pool)
            .await?
            .rows_affected();
        tracing::info!(deleted, "message history cleared");
        Ok(deleted)
    }

    /// Drop and zeroize the session key.
    pub async fn lock(&self) {
        self.vault.lock().await;
    }

    /// Current vault state.
    pub async fn vault_state(&self) -> VaultState {
        self.vault.state().await
    }

    /// Database file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lock the vault and close the connection pool.
    pub async fn close(self) {
        self.vault.lock().await;
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_store(dir: &Path, password: &str) -> MessageStore {
        MessageStore::open_with_params(dir.join("chat.db"), password, KdfParams::low_security())
            .await
            .unwrap()
    }

    fn contents(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.content.as_str()).collect()
    }

    #[tokio::test]
    async fn test_save_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "correct-horse").await;
        assert_eq!(store.vault_state().await, VaultState::Unlocked);

        store.save("peerA", "hello", 1000, true).await.unwrap();

        let messages = store.get_recent("peerA", 50).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].peer_id, "peerA");
        assert_eq!(messages[0].content, "hello");
        assert_eq!(messages[0].timestamp, 1000);
        assert!(messages[0].is_sent);
    }

    #[tokio::test]
    async fn test_content_is_encrypted_at_rest() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "correct-horse").await;
        store.save("peerA", "hello", 1000, true).await.unwrap();

        let raw: String = sqlx::query_scalar("SELECT content FROM messages")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_ne!(raw, "hello");
        assert!(!raw.contains("hello"));
    }

    #[tokio::test]
    async fn test_recent_is_ascending_by_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "pw").await;

        store.save("peerA", "a", 1, false).await.unwrap();
        store.save("peerA", "b", 3, true).await.unwrap();
        store.save("peerA", "c", 2, false).await.unwrap();

        let messages = store.get_recent("peerA", 50).await.unwrap();
        assert_eq!(contents(&messages), vec!["a", "c", "b"]);
    }

    #[tokio::test]
    async fn test_limit_keeps_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "pw").await;

        for ts in 1..=5 {
            store
                .save("peerA", &format!("m{ts}"), ts, true)
                .await
                .unwrap();
        }

        let messages = store.get_recent("peerA", 2).await.unwrap();
        assert_eq!(contents(&messages), vec!["m4", "m5"]);
    }

    #[tokio::test]
    async fn test_peers_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "pw").await;

        store.save("peerA", "for a", 1, true).await.unwrap();
        store.save("peerB", "for b", 2, false).await.unwrap();

        let a = store.get_recent("peerA", 50).await.unwrap();
        assert_eq!(contents(&a), vec!["for a"]);
        assert!(store.get_recent("peerC", 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_password_yields_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "correct-horse").await;
        store.save("peerA", "hello", 1000, true).await.unwrap();
        store.close().await;

        let reopened = open_store(dir.path(), "wrong-pass").await;
        let messages = reopened.get_recent("peerA", 50).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].decryption_failed());
        assert_ne!(messages[0].content, "hello");
    }

    #[tokio::test]
    async fn test_salt_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "pw").await;
        let salt = store.read_salt().await.unwrap().unwrap();
        assert_eq!(salt.len(), shellchat_crypto::SALT_SIZE);
        store.save("peerA", "kept", 1, true).await.unwrap();
        store.close().await;

        let reopened = open_store(dir.path(), "pw").await;
        assert_eq!(reopened.read_salt().await.unwrap().unwrap(), salt);
        let messages = reopened.get_recent("peerA", 50).await.unwrap();
        assert_eq!(contents(&messages), vec!["kept"]);
    }

    #[tokio::test]
    async fn test_clear_all_keeps_salt() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "pw").await;
        store.save("peerA", "x", 1, true).await.unwrap();
        store.save("peerB", "y", 2, true).await.unwrap();

        assert_eq!(store.clear_all().await.unwrap(), 2);
        assert!(store.get_recent("peerA", 50).await.unwrap().is_empty());
        assert!(store.get_recent("peerB", 50).await.unwrap().is_empty());
        store.close().await;

        let reopened = open_store(dir.path(), "pw").await;
        reopened.save("peerA", "after", 3, true).await.unwrap();
        let messages = reopened.get_recent("peerA", 50).await.unwrap();
        assert_eq!(contents(&messages), vec!["after"]);
    }

    #[tokio::test]
    async fn test_lock_blocks_crypto() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "pw").await;
        store.save("peerA", "before", 1, true).await.unwrap();

        store.lock().await;
        assert_eq!(store.vault_state().await, VaultState::Locked);

        let err = store.save("peerA", "after", 2, true).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Crypto(CryptoError::NotInitialized)
        ));

        let messages = store.get_recent("peerA", 50).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].decryption_failed());
    }

    #[tokio::test]
    async fn test_concurrent_saves() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "pw").await;

        let mut handles = Vec::new();
        for i in 0..16i64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.save("peerA", &format!("m{i}"), i, i % 2 == 0).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let messages = store.get_recent("peerA", 100).await.unwrap();
        assert_eq!(messages.len(), 16);
        assert!(messages.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_open_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("chat.db");
        let store = MessageStore::open_with_params(&path, "pw", KdfParams::low_security())
            .await
            .unwrap();
        assert_eq!(store.path(), path.as_path());
        assert!(path.exists());
    }
}
