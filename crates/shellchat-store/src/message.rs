//! Message rows.

use shellchat_crypto::CryptoError;

/// Prefix of the content shown for rows that fail to decrypt.
pub const DECRYPTION_FAILED_PREFIX: &str = "[Decryption Failed";

/// A decrypted chat message as returned by [`MessageStore::get_recent`].
///
/// [`MessageStore::get_recent`]: crate::MessageStore::get_recent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Auto-incrementing row id
    pub id: i64,
    /// Conversation peer
    pub peer_id: String,
    /// Plaintext, or a decryption failure placeholder
    pub content: String,
    /// Seconds since the Unix epoch
    pub timestamp: i64,
    /// `true` for messages this node sent
    pub is_sent: bool,
}

impl Message {
    /// Whether `content` is a placeholder for an undecryptable row.
    #[must_use]
    pub fn decryption_failed(&self) -> bool {
        self.content.starts_with(DECRYPTION_FAILED_PREFIX)
    }
}

/// Placeholder text for a row whose envelope could not be opened.
pub(crate) fn failure_placeholder(err: &CryptoError) -> String {
    format!("{DECRYPTION_FAILED_PREFIX}: {err}]")
}

/// Raw row as stored: `content` is still the base64 envelope.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct MessageRow {
    pub id: i64,
    pub peer_id: String,
    pub content: String,
    pub timestamp: i64,
    pub is_sent: bool,
}

impl MessageRow {
    pub(crate) fn into_message(self, content: Result<String, CryptoError>) -> Message {
        Message {
            id: self.id,
            peer_id: self.peer_id,
            content: content.unwrap_or_else(|e| failure_placeholder(&e)),
            timestamp: self.timestamp,
            is_sent: self.is_sent,
        }
    }
}
