//! Database schema.

use sqlx::SqlitePool;

use crate::error::Result;

/// Metadata key holding the Argon2 salt.
pub const SALT_KEY: &str = "salt";

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        peer_id TEXT NOT NULL,
        content TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        is_sent BOOLEAN NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_messages_peer_id ON messages (peer_id)",
    "CREATE INDEX IF NOT EXISTS idx_messages_peer_timestamp ON messages (peer_id, timestamp)",
    "CREATE TABLE IF NOT EXISTS metadata (
        key TEXT PRIMARY KEY,
        value BLOB NOT NULL
    )",
];

/// Create tables and indexes if they do not exist yet.
pub async fn create(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
