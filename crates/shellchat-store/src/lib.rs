//! # Shellchat Store
//!
//! Durable, encrypted message log keyed by conversation peer.
//!
//! Messages live in a single SQLite database opened in WAL mode. Every
//! `content` column holds a base64 XChaCha20-Poly1305 envelope produced with
//! the session key held by the store's [`Vault`]. The key is derived from the
//! user's password and a random salt kept in the `metadata` table.
//!
//! ```text
//! open(path, password)
//!   ├─ create parent dir, open SQLite (WAL), create schema
//!   └─ Vault: Locked ─▶ Unlocking (salt + Argon2id) ─▶ Unlocked
//!                ▲                                      │
//!                └──────────── lock() / close() ────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod message;
pub mod paths;
pub mod schema;
pub mod store;
pub mod vault;

pub use error::{Result, StoreError};
pub use message::{DECRYPTION_FAILED_PREFIX, Message};
pub use paths::{default_path, destroy};
pub use store::MessageStore;
pub use vault::{Vault, VaultState};
