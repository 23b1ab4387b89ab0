//! # Shellchat Crypto
//!
//! At-rest cryptography for the shellchat message store.
//!
//! This crate provides:
//! - Password-based key derivation (Argon2id)
//! - Authenticated encryption of message bodies (XChaCha20-Poly1305)
//! - Secure random number generation
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Parameters |
//! |----------|-----------|------------|
//! | KDF | Argon2id v1.3 | 1 pass, 64 MiB, 4 lanes |
//! | AEAD | XChaCha20-Poly1305 | 256-bit key, 192-bit nonce |
//! | Encoding | Base64 (standard alphabet) | `nonce ‖ ciphertext ‖ tag` |
//!
//! Nothing here touches the network. Wire confidentiality is provided by the
//! transport's own channel encryption.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aead;
pub mod error;
pub mod kdf;
pub mod key;
pub mod random;

pub use aead::{decrypt, encrypt};
pub use error::CryptoError;
pub use kdf::{KdfParams, derive_key, generate_salt};
pub use key::SessionKey;

/// XChaCha20-Poly1305 key size
pub const XCHACHA_KEY_SIZE: usize = 32;

/// XChaCha20-Poly1305 nonce size
pub const XCHACHA_NONCE_SIZE: usize = 24;

/// Poly1305 authentication tag size
pub const TAG_SIZE: usize = 16;

/// Size of the per-store Argon2 salt
pub const SALT_SIZE: usize = 16;
