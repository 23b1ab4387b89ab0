//! # Password-Based Key Derivation
//!
//! Turns the user's password and the per-store salt into a [`SessionKey`].
//!
//! ## Security Properties
//!
//! - **Algorithm:** Argon2id, version 0x13
//! - **Cost:** 1 pass over 64 MiB with 4 lanes by default
//! - **Determinism:** the same `(password, salt)` always yields the same key
//!
//! No verifier is stored. A wrong password produces a well-formed but wrong
//! key, which only shows up later as authentication failures on stored rows.
//!
//! ## Usage
//!
//! ```rust
//! use shellchat_crypto::kdf::{KdfParams, derive_key, generate_salt};
//!
//! let salt = generate_salt().expect("os rng");
//! let key = derive_key(b"correct-horse", &salt, &KdfParams::low_security())
//!     .expect("derivation failed");
//! assert_eq!(key.as_bytes().len(), 32);
//! ```

use argon2::{Algorithm, Argon2, Params, ParamsBuilder, Version};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::key::SessionKey;
use crate::random::fill_random;
use crate::{SALT_SIZE, XCHACHA_KEY_SIZE};

/// Parameters for Argon2id key derivation.
///
/// Defaults:
/// - Memory: 64 MiB (65536 KiB)
/// - Iterations: 1
/// - Parallelism: 4
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub memory_cost_kib: u32,
    /// Number of passes (default: 1)
    pub iterations: u32,
    /// Degree of parallelism (default: 4)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_cost_kib: 65536, // 64 MiB
            iterations: 1,
            parallelism: 4,
        }
    }
}

impl KdfParams {
    /// Low-cost parameters for tests.
    ///
    /// **Warning:** Only use for testing. Keys derived with these parameters
    /// do not match keys derived with the defaults.
    #[must_use]
    pub fn low_security() -> Self {
        Self {
            memory_cost_kib: 1024, // 1 MiB
            iterations: 1,
            parallelism: 1,
        }
    }

    /// Validate parameters are within acceptable bounds.
    pub fn validate(&self) -> Result<(), CryptoError> {
        // Argon2 requires at least 8 KiB per lane
        if self.memory_cost_kib < 8 * self.parallelism.max(1) {
            return Err(CryptoError::InvalidParameter(
                "memory_cost_kib must be at least 8 KiB per lane".into(),
            ));
        }

        if self.iterations < 1 {
            return Err(CryptoError::InvalidParameter(
                "iterations must be at least 1".into(),
            ));
        }

        if self.parallelism < 1 || self.parallelism > 255 {
            return Err(CryptoError::InvalidParameter(
                "parallelism must be between 1 and 255".into(),
            ));
        }

        Ok(())
    }

    fn build_argon2_params(&self) -> Result<Params, CryptoError> {
        self.validate()?;

        ParamsBuilder::new()
            .m_cost(self.memory_cost_kib)
            .t_cost(self.iterations)
            .p_cost(self.parallelism)
            .output_len(XCHACHA_KEY_SIZE)
            .build()
            .map_err(|e| CryptoError::InvalidParameter(format!("Argon2 params: {e}")))
    }
}

/// Derive the 32-byte session key from a password and salt.
///
/// This is CPU and memory heavy (64 MiB with default parameters); async
/// callers should run it on a blocking thread.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidParameter`] for out-of-range parameters and
/// [`CryptoError::KeyDerivationFailed`] if Argon2 rejects the inputs (for
/// example a salt shorter than 8 bytes).
pub fn derive_key(
    password: &[u8],
    salt: &[u8],
    params: &KdfParams,
) -> Result<SessionKey, CryptoError> {
    let argon2_params = params.build_argon2_params()?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut derived_key = [0u8; XCHACHA_KEY_SIZE];
    let result = argon2
        .hash_password_into(password, salt, &mut derived_key)
        .map_err(|_| CryptoError::KeyDerivationFailed)
        .map(|()| SessionKey::from_bytes(derived_key));
    derived_key.zeroize();

    result
}

/// Generate a fresh random salt for a new store.
///
/// # Errors
///
/// Returns [`CryptoError::RandomFailed`] if the OS CSPRNG fails.
pub fn generate_salt() -> Result<[u8; SALT_SIZE], CryptoError> {
    let mut salt = [0u8; SALT_SIZE];
    fill_random(&mut salt)?;
    Ok(salt)
}
