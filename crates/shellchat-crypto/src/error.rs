//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// No session key is resident (vault locked or never unlocked)
    #[error("session key not initialized")]
    NotInitialized,

    /// AEAD encryption failed
    #[error("encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (tampering, truncation or wrong key)
    #[error("decryption failed: authentication failure")]
    Authentication,

    /// Encoded ciphertext is not valid base64
    #[error("invalid ciphertext encoding: {0}")]
    Decode(String),

    /// Decoded ciphertext cannot hold a nonce and tag
    #[error("ciphertext too short: expected at least {expected} bytes, got {actual}")]
    ShortCiphertext {
        /// Minimum length (nonce + tag)
        expected: usize,
        /// Actual decoded length
        actual: usize,
    },

    /// Authenticated plaintext is not UTF-8
    #[error("decrypted plaintext is not valid UTF-8")]
    InvalidUtf8,

    /// Invalid key length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Key derivation failed
    #[error("key derivation failed")]
    KeyDerivationFailed,

    /// Random number generation failed
    #[error("random number generation failed")]
    RandomFailed,

    /// Invalid parameter
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl CryptoError {
    /// Whether the ciphertext was well-formed but failed verification.
    ///
    /// Malformed input (bad base64, short ciphertext) returns `false`.
    #[must_use]
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::Authentication)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_failure_classification() {
        assert!(CryptoError::Authentication.is_authentication_failure());
        assert!(!CryptoError::Decode("bad".into()).is_authentication_failure());
        assert!(
            !CryptoError::ShortCiphertext {
                expected: 40,
                actual: 3
            }
            .is_authentication_failure()
        );
        assert!(!CryptoError::NotInitialized.is_authentication_failure());
    }

    #[test]
    fn test_short_ciphertext_display() {
        let err = CryptoError::ShortCiphertext {
            expected: 40,
            actual: 12,
        };
        assert_eq!(
            err.to_string(),
            "ciphertext too short: expected at least 40 bytes, got 12"
        );
    }
}
