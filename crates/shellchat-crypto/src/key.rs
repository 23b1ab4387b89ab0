//! Memory-resident session key.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{CryptoError, XCHACHA_KEY_SIZE};

/// 32-byte symmetric key derived from the user's password.
///
/// Never persisted. The bytes are wiped when the key is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey {
    bytes: [u8; XCHACHA_KEY_SIZE],
}

impl SessionKey {
    /// Wrap raw key bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; XCHACHA_KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Build a key from a slice, checking its length.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] if `slice` is not 32 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; XCHACHA_KEY_SIZE] =
            slice.try_into().map_err(|_| CryptoError::InvalidKeyLength {
                expected: XCHACHA_KEY_SIZE,
                actual: slice.len(),
            })?;
        Ok(Self { bytes })
    }

    /// Raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; XCHACHA_KEY_SIZE] {
        &self.bytes
    }
}

impl PartialEq for SessionKey {
    fn eq(&self, other: &Self) -> bool {
        // Non-short-circuiting comparison
        self.bytes
            .iter()
            .zip(other.bytes.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl Eq for SessionKey {}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_slice_checks_length() {
        assert!(SessionKey::from_slice(&[0u8; 32]).is_ok());

        let err = SessionKey::from_slice(&[0u8; 16]).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 16
            }
        ));
    }

    #[test]
    fn test_debug_redacts_bytes() {
        let key = SessionKey::from_bytes([0x42; 32]);
        assert_eq!(format!("{key:?}"), "SessionKey([REDACTED])");
    }

    #[test]
    fn test_equality() {
        let a = SessionKey::from_bytes([1; 32]);
        let b = SessionKey::from_bytes([1; 32]);
        let c = SessionKey::from_bytes([2; 32]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
