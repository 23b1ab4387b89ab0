//! Authenticated encryption of message bodies.
//!
//! Every call to [`encrypt`] draws a fresh random 192-bit nonce, so nonces
//! never repeat under one key in practice. The stored form is text:
//!
//! ```text
//! base64( nonce (24B) ‖ ciphertext ‖ Poly1305 tag (16B) )
//! ```

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};

use crate::error::CryptoError;
use crate::key::SessionKey;
use crate::random::random_nonce;
use crate::{TAG_SIZE, XCHACHA_NONCE_SIZE};

/// Smallest decoded envelope: an empty plaintext still carries nonce and tag.
const MIN_ENVELOPE_SIZE: usize = XCHACHA_NONCE_SIZE + TAG_SIZE;

fn cipher(key: &SessionKey) -> Result<XChaCha20Poly1305, CryptoError> {
    XChaCha20Poly1305::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::InvalidKeyLength {
        expected: crate::XCHACHA_KEY_SIZE,
        actual: key.as_bytes().len(),
    })
}

/// Encrypt `plaintext` and return the base64 envelope.
///
/// # Errors
///
/// Returns [`CryptoError::RandomFailed`] if no nonce could be drawn and
/// [`CryptoError::EncryptionFailed`] if the cipher rejects the input.
pub fn encrypt(key: &SessionKey, plaintext: &[u8]) -> Result<String, CryptoError> {
    let nonce = random_nonce()?;
    let ciphertext = cipher(key)?
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut envelope = Vec::with_capacity(XCHACHA_NONCE_SIZE + ciphertext.len());
    envelope.extend_from_slice(&nonce);
    envelope.extend_from_slice(&ciphertext);

    Ok(STANDARD.encode(envelope))
}

/// Verify and decrypt a base64 envelope produced by [`encrypt`].
///
/// # Errors
///
/// - [`CryptoError::Decode`] if `encoded` is not valid base64
/// - [`CryptoError::ShortCiphertext`] if it cannot contain a nonce and tag
/// - [`CryptoError::Authentication`] on tampering, truncation or a wrong key
/// - [`CryptoError::InvalidUtf8`] if the authenticated plaintext is not text
pub fn decrypt(key: &SessionKey, encoded: &str) -> Result<String, CryptoError> {
    let envelope = STANDARD
        .decode(encoded)
        .map_err(|e| CryptoError::Decode(e.to_string()))?;

    if envelope.len() < MIN_ENVELOPE_SIZE {
        return Err(CryptoError::ShortCiphertext {
            expected: MIN_ENVELOPE_SIZE,
            actual: envelope.len(),
        });
    }

    let (nonce, ciphertext) = envelope.split_at(XCHACHA_NONCE_SIZE);
    let plaintext = cipher(key)?
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Authentication)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> SessionKey {
        SessionKey::from_bytes([0x42; 32])
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = test_key();
        let encoded = encrypt(&key, b"hello").unwrap();
        assert_eq!(decrypt(&key, &encoded).unwrap(), "hello");
    }

    #[test]
    fn test_empty_plaintext() {
        let key = test_key();
        let encoded = encrypt(&key, b"").unwrap();
        let decoded = STANDARD.decode(&encoded).unwrap();
        assert_eq!(decoded.len(), MIN_ENVELOPE_SIZE);
        assert_eq!(decrypt(&key, &encoded).unwrap(), "");
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let key = test_key();
        let a = encrypt(&key, b"same").unwrap();
        let b = encrypt(&key, b"same").unwrap();
        assert_ne!(a, b);

        let a = STANDARD.decode(a).unwrap();
        let b = STANDARD.decode(b).unwrap();
        assert_ne!(a[..XCHACHA_NONCE_SIZE], b[..XCHACHA_NONCE_SIZE]);
    }

    #[test]
    fn test_wrong_key_fails() {
        let encoded = encrypt(&test_key(), b"secret").unwrap();
        let other = SessionKey::from_bytes([0x43; 32]);
        let err = decrypt(&other, &encoded).unwrap_err();
        assert!(err.is_authentication_failure());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = test_key();
        let encoded = encrypt(&key, b"tamper-test").unwrap();
        let mut bytes = STANDARD.decode(&encoded).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;

        let err = decrypt(&key, &STANDARD.encode(&bytes)).unwrap_err();
        assert!(matches!(err, CryptoError::Authentication));
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let key = test_key();
        let encoded = encrypt(&key, b"a longer message body").unwrap();
        let bytes = STANDARD.decode(&encoded).unwrap();
        let truncated = STANDARD.encode(&bytes[..bytes.len() - 4]);

        let err = decrypt(&key, &truncated).unwrap_err();
        assert!(err.is_authentication_failure());
    }

    #[test]
    fn test_invalid_base64() {
        let err = decrypt(&test_key(), "not base64 !!").unwrap_err();
        assert!(matches!(err, CryptoError::Decode(_)));
    }

    #[test]
    fn test_short_ciphertext() {
        let err = decrypt(&test_key(), &STANDARD.encode([0u8; 10])).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::ShortCiphertext {
                expected: 40,
                actual: 10
            }
        ));
    }

    #[test]
    fn test_non_utf8_plaintext() {
        let key = test_key();
        let encoded = encrypt(&key, &[0xff, 0xfe, 0xfd]).unwrap();
        assert!(matches!(
            decrypt(&key, &encoded),
            Err(CryptoError::InvalidUtf8)
        ));
    }
}
