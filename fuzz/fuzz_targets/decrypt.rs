//! Fuzz target for message envelope decryption
//!
//! Tests that decoding and decrypting stored content handles arbitrary
//! input without panicking.

#![no_main]

use arbitrary::Arbitrary;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use libfuzzer_sys::fuzz_target;
use shellchat_crypto::{SessionKey, decrypt, encrypt};

#[derive(Debug, Arbitrary)]
enum Input<'a> {
    /// Arbitrary text in the content column
    Text(&'a str),
    /// Well-formed base64 of arbitrary bytes
    Envelope(&'a [u8]),
    /// A real envelope with one byte changed
    Tampered {
        plaintext: &'a str,
        index: usize,
        xor: u8,
    },
}

fuzz_target!(|input: Input<'_>| {
    let key = SessionKey::from_bytes([7u8; 32]);

    match input {
        Input::Text(text) => {
            let _ = decrypt(&key, text);
        }
        Input::Envelope(bytes) => {
            let _ = decrypt(&key, &STANDARD.encode(bytes));
        }
        Input::Tampered {
            plaintext,
            index,
            xor,
        } => {
            let encoded = encrypt(&key, plaintext.as_bytes()).unwrap();
            let mut raw = STANDARD.decode(&encoded).unwrap();
            let i = index % raw.len();
            raw[i] ^= xor;

            let result = decrypt(&key, &STANDARD.encode(&raw));
            if xor == 0 {
                assert_eq!(result.unwrap(), plaintext);
            } else {
                assert!(result.is_err());
            }
        }
    }
});
