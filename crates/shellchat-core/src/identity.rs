//! Node identity.
//!
//! Each run of the node gets a fresh Ed25519 keypair. The keypair is never
//! written to disk; the derived [`PeerId`] is the node's network address for
//! the lifetime of the process.

use std::borrow::Cow;

use libp2p::PeerId;
use libp2p::identity::Keypair;
use rand_core::RngCore;

use crate::error::{HostError, Result};

/// Ed25519 secret seed size
const SEED_SIZE: usize = 32;

/// Generate the node keypair.
///
/// With `randomness` set, the 32-byte Ed25519 seed is drawn from it, so a
/// seeded RNG yields a reproducible identity (tests). Otherwise the OS
/// CSPRNG is used.
///
/// # Examples
///
/// ```
/// use rand::SeedableRng;
/// use shellchat_core::identity::generate_keypair;
///
/// let mut rng = rand::rngs::StdRng::seed_from_u64(7);
/// let a = generate_keypair(Some(&mut rng)).unwrap();
/// let mut rng = rand::rngs::StdRng::seed_from_u64(7);
/// let b = generate_keypair(Some(&mut rng)).unwrap();
/// assert_eq!(a.public().to_peer_id(), b.public().to_peer_id());
/// ```
///
/// # Errors
///
/// Returns [`HostError::Identity`] if the injected RNG fails or the seed is
/// rejected.
pub fn generate_keypair(randomness: Option<&mut dyn RngCore>) -> Result<Keypair> {
    let Some(rng) = randomness else {
        return Ok(Keypair::generate_ed25519());
    };

    let mut seed = [0u8; SEED_SIZE];
    rng.try_fill_bytes(&mut seed)
        .map_err(|e| HostError::Identity(Cow::Owned(format!("randomness source: {e}"))))?;

    // Zeroizes `seed` in place
    Keypair::ed25519_from_bytes(&mut seed)
        .map_err(|e| HostError::Identity(Cow::Owned(format!("invalid seed: {e}"))))
}

/// Short human-readable form of a peer id (last 8 characters).
#[must_use]
pub fn short_id(peer_id: &PeerId) -> String {
    let full = peer_id.to_base58();
    let start = full.len().saturating_sub(8);
    full[start..].to_string()
}
