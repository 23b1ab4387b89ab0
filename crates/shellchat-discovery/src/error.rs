//! Discovery error types.

use shellchat_core::HostError;
use thiserror::Error;

/// Discovery errors
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Dialing a discovered peer failed
    #[error("Dial failed: {0}")]
    Dial(#[source] HostError),

    /// Rendezvous advertise or lookup failed
    #[error("DHT operation failed: {0}")]
    Dht(#[source] HostError),

    /// An operation missed its deadline
    #[error("Timed out: {0}")]
    Timeout(&'static str),

    /// `start` was called on a running manager
    #[error("Discovery already running")]
    AlreadyRunning,

    /// The host's mDNS event receiver was already taken
    #[error("Local discovery events already claimed")]
    LocalEventsClaimed,
}
