//! Error types for the host.
//!
//! Errors are split the way failures are handled: identity and listen
//! failures abort [`Host::create`](crate::Host::create); dial, lookup and
//! timeout failures are transient and left to discovery's retry loop;
//! send-side failures are surfaced to the caller as-is.

use std::borrow::Cow;

use thiserror::Error;

/// Errors that can occur in host operations
#[derive(Debug, Error, Clone)]
pub enum HostError {
    // ============ Identity Errors ============
    /// Keypair generation failed
    #[error("identity error: {0}")]
    Identity(Cow<'static, str>),

    /// Transport or behaviour construction failed
    #[error("transport setup failed: {0}")]
    Transport(Cow<'static, str>),

    /// Binding a listen address failed
    #[error("failed to listen on {addr}: {reason}")]
    Listen {
        /// Address that could not be bound
        addr: String,
        /// Underlying reason
        reason: String,
    },

    // ============ Connection Errors ============
    /// No open chat stream to this peer
    #[error("peer not connected: {0}")]
    PeerNotConnected(String),

    /// Outbound connection attempt failed
    #[error("dial failed: {0}")]
    Dial(Cow<'static, str>),

    /// Operation exceeded its deadline
    #[error("operation timed out: {0}")]
    Timeout(Cow<'static, str>),

    /// Address or peer id could not be parsed
    #[error("invalid address: {0}")]
    InvalidAddress(Cow<'static, str>),

    /// DHT lookup found no addresses for the peer
    #[error("peer not found: {0}")]
    PeerNotFound(String),

    /// DHT query failed
    #[error("DHT error: {0}")]
    Dht(Cow<'static, str>),

    // ============ Stream Errors ============
    /// Opening a chat stream failed
    #[error("failed to open stream: {0}")]
    StreamOpen(Cow<'static, str>),

    /// Writing to a chat stream failed
    #[error("write failed: {0}")]
    Write(String),

    /// Payload exceeds the frame size limit
    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge {
        /// Payload length
        len: usize,
        /// Maximum allowed payload length
        max: usize,
    },

    // ============ Lifecycle Errors ============
    /// The swarm driver is no longer running
    #[error("host is shut down")]
    Shutdown,
}

impl HostError {
    /// Returns true if a later attempt may succeed without intervention
    ///
    /// Transient errors include dial failures, timeouts, DHT failures and
    /// sends to peers whose stream is not (yet) open.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HostError::Dial(_)
                | HostError::Timeout(_)
                | HostError::Dht(_)
                | HostError::PeerNotFound(_)
                | HostError::PeerNotConnected(_)
                | HostError::StreamOpen(_)
        )
    }

    /// Create a timeout error with a static context
    pub const fn timeout(context: &'static str) -> Self {
        HostError::Timeout(Cow::Borrowed(context))
    }

    /// Create a transport error with a static context
    pub const fn transport(context: &'static str) -> Self {
        HostError::Transport(Cow::Borrowed(context))
    }
}

/// Result type for host operations
pub type Result<T> = std::result::Result<T, HostError>;
