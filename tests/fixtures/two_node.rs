//! Two-node test fixture for integration testing
//!
//! Provides a pair of loopback hosts that can be connected to each other:
//! - Chat stream establishment
//! - Message exchange in both directions
//!
//! # Example
//!
//! ```no_run
//! use shellchat_integration_tests::fixtures::TwoNodeFixture;
//!
//! #[tokio::test]
//! async fn test_basic_exchange() {
//!     let mut fixture = TwoNodeFixture::new().await.unwrap();
//!     fixture.connect().await.unwrap();
//!
//!     let bob = fixture.bob.local_peer_id().to_string();
//!     fixture.alice.send(&bob, b"hello").await.unwrap();
//!     let message = fixture.recv_bob().await.unwrap();
//!
//!     fixture.cleanup().await;
//! }
//! ```

use std::future::Future;
use std::time::Duration;

use shellchat_core::{Host, HostConfig, HostError, InboundMessage, Multiaddr, PeerId};
use tokio::sync::mpsc::UnboundedReceiver;

/// Upper bound for anything a test waits on
pub const WAIT: Duration = Duration::from_secs(10);

/// Poll `condition` every 20ms until it holds or `WAIT` elapses.
///
/// Returns whether the condition held.
pub async fn wait_until<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// First address `host` listens on, once the listener is up.
///
/// # Errors
///
/// Returns [`HostError::Timeout`] if no listener comes up in time.
pub async fn wait_for_listen_addr(host: &Host) -> Result<Multiaddr, HostError> {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if let Some(addr) = host.listen_addrs().await?.into_iter().next() {
            return Ok(addr);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    Err(HostError::timeout("listen address"))
}

/// Two-node test fixture
///
/// Owns a pair of loopback hosts and their inbound receivers.
pub struct TwoNodeFixture {
    pub alice: Host,
    pub bob: Host,
    alice_inbound: UnboundedReceiver<InboundMessage>,
    bob_inbound: UnboundedReceiver<InboundMessage>,
}

impl TwoNodeFixture {
    /// Create two hosts with random identities on 127.0.0.1
    ///
    /// # Errors
    ///
    /// Returns an error if either host fails to start.
    pub async fn new() -> Result<Self, HostError> {
        let (alice, alice_inbound) = Host::create(HostConfig::local_only(), None)?;
        let (bob, bob_inbound) = Host::create(HostConfig::local_only(), None)?;

        Ok(Self {
            alice,
            bob,
            alice_inbound,
            bob_inbound,
        })
    }

    /// Alice dials Bob's listen address and both sides get a chat stream
    ///
    /// # Errors
    ///
    /// Returns an error if the dial or stream open fails, or a side never
    /// registers the stream.
    pub async fn connect(&self) -> Result<PeerId, HostError> {
        wait_for_listen_addr(&self.bob).await?;
        let target = self
            .bob
            .shareable_addrs()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| HostError::timeout("listen address"))?;
        let bob_id = self.alice.connect_addr(&target).await?;

        let alice_id = self.alice.local_peer_id().to_string();
        let bob_str = bob_id.to_string();
        let ready = wait_until(|| async {
            self.alice.has_stream(&bob_str).await && self.bob.has_stream(&alice_id).await
        })
        .await;

        if ready {
            Ok(bob_id)
        } else {
            Err(HostError::timeout("stream registration"))
        }
    }

    /// Next message Alice receives
    pub async fn recv_alice(&mut self) -> Option<InboundMessage> {
        tokio::time::timeout(WAIT, self.alice_inbound.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next message Bob receives
    pub async fn recv_bob(&mut self) -> Option<InboundMessage> {
        tokio::time::timeout(WAIT, self.bob_inbound.recv())
            .await
            .ok()
            .flatten()
    }

    /// Stop both hosts
    pub async fn cleanup(self) {
        self.alice.shutdown().await;
        self.bob.shutdown().await;
    }
}
