//! The slice of the host that discovery needs.

use async_trait::async_trait;
use libp2p::{Multiaddr, PeerId};
use shellchat_core::{DiscoveredPeer, Host, HostError};
use tokio::sync::mpsc;

/// Network operations used by the discovery loops.
#[async_trait]
pub trait DiscoveryNetwork: Send + Sync + 'static {
    /// This node's peer id
    fn local_peer_id(&self) -> PeerId;

    /// Whether a live connection to `peer` exists
    async fn is_connected(&self, peer: PeerId) -> bool;

    /// Dial `peer`, using `addrs` when given
    async fn dial(&self, peer: PeerId, addrs: Vec<Multiaddr>) -> Result<(), HostError>;

    /// Announce this node under `namespace`
    async fn advertise(&self, namespace: &str) -> Result<(), HostError>;

    /// Peers announced under `namespace`
    async fn find_providers(&self, namespace: &str) -> Result<Vec<PeerId>, HostError>;

    /// Addresses of `peer` from the DHT
    ///
    /// Empty for a peer that is already connected.
    async fn find_peer(&self, peer: PeerId) -> Result<Vec<Multiaddr>, HostError>;

    /// Claim the receiver of local network announcements
    async fn take_local_discoveries(&self) -> Option<mpsc::UnboundedReceiver<DiscoveredPeer>>;
}

#[async_trait]
impl DiscoveryNetwork for Host {
    fn local_peer_id(&self) -> PeerId {
        Host::local_peer_id(self)
    }

    async fn is_connected(&self, peer: PeerId) -> bool {
        Host::is_connected(self, peer).await
    }

    async fn dial(&self, peer: PeerId, addrs: Vec<Multiaddr>) -> Result<(), HostError> {
        Host::dial(self, peer, addrs).await
    }

    async fn advertise(&self, namespace: &str) -> Result<(), HostError> {
        Host::advertise(self, namespace).await
    }

    async fn find_providers(&self, namespace: &str) -> Result<Vec<PeerId>, HostError> {
        Host::find_providers(self, namespace).await
    }

    async fn find_peer(&self, peer: PeerId) -> Result<Vec<Multiaddr>, HostError> {
        Host::find_peer(self, peer).await
    }

    async fn take_local_discoveries(&self) -> Option<mpsc::UnboundedReceiver<DiscoveredPeer>> {
        Host::take_local_discoveries(self).await
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// In-memory network recording every call.
    pub(crate) struct MockNetwork {
        pub local: PeerId,
        pub connected: Mutex<HashSet<PeerId>>,
        pub unreachable: HashSet<PeerId>,
        pub providers: Vec<PeerId>,
        /// What `find_peer` resolves; peers missing here are not in the DHT
        pub addresses: HashMap<PeerId, Vec<Multiaddr>>,
        pub dial_delay: Option<Duration>,
        pub fail_advertise: AtomicUsize,
        pub fail_lookup: bool,
        pub dials: Mutex<Vec<(PeerId, Vec<Multiaddr>)>>,
        pub advertisements: AtomicUsize,
        pub lookups: AtomicUsize,
        pub resolutions: AtomicUsize,
        pub announcements: Mutex<Option<mpsc::UnboundedReceiver<DiscoveredPeer>>>,
    }

    impl MockNetwork {
        pub(crate) fn new() -> Self {
            Self {
                local: PeerId::random(),
                connected: Mutex::new(HashSet::new()),
                unreachable: HashSet::new(),
                providers: Vec::new(),
                addresses: HashMap::new(),
                dial_delay: None,
                fail_advertise: AtomicUsize::new(0),
                fail_lookup: false,
                dials: Mutex::new(Vec::new()),
                advertisements: AtomicUsize::new(0),
                lookups: AtomicUsize::new(0),
                resolutions: AtomicUsize::new(0),
                announcements: Mutex::new(None),
            }
        }

        pub(crate) fn dial_count(&self, peer: &PeerId) -> usize {
            self.dials
                .lock()
                .unwrap()
                .iter()
                .filter(|(p, _)| p == peer)
                .count()
        }

        /// Addresses of the last dial to `peer`
        pub(crate) fn dialed_addrs(&self, peer: &PeerId) -> Option<Vec<Multiaddr>> {
            self.dials
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(p, _)| p == peer)
                .map(|(_, addrs)| addrs.clone())
        }
    }

    #[async_trait]
    impl DiscoveryNetwork for MockNetwork {
        fn local_peer_id(&self) -> PeerId {
            self.local
        }

        async fn is_connected(&self, peer: PeerId) -> bool {
            self.connected.lock().unwrap().contains(&peer)
        }

        async fn dial(&self, peer: PeerId, addrs: Vec<Multiaddr>) -> Result<(), HostError> {
            let no_addresses = addrs.is_empty();
            self.dials.lock().unwrap().push((peer, addrs));
            if let Some(delay) = self.dial_delay {
                tokio::time::sleep(delay).await;
            }
            // Like the swarm: nothing to dial without an address
            if no_addresses {
                return Err(HostError::Dial("no addresses for peer".into()));
            }
            if self.unreachable.contains(&peer) {
                return Err(HostError::Dial("connection refused".into()));
            }
            self.connected.lock().unwrap().insert(peer);
            Ok(())
        }

        async fn advertise(&self, _namespace: &str) -> Result<(), HostError> {
            self.advertisements.fetch_add(1, Ordering::SeqCst);
            let remaining = self.fail_advertise.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_advertise.store(remaining - 1, Ordering::SeqCst);
                return Err(HostError::Dht("no peers in routing table".into()));
            }
            Ok(())
        }

        async fn find_providers(&self, _namespace: &str) -> Result<Vec<PeerId>, HostError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.fail_lookup {
                return Err(HostError::Dht("lookup failed".into()));
            }
            Ok(self.providers.clone())
        }

        async fn find_peer(&self, peer: PeerId) -> Result<Vec<Multiaddr>, HostError> {
            self.resolutions.fetch_add(1, Ordering::SeqCst);
            if self.connected.lock().unwrap().contains(&peer) {
                return Ok(Vec::new());
            }
            self.addresses
                .get(&peer)
                .cloned()
                .ok_or_else(|| HostError::PeerNotFound(peer.to_string()))
        }

        async fn take_local_discoveries(
            &self,
        ) -> Option<mpsc::UnboundedReceiver<DiscoveredPeer>> {
            self.announcements.lock().unwrap().take()
        }
    }
}
