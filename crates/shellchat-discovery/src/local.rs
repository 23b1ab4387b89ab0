//! Local network discovery.
//!
//! Consumes the host's mDNS announcements and dials every new peer.

use std::sync::Arc;
use std::time::Duration;

use shellchat_core::{DiscoveredPeer, HostError};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::MDNS_SERVICE_TAG;
use crate::network::DiscoveryNetwork;

/// What handling one announcement did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerFoundOutcome {
    /// The announcement was our own
    SelfAnnouncement,
    /// A connection already existed, nothing dialed
    AlreadyConnected,
    /// Dial succeeded
    Dialed,
    /// Dial failed
    DialFailed,
    /// Dial missed its deadline
    TimedOut,
}

/// Handle one mDNS announcement.
///
/// Ignores ourselves and peers we are already connected to, so repeated
/// announcements of a connected peer never cause a second dial. Failures
/// are logged and otherwise dropped.
pub async fn handle_peer_found<N>(
    network: &N,
    peer: DiscoveredPeer,
    dial_timeout: Duration,
) -> PeerFoundOutcome
where
    N: DiscoveryNetwork + ?Sized,
{
    if peer.peer_id == network.local_peer_id() {
        return PeerFoundOutcome::SelfAnnouncement;
    }
    if network.is_connected(peer.peer_id).await {
        return PeerFoundOutcome::AlreadyConnected;
    }

    let peer_id = peer.peer_id;
    match tokio::time::timeout(dial_timeout, network.dial(peer_id, peer.addrs)).await {
        Ok(Ok(())) => {
            tracing::info!(%peer_id, service = MDNS_SERVICE_TAG, "connected to local peer");
            PeerFoundOutcome::Dialed
        }
        Ok(Err(HostError::Timeout(_))) | Err(_) => {
            tracing::debug!(%peer_id, "local peer dial timed out");
            PeerFoundOutcome::TimedOut
        }
        Ok(Err(e)) => {
            tracing::debug!(%peer_id, error = %e, "local peer dial failed");
            PeerFoundOutcome::DialFailed
        }
    }
}

/// Run until the announcement channel closes, then wait for the dials
/// still in flight.
///
/// Each announcement is handled on its own task so a slow dial does not
/// hold up the others. The tasks belong to this future: aborting it aborts
/// them too.
pub async fn run<N>(
    network: Arc<N>,
    mut announcements: mpsc::UnboundedReceiver<DiscoveredPeer>,
    dial_timeout: Duration,
) where
    N: DiscoveryNetwork,
{
    tracing::info!(service = MDNS_SERVICE_TAG, "local discovery started");
    let mut dials = JoinSet::new();

    loop {
        tokio::select! {
            announcement = announcements.recv() => match announcement {
                Some(peer) => {
                    let network = Arc::clone(&network);
                    dials.spawn(async move {
                        handle_peer_found(network.as_ref(), peer, dial_timeout).await
                    });
                }
                None => break,
            },
            Some(finished) = dials.join_next() => {
                if let Err(e) = finished {
                    tracing::debug!(error = %e, "local dial task failed");
                }
            }
        }
    }

    while dials.join_next().await.is_some() {}
    tracing::info!(service = MDNS_SERVICE_TAG, "local discovery stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::mock::MockNetwork;
    use libp2p::PeerId;

    fn announce(peer_id: PeerId) -> DiscoveredPeer {
        DiscoveredPeer {
            peer_id,
            addrs: vec!["/ip4/192.168.1.20/tcp/4001".parse().unwrap()],
        }
    }

    #[tokio::test]
    async fn test_self_announcement_ignored() {
        let network = MockNetwork::new();
        let outcome =
            handle_peer_found(&network, announce(network.local), Duration::from_secs(1)).await;

        assert_eq!(outcome, PeerFoundOutcome::SelfAnnouncement);
        assert!(network.dials.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_announcement_dials_once() {
        let network = MockNetwork::new();
        let peer = PeerId::random();

        let first = handle_peer_found(&network, announce(peer), Duration::from_secs(1)).await;
        let second = handle_peer_found(&network, announce(peer), Duration::from_secs(1)).await;

        assert_eq!(first, PeerFoundOutcome::Dialed);
        assert_eq!(second, PeerFoundOutcome::AlreadyConnected);
        assert_eq!(network.dial_count(&peer), 1);
    }

    #[tokio::test]
    async fn test_unreachable_peer() {
        let peer = PeerId::random();
        let mut network = MockNetwork::new();
        network.unreachable.insert(peer);

        let outcome = handle_peer_found(&network, announce(peer), Duration::from_secs(1)).await;
        assert_eq!(outcome, PeerFoundOutcome::DialFailed);
        assert!(!network.is_connected(peer).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_dial_times_out() {
        let mut network = MockNetwork::new();
        network.dial_delay = Some(Duration::from_secs(30));

        let outcome =
            handle_peer_found(&network, announce(PeerId::random()), Duration::from_secs(10)).await;
        assert_eq!(outcome, PeerFoundOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_run_stops_when_channel_closes() {
        let network = Arc::new(MockNetwork::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let peer = PeerId::random();
        tx.send(announce(peer)).unwrap();
        drop(tx);

        run(Arc::clone(&network), rx, Duration::from_secs(1)).await;

        assert_eq!(network.dial_count(&peer), 1);
        assert!(network.is_connected(peer).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_cancels_pending_dials() {
        let mut network = MockNetwork::new();
        network.dial_delay = Some(Duration::from_secs(5));
        let network = Arc::new(network);

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(Arc::clone(&network), rx, Duration::from_secs(10)));

        let peer = PeerId::random();
        tx.send(announce(peer)).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(network.dial_count(&peer), 1);

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        // The dial would have completed by now had it outlived the loop
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!network.is_connected(peer).await);
    }
}
