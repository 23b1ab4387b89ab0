//! Global discovery through the DHT rendezvous key.

use std::sync::Arc;
use std::time::Duration;

use crate::RENDEZVOUS;
use crate::error::DiscoveryError;
use crate::network::DiscoveryNetwork;

/// Timing of the global loop.
#[derive(Debug, Clone, Copy)]
pub struct GlobalTiming {
    /// Pause between lookups, also the back-off after a failed lookup
    pub lookup_interval: Duration,
    /// Deadline for one provider lookup
    pub lookup_timeout: Duration,
    /// Deadline for each dial
    pub dial_timeout: Duration,
}

impl Default for GlobalTiming {
    fn default() -> Self {
        Self {
            lookup_interval: crate::DEFAULT_LOOKUP_INTERVAL,
            lookup_timeout: crate::DEFAULT_LOOKUP_TIMEOUT,
            dial_timeout: crate::DEFAULT_DIAL_TIMEOUT,
        }
    }
}

/// Result of one lookup round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundSummary {
    /// Providers returned by the lookup, ourselves excluded
    pub found: usize,
    /// Providers already connected
    pub skipped: usize,
    /// Providers whose addresses the DHT could not produce
    pub unresolved: usize,
    /// Successful dials
    pub connected: usize,
    /// Failed or timed out dials
    pub failed: usize,
}

/// One lookup under [`RENDEZVOUS`], dialing every provider we are not
/// already connected to.
///
/// Provider records carry only peer ids, so each new provider is resolved
/// to its addresses with a peer lookup (bounded by the lookup timeout)
/// before it is dialed.
///
/// # Errors
///
/// Returns an error if the lookup itself fails or times out. Dial failures
/// are only counted.
pub async fn discovery_round<N>(
    network: &N,
    timing: &GlobalTiming,
) -> Result<RoundSummary, DiscoveryError>
where
    N: DiscoveryNetwork + ?Sized,
{
    let providers = tokio::time::timeout(timing.lookup_timeout, network.find_providers(RENDEZVOUS))
        .await
        .map_err(|_| DiscoveryError::Timeout("rendezvous lookup"))?
        .map_err(DiscoveryError::Dht)?;

    let local = network.local_peer_id();
    let mut summary = RoundSummary::default();

    for peer in providers.into_iter().filter(|p| *p != local) {
        summary.found += 1;
        if network.is_connected(peer).await {
            summary.skipped += 1;
            continue;
        }

        let addrs = match tokio::time::timeout(timing.lookup_timeout, network.find_peer(peer)).await
        {
            Ok(Ok(addrs)) => addrs,
            Ok(Err(e)) => {
                tracing::debug!(%peer, error = %e, "global peer not resolved");
                summary.unresolved += 1;
                continue;
            }
            Err(_) => {
                tracing::debug!(%peer, "global peer lookup timed out");
                summary.unresolved += 1;
                continue;
            }
        };

        match tokio::time::timeout(timing.dial_timeout, network.dial(peer, addrs)).await {
            Ok(Ok(())) => {
                tracing::info!(%peer, "connected to global peer");
                summary.connected += 1;
            }
            Ok(Err(e)) => {
                tracing::debug!(%peer, error = %e, "global peer dial failed");
                summary.failed += 1;
            }
            Err(_) => {
                tracing::debug!(%peer, "global peer dial timed out");
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

/// Announce this node under [`RENDEZVOUS`]. Returns whether it worked.
async fn advertise<N>(network: &N) -> bool
where
    N: DiscoveryNetwork + ?Sized,
{
    match network.advertise(RENDEZVOUS).await {
        Ok(()) => {
            tracing::info!(rendezvous = RENDEZVOUS, "advertised");
            true
        }
        Err(e) => {
            tracing::debug!(rendezvous = RENDEZVOUS, error = %e, "advertise failed");
            false
        }
    }
}

/// Advertise, then look up and dial peers forever.
///
/// Re-advertises before each round for as long as advertising keeps
/// failing. Runs until the task is aborted.
pub async fn run<N>(network: Arc<N>, timing: GlobalTiming)
where
    N: DiscoveryNetwork,
{
    tracing::info!(rendezvous = RENDEZVOUS, "global discovery started");
    let mut advertised = advertise(network.as_ref()).await;

    loop {
        if !advertised {
            advertised = advertise(network.as_ref()).await;
        }

        match discovery_round(network.as_ref(), &timing).await {
            Ok(summary) => tracing::debug!(?summary, "rendezvous round finished"),
            Err(e) => tracing::debug!(error = %e, "rendezvous lookup failed"),
        }

        tokio::time::sleep(timing.lookup_interval).await;
    }
}
