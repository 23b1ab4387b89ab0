//! The host handle.

use std::borrow::Cow;
use std::sync::Arc;

use futures::StreamExt;
use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, PeerId, SwarmBuilder, kad, noise, tcp, yamux};
use rand_core::RngCore;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinSet;

use crate::CHAT_PROTOCOL;
use crate::behaviour;
use crate::config::HostConfig;
use crate::driver::{Command, SwarmDriver};
use crate::error::{HostError, Result};
use crate::identity::generate_keypair;
use crate::streams::{InboundMessage, StreamTable};

/// Capacity of the command channel to the swarm driver
const COMMAND_BUFFER: usize = 64;

/// A peer announced on the local network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPeer {
    /// Announced peer
    pub peer_id: PeerId,
    /// Addresses it announced
    pub addrs: Vec<Multiaddr>,
}

/// Split `/…/p2p/<id>` into the peer id and the transport address.
///
/// Returns `None` if the address does not end in a `/p2p/` component.
#[must_use]
pub fn split_peer_addr(addr: &Multiaddr) -> Option<(PeerId, Multiaddr)> {
    let mut transport = addr.clone();
    match transport.pop() {
        Some(Protocol::P2p(peer_id)) => Some((peer_id, transport)),
        _ => None,
    }
}

struct HostInner {
    local_peer_id: PeerId,
    config: HostConfig,
    commands: mpsc::Sender<Command>,
    control: libp2p_stream::Control,
    streams: StreamTable,
    local_peers: Mutex<Option<mpsc::UnboundedReceiver<DiscoveredPeer>>>,
}

/// Handle to a running chat node.
///
/// Cheap to clone. The swarm itself runs on a background task that stops on
/// [`shutdown`](Host::shutdown) or when the last handle is dropped.
#[derive(Clone)]
pub struct Host {
    inner: Arc<HostInner>,
}

impl Host {
    // ═══════════════════════════════════════════════════════════════════════
    // Constructors
    // ═══════════════════════════════════════════════════════════════════════

    /// Create the node and start listening.
    ///
    /// Generates the identity (from `randomness` when given), binds
    /// `/ip4/{ip}/tcp/{port}` (plus QUIC when enabled), starts the swarm and
    /// the inbound stream handler, then joins the DHT in the background.
    /// Bootstrap dial failures are logged and ignored.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// Returns the handle and the receiver of inbound chat frames.
    ///
    /// # Errors
    ///
    /// Identity, transport and listen failures are fatal.
    pub fn create(
        config: HostConfig,
        randomness: Option<&mut dyn RngCore>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<InboundMessage>)> {
        let keypair = generate_keypair(randomness)?;
        let local_peer_id = keypair.public().to_peer_id();

        let behaviour_config = config.clone();
        let mut swarm = SwarmBuilder::with_existing_identity(keypair)
            .with_tokio()
            .with_tcp(
                tcp::Config::default().nodelay(true),
                noise::Config::new,
                yamux::Config::default,
            )
            .map_err(|e| HostError::Transport(Cow::Owned(format!("TCP: {e}"))))?
            .with_quic()
            .with_dns()
            .map_err(|e| HostError::Transport(Cow::Owned(format!("DNS: {e}"))))?
            .with_relay_client(noise::Config::new, yamux::Config::default)
            .map_err(|e| HostError::Transport(Cow::Owned(format!("relay client: {e}"))))?
            .with_behaviour(|key, relay_client| {
                behaviour::build(key, relay_client, &behaviour_config)
            })
            .map_err(|e| HostError::Transport(Cow::Owned(format!("behaviour: {e}"))))?
            .with_swarm_config(|c| c.with_idle_connection_timeout(config.idle_connection_timeout))
            .build();

        let mut listen_addrs = vec![config.tcp_listen_addr()];
        if config.enable_quic {
            listen_addrs.push(config.quic_listen_addr());
        }
        for addr in listen_addrs {
            swarm.listen_on(addr.clone()).map_err(|e| HostError::Listen {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;
        }

        let mut control = swarm.behaviour().stream.new_control();
        let mut incoming = control
            .accept(CHAT_PROTOCOL)
            .map_err(|_| HostError::transport("chat protocol registered twice"))?;

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (local_tx, local_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);

        let streams = StreamTable::new(inbound_tx);

        let driver = SwarmDriver::new(
            swarm,
            command_rx,
            streams.clone(),
            control.clone(),
            local_tx,
        );
        tokio::spawn(driver.run());

        let acceptor = streams.clone();
        tokio::spawn(async move {
            while let Some((peer, stream)) = incoming.next().await {
                tracing::debug!(%peer, "inbound chat stream");
                acceptor.register(peer, stream).await;
            }
        });

        let host = Self {
            inner: Arc::new(HostInner {
                local_peer_id,
                config,
                commands: command_tx,
                control,
                streams,
                local_peers: Mutex::new(Some(local_rx)),
            }),
        };
        host.spawn_bootstrap();

        tracing::info!(peer_id = %local_peer_id, "host started");
        Ok((host, inbound_rx))
    }

    /// Fan out one best-effort dial per bootstrap peer, then seed the DHT.
    fn spawn_bootstrap(&self) {
        let peers = self.inner.config.bootstrap_peers.clone();
        if peers.is_empty() {
            return;
        }

        let host = self.clone();
        tokio::spawn(async move {
            let mut attempts = JoinSet::new();
            for addr in peers {
                let Some((peer, transport)) = split_peer_addr(&addr) else {
                    tracing::debug!(%addr, "bootstrap address has no peer id");
                    continue;
                };
                let host = host.clone();
                attempts.spawn(async move { host.dial(peer, vec![transport]).await.map(|()| peer) });
            }

            let mut joined = 0usize;
            while let Some(attempt) = attempts.join_next().await {
                match attempt {
                    Ok(Ok(peer)) => {
                        joined += 1;
                        tracing::debug!(%peer, "bootstrap peer connected");
                    }
                    Ok(Err(e)) => tracing::debug!(error = %e, "bootstrap dial failed"),
                    Err(e) => tracing::debug!(error = %e, "bootstrap task failed"),
                }
            }

            if joined > 0 {
                let _ = host.inner.commands.send(Command::Bootstrap).await;
            }
            tracing::info!(joined, "DHT bootstrap finished");
        });
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Identity Methods
    // ═══════════════════════════════════════════════════════════════════════

    /// This node's peer id.
    #[must_use]
    pub fn local_peer_id(&self) -> PeerId {
        self.inner.local_peer_id
    }

    /// Configuration the host was created with.
    #[must_use]
    pub fn config(&self) -> &HostConfig {
        &self.inner.config
    }

    /// Addresses the swarm is currently listening on.
    pub async fn listen_addrs(&self) -> Result<Vec<Multiaddr>> {
        self.request(|reply| Command::ListenAddrs { reply }).await
    }

    /// Listen addresses suffixed with `/p2p/<local id>`, ready to hand to a
    /// remote `/connect`.
    pub async fn shareable_addrs(&self) -> Result<Vec<Multiaddr>> {
        let local = self.local_peer_id();
        Ok(self
            .listen_addrs()
            .await?
            .into_iter()
            .map(|addr| addr.with(Protocol::P2p(local)))
            .collect())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Messaging
    // ═══════════════════════════════════════════════════════════════════════

    /// Send one payload to `peer_id` over its open chat stream.
    ///
    /// Never dials: without an open stream this fails with
    /// [`HostError::PeerNotConnected`]. Connect first with
    /// [`connect`](Self::connect) or let discovery do it.
    pub async fn send(&self, peer_id: &str, payload: &[u8]) -> Result<()> {
        self.inner.streams.send(peer_id, payload).await
    }

    /// Send one payload on every open chat stream.
    ///
    /// Returns how many peers the payload was written to.
    pub async fn broadcast(&self, payload: &[u8]) -> Result<usize> {
        self.inner.streams.broadcast(payload).await
    }

    /// Peers with an open chat stream.
    pub async fn stream_peers(&self) -> Vec<String> {
        self.inner.streams.peers().await
    }

    /// Whether a chat stream to `peer_id` is open.
    pub async fn has_stream(&self, peer_id: &str) -> bool {
        self.inner.streams.contains(peer_id).await
    }

    /// Open an outbound chat stream to an already connected peer.
    ///
    /// Reuses an existing stream.
    pub async fn open_stream(&self, peer: PeerId) -> Result<()> {
        self.inner
            .streams
            .open(self.inner.control.clone(), peer)
            .await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Connections
    // ═══════════════════════════════════════════════════════════════════════

    /// Whether the swarm has a live connection to `peer`.
    pub async fn is_connected(&self, peer: PeerId) -> bool {
        self.request(|reply| Command::IsConnected { peer, reply })
            .await
            .unwrap_or(false)
    }

    /// Peers with a live connection.
    pub async fn connected_peers(&self) -> Vec<PeerId> {
        self.request(|reply| Command::ConnectedPeers { reply })
            .await
            .unwrap_or_default()
    }

    /// Dial `peer`, bounded by the configured dial timeout.
    ///
    /// With empty `addrs` the swarm uses addresses it already knows.
    pub async fn dial(&self, peer: PeerId, addrs: Vec<Multiaddr>) -> Result<()> {
        let deadline = self.inner.config.dial_timeout;
        tokio::time::timeout(deadline, async {
            self.request(|reply| Command::Dial { peer, addrs, reply })
                .await?
        })
        .await
        .map_err(|_| HostError::timeout("dial"))?
    }

    /// Connect to `target` and open a chat stream.
    ///
    /// `target` is either a multiaddr ending in `/p2p/<id>` or a bare peer
    /// id, which is resolved through the DHT first.
    pub async fn connect(&self, target: &str) -> Result<PeerId> {
        if let Ok(addr) = target.parse::<Multiaddr>() {
            return self.connect_addr(&addr).await;
        }

        let peer = target
            .parse::<PeerId>()
            .map_err(|_| HostError::InvalidAddress(Cow::Owned(target.to_string())))?;
        self.connect_peer(peer).await?;
        Ok(peer)
    }

    /// Dial a `/…/p2p/<id>` multiaddr and open a chat stream.
    pub async fn connect_addr(&self, addr: &Multiaddr) -> Result<PeerId> {
        let (peer, transport) = split_peer_addr(addr).ok_or_else(|| {
            HostError::InvalidAddress(Cow::Owned(format!("{addr} has no /p2p/ component")))
        })?;

        self.dial(peer, vec![transport]).await?;
        self.open_stream(peer).await?;
        Ok(peer)
    }

    /// Resolve `peer` through the DHT, dial it and open a chat stream.
    pub async fn connect_peer(&self, peer: PeerId) -> Result<()> {
        let addrs = self.find_peer(peer).await?;
        self.dial(peer, addrs).await?;
        self.open_stream(peer).await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // DHT
    // ═══════════════════════════════════════════════════════════════════════

    /// Look up a peer's addresses, bounded by the DHT query timeout.
    pub async fn find_peer(&self, peer: PeerId) -> Result<Vec<Multiaddr>> {
        self.dht_request("find peer", |reply| Command::FindPeer { peer, reply })
            .await
    }

    /// Announce this node as a provider of `namespace`.
    pub async fn advertise(&self, namespace: &str) -> Result<()> {
        let key = kad::RecordKey::new(&namespace);
        self.dht_request("advertise", |reply| Command::StartProviding { key, reply })
            .await
    }

    /// Peers providing `namespace`, bounded by the DHT query timeout.
    pub async fn find_providers(&self, namespace: &str) -> Result<Vec<PeerId>> {
        let key = kad::RecordKey::new(&namespace);
        self.dht_request("find providers", |reply| Command::GetProviders { key, reply })
            .await
    }

    /// Take the receiver of mDNS peer announcements.
    ///
    /// Only the first caller gets it.
    pub async fn take_local_discoveries(&self) -> Option<mpsc::UnboundedReceiver<DiscoveredPeer>> {
        self.inner.local_peers.lock().await.take()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle Methods
    // ═══════════════════════════════════════════════════════════════════════

    /// Stop the swarm. Open streams are dropped with it.
    pub async fn shutdown(&self) {
        let _ = self.inner.commands.send(Command::Shutdown).await;
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.inner
            .commands
            .send(make(reply))
            .await
            .map_err(|_| HostError::Shutdown)?;
        response.await.map_err(|_| HostError::Shutdown)
    }

    async fn dht_request<T>(
        &self,
        context: &'static str,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        let deadline = self.inner.config.dht_query_timeout;
        tokio::time::timeout(deadline, async { self.request(make).await? })
            .await
            .map_err(|_| HostError::timeout(context))?
    }
}
