//! Swarm driver task.
//!
//! The `Swarm` is owned by exactly one task. Everything else reaches it
//! through [`Command`]s carrying a `oneshot` reply channel; results of
//! long-running work (dials, DHT queries) are matched back to their
//! requester when the corresponding swarm event arrives.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

use futures::StreamExt;
use libp2p::swarm::dial_opts::{DialOpts, PeerCondition};
use libp2p::swarm::{DialError, SwarmEvent};
use libp2p::{Multiaddr, PeerId, Swarm, autonat, identify, kad, mdns};
use tokio::sync::{mpsc, oneshot};

use crate::CHAT_PROTOCOL;
use crate::behaviour::{ChatBehaviour, ChatBehaviourEvent};
use crate::error::{HostError, Result};
use crate::host::DiscoveredPeer;
use crate::streams::StreamTable;

/// Requests from [`Host`](crate::Host) handles to the driver.
pub(crate) enum Command {
    Dial {
        peer: PeerId,
        addrs: Vec<Multiaddr>,
        reply: oneshot::Sender<Result<()>>,
    },
    IsConnected {
        peer: PeerId,
        reply: oneshot::Sender<bool>,
    },
    ConnectedPeers {
        reply: oneshot::Sender<Vec<PeerId>>,
    },
    ListenAddrs {
        reply: oneshot::Sender<Vec<Multiaddr>>,
    },
    StartProviding {
        key: kad::RecordKey,
        reply: oneshot::Sender<Result<()>>,
    },
    GetProviders {
        key: kad::RecordKey,
        reply: oneshot::Sender<Result<Vec<PeerId>>>,
    },
    FindPeer {
        peer: PeerId,
        reply: oneshot::Sender<Result<Vec<Multiaddr>>>,
    },
    Bootstrap,
    Shutdown,
}

struct ProviderQuery {
    found: HashSet<PeerId>,
    reply: oneshot::Sender<Result<Vec<PeerId>>>,
}

pub(crate) struct SwarmDriver {
    swarm: Swarm<ChatBehaviour>,
    commands: mpsc::Receiver<Command>,
    streams: StreamTable,
    control: libp2p_stream::Control,
    local_peers: mpsc::UnboundedSender<DiscoveredPeer>,
    pending_dials: HashMap<PeerId, Vec<oneshot::Sender<Result<()>>>>,
    pending_providing: HashMap<kad::QueryId, oneshot::Sender<Result<()>>>,
    pending_providers: HashMap<kad::QueryId, ProviderQuery>,
    pending_find_peer: HashMap<kad::QueryId, (PeerId, oneshot::Sender<Result<Vec<Multiaddr>>>)>,
}

impl SwarmDriver {
    pub(crate) fn new(
        swarm: Swarm<ChatBehaviour>,
        commands: mpsc::Receiver<Command>,
        streams: StreamTable,
        control: libp2p_stream::Control,
        local_peers: mpsc::UnboundedSender<DiscoveredPeer>,
    ) -> Self {
        Self {
            swarm,
            commands,
            streams,
            control,
            local_peers,
            pending_dials: HashMap::new(),
            pending_providing: HashMap::new(),
            pending_providers: HashMap::new(),
            pending_find_peer: HashMap::new(),
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                event = self.swarm.select_next_some() => self.handle_swarm_event(event),
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
            }
        }
        tracing::info!(peer_id = %self.swarm.local_peer_id(), "swarm driver stopped");
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Commands
    // ═══════════════════════════════════════════════════════════════════════

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Dial { peer, addrs, reply } => self.dial(peer, addrs, reply),
            Command::IsConnected { peer, reply } => {
                let _ = reply.send(self.swarm.is_connected(&peer));
            }
            Command::ConnectedPeers { reply } => {
                let _ = reply.send(self.swarm.connected_peers().copied().collect());
            }
            Command::ListenAddrs { reply } => {
                let _ = reply.send(self.swarm.listeners().cloned().collect());
            }
            Command::StartProviding { key, reply } => {
                match self.swarm.behaviour_mut().kademlia.start_providing(key) {
                    Ok(id) => {
                        self.pending_providing.insert(id, reply);
                    }
                    Err(e) => {
                        let _ = reply.send(Err(HostError::Dht(Cow::Owned(e.to_string()))));
                    }
                }
            }
            Command::GetProviders { key, reply } => {
                let id = self.swarm.behaviour_mut().kademlia.get_providers(key);
                self.pending_providers.insert(
                    id,
                    ProviderQuery {
                        found: HashSet::new(),
                        reply,
                    },
                );
            }
            Command::FindPeer { peer, reply } => {
                let id = self.swarm.behaviour_mut().kademlia.get_closest_peers(peer);
                self.pending_find_peer.insert(id, (peer, reply));
            }
            Command::Bootstrap => {
                if let Err(e) = self.swarm.behaviour_mut().kademlia.bootstrap() {
                    tracing::debug!(error = %e, "DHT bootstrap skipped");
                }
            }
            Command::Shutdown => {}
        }
    }

    fn dial(&mut self, peer: PeerId, addrs: Vec<Multiaddr>, reply: oneshot::Sender<Result<()>>) {
        if self.swarm.is_connected(&peer) {
            let _ = reply.send(Ok(()));
            return;
        }

        let opts = DialOpts::peer_id(peer)
            .addresses(addrs)
            .condition(PeerCondition::DisconnectedAndNotDialing)
            .build();

        match self.swarm.dial(opts) {
            // An attempt already in flight resolves this reply too
            Ok(()) | Err(DialError::DialPeerConditionFalse(_)) => {
                self.pending_dials.entry(peer).or_default().push(reply);
            }
            Err(e) => {
                let _ = reply.send(Err(HostError::Dial(Cow::Owned(e.to_string()))));
            }
        }
    }

    fn resolve_dials(&mut self, peer: &PeerId, result: &Result<()>) {
        for reply in self.pending_dials.remove(peer).unwrap_or_default() {
            let _ = reply.send(result.clone());
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Swarm Events
    // ═══════════════════════════════════════════════════════════════════════

    fn handle_swarm_event(&mut self, event: SwarmEvent<ChatBehaviourEvent>) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                tracing::info!(%address, "listening");
            }
            SwarmEvent::ConnectionEstablished {
                peer_id, endpoint, ..
            } => {
                tracing::debug!(%peer_id, ?endpoint, "connection established");
                self.resolve_dials(&peer_id, &Ok(()));
            }
            SwarmEvent::ConnectionClosed { peer_id, cause, .. } => {
                tracing::debug!(%peer_id, ?cause, "connection closed");
            }
            SwarmEvent::OutgoingConnectionError {
                peer_id: Some(peer_id),
                error,
                ..
            } => {
                if !self.swarm.is_connected(&peer_id) {
                    tracing::debug!(%peer_id, %error, "outgoing connection failed");
                    let result = Err(HostError::Dial(Cow::Owned(error.to_string())));
                    self.resolve_dials(&peer_id, &result);
                }
            }
            SwarmEvent::Behaviour(event) => self.handle_behaviour_event(event),
            _ => {}
        }
    }

    fn handle_behaviour_event(&mut self, event: ChatBehaviourEvent) {
        match event {
            ChatBehaviourEvent::Mdns(mdns::Event::Discovered(list)) => {
                let mut by_peer: HashMap<PeerId, Vec<Multiaddr>> = HashMap::new();
                for (peer_id, addr) in list {
                    self.swarm
                        .behaviour_mut()
                        .kademlia
                        .add_address(&peer_id, addr.clone());
                    by_peer.entry(peer_id).or_default().push(addr);
                }
                for (peer_id, addrs) in by_peer {
                    tracing::debug!(%peer_id, "mDNS peer discovered");
                    let _ = self.local_peers.send(DiscoveredPeer { peer_id, addrs });
                }
            }
            ChatBehaviourEvent::Mdns(mdns::Event::Expired(list)) => {
                for (peer_id, _) in list {
                    tracing::debug!(%peer_id, "mDNS record expired");
                }
            }
            ChatBehaviourEvent::Identify(identify::Event::Received { peer_id, info, .. }) => {
                self.on_identify(peer_id, info);
            }
            ChatBehaviourEvent::Kademlia(kad::Event::OutboundQueryProgressed {
                id,
                result,
                step,
                ..
            }) => self.on_query_progressed(id, result, step.last),
            ChatBehaviourEvent::Autonat(autonat::Event::StatusChanged { old, new }) => {
                tracing::info!(?old, ?new, "NAT status changed");
            }
            ChatBehaviourEvent::Dcutr(event) => {
                tracing::debug!(?event, "hole punch");
            }
            ChatBehaviourEvent::Upnp(event) => {
                tracing::debug!(?event, "UPnP");
            }
            _ => {}
        }
    }

    fn on_identify(&mut self, peer_id: PeerId, info: identify::Info) {
        if info.protocols.contains(&kad::PROTOCOL_NAME) {
            for addr in info.listen_addrs {
                self.swarm
                    .behaviour_mut()
                    .kademlia
                    .add_address(&peer_id, addr);
            }
        }

        if info.protocols.contains(&CHAT_PROTOCOL) {
            let streams = self.streams.clone();
            let control = self.control.clone();
            tokio::spawn(async move {
                if let Err(e) = streams.open(control, peer_id).await {
                    tracing::debug!(%peer_id, error = %e, "could not open chat stream");
                }
            });
        }
    }

    fn on_query_progressed(&mut self, id: kad::QueryId, result: kad::QueryResult, last: bool) {
        match result {
            kad::QueryResult::StartProviding(result) => {
                if let Some(reply) = self.pending_providing.remove(&id) {
                    let _ = reply.send(
                        result
                            .map(|_| ())
                            .map_err(|e| HostError::Dht(Cow::Owned(e.to_string()))),
                    );
                }
            }
            kad::QueryResult::GetProviders(result) => {
                let Some(query) = self.pending_providers.get_mut(&id) else {
                    return;
                };
                match result {
                    Ok(kad::GetProvidersOk::FoundProviders { providers, .. }) => {
                        query.found.extend(providers);
                    }
                    Ok(kad::GetProvidersOk::FinishedWithNoAdditionalRecord { .. }) => {}
                    Err(e) => {
                        if let Some(query) = self.pending_providers.remove(&id) {
                            let reply = if query.found.is_empty() {
                                Err(HostError::Dht(Cow::Owned(e.to_string())))
                            } else {
                                Ok(query.found.into_iter().collect())
                            };
                            let _ = query.reply.send(reply);
                        }
                        return;
                    }
                }
                if last {
                    if let Some(query) = self.pending_providers.remove(&id) {
                        let _ = query.reply.send(Ok(query.found.into_iter().collect()));
                    }
                }
            }
            kad::QueryResult::GetClosestPeers(result) => {
                let Some((target, reply)) = self.pending_find_peer.remove(&id) else {
                    return;
                };
                let peers = match result {
                    Ok(ok) => ok.peers,
                    Err(kad::GetClosestPeersError::Timeout { peers, .. }) => peers,
                };
                let found = peers.into_iter().find(|info| info.peer_id == target);
                let response = match found {
                    Some(info) => {
                        for addr in &info.addrs {
                            self.swarm
                                .behaviour_mut()
                                .kademlia
                                .add_address(&target, addr.clone());
                        }
                        Ok(info.addrs)
                    }
                    // Connected peers are dialable without addresses
                    None if self.swarm.is_connected(&target) => Ok(Vec::new()),
                    None => Err(HostError::PeerNotFound(target.to_string())),
                };
                let _ = reply.send(response);
            }
            kad::QueryResult::Bootstrap(result) => {
                if last {
                    tracing::debug!(ok = result.is_ok(), "DHT bootstrap round finished");
                }
            }
            _ => {}
        }
    }
}
