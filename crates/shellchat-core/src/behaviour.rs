//! Combined libp2p behaviour for the chat node.

use std::error::Error;

use libp2p::identity::Keypair;
use libp2p::swarm::NetworkBehaviour;
use libp2p::swarm::behaviour::toggle::Toggle;
use libp2p::{autonat, dcutr, identify, kad, mdns, relay, upnp};

use crate::config::HostConfig;
use crate::{AGENT_VERSION, IDENTIFY_PROTOCOL_VERSION};

/// Composes:
/// - Kademlia: global rendezvous and peer lookup
/// - Identify: protocol/address exchange, feeds Kademlia and chat stream open
/// - mDNS: local network discovery (optional)
/// - Relay client + DCUtR: hole punching behind NAT
/// - AutoNAT: reachability probing
/// - UPnP: gateway port mapping (optional)
/// - Stream: raw chat streams on [`CHAT_PROTOCOL`](crate::CHAT_PROTOCOL)
#[derive(NetworkBehaviour)]
pub(crate) struct ChatBehaviour {
    pub kademlia: kad::Behaviour<kad::store::MemoryStore>,
    pub identify: identify::Behaviour,
    pub mdns: Toggle<mdns::tokio::Behaviour>,
    pub relay_client: relay::client::Behaviour,
    pub dcutr: dcutr::Behaviour,
    pub autonat: autonat::Behaviour,
    pub upnp: Toggle<upnp::tokio::Behaviour>,
    pub stream: libp2p_stream::Behaviour,
}

/// Build the behaviour. Called from `SwarmBuilder::with_behaviour`.
pub(crate) fn build(
    key: &Keypair,
    relay_client: relay::client::Behaviour,
    config: &HostConfig,
) -> std::result::Result<ChatBehaviour, Box<dyn Error + Send + Sync>> {
    let peer_id = key.public().to_peer_id();

    let mut kad_config = kad::Config::new(kad::PROTOCOL_NAME);
    kad_config.set_query_timeout(config.dht_query_timeout);
    let mut kademlia =
        kad::Behaviour::with_config(peer_id, kad::store::MemoryStore::new(peer_id), kad_config);
    if config.dht_server {
        kademlia.set_mode(Some(kad::Mode::Server));
    }

    let identify = identify::Behaviour::new(
        identify::Config::new(IDENTIFY_PROTOCOL_VERSION.to_string(), key.public())
            .with_agent_version(AGENT_VERSION.to_string()),
    );

    let mdns = if config.enable_mdns {
        Some(mdns::tokio::Behaviour::new(mdns::Config::default(), peer_id)?)
    } else {
        None
    };

    let upnp = config
        .enable_upnp
        .then(upnp::tokio::Behaviour::default);

    Ok(ChatBehaviour {
        kademlia,
        identify,
        mdns: Toggle::from(mdns),
        relay_client,
        dcutr: dcutr::Behaviour::new(peer_id),
        autonat: autonat::Behaviour::new(peer_id, autonat::Config::default()),
        upnp: Toggle::from(upnp),
        stream: libp2p_stream::Behaviour::new(),
    })
}
