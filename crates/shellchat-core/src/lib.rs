//! # Shellchat Core
//!
//! Identity and transport host for shellchat.
//!
//! This crate provides:
//! - Ed25519 node identity
//! - The libp2p swarm (TCP + QUIC, Noise/TLS, Yamux, DNS, relay, hole punching)
//! - Kademlia DHT queries and mDNS peer announcements
//! - The chat stream protocol and its length-prefixed framing
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     Host (cloneable handle)                       │
//! │    send · broadcast · connect · advertise · find_providers       │
//! ├────────────────────────────┬─────────────────────────────────────┤
//! │        StreamTable         │            SwarmDriver              │
//! │  peer → write half,        │  owns the Swarm, serves Commands,   │
//! │  one reader task each      │  routes kad/mdns/identify events    │
//! ├────────────────────────────┴─────────────────────────────────────┤
//! │         /shellchat/1.0.0 streams: [u32 BE len][payload]          │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Inbound frames from every stream are delivered on the single channel
//! returned by [`Host::create`].

#![warn(missing_docs)]
#![warn(clippy::all)]

mod behaviour;
pub mod config;
mod driver;
pub mod error;
pub mod host;
pub mod identity;
pub mod streams;
pub mod wire;

pub use config::HostConfig;
pub use error::{HostError, Result};
pub use host::{DiscoveredPeer, Host, split_peer_addr};
pub use identity::short_id;
pub use libp2p::{Multiaddr, PeerId};
pub use streams::InboundMessage;

use libp2p::StreamProtocol;

/// Protocol id negotiated for chat streams
pub const CHAT_PROTOCOL: StreamProtocol = StreamProtocol::new("/shellchat/1.0.0");

/// Protocol version announced over Identify
pub const IDENTIFY_PROTOCOL_VERSION: &str = "/shellchat/id/1.0.0";

/// Agent string announced over Identify
pub const AGENT_VERSION: &str = concat!("shellchat/", env!("CARGO_PKG_VERSION"));
