//! # Shellchat Discovery
//!
//! Peer discovery for shellchat nodes.
//!
//! This crate provides:
//! - Local discovery: dial peers announced over mDNS
//! - Global discovery: advertise under a rendezvous key in the Kademlia DHT
//!   and periodically dial the other providers
//! - A [`DiscoveryManager`] that runs both as background tasks
//!
//! Both loops reach the network only through [`DiscoveryNetwork`], which is
//! implemented for [`shellchat_core::Host`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use shellchat_core::{Host, HostConfig};
//! use shellchat_discovery::{DiscoveryConfig, DiscoveryManager};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let (host, _inbound) = Host::create(HostConfig::default(), None)?;
//! let manager = DiscoveryManager::new(host, DiscoveryConfig::default());
//! manager.start().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::time::Duration;

pub mod error;
pub mod global;
pub mod local;
pub mod manager;
pub mod network;

pub use error::DiscoveryError;
pub use global::{GlobalTiming, RoundSummary};
pub use local::PeerFoundOutcome;
pub use manager::{DiscoveryConfig, DiscoveryManager, DiscoveryState};
pub use network::DiscoveryNetwork;

/// DHT key every node advertises and looks up
pub const RENDEZVOUS: &str = "shellchat-global";

/// Label of the local-discovery service
pub const MDNS_SERVICE_TAG: &str = "shellchat-mdns";

/// Deadline for each discovery-initiated dial
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for each rendezvous lookup
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause between rendezvous lookups
pub const DEFAULT_LOOKUP_INTERVAL: Duration = Duration::from_secs(60);
