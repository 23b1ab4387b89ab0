//! Host configuration.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use libp2p::Multiaddr;
use libp2p::multiaddr::Protocol;

/// Public libp2p bootstrap nodes used to join the global DHT.
pub const DEFAULT_BOOTSTRAP_PEERS: &[&str] = &[
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmNnooDu7bfjPFoTZYxMNLWUQJyrVwtbZg5gBMjTezGAJN",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmQCU2EcMqAqQPR2i9bChDtGNJchTbq5TbXJJ16u19uLTa",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmbLHAnMoJPWSCR5Zhtx6BHJX9KiKNN6tpvbUcqanj75Nb",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmcZf59bWwK5XFi76CZX8cbJ4BhTzzA3gU1ZjYZcYW3dwt",
    "/ip4/104.131.131.82/tcp/4001/p2p/QmaCpDMGvV2BGHeYERUEnRQAwe3N8SzbUtfsmvsqQLuvuJ",
];

/// Parsed [`DEFAULT_BOOTSTRAP_PEERS`].
#[must_use]
pub fn default_bootstrap_peers() -> Vec<Multiaddr> {
    DEFAULT_BOOTSTRAP_PEERS
        .iter()
        .filter_map(|addr| addr.parse().ok())
        .collect()
}

/// Host configuration
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Interface to bind (default: all interfaces)
    pub listen_ip: IpAddr,

    /// TCP/UDP port; 0 lets the OS choose
    pub listen_port: u16,

    /// Also listen on QUIC
    pub enable_quic: bool,

    /// Announce and discover peers on the local network
    pub enable_mdns: bool,

    /// Ask the gateway for a port mapping
    pub enable_upnp: bool,

    /// Serve DHT requests even without a confirmed external address
    ///
    /// Off by default: Kademlia switches to server mode on its own once the
    /// node is reachable.
    pub dht_server: bool,

    /// Peers dialed at startup to join the DHT
    pub bootstrap_peers: Vec<Multiaddr>,

    /// Deadline for each outbound dial
    pub dial_timeout: Duration,

    /// Deadline for DHT queries
    pub dht_query_timeout: Duration,

    /// Close connections idle for this long
    pub idle_connection_timeout: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            listen_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            listen_port: 0,
            enable_quic: true,
            enable_mdns: true,
            enable_upnp: true,
            dht_server: false,
            bootstrap_peers: default_bootstrap_peers(),
            dial_timeout: Duration::from_secs(10),
            dht_query_timeout: Duration::from_secs(30),
            idle_connection_timeout: Duration::from_secs(60),
        }
    }
}

impl HostConfig {
    /// Loopback-only TCP host with no bootstrap, mDNS or UPnP.
    ///
    /// Suitable for tests and local experiments.
    #[must_use]
    pub fn local_only() -> Self {
        Self {
            listen_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            enable_quic: false,
            enable_mdns: false,
            enable_upnp: false,
            bootstrap_peers: Vec::new(),
            ..Self::default()
        }
    }

    /// `/ip4/{ip}/tcp/{port}`
    #[must_use]
    pub fn tcp_listen_addr(&self) -> Multiaddr {
        Multiaddr::empty()
            .with(ip_protocol(self.listen_ip))
            .with(Protocol::Tcp(self.listen_port))
    }

    /// `/ip4/{ip}/udp/{port}/quic-v1`
    #[must_use]
    pub fn quic_listen_addr(&self) -> Multiaddr {
        Multiaddr::empty()
            .with(ip_protocol(self.listen_ip))
            .with(Protocol::Udp(self.listen_port))
            .with(Protocol::QuicV1)
    }
}

fn ip_protocol(ip: IpAddr) -> Protocol<'static> {
    match ip {
        IpAddr::V4(v4) => Protocol::Ip4(v4),
        IpAddr::V6(v6) => Protocol::Ip6(v6),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HostConfig::default();
        assert_eq!(config.listen_port, 0);
        assert_eq!(config.dial_timeout, Duration::from_secs(10));
        assert_eq!(config.dht_query_timeout, Duration::from_secs(30));
        assert_eq!(
            config.bootstrap_peers.len(),
            DEFAULT_BOOTSTRAP_PEERS.len()
        );
    }

    #[test]
    fn test_listen_addrs() {
        let config = HostConfig {
            listen_port: 4001,
            ..HostConfig::default()
        };
        assert_eq!(
            config.tcp_listen_addr().to_string(),
            "/ip4/0.0.0.0/tcp/4001"
        );
        assert_eq!(
            config.quic_listen_addr().to_string(),
            "/ip4/0.0.0.0/udp/4001/quic-v1"
        );
    }

    #[test]
    fn test_local_only() {
        let config = HostConfig::local_only();
        assert!(config.bootstrap_peers.is_empty());
        assert!(!config.enable_mdns);
        assert!(!config.dht_server);
        assert_eq!(config.tcp_listen_addr().to_string(), "/ip4/127.0.0.1/tcp/0");
    }
}
