//! Fuzz target for `/connect` address parsing

#![no_main]

use libfuzzer_sys::fuzz_target;
use shellchat_core::{Multiaddr, PeerId, split_peer_addr};

fuzz_target!(|data: &str| {
    if let Ok(addr) = data.parse::<Multiaddr>() {
        if let Some((peer, transport)) = split_peer_addr(&addr) {
            // Splitting only strips the trailing /p2p component
            assert!(addr.to_string().starts_with(&transport.to_string()));
            assert!(addr.to_string().ends_with(&peer.to_string()));
        }
    }
    let _ = data.parse::<PeerId>();
});
