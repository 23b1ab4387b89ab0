//! Shared fixtures for the shellchat integration tests.

pub mod fixtures {
    //! Multi-node fixtures.

    mod two_node;

    pub use two_node::{TwoNodeFixture, wait_for_listen_addr, wait_until};
}
