//! Discovery Manager
//!
//! Runs local and global discovery as background tasks over one network
//! handle.

use std::sync::Arc;
use std::time::Duration;

use shellchat_core::Host;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::error::DiscoveryError;
use crate::global::{self, GlobalTiming};
use crate::local;
use crate::network::DiscoveryNetwork;

/// Discovery configuration
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Dial peers announced on the local network
    pub enable_mdns: bool,
    /// Advertise and look up peers in the DHT
    pub enable_dht: bool,
    /// Pause between rendezvous lookups
    pub lookup_interval: Duration,
    /// Deadline for one rendezvous lookup
    pub lookup_timeout: Duration,
    /// Deadline for each dial
    pub dial_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enable_mdns: true,
            enable_dht: true,
            lookup_interval: crate::DEFAULT_LOOKUP_INTERVAL,
            lookup_timeout: crate::DEFAULT_LOOKUP_TIMEOUT,
            dial_timeout: crate::DEFAULT_DIAL_TIMEOUT,
        }
    }
}

impl DiscoveryConfig {
    /// Timing handed to the global loop
    #[must_use]
    pub fn global_timing(&self) -> GlobalTiming {
        GlobalTiming {
            lookup_interval: self.lookup_interval,
            lookup_timeout: self.lookup_timeout,
            dial_timeout: self.dial_timeout,
        }
    }
}

/// Discovery manager state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    /// Not started, or shut down
    Stopped,
    /// Background loops running
    Running,
}

/// Owns the discovery tasks for one node.
pub struct DiscoveryManager<N: DiscoveryNetwork = Host> {
    /// Network handle shared with the tasks
    network: Arc<N>,
    /// Configuration
    config: DiscoveryConfig,
    /// Manager state
    state: Arc<RwLock<DiscoveryState>>,
    /// Running loops
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<N: DiscoveryNetwork> DiscoveryManager<N> {
    /// Create a stopped manager
    #[must_use]
    pub fn new(network: N, config: DiscoveryConfig) -> Self {
        Self {
            network: Arc::new(network),
            config,
            state: Arc::new(RwLock::new(DiscoveryState::Stopped)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start the enabled loops
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::AlreadyRunning`] on a running manager and
    /// [`DiscoveryError::LocalEventsClaimed`] if local discovery is enabled
    /// but the announcement receiver was already taken.
    pub async fn start(&self) -> Result<(), DiscoveryError> {
        let mut state = self.state.write().await;
        if *state == DiscoveryState::Running {
            return Err(DiscoveryError::AlreadyRunning);
        }

        let mut tasks = self.tasks.lock().await;

        if self.config.enable_mdns {
            let announcements = self
                .network
                .take_local_discoveries()
                .await
                .ok_or(DiscoveryError::LocalEventsClaimed)?;
            tasks.push(tokio::spawn(local::run(
                Arc::clone(&self.network),
                announcements,
                self.config.dial_timeout,
            )));
        }

        if self.config.enable_dht {
            tasks.push(tokio::spawn(global::run(
                Arc::clone(&self.network),
                self.config.global_timing(),
            )));
        }

        *state = DiscoveryState::Running;
        tracing::info!(
            mdns = self.config.enable_mdns,
            dht = self.config.enable_dht,
            "discovery started"
        );
        Ok(())
    }

    /// Stop all loops
    pub async fn shutdown(&self) {
        let mut state = self.state.write().await;
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        *state = DiscoveryState::Stopped;
        tracing::info!("discovery stopped");
    }

    /// Get current manager state
    pub async fn state(&self) -> DiscoveryState {
        *self.state.read().await
    }

    /// Network handle the manager drives
    #[must_use]
    pub fn network(&self) -> &Arc<N> {
        &self.network
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }
}
