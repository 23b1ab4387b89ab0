//! Open chat streams, keyed by peer.
//!
//! Each registered stream is split: the write half lives in the table for
//! the send path, the read half is owned by a dedicated reader task that
//! publishes frames on the inbound channel.

use std::borrow::Cow;
use std::collections::{HashMap, hash_map};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::io::{ReadHalf, WriteHalf};
use futures::{AsyncReadExt, AsyncWriteExt};
use libp2p::{PeerId, Stream};
use tokio::sync::{Mutex, mpsc};

use crate::CHAT_PROTOCOL;
use crate::error::{HostError, Result};
use crate::wire;

/// A frame received from a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Sender
    pub peer_id: PeerId,
    /// Frame payload, verbatim
    pub payload: Vec<u8>,
}

impl InboundMessage {
    /// Payload as text, replacing invalid UTF-8.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

type Writer = Arc<Mutex<WriteHalf<Stream>>>;

/// Write halves of every live stream to one peer.
///
/// Sends use `active`, the oldest live stream. Streams opened while another
/// is active wait in `standby` and take over, oldest first, when the active
/// one ends. Each stream is identified by its registration serial.
struct PeerStreams<W> {
    active: (u64, W),
    standby: Vec<(u64, W)>,
}

impl<W> PeerStreams<W> {
    fn new(serial: u64, writer: W) -> Self {
        Self {
            active: (serial, writer),
            standby: Vec::new(),
        }
    }

    fn attach(&mut self, serial: u64, writer: W) {
        self.standby.push((serial, writer));
    }

    fn active(&self) -> &W {
        &self.active.1
    }

    /// Drop stream `serial`, promoting the oldest standby if it was active.
    ///
    /// Returns the removed writer (`None` when the last stream goes, which
    /// the caller removes with the whole entry) and whether any stream is
    /// left.
    fn detach(&mut self, serial: u64) -> (Option<W>, bool) {
        if self.active.0 == serial {
            if self.standby.is_empty() {
                return (None, false);
            }
            let next = self.standby.remove(0);
            let (_, writer) = std::mem::replace(&mut self.active, next);
            return (Some(writer), true);
        }

        let removed = self
            .standby
            .iter()
            .position(|(s, _)| *s == serial)
            .map(|i| self.standby.remove(i).1);
        (removed, true)
    }
}

struct TableInner {
    entries: Mutex<HashMap<String, PeerStreams<Writer>>>,
    next_serial: AtomicU64,
    inbound: mpsc::UnboundedSender<InboundMessage>,
}

/// Peer-id string → open chat stream.
#[derive(Clone)]
pub(crate) struct StreamTable {
    inner: Arc<TableInner>,
}

impl StreamTable {
    pub(crate) fn new(inbound: mpsc::UnboundedSender<InboundMessage>) -> Self {
        Self {
            inner: Arc::new(TableInner {
                entries: Mutex::new(HashMap::new()),
                next_serial: AtomicU64::new(0),
                inbound,
            }),
        }
    }

    /// Start the reader task for `stream` and record its write half.
    ///
    /// Sends to a peer always use the oldest registered stream still alive,
    /// which keeps them in order even when both sides open a stream at once.
    /// Younger streams are read and held in reserve.
    pub(crate) async fn register(&self, peer: PeerId, stream: Stream) {
        let (reader, writer) = stream.split();
        let writer = Arc::new(Mutex::new(writer));
        let serial = self.inner.next_serial.fetch_add(1, Ordering::Relaxed);

        let active = match self.inner.entries.lock().await.entry(peer.to_string()) {
            hash_map::Entry::Vacant(slot) => {
                slot.insert(PeerStreams::new(serial, writer));
                true
            }
            hash_map::Entry::Occupied(mut slot) => {
                slot.get_mut().attach(serial, writer);
                false
            }
        };
        tracing::debug!(%peer, serial, active, "chat stream attached");

        let table = self.clone();
        tokio::spawn(async move { table.read_loop(peer, serial, reader).await });
    }

    async fn read_loop(self, peer: PeerId, serial: u64, mut reader: ReadHalf<Stream>) {
        loop {
            match wire::read_frame(&mut reader).await {
                Ok(Some(payload)) if payload.is_empty() => continue,
                Ok(Some(payload)) => {
                    let message = InboundMessage {
                        peer_id: peer,
                        payload,
                    };
                    if self.inner.inbound.send(message).is_err() {
                        tracing::debug!(%peer, "inbound receiver dropped, stopping reader");
                        self.remove(&peer, serial).await;
                        return;
                    }
                }
                Ok(None) => {
                    tracing::debug!(%peer, "chat stream closed by peer");
                    if let Some(writer) = self.remove(&peer, serial).await {
                        let _ = writer.lock().await.close().await;
                    }
                    return;
                }
                Err(e) => {
                    // Dropping both halves resets the stream
                    tracing::debug!(%peer, error = %e, "chat stream read failed, resetting");
                    self.remove(&peer, serial).await;
                    return;
                }
            }
        }
    }

    /// Forget stream `serial` of `peer`, keeping any other live stream.
    ///
    /// Returns the write half of the removed stream.
    async fn remove(&self, peer: &PeerId, serial: u64) -> Option<Writer> {
        let mut entries = self.inner.entries.lock().await;
        let key = peer.to_string();
        let streams = entries.get_mut(&key)?;

        let (removed, remaining) = streams.detach(serial);
        if remaining {
            tracing::debug!(%peer, serial, "chat stream detached, another remains");
            return removed;
        }
        entries.remove(&key).map(|streams| streams.active.1)
    }

    /// Open an outbound chat stream unless one is already registered.
    pub(crate) async fn open(&self, mut control: libp2p_stream::Control, peer: PeerId) -> Result<()> {
        if self.contains(&peer.to_string()).await {
            return Ok(());
        }

        let stream = control
            .open_stream(peer, CHAT_PROTOCOL)
            .await
            .map_err(|e| HostError::StreamOpen(Cow::Owned(e.to_string())))?;
        self.register(peer, stream).await;
        Ok(())
    }

    /// Send one frame. Fails immediately if no stream is open.
    pub(crate) async fn send(&self, peer_id: &str, payload: &[u8]) -> Result<()> {
        let writer = self
            .inner
            .entries
            .lock()
            .await
            .get(peer_id)
            .map(|streams| Arc::clone(streams.active()))
            .ok_or_else(|| HostError::PeerNotConnected(peer_id.to_string()))?;

        let frame = wire::encode_frame(payload)?;
        let mut writer = writer.lock().await;
        wire::write_frame(&mut *writer, &frame)
            .await
            .map_err(|e| HostError::Write(e.to_string()))
    }

    /// Send one frame on every open stream. Returns the number of successes.
    pub(crate) async fn broadcast(&self, payload: &[u8]) -> Result<usize> {
        let frame = wire::encode_frame(payload)?;
        let targets: Vec<(String, Writer)> = self
            .inner
            .entries
            .lock()
            .await
            .iter()
            .map(|(peer, streams)| (peer.clone(), Arc::clone(streams.active())))
            .collect();

        let mut delivered = 0;
        for (peer, writer) in targets {
            let mut writer = writer.lock().await;
            match wire::write_frame(&mut *writer, &frame).await {
                Ok(()) => delivered += 1,
                Err(e) => tracing::debug!(%peer, error = %e, "broadcast write failed"),
            }
        }
        Ok(delivered)
    }

    pub(crate) async fn contains(&self, peer_id: &str) -> bool {
        self.inner.entries.lock().await.contains_key(peer_id)
    }

    pub(crate) async fn peers(&self) -> Vec<String> {
        self.inner.entries.lock().await.keys().cloned().collect()
    }
}
