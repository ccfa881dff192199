//! Transport abstraction for the splice channel.
//!
//! The transport moves frames between the server and its connected clients.
//! Real hosts wrap their connection layer; the in-memory network is used by
//! tests.

use std::time::Duration;

use async_trait::async_trait;

use undraft_core::SessionId;

use crate::codec::Frame;
use crate::error::Result;

/// Where a frame goes.
///
/// `Established` is the ordinary route and is refused for sessions that have
/// not completed their handshake. Splice traffic always travels
/// `PreHandshake`, which any connected peer accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    Established(SessionId),
    PreHandshake(SessionId),
}

impl Destination {
    /// Target session.
    pub fn session(&self) -> SessionId {
        match self {
            Destination::Established(s) | Destination::PreHandshake(s) => *s,
        }
    }
}

/// Transport trait for sending and receiving frames.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a frame.
    async fn send(&self, destination: Destination, frame: Frame) -> Result<()>;

    /// Receive the next frame from any peer.
    ///
    /// Returns the sender's session id and the frame.
    async fn recv(&self) -> Result<(SessionId, Frame)>;

    /// Receive with timeout.
    ///
    /// Returns None if timeout expires before a frame arrives.
    async fn recv_timeout(&self, timeout: Duration) -> Result<Option<(SessionId, Frame)>>;

    /// This end's session id.
    fn local_id(&self) -> SessionId;

    /// Whether `peer` has completed its handshake.
    async fn is_established(&self, peer: &SessionId) -> bool;
}

/// In-memory transport for testing.
///
/// Frames are encoded to bytes on send and decoded on receipt, so the codec
/// is exercised end to end.
pub mod memory {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;

    use bytes::Bytes;
    use tokio::sync::{mpsc, Mutex, RwLock};

    use crate::error::TransportError;

    #[derive(Debug)]
    struct Envelope {
        from: SessionId,
        bytes: Bytes,
    }

    /// Shared state for the memory transport network.
    #[derive(Default)]
    pub struct MemoryNetwork {
        senders: RwLock<HashMap<SessionId, mpsc::Sender<Envelope>>>,
        established: RwLock<HashSet<SessionId>>,
    }

    impl MemoryNetwork {
        /// Create a new memory network.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Create a transport connected to this network.
        pub async fn create_transport(self: &Arc<Self>, id: SessionId) -> MemoryTransport {
            let (tx, rx) = mpsc::channel(1000);
            self.senders.write().await.insert(id, tx);
            MemoryTransport {
                id,
                network: Arc::clone(self),
                receiver: Mutex::new(rx),
            }
        }

        /// Record that `id` finished its handshake.
        pub async fn mark_established(&self, id: SessionId) {
            self.established.write().await.insert(id);
        }

        /// Drop `id` from the network. Its transport sees the channel close
        /// once queued frames are drained.
        pub async fn disconnect(&self, id: &SessionId) {
            self.senders.write().await.remove(id);
            self.established.write().await.remove(id);
        }

        async fn is_established(&self, id: &SessionId) -> bool {
            self.established.read().await.contains(id)
        }
    }

    /// In-memory transport implementation.
    pub struct MemoryTransport {
        id: SessionId,
        network: Arc<MemoryNetwork>,
        receiver: Mutex<mpsc::Receiver<Envelope>>,
    }

    impl MemoryTransport {
        /// The network this transport belongs to.
        pub fn network(&self) -> &Arc<MemoryNetwork> {
            &self.network
        }

        fn open(envelope: Envelope) -> Result<(SessionId, Frame)> {
            let frame = Frame::decode_exact(&envelope.bytes)?;
            Ok((envelope.from, frame))
        }
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn send(&self, destination: Destination, frame: Frame) -> Result<()> {
            let peer = destination.session();
            if let Destination::Established(_) = destination {
                if !self.network.is_established(&peer).await {
                    return Err(TransportError::NotEstablished(peer).into());
                }
            }

            let bytes = frame.encode()?;
            let sender = self
                .network
                .senders
                .read()
                .await
                .get(&peer)
                .cloned()
                .ok_or(TransportError::PeerNotFound(peer))?;
            sender
                .send(Envelope {
                    from: self.id,
                    bytes,
                })
                .await
                .map_err(|_| TransportError::Disconnected(peer))?;
            Ok(())
        }

        async fn recv(&self) -> Result<(SessionId, Frame)> {
            let mut rx = self.receiver.lock().await;
            match rx.recv().await {
                Some(envelope) => Self::open(envelope),
                None => Err(TransportError::Closed.into()),
            }
        }

        async fn recv_timeout(&self, timeout: Duration) -> Result<Option<(SessionId, Frame)>> {
            let mut rx = self.receiver.lock().await;
            match tokio::time::timeout(timeout, rx.recv()).await {
                Ok(Some(envelope)) => Self::open(envelope).map(Some),
                Ok(None) => Err(TransportError::Closed.into()),
                Err(_) => Ok(None),
            }
        }

        fn local_id(&self) -> SessionId {
            self.id
        }

        async fn is_established(&self, peer: &SessionId) -> bool {
            self.network.is_established(peer).await
        }
    }
}
