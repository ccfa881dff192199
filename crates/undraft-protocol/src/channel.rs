//! Named message channels.
//!
//! A [`MessageChannel`] numbers its message types in registration order and
//! routes incoming frames to typed handlers. A [`ChannelRegistry`] owns the
//! channels of one transport and pumps frames into them.

use std::any::TypeId;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use bytes::Bytes;

use undraft_core::SessionId;

use crate::codec::{decode_payload, encode_payload, ChannelToken, Frame, MessageKind};
use crate::error::{ProtocolError, Result};
use crate::messages::{check_limits, ChannelMessage};
use crate::transport::{Destination, Transport};

/// Boxed future returned by an erased handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;

type ErasedHandler = Arc<dyn Fn(SessionId, Bytes) -> HandlerFuture + Send + Sync>;

struct KindEntry {
    type_id: TypeId,
    name: &'static str,
}

#[derive(Default)]
struct ChannelState {
    kinds: Vec<KindEntry>,
    handlers: HashMap<MessageKind, ErasedHandler>,
}

impl ChannelState {
    fn kind_of(&self, type_id: TypeId) -> Option<MessageKind> {
        self.kinds
            .iter()
            .position(|k| k.type_id == type_id)
            .map(|i| MessageKind(i as u8))
    }
}

/// A named, typed message channel over a shared transport.
pub struct MessageChannel {
    name: String,
    token: ChannelToken,
    transport: Arc<dyn Transport>,
    state: RwLock<ChannelState>,
}

impl MessageChannel {
    fn new(name: &str, transport: Arc<dyn Transport>) -> Self {
        Self {
            name: name.to_string(),
            token: ChannelToken::for_name(name),
            transport,
            state: RwLock::new(ChannelState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token(&self) -> ChannelToken {
        self.token
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, ChannelState>> {
        self.state
            .read()
            .map_err(|_| ProtocolError::Poisoned("channel state"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, ChannelState>> {
        self.state
            .write()
            .map_err(|_| ProtocolError::Poisoned("channel state"))
    }

    /// Register `T`, returning its kind. Registering `T` again returns the
    /// same kind.
    pub fn register_message_type<T: ChannelMessage>(&self) -> Result<MessageKind> {
        let mut state = self.write()?;
        if let Some(kind) = state.kind_of(TypeId::of::<T>()) {
            return Ok(kind);
        }
        let index = u8::try_from(state.kinds.len())
            .map_err(|_| ProtocolError::TooManyKinds(self.name.clone()))?;
        state.kinds.push(KindEntry {
            type_id: TypeId::of::<T>(),
            name: T::NAME,
        });
        tracing::debug!("channel {}: {} registered as kind {}", self.name, T::NAME, index);
        Ok(MessageKind(index))
    }

    /// Kind assigned to `T`.
    pub fn kind_of<T: ChannelMessage>(&self) -> Result<MessageKind> {
        self.read()?
            .kind_of(TypeId::of::<T>())
            .ok_or_else(|| ProtocolError::UnregisteredKind(T::NAME.to_string()))
    }

    /// Number of registered kinds.
    pub fn kind_count(&self) -> usize {
        self.read().map(|s| s.kinds.len()).unwrap_or(0)
    }

    /// Install the handler for `T`, replacing any previous one.
    pub fn set_handler<T, F, Fut>(&self, handler: F) -> Result<()>
    where
        T: ChannelMessage,
        F: Fn(SessionId, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let kind = self.kind_of::<T>()?;
        let handler = Arc::new(handler);
        let erased: ErasedHandler = Arc::new(move |from, payload: Bytes| -> HandlerFuture {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let message: T = decode_payload(&payload)
                    .map_err(|e| ProtocolError::Malformed(format!("{}: {}", T::NAME, e)))?;
                check_limits(&message)?;
                (*handler)(from, message).await
            })
        });
        self.write()?.handlers.insert(kind, erased);
        Ok(())
    }

    /// Whether a handler is installed for `T`.
    pub fn has_handler<T: ChannelMessage>(&self) -> bool {
        match (self.kind_of::<T>(), self.read()) {
            (Ok(kind), Ok(state)) => state.handlers.contains_key(&kind),
            _ => false,
        }
    }

    /// Remove every handler. Registered kinds stay.
    pub fn clear_handlers(&self) {
        match self.state.write() {
            Ok(mut state) => state.handlers.clear(),
            Err(poisoned) => poisoned.into_inner().handlers.clear(),
        }
    }

    /// Frame `message` for this channel.
    pub fn encode<T: ChannelMessage>(&self, message: &T) -> Result<Frame> {
        let kind = self.kind_of::<T>()?;
        check_limits(message)?;
        Ok(Frame {
            channel: self.token,
            kind,
            payload: encode_payload(message)?,
        })
    }

    /// Send `message` to `destination`.
    pub async fn send<T: ChannelMessage>(&self, destination: Destination, message: &T) -> Result<()> {
        let frame = self.encode(message)?;
        tracing::debug!(
            "channel {}: send {} ({} bytes) to {:?}",
            self.name,
            T::NAME,
            frame.payload.len(),
            destination
        );
        self.transport.send(destination, frame).await
    }

    /// Run the handler for `frame`.
    pub async fn dispatch(&self, from: SessionId, frame: Frame) -> Result<()> {
        if frame.channel != self.token {
            return Err(ProtocolError::ChannelMismatch {
                expected: self.token.0,
                got: frame.channel.0,
            });
        }
        let handler = {
            let state = self.read()?;
            let entry = state
                .kinds
                .get(frame.kind.0 as usize)
                .ok_or_else(|| ProtocolError::UnregisteredKind(format!("#{}", frame.kind.0)))?;
            state
                .handlers
                .get(&frame.kind)
                .cloned()
                .ok_or_else(|| ProtocolError::NoHandler(entry.name.to_string()))?
        };
        handler(from, frame.payload).await
    }
}

/// All channels carried by one transport.
pub struct ChannelRegistry {
    transport: Arc<dyn Transport>,
    channels: RwLock<HashMap<ChannelToken, Arc<MessageChannel>>>,
}

impl ChannelRegistry {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            channels: RwLock::new(HashMap::new()),
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Register the channel `name`, or return it if already registered.
    pub fn register_channel(&self, name: &str) -> Result<Arc<MessageChannel>> {
        let token = ChannelToken::for_name(name);
        let mut channels = self
            .channels
            .write()
            .map_err(|_| ProtocolError::Poisoned("channel registry"))?;
        if let Some(existing) = channels.get(&token) {
            if existing.name() == name {
                return Ok(Arc::clone(existing));
            }
            return Err(ProtocolError::ChannelCollision {
                existing: existing.name().to_string(),
                new: name.to_string(),
            });
        }
        let channel = Arc::new(MessageChannel::new(name, Arc::clone(&self.transport)));
        channels.insert(token, Arc::clone(&channel));
        tracing::debug!("channel {} registered as {:?}", name, token);
        Ok(channel)
    }

    /// The channel `name`, if registered.
    pub fn get_channel(&self, name: &str) -> Option<Arc<MessageChannel>> {
        let channels = self.channels.read().ok()?;
        channels
            .get(&ChannelToken::for_name(name))
            .filter(|c| c.name() == name)
            .cloned()
    }

    /// Route `frame` to its channel.
    pub async fn dispatch(&self, from: SessionId, frame: Frame) -> Result<()> {
        let channel = self
            .channels
            .read()
            .map_err(|_| ProtocolError::Poisoned("channel registry"))?
            .get(&frame.channel)
            .cloned()
            .ok_or(ProtocolError::UnknownChannel(frame.channel.0))?;
        channel.dispatch(from, frame).await
    }

    /// Receive and dispatch at most one frame.
    ///
    /// Returns `Ok(false)` when nothing arrived within `timeout`. Dispatch
    /// failures are logged and do not stop the pump; transport failures are
    /// returned.
    pub async fn pump_once(&self, timeout: Duration) -> Result<bool> {
        let Some((from, frame)) = self.transport.recv_timeout(timeout).await? else {
            return Ok(false);
        };
        if let Err(e) = self.dispatch(from, frame).await {
            tracing::warn!("dispatch from {} failed: {}", from, e);
        }
        Ok(true)
    }

    /// Pump frames until the transport fails.
    pub async fn run(&self) -> Result<()> {
        loop {
            let (from, frame) = self.transport.recv().await?;
            if let Err(e) = self.dispatch(from, frame).await {
                tracing::warn!("dispatch from {} failed: {}", from, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{
        register_splice_messages, DraftAnnouncement, TransferChunk, TransferRequest,
    };
    use crate::transport::memory::{MemoryNetwork, MemoryTransport};
    use std::sync::Mutex;

    async fn pair() -> (ChannelRegistry, ChannelRegistry, SessionId, SessionId) {
        let network = MemoryNetwork::new();
        let a = SessionId::from_bytes([0xA; 8]);
        let b = SessionId::from_bytes([0xB; 8]);
        let ta: Arc<MemoryTransport> = Arc::new(network.create_transport(a).await);
        let tb: Arc<MemoryTransport> = Arc::new(network.create_transport(b).await);
        (ChannelRegistry::new(ta), ChannelRegistry::new(tb), a, b)
    }

    #[tokio::test]
    async fn test_kinds_follow_registration_order() {
        let (registry, _, _, _) = pair().await;
        let channel = registry.register_channel("undrafter").unwrap();
        register_splice_messages(&channel).unwrap();

        assert_eq!(channel.kind_of::<DraftAnnouncement>().unwrap(), MessageKind(0));
        assert_eq!(channel.kind_of::<TransferChunk>().unwrap(), MessageKind(1));
        assert_eq!(channel.kind_of::<TransferRequest>().unwrap(), MessageKind(2));

        // Re-registration is a no-op.
        assert_eq!(
            channel.register_message_type::<TransferChunk>().unwrap(),
            MessageKind(1)
        );
        assert_eq!(channel.kind_count(), 3);
    }

    #[tokio::test]
    async fn test_register_channel_is_idempotent() {
        let (registry, _, _, _) = pair().await;
        let first = registry.register_channel("undrafter").unwrap();
        let second = registry.register_channel("undrafter").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&registry.get_channel("undrafter").unwrap(), &first));
        assert!(registry.get_channel("missing").is_none());
    }

    #[tokio::test]
    async fn test_unregistered_kind_fails() {
        let (registry, _, _, b) = pair().await;
        let channel = registry.register_channel("undrafter").unwrap();

        let err = channel
            .send(Destination::PreHandshake(b), &TransferRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::UnregisteredKind(_)));

        let err = channel
            .set_handler::<TransferRequest, _, _>(|_, _| async { Ok(()) })
            .unwrap_err();
        assert!(matches!(err, ProtocolError::UnregisteredKind(_)));

        let frame = Frame {
            channel: channel.token(),
            kind: MessageKind(9),
            payload: Bytes::new(),
        };
        assert!(matches!(
            channel.dispatch(b, frame).await,
            Err(ProtocolError::UnregisteredKind(_))
        ));
    }

    #[tokio::test]
    async fn test_send_and_dispatch_in_order() {
        let (server, client, server_id, client_id) = pair().await;
        let tx = server.register_channel("undrafter").unwrap();
        let rx = client.register_channel("undrafter").unwrap();
        register_splice_messages(&tx).unwrap();
        register_splice_messages(&rx).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        rx.set_handler::<TransferChunk, _, _>(move |from, chunk| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push((from, chunk.file_name));
                Ok(())
            }
        })
        .unwrap();

        for name in ["a.zip", "b.zip"] {
            let chunk = TransferChunk {
                file_name: name.to_string(),
                data: Bytes::from_static(b"zip"),
            };
            tx.send(Destination::PreHandshake(client_id), &chunk)
                .await
                .unwrap();
        }

        assert!(client.pump_once(Duration::from_secs(1)).await.unwrap());
        assert!(client.pump_once(Duration::from_secs(1)).await.unwrap());
        assert!(!client.pump_once(Duration::from_millis(10)).await.unwrap());

        let seen = seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![(server_id, "a.zip".to_string()), (server_id, "b.zip".to_string())]
        );
    }

    #[tokio::test]
    async fn test_malformed_payload_leaves_channel_usable() {
        let (_, client, server_id, _) = pair().await;
        let channel = client.register_channel("undrafter").unwrap();
        register_splice_messages(&channel).unwrap();
        channel
            .set_handler::<TransferRequest, _, _>(|_, _| async { Ok(()) })
            .unwrap();

        let kind = channel.kind_of::<TransferRequest>().unwrap();
        let bad = Frame {
            channel: channel.token(),
            kind,
            payload: Bytes::from_static(b"\xff\xff"),
        };
        assert!(matches!(
            client.dispatch(server_id, bad).await,
            Err(ProtocolError::Malformed(_))
        ));

        let good = channel.encode(&TransferRequest::default()).unwrap();
        client.dispatch(server_id, good).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_handler_and_clear() {
        let (_, client, server_id, _) = pair().await;
        let channel = client.register_channel("undrafter").unwrap();
        register_splice_messages(&channel).unwrap();

        let frame = channel.encode(&TransferRequest::default()).unwrap();
        assert!(matches!(
            channel.dispatch(server_id, frame.clone()).await,
            Err(ProtocolError::NoHandler(_))
        ));

        channel
            .set_handler::<TransferRequest, _, _>(|_, _| async { Ok(()) })
            .unwrap();
        assert!(channel.has_handler::<TransferRequest>());
        channel.clear_handlers();
        assert!(!channel.has_handler::<TransferRequest>());
        assert!(matches!(
            channel.dispatch(server_id, frame).await,
            Err(ProtocolError::NoHandler(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_channel() {
        let (_, client, server_id, _) = pair().await;
        let frame = Frame {
            channel: ChannelToken::for_name("nobody"),
            kind: MessageKind(0),
            payload: Bytes::new(),
        };
        assert!(matches!(
            client.dispatch(server_id, frame).await,
            Err(ProtocolError::UnknownChannel(_))
        ));
    }
}
