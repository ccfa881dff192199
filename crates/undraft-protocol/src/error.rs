//! Error types for the splice protocol.

use thiserror::Error;

use undraft_core::{PhaseError, SessionId};
use undraft_store::StoreError;

/// Errors raised while encoding or decoding frames and payloads.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Payload larger than the frame limit.
    #[error("payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    /// Buffer ended inside a frame.
    #[error("truncated frame: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    /// Trailing bytes after a complete frame.
    #[error("{0} trailing bytes after frame")]
    TrailingBytes(usize),

    /// CBOR encoding failed.
    #[error("encode failed: {0}")]
    Encode(String),

    /// CBOR decoding failed.
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Errors raised by a [`Transport`](crate::Transport).
#[derive(Debug, Error)]
pub enum TransportError {
    /// No peer with that session id is connected.
    #[error("peer not found: {0}")]
    PeerNotFound(SessionId),

    /// An established-only send targeted a session still in its handshake.
    #[error("session {0} has not completed its handshake")]
    NotEstablished(SessionId),

    /// The peer went away while sending.
    #[error("peer disconnected: {0}")]
    Disconnected(SessionId),

    /// The local receive side is closed.
    #[error("channel closed")]
    Closed,
}

/// Errors that can occur during the handshake splice.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Message type was never registered on the channel, or an incoming
    /// frame names a kind nobody registered.
    #[error("unregistered message kind: {0}")]
    UnregisteredKind(String),

    /// Kind is registered but nothing handles it.
    #[error("no handler for message kind: {0}")]
    NoHandler(String),

    /// More message types than the one-byte kind can number.
    #[error("too many message kinds on channel {0}")]
    TooManyKinds(String),

    /// Frame addressed to a channel that is not registered.
    #[error("unknown channel token {0:#06x}")]
    UnknownChannel(u16),

    /// Frame or announcement carries another channel's token.
    #[error("channel token mismatch: expected {expected:#06x}, got {got:#06x}")]
    ChannelMismatch { expected: u16, got: u16 },

    /// Two channel names hash to the same token.
    #[error("channel {new} collides with {existing}")]
    ChannelCollision { existing: String, new: String },

    /// Payload did not decode as the registered type.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// Message exceeds a protocol limit.
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),

    /// Frame codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Local package store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Illegal phase transition.
    #[error("phase error: {0}")]
    Phase(#[from] PhaseError),

    /// Host failed to send an identification.
    #[error("host error: {0}")]
    Host(String),

    /// A splice for this session is already running.
    #[error("splice already in progress for {0}")]
    SpliceInProgress(SessionId),

    /// No splice state exists for this session.
    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    /// The server context was already published.
    #[error("server context already published")]
    AlreadyPublished,

    /// A lock was poisoned by a panicking holder.
    #[error("lock poisoned: {0}")]
    Poisoned(&'static str),
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
