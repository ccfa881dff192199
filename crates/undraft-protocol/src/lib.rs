//! # Undraft Protocol
//!
//! The handshake splice: a private sub-protocol run between the server's
//! first (reduced) identification and its second (full) one, through which
//! clients download drafted packages.
//!
//! ## Overview
//!
//! - [`MessageChannel`] / [`ChannelRegistry`] carry typed messages as
//!   CBOR frames over a [`Transport`]
//! - [`HandshakeCoordinator`] runs the server side per session
//! - [`DraftClient`] answers announcements and stores received files
//! - [`ServerContext`] publishes the draft set and catalog once at startup
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use undraft_protocol::{
//!     register_splice_messages, ChannelRegistry, CoordinatorConfig, HandshakeCoordinator,
//!     MemoryNetwork, ServerContext,
//! };
//!
//! async fn example() -> undraft_protocol::Result<()> {
//!     // let host: Arc<dyn HandshakeHost> = ...;
//!     // let store: Arc<dyn PackageStore> = ...;
//!     let network = MemoryNetwork::new();
//!     let transport = network.create_transport(undraft_core::SessionId::random()).await;
//!     let registry = ChannelRegistry::new(Arc::new(transport));
//!     let channel = registry.register_channel("undrafter")?;
//!     register_splice_messages(&channel)?;
//!
//!     let context = Arc::new(ServerContext::new());
//!     // let coordinator = HandshakeCoordinator::new(host, store, channel, context, CoordinatorConfig::default());
//!     // coordinator.attach()?;
//!     // host.install_identification_hooks(coordinator);
//!     Ok(())
//! }
//! ```
//!
//! ## Message Flow
//!
//! ```text
//! Server                                   Client
//!   |-- Identification (reduced) ---------->|
//!   |-- DraftAnnouncement ----------------->|
//!   |<------------------ TransferRequest ---|
//!   |-- TransferChunk ... ----------------->|
//!   |-- Identification (full) ------------->|
//! ```
//!
//! All splice frames travel [`Destination::PreHandshake`]; the session has
//! not finished its handshake while they are exchanged.

pub mod channel;
pub mod client;
pub mod codec;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod host;
pub mod messages;
pub mod transfer;
pub mod transport;

pub use channel::{ChannelRegistry, HandlerFuture, MessageChannel};
pub use client::{ClientProgress, DraftClient};
pub use codec::{ChannelToken, Frame, MessageKind};
pub use context::{DraftIndex, ServerContext};
pub use coordinator::{CoordinatorConfig, HandshakeCoordinator};
pub use error::{CodecError, ProtocolError, Result, TransportError};
pub use host::{HandshakeHost, HookOutcome, IdentificationHooks};
pub use messages::{
    limits, register_splice_messages, ChannelMessage, DraftAnnouncement, DraftEntry,
    TransferChunk, TransferRequest,
};
pub use transfer::{compose_announcement, missing_entries, persist_chunk, serve_request};
pub use transport::{memory::MemoryNetwork, memory::MemoryTransport, Destination, Transport};
