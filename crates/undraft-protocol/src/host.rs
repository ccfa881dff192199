//! Host identification seam.
//!
//! The host owns the connection handshake. It exposes two operations to the
//! splice and calls two hooks around its own identification send.

use async_trait::async_trait;

use undraft_core::{Identification, SessionId};

use crate::error::Result;

/// What the host does after `on_before_send_identification`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    /// Run the host's default send.
    Proceed,
    /// Skip the default send; the hook has taken over.
    Suppress,
}

/// Operations the host exposes to the splice.
#[async_trait]
pub trait HandshakeHost: Send + Sync {
    /// Build the identification for `session`.
    ///
    /// The host must run the installed
    /// [`IdentificationHooks::on_before_build_identification`] on the result
    /// before returning it.
    fn build_identification(&self, session: &SessionId) -> Identification;

    /// Put `identification` on the wire without running any hook.
    async fn send_identification_packet(
        &self,
        session: &SessionId,
        identification: Identification,
    ) -> Result<()>;
}

/// Hooks the host calls while identifying a session.
#[async_trait]
pub trait IdentificationHooks: Send + Sync {
    /// Adjust the identification the host just built.
    fn on_before_build_identification(&self, session: &SessionId, identification: &mut Identification);

    /// Called where the host would send the identification.
    async fn on_before_send_identification(&self, session: &SessionId) -> HookOutcome;

    /// The session's connection is gone.
    async fn on_session_closed(&self, session: &SessionId);
}
