//! Per-session handshake phases.
//!
//! ```text
//! Idle -> AdvertisedReduced -> AwaitingRequest -> Transferring -> Finalizing -> Complete
//!                 |                                                  ^
//!                 +------------------ nothing to transfer -----------+
//! ```
//!
//! Phases only move forward. The single shortcut is
//! `AdvertisedReduced -> Finalizing` for sessions with nothing to transfer.

use serde::{Deserialize, Serialize};

use crate::error::PhaseError;

/// Where a session is in the handshake splice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HandshakePhase {
    /// No identification sent yet.
    Idle,
    /// The reduced identification was sent.
    AdvertisedReduced,
    /// Draft announcement sent; waiting for the client's transfer request.
    AwaitingRequest,
    /// Serving requested package files.
    Transferring,
    /// Sending the full identification.
    Finalizing,
    /// Indistinguishable from a session that never had drafted packages.
    Complete,
}

impl HandshakePhase {
    /// Whether `self -> next` is a legal transition.
    pub fn can_advance_to(self, next: HandshakePhase) -> bool {
        use HandshakePhase::*;
        matches!(
            (self, next),
            (Idle, AdvertisedReduced)
                | (AdvertisedReduced, AwaitingRequest)
                | (AdvertisedReduced, Finalizing)
                | (AwaitingRequest, Transferring)
                | (Transferring, Finalizing)
                | (Finalizing, Complete)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, HandshakePhase::Complete)
    }
}

/// Tracks one session's phase and rejects illegal transitions.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    phase: HandshakePhase,
    history: Vec<HandshakePhase>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            phase: HandshakePhase::Idle,
            history: vec![HandshakePhase::Idle],
        }
    }

    /// The current phase.
    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    /// Every phase this session has been in, oldest first.
    pub fn history(&self) -> &[HandshakePhase] {
        &self.history
    }

    /// Move to `next`, or fail without changing state.
    pub fn advance(&mut self, next: HandshakePhase) -> Result<(), PhaseError> {
        if self.phase.is_terminal() {
            return Err(PhaseError::AlreadyComplete);
        }
        if !self.phase.can_advance_to(next) {
            return Err(PhaseError::IllegalTransition {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        self.history.push(next);
        Ok(())
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}
