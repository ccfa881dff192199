//! Error types for Undraft Core.

use thiserror::Error;

use crate::phase::HandshakePhase;

/// Core errors for package and catalog primitives.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("package id cannot be empty")]
    EmptyPackageId,

    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("phase error: {0}")]
    Phase(#[from] PhaseError),
}

/// Illegal handshake phase transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhaseError {
    #[error("illegal phase transition: {from:?} -> {to:?}")]
    IllegalTransition {
        from: HandshakePhase,
        to: HandshakePhase,
    },

    #[error("handshake already complete")]
    AlreadyComplete,
}
