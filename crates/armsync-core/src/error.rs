//! Error types for ARMSYNC

use thiserror::Error;

use crate::SessionId;

/// Core ARMSYNC errors
#[derive(Error, Debug)]
pub enum ArmsyncError {
    // Wire errors
    #[error("Invalid wire format: {0}")]
    InvalidWireFormat(String),

    #[error("Unknown message type: {0:?}")]
    UnknownMessageType(String),

    #[error("Frame too short: expected {expected}, got {actual}")]
    FrameTooShort { expected: usize, actual: usize },

    #[error("Frame too large: {size} > {max}")]
    FrameTooLarge { size: usize, max: usize },

    // Session errors
    #[error("Join rejected for session {session}: {reason}")]
    JoinRejected { session: SessionId, reason: String },

    #[error("Not joined to a session")]
    NotJoined,

    #[error("Session client unavailable")]
    ClientUnavailable,

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    // Transport errors
    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Transport closed")]
    TransportClosed,

    // Runtime errors
    #[error("Replica node stopped")]
    NodeStopped,

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for ARMSYNC operations
pub type ArmsyncResult<T> = Result<T, ArmsyncError>;
