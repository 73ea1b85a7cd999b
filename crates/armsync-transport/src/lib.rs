//! ARMSYNC Transport Layer - Session-scoped broadcast
//!
//! This crate provides:
//! - The [`Transport`] contract (reliable, per-sender ordered broadcast)
//! - An in-process session hub for tests and demos
//! - UDP transport over a static peer list
//! - A static roster directory to pair with the UDP transport

pub mod memory;
pub mod roster;
pub mod udp;

pub use memory::*;
pub use roster::*;
pub use udp::*;

use bytes::Bytes;
use tokio::sync::mpsc;

use armsync_core::{ArmsyncResult, PeerId};

/// Payload received from the session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inbound {
    pub sender: PeerId,
    pub payload: Bytes,
}

/// Inbound payload channel
pub type InboundReceiver = mpsc::UnboundedReceiver<Inbound>;

/// Inbound payload sender
pub type InboundSender = mpsc::UnboundedSender<Inbound>;

/// Session broadcast channel
///
/// Delivery is in send order per sender; there is no order across
/// senders. `broadcast` never blocks: it enqueues and returns.
pub trait Transport: Send + Sync {
    fn broadcast(&self, payload: Bytes) -> ArmsyncResult<()>;

    /// True once payloads can flow
    fn is_ready(&self) -> bool;

    /// Take the inbound stream; only the first call succeeds
    fn take_inbound(&self) -> Option<InboundReceiver>;
}
