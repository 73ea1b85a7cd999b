//! ARMSYNC Wire - Message encoding and datagram framing
//!
//! This crate implements:
//! - Discriminated JSON encoding of replication messages
//! - The legacy flat record shape, for interop with older peers
//! - Datagram frames (header + sender + payload) for packet transports

pub mod codec;
pub mod frame;
pub mod legacy;

pub use codec::*;
pub use frame::*;
pub use legacy::*;
