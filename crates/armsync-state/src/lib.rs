//! ARMSYNC State Engine - Authority election and state replication
//!
//! This crate implements:
//! - Peer set tracking
//! - Deterministic authority resolution
//! - The replicated armed/disarmed cell and its reactions

pub mod authority;
pub mod peers;
pub mod replica;

pub use authority::*;
pub use peers::*;
pub use replica::*;
