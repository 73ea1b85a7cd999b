//! ARMSYNC Core - Fundamental types and primitives
//!
//! This crate defines the core types used throughout ARMSYNC:
//! - Identifiers (PeerId, SessionId)
//! - Replication messages
//! - Session membership interfaces
//! - Errors

pub mod id;
pub mod message;
pub mod session;
pub mod error;

pub use id::*;
pub use message::*;
pub use session::*;
pub use error::*;
